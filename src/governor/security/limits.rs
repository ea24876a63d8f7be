//! Resource limits for governed subprocesses

use crate::governor::config::ExecutionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Marker appended to captured output that hit the cap
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Per-segment execution limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Deadline for one segment's process
    pub max_execution_time: Duration,

    /// Cap on captured stdout and stderr, each
    pub max_output_bytes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_execution_time: Duration::from_secs(60),
            max_output_bytes: 1024 * 1024, // 1MB
        }
    }
}

impl ExecutionLimits {
    /// Decode captured bytes, cutting them at the output cap
    pub fn capture(&self, bytes: &[u8]) -> String {
        if bytes.len() <= self.max_output_bytes {
            return String::from_utf8_lossy(bytes).into_owned();
        }

        let mut text = String::from_utf8_lossy(&bytes[..self.max_output_bytes]).into_owned();
        text.push_str(TRUNCATION_MARKER);
        text
    }
}

impl From<&ExecutionConfig> for ExecutionLimits {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            max_execution_time: config.command_timeout(),
            max_output_bytes: config.max_output_bytes,
        }
    }
}
