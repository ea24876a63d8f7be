//! Applies the security policy to candidate commands

use crate::governor::executor::split_chain;
use crate::governor::security::{SecurityPolicy, Verdict};
use crate::governor::{GovernorError, GovernorResult, SecurityMode};
use std::sync::Arc;
use tracing::{info, warn};

/// Gate in front of every execution
#[derive(Debug, Clone)]
pub struct CommandValidator {
    policy: Arc<SecurityPolicy>,
    mode: SecurityMode,
}

impl CommandValidator {
    pub fn new(policy: Arc<SecurityPolicy>, mode: SecurityMode) -> Self {
        Self { policy, mode }
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Verdict for a command or `&&` chain
    ///
    /// A chain is screened against the forbidden table as a whole, then each
    /// segment is evaluated on its own so the allow list sees one command at
    /// a time.
    pub fn verdict(&self, command: &str) -> Verdict {
        let command = command.trim();
        let segments = split_chain(command);
        if segments.len() <= 1 {
            return self.policy.evaluate(command, self.mode);
        }

        let screened = self.policy.screen(command);
        if !screened.is_accepted() {
            return screened;
        }
        segments
            .into_iter()
            .map(|segment| self.policy.evaluate(segment, self.mode))
            .find(|verdict| !verdict.is_accepted())
            .unwrap_or(Verdict::Accept)
    }

    /// Validate a command, logging the decision
    pub fn validate(&self, command: &str) -> GovernorResult<()> {
        let command = command.trim();
        info!(command = %command, mode = %self.mode, "Validating command");

        match self.verdict(command) {
            Verdict::Accept => {
                info!(command = %command, "Command is valid");
                Ok(())
            }
            Verdict::Reject(reason) => {
                warn!(command = %command, reason = %reason, "Command rejected");
                Err(GovernorError::rejected(reason))
            }
        }
    }
}
