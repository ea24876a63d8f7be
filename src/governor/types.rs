//! Core types for the command governor

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Allow-list enforcement level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Command must match a registered tool/subcommand pattern
    #[default]
    Strict,
    /// Only forbidden patterns are enforced
    Permissive,
}

impl SecurityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Permissive => "permissive",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => Err(format!("unknown security mode: {}", other)),
        }
    }
}

/// Workload failure states recognized in command output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum WorkloadState {
    Pending,
    CrashLoopBackOff,
    ImagePullBackOff,
    ContainerCreating,
    Error,
}

impl WorkloadState {
    /// States the analyzer can detect, in detection priority order
    pub fn detectable() -> [Self; 4] {
        [
            Self::ContainerCreating,
            Self::Pending,
            Self::CrashLoopBackOff,
            Self::ImagePullBackOff,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::CrashLoopBackOff => "CrashLoopBackOff",
            Self::ImagePullBackOff => "ImagePullBackOff",
            Self::ContainerCreating => "ContainerCreating",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for WorkloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured interpretation of command output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Diagnosis {
    /// Detected failure state, if any
    pub state: Option<WorkloadState>,

    /// Problems found, in detection order
    pub issues: Vec<String>,

    /// Actionable steps, in detection order
    pub recommendations: Vec<String>,

    /// Extra context (resource name, namespace, fetched sub-outputs)
    pub details: Option<BTreeMap<String, String>>,

    /// Set when a chain had both succeeding and failing segments
    #[serde(default)]
    pub partial_success: bool,
}

impl Diagnosis {
    /// Diagnosis for a failed command
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            state: Some(WorkloadState::Error),
            issues: vec![message.into()],
            recommendations: vec!["check command syntax and permissions".to_string()],
            details: None,
            partial_success: false,
        }
    }

    /// Whether nothing at all was diagnosed
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.issues.is_empty()
            && self.recommendations.is_empty()
            && self.details.is_none()
            && !self.partial_success
    }

    /// Record an issue together with its recommendation
    pub fn push(&mut self, issue: impl Into<String>, recommendation: impl Into<String>) {
        self.issues.push(issue.into());
        self.recommendations.push(recommendation.into());
    }

    /// Fold a later segment's diagnosis into this one.
    ///
    /// The last non-null state wins, issues and recommendations are
    /// concatenated in order and present details replace earlier ones.
    pub fn merge(mut self, next: Diagnosis) -> Self {
        if next.state.is_some() {
            self.state = next.state;
        }
        self.issues.extend(next.issues);
        self.recommendations.extend(next.recommendations);
        if next.details.is_some() {
            self.details = next.details;
        }
        self.partial_success |= next.partial_success;
        self
    }
}

/// Result of one `execute` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommandResult {
    /// True if the command (or at least one chain segment) succeeded
    pub success: bool,

    /// Untagged stdout of the succeeded segments
    pub raw_output: String,

    /// Per-segment output blocks tagged with the segment text
    pub structured_output: String,

    /// Rejection reason or failure text
    pub error: Option<String>,

    /// Diagnosis derived from the output
    pub diagnosis: Option<Diagnosis>,
}

impl CommandResult {
    /// Result for a command the policy refused; nothing was spawned
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Whether the chain had mixed segment outcomes
    pub fn is_partial(&self) -> bool {
        self.diagnosis.as_ref().map(|d| d.partial_success).unwrap_or(false)
    }
}

/// Execution statistics for a governor instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Total number of executions, rejections included
    pub total_executions: u64,

    /// Executions where at least one segment succeeded
    pub successful_executions: u64,

    /// Executions where every segment failed
    pub failed_executions: u64,

    /// Executions refused by the security policy
    pub rejected_executions: u64,

    /// Average execution time
    pub average_duration: Option<Duration>,

    /// Maximum execution time
    pub max_duration: Option<Duration>,

    /// Last execution time
    pub last_execution: Option<DateTime<Utc>>,
}

impl ExecutionStats {
    /// Record a successful execution
    pub fn record_success(&mut self, duration: Duration) {
        self.total_executions += 1;
        self.successful_executions += 1;
        self.last_execution = Some(Utc::now());
        self.update_duration_stats(duration);
    }

    /// Record a failed execution
    pub fn record_failure(&mut self, duration: Duration) {
        self.total_executions += 1;
        self.failed_executions += 1;
        self.last_execution = Some(Utc::now());
        self.update_duration_stats(duration);
    }

    /// Record a policy rejection; nothing ran, so durations are untouched
    pub fn record_rejection(&mut self) {
        self.total_executions += 1;
        self.rejected_executions += 1;
        self.last_execution = Some(Utc::now());
    }

    fn update_duration_stats(&mut self, duration: Duration) {
        let timed = self.successful_executions + self.failed_executions;
        if let Some(avg) = self.average_duration {
            let total_nanos = avg.as_nanos() * (timed - 1) as u128;
            let new_total = total_nanos + duration.as_nanos();
            self.average_duration = Some(Duration::from_nanos((new_total / timed as u128) as u64));
        } else {
            self.average_duration = Some(duration);
        }

        match self.max_duration {
            Some(max) if duration <= max => {}
            _ => self.max_duration = Some(duration),
        }
    }
}
