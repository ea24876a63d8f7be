//! Command execution, including `&&` chains

use crate::governor::analyzer::{DiagnosticProbe, OutputAnalyzer};
use crate::governor::security::limits::ExecutionLimits;
use crate::governor::security::validator::CommandValidator;
use crate::governor::security::SecurityPolicy;
use crate::governor::{
    CommandResult, Diagnosis, ExecutionStats, GovernorConfig, GovernorError, GovernorResult,
    SecurityMode, WorkloadState,
};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Conjunctive operator joining chain segments
pub const CHAIN_SEPARATOR: &str = "&&";

/// Split a command into trimmed, non-empty chain segments
pub fn split_chain(command: &str) -> Vec<&str> {
    command
        .split(CHAIN_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Captured output of one finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Error text for a failed process
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("Command exited with code {}", code),
            None => "Command terminated by signal".to_string(),
        }
    }
}

/// Runs one command segment to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command and wait for it to exit
    async fn run(&self, command: &str) -> GovernorResult<ProcessOutput>;

    /// Runner name for logs
    fn name(&self) -> &str;
}

/// Hands each segment to an OS shell via `<shell> -c`
pub struct ShellRunner {
    shell: String,
    limits: ExecutionLimits,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>, limits: ExecutionLimits) -> Self {
        Self {
            shell: shell.into(),
            limits,
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("sh", ExecutionLimits::default())
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> GovernorResult<ProcessOutput> {
        debug!(shell = %self.shell, command = %command, "Spawning command");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // A timed-out child is dropped with the wait future below
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn command '{}': {}", command, e);
            GovernorError::execution_failed(command, format!("Failed to spawn command: {}", e))
        })?;

        let deadline = self.limits.max_execution_time;
        let output = match timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!("Command execution error: {}", e);
                return Err(GovernorError::execution_failed(
                    command,
                    format!("Command execution error: {}", e),
                ));
            }
            Err(_) => {
                error!("Command timed out after {:?}", deadline);
                return Err(GovernorError::timeout(command, deadline));
            }
        };

        let output = ProcessOutput {
            stdout: self.limits.capture(&output.stdout),
            stderr: self.limits.capture(&output.stderr),
            exit_code: output.status.code(),
        };
        debug!(exit_code = ?output.exit_code, "Command exited");
        Ok(output)
    }

    fn name(&self) -> &str {
        &self.shell
    }
}

/// Outcome of one chain segment
#[derive(Debug, Clone)]
enum SegmentOutcome {
    Succeeded {
        segment: String,
        stdout: String,
        diagnosis: Diagnosis,
    },
    Failed {
        segment: String,
        error: String,
    },
}

/// Running reduction over segment outcomes
#[derive(Debug, Default)]
struct ChainReport {
    raw: Vec<String>,
    tagged: String,
    diagnosis: Diagnosis,
    errors: Vec<String>,
    succeeded: usize,
    failed: usize,
}

impl ChainReport {
    fn absorb(mut self, outcome: SegmentOutcome) -> Self {
        match outcome {
            SegmentOutcome::Succeeded {
                segment,
                stdout,
                diagnosis,
            } => {
                self.succeeded += 1;
                if !stdout.trim().is_empty() {
                    self.tagged.push_str(&format!(
                        "=== Output from: {} ===\n{}\n\n",
                        segment,
                        stdout.trim_end()
                    ));
                    self.raw.push(stdout);
                }
                self.diagnosis = self.diagnosis.merge(diagnosis);
            }
            SegmentOutcome::Failed { segment, error } => {
                self.failed += 1;
                if !error.trim().is_empty() {
                    self.tagged.push_str(&format!(
                        "=== Error from: {} ===\n{}\n\n",
                        segment,
                        error.trim_end()
                    ));
                }
                self.errors.push(error);
            }
        }
        self
    }

    fn into_result(mut self, chained: bool) -> CommandResult {
        let success = self.succeeded > 0;

        if !success {
            let message = if chained {
                format!("All commands in chain failed: {}", self.errors.join("; "))
            } else {
                self.errors.join("; ")
            };
            let mut diagnosis = Diagnosis::error(message.clone());
            if chained {
                diagnosis.issues = self.errors;
            }
            return CommandResult {
                success: false,
                raw_output: String::new(),
                structured_output: self.tagged,
                error: Some(message),
                diagnosis: Some(diagnosis),
            };
        }

        let error = if self.failed > 0 {
            self.diagnosis.partial_success = true;
            if self.diagnosis.issues.is_empty() {
                self.diagnosis.push(
                    "Some commands succeeded but others failed",
                    "Review the error output of the failed commands and rerun them individually",
                );
            }
            Some(self.errors.join("; "))
        } else {
            None
        };

        CommandResult {
            success: true,
            raw_output: self.raw.join("\n"),
            structured_output: self.tagged,
            error,
            diagnosis: (!self.diagnosis.is_empty()).then_some(self.diagnosis),
        }
    }
}

/// Validates, runs and analyzes governed commands
pub struct CommandExecutor {
    validator: CommandValidator,
    runner: Arc<dyn CommandRunner>,
    analyzer: OutputAnalyzer,
    stats: Arc<RwLock<ExecutionStats>>,
}

impl CommandExecutor {
    pub fn new(
        validator: CommandValidator,
        runner: Arc<dyn CommandRunner>,
        analyzer: OutputAnalyzer,
    ) -> Self {
        Self {
            validator,
            runner,
            analyzer,
            stats: Arc::new(RwLock::new(ExecutionStats::default())),
        }
    }

    /// Build an executor backed by a real shell
    pub fn from_config(config: &GovernorConfig) -> GovernorResult<Self> {
        let policy = SecurityPolicy::with_extra_forbidden(&config.security.extra_forbidden_patterns)?;
        let validator = CommandValidator::new(Arc::new(policy), config.security.mode);
        let runner = ShellRunner::new(
            config.execution.shell.clone(),
            ExecutionLimits::from(&config.execution),
        );
        let analyzer = OutputAnalyzer::new(config.diagnostics.clone());
        Ok(Self::new(validator, Arc::new(runner), analyzer))
    }

    pub fn validator(&self) -> &CommandValidator {
        &self.validator
    }

    pub fn mode(&self) -> SecurityMode {
        self.validator.mode()
    }

    pub fn stats(&self) -> ExecutionStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Validate and run a command; every failure is folded into the result
    pub async fn execute(&self, command: &str) -> CommandResult {
        let command = command.trim();
        let span = info_span!("execute", execution_id = %Uuid::new_v4());

        async move {
            if let Err(e) = self.validator.validate(command) {
                error!("Command validation failed: {}", e);
                self.record(|stats| stats.record_rejection());
                return CommandResult::rejected(e.to_string());
            }

            let segments = split_chain(command);
            if segments.is_empty() {
                self.record(|stats| stats.record_rejection());
                return CommandResult::rejected("Empty command");
            }

            let start = Instant::now();
            info!(command = %command, segments = segments.len(), "Executing command");

            let mut outcomes = Vec::with_capacity(segments.len());
            for segment in &segments {
                outcomes.push(self.run_segment(segment).await);
            }

            let result = outcomes
                .into_iter()
                .fold(ChainReport::default(), ChainReport::absorb)
                .into_result(segments.len() > 1);

            let duration = start.elapsed();
            if result.success {
                info!(partial = result.is_partial(), "Command executed successfully");
                self.record(|stats| stats.record_success(duration));
            } else {
                warn!(error = ?result.error, "Command failed");
                self.record(|stats| stats.record_failure(duration));
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Run one segment to completion, analyzing its output on success
    async fn run_segment(&self, segment: &str) -> SegmentOutcome {
        debug!(segment = %segment, runner = self.runner.name(), "Running segment");
        match self.runner.run(segment).await {
            Ok(output) if output.success() => {
                let diagnosis = self.analyzer.analyze(segment, &output.stdout, self).await;
                SegmentOutcome::Succeeded {
                    segment: segment.to_string(),
                    stdout: output.stdout,
                    diagnosis,
                }
            }
            Ok(output) => {
                let error = output.failure_message();
                warn!(segment = %segment, exit_code = ?output.exit_code, "Segment failed: {}", error);
                SegmentOutcome::Failed {
                    segment: segment.to_string(),
                    error,
                }
            }
            Err(e) => {
                error!(segment = %segment, "Segment could not run: {}", e);
                SegmentOutcome::Failed {
                    segment: segment.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    fn record(&self, update: impl FnOnce(&mut ExecutionStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    /// Failure states the analyzer recognizes
    pub fn failure_states(&self) -> Vec<WorkloadState> {
        WorkloadState::detectable().to_vec()
    }
}

#[async_trait]
impl DiagnosticProbe for CommandExecutor {
    async fn probe(&self, command: &str) -> GovernorResult<String> {
        self.validator.validate(command)?;
        debug!(command = %command, "Running diagnostic probe");

        let output = self.runner.run(command).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(GovernorError::execution_failed(command, output.failure_message()))
        }
    }
}
