//! TOML configuration for the governor

use crate::governor::{GovernorError, GovernorResult, SecurityMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Main governor configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Policy settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// Subprocess settings
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Language model settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Output analysis settings
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Security configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Allow-list enforcement level
    #[serde(default)]
    pub mode: SecurityMode,

    /// Additional forbidden patterns, checked after the built-in table
    #[serde(default)]
    pub extra_forbidden_patterns: Vec<String>,
}

/// Subprocess configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Shell used to interpret each chain segment
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Per-segment deadline in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Captured stdout/stderr cap in bytes
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
}

/// Language model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the completion endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum completion tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP deadline in milliseconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_ms: u64,

    /// Markdown file holding the instruction template inside a ``` block
    #[serde(default)]
    pub prompt_template_path: Option<PathBuf>,
}

/// Output analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Namespace assumed when a command names none
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    /// Label selector used to locate a ContainerCreating pod the output does not name
    #[serde(default)]
    pub label_selector: Option<String>,
}

impl GovernorConfig {
    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> GovernorResult<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save configuration to TOML string
    pub fn to_toml(&self) -> GovernorResult<String> {
        toml::to_string_pretty(self).map_err(|e| GovernorError::invalid_config(e.to_string()))
    }

    /// Load configuration from a file, using defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> GovernorResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let config = Self::from_toml(&std::fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> GovernorResult<()> {
        if self.execution.shell.trim().is_empty() {
            return Err(GovernorError::invalid_config("execution.shell cannot be empty"));
        }
        if self.execution.command_timeout_ms == 0 {
            return Err(GovernorError::invalid_config("execution.command_timeout_ms must be positive"));
        }
        if self.execution.max_output_bytes == 0 {
            return Err(GovernorError::invalid_config("execution.max_output_bytes must be positive"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(GovernorError::invalid_config("llm.model cannot be empty"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(GovernorError::invalid_config(format!(
                "llm.temperature out of range: {}",
                self.llm.temperature
            )));
        }
        if self.llm.timeout_ms == 0 {
            return Err(GovernorError::invalid_config("llm.timeout_ms must be positive"));
        }
        if self.diagnostics.default_namespace.trim().is_empty() {
            return Err(GovernorError::invalid_config("diagnostics.default_namespace cannot be empty"));
        }
        for pattern in &self.security.extra_forbidden_patterns {
            regex::Regex::new(pattern)?;
        }
        Ok(())
    }
}

impl ExecutionConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            mode: SecurityMode::Strict,
            extra_forbidden_patterns: Vec::new(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            command_timeout_ms: default_command_timeout(),
            max_output_bytes: default_max_output(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_llm_timeout(),
            prompt_template_path: None,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            default_namespace: default_namespace(),
            label_selector: None,
        }
    }
}

// Default value functions for serde
fn default_shell() -> String {
    "sh".to_string()
}

fn default_command_timeout() -> u64 {
    60_000
}

fn default_max_output() -> usize {
    1024 * 1024
}

fn default_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_model() -> String {
    "llama3.1".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_llm_timeout() -> u64 {
    120_000
}

fn default_namespace() -> String {
    "default".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = GovernorConfig::default();
        let toml = config.to_toml().unwrap();
        let parsed = GovernorConfig::from_toml(&toml).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = GovernorConfig::from_toml(
            r#"
            [security]
            mode = "permissive"

            [diagnostics]
            label_selector = "app=web"
            "#,
        )
        .unwrap();

        assert_eq!(config.security.mode, SecurityMode::Permissive);
        assert_eq!(config.execution.shell, "sh");
        assert_eq!(config.execution.command_timeout(), Duration::from_secs(60));
        assert_eq!(config.llm.timeout(), Duration::from_secs(120));
        assert_eq!(config.diagnostics.default_namespace, "default");
        assert_eq!(config.diagnostics.label_selector.as_deref(), Some("app=web"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = GovernorConfig::default();
        assert!(config.validate().is_ok());

        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());

        config.llm.temperature = 0.0;
        config.security.extra_forbidden_patterns.push("(unclosed".to_string());
        assert!(config.validate().is_err());

        config.security.extra_forbidden_patterns.clear();
        config.execution.command_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = GovernorConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, GovernorConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[llm]\nmodel = \"mistral\"\ntemperature = 0.2\n").unwrap();

        let config = GovernorConfig::load(&path).unwrap();
        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.security.mode, SecurityMode::Strict);
    }
}
