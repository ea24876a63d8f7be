/// Cross-platform directory management for kube-governor
///
/// Uses the `dirs` crate to handle platform-specific directories
/// following OS conventions:
/// - Linux/Unix: XDG Base Directory Specification
/// - macOS: Apple directory guidelines
/// - Windows: Windows directory standards
use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "kube-governor";

/// Get the data directory for kube-governor
///
/// Returns platform-specific data directory:
/// - Linux: `$XDG_DATA_HOME/kube-governor` or `~/.local/share/kube-governor`
/// - macOS: `~/Library/Application Support/kube-governor`
/// - Windows: `%LOCALAPPDATA%\kube-governor`
pub fn data_dir() -> Result<PathBuf> {
    let base_dir =
        dirs::data_local_dir().ok_or_else(|| anyhow!("Unable to determine data directory"))?;
    Ok(base_dir.join(APP_NAME))
}

/// Get the config directory for kube-governor
///
/// Returns platform-specific config directory:
/// - Linux: `$XDG_CONFIG_HOME/kube-governor` or `~/.config/kube-governor`
/// - macOS: `~/Library/Application Support/kube-governor`
/// - Windows: `%APPDATA%\kube-governor`
pub fn config_dir() -> Result<PathBuf> {
    let base_dir =
        dirs::config_dir().ok_or_else(|| anyhow!("Unable to determine config directory"))?;
    Ok(base_dir.join(APP_NAME))
}

/// Default configuration file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Prompt template picked up when the config names none
pub fn prompt_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("PROMPT.md"))
}

/// Directory for rolling log files
pub fn logs_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("logs"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Initialize all required directories
pub fn init_directories() -> Result<()> {
    ensure_dir(&config_dir()?)?;
    ensure_dir(&logs_dir()?)?;
    Ok(())
}
