use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube_governor::governor::{
    handle_execute, handle_service_info, handle_summarize, handle_understand, handle_validate,
    ExecuteRequest, GovernorConfig, GovernorService, SecurityMode, ServiceInfoRequest,
    SummarizeRequest, UnderstandRequest, ValidateRequest,
};
use kube_governor::platform_dirs;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kube-governor", version, about = "Policy-governed kubectl/helm execution with failure diagnosis")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the configured security mode
    #[arg(long, global = true, value_name = "strict|permissive")]
    mode: Option<SecurityMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate and run a command; `&&` chains are allowed
    Exec {
        /// Command line, e.g. "kubectl get pods -n default"
        command: String,
    },
    /// Check a command against the policy without running it
    Validate { command: String },
    /// Translate a natural language request into a command
    Translate { text: String },
    /// Translate a request and run the resulting command
    Ask { text: String },
    /// Summarize command output read from a file or stdin
    Summarize {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Show capabilities and check that the model answers
    Info {
        /// Send a probe prompt to the model
        #[arg(long)]
        verify: bool,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Install stderr logging plus a daily rolling file once the app dirs exist
fn init_logging() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = platform_dirs::init_directories()
        .and_then(|_| platform_dirs::logs_dir())
        .ok()
        .map(|dir| {
            let appender = tracing_appender::rolling::daily(dir, "kube-governor.log");
            tracing_appender::non_blocking(appender)
        });

    let (file_layer, guard) = match file {
        Some((writer, guard)) => (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<GovernorConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => platform_dirs::config_file()?,
    };
    let mut config = GovernorConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(mode) = cli.mode {
        config.security.mode = mode;
    }
    if config.llm.prompt_template_path.is_none() {
        let prompt = platform_dirs::prompt_file()?;
        if prompt.exists() {
            config.llm.prompt_template_path = Some(prompt);
        }
    }
    Ok(config)
}

fn print(value: &Value) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(value.get("success").and_then(Value::as_bool).unwrap_or(true))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_logging();

    if let Commands::InitConfig { force } = &cli.command {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => platform_dirs::config_file()?,
        };
        if path.exists() && !force {
            anyhow::bail!("{} already exists, pass --force to overwrite", path.display());
        }
        if let Some(parent) = path.parent() {
            platform_dirs::ensure_dir(parent)?;
        }
        std::fs::write(&path, GovernorConfig::default().to_toml()?)?;
        info!(path = %path.display(), "Wrote default configuration");
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;
    let service = Arc::new(GovernorService::from_config(&config)?);
    info!(mode = %service.mode(), "kube-governor starting");

    let ok = match cli.command {
        Commands::Exec { command } => {
            print(&handle_execute(ExecuteRequest { command }, Some(service)).await?)?
        }
        Commands::Validate { command } => {
            print(&handle_validate(ValidateRequest { command }, Some(service)).await?)?
        }
        Commands::Translate { text } => print(
            &handle_understand(UnderstandRequest { text, execute: false }, Some(service)).await?,
        )?,
        Commands::Ask { text } => print(
            &handle_understand(UnderstandRequest { text, execute: true }, Some(service)).await?,
        )?,
        Commands::Summarize { file } => {
            let output = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            print(&handle_summarize(SummarizeRequest { output }, Some(service)).await?)?
        }
        Commands::Info { verify } => {
            if verify {
                if let Err(e) = service.verify_model_access().await {
                    warn!("Model check failed: {}", e);
                }
            }
            print(&handle_service_info(ServiceInfoRequest::default(), Some(service)).await?)?
        }
        Commands::InitConfig { .. } => true,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
