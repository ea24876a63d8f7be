//! Facade exposing the governor to a routing layer

use crate::governor::context::ConversationContext;
use crate::governor::executor::CommandExecutor;
use crate::governor::llm::{LanguageModel, OllamaClient};
use crate::governor::translator::{CommandTranslator, Translation, TranslatorInfo};
use crate::governor::{
    CommandResult, ExecutionStats, GovernorConfig, GovernorResult, SecurityMode, WorkloadState,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Capability and statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub security_mode: SecurityMode,
    /// Tool name to allowed subcommands
    pub capabilities: BTreeMap<String, Vec<String>>,
    pub failure_states: Vec<WorkloadState>,
    pub stats: ExecutionStats,
    pub translator: TranslatorInfo,
}

/// A translated request and what running it produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaturalLanguageOutcome {
    pub command: String,
    pub response: String,
    pub result: CommandResult,
}

/// Executor and translator behind one handle
pub struct GovernorService {
    executor: CommandExecutor,
    // One conversation per service; calls are serialized
    translator: Mutex<CommandTranslator>,
}

impl GovernorService {
    pub fn new(executor: CommandExecutor, translator: CommandTranslator) -> Self {
        Self {
            executor,
            translator: Mutex::new(translator),
        }
    }

    /// Build the service with a shell runner and an Ollama client
    pub fn from_config(config: &GovernorConfig) -> GovernorResult<Self> {
        config.validate()?;
        let executor = CommandExecutor::from_config(config)?;
        let llm: Arc<dyn LanguageModel> = Arc::new(OllamaClient::new(&config.llm)?);
        let translator = CommandTranslator::from_config(llm, config);

        info!(
            mode = %config.security.mode,
            model = %config.llm.model,
            "Initialized governor service"
        );
        Ok(Self::new(executor, translator))
    }

    pub fn mode(&self) -> SecurityMode {
        self.executor.mode()
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Policy verdict without executing anything
    pub fn validate(&self, command: &str) -> GovernorResult<()> {
        self.executor.validator().validate(command)
    }

    pub async fn execute(&self, command: &str) -> CommandResult {
        self.executor.execute(command).await
    }

    pub async fn understand(&self, message: &str) -> GovernorResult<Translation> {
        self.translator.lock().await.understand(message).await
    }

    pub async fn summarize_output(&self, output: &str) -> GovernorResult<String> {
        self.translator.lock().await.summarize_output(output).await
    }

    pub async fn verify_model_access(&self) -> GovernorResult<()> {
        self.translator.lock().await.verify_access().await
    }

    /// Translate a request, run the command and remember its output
    pub async fn run_natural_language(&self, message: &str) -> GovernorResult<NaturalLanguageOutcome> {
        let translation = self.understand(message).await?;
        let result = self.execute(&translation.command).await;

        let recorded = if !result.structured_output.is_empty() {
            result.structured_output.clone()
        } else {
            result.error.clone().unwrap_or_default()
        };
        self.translator.lock().await.record_output(recorded);

        Ok(NaturalLanguageOutcome {
            command: translation.command,
            response: translation.response,
            result,
        })
    }

    /// Snapshot of the conversation so far
    pub async fn context(&self) -> ConversationContext {
        self.translator.lock().await.context().clone()
    }

    pub async fn service_info(&self) -> ServiceInfo {
        let policy = self.executor.validator().policy();
        ServiceInfo {
            name: "kubernetes".to_string(),
            security_mode: self.mode(),
            capabilities: policy.capabilities(),
            failure_states: self.executor.failure_states(),
            stats: self.executor.stats(),
            translator: self.translator.lock().await.service_info(),
        }
    }
}
