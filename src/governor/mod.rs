//! kubectl/helm command governor
//!
//! Commands pass a security policy before they run, `&&` chains run
//! sequentially with per-segment outcomes, and output is scanned for known
//! workload failure states. Natural language requests are translated into
//! commands through a language model.

pub mod analyzer;
pub mod config;
pub mod context;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod security;
pub mod service;
pub mod tools;
pub mod translator;
pub mod types;

// Re-export commonly used types
pub use self::analyzer::{DiagnosticProbe, OutputAnalyzer};
pub use self::config::{DiagnosticsConfig, ExecutionConfig, GovernorConfig, LlmConfig, SecurityConfig};
pub use self::context::{ConversationContext, ConversationContextBuilder, ConversationMessage, Role};
pub use self::errors::{GovernorError, GovernorResult};
pub use self::executor::{split_chain, CommandExecutor, CommandRunner, ProcessOutput, ShellRunner};
pub use self::llm::{LanguageModel, OllamaClient};
pub use self::security::limits::ExecutionLimits;
pub use self::security::validator::CommandValidator;
pub use self::security::{SecurityPolicy, Verdict};
pub use self::service::{GovernorService, NaturalLanguageOutcome, ServiceInfo};
pub use self::tools::{
    handle_execute, handle_service_info, handle_summarize, handle_understand, handle_validate,
    ExecuteRequest, ServiceInfoRequest, SummarizeRequest, UnderstandRequest, ValidateRequest,
};
pub use self::translator::{CommandTranslator, Translation, TranslatorInfo};
pub use self::types::{CommandResult, Diagnosis, ExecutionStats, SecurityMode, WorkloadState};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        CommandExecutor, CommandResult, CommandTranslator, Diagnosis, GovernorConfig,
        GovernorError, GovernorResult, GovernorService, LanguageModel, SecurityMode,
        WorkloadState,
    };
}
