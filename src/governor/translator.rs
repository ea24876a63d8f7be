//! Natural language to kubectl/helm translation

use crate::governor::context::{ConversationContext, Role};
use crate::governor::executor::{split_chain, CHAIN_SEPARATOR};
use crate::governor::llm::LanguageModel;
use crate::governor::{GovernorConfig, GovernorError, GovernorResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Instructions used when no template file is configured
pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are a Kubernetes expert. Convert the following request into a kubectl or helm command.
Rules:
1. Only output the command, no explanations
2. Use standard kubectl/helm syntax
3. Include all necessary flags and parameters
4. For create commands, use appropriate defaults if not specified
5. For deployments, always include --image flag
6. For services, always include --port flag
7. ALWAYS include namespace:
   - Use -n <namespace> if a specific namespace is mentioned
   - Use --all-namespaces if \"all namespaces\" is mentioned
   - Use -n default if no namespace is specified
8. Never use --privileged or other dangerous flags
9. For get commands, follow these patterns exactly:
   - kubectl get pods -n <namespace>
   - kubectl get pods --all-namespaces
   - kubectl get pods <pod-name> -n <namespace>
10. Join dependent commands with &&";

/// Reply for output that shows no failure keywords
pub const NO_ISSUES_RESPONSE: &str = "No issues detected in the command output.";

/// Prompt used to check that the model answers at all
pub const ACCESS_PROBE_PROMPT: &str = "Hello, are you working?";

/// Output containing none of these is summarized without the model
const FAILURE_KEYWORDS: &[&str] = &[
    "error",
    "warning",
    "failed",
    "not found",
    "crash",
    "exception",
    "pending",
];

/// A translated command together with the raw completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub command: String,
    pub response: String,
}

/// Translator metadata for service info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorInfo {
    pub name: String,
    pub provider: String,
    pub model: String,
    pub capabilities: Vec<String>,
}

/// Read the instruction template from the first ``` block of a markdown file
pub fn load_prompt_template(path: impl AsRef<Path>) -> GovernorResult<String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    let template = content
        .split("```")
        .nth(1)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            GovernorError::invalid_config(format!(
                "no ``` block with a prompt template in {}",
                path.display()
            ))
        })?;
    Ok(template.to_string())
}

/// Clean a completion into a command line.
///
/// Code fences and stray backticks are removed, and any `kubectl get`
/// segment without a namespace qualifier is pinned to `default_namespace`.
pub fn normalize_command(completion: &str, default_namespace: &str) -> String {
    let text = strip_fences(completion.trim());
    let text = text.trim().trim_matches('`').trim();
    let separator = format!(" {} ", CHAIN_SEPARATOR);

    split_chain(text)
        .into_iter()
        .map(|segment| qualify_namespace(segment, default_namespace))
        .collect::<Vec<_>>()
        .join(separator.as_str())
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string line, e.g. ```bash
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

fn qualify_namespace(segment: &str, default_namespace: &str) -> String {
    let tokens: Vec<&str> = segment.split_whitespace().collect();
    let is_get = tokens.first() == Some(&"kubectl") && tokens.get(1) == Some(&"get");
    let qualified = tokens.iter().any(|t| {
        matches!(*t, "-n" | "--namespace" | "--all-namespaces" | "-A") || t.starts_with("--namespace=")
    });

    if is_get && !qualified {
        format!("{} -n {}", segment, default_namespace)
    } else {
        segment.to_string()
    }
}

/// Turns requests into commands through a language model
pub struct CommandTranslator {
    llm: Arc<dyn LanguageModel>,
    context: ConversationContext,
    template: String,
    default_namespace: String,
}

impl CommandTranslator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            context: ConversationContext::new(),
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            default_namespace: "default".to_string(),
        }
    }

    /// Translator using the configured template file and default namespace
    pub fn from_config(llm: Arc<dyn LanguageModel>, config: &GovernorConfig) -> Self {
        let template = match &config.llm.prompt_template_path {
            Some(path) => load_prompt_template(path).unwrap_or_else(|e| {
                warn!("Error loading prompt template, using built-in: {}", e);
                DEFAULT_PROMPT_TEMPLATE.to_string()
            }),
            None => DEFAULT_PROMPT_TEMPLATE.to_string(),
        };

        Self::new(llm)
            .with_template(template)
            .with_default_namespace(config.diagnostics.default_namespace.clone())
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    pub fn with_context(mut self, context: ConversationContext) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Record output produced outside `summarize_output`
    pub fn record_output(&mut self, output: impl Into<String>) {
        self.context.set_last_output(output);
    }

    /// Translate a request into a command
    pub async fn understand(&mut self, message: &str) -> GovernorResult<Translation> {
        let message = message.trim();
        if message.is_empty() {
            return Err(GovernorError::translation_failed("empty request"));
        }

        info!(message = %message, "Understanding request");
        self.context.push_message(Role::User, message);

        let prompt = self.build_prompt(message);
        let response = self.llm.complete(&prompt).await.map_err(|e| {
            error!("Error understanding command: {}", e);
            e
        })?;

        let command = normalize_command(&response, &self.default_namespace);
        if command.is_empty() {
            return Err(GovernorError::translation_failed("model returned an empty command"));
        }

        info!(command = %command, "Translated request");
        self.context.set_last_command(command.clone());
        self.context.push_message(Role::Assistant, command.clone());

        Ok(Translation {
            command,
            response: response.trim().to_string(),
        })
    }

    /// Summarize command output, calling the model only when it looks unhealthy
    pub async fn summarize_output(&mut self, output: &str) -> GovernorResult<String> {
        self.context.set_last_output(output);
        let lowered = output.to_lowercase();

        let prompt = if lowered.contains("containercreating") {
            container_creating_prompt(output)
        } else if FAILURE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            self.summary_prompt(output)
        } else {
            debug!("No failure keywords in output, skipping model call");
            return Ok(NO_ISSUES_RESPONSE.to_string());
        };

        let summary = self.llm.complete(&prompt).await.map_err(|e| {
            error!("Error summarizing output: {}", e);
            e
        })?;
        Ok(summary.trim().to_string())
    }

    /// Check that the model answers a trivial prompt
    pub async fn verify_access(&self) -> GovernorResult<()> {
        match self.llm.complete(ACCESS_PROBE_PROMPT).await {
            Ok(_) => {
                info!(model = %self.llm.model(), "Successfully verified model access");
                Ok(())
            }
            Err(e) => {
                error!("Failed to verify model access: {}", e);
                Err(GovernorError::translation_failed(format!("model access check failed: {}", e)))
            }
        }
    }

    pub fn service_info(&self) -> TranslatorInfo {
        TranslatorInfo {
            name: "llm".to_string(),
            provider: self.llm.provider().to_string(),
            model: self.llm.model().to_string(),
            capabilities: vec![
                "command_generation".to_string(),
                "output_summarization".to_string(),
            ],
        }
    }

    fn build_prompt(&self, message: &str) -> String {
        let mut prompt = self.template.trim_end().to_string();
        prompt.push_str("\n\n");

        let context = self.context.render();
        if !context.is_empty() {
            prompt.push_str("Context:\n");
            prompt.push_str(&context);
            prompt.push('\n');
        }

        prompt.push_str(&format!("Request: {}\n\nCommand:", message));
        prompt
    }

    fn summary_prompt(&self, output: &str) -> String {
        let mut prompt = String::from(
            "You are a Kubernetes expert. Summarize the following command output for an operator.\n\
             Point out any errors or warnings, explain their likely cause and suggest next steps.\n\n",
        );

        if let Some(command) = self.context.last_command() {
            prompt.push_str(&format!("Command: {}\n\n", command));
        }
        prompt.push_str(&format!("Output:\n{}\n\nSummary:", output));
        prompt
    }
}

fn container_creating_prompt(output: &str) -> String {
    format!(
        "You are a Kubernetes expert. A pod is stuck in ContainerCreating.\n\
         Analyze the output below and answer in four parts:\n\
         1. Problem: what is blocking the container from starting\n\
         2. Causes: the most likely causes, most likely first\n\
         3. Steps: concrete steps to resolve it\n\
         4. Diagnostics: kubectl commands that would confirm the cause\n\n\
         Output:\n{}\n\nAnalysis:",
        output
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Model that replays canned completions and records prompts
    struct ScriptedModel {
        replies: Mutex<Vec<GovernorResult<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<GovernorResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: &str) -> GovernorResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(GovernorError::translation_failed("no scripted reply")))
        }

        fn provider(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test-model"
        }
    }

    #[test]
    fn test_normalize_command() {
        assert_eq!(normalize_command("  kubectl get pods\n", "default"), "kubectl get pods -n default");
        assert_eq!(
            normalize_command("```bash\nkubectl get pods -n shop\n```", "default"),
            "kubectl get pods -n shop"
        );
        assert_eq!(normalize_command("`kubectl get pods -A`", "default"), "kubectl get pods -A");
        assert_eq!(
            normalize_command("kubectl get pods --namespace=shop", "default"),
            "kubectl get pods --namespace=shop"
        );
        assert_eq!(
            normalize_command("kubectl get pods && kubectl get events", "staging"),
            "kubectl get pods -n staging && kubectl get events -n staging"
        );
        assert_eq!(
            normalize_command("helm list --all-namespaces", "default"),
            "helm list --all-namespaces"
        );
    }

    #[test]
    fn test_load_prompt_template() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("PROMPT.md");
        std::fs::write(&path, "# Prompt\n\n```\nTranslate carefully.\n```\n\nNotes\n").unwrap();
        assert_eq!(load_prompt_template(&path).unwrap(), "Translate carefully.");

        std::fs::write(&path, "no fences here").unwrap();
        assert!(load_prompt_template(&path).is_err());
        assert!(load_prompt_template(dir.path().join("missing.md")).is_err());
    }

    #[test]
    fn test_from_config_falls_back_to_default_template() {
        let mut config = GovernorConfig::default();
        config.llm.prompt_template_path = Some("/nonexistent/PROMPT.md".into());

        let translator = CommandTranslator::from_config(ScriptedModel::new(vec![]), &config);
        assert_eq!(translator.template(), DEFAULT_PROMPT_TEMPLATE);
    }

    #[tokio::test]
    async fn test_understand_records_command() {
        let model = ScriptedModel::new(vec![Ok("kubectl get pods".to_string())]);
        let mut translator = CommandTranslator::new(model.clone());

        let translation = translator.understand("list pods").await.unwrap();

        assert_eq!(translation.command, "kubectl get pods -n default");
        assert_eq!(translation.response, "kubectl get pods");
        assert_eq!(translator.context().last_command(), Some("kubectl get pods -n default"));

        let prompt = &model.prompts()[0];
        assert!(prompt.starts_with("You are a Kubernetes expert."));
        assert!(prompt.ends_with("Request: list pods\n\nCommand:"));
        assert!(prompt.contains("user: list pods"));
    }

    #[tokio::test]
    async fn test_resumed_context_feeds_prompt() {
        let context = ConversationContext::builder()
            .with_message(Role::User, "show the web pods")
            .with_last_command("kubectl get pods -n web")
            .with_last_output("web-0   0/1   Pending   0   5m")
            .build();
        let model = ScriptedModel::new(vec![Ok("kubectl describe pod web-0 -n web".to_string())]);
        let mut translator = CommandTranslator::new(model.clone()).with_context(context);

        translator.understand("why is it stuck?").await.unwrap();

        let prompt = &model.prompts()[0];
        assert!(prompt.contains("Last command executed: kubectl get pods -n web\n"));
        assert!(prompt.contains("Last command output: web-0   0/1   Pending   0   5m\n"));
        assert!(prompt.contains("user: show the web pods\nuser: why is it stuck?\n"));
    }

    #[tokio::test]
    async fn test_failed_call_keeps_last_command() {
        let model = ScriptedModel::new(vec![
            Ok("kubectl get pods -n default".to_string()),
            Err(GovernorError::translation_failed("model unavailable")),
        ]);
        let mut translator = CommandTranslator::new(model);

        translator.understand("list pods").await.unwrap();
        let err = translator.understand("now describe it").await.unwrap_err();

        assert!(err.to_string().contains("model unavailable"));
        assert_eq!(translator.context().last_command(), Some("kubectl get pods -n default"));
    }

    #[tokio::test]
    async fn test_empty_completion_is_rejected() {
        let model = ScriptedModel::new(vec![Ok("```\n```".to_string())]);
        let mut translator = CommandTranslator::new(model);

        let err = translator.understand("do something").await.unwrap_err();
        assert!(matches!(err, GovernorError::TranslationFailed(_)));
        assert_eq!(translator.context().last_command(), None);
    }

    #[tokio::test]
    async fn test_summarize_routes_by_content() {
        let model = ScriptedModel::new(vec![
            Ok(" Mount failure on volume cfg. ".to_string()),
            Ok("One pod failed to pull its image.".to_string()),
        ]);
        let mut translator = CommandTranslator::new(model.clone());

        let clean = translator.summarize_output("web-0 1/1 Running 0 2d").await.unwrap();
        assert_eq!(clean, NO_ISSUES_RESPONSE);
        assert!(model.prompts().is_empty());

        let stuck = translator.summarize_output("web-0 0/1 ContainerCreating 0 4m").await.unwrap();
        assert_eq!(stuck, "Mount failure on volume cfg.");
        assert!(model.prompts()[0].contains("4. Diagnostics"));

        let failing = translator.summarize_output("Error: ImagePullBackOff").await.unwrap();
        assert_eq!(failing, "One pod failed to pull its image.");
        assert!(model.prompts()[1].contains("Summary:"));
        assert_eq!(translator.context().last_output(), Some("Error: ImagePullBackOff"));
    }

    #[tokio::test]
    async fn test_verify_access() {
        let model = ScriptedModel::new(vec![Ok("Yes".to_string())]);
        let translator = CommandTranslator::new(model.clone());
        translator.verify_access().await.unwrap();
        assert_eq!(model.prompts(), vec![ACCESS_PROBE_PROMPT]);

        let translator = CommandTranslator::new(ScriptedModel::new(vec![]));
        assert!(translator.verify_access().await.is_err());
    }

    #[test]
    fn test_service_info() {
        let info = CommandTranslator::new(ScriptedModel::new(vec![])).service_info();
        assert_eq!(info.provider, "scripted");
        assert_eq!(info.model, "test-model");
        assert_eq!(info.capabilities, vec!["command_generation", "output_summarization"]);
    }
}
