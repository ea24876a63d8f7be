//! Integration tests for the command governor

use async_trait::async_trait;
use kube_governor::governor::{
    handle_understand, CommandExecutor, CommandRunner, CommandTranslator, CommandValidator,
    DiagnosticsConfig, ExecutionLimits, GovernorError, GovernorResult, GovernorService,
    LanguageModel, OutputAnalyzer, ProcessOutput, SecurityMode, SecurityPolicy, ShellRunner,
    UnderstandRequest, WorkloadState,
};
use kube_governor::governor::translator::NO_ISSUES_RESPONSE;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Runner returning canned process outputs keyed by command
#[derive(Default)]
struct FakeRunner {
    outputs: HashMap<String, ProcessOutput>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    fn ok(mut self, command: &str, stdout: &str) -> Self {
        self.outputs.insert(
            command.to_string(),
            ProcessOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: Some(0),
            },
        );
        self
    }

    fn fail(mut self, command: &str, stderr: &str) -> Self {
        self.outputs.insert(
            command.to_string(),
            ProcessOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_code: Some(1),
            },
        );
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &str) -> GovernorResult<ProcessOutput> {
        self.calls.lock().unwrap().push(command.to_string());
        self.outputs
            .get(command)
            .cloned()
            .ok_or_else(|| GovernorError::execution_failed(command, "command not scripted"))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Model replaying completions in order and capturing prompts
#[derive(Default)]
struct FakeModel {
    replies: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    fn replying(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(&self, prompt: &str) -> GovernorResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| GovernorError::translation_failed("model unavailable"))
    }

    fn provider(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

/// Test fixture wiring fakes into a service
struct TestFixture {
    service: GovernorService,
    runner: Arc<FakeRunner>,
    model: Arc<FakeModel>,
}

impl TestFixture {
    fn new(mode: SecurityMode, runner: FakeRunner, model: Arc<FakeModel>) -> Self {
        let runner = Arc::new(runner);
        let validator = CommandValidator::new(Arc::new(SecurityPolicy::standard()), mode);
        let executor = CommandExecutor::new(
            validator,
            runner.clone(),
            OutputAnalyzer::new(DiagnosticsConfig::default()),
        );
        let translator = CommandTranslator::new(model.clone());

        Self {
            service: GovernorService::new(executor, translator),
            runner,
            model,
        }
    }

    fn strict(runner: FakeRunner) -> Self {
        Self::new(SecurityMode::Strict, runner, FakeModel::replying(&[]))
    }
}

fn shell_executor(limits: ExecutionLimits) -> CommandExecutor {
    let validator = CommandValidator::new(Arc::new(SecurityPolicy::standard()), SecurityMode::Permissive);
    CommandExecutor::new(
        validator,
        Arc::new(ShellRunner::new("sh", limits)),
        OutputAnalyzer::new(DiagnosticsConfig::default()),
    )
}

#[tokio::test]
async fn test_forbidden_patterns_win_in_every_mode() {
    let policy = SecurityPolicy::standard();
    let commands = [
        "kubectl delete pod foo --grace-period=0",
        "kubectl get pods -n default --as=system:admin",
        "kubectl run debug --image=busybox --privileged",
        "kubectl get --raw /api/v1/secrets",
        "kubectl delete pods --all -n default",
        "kubectl get pods -n default --token=abc",
        "kubectl get pods -n default; rm -rf /",
    ];

    for mode in [SecurityMode::Strict, SecurityMode::Permissive] {
        let validator = CommandValidator::new(Arc::new(policy.clone()), mode);
        for command in commands {
            let err = validator.validate(command).unwrap_err();
            assert!(
                err.to_string().starts_with("Command matches forbidden pattern"),
                "{} in {} mode: {}",
                command,
                mode,
                err
            );
        }
    }
}

#[tokio::test]
async fn test_permissive_verdicts_are_stable() {
    let validator = CommandValidator::new(Arc::new(SecurityPolicy::standard()), SecurityMode::Permissive);
    for command in ["kubectl rollout status deploy/web -n shop", "helm repo update", "ls"] {
        let first = validator.verdict(command);
        assert!(first.is_accepted());
        assert_eq!(validator.verdict(command), first);
    }
}

#[tokio::test]
async fn test_grace_period_rejected_without_running() {
    let fixture = TestFixture::strict(FakeRunner::default());

    let result = fixture
        .service
        .execute("kubectl delete pod foo --grace-period=0")
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("grace-period"));
    assert!(fixture.runner.calls().is_empty());
}

#[tokio::test]
async fn test_newline_joined_command_never_runs() {
    let fixture = TestFixture::strict(FakeRunner::default().ok("kubectl get pods -n default", ""));

    let result = fixture
        .service
        .execute("kubectl get pods -n default\ntouch /tmp/marker")
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().starts_with("Command matches forbidden pattern"));
    assert!(fixture.runner.calls().is_empty());
}

#[tokio::test]
async fn test_chain_starting_with_helm_runs_in_strict_mode() {
    let fixture = TestFixture::strict(
        FakeRunner::default()
            .ok("helm list -n shop", "NAME   NAMESPACE   STATUS
web    shop        deployed
")
            .ok("kubectl get pods -n shop", "web-0   1/1   Running   0   1d
"),
    );

    let result = fixture
        .service
        .execute("helm list -n shop && kubectl get pods -n shop")
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        fixture.runner.calls(),
        vec!["helm list -n shop", "kubectl get pods -n shop"]
    );
}

#[tokio::test]
async fn test_chain_with_two_successes_has_two_tagged_blocks() {
    let fixture = TestFixture::strict(
        FakeRunner::default()
            .ok("kubectl get pods -n default", "web-0   1/1   Running   0   1d\n")
            .ok("kubectl get events -n default", "LAST SEEN   TYPE     REASON    OBJECT\n2m   Normal   Started   pod/web-0\n"),
    );

    let result = fixture
        .service
        .execute("kubectl get pods -n default && kubectl get events -n default")
        .await;

    assert!(result.success);
    assert_eq!(result.structured_output.matches("=== Output from: ").count(), 2);
    assert!(result
        .structured_output
        .contains("=== Output from: kubectl get events -n default ==="));
    assert!(result.diagnosis.is_none());
}

#[tokio::test]
async fn test_chain_prefix_success_then_failures() {
    let fixture = TestFixture::strict(
        FakeRunner::default()
            .ok("kubectl get pods -n a", "pod-a Running\n")
            .ok("kubectl get pods -n b", "pod-b Running\n")
            .fail("kubectl get pods -n c", "namespaces \"c\" not found"),
    );

    let result = fixture
        .service
        .execute("kubectl get pods -n a && kubectl get pods -n b && kubectl get pods -n c")
        .await;

    assert!(result.success);
    assert!(result.is_partial());

    let output = &result.structured_output;
    let a = output.find("=== Output from: kubectl get pods -n a ===").unwrap();
    let b = output.find("=== Output from: kubectl get pods -n b ===").unwrap();
    let c = output.find("=== Error from: kubectl get pods -n c ===").unwrap();
    assert!(a < b && b < c);
    assert!(result.raw_output.contains("pod-a") && result.raw_output.contains("pod-b"));
}

#[tokio::test]
async fn test_chain_all_segments_failing() {
    let fixture = TestFixture::strict(
        FakeRunner::default()
            .fail("kubectl get pods -n a", "connection refused")
            .fail("kubectl get pods -n b", "connection refused"),
    );

    let result = fixture
        .service
        .execute("kubectl get pods -n a && kubectl get pods -n b")
        .await;

    assert!(!result.success);
    assert_eq!(result.diagnosis.unwrap().state, Some(WorkloadState::Error));
    assert_eq!(fixture.runner.calls().len(), 2);
}

#[tokio::test]
async fn test_image_pull_diagnosis() {
    let fixture = TestFixture::strict(FakeRunner::default().ok(
        "kubectl get pods -n shop",
        "NAME    READY   STATUS             RESTARTS   AGE\nweb-0   0/1     ImagePullBackOff   0          3m\nrpc error: image \"web:9.9\" not found\n",
    ));

    let result = fixture.service.execute("kubectl get pods -n shop").await;

    assert!(result.success);
    let diagnosis = result.diagnosis.unwrap();
    assert_eq!(diagnosis.state, Some(WorkloadState::ImagePullBackOff));
    assert!(diagnosis.issues.contains(&"Image not found".to_string()));
    assert!(diagnosis.recommendations.iter().any(|r| r.contains("registry")));
}

#[tokio::test]
async fn test_container_creating_runs_follow_up_probes() {
    let fixture = TestFixture::strict(
        FakeRunner::default()
            .ok("kubectl get pods -n shop", "web-0   0/1   ContainerCreating   0   6m\n")
            .ok(
                "kubectl describe pod web-0 -n shop",
                "Warning  FailedMount  MountVolume.SetUp failed for volume \"creds\" : secret \"db-creds\" not found",
            ),
    );

    let result = fixture.service.execute("kubectl get pods -n shop").await;

    let diagnosis = result.diagnosis.unwrap();
    assert_eq!(diagnosis.state, Some(WorkloadState::ContainerCreating));
    assert_eq!(
        diagnosis.issues,
        vec!["Volume mount failure", "Referenced Secret could not be mounted"]
    );
    let details = diagnosis.details.unwrap();
    assert_eq!(details["resource"], "web-0");
    assert_eq!(details["events_output"], "Unable to retrieve events");
    assert_eq!(
        fixture.runner.calls(),
        vec![
            "kubectl get pods -n shop",
            "kubectl describe pod web-0 -n shop",
            "kubectl get events -n shop --sort-by=.lastTimestamp",
        ]
    );
}

#[tokio::test]
async fn test_conversation_round_trip() {
    let model = FakeModel::replying(&["kubectl get pods", "kubectl describe pod web-0 -n default"]);
    let fixture = TestFixture::new(SecurityMode::Strict, FakeRunner::default(), model);

    let first = fixture.service.understand("list pods").await.unwrap();
    assert_eq!(first.command, "kubectl get pods -n default");

    let second = fixture.service.understand("now describe it").await.unwrap();
    assert_eq!(second.command, "kubectl describe pod web-0 -n default");

    let prompts = fixture.model.prompts();
    assert!(prompts[1].contains("Last command executed: kubectl get pods -n default"));
    assert!(prompts[1].contains("user: now describe it"));
}

#[tokio::test]
async fn test_translation_failure_leaves_context_untouched() {
    let fixture = TestFixture::new(SecurityMode::Strict, FakeRunner::default(), FakeModel::replying(&[]));

    let err = fixture.service.understand("list pods").await.unwrap_err();
    assert!(matches!(err, GovernorError::TranslationFailed(_)));
    assert_eq!(fixture.service.context().await.last_command(), None);
}

#[tokio::test]
async fn test_clean_output_summary_skips_model() {
    let fixture = TestFixture::strict(FakeRunner::default());

    let summary = fixture
        .service
        .summarize_output("NAME    READY   STATUS    RESTARTS   AGE\nweb-0   1/1     Running   0          2d\n")
        .await
        .unwrap();

    assert_eq!(summary, NO_ISSUES_RESPONSE);
    assert_eq!(fixture.model.call_count(), 0);
}

#[tokio::test]
async fn test_natural_language_flow_records_output() {
    let fixture = TestFixture::new(
        SecurityMode::Strict,
        FakeRunner::default().ok("kubectl get services -n shop", "web   ClusterIP   10.0.0.12   80/TCP\n"),
        FakeModel::replying(&["```\nkubectl get services -n shop\n```"]),
    );

    let outcome = fixture
        .service
        .run_natural_language("what services run in shop?")
        .await
        .unwrap();

    assert_eq!(outcome.command, "kubectl get services -n shop");
    assert!(outcome.result.success);

    let context = fixture.service.context().await;
    assert!(context.last_output().unwrap().contains("10.0.0.12"));
    assert_eq!(context.last_command(), Some("kubectl get services -n shop"));
}

#[tokio::test]
async fn test_understand_tool_with_execution() {
    let fixture = TestFixture::new(
        SecurityMode::Strict,
        FakeRunner::default(),
        FakeModel::replying(&["kubectl delete pod web-0 -n shop --force"]),
    );
    let service = Arc::new(fixture.service);

    let value = handle_understand(
        UnderstandRequest {
            text: "kill web-0 right now".to_string(),
            execute: true,
        },
        Some(service),
    )
    .await
    .unwrap();

    assert_eq!(value["success"], false);
    assert_eq!(value["command"], "kubectl delete pod web-0 -n shop --force");
    assert!(value["result"]["error"]
        .as_str()
        .unwrap()
        .contains("forbidden pattern"));
    assert!(fixture.runner.calls().is_empty());
}

#[tokio::test]
async fn test_shell_chain_partial_success() {
    let executor = shell_executor(ExecutionLimits::default());

    let result = executor.execute("echo first && false && echo third").await;

    assert!(result.success);
    assert!(result.is_partial());
    assert_eq!(result.structured_output.matches("=== Output from: ").count(), 2);
    assert!(result
        .structured_output
        .contains("=== Error from: false ===\nCommand exited with code 1"));
    assert_eq!(executor.stats().successful_executions, 1);
}

#[tokio::test]
async fn test_shell_segment_timeout_is_a_failed_segment() {
    let executor = shell_executor(ExecutionLimits {
        max_execution_time: Duration::from_millis(200),
        max_output_bytes: 1024,
    });

    let result = executor.execute("sleep 5").await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("timed out"));
    assert_eq!(executor.stats().failed_executions, 1);
}

#[tokio::test]
async fn test_container_creating_row_is_not_passed_to_the_shell() {
    let dir = tempfile::TempDir::new().unwrap();
    let marker = dir.path().join("marker");
    let executor = shell_executor(ExecutionLimits::default());

    let command = format!("printf 'evil>{} ContainerCreating\\n'", marker.display());
    let result = executor.execute(&command).await;

    let diagnosis = result.diagnosis.unwrap();
    assert_eq!(diagnosis.state, Some(WorkloadState::ContainerCreating));
    assert!(!diagnosis.details.unwrap().contains_key("resource"));
    assert!(!marker.exists());
}
