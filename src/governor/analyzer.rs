//! Workload failure detection over command output
//!
//! Detection is keyword matching, not log parsing. The first recognized
//! state wins, checked in [`WorkloadState::detectable`] order, and each
//! state owns a table of signatures that translate matched substrings into
//! issue/recommendation pairs. Only the ContainerCreating path issues
//! further commands, through a [`DiagnosticProbe`].

use crate::governor::config::DiagnosticsConfig;
use crate::governor::{Diagnosis, GovernorResult, WorkloadState};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const DESCRIBE_UNAVAILABLE: &str = "Unable to retrieve pod description";
pub const EVENTS_UNAVAILABLE: &str = "Unable to retrieve events";

/// Runs follow-up diagnostic commands and returns their stdout
#[async_trait]
pub trait DiagnosticProbe: Send + Sync {
    async fn probe(&self, command: &str) -> GovernorResult<String>;
}

/// Known output fragment mapped to an issue and its fix
struct Signature {
    /// Matches when any of these appear
    any: &'static [&'static str],
    issue: &'static str,
    recommendation: &'static str,
}

const CONTAINER_CREATING_SIGNATURES: &[Signature] = &[
    Signature {
        any: &["failedmount", "mountvolume"],
        issue: "Volume mount failure",
        recommendation: "Verify the volumes referenced by the pod exist and are bound",
    },
    Signature {
        any: &["failedattachvolume"],
        issue: "Volume attach failure",
        recommendation: "Check the storage provider and that the volume is not attached to another node",
    },
    Signature {
        any: &["failedcreatepodsandbox", "network plugin", "cni"],
        issue: "Pod sandbox or network setup failure",
        recommendation: "Check the CNI plugin pods and the node network configuration",
    },
    Signature {
        any: &["pulling image"],
        issue: "Container image is still being pulled",
        recommendation: "Wait for the pull to finish or use a smaller image",
    },
    Signature {
        any: &["secret \"", "secrets \""],
        issue: "Referenced Secret could not be mounted",
        recommendation: "Create the Secret in the pod's namespace or fix its name",
    },
    Signature {
        any: &["configmap \"", "configmaps \""],
        issue: "Referenced ConfigMap could not be mounted",
        recommendation: "Create the ConfigMap in the pod's namespace or fix its name",
    },
];

const PENDING_SIGNATURES: &[Signature] = &[
    Signature {
        any: &["insufficient cpu"],
        issue: "Insufficient CPU resources",
        recommendation: "Lower the pod's CPU requests or add capacity to the cluster",
    },
    Signature {
        any: &["insufficient memory"],
        issue: "Insufficient memory resources",
        recommendation: "Lower the pod's memory requests or add capacity to the cluster",
    },
    Signature {
        any: &["node selector", "node affinity"],
        issue: "No node matches the pod's node selector or affinity",
        recommendation: "Compare node labels with the pod's nodeSelector and affinity rules",
    },
    Signature {
        any: &["taint"],
        issue: "Nodes carry taints the pod does not tolerate",
        recommendation: "Add matching tolerations or remove the taints",
    },
    Signature {
        any: &["unbound", "persistentvolumeclaim"],
        issue: "PersistentVolumeClaim is not bound",
        recommendation: "Check the storage class and that a matching PersistentVolume is available",
    },
];

const CRASH_LOOP_SIGNATURES: &[Signature] = &[
    Signature {
        any: &["oomkilled"],
        issue: "Container was killed for exceeding its memory limit",
        recommendation: "Raise the memory limit or reduce the application's memory use",
    },
    Signature {
        any: &["liveness probe failed"],
        issue: "Liveness probe is failing",
        recommendation: "Check the probe endpoint and its initialDelaySeconds",
    },
    Signature {
        any: &["permission denied"],
        issue: "Container hit a permission error",
        recommendation: "Check the securityContext and file permissions in the image",
    },
    Signature {
        any: &["exit code", "error"],
        issue: "Application exited with an error",
        recommendation: "Inspect the previous container logs with kubectl logs --previous",
    },
];

const IMAGE_PULL_SIGNATURES: &[Signature] = &[
    Signature {
        any: &["not found"],
        issue: "Image not found",
        recommendation: "Verify the image name and tag exist in the registry",
    },
    Signature {
        any: &["unauthorized", "denied", "authentication required"],
        issue: "Registry authentication failed",
        recommendation: "Configure imagePullSecrets with valid registry credentials",
    },
    Signature {
        any: &["timeout", "no such host"],
        issue: "Registry is unreachable",
        recommendation: "Check network access from the nodes to the registry",
    },
    Signature {
        any: &["manifest unknown"],
        issue: "Image manifest is unknown",
        recommendation: "Check that the tag is published for the node's platform",
    },
];

impl Signature {
    fn matches(&self, lowered: &str) -> bool {
        self.any.iter().any(|needle| lowered.contains(needle))
    }
}

/// Output markers for a detectable state
fn markers(state: WorkloadState) -> &'static [&'static str] {
    match state {
        WorkloadState::ContainerCreating => &["containercreating"],
        WorkloadState::Pending => &["pending"],
        WorkloadState::CrashLoopBackOff => &["crashloopbackoff"],
        WorkloadState::ImagePullBackOff => &["imagepullbackoff", "errimagepull"],
        WorkloadState::Error => &[],
    }
}

fn signatures(state: WorkloadState) -> &'static [Signature] {
    match state {
        WorkloadState::ContainerCreating => CONTAINER_CREATING_SIGNATURES,
        WorkloadState::Pending => PENDING_SIGNATURES,
        WorkloadState::CrashLoopBackOff => CRASH_LOOP_SIGNATURES,
        WorkloadState::ImagePullBackOff => IMAGE_PULL_SIGNATURES,
        WorkloadState::Error => &[],
    }
}

/// Issue/recommendation used when a state matched no signature
fn generic(state: WorkloadState) -> (&'static str, &'static str) {
    match state {
        WorkloadState::ContainerCreating => (
            "Pod is stuck in ContainerCreating",
            "Review the pod events for volume, network or image problems",
        ),
        WorkloadState::Pending => (
            "Pod is Pending and has not been scheduled",
            "Run kubectl describe pod to see the scheduler's events",
        ),
        WorkloadState::CrashLoopBackOff => (
            "Container is crash looping",
            "Inspect the previous container logs with kubectl logs --previous",
        ),
        WorkloadState::ImagePullBackOff => (
            "Container image cannot be pulled",
            "Check the image reference and registry access",
        ),
        WorkloadState::Error => ("Command failed", "check command syntax and permissions"),
    }
}

/// First detectable state present in the output
pub fn detect_state(output: &str) -> Option<WorkloadState> {
    let lowered = output.to_lowercase();
    WorkloadState::detectable()
        .into_iter()
        .find(|state| markers(*state).iter().any(|m| lowered.contains(m)))
}

/// Namespace named by `-n X`, `--namespace X` or `--namespace=X`
pub fn namespace_of(command: &str) -> Option<&str> {
    let mut tokens = command.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "-n" || token == "--namespace" {
            return tokens.next();
        }
        if let Some(ns) = token.strip_prefix("--namespace=") {
            return Some(ns);
        }
    }
    None
}

fn spans_all_namespaces(command: &str) -> bool {
    command
        .split_whitespace()
        .any(|t| t == "--all-namespaces" || t == "-A")
}

/// Scans output for workload failure states
#[derive(Debug, Clone, Default)]
pub struct OutputAnalyzer {
    config: DiagnosticsConfig,
}

impl OutputAnalyzer {
    pub fn new(config: DiagnosticsConfig) -> Self {
        Self { config }
    }

    /// Diagnose one command's output; never fails
    pub async fn analyze(
        &self,
        command: &str,
        output: &str,
        probe: &dyn DiagnosticProbe,
    ) -> Diagnosis {
        if command.trim().is_empty() || output.trim().is_empty() {
            return Diagnosis::default();
        }

        let Some(state) = detect_state(output) else {
            return Diagnosis::default();
        };
        info!(state = %state, command = %command, "Detected workload failure state");

        let mut diagnosis = Diagnosis {
            state: Some(state),
            ..Diagnosis::default()
        };

        let mut evidence = output.to_string();
        if state == WorkloadState::ContainerCreating {
            let details = self.container_creating_details(command, output, probe).await;
            for key in ["describe_output", "events_output"] {
                if let Some(text) = details.get(key) {
                    evidence.push('\n');
                    evidence.push_str(text);
                }
            }
            diagnosis.details = Some(details);
        }

        apply_signatures(&mut diagnosis, state, &evidence);
        diagnosis
    }

    /// Gather describe and events output for the stuck pod
    async fn container_creating_details(
        &self,
        command: &str,
        output: &str,
        probe: &dyn DiagnosticProbe,
    ) -> BTreeMap<String, String> {
        let all_namespaces = spans_all_namespaces(command);
        let located = locate_pod(output, all_namespaces);

        let mut namespace = located
            .as_ref()
            .and_then(|(ns, _)| ns.clone())
            .or_else(|| {
                namespace_of(command)
                    .filter(|ns| is_object_name(ns))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| self.config.default_namespace.clone());

        let mut pod = located.map(|(_, pod)| pod);
        if pod.is_none() {
            pod = self.pod_by_selector(&namespace, probe).await;
        }
        if all_namespaces && pod.is_none() {
            namespace = self.config.default_namespace.clone();
        }

        let mut details = BTreeMap::new();
        details.insert("namespace".to_string(), namespace.clone());

        let describe = match &pod {
            Some(pod) => {
                details.insert("resource".to_string(), pod.clone());
                let describe = format!("kubectl describe pod {} -n {}", pod, namespace);
                probe_or(probe, &describe, DESCRIBE_UNAVAILABLE).await
            }
            None => DESCRIBE_UNAVAILABLE.to_string(),
        };
        details.insert("describe_output".to_string(), describe);

        let events = format!("kubectl get events -n {} --sort-by=.lastTimestamp", namespace);
        details.insert(
            "events_output".to_string(),
            probe_or(probe, &events, EVENTS_UNAVAILABLE).await,
        );
        details
    }

    async fn pod_by_selector(&self, namespace: &str, probe: &dyn DiagnosticProbe) -> Option<String> {
        let selector = self.config.label_selector.as_deref()?;
        let command = format!("kubectl get pods -n {} -l {} --no-headers", namespace, selector);
        debug!(selector = %selector, "Locating pod by label selector");

        match probe.probe(&command).await {
            Ok(listing) => locate_pod(&listing, false)
                .map(|(_, pod)| pod)
                .or_else(|| first_column(&listing).filter(|pod| is_object_name(pod))),
            Err(e) => {
                warn!("Pod lookup by selector failed: {}", e);
                None
            }
        }
    }
}

async fn probe_or(probe: &dyn DiagnosticProbe, command: &str, placeholder: &str) -> String {
    match probe.probe(command).await {
        Ok(output) => output,
        Err(e) => {
            warn!(command = %command, "Diagnostic probe failed: {}", e);
            placeholder.to_string()
        }
    }
}

fn apply_signatures(diagnosis: &mut Diagnosis, state: WorkloadState, evidence: &str) {
    let lowered = evidence.to_lowercase();
    for signature in signatures(state) {
        if signature.matches(&lowered) {
            diagnosis.push(signature.issue, signature.recommendation);
        }
    }
    if diagnosis.issues.is_empty() {
        let (issue, recommendation) = generic(state);
        diagnosis.push(issue, recommendation);
    }
}

/// (namespace, pod) from the first table row showing ContainerCreating
fn locate_pod(output: &str, all_namespaces: bool) -> Option<(Option<String>, String)> {
    let line = output
        .lines()
        .find(|line| line.to_lowercase().contains("containercreating"))?;
    let columns: Vec<&str> = line.split_whitespace().collect();

    let (namespace, pod) = if all_namespaces {
        (columns.first().map(|ns| ns.to_string()), columns.get(1)?)
    } else {
        (None, columns.first()?)
    };

    // Describe output has "Key:" rows; anything else that is not an object
    // name never reaches a probe command line
    if !is_object_name(pod) || namespace.as_deref().is_some_and(|ns| !is_object_name(ns)) {
        debug!(row = %line, "ContainerCreating row does not name a pod");
        return None;
    }
    Some((namespace, pod.to_string()))
}

/// Lowercase DNS subdomain name, the form pods and namespaces take
fn is_object_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 253
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-' || *b == b'.')
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
}

fn first_column(listing: &str) -> Option<String> {
    listing
        .lines()
        .find_map(|line| line.split_whitespace().next())
        .map(str::to_string)
}
