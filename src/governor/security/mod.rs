//! Security policy for governed commands
//!
//! The policy is two fixed tables: forbidden patterns, which reject a command
//! in every mode, and per-(tool, subcommand) allow patterns, which only apply
//! in strict mode. Forbidden patterns are always evaluated first.

pub mod limits;
pub mod validator;

use crate::governor::{GovernorResult, SecurityMode};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;

/// Orchestration CLI
pub const KUBECTL: &str = "kubectl";

/// Package deployment CLI
pub const HELM: &str = "helm";

/// Resource words accepted by `kubectl get`
const GET_RESOURCES: &[&str] = &[
    "pod", "deployment", "service", "namespace", "configmap", "secret", "event", "node",
    "replicaset", "statefulset", "daemonset", "job",
];

/// Shell operators a strict-mode command may not contain
const STRICT_SHELL_OPERATORS: &[char] = &['|', '&', '<', '>', '$'];

/// Built-in forbidden patterns
const FORBIDDEN_PATTERNS: &[&str] = &[
    // Privileged and host namespace access
    r"--privileged",
    r"--host-network",
    r"--host-pid",
    r"--host-ipc",
    // Impersonation
    r"--as[=\s]",
    r"--as-group",
    r"delete\s+namespace\s+kube-system",
    r"delete\s+namespace\s+default",
    // Raw API access and credential overrides
    r"--raw",
    r"--v=[4-9]",
    r"--insecure-skip-tls-verify",
    r"--token=",
    r"--client-certificate=",
    r"--client-key=",
    // Forced, immediate or cascading deletion
    r"--force",
    r"--grace-period=0",
    r"--now",
    r"--cascade=orphan",
    // Broad selectors
    r"--all(?:\s|=|$)",
    r"--selector=",
    r"--field-selector=",
    r"--all-namespaces.*delete",
    // Server-side mutation and skipped validation
    r"--dry-run=server",
    r"--server-side",
    r"--force-conflicts",
    r"--validate=false",
    // Shell sequencing and substitution outside the && chain operator
    r"[\r\n]",
    r";",
    r"\|\|",
    r"`",
    r"\$\(",
];

/// Built-in allow patterns: (tool, subcommand, pattern)
const ALLOWED_COMMANDS: &[(&str, &str, &str)] = &[
    (KUBECTL, "get", r"^kubectl\s+get\s+(pods?|deployments?|services?|namespaces?|configmaps?|secrets?|events?|nodes?|replicasets?|statefulsets?|daemonsets?|jobs?)(?:\s+[^\s]+)*$"),
    (KUBECTL, "describe", r"^kubectl\s+describe\s+(pod|deployment|service|namespace|configmap|secret|node)\s+[\w.-]+(?:\s+[^\s]+)*$"),
    (KUBECTL, "create", r"^kubectl\s+create\s+(deployment|namespace|service)\s+[\w.-]+(?:\s+[^\s]+)*$"),
    (KUBECTL, "delete", r"^kubectl\s+delete\s+(pod|deployment|service|namespace)\s+[\w.-]+(?:\s+[^\s]+)*$"),
    (KUBECTL, "logs", r"^kubectl\s+logs(?:\s+[^\s]+)*$"),
    (KUBECTL, "scale", r"^kubectl\s+scale\s+deployment\s+[\w.-]+(?:\s+[^\s]+)*$"),
    (KUBECTL, "exec", r"^kubectl\s+exec(?:\s+[^\s]+)*\s+--\s+\w+.*$"),
    (KUBECTL, "config", r"^kubectl\s+config\s+(use-context|get-contexts|current-context)(?:\s+[^\s]+)*$"),
    (HELM, "list", r"^helm\s+list(\s+--all-namespaces|\s+-n\s+[\w.-]+)?$"),
    (HELM, "install", r"^helm\s+install\s+[\w.-]+\s+\S+(\s+--namespace\s+[\w.-]+|\s+--set\s+\S+)*$"),
    (HELM, "uninstall", r"^helm\s+uninstall\s+[\w.-]+(\s+--namespace\s+[\w.-]+)?$"),
    (HELM, "upgrade", r"^helm\s+upgrade\s+[\w.-]+\s+\S+(\s+--namespace\s+[\w.-]+|\s+--set\s+\S+)*$"),
];

/// A pattern that rejects any command it matches
#[derive(Debug, Clone)]
pub struct ForbiddenRule {
    pattern: Regex,
}

impl ForbiddenRule {
    pub fn new(pattern: &str) -> GovernorResult<Self> {
        Ok(Self {
            pattern: RegexBuilder::new(pattern).case_insensitive(true).build()?,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn matches(&self, command: &str) -> bool {
        self.pattern.is_match(command)
    }
}

/// A (tool, subcommand) pair and the pattern the whole command must match
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub tool: String,
    pub subcommand: String,
    pattern: Regex,
}

impl PolicyRule {
    pub fn new(
        tool: impl Into<String>,
        subcommand: impl Into<String>,
        pattern: &str,
    ) -> GovernorResult<Self> {
        Ok(Self {
            tool: tool.into(),
            subcommand: subcommand.into(),
            pattern: RegexBuilder::new(pattern).case_insensitive(true).build()?,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn matches(&self, command: &str) -> bool {
        self.pattern.is_match(command)
    }
}

/// Outcome of evaluating a command against the policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Static forbidden and allow tables; read-only after construction
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    forbidden: Vec<ForbiddenRule>,
    allowed: BTreeMap<String, BTreeMap<String, PolicyRule>>,
}

impl SecurityPolicy {
    /// Policy with the built-in kubectl/helm tables
    pub fn standard() -> Self {
        let forbidden = FORBIDDEN_PATTERNS
            .iter()
            .map(|p| ForbiddenRule::new(p).expect("built-in forbidden pattern compiles"))
            .collect();

        let mut policy = Self {
            forbidden,
            allowed: BTreeMap::new(),
        };
        for (tool, subcommand, pattern) in ALLOWED_COMMANDS {
            let rule = PolicyRule::new(*tool, *subcommand, pattern)
                .expect("built-in allow pattern compiles");
            policy.insert_rule(rule);
        }
        policy
    }

    /// Standard policy plus extra forbidden patterns appended to the table
    pub fn with_extra_forbidden(patterns: &[String]) -> GovernorResult<Self> {
        let mut policy = Self::standard();
        for pattern in patterns {
            policy.forbidden.push(ForbiddenRule::new(pattern)?);
        }
        Ok(policy)
    }

    fn insert_rule(&mut self, rule: PolicyRule) {
        self.allowed
            .entry(rule.tool.clone())
            .or_default()
            .insert(rule.subcommand.clone(), rule);
    }

    /// Known tools and their subcommands
    pub fn capabilities(&self) -> BTreeMap<String, Vec<String>> {
        self.allowed
            .iter()
            .map(|(tool, rules)| (tool.clone(), rules.keys().cloned().collect()))
            .collect()
    }

    /// First forbidden rule the command matches
    pub fn forbidden_match(&self, command: &str) -> Option<&ForbiddenRule> {
        self.forbidden.iter().find(|rule| rule.matches(command))
    }

    /// Forbidden table only, applied in every mode
    pub fn screen(&self, command: &str) -> Verdict {
        match self.forbidden_match(command) {
            Some(rule) => Verdict::Reject(format!(
                "Command matches forbidden pattern: {}",
                rule.pattern()
            )),
            None => Verdict::Accept,
        }
    }

    /// Evaluate a single command under the given mode
    pub fn evaluate(&self, command: &str, mode: SecurityMode) -> Verdict {
        let screened = self.screen(command);
        if !screened.is_accepted() || mode == SecurityMode::Permissive {
            return screened;
        }

        if let Some(op) = command.chars().find(|c| STRICT_SHELL_OPERATORS.contains(c)) {
            return Verdict::Reject(format!("Shell operator {} not allowed in strict mode", op));
        }

        let parts: Vec<&str> = command.split_whitespace().collect();
        let Some(tool) = parts.first() else {
            return Verdict::Reject("Empty command".to_string());
        };

        let Some(subcommands) = self.allowed.get(*tool) else {
            return Verdict::Reject(format!("Tool {} not allowed", tool));
        };

        let Some(subcommand) = parts.get(1) else {
            return Verdict::Reject("Command too short".to_string());
        };

        let Some(rule) = subcommands.get(*subcommand) else {
            return Verdict::Reject(format!(
                "Subcommand {} not allowed for {}",
                subcommand, tool
            ));
        };

        if rule.matches(command) {
            return Verdict::Accept;
        }

        if *tool == KUBECTL && *subcommand == "get" {
            let lowered = command.to_lowercase();
            if !GET_RESOURCES.iter().any(|resource| lowered.contains(resource)) {
                return Verdict::Reject(format!(
                    "Command must specify a valid resource type ({})",
                    GET_RESOURCES.join(", ")
                ));
            }
            if !["--all-namespaces", "-n"].iter().any(|flag| command.contains(flag)) {
                return Verdict::Reject(
                    "Command must include either --all-namespaces or -n <namespace>".to_string(),
                );
            }
        }

        Verdict::Reject(format!(
            "Command does not match allowed pattern: {}",
            rule.pattern()
        ))
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
