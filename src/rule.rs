//! Rule definition and the rule set the walker dispatches to

use crate::config::Config;
use crate::diagnostic::{Diagnostic, Severity};
use crate::tree::NodeRef;
use crate::walker::Context;
use std::collections::HashMap;
use std::fmt;

/// Node kinds a rule wants to be called for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    /// Every node
    All,
    /// Only nodes whose kind is listed
    Kinds(Vec<String>),
}

impl Interest {
    pub fn kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Interest::Kinds(kinds.into_iter().map(Into::into).collect())
    }

    pub fn accepts(&self, kind: &str) -> bool {
        match self {
            Interest::All => true,
            Interest::Kinds(kinds) => kinds.iter().any(|k| k == kind),
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interest::All => write!(f, "*"),
            Interest::Kinds(kinds) => write!(f, "{}", kinds.join(", ")),
        }
    }
}

/// A structural lint rule.
///
/// Rules are independent of each other: a rule only sees the node it is called
/// for and the read-only [`Context`], never another rule's output. `check` must
/// be a pure function of its inputs so files can be linted in parallel.
pub trait Rule: Send + Sync {
    /// Unique rule identifier (e.g., "include-service-base")
    fn id(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Default severity level
    fn severity(&self) -> Severity {
        Severity::Warning
    }

    /// Node kinds this rule is dispatched on
    fn interests(&self) -> Interest;

    /// Inspect one node and report violations
    fn check<'t>(&self, node: NodeRef<'t>, ctx: &Context<'t>) -> Vec<Diagnostic>;
}

/// A rule plus its effective severity inside a [`RuleSet`]
pub struct RegisteredRule {
    rule: Box<dyn Rule>,
    severity: Severity,
}

impl RegisteredRule {
    pub fn rule(&self) -> &dyn Rule {
        self.rule.as_ref()
    }

    pub fn id(&self) -> &str {
        self.rule.id()
    }

    /// Severity after config overrides
    pub fn severity(&self) -> Severity {
        self.severity
    }
}

impl fmt::Debug for RegisteredRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredRule")
            .field("id", &self.id())
            .field("severity", &self.severity)
            .finish()
    }
}

/// Ordered collection of rules, built explicitly by the host.
///
/// Keeps a kind -> rule index so the walker only calls interested rules.
/// Dispatch order is registration order.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<RegisteredRule>,
    by_kind: HashMap<String, Vec<usize>>,
    every_kind: Vec<usize>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule. A second rule with an already registered id is skipped.
    pub fn register(&mut self, rule: Box<dyn Rule>) -> bool {
        if self.get(rule.id()).is_some() {
            log::warn!("rule '{}' is already registered, skipping", rule.id());
            return false;
        }

        let index = self.rules.len();
        match rule.interests() {
            Interest::All => self.every_kind.push(index),
            Interest::Kinds(kinds) => {
                for kind in kinds {
                    let slots = self.by_kind.entry(kind).or_default();
                    if !slots.contains(&index) {
                        slots.push(index);
                    }
                }
            }
        }

        let severity = rule.severity();
        self.rules.push(RegisteredRule { rule, severity });
        true
    }

    /// Builder-style [`RuleSet::register`]
    pub fn with(mut self, rule: impl Rule + 'static) -> Self {
        self.register(Box::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredRule> {
        self.rules.iter().find(|r| r.id() == id)
    }

    /// Rules in registration order
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredRule> {
        self.rules.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    /// Rules interested in `kind`, in registration order
    pub fn interested(&self, kind: &str) -> Vec<&RegisteredRule> {
        let mut indices: Vec<usize> = self.every_kind.clone();
        if let Some(slots) = self.by_kind.get(kind) {
            indices.extend(slots);
        }
        indices.sort_unstable();
        indices.into_iter().map(|i| &self.rules[i]).collect()
    }

    /// Drop rules the config disables and apply severity overrides
    pub fn configure(self, config: &Config) -> Self {
        let mut configured = RuleSet::new();
        for registered in self.rules {
            let id = registered.id().to_string();
            if !config.is_rule_enabled(&id) {
                log::debug!("rule '{}' disabled by configuration", id);
                continue;
            }
            let severity = config
                .get_severity_override(&id)
                .unwrap_or(registered.severity);
            configured.register(registered.rule);
            if let Some(last) = configured.rules.last_mut() {
                last.severity = severity;
            }
        }
        configured
    }
}
