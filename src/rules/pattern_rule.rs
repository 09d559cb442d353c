//! Declarative rules: a pattern, a message template and an optional fix,
//! loaded from YAML or JSON rule files
//!
//! ```yaml
//! rules:
//!   - id: no-puts
//!     description: Use the logger instead of puts
//!     severity: warning
//!     pattern: (send nil :puts $arg)
//!     message: "puts {arg}: use Rails.logger"
//!     fix:
//!       replacement: "Rails.logger.info({arg})"
//! ```

use crate::diagnostic::{Diagnostic, Severity};
use crate::pattern::{Captured, Captures, Pattern, PatternError};
use crate::rule::{Interest, Rule};
use crate::source::Span;
use crate::tree::NodeRef;
use crate::walker::Context;
use regex::{Captures as RegexCaptures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Target name that refers to the whole matched node
pub const NODE_TARGET: &str = "node";

/// Error loading rules
#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Invalid pattern in rule '{rule}': {source}")]
    Pattern {
        rule: String,
        #[source]
        source: PatternError,
    },

    #[error("Invalid rule: {0}")]
    Invalid(String),
}

/// Text replacement applied to a matched node or one of its captures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixDefinition {
    /// Capture name to replace, or "node" for the whole match
    #[serde(default = "default_target")]
    pub target: String,

    /// Replacement template (can contain `{capture}` placeholders)
    pub replacement: String,
}

fn default_target() -> String {
    NODE_TARGET.to_string()
}

fn default_true() -> bool {
    true
}

/// A rule as written in a rule file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRuleDef {
    /// Unique rule identifier
    pub id: String,

    /// Detailed description
    #[serde(default)]
    pub description: Option<String>,

    /// Default severity level
    #[serde(default)]
    pub severity: Severity,

    /// Pattern in the s-expression syntax
    pub pattern: String,

    /// Message template (can contain `{capture}` placeholders)
    pub message: String,

    /// Suggested fix (optional)
    #[serde(default)]
    pub fix: Option<FixDefinition>,

    /// Whether this rule is loaded at all
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Rule file format (for loading from YAML/JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFile {
    /// File format version
    #[serde(default)]
    pub version: Option<String>,

    /// Rules defined in this file
    pub rules: Vec<PatternRuleDef>,
}

/// A compiled declarative rule
#[derive(Debug)]
pub struct PatternRule {
    def: PatternRuleDef,
    description: String,
    pattern: Pattern,
    interest: Interest,
    placeholder: Regex,
}

impl PatternRule {
    /// Compile a rule definition
    pub fn from_def(def: PatternRuleDef) -> Result<Self, RuleLoadError> {
        if def.id.trim().is_empty() {
            return Err(RuleLoadError::Invalid("rule id must not be empty".to_string()));
        }

        let pattern = Pattern::parse(&def.pattern).map_err(|source| RuleLoadError::Pattern {
            rule: def.id.clone(),
            source,
        })?;

        let names = pattern.capture_names();
        if let Some(fix) = &def.fix {
            if fix.target != NODE_TARGET && !names.contains(&fix.target.as_str()) {
                return Err(RuleLoadError::Invalid(format!(
                    "rule '{}' fixes unknown capture '{}'",
                    def.id, fix.target
                )));
            }
        }

        let interest = match pattern.kind_matcher().kinds() {
            Some(kinds) => Interest::Kinds(kinds),
            None => Interest::All,
        };
        let placeholder = Regex::new(r"\{(\w+)\}")
            .map_err(|e| RuleLoadError::Invalid(e.to_string()))?;
        let description = def.description.clone().unwrap_or_else(|| def.message.clone());

        Ok(Self {
            def,
            description,
            pattern,
            interest,
            placeholder,
        })
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Replace `{name}` with the source text of the capture (or the match for `{node}`).
    /// Unknown placeholders are kept as written.
    fn render(&self, template: &str, node: NodeRef<'_>, captures: &Captures<'_>, ctx: &Context<'_>) -> String {
        self.placeholder
            .replace_all(template, |caps: &RegexCaptures<'_>| {
                let name = &caps[1];
                if name == NODE_TARGET {
                    return ctx.text_of(node).to_string();
                }
                match captures.get(name) {
                    Some(Captured::Node(captured)) => ctx.text_of(captured).to_string(),
                    Some(Captured::Atom(atom)) => atom.text.clone(),
                    Some(Captured::Nil) => String::new(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Source span the fix replaces
    fn target_span(&self, target: &str, node: NodeRef<'_>, captures: &Captures<'_>) -> Option<Span> {
        if target == NODE_TARGET {
            return Some(node.span());
        }
        match captures.get(target)? {
            Captured::Node(captured) => Some(captured.span()),
            Captured::Atom(atom) => atom.span,
            Captured::Nil => None,
        }
    }
}

impl Rule for PatternRule {
    fn id(&self) -> &str {
        &self.def.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn severity(&self) -> Severity {
        self.def.severity
    }

    fn interests(&self) -> Interest {
        self.interest.clone()
    }

    fn check<'t>(&self, node: NodeRef<'t>, ctx: &Context<'t>) -> Vec<Diagnostic> {
        let Some(captures) = self.pattern.matches(node) else {
            return Vec::new();
        };

        let message = self.render(&self.def.message, node, &captures, ctx);
        let mut diagnostic = Diagnostic::new(node.span(), message);

        if let Some(fix) = &self.def.fix {
            match self.target_span(&fix.target, node, &captures) {
                Some(span) => {
                    let replacement = self.render(&fix.replacement, node, &captures, ctx);
                    diagnostic = diagnostic.with_correction(move |c| c.replace(span, replacement));
                }
                None => log::debug!(
                    "{}: fix target '{}' has no source span, reporting without a fix",
                    self.def.id,
                    fix.target
                ),
            }
        }

        vec![diagnostic]
    }
}

/// Load and compile the enabled rules of one rule file
pub fn load_rules_from_file(path: &Path) -> Result<Vec<PatternRule>, RuleLoadError> {
    let content = std::fs::read_to_string(path)?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let parse_error = |message: String| RuleLoadError::Parse {
        file: path.display().to_string(),
        message,
    };
    let rule_file: RuleFile = match ext {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
        "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
        _ => {
            return Err(RuleLoadError::Invalid(format!(
                "Unsupported rule file format: {}",
                ext
            )))
        }
    };

    rule_file
        .rules
        .into_iter()
        .filter(|def| def.enabled)
        .map(PatternRule::from_def)
        .collect()
}

/// Load every `.yaml`, `.yml` and `.json` rule file in `dir`, in file name order
pub fn load_rules_from_dir(dir: &Path) -> Result<Vec<PatternRule>, RuleLoadError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if matches!(ext, "yaml" | "yml" | "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut rules = Vec::new();
    for path in paths {
        let loaded = load_rules_from_file(&path)?;
        log::debug!("loaded {} rules from {}", loaded.len(), path.display());
        rules.extend(loaded);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::evaluate;
    use crate::rule::RuleSet;
    use crate::ruby;
    use crate::source::Source;
    use tempfile::TempDir;

    const RULES_YAML: &str = r#"
version: "1"
rules:
  - id: no-puts
    description: Use the logger instead of puts
    pattern: (send nil :puts $arg)
    message: "puts {arg}: use the logger"
    fix:
      replacement: "logger.info({arg})"
  - id: no-sleep
    severity: error
    pattern: (send nil :sleep ...)
    message: "do not sleep in {node}"
  - id: disabled-rule
    pattern: (send nil :p ...)
    message: disabled
    enabled: false
"#;

    fn def(pattern: &str, message: &str) -> PatternRuleDef {
        PatternRuleDef {
            id: "test-rule".to_string(),
            description: None,
            severity: Severity::Warning,
            pattern: pattern.to_string(),
            message: message.to_string(),
            fix: None,
            enabled: true,
        }
    }

    #[test]
    fn test_rule_file_deserialize() {
        let file: RuleFile = serde_yaml::from_str(RULES_YAML).unwrap();
        assert_eq!(file.version.as_deref(), Some("1"));
        assert_eq!(file.rules.len(), 3);
        assert_eq!(file.rules[0].severity, Severity::Warning);
        assert_eq!(file.rules[1].severity, Severity::Error);
        assert_eq!(file.rules[0].fix.as_ref().unwrap().target, NODE_TARGET);
        assert!(!file.rules[2].enabled);
    }

    #[test]
    fn test_interest_follows_kind_matcher() {
        let rule = PatternRule::from_def(def("({def defs} ...)", "m")).unwrap();
        assert_eq!(rule.interests(), Interest::kinds(["def", "defs"]));

        let rule = PatternRule::from_def(def("(_ ...)", "m")).unwrap();
        assert_eq!(rule.interests(), Interest::All);
    }

    #[test]
    fn test_invalid_definitions() {
        let err = PatternRule::from_def(def("(send", "m")).unwrap_err();
        assert!(matches!(err, RuleLoadError::Pattern { ref rule, .. } if rule == "test-rule"));

        let mut bad_target = def("(send nil :puts $arg)", "m");
        bad_target.fix = Some(FixDefinition {
            target: "missing".to_string(),
            replacement: String::new(),
        });
        assert!(matches!(
            PatternRule::from_def(bad_target),
            Err(RuleLoadError::Invalid(_))
        ));

        let mut no_id = def("(send ...)", "m");
        no_id.id = " ".to_string();
        assert!(matches!(PatternRule::from_def(no_id), Err(RuleLoadError::Invalid(_))));
    }

    #[test]
    fn test_message_and_fix_templates() {
        let text = "puts \"hi\"\nsleep 1\n";
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, RULES_YAML).unwrap();

        let mut rules = RuleSet::new();
        for rule in load_rules_from_file(&path).unwrap() {
            rules.register(Box::new(rule));
        }
        assert_eq!(rules.ids(), vec!["no-puts", "no-sleep"]);

        let tree = ruby::parse(text).unwrap();
        let eval = evaluate(&rules, &tree, &Source::new(text)).unwrap();
        assert_eq!(eval.findings.len(), 2);
        assert_eq!(eval.findings[0].message, "puts \"hi\": use the logger");
        assert_eq!(eval.findings[1].message, "do not sleep in sleep 1");
        assert!(eval.findings[1].is_error());
        assert_eq!(
            eval.corrected_text.as_deref(),
            Some("logger.info(\"hi\")\nsleep 1\n")
        );
    }

    #[test]
    fn test_capture_target_and_unknown_placeholder() {
        let mut rule = def("(send nil :require $lib)", "{lib} {other}");
        rule.fix = Some(FixDefinition {
            target: "lib".to_string(),
            replacement: "'json'".to_string(),
        });
        let rules = RuleSet::new().with(PatternRule::from_def(rule).unwrap());

        let text = "require 'yaml'\n";
        let tree = ruby::parse(text).unwrap();
        let eval = evaluate(&rules, &tree, &Source::new(text)).unwrap();
        assert_eq!(eval.findings[0].message, "'yaml' {other}");
        assert_eq!(eval.corrected_text.as_deref(), Some("require 'json'\n"));
    }

    #[test]
    fn test_load_rules_from_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.yaml"), RULES_YAML).unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"rules": [{"id": "no-eval", "pattern": "(send nil :eval ...)", "message": "no eval"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let rules = load_rules_from_dir(dir.path()).unwrap();
        let ids: Vec<&str> = rules.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["no-eval", "no-puts", "no-sleep"]);
    }

    #[test]
    fn test_load_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "rules: [").unwrap();
        assert!(matches!(
            load_rules_from_file(&path),
            Err(RuleLoadError::Parse { .. })
        ));

        let path = dir.path().join("rules.toml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(load_rules_from_file(&path), Err(RuleLoadError::Invalid(_))));

        assert!(matches!(
            load_rules_from_dir(&dir.path().join("missing")),
            Err(RuleLoadError::Io(_))
        ));
    }
}
