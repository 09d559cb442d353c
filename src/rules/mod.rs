//! Rules shipped with rubric and the loader for declarative rule files

pub mod pattern_rule;
pub mod service_base;

pub use pattern_rule::{
    load_rules_from_dir, load_rules_from_file, FixDefinition, PatternRule, PatternRuleDef,
    RuleFile, RuleLoadError,
};
pub use service_base::IncludeServiceBase;

use crate::config::Config;
use crate::rule::RuleSet;

/// Built-in rules, with their options taken from `config`
pub fn builtin_rules(config: &Config) -> RuleSet {
    RuleSet::new().with(IncludeServiceBase::new(config.service_base.clone()))
}

/// Built-in rules plus every rule file in the configured rule directories,
/// filtered and re-graded by the rules section of `config`
pub fn load_rules(config: &Config) -> Result<RuleSet, RuleLoadError> {
    let mut rules = builtin_rules(config);
    for dir in &config.rules.rule_dirs {
        for rule in load_rules_from_dir(dir)? {
            rules.register(Box::new(rule));
        }
    }
    Ok(rules.configure(config))
}
