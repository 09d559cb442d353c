//! Repeated fix passes over one buffer
//!
//! A correction can expose a new violation (or unblock one that conflicted),
//! so the fixer re-parses and re-evaluates the corrected text until a pass
//! applies nothing, bounded by [`MAX_FIX_PASSES`].

use crate::diagnostic::{FixStatus, Finding};
use crate::engine::{self, merge_timings, EngineError, RuleTiming};
use crate::frontend::{Frontend, ParseError};
use crate::rule::RuleSet;
use crate::source::Source;
use std::collections::HashMap;
use thiserror::Error;

/// Upper bound on parse/evaluate/apply rounds per buffer
pub const MAX_FIX_PASSES: usize = 8;

/// What the linter does with corrections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixMode {
    /// Report findings only
    #[default]
    Report,
    /// Apply corrections and write files
    Apply,
    /// Run fix passes but leave files untouched
    DryRun,
}

/// Fix passes could not start
#[derive(Debug, Error)]
pub enum FixError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result of fixing one buffer
#[derive(Debug, Default)]
pub struct FixOutcome {
    /// Final text after every pass
    pub text: String,
    /// Passes that changed the text
    pub passes: usize,
    /// Findings whose corrections were applied, across all passes
    pub applied: Vec<Finding>,
    /// Findings still present in the final text
    pub remaining: Vec<Finding>,
    /// Per-rule timing statistics over all passes
    pub timings: HashMap<String, RuleTiming>,
}

impl FixOutcome {
    pub fn is_changed(&self) -> bool {
        self.passes > 0
    }
}

/// Apply corrections to `text` until nothing more applies.
///
/// The first parse failure is an error. If a later pass produces text the
/// front end cannot parse, that pass is discarded and the last good text kept.
pub fn fix_source(
    frontend: &dyn Frontend,
    rules: &RuleSet,
    text: &str,
) -> Result<FixOutcome, FixError> {
    let mut outcome = FixOutcome {
        text: text.to_string(),
        ..FixOutcome::default()
    };
    let mut tree = frontend.parse(text)?;

    loop {
        let source = Source::new(outcome.text.as_str());
        let evaluation = engine::evaluate(rules, &tree, &source)?;
        merge_timings(&mut outcome.timings, evaluation.timings);

        let next = match evaluation.corrected_text {
            Some(next) if outcome.passes < MAX_FIX_PASSES => next,
            Some(_) => {
                log::warn!(
                    "corrections still pending after {} passes, giving up",
                    MAX_FIX_PASSES
                );
                outcome.remaining = unapplied(evaluation.findings);
                break;
            }
            None => {
                outcome.remaining = evaluation.findings;
                break;
            }
        };

        match frontend.parse(&next) {
            Ok(next_tree) => {
                let (applied, _): (Vec<Finding>, Vec<Finding>) = evaluation
                    .findings
                    .into_iter()
                    .partition(|f| f.fix_status == FixStatus::Applied);
                outcome.applied.extend(applied);
                outcome.passes += 1;
                outcome.text = next;
                tree = next_tree;
                log::debug!("fix pass {} applied", outcome.passes);
            }
            Err(err) => {
                log::warn!(
                    "corrected text no longer parses ({}), keeping the text of pass {}",
                    err,
                    outcome.passes
                );
                outcome.remaining = unapplied(evaluation.findings);
                break;
            }
        }
    }

    Ok(outcome)
}

/// Findings of a discarded pass: nothing of it reached the text
fn unapplied(findings: Vec<Finding>) -> Vec<Finding> {
    findings
        .into_iter()
        .map(|mut finding| {
            if finding.fix_status == FixStatus::Applied {
                finding.fix_status = FixStatus::None;
            }
            finding
        })
        .collect()
}
