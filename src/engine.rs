//! Core engine: evaluation of one buffer, correction resolution and file linting

use crate::config::Config;
use crate::diagnostic::{Diagnostic, FixStatus, Finding, Location, Severity};
use crate::edit::{self, Edit, EditError};
use crate::fixer::{self, FixError, FixMode};
use crate::frontend::Frontend;
use crate::rule::RuleSet;
use crate::source::Source;
use crate::tree::{Tree, TreeError};
use crate::walker;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Fatal evaluation failure; no findings and no corrected text are produced
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed syntax tree: {0}")]
    MalformedTree(#[from] TreeError),

    #[error("failed to apply corrections: {0}")]
    Edit(#[from] EditError),
}

/// Per-rule timing statistics
#[derive(Debug, Clone, Default)]
pub struct RuleTiming {
    /// Rule ID
    pub rule_id: String,
    /// Total time spent on this rule
    pub total_time: Duration,
    /// Number of times the rule was evaluated
    pub evaluation_count: usize,
    /// Number of diagnostics it produced
    pub match_count: usize,
}

impl RuleTiming {
    pub fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            ..Default::default()
        }
    }

    /// Average time per evaluation
    pub fn avg_time(&self) -> Duration {
        if self.evaluation_count > 0 {
            self.total_time / self.evaluation_count as u32
        } else {
            Duration::ZERO
        }
    }
}

/// Fold `other` timings into `into`
pub fn merge_timings(into: &mut HashMap<String, RuleTiming>, other: HashMap<String, RuleTiming>) {
    for (rule_id, timing) in other {
        let entry = into
            .entry(rule_id)
            .or_insert_with(|| RuleTiming::new(&timing.rule_id));
        entry.total_time += timing.total_time;
        entry.evaluation_count += timing.evaluation_count;
        entry.match_count += timing.match_count;
    }
}

/// Outcome of evaluating one buffer
#[derive(Debug, Default)]
pub struct Evaluation {
    /// One finding per diagnostic, in walker order
    pub findings: Vec<Finding>,
    /// Corrected text, present only if at least one correction was applied
    pub corrected_text: Option<String>,
    /// Per-rule timing statistics
    pub timings: HashMap<String, RuleTiming>,
}

impl Evaluation {
    pub fn applied_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.fix_status == FixStatus::Applied)
            .count()
    }
}

/// Run every rule over `tree`, resolve corrections and apply them to `source`
pub fn evaluate(rules: &RuleSet, tree: &Tree, source: &Source) -> Result<Evaluation, EngineError> {
    let walk = walker::walk(rules, tree, source)?;
    let (findings, corrected_text) = resolve(walk.diagnostics, source)?;
    Ok(Evaluation {
        findings,
        corrected_text,
        timings: walk.timings,
    })
}

/// One distinct edit and the findings whose corrections contain it
struct OwnedEdit {
    edit: Edit,
    owners: Vec<usize>,
}

/// Turn diagnostics into findings and apply every correction that is safe to apply.
///
/// A correction whose own edits overlap or fall outside the text is dropped
/// (`Invalid`). Byte-identical edits from different diagnostics are merged.
/// Any other overlap between corrections marks every owner `Conflict` and
/// none of their edits are applied.
fn resolve(
    diagnostics: Vec<Diagnostic>,
    source: &Source,
) -> Result<(Vec<Finding>, Option<String>), EngineError> {
    let mut findings = Vec::with_capacity(diagnostics.len());
    let mut owned: Vec<OwnedEdit> = Vec::new();
    let mut by_edit: HashMap<Edit, Vec<usize>> = HashMap::new();
    let mut corrected: Vec<usize> = Vec::new();

    for diagnostic in diagnostics {
        let index = findings.len();
        let mut finding = Finding::from_diagnostic(&diagnostic, source);

        if let Some(correction) = diagnostic.correction {
            let edits = correction.into_edits();
            match check_correction(source.text(), &edits) {
                Err(err) => {
                    log::warn!(
                        "dropping correction of '{}' at {}: {}",
                        finding.rule_id,
                        diagnostic.span,
                        err
                    );
                    finding.fix_status = FixStatus::Invalid;
                }
                Ok(()) if edits.is_empty() => {}
                Ok(()) => {
                    corrected.push(index);
                    for edit in edits {
                        let slots = by_edit.entry(edit.clone()).or_default();
                        let shared = slots
                            .iter()
                            .copied()
                            .find(|&slot| !owned[slot].owners.contains(&index));
                        match shared {
                            Some(slot) => owned[slot].owners.push(index),
                            None => {
                                slots.push(owned.len());
                                owned.push(OwnedEdit {
                                    edit,
                                    owners: vec![index],
                                });
                            }
                        }
                    }
                }
            }
        }

        findings.push(finding);
    }

    if corrected.is_empty() {
        return Ok((findings, None));
    }

    let edits: Vec<Edit> = owned.iter().map(|o| o.edit.clone()).collect();
    let mut conflicted = vec![false; findings.len()];
    for (first, second) in edit::find_conflicts(&edits) {
        for &owner in owned[first].owners.iter().chain(&owned[second].owners) {
            conflicted[owner] = true;
        }
    }

    let accepted: Vec<Edit> = owned
        .iter()
        .filter(|o| o.owners.iter().any(|&owner| !conflicted[owner]))
        .map(|o| o.edit.clone())
        .collect();

    for index in corrected {
        findings[index].fix_status = if conflicted[index] {
            FixStatus::Conflict
        } else {
            FixStatus::Applied
        };
    }

    if accepted.is_empty() {
        return Ok((findings, None));
    }

    log::debug!("applying {} edits", accepted.len());
    let text = edit::apply(source.text(), &accepted)?;
    Ok((findings, Some(text)))
}

/// Validate the edits of a single correction on their own
fn check_correction(text: &str, edits: &[Edit]) -> Result<(), EditError> {
    edit::check_bounds(text, edits)?;
    if let Some(&(first, second)) = edit::find_conflicts(edits).first() {
        return Err(EditError::Conflict {
            first: edits[first].clone(),
            second: edits[second].clone(),
        });
    }
    Ok(())
}

/// Result of linting operation
#[derive(Debug, Default)]
pub struct LintResult {
    /// All findings
    pub findings: Vec<Finding>,

    /// Files processed
    pub files_processed: usize,

    /// Files with errors
    pub files_with_errors: usize,

    /// Files with warnings
    pub files_with_warnings: usize,

    /// Total errors still needing attention
    pub error_count: usize,

    /// Total warnings still needing attention
    pub warning_count: usize,

    /// Total info messages still needing attention
    pub info_count: usize,

    /// Findings whose correction could be applied
    pub fixable_count: usize,

    /// Corrections applied (or that would be applied in dry-run)
    pub fixes_applied: usize,

    /// Files rewritten (or that would be rewritten in dry-run)
    pub files_fixed: usize,

    /// Processing duration
    pub duration: Duration,

    /// Per-rule timing statistics (rule_id -> timing)
    pub rule_timings: HashMap<String, RuleTiming>,
}

impl LintResult {
    /// Result for one file from its findings
    pub fn from_findings(findings: Vec<Finding>) -> Self {
        let mut result = LintResult {
            files_processed: 1,
            ..LintResult::default()
        };

        for finding in &findings {
            if finding.fix_status == FixStatus::Applied {
                result.fixes_applied += 1;
                continue;
            }
            if finding.fixable && finding.fix_status == FixStatus::None {
                result.fixable_count += 1;
            }
            match finding.severity {
                Severity::Error => result.error_count += 1,
                Severity::Warning => result.warning_count += 1,
                Severity::Info => result.info_count += 1,
            }
        }

        if result.error_count > 0 {
            result.files_with_errors = 1;
        }
        if result.warning_count > 0 {
            result.files_with_warnings = 1;
        }

        result.findings = findings;
        result
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
    }

    /// Check if result is clean (no errors or warnings)
    pub fn is_clean(&self) -> bool {
        self.error_count == 0 && self.warning_count == 0
    }

    /// Get exit code (0 = success, 1 = warnings, 2 = errors)
    pub fn exit_code(&self) -> i32 {
        if self.error_count > 0 {
            2
        } else if self.warning_count > 0 {
            1
        } else {
            0
        }
    }

    /// Merge another result into this one
    pub fn merge(&mut self, other: LintResult) {
        self.findings.extend(other.findings);
        self.files_processed += other.files_processed;
        self.files_with_errors += other.files_with_errors;
        self.files_with_warnings += other.files_with_warnings;
        self.error_count += other.error_count;
        self.warning_count += other.warning_count;
        self.info_count += other.info_count;
        self.fixable_count += other.fixable_count;
        self.fixes_applied += other.fixes_applied;
        self.files_fixed += other.files_fixed;
        merge_timings(&mut self.rule_timings, other.rule_timings);
    }

    /// Get rule timings sorted by total time (descending)
    pub fn sorted_timings(&self) -> Vec<&RuleTiming> {
        let mut timings: Vec<_> = self.rule_timings.values().collect();
        timings.sort_by(|a, b| {
            b.total_time
                .cmp(&a.total_time)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });
        timings
    }

    /// Format timing statistics as a string
    pub fn format_timings(&self) -> String {
        let timings = self.sorted_timings();
        if timings.is_empty() {
            return "No timing data available".to_string();
        }

        let mut output = String::from("Rule Timing Statistics:\n");
        output.push_str(&format!(
            "{:<40} {:>12} {:>12} {:>10} {:>12}\n",
            "Rule ID", "Total", "Avg", "Evals", "Matches"
        ));
        output.push_str(&"-".repeat(90));
        output.push('\n');

        for timing in timings {
            let total_ms = timing.total_time.as_secs_f64() * 1000.0;
            let avg_us = timing.avg_time().as_secs_f64() * 1_000_000.0;
            output.push_str(&format!(
                "{:<40} {:>10.2}ms {:>10.2}µs {:>10} {:>12}\n",
                timing.rule_id, total_ms, avg_us, timing.evaluation_count, timing.match_count
            ));
        }

        output
    }
}

/// Lints files on disk: picks a front end by file name, evaluates, optionally fixes
pub struct Linter {
    config: Config,
    rules: RuleSet,
    /// Registered front ends (keyed by extension or exact file name)
    frontends: HashMap<String, Arc<dyn Frontend>>,
    fix_mode: FixMode,
}

impl Linter {
    pub fn new(config: Config, rules: RuleSet) -> Self {
        Self {
            config,
            rules,
            frontends: HashMap::new(),
            fix_mode: FixMode::default(),
        }
    }

    pub fn with_fix_mode(mut self, mode: FixMode) -> Self {
        self.fix_mode = mode;
        self
    }

    /// Register a front end for its extensions and file names
    pub fn register_frontend(&mut self, frontend: Arc<dyn Frontend>) {
        for key in frontend.extensions().iter().chain(frontend.file_names()) {
            self.frontends.insert(key.to_string(), Arc::clone(&frontend));
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Front end responsible for a path
    pub fn frontend_for(&self, path: &Path) -> Option<Arc<dyn Frontend>> {
        let by_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| self.frontends.get(n));
        let by_ext = || {
            path.extension()
                .and_then(|e| e.to_str())
                .and_then(|e| self.frontends.get(e))
        };
        by_name.or_else(by_ext).cloned()
    }

    /// Lint multiple files
    pub fn lint(&self, files: &[PathBuf]) -> LintResult {
        let start = Instant::now();

        let results: Vec<LintResult> = if self.config.engine.parallel && files.len() > 1 {
            let jobs = if self.config.engine.jobs > 0 {
                self.config.engine.jobs
            } else {
                num_cpus::get()
            };
            match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
                Ok(pool) => pool.install(|| files.par_iter().map(|f| self.lint_file(f)).collect()),
                Err(err) => {
                    log::warn!(
                        "failed to start {} worker threads ({}), linting sequentially",
                        jobs,
                        err
                    );
                    files.iter().map(|f| self.lint_file(f)).collect()
                }
            }
        } else {
            files.iter().map(|f| self.lint_file(f)).collect()
        };

        let mut combined = LintResult::default();
        for result in results {
            combined.merge(result);
        }

        combined.duration = start.elapsed();
        combined
    }

    /// Lint a single file
    pub fn lint_file(&self, path: &Path) -> LintResult {
        let Some(frontend) = self.frontend_for(path) else {
            log::debug!("no front end for {}, skipping", path.display());
            return LintResult::default();
        };

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                return file_failure(
                    "file-read-error",
                    &format!("Failed to read file: {}", e),
                    Location::new(path.to_path_buf(), 0, 0),
                )
            }
        };

        let mut result = match self.fix_mode {
            FixMode::Report => self.lint_text(frontend.as_ref(), &content, path),
            FixMode::Apply | FixMode::DryRun => self.fix_text(frontend.as_ref(), &content, path),
        };
        for finding in &mut result.findings {
            finding.location.file = path.to_path_buf();
        }
        result
    }

    /// Report-only evaluation of one buffer
    fn lint_text(&self, frontend: &dyn Frontend, content: &str, path: &Path) -> LintResult {
        let tree = match frontend.parse(content) {
            Ok(tree) => tree,
            Err(e) => return parse_failure(&e, path),
        };

        let source = Source::new(content);
        match evaluate(&self.rules, &tree, &source) {
            Ok(evaluation) => {
                let findings = evaluation
                    .findings
                    .into_iter()
                    .map(|mut finding| {
                        // Nothing is written in report mode
                        if finding.fix_status == FixStatus::Applied {
                            finding.fix_status = FixStatus::None;
                        }
                        finding
                    })
                    .collect();
                let mut result = LintResult::from_findings(findings);
                result.rule_timings = evaluation.timings;
                result
            }
            Err(e) => file_failure(
                "engine-error",
                &e.to_string(),
                Location::new(path.to_path_buf(), 0, 0),
            ),
        }
    }

    /// Fix passes over one buffer, writing the file unless in dry-run
    fn fix_text(&self, frontend: &dyn Frontend, content: &str, path: &Path) -> LintResult {
        let outcome = match fixer::fix_source(frontend, &self.rules, content) {
            Ok(outcome) => outcome,
            Err(FixError::Parse(e)) => return parse_failure(&e, path),
            Err(FixError::Engine(e)) => {
                return file_failure(
                    "engine-error",
                    &e.to_string(),
                    Location::new(path.to_path_buf(), 0, 0),
                )
            }
        };

        let changed = outcome.is_changed();
        if changed && self.fix_mode == FixMode::Apply {
            if let Err(e) = std::fs::write(path, &outcome.text) {
                return file_failure(
                    "file-write-error",
                    &format!("Failed to write fixes: {}", e),
                    Location::new(path.to_path_buf(), 0, 0),
                );
            }
            log::debug!("wrote {} after {} fix passes", path.display(), outcome.passes);
        }

        let mut findings = outcome.applied;
        findings.extend(outcome.remaining);
        let mut result = LintResult::from_findings(findings);
        result.files_fixed = usize::from(changed);
        result.rule_timings = outcome.timings;
        result
    }
}

/// A file that could not be linted at all
fn file_failure(rule_id: &str, message: &str, location: Location) -> LintResult {
    LintResult::from_findings(vec![Finding::file_level(rule_id, message, location)])
}

fn parse_failure(error: &crate::frontend::ParseError, path: &Path) -> LintResult {
    let (line, column) = error.position().unwrap_or((0, 0));
    file_failure(
        "parse-error",
        &format!("Parse error: {}", error),
        Location::new(path.to_path_buf(), line, column),
    )
}
