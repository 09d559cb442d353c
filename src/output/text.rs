//! Human-readable text output formatter

use super::OutputFormatter;
use crate::diagnostic::{Finding, FixStatus, Severity};
use crate::engine::LintResult;
use colored::*;
use std::collections::BTreeMap;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show the source line with an underline
    pub show_source: bool,

    /// Show what happened to each correction
    pub show_fixes: bool,

    /// Show statistics
    pub show_stats: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_source: true,
            show_fixes: true,
            show_stats: true,
        }
    }
}

impl TextFormatter {
    /// Create a new text formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    fn paint(&self, text: String, style: fn(String) -> ColoredString) -> String {
        if self.colored {
            style(text).to_string()
        } else {
            text
        }
    }

    fn severity_str(&self, severity: Severity) -> String {
        let s = severity.to_string();
        if !self.colored {
            return s;
        }
        match severity {
            Severity::Error => s.red().bold().to_string(),
            Severity::Warning => s.yellow().bold().to_string(),
            Severity::Info => s.blue().to_string(),
        }
    }

    fn fix_marker(&self, finding: &Finding) -> Option<String> {
        let marker = match finding.fix_status {
            FixStatus::Applied => self.paint("[corrected]".to_string(), |s| s.green()),
            FixStatus::Conflict | FixStatus::Invalid => {
                self.paint(format!("[{}]", finding.fix_status), |s| s.red())
            }
            FixStatus::None if finding.fixable => {
                self.paint("[correctable]".to_string(), |s| s.cyan())
            }
            FixStatus::None => return None,
        };
        Some(marker)
    }

    fn count(&self, n: usize, singular: &str, plural: &str, style: fn(String) -> ColoredString) -> String {
        let s = format!("{} {}", n, if n == 1 { singular } else { plural });
        self.paint(s, style)
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, result: &LintResult) -> String {
        let mut output = String::new();

        // Group findings by file
        let mut by_file: BTreeMap<_, Vec<_>> = BTreeMap::new();
        for finding in &result.findings {
            by_file
                .entry(finding.location.file.clone())
                .or_default()
                .push(finding);
        }

        for (file, findings) in &by_file {
            output.push_str(&self.paint(file.display().to_string(), |s| s.underline()));
            output.push('\n');
            for finding in findings {
                output.push_str(&self.format_finding(finding));
            }
            output.push('\n');
        }

        if self.show_stats {
            output.push_str(&format!(
                "{} {} inspected",
                result.files_processed,
                if result.files_processed == 1 { "file" } else { "files" }
            ));

            let mut counts = Vec::new();
            if result.error_count > 0 {
                counts.push(self.count(result.error_count, "error", "errors", |s| s.red()));
            }
            if result.warning_count > 0 {
                counts.push(self.count(result.warning_count, "warning", "warnings", |s| s.yellow()));
            }
            if result.info_count > 0 {
                counts.push(self.count(result.info_count, "info", "infos", |s| s.blue()));
            }
            if counts.is_empty() {
                counts.push(self.paint("no offenses".to_string(), |s| s.green()));
            }
            output.push_str(&format!(": {}\n", counts.join(", ")));

            if result.fixes_applied > 0 {
                output.push_str(&format!(
                    "{} in {} {}\n",
                    self.count(result.fixes_applied, "offense corrected", "offenses corrected", |s| s.green()),
                    result.files_fixed,
                    if result.files_fixed == 1 { "file" } else { "files" }
                ));
            }
            if result.fixable_count > 0 {
                output.push_str(&format!(
                    "{} (run with --fix)\n",
                    self.count(result.fixable_count, "offense correctable", "offenses correctable", |s| s.cyan())
                ));
            }

            output.push_str(&format!(
                "Finished in {:.2}s\n",
                result.duration.as_secs_f64()
            ));
        }

        output
    }

    fn format_finding(&self, finding: &Finding) -> String {
        let mut output = format!(
            "{}:{}:{}: {} [{}] {}",
            finding.location.file.display(),
            finding.location.line,
            finding.location.column,
            self.severity_str(finding.severity),
            self.paint(finding.rule_id.clone(), |s| s.cyan()),
            finding.message
        );
        if self.show_fixes {
            if let Some(marker) = self.fix_marker(finding) {
                output.push(' ');
                output.push_str(&marker);
            }
        }
        output.push('\n');

        if self.show_source {
            if let Some(source) = &finding.source_line {
                let bar = self.paint("|".to_string(), |s| s.blue());
                let line_num = self.paint(format!("{:>4}", finding.location.line), |s| s.blue());
                output.push_str(&format!("{} {} {}\n", line_num, bar, source));

                // Underline up to the end of the line
                if finding.location.column > 0 {
                    let padding = finding.location.column - 1;
                    let room = source.len().saturating_sub(padding).max(1);
                    let underline = "^".repeat(finding.location.length.clamp(1, room));
                    output.push_str(&format!(
                        "     {} {}{}\n",
                        bar,
                        " ".repeat(padding),
                        self.paint(underline, |s| s.red())
                    ));
                }
            }
        }

        output
    }
}
