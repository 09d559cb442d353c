//! JSON output formatter

use super::OutputFormatter;
use crate::diagnostic::{Finding, FixStatus, Severity};
use crate::engine::LintResult;
use serde::Serialize;

/// JSON formatter for machine-readable output
#[derive(Default)]
pub struct JsonFormatter {
    /// Pretty print with indentation
    pub pretty: bool,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| {
            log::error!("failed to serialize JSON output: {}", e);
            String::new()
        })
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    findings: Vec<JsonFinding<'a>>,
    summary: JsonSummary,
}

#[derive(Serialize)]
struct JsonFinding<'a> {
    rule_id: &'a str,
    severity: Severity,
    message: &'a str,
    file: String,
    line: usize,
    column: usize,
    length: usize,
    start: usize,
    end: usize,
    fixable: bool,
    fix_status: FixStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_line: Option<&'a str>,
}

impl<'a> From<&'a Finding> for JsonFinding<'a> {
    fn from(f: &'a Finding) -> Self {
        Self {
            rule_id: &f.rule_id,
            severity: f.severity,
            message: &f.message,
            file: f.location.file.display().to_string(),
            line: f.location.line,
            column: f.location.column,
            length: f.location.length,
            start: f.location.span.start,
            end: f.location.span.end,
            fixable: f.fixable,
            fix_status: f.fix_status,
            source_line: f.source_line.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct JsonSummary {
    files_processed: usize,
    files_with_errors: usize,
    files_with_warnings: usize,
    error_count: usize,
    warning_count: usize,
    info_count: usize,
    fixable_count: usize,
    fixes_applied: usize,
    files_fixed: usize,
    duration_ms: u128,
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, result: &LintResult) -> String {
        let output = JsonOutput {
            findings: result.findings.iter().map(JsonFinding::from).collect(),
            summary: JsonSummary {
                files_processed: result.files_processed,
                files_with_errors: result.files_with_errors,
                files_with_warnings: result.files_with_warnings,
                error_count: result.error_count,
                warning_count: result.warning_count,
                info_count: result.info_count,
                fixable_count: result.fixable_count,
                fixes_applied: result.fixes_applied,
                files_fixed: result.files_fixed,
                duration_ms: result.duration.as_millis(),
            },
        };
        self.render(&output)
    }

    fn format_finding(&self, finding: &Finding) -> String {
        self.render(&JsonFinding::from(finding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Location;
    use crate::source::Span;
    use std::path::PathBuf;

    fn finding() -> Finding {
        Finding {
            rule_id: "include-service-base".to_string(),
            severity: Severity::Warning,
            message: "`call` must be defined as an instance method (`def call`)".to_string(),
            location: Location {
                length: 18,
                span: Span::new(38, 56),
                ..Location::new(PathBuf::from("any_service.rb"), 4, 3)
            },
            fixable: false,
            fix_status: FixStatus::None,
            source_line: None,
        }
    }

    #[test]
    fn test_json_format_finding() {
        let formatter = JsonFormatter::new();
        let output = formatter.format_finding(&finding());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["rule_id"], "include-service-base");
        assert_eq!(value["severity"], "warning");
        assert_eq!(value["line"], 4);
        assert_eq!(value["column"], 3);
        assert_eq!(value["start"], 38);
        assert_eq!(value["fix_status"], "none");
        assert!(value.get("source_line").is_none());
    }

    #[test]
    fn test_json_format_result() {
        let mut applied = finding();
        applied.fixable = true;
        applied.fix_status = FixStatus::Applied;
        let result = LintResult::from_findings(vec![finding(), applied]);

        let output = JsonFormatter::new().pretty().format(&result);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["findings"].as_array().unwrap().len(), 2);
        assert_eq!(value["findings"][1]["fix_status"], "applied");
        assert_eq!(value["summary"]["files_processed"], 1);
        assert_eq!(value["summary"]["warning_count"], 1);
        assert_eq!(value["summary"]["fixes_applied"], 1);
    }
}
