//! Output formatters for lint results

mod json;
mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

use crate::config::{ColorMode, OutputFormat};
use crate::diagnostic::Finding;
use crate::engine::LintResult;

/// Output formatter trait
pub trait OutputFormatter: Send + Sync {
    /// Format the entire lint result
    fn format(&self, result: &LintResult) -> String;

    /// Format a single finding
    fn format_finding(&self, finding: &Finding) -> String;
}

/// Formatter for the configured output format
pub fn formatter_for(format: OutputFormat, color: ColorMode) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => {
            let colored = match color {
                ColorMode::Always => true,
                ColorMode::Never => false,
                ColorMode::Auto => std::env::var_os("NO_COLOR").is_none(),
            };
            Box::new(TextFormatter {
                colored,
                ..TextFormatter::default()
            })
        }
        OutputFormat::Json => Box::new(JsonFormatter::new().pretty()),
    }
}
