//! Diagnostic types for rule violations and their corrections

use crate::edit::Edit;
use crate::source::{Source, Span};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Severity level for diagnostics
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,
    /// Convention or style violation
    #[default]
    Warning,
    /// Definite problem
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" | "hint" | "note" | "convention" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" | "fatal" => Ok(Severity::Error),
            _ => Err(()),
        }
    }
}

/// Collects the edits of one correction
#[derive(Debug, Default)]
pub struct Corrector {
    edits: Vec<Edit>,
}

impl Corrector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the text of `span` with `text`
    pub fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.edits.push(Edit::new(span, text));
    }

    /// Delete the text of `span`
    pub fn remove(&mut self, span: Span) {
        self.edits.push(Edit::delete(span));
    }

    /// Insert `text` immediately before `span`
    pub fn insert_before(&mut self, span: Span, text: impl Into<String>) {
        self.edits.push(Edit::insert(span.start, text));
    }

    /// Insert `text` immediately after `span`
    pub fn insert_after(&mut self, span: Span, text: impl Into<String>) {
        self.edits.push(Edit::insert(span.end, text));
    }

    /// Delete everything from the start of `from` up to the start of `to`
    pub fn remove_between(&mut self, from: Span, to: Span) {
        self.edits.push(Edit::delete(Span::new(from.start, to.start)));
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn into_edits(self) -> Vec<Edit> {
        self.edits
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/// Callback that records the edits fixing one diagnostic
pub struct Correction(Box<dyn FnOnce(&mut Corrector) + Send>);

impl Correction {
    pub fn new(build: impl FnOnce(&mut Corrector) + Send + 'static) -> Self {
        Self(Box::new(build))
    }

    /// Run the callback once and return the edits it recorded
    pub fn into_edits(self) -> Vec<Edit> {
        let mut corrector = Corrector::new();
        (self.0)(&mut corrector);
        corrector.into_edits()
    }
}

impl fmt::Debug for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Correction(..)")
    }
}

/// A rule violation found during one walk
#[derive(Debug)]
pub struct Diagnostic {
    /// Rule ID that triggered this diagnostic (stamped by the walker)
    pub rule_id: String,
    /// Severity level (stamped by the walker)
    pub severity: Severity,
    /// Highlighted region
    pub span: Span,
    /// Human-readable message
    pub message: String,
    /// Optional autocorrection
    pub correction: Option<Correction>,
}

impl Diagnostic {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            rule_id: String::new(),
            severity: Severity::default(),
            span,
            message: message.into(),
            correction: None,
        }
    }

    /// Attach an autocorrection
    pub fn with_correction(
        mut self,
        build: impl FnOnce(&mut Corrector) + Send + 'static,
    ) -> Self {
        self.correction = Some(Correction::new(build));
        self
    }

    pub fn has_correction(&self) -> bool {
        self.correction.is_some()
    }
}

/// Source location of a finding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File path (empty for in-memory sources)
    pub file: PathBuf,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// Length of the highlighted region in bytes
    pub length: usize,
    /// Byte span in the original text
    pub span: Span,
}

impl Location {
    pub fn new(file: PathBuf, line: usize, column: usize) -> Self {
        Self {
            file,
            line,
            column,
            length: 0,
            span: Span::default(),
        }
    }

    /// Resolve a byte span against its source
    pub fn from_span(source: &Source, span: Span) -> Self {
        let start = source.line_col(span.start);
        Self {
            file: PathBuf::new(),
            line: start.line,
            column: start.column,
            length: span.len(),
            span,
        }
    }

    pub fn with_file(mut self, file: PathBuf) -> Self {
        self.file = file;
        self
    }
}

/// What happened to a diagnostic's correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixStatus {
    /// Report-only diagnostic
    #[default]
    None,
    /// Correction applied to the corrected text
    Applied,
    /// Correction overlapped another diagnostic's correction; fix manually
    Conflict,
    /// Correction produced overlapping or out-of-range edits and was dropped
    Invalid,
}

impl FixStatus {
    /// True if a human still has to act on the finding
    pub fn needs_manual_fix(&self) -> bool {
        !matches!(self, FixStatus::Applied)
    }
}

impl fmt::Display for FixStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixStatus::None => write!(f, "none"),
            FixStatus::Applied => write!(f, "applied"),
            FixStatus::Conflict => write!(f, "manual fix required"),
            FixStatus::Invalid => write!(f, "invalid fix dropped"),
        }
    }
}

/// A diagnostic after correction resolution, ready for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub location: Location,
    /// Whether the rule offered a correction at all
    pub fixable: bool,
    pub fix_status: FixStatus,
    /// The source line (for display)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<String>,
}

impl Finding {
    pub fn from_diagnostic(diagnostic: &Diagnostic, source: &Source) -> Self {
        let location = Location::from_span(source, diagnostic.span);
        let source_line = source.line(location.line).map(str::to_string);
        Self {
            rule_id: diagnostic.rule_id.clone(),
            severity: diagnostic.severity,
            message: diagnostic.message.clone(),
            location,
            fixable: diagnostic.has_correction(),
            fix_status: FixStatus::None,
            source_line,
        }
    }

    /// Finding for a problem that is not tied to a rule (unreadable file, parse failure)
    pub fn file_level(rule_id: &str, message: &str, location: Location) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity: Severity::Error,
            message: message.to_string(),
            location,
            fixable: false,
            fix_status: FixStatus::None,
            source_line: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Finding {
    /// `file:line:col: severity [rule] message`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} [{}] {}",
            self.location.file.display(),
            self.location.line,
            self.location.column,
            self.severity,
            self.rule_id,
            self.message
        )
    }
}
