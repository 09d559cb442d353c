//! Parser front ends that turn source text into the engine's [`Tree`]

use crate::tree::Tree;
use thiserror::Error;

/// Error during parsing
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("failed to load grammar: {0}")]
    Language(String),

    #[error("parser returned no tree")]
    NoTree,
}

impl ParseError {
    /// 1-based line and column, when the error points at the source
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            ParseError::Syntax { line, column, .. } => Some((*line, *column)),
            _ => None,
        }
    }
}

/// Language-specific parser producing engine trees
pub trait Frontend: Send + Sync {
    /// Front end identifier (e.g., "ruby")
    fn id(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// File extensions this front end handles (without dot, e.g., "rb")
    fn extensions(&self) -> &[&str];

    /// Extension-less file names this front end handles (e.g., "Gemfile")
    fn file_names(&self) -> &[&str] {
        &[]
    }

    /// Parse source text into a tree with byte spans into `text`
    fn parse(&self, text: &str) -> Result<Tree, ParseError>;
}
