//! Rubric - Structural-Pattern Linter and Autocorrector
//!
//! Rules are written against a language-neutral syntax tree. A rule declares the
//! node kinds it cares about, matches their shape with declarative patterns and
//! reports diagnostics, optionally with a correction that records text edits.
//! The engine applies the edits of all diagnostics in one conflict-checked batch,
//! so unrelated formatting in the file is never touched.
//!
//! # Architecture
//!
//! ```text
//! CLI -> Linter -> Frontend (Ruby) -> Tree -> Walker -> Rules -> Diagnostics
//!                                                  \-> Resolver -> Edits -> corrected text
//! ```
//!
//! # Declarative Rules
//!
//! Rule files (YAML or JSON) placed in a configured rule directory:
//!
//! ```yaml
//! rules:
//!   - id: no-puts
//!     pattern: (send nil :puts ...)
//!     message: "use the logger instead of puts"
//!     severity: warning
//! ```
//!
//! # Library Use
//!
//! ```no_run
//! use rubric::{engine, ruby, rules, Config, Source};
//!
//! let text = "class AnyService\n  def self.call\n  end\nend\n";
//! let tree = ruby::parse(text).unwrap();
//! let rules = rules::builtin_rules(&Config::new());
//! let evaluation = engine::evaluate(&rules, &tree, &Source::new(text)).unwrap();
//! for finding in &evaluation.findings {
//!     println!("{}", finding);
//! }
//! ```

pub mod config;
pub mod diagnostic;
pub mod edit;
pub mod engine;
pub mod fixer;
pub mod frontend;
pub mod output;
pub mod pattern;
pub mod ruby;
pub mod rule;
pub mod rules;
pub mod source;
pub mod tree;
pub mod walker;

// Re-export main types
pub use config::Config;
pub use diagnostic::{Corrector, Diagnostic, Finding, FixStatus, Location, Severity};
pub use edit::{Edit, EditError};
pub use engine::{evaluate, EngineError, Evaluation, LintResult, Linter, RuleTiming};
pub use fixer::{fix_source, FixMode, FixOutcome};
pub use frontend::{Frontend, ParseError};
pub use output::{JsonFormatter, OutputFormatter, TextFormatter};
pub use pattern::{search_descendants, Captures, Pattern, PatternError};
pub use ruby::RubyFrontend;
pub use rule::{Interest, Rule, RuleSet};
pub use source::{Source, Span};
pub use tree::{NodeRef, Tree, TreeBuilder};
pub use walker::{run, Context};
