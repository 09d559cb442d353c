//! `include-service-base`: service classes include the service mixin and
//! expose an instance-level entry method
//!
//! ```ruby
//! # bad
//! class AnyService
//!   def self.call
//!   end
//! end
//!
//! # good
//! class AnyService
//!   include ServiceBase
//!   def call
//!   end
//! end
//! ```

use crate::config::{IndentStyle, ServiceBaseConfig};
use crate::diagnostic::Diagnostic;
use crate::pattern::{ChildPattern, Pattern};
use crate::rule::{Interest, Rule};
use crate::source::Span;
use crate::tree::NodeRef;
use crate::walker::Context;

pub const RULE_ID: &str = "include-service-base";

/// Scopes that separate a method from the class it is written in
const SCOPES: [&str; 6] = ["class", "module", "sclass", "def", "defs", "block"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryForm {
    /// `def self.call`
    ClassLevel,
    /// `def call`
    Instance,
}

/// The mixin-required entry point rule
pub struct IncludeServiceBase {
    options: ServiceBaseConfig,
    /// Last `::` segment of the mixin name
    mixin_name: String,
    /// `(send nil :include ...)`
    include: Pattern,
    /// `(const _ $name)`, matched against each `include` argument
    mixin_const: Pattern,
    /// `(class _ nil ...)`
    base_class: Pattern,
    /// `(defs (self) :call (args) _)`
    class_entry: Pattern,
    /// `(def :call (args) _)`
    instance_entry: Pattern,
}

impl IncludeServiceBase {
    pub fn new(options: ServiceBaseConfig) -> Self {
        let mixin_name = options
            .mixin
            .rsplit("::")
            .next()
            .unwrap_or(options.mixin.as_str())
            .to_string();

        let include = Pattern::kind("send")
            .child(ChildPattern::Nil)
            .child(ChildPattern::atom("include"))
            .rest();
        let mixin_const = Pattern::kind("const")
            .child(ChildPattern::Any)
            .child(ChildPattern::capture("name"));
        let base_class = Pattern::kind("class")
            .child(ChildPattern::Any)
            .child(ChildPattern::Nil)
            .rest();
        let class_entry = Pattern::kind("defs")
            .child(Pattern::kind("self"))
            .child(ChildPattern::atom(options.method.as_str()))
            .child(Pattern::kind("args"))
            .child(ChildPattern::Any);
        let instance_entry = Pattern::kind("def")
            .child(ChildPattern::atom(options.method.as_str()))
            .child(Pattern::kind("args"))
            .child(ChildPattern::Any);

        Self {
            options,
            mixin_name,
            include,
            mixin_const,
            base_class,
            class_entry,
            instance_entry,
        }
    }

    fn entry_form(&self, node: NodeRef<'_>) -> Option<EntryForm> {
        if self.class_entry.is_match(node) {
            Some(EntryForm::ClassLevel)
        } else if self.instance_entry.is_match(node) {
            Some(EntryForm::Instance)
        } else {
            None
        }
    }

    /// Whether `include Mixin` appears anywhere inside the class, alone or
    /// among other modules (`include Other, Mixin`)
    fn includes_mixin(&self, class: NodeRef<'_>) -> bool {
        class
            .descendants()
            .filter(|node| self.include.is_match(*node))
            .flat_map(|send| send.child_nodes())
            .filter_map(|argument| self.mixin_const.matches(argument))
            .any(|captures| captures.atom("name").is_some_and(|a| a.text == self.mixin_name))
    }

    fn indent(&self, method: NodeRef<'_>, class: NodeRef<'_>, ctx: &Context<'_>) -> String {
        match self.options.indent {
            IndentStyle::MatchMethod => leading_whitespace(ctx, method.span().start),
            IndentStyle::Spaces(n) => leading_whitespace(ctx, class.span().start) + &" ".repeat(n),
        }
    }

    /// Span from the receiver of `def self.call` up to the method name
    fn qualifier_span(&self, method: NodeRef<'_>, ctx: &Context<'_>) -> Option<Span> {
        let receiver = method.child_node(0)?.span();
        let name_start = match method.child_atom(1).and_then(|a| a.span) {
            Some(span) => span.start,
            None => {
                let rest = ctx.source().text().get(receiver.end..)?;
                receiver.end + rest.find(self.options.method.as_str())?
            }
        };
        Some(Span::new(receiver.start, name_start))
    }
}

/// Whitespace in front of `offset` on its line, tabs kept as tabs.
///
/// Falls back to spaces up to the column when code precedes `offset`.
fn leading_whitespace(ctx: &Context<'_>, offset: usize) -> String {
    let source = ctx.source();
    let start = source.line_index().line_start(offset);
    match source.text().get(start..offset) {
        Some(prefix) if prefix.chars().all(|c| c == ' ' || c == '\t') => prefix.to_string(),
        _ => " ".repeat(source.column(offset)),
    }
}

impl Default for IncludeServiceBase {
    fn default() -> Self {
        Self::new(ServiceBaseConfig::default())
    }
}

impl Rule for IncludeServiceBase {
    fn id(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Service classes include the service mixin and define an instance-level entry method"
    }

    fn interests(&self) -> Interest {
        Interest::kinds(["def", "defs"])
    }

    fn check<'t>(&self, node: NodeRef<'t>, ctx: &Context<'t>) -> Vec<Diagnostic> {
        let Some(form) = self.entry_form(node) else {
            return Vec::new();
        };
        let Some(class) = ctx.enclosing(&SCOPES).filter(|n| n.is_kind("class")) else {
            return Vec::new();
        };
        if !self.base_class.is_match(class) {
            log::debug!("{}: class at {} has a superclass, skipped", RULE_ID, class.span());
            return Vec::new();
        }

        let has_mixin = self.includes_mixin(class);
        let method = &self.options.method;

        match (has_mixin, form) {
            (true, EntryForm::Instance) => Vec::new(),
            (true, EntryForm::ClassLevel) => vec![Diagnostic::new(
                node.span(),
                format!(
                    "`{}` must be defined as an instance method (`def {}`)",
                    method, method
                ),
            )],
            (false, form) => {
                let Some(name) = class.child_node(0) else {
                    return Vec::new();
                };
                let name_span = name.span();
                let include = format!("\n{}include {}", self.indent(node, class, ctx), self.options.mixin);
                let qualifier = match form {
                    EntryForm::ClassLevel => self.qualifier_span(node, ctx),
                    EntryForm::Instance => None,
                };
                let message = format!("please include {} into a service class", self.options.mixin);

                vec![Diagnostic::new(class.span(), message).with_correction(move |corrector| {
                    corrector.insert_after(name_span, include);
                    if let Some(qualifier) = qualifier {
                        corrector.remove(qualifier);
                    }
                })]
            }
        }
    }
}
