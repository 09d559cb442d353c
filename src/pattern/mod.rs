//! Declarative node patterns with named captures
//!
//! A [`Pattern`] describes the shape of a node: its kind and the shape of each
//! child. Patterns are plain data, built once (programmatically or from the
//! s-expression syntax accepted by [`Pattern::parse`]) and matched against any
//! number of nodes.
//!
//! ```text
//! (send nil :include (const _ $name) ...)
//! (defs (self) :call (args) _)
//! ({def defs} ... $body)
//! ```

mod parser;

pub use parser::PatternError;

use crate::tree::{Atom, Child, NodeRef, Tree};
use std::collections::HashSet;
use std::fmt;

/// Which node kinds a pattern accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindMatcher {
    /// `_`
    Any,
    /// `send`
    Exact(String),
    /// `{def defs}`
    OneOf(Vec<String>),
}

impl KindMatcher {
    pub fn accepts(&self, kind: &str) -> bool {
        match self {
            KindMatcher::Any => true,
            KindMatcher::Exact(expected) => expected == kind,
            KindMatcher::OneOf(kinds) => kinds.iter().any(|k| k == kind),
        }
    }

    /// Kinds this matcher can accept, `None` when it accepts every kind
    pub fn kinds(&self) -> Option<Vec<String>> {
        match self {
            KindMatcher::Any => None,
            KindMatcher::Exact(kind) => Some(vec![kind.clone()]),
            KindMatcher::OneOf(kinds) => Some(kinds.clone()),
        }
    }
}

/// Shape of a single child position
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildPattern {
    /// `_`: anything, including an absent child
    Any,
    /// `nil`: only an absent child
    Nil,
    /// `:name`, `"text"` or `42`: an atom with exactly this text
    Atom(String),
    /// `(kind ...)`: a sub-node matching the nested pattern
    Node(Pattern),
    /// `$name` or `$name:child`: record the child, optionally only if it matches
    Capture {
        name: String,
        constraint: Option<Box<ChildPattern>>,
    },
    /// `{a b c}`: the first alternative that matches
    Union(Vec<ChildPattern>),
}

impl ChildPattern {
    pub fn atom(text: impl Into<String>) -> Self {
        ChildPattern::Atom(text.into())
    }

    pub fn node(pattern: Pattern) -> Self {
        ChildPattern::Node(pattern)
    }

    pub fn capture(name: impl Into<String>) -> Self {
        ChildPattern::Capture {
            name: name.into(),
            constraint: None,
        }
    }

    pub fn capture_if(name: impl Into<String>, constraint: ChildPattern) -> Self {
        ChildPattern::Capture {
            name: name.into(),
            constraint: Some(Box::new(constraint)),
        }
    }

    fn matches<'t>(&self, tree: &'t Tree, child: &'t Child, out: &mut Vec<Binding<'t>>) -> bool {
        match self {
            ChildPattern::Any => true,
            ChildPattern::Nil => child.is_nil(),
            ChildPattern::Atom(text) => matches!(child, Child::Atom(atom) if atom.text == *text),
            ChildPattern::Node(pattern) => match child {
                Child::Node(id) => tree
                    .get(*id)
                    .is_some_and(|node| pattern.match_node(node, out)),
                _ => false,
            },
            ChildPattern::Capture { name, constraint } => {
                let mark = out.len();
                out.push((name.clone(), Captured::from_child(tree, child)));
                if let Some(constraint) = constraint {
                    if !constraint.matches(tree, child, out) {
                        out.truncate(mark);
                        return false;
                    }
                }
                true
            }
            ChildPattern::Union(alternatives) => alternatives.iter().any(|alternative| {
                let mark = out.len();
                let matched = alternative.matches(tree, child, out);
                if !matched {
                    out.truncate(mark);
                }
                matched
            }),
        }
    }

    fn collect_names<'p>(&'p self, names: &mut Vec<&'p str>) {
        match self {
            ChildPattern::Node(pattern) => pattern.collect_names(names),
            ChildPattern::Capture { name, constraint } => {
                names.push(name.as_str());
                if let Some(constraint) = constraint {
                    constraint.collect_names(names);
                }
            }
            ChildPattern::Union(alternatives) => {
                // Branches bind the same names, so the first one stands for all of them
                if let Some(first) = alternatives.first() {
                    first.collect_names(names);
                }
            }
            ChildPattern::Any | ChildPattern::Nil | ChildPattern::Atom(_) => {}
        }
    }

    fn validate(&self) -> Result<(), PatternError> {
        match self {
            ChildPattern::Node(pattern) => pattern.validate_children(),
            ChildPattern::Capture {
                constraint: Some(constraint),
                ..
            } => constraint.validate(),
            ChildPattern::Union(alternatives) => {
                if alternatives.is_empty() {
                    return Err(PatternError::EmptyUnion { offset: None });
                }
                let mut bound: Vec<Vec<&str>> = Vec::with_capacity(alternatives.len());
                for alternative in alternatives {
                    alternative.validate()?;
                    let mut names = Vec::new();
                    alternative.collect_names(&mut names);
                    names.sort_unstable();
                    bound.push(names);
                }
                match bound.iter().find(|names| **names != bound[0]) {
                    Some(found) => Err(PatternError::UnbalancedUnion {
                        expected: bound[0].join(", "),
                        found: found.join(", "),
                    }),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }
}

impl From<Pattern> for ChildPattern {
    fn from(pattern: Pattern) -> Self {
        ChildPattern::Node(pattern)
    }
}

/// Declarative description of a node shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    kind: KindMatcher,
    children: Vec<ChildPattern>,
    /// Trailing `...`: children past the declared prefix are ignored
    rest: bool,
}

impl Pattern {
    pub fn new(kind: KindMatcher) -> Self {
        Self {
            kind,
            children: Vec::new(),
            rest: false,
        }
    }

    /// Pattern for an exact node kind with no children declared yet
    pub fn kind(kind: impl Into<String>) -> Self {
        Self::new(KindMatcher::Exact(kind.into()))
    }

    pub fn any_kind() -> Self {
        Self::new(KindMatcher::Any)
    }

    pub fn one_of<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(KindMatcher::OneOf(kinds.into_iter().map(Into::into).collect()))
    }

    /// Append a child pattern.
    ///
    /// Builder patterns are not checked until [`Pattern::build`].
    pub fn child(mut self, child: impl Into<ChildPattern>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Ignore any children after the ones declared so far
    pub fn rest(mut self) -> Self {
        self.rest = true;
        self
    }

    /// Finish a builder pattern, applying the same checks as [`Pattern::parse`]
    pub fn build(self) -> Result<Self, PatternError> {
        self.validate()?;
        Ok(self)
    }

    /// Parse the s-expression pattern syntax
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let pattern = parser::parse(text)?;
        pattern.validate()?;
        Ok(pattern)
    }

    pub fn kind_matcher(&self) -> &KindMatcher {
        &self.kind
    }

    pub fn children(&self) -> &[ChildPattern] {
        &self.children
    }

    pub fn has_rest(&self) -> bool {
        self.rest
    }

    /// Capture names declared anywhere in the pattern, in declaration order
    pub fn capture_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    /// Check that capture names are unique and unions are balanced
    pub fn validate(&self) -> Result<(), PatternError> {
        self.validate_children()?;
        let mut seen = HashSet::new();
        for name in self.capture_names() {
            if !seen.insert(name) {
                return Err(PatternError::DuplicateCapture {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Match this pattern against `node`, returning its captures on success
    pub fn matches<'t>(&self, node: NodeRef<'t>) -> Option<Captures<'t>> {
        let mut bindings = Vec::new();
        self.match_node(node, &mut bindings)
            .then_some(Captures { bindings })
    }

    /// True if the pattern matches, ignoring captures
    pub fn is_match(&self, node: NodeRef<'_>) -> bool {
        self.matches(node).is_some()
    }

    /// Match against `node` and every node below it, pre-order, left to right
    pub fn search<'t>(&self, node: NodeRef<'t>) -> Vec<Captures<'t>> {
        search_descendants(self, node)
    }

    fn match_node<'t>(&self, node: NodeRef<'t>, out: &mut Vec<Binding<'t>>) -> bool {
        if !self.kind.accepts(node.kind()) {
            return false;
        }

        let children = node.children();
        let arity_ok = if self.rest {
            children.len() >= self.children.len()
        } else {
            children.len() == self.children.len()
        };
        if !arity_ok {
            return false;
        }

        let mark = out.len();
        for (pattern, child) in self.children.iter().zip(children) {
            if !pattern.matches(node.tree(), child, out) {
                out.truncate(mark);
                return false;
            }
        }
        true
    }

    fn collect_names<'p>(&'p self, names: &mut Vec<&'p str>) {
        for child in &self.children {
            child.collect_names(names);
        }
    }

    fn validate_children(&self) -> Result<(), PatternError> {
        self.children.iter().try_for_each(ChildPattern::validate)
    }
}

/// Match `pattern` against `node` and all its descendants.
///
/// Returns one capture set per matching node, in pre-order.
pub fn search_descendants<'t>(pattern: &Pattern, node: NodeRef<'t>) -> Vec<Captures<'t>> {
    node.descendants()
        .filter_map(|candidate| pattern.matches(candidate))
        .collect()
}

/// Value bound to a capture name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Captured<'t> {
    Node(NodeRef<'t>),
    Atom(&'t Atom),
    Nil,
}

impl<'t> Captured<'t> {
    fn from_child(tree: &'t Tree, child: &'t Child) -> Self {
        match child {
            Child::Node(id) => tree.get(*id).map_or(Captured::Nil, Captured::Node),
            Child::Atom(atom) => Captured::Atom(atom),
            Child::Nil => Captured::Nil,
        }
    }

    pub fn as_node(&self) -> Option<NodeRef<'t>> {
        match self {
            Captured::Node(node) => Some(*node),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&'t Atom> {
        match self {
            Captured::Atom(atom) => Some(atom),
            _ => None,
        }
    }
}

type Binding<'t> = (String, Captured<'t>);

/// Named captures recorded by one successful match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures<'t> {
    bindings: Vec<Binding<'t>>,
}

impl<'t> Captures<'t> {
    pub fn get(&self, name: &str) -> Option<Captured<'t>> {
        self.bindings
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| *value)
    }

    pub fn node(&self, name: &str) -> Option<NodeRef<'t>> {
        self.get(name)?.as_node()
    }

    pub fn atom(&self, name: &str) -> Option<&'t Atom> {
        self.get(name)?.as_atom()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in the order they were recorded
    pub fn iter(&self) -> impl Iterator<Item = (&str, Captured<'t>)> + '_ {
        self.bindings
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
    }
}

impl fmt::Display for KindMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindMatcher::Any => write!(f, "_"),
            KindMatcher::Exact(kind) => write!(f, "{}", kind),
            KindMatcher::OneOf(kinds) => write!(f, "{{{}}}", kinds.join(" ")),
        }
    }
}

impl fmt::Display for ChildPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildPattern::Any => write!(f, "_"),
            ChildPattern::Nil => write!(f, "nil"),
            ChildPattern::Atom(text) if parser::is_symbol_text(text) => write!(f, ":{}", text),
            ChildPattern::Atom(text) => write!(f, "{:?}", text),
            ChildPattern::Node(pattern) => write!(f, "{}", pattern),
            ChildPattern::Capture {
                name,
                constraint: None,
            } => write!(f, "${}", name),
            ChildPattern::Capture {
                name,
                constraint: Some(constraint),
            } => write!(f, "${}:{}", name, constraint),
            ChildPattern::Union(alternatives) => {
                let parts: Vec<String> = alternatives.iter().map(|a| a.to_string()).collect();
                write!(f, "{{{}}}", parts.join(" "))
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.kind)?;
        for child in &self.children {
            write!(f, " {}", child)?;
        }
        if self.rest {
            write!(f, " ...")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Span;
    use crate::tree::{NodeId, TreeBuilder};

    /// class AnyService
    ///   include ::ServiceBase
    ///   def self.call; end
    /// end
    fn service_tree() -> (Tree, NodeId, NodeId) {
        let mut b = TreeBuilder::new();
        let name = b.node(
            "const",
            Span::new(6, 16),
            vec![Child::Nil, Child::atom("AnyService")],
        );
        let cbase = b.node("cbase", Span::new(27, 29), vec![]);
        let mixin = b.node(
            "const",
            Span::new(27, 40),
            vec![cbase.into(), Child::atom("ServiceBase")],
        );
        let include = b.node(
            "send",
            Span::new(19, 40),
            vec![Child::Nil, Child::atom("include"), mixin.into()],
        );
        let receiver = b.node("self", Span::new(47, 51), vec![]);
        let args = b.node("args", Span::point(56), vec![]);
        let defs = b.node(
            "defs",
            Span::new(43, 66),
            vec![
                receiver.into(),
                Child::Atom(Atom::spanned("call", Span::new(52, 56))),
                args.into(),
                Child::Nil,
            ],
        );
        let body = b.node("begin", Span::new(19, 66), vec![include.into(), defs.into()]);
        let class = b.node(
            "class",
            Span::new(0, 70),
            vec![name.into(), Child::Nil, body.into()],
        );
        (b.finish(class), include, defs)
    }

    #[test]
    fn test_kind_matching() {
        let (tree, _, defs) = service_tree();
        let node = tree.get(defs).unwrap();

        assert!(Pattern::kind("defs").rest().is_match(node));
        assert!(!Pattern::kind("def").rest().is_match(node));
        assert!(Pattern::any_kind().rest().is_match(node));
        assert!(Pattern::one_of(["def", "defs"]).rest().is_match(node));
    }

    #[test]
    fn test_arity_matching() {
        let (tree, _, defs) = service_tree();
        let node = tree.get(defs).unwrap();

        let exact = Pattern::parse("(defs _ _ _ _)").unwrap();
        let short = Pattern::parse("(defs _ _ _)").unwrap();
        let prefix = Pattern::parse("(defs _ ...)").unwrap();
        let too_long = Pattern::parse("(defs _ _ _ _ _ ...)").unwrap();

        assert!(exact.is_match(node));
        assert!(!short.is_match(node));
        assert!(prefix.is_match(node));
        assert!(!too_long.is_match(node));
    }

    #[test]
    fn test_child_matchers() {
        let (tree, _, defs) = service_tree();
        let node = tree.get(defs).unwrap();

        assert!(Pattern::parse("(defs (self) :call (args) nil)")
            .unwrap()
            .is_match(node));
        assert!(!Pattern::parse("(defs (self) :perform (args) nil)")
            .unwrap()
            .is_match(node));
        // nil only matches an absent child
        assert!(!Pattern::parse("(defs nil :call (args) nil)")
            .unwrap()
            .is_match(node));
        // (args) requires an args node with no children
        assert!(!Pattern::parse("(defs (self) :call (args _) nil)")
            .unwrap()
            .is_match(node));
    }

    #[test]
    fn test_captures() {
        let (tree, _, defs) = service_tree();
        let node = tree.get(defs).unwrap();
        let pattern = Pattern::parse("(defs $receiver $name (args) $body)").unwrap();

        let captures = pattern.matches(node).unwrap();
        assert_eq!(captures.len(), 3);
        assert_eq!(captures.node("receiver").unwrap().kind(), "self");
        assert_eq!(captures.atom("name").unwrap().text, "call");
        assert_eq!(captures.get("body"), Some(Captured::Nil));
        assert_eq!(captures.get("missing"), None);
    }

    #[test]
    fn test_failed_branch_captures_discarded() {
        let (tree, include, _) = service_tree();
        let node = tree.get(include).unwrap();

        // The first alternative binds $scope before failing on :Other
        let pattern =
            Pattern::parse("(send nil :include {(const $scope :Other) (const $scope :ServiceBase)})")
                .unwrap();
        let captures = pattern.matches(node).unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures.node("scope").unwrap().kind(), "cbase");

        let failing = Pattern::parse("(send nil :include (const $scope :Other))").unwrap();
        assert!(failing.matches(node).is_none());
    }

    #[test]
    fn test_constrained_capture() {
        let (tree, include, _) = service_tree();
        let node = tree.get(include).unwrap();

        let pattern = Pattern::parse("(send nil :include $mixin:(const (cbase) $name))").unwrap();
        let captures = pattern.matches(node).unwrap();
        assert_eq!(captures.node("mixin").unwrap().kind(), "const");
        assert_eq!(captures.atom("name").unwrap().text, "ServiceBase");

        let pattern = Pattern::parse("(send nil :include $mixin:(const nil _))").unwrap();
        assert!(pattern.matches(node).is_none());
    }

    #[test]
    fn test_search_descendants() {
        let (tree, include, defs) = service_tree();
        let root = tree.root();

        let include_pattern = Pattern::parse("(send nil :include (const _ $name) ...)").unwrap();
        let found = search_descendants(&include_pattern, root);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].atom("name").unwrap().text, "ServiceBase");

        let calls_and_methods = Pattern::parse("({send defs} ...)").unwrap();
        assert_eq!(calls_and_methods.search(root).len(), 2);
        assert!(calls_and_methods.is_match(tree.get(include).unwrap()));
        assert!(calls_and_methods.is_match(tree.get(defs).unwrap()));

        let all = Pattern::parse("(_ ...)").unwrap().search(root);
        assert_eq!(all.len(), tree.len());
    }

    #[test]
    fn test_search_includes_root() {
        let (tree, _, defs) = service_tree();
        let node = tree.get(defs).unwrap();
        let found = Pattern::parse("(defs ...)").unwrap().search(node);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_match_is_deterministic() {
        let (tree, _, defs) = service_tree();
        let node = tree.get(defs).unwrap();
        let pattern = Pattern::parse("(defs $recv :call ...)").unwrap();
        assert_eq!(pattern.matches(node), pattern.matches(node));
    }

    #[test]
    fn test_builder_matches_parsed() {
        let built = Pattern::kind("defs")
            .child(Pattern::kind("self"))
            .child(ChildPattern::atom("call"))
            .child(Pattern::kind("args"))
            .child(ChildPattern::Any);
        let parsed = Pattern::parse("(defs (self) :call (args) _)").unwrap();
        assert_eq!(built, parsed);
        assert_eq!(built.to_string(), "(defs (self) :call (args) _)");
    }

    #[test]
    fn test_build_rejects_duplicate_captures() {
        let duplicated = Pattern::kind("defs")
            .child(ChildPattern::capture("name"))
            .child(ChildPattern::capture("name"))
            .rest();
        assert!(matches!(
            duplicated.build(),
            Err(PatternError::DuplicateCapture { name }) if name == "name"
        ));

        let unbalanced = Pattern::kind("send").child(ChildPattern::Union(vec![
            ChildPattern::capture("a"),
            ChildPattern::Nil,
        ]));
        assert!(matches!(
            unbalanced.build(),
            Err(PatternError::UnbalancedUnion { .. })
        ));

        let valid = Pattern::kind("defs")
            .child(ChildPattern::capture("recv"))
            .child(ChildPattern::atom("call"))
            .rest()
            .build()
            .unwrap();
        assert_eq!(valid, Pattern::parse("(defs $recv :call ...)").unwrap());
    }

    #[test]
    fn test_kind_matcher_interest() {
        assert_eq!(
            Pattern::parse("({def defs} ...)").unwrap().kind_matcher().kinds(),
            Some(vec!["def".to_string(), "defs".to_string()])
        );
        assert_eq!(Pattern::parse("(_)").unwrap().kind_matcher().kinds(), None);
    }
}
