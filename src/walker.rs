//! Tree walker: visits every node and dispatches it to interested rules

use crate::diagnostic::Diagnostic;
use crate::engine::{EngineError, RuleTiming};
use crate::rule::RuleSet;
use crate::source::Source;
use crate::tree::{NodeRef, Tree};
use std::collections::HashMap;
use std::time::Instant;

/// Read-only view of where a node sits, handed to every rule check
#[derive(Clone, Copy)]
pub struct Context<'t> {
    node: NodeRef<'t>,
    source: &'t Source,
}

impl<'t> Context<'t> {
    pub fn new(node: NodeRef<'t>, source: &'t Source) -> Self {
        Self { node, source }
    }

    /// The node being visited
    pub fn node(&self) -> NodeRef<'t> {
        self.node
    }

    pub fn parent(&self) -> Option<NodeRef<'t>> {
        self.node.parent()
    }

    /// Ancestors, nearest first
    pub fn ancestors(&self) -> impl Iterator<Item = NodeRef<'t>> + 't {
        self.node.ancestors()
    }

    /// Nearest ancestor of the given kind
    pub fn nearest(&self, kind: &str) -> Option<NodeRef<'t>> {
        self.ancestors().find(|n| n.is_kind(kind))
    }

    /// Nearest ancestor whose kind is any of `kinds`
    pub fn enclosing(&self, kinds: &[&str]) -> Option<NodeRef<'t>> {
        self.ancestors().find(|n| kinds.contains(&n.kind()))
    }

    pub fn source(&self) -> &'t Source {
        self.source
    }

    /// Source text of a node
    pub fn text_of(&self, node: NodeRef<'_>) -> &'t str {
        self.source.slice(node.span()).unwrap_or("")
    }
}

/// Everything one walk produced
#[derive(Debug, Default)]
pub struct Walk {
    /// Diagnostics in traversal order, then registration order per node
    pub diagnostics: Vec<Diagnostic>,
    /// Per-rule timing statistics (rule_id -> timing)
    pub timings: HashMap<String, RuleTiming>,
    /// Number of nodes visited
    pub nodes_visited: usize,
}

/// Walk `tree` and collect the diagnostics of every interested rule
pub fn run(rules: &RuleSet, tree: &Tree, source: &Source) -> Result<Vec<Diagnostic>, EngineError> {
    walk(rules, tree, source).map(|walk| walk.diagnostics)
}

/// [`run`], also returning per-rule timings
pub fn walk(rules: &RuleSet, tree: &Tree, source: &Source) -> Result<Walk, EngineError> {
    tree.validate()?;

    let mut result = Walk::default();
    for node in tree.root().descendants() {
        result.nodes_visited += 1;
        let ctx = Context::new(node, source);

        for registered in rules.interested(node.kind()) {
            let start = Instant::now();
            let found = registered.rule().check(node, &ctx);
            let elapsed = start.elapsed();

            let timing = result
                .timings
                .entry(registered.id().to_string())
                .or_insert_with(|| RuleTiming::new(registered.id()));
            timing.total_time += elapsed;
            timing.evaluation_count += 1;
            timing.match_count += found.len();

            for mut diagnostic in found {
                diagnostic.rule_id = registered.id().to_string();
                diagnostic.severity = registered.severity();
                result.diagnostics.push(diagnostic);
            }
        }
    }

    log::debug!(
        "walked {} nodes, {} diagnostics",
        result.nodes_visited,
        result.diagnostics.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;
    use crate::rule::{Interest, Rule};
    use crate::source::Span;
    use crate::tree::{Child, TreeBuilder};

    /// Reports every node it sees together with the kinds of its ancestors
    struct Recorder {
        id: &'static str,
        interest: Interest,
    }

    impl Rule for Recorder {
        fn id(&self) -> &str {
            self.id
        }

        fn description(&self) -> &str {
            "records visits"
        }

        fn severity(&self) -> Severity {
            Severity::Info
        }

        fn interests(&self) -> Interest {
            self.interest.clone()
        }

        fn check<'t>(&self, node: NodeRef<'t>, ctx: &Context<'t>) -> Vec<Diagnostic> {
            let path: Vec<&str> = ctx.ancestors().map(|n| n.kind()).collect();
            vec![Diagnostic::new(
                node.span(),
                format!("{} in [{}]", node.kind(), path.join(" ")),
            )]
        }
    }

    /// class A; def call; foo; end; def self.other; end; end
    fn sample() -> (Tree, Source) {
        let text = "class A; def call; foo; end; def self.other; end; end";
        let mut b = TreeBuilder::new();
        let name = b.node("const", Span::new(6, 7), vec![Child::Nil, Child::atom("A")]);
        let args = b.node("args", Span::point(17), vec![]);
        let foo = b.node("send", Span::new(19, 22), vec![Child::Nil, Child::atom("foo")]);
        let def = b.node(
            "def",
            Span::new(9, 27),
            vec![Child::atom("call"), args.into(), foo.into()],
        );
        let slf = b.node("self", Span::new(33, 37), vec![]);
        let args2 = b.node("args", Span::point(43), vec![]);
        let defs = b.node(
            "defs",
            Span::new(29, 48),
            vec![slf.into(), Child::atom("other"), args2.into(), Child::Nil],
        );
        let body = b.node("begin", Span::new(9, 48), vec![def.into(), defs.into()]);
        let class = b.node(
            "class",
            Span::new(0, 53),
            vec![name.into(), Child::Nil, body.into()],
        );
        (b.finish(class), Source::new(text))
    }

    #[test]
    fn test_dispatch_by_kind_in_traversal_order() {
        let (tree, source) = sample();
        let rules = RuleSet::new()
            .with(Recorder {
                id: "methods",
                interest: Interest::kinds(["def", "defs"]),
            })
            .with(Recorder {
                id: "sends",
                interest: Interest::kinds(["send", "def"]),
            });

        let diagnostics = run(&rules, &tree, &source).unwrap();
        let seen: Vec<(&str, &str)> = diagnostics
            .iter()
            .map(|d| (d.rule_id.as_str(), d.message.as_str()))
            .collect();

        assert_eq!(
            seen,
            vec![
                ("methods", "def in [begin class]"),
                ("sends", "def in [begin class]"),
                ("sends", "send in [def begin class]"),
                ("methods", "defs in [begin class]"),
            ]
        );
        assert!(diagnostics.iter().all(|d| d.severity == Severity::Info));
    }

    #[test]
    fn test_every_node_visited_once() {
        let (tree, source) = sample();
        let rules = RuleSet::new().with(Recorder {
            id: "all",
            interest: Interest::All,
        });

        let walk = walk(&rules, &tree, &source).unwrap();
        assert_eq!(walk.nodes_visited, tree.len());
        assert_eq!(walk.diagnostics.len(), tree.len());
        assert_eq!(walk.timings["all"].evaluation_count, tree.len());
        assert_eq!(walk.timings["all"].match_count, tree.len());
    }

    #[test]
    fn test_context_navigation() {
        let (tree, source) = sample();
        let root = tree.root();
        let foo = root
            .descendants()
            .find(|n| n.is_kind("send"))
            .unwrap();

        let ctx = Context::new(foo, &source);
        assert_eq!(ctx.parent().map(|n| n.kind()), Some("def"));
        assert_eq!(ctx.nearest("class"), Some(root));
        assert_eq!(ctx.enclosing(&["module", "def"]).map(|n| n.kind()), Some("def"));
        assert!(ctx.nearest("module").is_none());
        assert_eq!(ctx.text_of(foo), "foo");
    }

    #[test]
    fn test_malformed_tree_is_fatal() {
        let mut b = TreeBuilder::new();
        let leaf = b.node("self", Span::default(), vec![]);
        let left = b.node("begin", Span::default(), vec![leaf.into()]);
        let root = b.node("begin", Span::default(), vec![left.into(), leaf.into()]);
        let tree = b.finish(root);
        let rules = RuleSet::new().with(Recorder {
            id: "all",
            interest: Interest::All,
        });

        let err = run(&rules, &tree, &Source::new("")).unwrap_err();
        assert!(matches!(err, EngineError::MalformedTree(_)));
    }
}
