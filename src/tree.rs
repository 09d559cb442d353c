//! Syntax tree arena consumed by the rule engine
//!
//! Trees are produced once by a parser front end through [`TreeBuilder`] and
//! are read-only afterwards. Nodes live in a flat arena and refer to each other
//! by [`NodeId`]; the parent link is a plain index used for navigation only.

use crate::source::Span;
use std::fmt;
use thiserror::Error;

/// Index of a node inside its [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A leaf value such as a method name, constant name or literal text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub text: String,
    /// Where the value was written, when the front end knows it
    pub span: Option<Span>,
}

impl Atom {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            span: None,
        }
    }

    pub fn spanned(text: impl Into<String>, span: Span) -> Self {
        Self {
            text: text.into(),
            span: Some(span),
        }
    }
}

/// One entry of a node's child sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    Node(NodeId),
    Atom(Atom),
    /// An absent child (no superclass, empty body, no receiver)
    Nil,
}

impl Child {
    pub fn atom(text: impl Into<String>) -> Self {
        Child::Atom(Atom::new(text))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Child::Nil)
    }
}

impl From<NodeId> for Child {
    fn from(id: NodeId) -> Self {
        Child::Node(id)
    }
}

impl From<Option<NodeId>> for Child {
    fn from(id: Option<NodeId>) -> Self {
        id.map_or(Child::Nil, Child::Node)
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: String,
    children: Vec<Child>,
    span: Span,
    parent: Option<NodeId>,
}

/// Precondition violation in a tree handed over by a parser front end
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node {child} is listed as a child of both {first} and {second}")]
    SharedChild {
        child: NodeId,
        first: NodeId,
        second: NodeId,
    },

    #[error("node {parent} lists child {child} more than once")]
    DuplicateChild { parent: NodeId, child: NodeId },

    #[error("root node {0} is listed as a child of another node")]
    RootHasParent(NodeId),

    #[error("node {0} is not reachable from the root")]
    Unreachable(NodeId),

    #[error("node {0} does not exist in this tree")]
    UnknownNode(NodeId),

    #[error("parent link of node {child} points to {recorded:?}, expected {expected:?}")]
    ParentMismatch {
        child: NodeId,
        recorded: Option<NodeId>,
        expected: Option<NodeId>,
    },
}

/// Builds a [`Tree`] bottom-up: children first, then their parents
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<NodeData>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its id. Parent links are filled in by [`TreeBuilder::finish`].
    pub fn node(&mut self, kind: impl Into<String>, span: Span, children: Vec<Child>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind: kind.into(),
            children,
            span,
            parent: None,
        });
        id
    }

    /// Number of nodes added so far
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Finish the tree rooted at `root`.
    ///
    /// Parent links are derived from child lists without validation; call
    /// [`Tree::validate`] before walking a tree from an untrusted producer.
    pub fn finish(mut self, root: NodeId) -> Tree {
        for index in 0..self.nodes.len() {
            let parent = NodeId(index);
            let child_ids: Vec<NodeId> = self.nodes[index]
                .children
                .iter()
                .filter_map(|c| match c {
                    Child::Node(id) => Some(*id),
                    _ => None,
                })
                .collect();
            for child in child_ids {
                if let Some(data) = self.nodes.get_mut(child.0) {
                    data.parent = Some(parent);
                }
            }
        }

        Tree {
            nodes: self.nodes,
            root,
        }
    }
}

/// An immutable syntax tree
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Tree {
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: self.root,
        }
    }

    /// Look up a node by id
    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeRef { tree: self, id })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check the single-parent, acyclic, single-rooted invariant
    pub fn validate(&self) -> Result<(), TreeError> {
        if self.root.0 >= self.nodes.len() {
            return Err(TreeError::UnknownNode(self.root));
        }

        let mut owner: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        for (index, data) in self.nodes.iter().enumerate() {
            let parent = NodeId(index);
            for child in &data.children {
                let Child::Node(child) = child else {
                    continue;
                };
                if child.0 >= self.nodes.len() {
                    return Err(TreeError::UnknownNode(*child));
                }
                if *child == self.root {
                    return Err(TreeError::RootHasParent(self.root));
                }
                match owner[child.0] {
                    Some(first) if first == parent => {
                        return Err(TreeError::DuplicateChild {
                            parent,
                            child: *child,
                        })
                    }
                    Some(first) => {
                        return Err(TreeError::SharedChild {
                            child: *child,
                            first,
                            second: parent,
                        })
                    }
                    None => owner[child.0] = Some(parent),
                }
            }
        }

        for (index, data) in self.nodes.iter().enumerate() {
            if data.parent != owner[index] {
                return Err(TreeError::ParentMismatch {
                    child: NodeId(index),
                    recorded: data.parent,
                    expected: owner[index],
                });
            }
        }

        // Every node has at most one owner and the root has none, so a walk from
        // the root that reaches every node also rules out cycles.
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if seen[id.0] {
                continue;
            }
            seen[id.0] = true;
            for child in &self.nodes[id.0].children {
                if let Child::Node(child) = child {
                    stack.push(*child);
                }
            }
        }
        if let Some(index) = seen.iter().position(|reached| !reached) {
            return Err(TreeError::Unreachable(NodeId(index)));
        }

        Ok(())
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }
}

/// Borrowed handle to one node of a [`Tree`]
#[derive(Clone, Copy)]
pub struct NodeRef<'t> {
    tree: &'t Tree,
    id: NodeId,
}

impl<'t> NodeRef<'t> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    pub fn kind(&self) -> &'t str {
        &self.tree.data(self.id).kind
    }

    pub fn span(&self) -> Span {
        self.tree.data(self.id).span
    }

    pub fn children(&self) -> &'t [Child] {
        &self.tree.data(self.id).children
    }

    /// Child at `index` resolved to a node, if it is one
    pub fn child_node(&self, index: usize) -> Option<NodeRef<'t>> {
        match self.children().get(index)? {
            Child::Node(id) => Some(self.resolve(*id)),
            _ => None,
        }
    }

    /// Child at `index` as an atom, if it is one
    pub fn child_atom(&self, index: usize) -> Option<&'t Atom> {
        match self.children().get(index)? {
            Child::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    /// Sub-node children in order, skipping atoms and nils
    pub fn child_nodes(&self) -> impl Iterator<Item = NodeRef<'t>> + 't {
        let tree = self.tree;
        self.children().iter().filter_map(move |c| match c {
            Child::Node(id) => Some(NodeRef { tree, id: *id }),
            _ => None,
        })
    }

    pub fn parent(&self) -> Option<NodeRef<'t>> {
        self.tree.data(self.id).parent.map(|id| self.resolve(id))
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self) -> impl Iterator<Item = NodeRef<'t>> + 't {
        std::iter::successors(self.parent(), |node| node.parent())
    }

    /// The node itself followed by its whole subtree in pre-order, left to right
    pub fn descendants(&self) -> Descendants<'t> {
        Descendants {
            tree: self.tree,
            stack: vec![self.id],
        }
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind() == kind
    }

    fn resolve(&self, id: NodeId) -> NodeRef<'t> {
        NodeRef {
            tree: self.tree,
            id,
        }
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} @{})", self.kind(), self.id, self.span())
    }
}

/// Pre-order iterator over a subtree
pub struct Descendants<'t> {
    tree: &'t Tree,
    stack: Vec<NodeId>,
}

impl<'t> Iterator for Descendants<'t> {
    type Item = NodeRef<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let children = &self.tree.data(id).children;
        self.stack.extend(children.iter().rev().filter_map(|c| match c {
            Child::Node(id) => Some(*id),
            _ => None,
        }));
        Some(NodeRef {
            tree: self.tree,
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// (class (const nil :A) nil (def :call (args) nil))
    fn sample() -> Tree {
        let mut b = TreeBuilder::new();
        let name = b.node(
            "const",
            Span::new(6, 7),
            vec![Child::Nil, Child::atom("A")],
        );
        let args = b.node("args", Span::point(16), vec![]);
        let def = b.node(
            "def",
            Span::new(10, 22),
            vec![Child::atom("call"), args.into(), Child::Nil],
        );
        let class = b.node(
            "class",
            Span::new(0, 26),
            vec![name.into(), Child::Nil, def.into()],
        );
        b.finish(class)
    }

    #[test]
    fn test_navigation() {
        let tree = sample();
        tree.validate().unwrap();

        let root = tree.root();
        assert_eq!(root.kind(), "class");
        assert!(root.parent().is_none());

        let def = root.child_node(2).unwrap();
        assert_eq!(def.kind(), "def");
        assert_eq!(def.child_atom(0).unwrap().text, "call");
        assert_eq!(def.parent(), Some(root));

        let args = def.child_node(1).unwrap();
        let kinds: Vec<_> = args.ancestors().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["def", "class"]);
    }

    #[test]
    fn test_descendants_preorder() {
        let tree = sample();
        let kinds: Vec<_> = tree.root().descendants().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["class", "const", "def", "args"]);
    }

    #[test]
    fn test_validate_shared_child() {
        let mut b = TreeBuilder::new();
        let leaf = b.node("self", Span::new(0, 4), vec![]);
        let left = b.node("begin", Span::new(0, 4), vec![leaf.into()]);
        let right = b.node("begin", Span::new(0, 4), vec![leaf.into()]);
        let root = b.node("begin", Span::new(0, 4), vec![left.into(), right.into()]);
        let tree = b.finish(root);

        assert_eq!(
            tree.validate(),
            Err(TreeError::SharedChild {
                child: leaf,
                first: left,
                second: right,
            })
        );
    }

    #[test]
    fn test_validate_cycle_and_orphans() {
        let mut b = TreeBuilder::new();
        let a = b.node("begin", Span::default(), vec![Child::Node(NodeId(1))]);
        let _b = b.node("begin", Span::default(), vec![Child::Node(NodeId(0))]);
        let root = b.node("begin", Span::default(), vec![]);
        let tree = b.finish(root);
        assert_eq!(tree.validate(), Err(TreeError::Unreachable(a)));

        let mut b = TreeBuilder::new();
        let root = b.node("begin", Span::default(), vec![Child::Node(NodeId(0))]);
        let tree = b.finish(root);
        assert_eq!(tree.validate(), Err(TreeError::RootHasParent(root)));
    }

    #[test]
    fn test_validate_duplicate_and_unknown() {
        let mut b = TreeBuilder::new();
        let leaf = b.node("self", Span::default(), vec![]);
        let root = b.node("begin", Span::default(), vec![leaf.into(), leaf.into()]);
        let tree = b.finish(root);
        assert_eq!(
            tree.validate(),
            Err(TreeError::DuplicateChild {
                parent: root,
                child: leaf,
            })
        );

        let mut b = TreeBuilder::new();
        let root = b.node("begin", Span::default(), vec![Child::Node(NodeId(7))]);
        let tree = b.finish(root);
        assert_eq!(tree.validate(), Err(TreeError::UnknownNode(NodeId(7))));
    }
}
