//! Ruby front end: tree-sitter-ruby concrete syntax lowered into engine trees
//!
//! The lowered shapes follow the familiar RuboCop AST so patterns read the
//! same way: `(class NAME SUPER BODY)`, `(def :name (args) BODY)`,
//! `(defs RECV :name (args) BODY)`, `(send RECV :name ARGS...)`,
//! `(const SCOPE :Name)`. Absent parts are `nil` children; a body with several
//! statements is wrapped in `begin`. Comments are dropped. Anything else keeps
//! its tree-sitter kind with its named children lowered.

use crate::frontend::{Frontend, ParseError};
use crate::source::{LineIndex, Span};
use crate::tree::{Atom, Child, NodeId, Tree, TreeBuilder};

type TsNode<'a> = tree_sitter::Node<'a>;

/// The built-in Ruby front end
#[derive(Debug, Default, Clone, Copy)]
pub struct RubyFrontend;

impl Frontend for RubyFrontend {
    fn id(&self) -> &str {
        "ruby"
    }

    fn description(&self) -> &str {
        "Ruby sources via tree-sitter-ruby"
    }

    fn extensions(&self) -> &[&str] {
        &["rb", "rake", "gemspec", "ru"]
    }

    fn file_names(&self) -> &[&str] {
        &["Gemfile", "Rakefile", "Guardfile"]
    }

    fn parse(&self, text: &str) -> Result<Tree, ParseError> {
        parse(text)
    }
}

/// Parse Ruby source into an engine tree rooted at a `begin` node
pub fn parse(text: &str) -> Result<Tree, ParseError> {
    let mut parser = tree_sitter::Parser::new();
    let language: tree_sitter::Language = tree_sitter_ruby::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| ParseError::Language(e.to_string()))?;

    let ts_tree = parser.parse(text, None).ok_or(ParseError::NoTree)?;
    let root = ts_tree.root_node();
    if root.has_error() {
        return Err(syntax_error(root, text));
    }

    let mut lowering = Lowering {
        text,
        builder: TreeBuilder::new(),
    };
    let (program, _) = lowering.program(root);
    Ok(lowering.builder.finish(program))
}

fn syntax_error(root: TsNode<'_>, text: &str) -> ParseError {
    let culprit = first_error(root).unwrap_or(root);
    let position = LineIndex::new(text).line_col(text, culprit.start_byte());
    let message = if culprit.is_missing() {
        format!("missing '{}'", culprit.kind())
    } else {
        let snippet: String = text
            .get(culprit.start_byte()..culprit.end_byte())
            .unwrap_or("")
            .chars()
            .take(20)
            .collect();
        format!("unexpected '{}'", snippet.trim())
    };
    ParseError::Syntax {
        line: position.line,
        column: position.column,
        message,
    }
}

/// First ERROR or MISSING node in pre-order
fn first_error(node: TsNode<'_>) -> Option<TsNode<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<TsNode<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

fn span(node: TsNode<'_>) -> Span {
    Span::new(node.start_byte(), node.end_byte())
}

/// Named children without comments
fn named(node: TsNode<'_>) -> Vec<TsNode<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect()
}

/// Named children that are not one of the given fields
fn unfielded<'a>(node: TsNode<'a>, fields: &[&str]) -> Vec<TsNode<'a>> {
    let taken: Vec<usize> = fields
        .iter()
        .filter_map(|f| node.child_by_field_name(f))
        .map(|n| n.id())
        .collect();
    named(node)
        .into_iter()
        .filter(|n| !taken.contains(&n.id()))
        .collect()
}

struct Lowering<'s> {
    text: &'s str,
    builder: TreeBuilder,
}

impl Lowering<'_> {
    fn text_of(&self, node: TsNode<'_>) -> &str {
        self.text.get(node.start_byte()..node.end_byte()).unwrap_or("")
    }

    fn atom(&self, node: TsNode<'_>) -> Child {
        Child::Atom(Atom::spanned(self.text_of(node), span(node)))
    }

    fn add(&mut self, kind: &str, span: Span, children: Vec<Child>) -> (NodeId, Span) {
        (self.builder.node(kind, span, children), span)
    }

    fn program(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        let statements = self.statements(named(node));
        let children = statements.into_iter().map(|(id, _)| Child::Node(id)).collect();
        self.add("begin", span(node), children)
    }

    fn statements(&mut self, nodes: Vec<TsNode<'_>>) -> Vec<(NodeId, Span)> {
        let mut flat = Vec::new();
        for node in nodes {
            match node.kind() {
                "body_statement" | "block_body" => flat.extend(named(node)),
                _ => flat.push(node),
            }
        }
        flat.into_iter().map(|n| self.statement(n)).collect()
    }

    /// A bare identifier on its own is a method call without receiver or arguments
    fn statement(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        if node.kind() == "identifier" {
            let name = self.atom(node);
            return self.add("send", span(node), vec![Child::Nil, name]);
        }
        self.lower(node)
    }

    /// Body of a class, module or method: nil, the single statement, or `begin`
    fn body(&mut self, nodes: Vec<TsNode<'_>>) -> Child {
        let statements = self.statements(nodes);
        match statements.as_slice() {
            [] => Child::Nil,
            [(id, _)] => Child::Node(*id),
            [(_, first), .., (_, last)] => {
                let joined = first.join(*last);
                let children = statements.iter().map(|(id, _)| Child::Node(*id)).collect();
                Child::Node(self.add("begin", joined, children).0)
            }
        }
    }

    fn field(&mut self, node: TsNode<'_>, name: &str) -> Child {
        match node.child_by_field_name(name) {
            Some(child) => Child::Node(self.lower(child).0),
            None => Child::Nil,
        }
    }

    fn lower(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        match node.kind() {
            "program" => self.program(node),
            "class" => self.class(node),
            "module" => {
                let name = self.field(node, "name");
                let body = self.body(unfielded(node, &["name"]));
                self.add("module", span(node), vec![name, body])
            }
            "singleton_class" => {
                let value = self.field(node, "value");
                let body = self.body(unfielded(node, &["value"]));
                self.add("sclass", span(node), vec![value, body])
            }
            "method" => self.method(node),
            "singleton_method" => self.singleton_method(node),
            "constant" => {
                let name = self.atom(node);
                self.add("const", span(node), vec![Child::Nil, name])
            }
            "scope_resolution" => self.scope_resolution(node),
            "call" | "method_call" | "command_call" => self.call(node),
            "self" => self.add("self", span(node), vec![]),
            "nil" | "true" | "false" => self.add(node.kind(), span(node), vec![]),
            "simple_symbol" => {
                let text = self.text_of(node).trim_start_matches(':').to_string();
                self.add("sym", span(node), vec![Child::Atom(Atom::spanned(text, span(node)))])
            }
            "string" => self.string(node),
            "integer" => {
                let value = self.atom(node);
                self.add("int", span(node), vec![value])
            }
            "float" => {
                let value = self.atom(node);
                self.add("float", span(node), vec![value])
            }
            "identifier" => {
                let name = self.atom(node);
                self.add("lvar", span(node), vec![name])
            }
            "instance_variable" => {
                let name = self.atom(node);
                self.add("ivar", span(node), vec![name])
            }
            "assignment" => {
                let left = self.field(node, "left");
                let right = self.field(node, "right");
                self.add("asgn", span(node), vec![left, right])
            }
            "parenthesized_statements" => {
                let children = self
                    .statements(named(node))
                    .into_iter()
                    .map(|(id, _)| Child::Node(id))
                    .collect();
                self.add("begin", span(node), children)
            }
            "method_parameters" | "parameters" | "lambda_parameters" | "block_parameters" => {
                self.args(node)
            }
            _ => self.generic(node),
        }
    }

    /// Unknown node: keep the kind, lower named children; leaves keep their text
    fn generic(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        let children = named(node);
        if children.is_empty() {
            let text = self.atom(node);
            return self.add(node.kind(), span(node), vec![text]);
        }
        let lowered = children
            .into_iter()
            .map(|c| Child::Node(self.lower(c).0))
            .collect();
        self.add(node.kind(), span(node), lowered)
    }

    fn class(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        let name = self.field(node, "name");
        let superclass = match node.child_by_field_name("superclass") {
            // `superclass` wraps the `< Expr` part; the expression is its only named child
            Some(sup) => match named(sup).into_iter().next() {
                Some(expr) => Child::Node(self.lower(expr).0),
                None => Child::Nil,
            },
            None => Child::Nil,
        };
        let body = self.body(unfielded(node, &["name", "superclass"]));
        self.add("class", span(node), vec![name, superclass, body])
    }

    /// Name atom, `(args ...)` and body shared by `def` and `defs`
    fn method_parts(&mut self, node: TsNode<'_>, skip: &[&str]) -> (Child, Child, Child) {
        let name_node = node.child_by_field_name("name");
        let name = match name_node {
            Some(n) => self.atom(n),
            None => Child::Nil,
        };
        let args = match node.child_by_field_name("parameters") {
            Some(params) => self.args(params).0,
            None => {
                let at = name_node.map_or(node.start_byte(), |n| n.end_byte());
                self.add("args", Span::point(at), vec![]).0
            }
        };
        let body = self.body(unfielded(node, skip));
        (name, Child::Node(args), body)
    }

    fn method(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        let (name, args, body) = self.method_parts(node, &["name", "parameters"]);
        self.add("def", span(node), vec![name, args, body])
    }

    fn singleton_method(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        let receiver = self.field(node, "object");
        let (name, args, body) = self.method_parts(node, &["object", "name", "parameters"]);
        self.add("defs", span(node), vec![receiver, name, args, body])
    }

    fn scope_resolution(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        let scope = match node.child_by_field_name("scope") {
            Some(scope) => Child::Node(self.lower(scope).0),
            // Leading `::` refers to the top-level namespace
            None => {
                let start = node.start_byte();
                Child::Node(self.add("cbase", Span::new(start, start + 2), vec![]).0)
            }
        };
        let name = match node.child_by_field_name("name") {
            Some(n) => self.atom(n),
            None => Child::Nil,
        };
        self.add("const", span(node), vec![scope, name])
    }

    fn call(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        let receiver = self.field(node, "receiver");
        let method = node.child_by_field_name("method");
        let name = match method {
            Some(m) => self.atom(m),
            // `recv.()` is sugar for `recv.call()`
            None => Child::atom("call"),
        };

        let mut children = vec![receiver, name];
        let arguments = node.child_by_field_name("arguments");
        if let Some(arguments) = arguments {
            for argument in named(arguments) {
                children.push(Child::Node(self.lower(argument).0));
            }
        }

        let send_end = arguments
            .or(method)
            .map_or(node.end_byte(), |n| n.end_byte());
        let send_span = Span::new(node.start_byte(), send_end);

        let Some(block) = node.child_by_field_name("block") else {
            return self.add("send", span(node), children);
        };

        let (send, _) = self.add("send", send_span, children);
        let args = match block.child_by_field_name("parameters") {
            Some(params) => self.args(params).0,
            None => self.add("args", Span::point(block.start_byte()), vec![]).0,
        };
        let body = self.body(unfielded(block, &["parameters"]));
        self.add(
            "block",
            span(node),
            vec![Child::Node(send), Child::Node(args), body],
        )
    }

    fn string(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        let parts = named(node);
        let plain = parts
            .iter()
            .all(|p| matches!(p.kind(), "string_content" | "escape_sequence"));
        if !plain {
            let children = parts
                .into_iter()
                .map(|p| Child::Node(self.lower(p).0))
                .collect();
            return self.add("dstr", span(node), children);
        }

        let content: String = parts.iter().map(|p| self.text_of(*p)).collect();
        let content_span = match (parts.first(), parts.last()) {
            (Some(first), Some(last)) => Span::new(first.start_byte(), last.end_byte()),
            _ => Span::point(node.start_byte() + 1),
        };
        self.add(
            "str",
            span(node),
            vec![Child::Atom(Atom::spanned(content, content_span))],
        )
    }

    fn args(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        let params = named(node)
            .into_iter()
            .map(|p| Child::Node(self.param(p).0))
            .collect();
        self.add("args", span(node), params)
    }

    fn param(&mut self, node: TsNode<'_>) -> (NodeId, Span) {
        let kind = match node.kind() {
            "identifier" => {
                let name = self.atom(node);
                return self.add("arg", span(node), vec![name]);
            }
            "optional_parameter" => "optarg",
            "keyword_parameter" if node.child_by_field_name("value").is_some() => "kwoptarg",
            "keyword_parameter" => "kwarg",
            "splat_parameter" => "restarg",
            "hash_splat_parameter" => "kwrestarg",
            "block_parameter" => "blockarg",
            "forward_parameter" => return self.add("forward_arg", span(node), vec![]),
            "destructured_parameter" => {
                let inner = named(node)
                    .into_iter()
                    .map(|p| Child::Node(self.param(p).0))
                    .collect();
                return self.add("mlhs", span(node), inner);
            }
            _ => return self.lower(node),
        };

        let name = match node.child_by_field_name("name") {
            Some(n) => self.atom(n),
            None => Child::Nil,
        };
        let mut children = vec![name];
        if let Some(value) = node.child_by_field_name("value") {
            children.push(Child::Node(self.lower(value).0));
        }
        self.add(kind, span(node), children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    fn sexp(text: &str) -> Tree {
        parse(text).unwrap()
    }

    fn first<'t>(tree: &'t Tree, kind: &str) -> crate::tree::NodeRef<'t> {
        tree.root()
            .descendants()
            .find(|n| n.is_kind(kind))
            .unwrap()
    }

    fn assert_matches(tree: &Tree, kind: &str, pattern: &str) {
        let node = first(tree, kind);
        let pattern = Pattern::parse(pattern).unwrap();
        assert!(pattern.is_match(node), "{} does not match {:?}", pattern, node);
    }

    #[test]
    fn test_class_with_singleton_call() {
        let text = "class AnyService\n  def self.call\n  end\nend\n";
        let tree = sexp(text);
        tree.validate().unwrap();

        assert_matches(&tree, "class", "(class (const nil :AnyService) nil (defs ...))");
        assert_matches(&tree, "defs", "(defs (self) :call (args) nil)");

        let defs = first(&tree, "defs");
        let name = defs.child_atom(1).unwrap();
        assert_eq!(name.span, Some(Span::new(28, 32)));
        assert_eq!(defs.child_node(0).unwrap().span(), Span::new(23, 27));
    }

    #[test]
    fn test_body_with_several_statements_is_begin() {
        let text = "class AnyService\n  include OtherBase\n\n  def call\n  end\nend\n";
        let tree = sexp(text);

        assert_matches(&tree, "class", "(class (const nil :AnyService) nil (begin (send ...) (def ...)))");
        assert_matches(&tree, "send", "(send nil :include (const nil :OtherBase))");
        assert_matches(&tree, "def", "(def :call (args) nil)");
    }

    #[test]
    fn test_scoped_constants() {
        let tree = sexp("include ::ServiceBase\ninclude Core::ServiceBase\n");
        let sends: Vec<_> = tree
            .root()
            .descendants()
            .filter(|n| n.is_kind("send"))
            .collect();
        assert_eq!(sends.len(), 2);

        let top = Pattern::parse("(send nil :include (const (cbase) :ServiceBase))").unwrap();
        let scoped =
            Pattern::parse("(send nil :include (const (const nil :Core) :ServiceBase))").unwrap();
        assert!(top.is_match(sends[0]));
        assert!(scoped.is_match(sends[1]));
    }

    #[test]
    fn test_superclass_and_params() {
        let tree = sexp("class A < Base\n  def call(args, opt = 1, *rest, key:, &blk)\n  end\nend\n");
        assert_matches(&tree, "class", "(class (const nil :A) (const nil :Base) (def ...))");
        assert_matches(
            &tree,
            "def",
            "(def :call (args (arg :args) (optarg :opt (int _)) (restarg :rest) (kwarg :key) (blockarg :blk)) nil)",
        );
    }

    #[test]
    fn test_method_body_and_block() {
        let tree = sexp("def call\n  items.each do |item|\n    puts item\n  end\nend\n");
        assert_matches(&tree, "def", "(def :call (args) (block ...))");
        assert_matches(
            &tree,
            "block",
            "(block (send (lvar :items) :each) (args (arg :item)) (send nil :puts (lvar :item)))",
        );
    }

    #[test]
    fn test_literals() {
        let tree = sexp("attr_reader :params\nputs '1'\n@params = params\n");
        assert_matches(&tree, "send", "(send nil :attr_reader (sym :params))");
        assert_matches(&tree, "str", "(str \"1\")");
        assert_matches(&tree, "asgn", "(asgn (ivar :@params) (lvar :params))");
    }

    #[test]
    fn test_comments_are_dropped() {
        let tree = sexp("# frozen_string_literal: true\nclass A\n  # note\nend\n");
        assert_matches(&tree, "class", "(class (const nil :A) nil nil)");
        assert_eq!(tree.root().children().len(), 1);
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse("class A\n  def call(\nend\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
        let (line, column) = err.position().unwrap();
        assert!(line >= 1 && column >= 1);
    }
}
