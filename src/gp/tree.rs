//! Typed expression trees stored as a prefix node sequence.
//!
//! A tree is a pre-order list of nodes. Each node records its own arity and
//! output type, so subtree boundaries and type indices can be computed
//! without consulting the primitive set. Names are resolved through the set
//! only for rendering and parsing.

use crate::gp::primitives::{PrimitiveSet, Symbol, TerminalKind};
use crate::gp::value::{Type, Value};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One node of a prefix tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Internal node applying a registered primitive.
    Primitive {
        /// Primitive id in the set.
        id: usize,
        /// Number of children.
        arity: usize,
        /// Output type.
        ret: Type,
    },
    /// Leaf bound to a positional root argument.
    Argument {
        /// Terminal id in the set.
        id: usize,
        /// Argument position.
        index: usize,
        /// Argument type.
        ret: Type,
    },
    /// Leaf holding a value: a fixed terminal or a sampled ephemeral.
    Constant {
        /// Terminal id in the set.
        id: usize,
        /// Frozen value.
        value: Value,
    },
}

impl Node {
    /// Number of children this node takes.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::Primitive { arity, .. } => *arity,
            Self::Argument { .. } | Self::Constant { .. } => 0,
        }
    }

    /// Output type of this node.
    #[must_use]
    pub fn ty(&self) -> Type {
        match self {
            Self::Primitive { ret, .. } | Self::Argument { ret, .. } => *ret,
            Self::Constant { value, .. } => value.ty(),
        }
    }
}

/// Structural or typing problem with a tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    /// The node sequence is empty.
    #[error("tree has no nodes")]
    Empty,
    /// The sequence ends before every primitive has all its children.
    #[error("tree ends before all primitives are saturated")]
    Truncated,
    /// Nodes remain after the root's subtree is complete.
    #[error("unexpected node at index {0} after the root subtree ended")]
    TrailingNodes(usize),
    /// A node references a primitive or terminal that does not exist or does
    /// not match its registered schema.
    #[error("node {index} does not match the primitive set: {reason}")]
    Registry {
        /// Node index.
        index: usize,
        /// What did not match.
        reason: String,
    },
    /// A child's type differs from what its parent requires.
    #[error("node {index} has type {found} where {expected} is required")]
    TypeMismatch {
        /// Node index.
        index: usize,
        /// Required type.
        expected: Type,
        /// Node type.
        found: Type,
    },
    /// Text could not be parsed as a tree.
    #[error("parse error at byte {position}: {message}")]
    Parse {
        /// Byte offset in the input.
        position: usize,
        /// What went wrong.
        message: String,
    },
}

/// A typed expression tree.
///
/// Serialized as its prefix node list; deserializing checks the shape the
/// same way [`Tree::from_nodes`] does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Node>", into = "Vec<Node>")]
pub struct Tree {
    nodes: Vec<Node>,
}

impl TryFrom<Vec<Node>> for Tree {
    type Error = TreeError;

    fn try_from(nodes: Vec<Node>) -> Result<Self, Self::Error> {
        Self::from_nodes(nodes)
    }
}

impl From<Tree> for Vec<Node> {
    fn from(tree: Tree) -> Self {
        tree.nodes
    }
}

impl Tree {
    /// Build a tree from a prefix node sequence.
    ///
    /// Only the shape is checked here; use
    /// [`PrimitiveSet::validate`](crate::gp::PrimitiveSet::validate) for the
    /// typing rules.
    ///
    /// # Errors
    ///
    /// Fails if the sequence is empty, truncated, or has trailing nodes.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, TreeError> {
        check_shape(&nodes)?;
        Ok(Self { nodes })
    }

    /// Wrap nodes already known to be well formed.
    pub(crate) fn from_nodes_unchecked(nodes: Vec<Node>) -> Self {
        debug_assert!(check_shape(&nodes).is_ok());
        Self { nodes }
    }

    /// Prefix node sequence.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Length of the longest root-to-leaf path in edges. A single node has
    /// height 0.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut stack = vec![0usize];
        let mut max_depth = 0;
        for node in &self.nodes {
            let depth = stack.pop().unwrap_or(0);
            max_depth = max_depth.max(depth);
            stack.extend(std::iter::repeat_n(depth + 1, node.arity()));
        }
        max_depth
    }

    /// Type of the root node.
    #[must_use]
    pub fn root_type(&self) -> Type {
        self.nodes.first().map_or(Type::Bool, Node::ty)
    }

    /// Index range of the subtree rooted at `begin`.
    ///
    /// # Panics
    ///
    /// Panics if `begin` is out of bounds.
    #[must_use]
    pub fn subtree(&self, begin: usize) -> Range<usize> {
        let mut end = begin + 1;
        let mut open = self.nodes[begin].arity();
        while open > 0 {
            open = open + self.nodes[end].arity() - 1;
            end += 1;
        }
        begin..end
    }

    /// Nodes of the subtree rooted at `begin`.
    #[must_use]
    pub fn subtree_nodes(&self, begin: usize) -> &[Node] {
        &self.nodes[self.subtree(begin)]
    }

    /// New tree with the subtree at `range` replaced by `replacement`.
    ///
    /// The caller guarantees `replacement` is a complete subtree of the same
    /// output type as the one it replaces.
    #[must_use]
    pub(crate) fn splice(&self, range: Range<usize>, replacement: &[Node]) -> Self {
        let mut nodes = Vec::with_capacity(self.nodes.len() - range.len() + replacement.len());
        nodes.extend_from_slice(&self.nodes[..range.start]);
        nodes.extend_from_slice(replacement);
        nodes.extend_from_slice(&self.nodes[range.end..]);
        Self::from_nodes_unchecked(nodes)
    }

    /// Indices of the nodes whose output type is `ty`, skipping the root.
    #[must_use]
    pub fn positions_of(&self, ty: Type) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, n)| n.ty() == ty)
            .map(|(i, _)| i)
            .collect()
    }

    /// Render in prefix form, e.g. `addFloat(int_to_float(i), x)`.
    ///
    /// The output depends only on the node sequence and the names in `pset`.
    #[must_use]
    pub fn render(&self, pset: &PrimitiveSet) -> String {
        let mut out = String::new();
        let mut pending: Vec<usize> = Vec::new();
        for node in &self.nodes {
            match node {
                Node::Primitive { id, arity, .. } => {
                    let name = pset.primitive(*id).map_or("?", |p| p.name());
                    out.push_str(name);
                    out.push('(');
                    pending.push(*arity);
                    continue;
                }
                Node::Argument { id, .. } => {
                    out.push_str(pset.terminal(*id).map_or("?", |t| t.name()));
                }
                Node::Constant { value, .. } => out.push_str(&value.to_string()),
            }
            // Close every primitive whose last child just finished.
            while let Some(remaining) = pending.last_mut() {
                *remaining -= 1;
                if *remaining == 0 {
                    pending.pop();
                    out.push(')');
                } else {
                    out.push_str(", ");
                    break;
                }
            }
        }
        out
    }

    /// Parse the prefix form produced by [`Tree::render`].
    ///
    /// Names resolve to primitives and argument terminals. Literals resolve
    /// to a fixed terminal with an equal value, else to the first ephemeral
    /// of the literal's type.
    ///
    /// # Errors
    ///
    /// Fails on malformed text, unknown names, or literals no terminal can
    /// hold. The result is type-checked against `pset`.
    pub fn parse(pset: &PrimitiveSet, text: &str) -> Result<Self, TreeError> {
        let mut parser = Parser {
            pset,
            text,
            pos: 0,
            nodes: Vec::new(),
        };
        parser.expr()?;
        parser.skip_whitespace();
        if parser.pos < text.len() {
            return Err(parser.error("trailing input"));
        }
        let tree = Self::from_nodes(parser.nodes)?;
        pset.validate(&tree)?;
        Ok(tree)
    }
}

fn check_shape(nodes: &[Node]) -> Result<(), TreeError> {
    if nodes.is_empty() {
        return Err(TreeError::Empty);
    }
    let mut open = 1usize;
    for (index, node) in nodes.iter().enumerate() {
        if open == 0 {
            return Err(TreeError::TrailingNodes(index));
        }
        open = open - 1 + node.arity();
    }
    if open > 0 {
        return Err(TreeError::Truncated);
    }
    Ok(())
}

struct Parser<'a> {
    pset: &'a PrimitiveSet,
    text: &'a str,
    pos: usize,
    nodes: Vec<Node>,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> TreeError {
        TreeError::Parse {
            position: self.pos,
            message: message.to_owned(),
        }
    }

    fn rest(&self) -> &str {
        &self.text[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<(), TreeError> {
        self.skip_whitespace();
        if self.rest().starts_with('"') {
            let value = self.string_literal()?;
            return self.constant(value);
        }
        let token_len = self
            .rest()
            .find(|c: char| c == '(' || c == ')' || c == ',' || c.is_whitespace())
            .unwrap_or(self.rest().len());
        if token_len == 0 {
            return Err(self.error("expected a name or literal"));
        }
        let token = &self.text[self.pos..self.pos + token_len];
        let start = self.pos;
        self.pos += token_len;

        match self.pset.lookup(token) {
            Some(Symbol::Primitive(id)) => self.primitive(id),
            Some(Symbol::Terminal(id)) => self.terminal(id, start),
            None => match literal(token) {
                Some(value) => self.constant(value),
                None => {
                    self.pos = start;
                    Err(self.error(&format!("unknown symbol `{token}`")))
                }
            },
        }
    }

    fn primitive(&mut self, id: usize) -> Result<(), TreeError> {
        let Some(prim) = self.pset.primitive(id) else {
            return Err(self.error("dangling primitive id"));
        };
        self.nodes.push(Node::Primitive {
            id,
            arity: prim.arity(),
            ret: prim.output(),
        });
        if !self.eat('(') {
            return Err(self.error("expected `(`"));
        }
        for i in 0..prim.arity() {
            if i > 0 && !self.eat(',') {
                return Err(self.error("expected `,`"));
            }
            self.expr()?;
        }
        if !self.eat(')') {
            return Err(self.error("expected `)`"));
        }
        Ok(())
    }

    fn terminal(&mut self, id: usize, start: usize) -> Result<(), TreeError> {
        let Some(term) = self.pset.terminal(id) else {
            return Err(self.error("dangling terminal id"));
        };
        let node = match term.kind() {
            TerminalKind::Argument(index) => Node::Argument {
                id,
                index: *index,
                ret: term.ty(),
            },
            TerminalKind::Constant(value) => Node::Constant {
                id,
                value: value.clone(),
            },
            TerminalKind::Ephemeral(_) => {
                self.pos = start;
                return Err(self.error("ephemeral constants are written as literals"));
            }
        };
        self.nodes.push(node);
        Ok(())
    }

    fn constant(&mut self, value: Value) -> Result<(), TreeError> {
        let candidates = self.pset.terminals_of(value.ty());
        let fixed = candidates.iter().copied().find(|&id| {
            matches!(
                self.pset.terminal(id).map(|t| t.kind()),
                Some(TerminalKind::Constant(v)) if *v == value
            )
        });
        let ephemeral = || {
            candidates.iter().copied().find(|&id| {
                matches!(
                    self.pset.terminal(id).map(|t| t.kind()),
                    Some(TerminalKind::Ephemeral(_))
                )
            })
        };
        let Some(id) = fixed.or_else(ephemeral) else {
            return Err(self.error(&format!("no terminal can hold {value}")));
        };
        self.nodes.push(Node::Constant { id, value });
        Ok(())
    }

    fn string_literal(&mut self) -> Result<Value, TreeError> {
        // Opening quote already checked by the caller.
        let body = &self.rest()[1..];
        let mut out = String::new();
        let mut chars = body.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 2;
                    return Ok(Value::Text(out));
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '0')) => out.push('\0'),
                    Some((_, escaped @ ('"' | '\\'))) => out.push(escaped),
                    Some((j, other)) => {
                        self.pos += j + 1;
                        return Err(self.error(&format!("unknown escape `\\{other}`")));
                    }
                    None => break,
                },
                _ => out.push(c),
            }
        }
        Err(self.error("unterminated string literal"))
    }
}

fn literal(token: &str) -> Option<Value> {
    match token {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        _ => {}
    }
    if let Ok(i) = token.parse::<i64>() {
        return Some(Value::Int(i));
    }
    let is_float = token.contains(['.', 'e', 'E']) || matches!(token, "inf" | "-inf" | "NaN");
    if is_float {
        return token.parse::<f64>().ok().map(Value::Float);
    }
    None
}
