//! The mutable tree the parser builds.
//!
//! Objects are extended in place as fields are read, so every merge rule
//! is applied in document order. Substitutions are not resolved here:
//! each one lives in [`Document::substitutions`] and the tree refers to it
//! by index. The resolver turns this tree into an immutable
//! [`crate::value::Value`].

use crate::lexer::Span;
use crate::path::ConfigPath;
use indexmap::IndexMap;
use miette::NamedSource;
use std::sync::Arc;

pub type SubstitutionId = usize;

/// Source location of a node, for errors raised after parsing.
#[derive(Debug, Clone)]
pub struct Origin {
    pub source: Arc<NamedSource<String>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawLiteral {
    pub text: String,
    pub quoted: bool,
}

impl RawLiteral {
    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }

    pub fn unquoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Literal(RawLiteral),
    /// Whitespace between two pieces of a concatenation.
    Whitespace(String),
    Object(ObjectNode),
    Array(Vec<Node>),
    Concat(Concat),
    Substitution(SubstitutionId),
    /// A value whose final shape is only known after resolution, written
    /// over an earlier binding of the same key.
    Override(Override),
}

/// Adjacent value pieces joined at resolution time.
#[derive(Debug, Clone)]
pub struct Concat {
    pub pieces: Vec<Node>,
    pub origin: Origin,
}

/// `value` laid over `prior`. The resolver reads `prior` when `value`
/// vanishes, and merges the two when both turn out to be objects.
#[derive(Debug, Clone)]
pub struct Override {
    pub prior: Box<Node>,
    pub value: Box<Node>,
}

impl Node {
    pub fn is_object(&self) -> bool {
        matches!(self, Node::Object(_))
    }

    /// True for nodes that may vanish or turn into an object once resolved.
    pub fn is_deferred(&self) -> bool {
        matches!(
            self,
            Node::Substitution(_) | Node::Concat(_) | Node::Override(_)
        )
    }

    /// `above` as it reads once laid over `below`.
    pub(crate) fn layered(below: Option<Node>, above: &Node) -> Node {
        match below {
            Some(below) => overlay(below, above.clone()),
            None => above.clone(),
        }
    }

    /// The object new fields are assigned into, if this node has one.
    fn open_object(&mut self) -> Option<&mut ObjectNode> {
        match self {
            Node::Object(object) => Some(object),
            Node::Override(layer) => match layer.value.as_mut() {
                Node::Object(object) => Some(object),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn shift_substitutions(&mut self, offset: usize) {
        match self {
            Node::Substitution(id) => *id += offset,
            Node::Object(object) => object.shift_substitutions(offset),
            Node::Array(items) => items
                .iter_mut()
                .for_each(|item| item.shift_substitutions(offset)),
            Node::Concat(concat) => concat
                .pieces
                .iter_mut()
                .for_each(|piece| piece.shift_substitutions(offset)),
            Node::Override(layer) => {
                layer.prior.shift_substitutions(offset);
                layer.value.shift_substitutions(offset);
            }
            Node::Literal(_) | Node::Whitespace(_) => {}
        }
    }
}

/// Combines a new binding of a key with the one it replaces. Objects merge
/// right away. When either side is unresolved the choice waits for the
/// resolver. Otherwise the new value wins.
fn overlay(mut prior: Node, value: Node) -> Node {
    let deferred = |prior: Node, value: Node| {
        Node::Override(Override {
            prior: Box::new(prior),
            value: Box::new(value),
        })
    };
    if let Node::Object(top) = value {
        if let Some(object) = prior.open_object() {
            object.merge(top);
            return prior;
        }
        return if prior.is_deferred() {
            deferred(prior, Node::Object(top))
        } else {
            Node::Object(top)
        };
    }
    if value.is_deferred() {
        deferred(prior, value)
    } else {
        value
    }
}

/// What lives at a path inside an [`ObjectNode`].
#[derive(Debug)]
pub enum Slot<'a> {
    Found(&'a Node),
    /// A non-object sits on the way, so nothing deeper can exist.
    Blocked,
    Missing,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectNode {
    fields: IndexMap<String, Node>,
}

impl ObjectNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.fields.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.fields.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn locate(&self, segments: &[String]) -> Slot<'_> {
        let Some((first, rest)) = segments.split_first() else {
            return Slot::Missing;
        };
        match self.fields.get(first) {
            None => Slot::Missing,
            Some(node) if rest.is_empty() => Slot::Found(node),
            Some(Node::Object(inner)) => inner.locate(rest),
            Some(Node::Override(layer)) => match layer.value.as_ref() {
                Node::Object(inner) => inner.locate(rest),
                _ => Slot::Blocked,
            },
            Some(_) => Slot::Blocked,
        }
    }

    /// Binds `node` at `segments`. An object assigned over an object merges
    /// into it and a literal or array replaces the previous value outright.
    /// Substitutions and concatenations keep the previous value underneath
    /// them in an [`Override`]. Intermediate literals and arrays are replaced
    /// by fresh objects.
    pub fn assign(&mut self, segments: &[String], node: Node) {
        let Some((first, rest)) = segments.split_first() else {
            if let Node::Object(object) = node {
                self.merge(object);
            }
            return;
        };

        if rest.is_empty() {
            match self.fields.get_mut(first) {
                Some(slot) => {
                    let prior = std::mem::replace(slot, Node::Whitespace(String::new()));
                    *slot = overlay(prior, node);
                }
                None => {
                    self.fields.insert(first.clone(), node);
                }
            }
            return;
        }

        let child = self
            .fields
            .entry(first.clone())
            .or_insert_with(|| Node::Object(ObjectNode::new()));
        if child.open_object().is_none() {
            let prior = std::mem::replace(child, Node::Object(ObjectNode::new()));
            if prior.is_deferred() {
                *child = Node::Override(Override {
                    prior: Box::new(prior),
                    value: Box::new(Node::Object(ObjectNode::new())),
                });
            }
        }
        if let Some(inner) = child.open_object() {
            inner.assign(rest, node);
        }
    }

    /// Deep-merges `other` into `self`, `other` winning on conflicts.
    pub fn merge(&mut self, other: ObjectNode) {
        for (key, node) in other.fields {
            self.assign(std::slice::from_ref(&key), node);
        }
    }

    pub(crate) fn shift_substitutions(&mut self, offset: usize) {
        self.fields
            .values_mut()
            .for_each(|node| node.shift_substitutions(offset));
    }
}

/// A `${path}` / `${?path}` placeholder awaiting resolution.
#[derive(Debug, Clone)]
pub struct Substitution {
    pub path: ConfigPath,
    pub optional: bool,
    /// Set when `path` starts with the key being assigned.
    pub self_reference: Option<SelfReference>,
    /// Path to retry when the substitution came from a nested include and
    /// its prefixed `path` is unbound.
    pub fallback_path: Option<ConfigPath>,
    pub origin: Origin,
}

/// Snapshot taken when a key is about to be overwritten by a value that
/// refers to the key itself.
#[derive(Debug, Clone)]
pub struct SelfReference {
    /// Number of leading `path` segments that name the assigned key.
    pub key_depth: usize,
    /// The key's value before this assignment, if it had one.
    pub prior: Option<Box<Node>>,
}

/// A parsed but unresolved document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub root: ObjectNode,
    pub substitutions: Vec<Substitution>,
}

impl Document {
    pub fn substitution(&self, id: SubstitutionId) -> Option<&Substitution> {
        self.substitutions.get(id)
    }
}
