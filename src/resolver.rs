use crate::ast::{
    Document, Node, ObjectNode, Origin, Override, Slot, RawLiteral, Substitution, SubstitutionId,
};
use crate::error::{HoconError, ResolveError};
use crate::value::{Literal, LiteralKind, Value};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Where unresolved substitutions look for an environment variable.
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    /// `std::env::var`.
    #[default]
    Process,
    Disabled,
    /// A fixed set of variables.
    Map(HashMap<String, String>),
}

impl EnvSource {
    pub fn lookup(&self, name: &str) -> Option<String> {
        match self {
            EnvSource::Process => std::env::var(name).ok(),
            EnvSource::Disabled => None,
            EnvSource::Map(vars) => vars.get(name).cloned(),
        }
    }
}

/// Turns a parsed [`Document`] into a [`Value`] tree with every
/// substitution replaced.
///
/// Substitutions are looked up against the document as finally merged, so
/// forward references work. Only substitutions still reachable from the
/// root are evaluated; one that a later assignment overrode never runs.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    env: EnvSource,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }

    pub fn resolve(&self, document: &Document) -> Result<Value, HoconError> {
        let mut pass = Pass {
            document,
            env: &self.env,
            states: vec![State::Pending; document.substitutions.len()],
            reaching: Vec::new(),
        };
        let root = pass.freeze_object(&document.root)?;
        let resolved = pass
            .states
            .iter()
            .filter(|state| matches!(state, State::Done(_)))
            .count();
        log::debug!(
            "resolved {resolved} of {} substitutions",
            document.substitutions.len()
        );
        Ok(Value::Object(root))
    }
}

#[derive(Debug, Clone)]
enum State {
    Pending,
    InProgress,
    /// `None` when an optional substitution vanished.
    Done(Option<Value>),
}

/// Longest chain of substitutions followed while looking into their targets.
const MAX_REACH_DEPTH: usize = 256;

/// One resolution run. Results are memoized per substitution so each one is
/// evaluated at most once, and meeting one that is still in progress means
/// the references form a cycle.
struct Pass<'d> {
    document: &'d Document,
    env: &'d EnvSource,
    states: Vec<State>,
    /// Substitutions being looked into, with the path read below each one.
    reaching: Vec<(SubstitutionId, Vec<String>)>,
}

/// What a path leads to during resolution.
enum Reach {
    Found(Value),
    /// A non-object sits on the way, so nothing deeper can exist.
    Blocked,
    Missing,
}

impl Reach {
    fn found(self) -> Option<Value> {
        match self {
            Reach::Found(value) => Some(value),
            Reach::Blocked | Reach::Missing => None,
        }
    }
}

/// A concatenation piece after its substitutions were resolved.
enum Part {
    Space(String),
    Value { value: Value, quoted: bool },
}

impl<'d> Pass<'d> {
    /// Converts a node to a value. `None` means the node vanished (an
    /// optional substitution with nothing behind it).
    fn freeze(&mut self, node: &'d Node) -> Result<Option<Value>, HoconError> {
        match node {
            Node::Literal(raw) => Ok(Some(Value::Literal(literal(raw)))),
            Node::Whitespace(ws) => Ok(Some(Value::Literal(Literal::quoted(ws.clone())))),
            Node::Object(object) => Ok(Some(Value::Object(self.freeze_object(object)?))),
            Node::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(value) = self.freeze(item)? {
                        values.push(value);
                    }
                }
                Ok(Some(Value::Array(values)))
            }
            Node::Concat(concat) => self.join(&concat.pieces, &concat.origin),
            Node::Substitution(id) => self.substitute(*id),
            Node::Override(layer) => self.freeze_override(layer),
        }
    }

    /// The prior value only matters when the new one vanishes or when both
    /// are objects.
    fn freeze_override(&mut self, layer: &'d Override) -> Result<Option<Value>, HoconError> {
        match self.freeze(&layer.value)? {
            None => self.freeze(&layer.prior),
            Some(top @ Value::Object(_)) => match self.freeze(&layer.prior)? {
                Some(mut base @ Value::Object(_)) => {
                    base.merge(top);
                    Ok(Some(base))
                }
                _ => Ok(Some(top)),
            },
            Some(value) => Ok(Some(value)),
        }
    }

    fn freeze_object(&mut self, object: &'d ObjectNode) -> Result<IndexMap<String, Value>, HoconError> {
        let mut fields = IndexMap::with_capacity(object.len());
        for (key, node) in object.iter() {
            if let Some(value) = self.freeze(node)? {
                fields.insert(key.clone(), value);
            }
        }
        Ok(fields)
    }

    fn substitute(&mut self, id: SubstitutionId) -> Result<Option<Value>, HoconError> {
        let document = self.document;
        let Some(substitution) = document.substitution(id) else {
            return Ok(None);
        };
        match self.states.get(id) {
            Some(State::Done(value)) => return Ok(value.clone()),
            Some(State::InProgress) => return Err(cycle(substitution)),
            _ => {}
        }

        self.states[id] = State::InProgress;
        let value = self.evaluate(substitution)?;
        self.states[id] = State::Done(value.clone());
        Ok(value)
    }

    fn evaluate(&mut self, substitution: &'d Substitution) -> Result<Option<Value>, HoconError> {
        let found = match &substitution.self_reference {
            Some(reference) => match reference.prior.as_deref() {
                Some(prior) => {
                    let rest = substitution
                        .path
                        .segments()
                        .get(reference.key_depth..)
                        .unwrap_or_default();
                    self.reach(prior, rest)?.found()
                }
                None => None,
            },
            None => match self.lookup(substitution.path.segments())? {
                Some(value) => Some(value),
                None => match &substitution.fallback_path {
                    Some(path) => self.lookup(path.segments())?,
                    None => None,
                },
            },
        };
        if found.is_some() {
            log::trace!("resolved ${{{}}}", substitution.path);
            return Ok(found);
        }

        let env_name = substitution
            .fallback_path
            .as_ref()
            .unwrap_or(&substitution.path)
            .flattened(".");
        if let Some(text) = self.env.lookup(&env_name) {
            log::trace!("resolved ${{{}}} from environment variable `{env_name}`", substitution.path);
            return Ok(Some(Value::Literal(Literal::quoted(text))));
        }
        if substitution.optional {
            log::trace!("optional ${{?{}}} is unbound and vanishes", substitution.path);
            return Ok(None);
        }
        Err(unresolved(substitution))
    }

    fn lookup(&mut self, segments: &[String]) -> Result<Option<Value>, HoconError> {
        let document = self.document;
        Ok(self.reach_field(&document.root, segments)?.found())
    }

    /// Follows `segments` through the merged document and freezes only the
    /// node they end at, so a reference into an object does not depend on
    /// that object's other fields.
    fn reach_field(&mut self, object: &'d ObjectNode, segments: &[String]) -> Result<Reach, HoconError> {
        let Some((first, rest)) = segments.split_first() else {
            return Ok(Reach::Missing);
        };
        match object.get(first) {
            Some(node) => self.reach(node, rest),
            None => Ok(Reach::Missing),
        }
    }

    fn reach(&mut self, node: &'d Node, rest: &[String]) -> Result<Reach, HoconError> {
        if rest.is_empty() {
            return Ok(match self.freeze(node)? {
                Some(value) => Reach::Found(value),
                None => Reach::Missing,
            });
        }
        match node {
            Node::Object(object) => self.reach_field(object, rest),
            Node::Substitution(id) => self.reach_through(*id, rest),
            Node::Override(layer) => match self.reach(&layer.value, rest)? {
                Reach::Missing => self.reach(&layer.prior, rest),
                Reach::Found(top @ Value::Object(_)) => match self.reach(&layer.prior, rest)? {
                    Reach::Found(mut base @ Value::Object(_)) => {
                        base.merge(top);
                        Ok(Reach::Found(base))
                    }
                    _ => Ok(Reach::Found(top)),
                },
                other => Ok(other),
            },
            Node::Concat(_) => Ok(match self.freeze(node)? {
                Some(value) => reach_value(value, rest),
                None => Reach::Missing,
            }),
            Node::Literal(_) | Node::Whitespace(_) | Node::Array(_) => Ok(Reach::Blocked),
        }
    }

    /// Looks `rest` up below substitution `id`. When the substitution's own
    /// path is bound in the document, the lookup continues there without
    /// evaluating the whole target.
    fn reach_through(&mut self, id: SubstitutionId, rest: &[String]) -> Result<Reach, HoconError> {
        let document = self.document;
        let Some(substitution) = document.substitution(id) else {
            return Ok(Reach::Missing);
        };
        if let Some(State::Done(value)) = self.states.get(id) {
            return Ok(match value.clone() {
                Some(value) => reach_value(value, rest),
                None => Reach::Missing,
            });
        }

        if substitution.self_reference.is_none() {
            let targets = std::iter::once(&substitution.path).chain(substitution.fallback_path.as_ref());
            for target in targets {
                if !matches!(document.root.locate(target.segments()), Slot::Found(_)) {
                    continue;
                }
                let step = (id, rest.to_vec());
                if self.reaching.len() >= MAX_REACH_DEPTH || self.reaching.contains(&step) {
                    return Err(cycle(substitution));
                }
                let full: Vec<String> = target.segments().iter().chain(rest).cloned().collect();
                self.reaching.push(step);
                let reached = self.reach_field(&document.root, &full);
                self.reaching.pop();
                return reached;
            }
        }

        Ok(match self.substitute(id)? {
            Some(value) => reach_value(value, rest),
            None => Reach::Missing,
        })
    }

    /// Joins the pieces of a concatenation. Vanished and null pieces drop
    /// out and whitespace left at either end is discarded.
    fn join(&mut self, pieces: &'d [Node], origin: &Origin) -> Result<Option<Value>, HoconError> {
        let mut parts = Vec::with_capacity(pieces.len());
        let mut saw_null = false;
        for piece in pieces {
            match piece {
                Node::Whitespace(ws) => parts.push(Part::Space(ws.clone())),
                Node::Literal(raw) => {
                    let value = Value::Literal(literal(raw));
                    if value.is_null() {
                        saw_null = true;
                    } else {
                        parts.push(Part::Value {
                            value,
                            quoted: raw.quoted,
                        });
                    }
                }
                other => match self.freeze(other)? {
                    Some(value) if value.is_null() => saw_null = true,
                    Some(value) => {
                        let quoted = value
                            .as_literal()
                            .is_some_and(|lit| lit.kind() == LiteralKind::String);
                        parts.push(Part::Value { value, quoted });
                    }
                    None => {}
                },
            }
        }

        while matches!(parts.last(), Some(Part::Space(_))) {
            parts.pop();
        }
        let first_value = parts
            .iter()
            .position(|part| matches!(part, Part::Value { .. }))
            .unwrap_or(parts.len());
        parts.drain(..first_value);

        let value_count = parts
            .iter()
            .filter(|part| matches!(part, Part::Value { .. }))
            .count();
        match value_count {
            0 if saw_null => return Ok(Some(Value::null())),
            0 => return Ok(None),
            1 => {
                return Ok(parts.into_iter().find_map(|part| match part {
                    Part::Value { value, .. } => Some(value),
                    Part::Space(_) => None,
                }))
            }
            _ => {}
        }

        let mut values = parts.iter().filter_map(|part| match part {
            Part::Value { value, .. } => Some(value),
            Part::Space(_) => None,
        });
        let Some(first) = values.next() else {
            return Ok(None);
        };
        let shape = Shape::of(first);
        if let Some(other) = values.find(|value| Shape::of(value) != shape) {
            return Err(mismatch(shape.describe(), Shape::of(other).describe(), origin));
        }

        Ok(Some(match shape {
            Shape::Array => Value::Array(
                parts
                    .into_iter()
                    .filter_map(|part| match part {
                        Part::Value {
                            value: Value::Array(items),
                            ..
                        } => Some(items),
                        _ => None,
                    })
                    .flatten()
                    .collect(),
            ),
            Shape::Object => {
                let mut merged = Value::empty_object();
                for part in parts {
                    if let Part::Value { value, .. } = part {
                        merged.merge(value);
                    }
                }
                merged
            }
            Shape::Text => join_text(parts),
        }))
    }
}

fn join_text(parts: Vec<Part>) -> Value {
    let mut text = String::new();
    let mut quoted = false;
    for part in parts {
        match part {
            Part::Space(ws) => text.push_str(&ws),
            Part::Value {
                value: Value::Literal(lit),
                quoted: piece_quoted,
            } => {
                quoted |= piece_quoted;
                text.push_str(lit.text());
            }
            Part::Value { .. } => {}
        }
    }
    if quoted {
        Value::Literal(Literal::quoted(text))
    } else {
        Value::Literal(Literal::unquoted(text))
    }
}

fn literal(raw: &RawLiteral) -> Literal {
    if raw.quoted {
        Literal::quoted(raw.text.clone())
    } else {
        Literal::unquoted(raw.text.clone())
    }
}

fn reach_value(value: Value, rest: &[String]) -> Reach {
    if rest.is_empty() {
        return Reach::Found(value);
    }
    let mut current = &value;
    for segment in rest {
        match current {
            Value::Object(fields) => match fields.get(segment) {
                Some(inner) => current = inner,
                None => return Reach::Missing,
            },
            Value::Literal(_) | Value::Array(_) => return Reach::Blocked,
        }
    }
    Reach::Found(current.clone())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Text,
    Array,
    Object,
}

impl Shape {
    fn of(value: &Value) -> Shape {
        match value {
            Value::Literal(_) => Shape::Text,
            Value::Array(_) => Shape::Array,
            Value::Object(_) => Shape::Object,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Shape::Text => "a string",
            Shape::Array => "an array",
            Shape::Object => "an object",
        }
    }
}

fn unresolved(substitution: &Substitution) -> HoconError {
    let origin = &substitution.origin;
    ResolveError::UnresolvedSubstitution {
        path: substitution.path.to_string(),
        src: (*origin.source).clone(),
        span: origin.span.into(),
        line: origin.span.line,
        column: origin.span.column,
    }
    .into()
}

fn cycle(substitution: &Substitution) -> HoconError {
    let origin = &substitution.origin;
    ResolveError::Cycle {
        path: substitution.path.to_string(),
        src: (*origin.source).clone(),
        span: origin.span.into(),
        line: origin.span.line,
        column: origin.span.column,
    }
    .into()
}

fn mismatch(left: &'static str, right: &'static str, origin: &Origin) -> HoconError {
    ResolveError::ConcatenationMismatch {
        left,
        right,
        src: (*origin.source).clone(),
        span: origin.span.into(),
        line: origin.span.line,
        column: origin.span.column,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn resolve(source: &str) -> Result<Value, HoconError> {
        let document = Parser::new(source)?.parse_document()?;
        Resolver::new()
            .with_env(EnvSource::Disabled)
            .resolve(&document)
    }

    fn resolve_ok(source: &str) -> Value {
        match resolve(source) {
            Ok(value) => value,
            Err(err) => panic!("{:?}", miette::Report::from(err)),
        }
    }

    fn text(value: &Value, path: &str) -> String {
        let path = crate::path::ConfigPath::parse(path).unwrap();
        value
            .get_path(path.segments())
            .and_then(Value::as_str)
            .unwrap_or_else(|| panic!("no text at `{path}`"))
            .to_string()
    }

    #[test]
    fn test_forward_and_backward_references() {
        let value = resolve_ok("a = ${b}\nb = 1\nc = ${b}");
        assert_eq!(text(&value, "a"), "1");
        assert_eq!(text(&value, "c"), "1");
    }

    #[test]
    fn test_reference_into_object_and_whole_object() {
        let value = resolve_ok("db { host = h, port = 5 }\nport = ${db.port}\ncopy = ${db}");
        assert_eq!(text(&value, "port"), "5");
        assert_eq!(text(&value, "copy.host"), "h");
    }

    #[test]
    fn test_string_concatenation_with_substitution() {
        let value = resolve_ok("name = world\ngreeting = hello ${name} \"!\"");
        let greeting = value.get("greeting").and_then(Value::as_literal).unwrap();
        assert_eq!(greeting.text(), "hello world !");
        assert_eq!(greeting.kind(), LiteralKind::String);
    }

    #[test]
    fn test_unquoted_concatenation_kind_is_detected() {
        let value = resolve_ok("a = 1\nb = ${a}${a}");
        let b = value.get("b").and_then(Value::as_literal).unwrap();
        assert_eq!(b.text(), "11");
        assert_eq!(b.kind(), LiteralKind::Number);
    }

    #[test]
    fn test_self_reference_extends_array() {
        let value = resolve_ok("path = [a]\npath = ${path} [b]");
        let items: Vec<&str> = value
            .get("path")
            .and_then(Value::as_array)
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(items, ["a", "b"]);
    }

    #[test]
    fn test_self_reference_extends_string() {
        let value = resolve_ok("s = foo\ns = ${s}bar");
        assert_eq!(text(&value, "s"), "foobar");
    }

    #[test]
    fn test_plus_assign_appends() {
        let value = resolve_ok("a = [1]\na += 2\na += 3\nb += x");
        assert_eq!(value.get("a").and_then(Value::as_array).unwrap().len(), 3);
        assert_eq!(value.get("b").and_then(Value::as_array).unwrap().len(), 1);
    }

    #[test]
    fn test_optional_substitution_vanishes() {
        let value = resolve_ok("a = ${?nope}\nb = [1, ${?nope}, 2]\nc = x ${?nope}");
        assert!(value.get("a").is_none());
        assert_eq!(value.get("b").and_then(Value::as_array).unwrap().len(), 2);
        assert_eq!(text(&value, "c"), "x");
    }

    #[test]
    fn test_optional_self_reference_without_prior_keeps_default() {
        let value = resolve_ok("a = ${?a}");
        assert!(value.get("a").is_none());
    }

    #[test]
    fn test_vanished_override_falls_back_to_prior() {
        let value = resolve_ok("a = [1]\na = ${?nope}\nb = x\nb = ${?nope} ${?nope}");
        assert_eq!(value.get("a").and_then(Value::as_array).unwrap().len(), 1);
        assert_eq!(text(&value, "b"), "x");
    }

    #[test]
    fn test_override_merges_objects_in_order() {
        let value = resolve_ok("s { k = 1, m = 1 }\na { k = 0, n = 0 }\na = ${s}\na { m = 2 }");
        assert_eq!(text(&value, "a.k"), "1");
        assert_eq!(text(&value, "a.n"), "0");
        assert_eq!(text(&value, "a.m"), "2");
    }

    #[test]
    fn test_lookup_into_object_skips_unrelated_fields() {
        let value = resolve_ok("a { x = 1, y = ${b.x} }\nb = ${a}");
        assert_eq!(text(&value, "a.y"), "1");
        assert_eq!(text(&value, "b.y"), "1");
    }

    #[test]
    fn test_cycle_through_partial_lookup_is_reported() {
        let err = resolve("a = ${b}\nb = ${a.x}\nc = ${a.y}").unwrap_err();
        assert!(matches!(err, HoconError::Resolve(ResolveError::Cycle { .. })));
    }

    #[test]
    fn test_required_substitution_missing_is_an_error() {
        let err = resolve("a = ${nope}").unwrap_err();
        assert!(matches!(
            err,
            HoconError::Resolve(ResolveError::UnresolvedSubstitution { ref path, .. }) if path == "nope"
        ));
    }

    #[test]
    fn test_cycle_is_detected() {
        let err = resolve("a = ${b}\nb = ${a}").unwrap_err();
        assert!(matches!(err, HoconError::Resolve(ResolveError::Cycle { .. })));
    }

    #[test]
    fn test_overridden_substitution_is_never_evaluated() {
        let value = resolve_ok("a = ${nope}\na = 1");
        assert_eq!(text(&value, "a"), "1");
    }

    #[test]
    fn test_object_concatenation_merges() {
        let value = resolve_ok("base { a = 1, b = 2 }\nderived = ${base} { b = 3 }");
        assert_eq!(text(&value, "derived.a"), "1");
        assert_eq!(text(&value, "derived.b"), "3");
    }

    #[test]
    fn test_concatenation_mismatch() {
        let err = resolve("a = [1]\nb = ${a} foo").unwrap_err();
        assert!(matches!(
            err,
            HoconError::Resolve(ResolveError::ConcatenationMismatch { .. })
        ));
    }

    #[test]
    fn test_null_pieces_collapse() {
        let value = resolve_ok("n = null\na = ${n}\nb = ${n} ${n}\nc = ${n} x");
        assert!(value.get("a").unwrap().is_null());
        assert!(value.get("b").unwrap().is_null());
        assert_eq!(text(&value, "c"), "x");
    }

    #[test]
    fn test_environment_fallback() {
        let document = Parser::new("home = ${APP_HOME}\nopt = ${?APP_OPT}")
            .unwrap()
            .parse_document()
            .unwrap();
        let env = EnvSource::Map(HashMap::from([("APP_HOME".to_string(), "/srv".to_string())]));
        let value = Resolver::new().with_env(env).resolve(&document).unwrap();
        assert_eq!(text(&value, "home"), "/srv");
        assert!(value.get("opt").is_none());
    }

    #[test]
    fn test_document_value_beats_environment() {
        let document = Parser::new("APP_HOME = here\nhome = ${APP_HOME}")
            .unwrap()
            .parse_document()
            .unwrap();
        let env = EnvSource::Map(HashMap::from([("APP_HOME".to_string(), "/srv".to_string())]));
        let value = Resolver::new().with_env(env).resolve(&document).unwrap();
        assert_eq!(text(&value, "home"), "here");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let document = Parser::new("a = 1\nb = ${a} ${a}\nc = [${b}]")
            .unwrap()
            .parse_document()
            .unwrap();
        let resolver = Resolver::new().with_env(EnvSource::Disabled);
        assert_eq!(
            resolver.resolve(&document).unwrap(),
            resolver.resolve(&document).unwrap()
        );
    }
}
