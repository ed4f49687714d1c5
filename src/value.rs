//! The immutable value tree handed out after resolution.
//!
//! Literals keep their source text plus a [`LiteralKind`] tag; what a
//! literal *means* (a port number, a timeout, a flag) is decided by the
//! accessor that reads it, see [`crate::convert`].

use indexmap::IndexMap;
use std::fmt;

/// How a literal looked in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    /// Quoted text, or a concatenation that contained quoted text.
    String,
    /// Bare text that is not a number, boolean or null.
    Unquoted,
    Number,
    Boolean,
    Null,
}

impl LiteralKind {
    /// Classifies unquoted text.
    pub fn detect(text: &str) -> LiteralKind {
        match text {
            "null" => LiteralKind::Null,
            "true" | "false" => LiteralKind::Boolean,
            _ if looks_numeric(text) => LiteralKind::Number,
            _ => LiteralKind::Unquoted,
        }
    }
}

fn looks_numeric(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    digits.starts_with(|c: char| c.is_ascii_digit())
        && (text.parse::<i64>().is_ok() || text.parse::<f64>().is_ok())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    text: String,
    kind: LiteralKind,
}

impl Literal {
    pub fn new(text: impl Into<String>, kind: LiteralKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self::new(text, LiteralKind::String)
    }

    pub fn unquoted(text: impl Into<String>) -> Self {
        let text = text.into();
        let kind = LiteralKind::detect(&text);
        Self { text, kind }
    }

    pub fn null() -> Self {
        Self::new("null", LiteralKind::Null)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> LiteralKind {
        self.kind
    }

    pub fn is_null(&self) -> bool {
        self.kind == LiteralKind::Null
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Literal(Literal),
    Object(IndexMap<String, Value>),
    Array(Vec<Value>),
}

impl Value {
    pub fn null() -> Self {
        Value::Literal(Literal::null())
    }

    pub fn empty_object() -> Self {
        Value::Object(IndexMap::new())
    }

    /// Name of the value's shape, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Literal(literal) => match literal.kind {
                LiteralKind::String | LiteralKind::Unquoted => "string",
                LiteralKind::Number => "number",
                LiteralKind::Boolean => "boolean",
                LiteralKind::Null => "null",
            },
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Literal(literal) if literal.is_null())
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Value::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// Text of a non-null literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Literal(literal) if !literal.is_null() => Some(literal.text()),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|fields| fields.get(key))
    }

    pub fn get_path(&self, segments: &[String]) -> Option<&Value> {
        segments
            .iter()
            .try_fold(self, |value, segment| value.get(segment))
    }

    /// Overlays `top` onto `self`: objects merge key by key, anything else
    /// in `top` replaces what was there.
    pub fn merge(&mut self, top: Value) {
        match (self, top) {
            (Value::Object(fields), Value::Object(top_fields)) => {
                for (key, value) in top_fields {
                    let both_objects =
                        value.is_object() && fields.get(&key).is_some_and(Value::is_object);
                    if both_objects {
                        if let Some(existing) = fields.get_mut(&key) {
                            existing.merge(value);
                        }
                    } else {
                        fields.insert(key, value);
                    }
                }
            }
            (slot, top) => *slot = top,
        }
    }

    /// `self` with gaps filled from `fallback`. Only objects are combined;
    /// any other value in `self` hides the fallback entirely.
    pub fn with_fallback(&self, fallback: &Value) -> Value {
        match (self, fallback) {
            (Value::Object(fields), Value::Object(fallback_fields)) => {
                let mut merged = IndexMap::with_capacity(fields.len().max(fallback_fields.len()));
                for (key, value) in fields {
                    let combined = match fallback_fields.get(key) {
                        Some(other) => value.with_fallback(other),
                        None => value.clone(),
                    };
                    merged.insert(key.clone(), combined);
                }
                for (key, value) in fallback_fields {
                    if !merged.contains_key(key) {
                        merged.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(merged)
            }
            _ => self.clone(),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Literal(Literal::quoted(text))
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Literal(Literal::quoted(text))
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Literal(Literal::new(flag.to_string(), LiteralKind::Boolean))
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Value::Literal(Literal::new(number.to_string(), LiteralKind::Number))
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Value::Literal(Literal::new(number.to_string(), LiteralKind::Number))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(fields: IndexMap<String, Value>) -> Self {
        Value::Object(fields)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(literal) => write!(f, "{}", literal.text()),
            other => match serde_json::to_string(other) {
                Ok(json) => write!(f, "{json}"),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(entries: &[(&str, Value)]) -> Value {
        Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_detect_literal_kinds() {
        assert_eq!(LiteralKind::detect("null"), LiteralKind::Null);
        assert_eq!(LiteralKind::detect("true"), LiteralKind::Boolean);
        assert_eq!(LiteralKind::detect("-12"), LiteralKind::Number);
        assert_eq!(LiteralKind::detect("1.5e3"), LiteralKind::Number);
        assert_eq!(LiteralKind::detect("yes"), LiteralKind::Unquoted);
        assert_eq!(LiteralKind::detect("inf"), LiteralKind::Unquoted);
        assert_eq!(LiteralKind::detect("10s"), LiteralKind::Unquoted);
    }

    #[test]
    fn test_merge_is_deep_and_top_wins() {
        let mut base = object(&[
            ("a", object(&[("x", Value::from(1i64)), ("y", Value::from(2i64))])),
            ("b", Value::from("keep")),
        ]);
        base.merge(object(&[
            ("a", object(&[("y", Value::from(20i64)), ("z", Value::from(30i64))])),
            ("c", Value::from(true)),
        ]));

        let a = base.get("a").unwrap();
        assert_eq!(a.get("x"), Some(&Value::from(1i64)));
        assert_eq!(a.get("y"), Some(&Value::from(20i64)));
        assert_eq!(a.get("z"), Some(&Value::from(30i64)));
        assert_eq!(base.get("b"), Some(&Value::from("keep")));
        assert_eq!(base.get("c"), Some(&Value::from(true)));
    }

    #[test]
    fn test_merge_non_object_replaces() {
        let mut base = object(&[("a", object(&[("x", Value::from(1i64))]))]);
        base.merge(object(&[("a", Value::from(2i64))]));
        assert_eq!(base.get("a"), Some(&Value::from(2i64)));
    }

    #[test]
    fn test_with_fallback_keeps_primary_order_and_values() {
        let primary = object(&[("x", Value::from(1i64)), ("n", object(&[("a", Value::from(1i64))]))]);
        let fallback = object(&[
            ("y", Value::from(3i64)),
            ("x", Value::from(2i64)),
            ("n", object(&[("b", Value::from(2i64))])),
        ]);
        let merged = primary.with_fallback(&fallback);
        let keys: Vec<&String> = merged.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["x", "n", "y"]);
        assert_eq!(merged.get("x"), Some(&Value::from(1i64)));
        assert_eq!(
            merged.get_path(&["n".to_string(), "b".to_string()]),
            Some(&Value::from(2i64))
        );
    }

    #[test]
    fn test_null_hides_fallback_object() {
        let primary = object(&[("a", Value::null())]);
        let fallback = object(&[("a", object(&[("b", Value::from(1i64))]))]);
        assert!(primary.with_fallback(&fallback).get("a").unwrap().is_null());
    }
}
