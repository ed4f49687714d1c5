use crate::config::Config;
use crate::error::HoconError;
use crate::value::{Literal, LiteralKind, Value};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Numbers and booleans are emitted natively, `null` as unit and every
/// other literal as a string. Objects keep their key order.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Literal(literal) => serialize_literal(literal, serializer),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

fn serialize_literal<S: Serializer>(literal: &Literal, serializer: S) -> Result<S::Ok, S::Error> {
    let text = literal.text();
    match literal.kind() {
        LiteralKind::Null => serializer.serialize_unit(),
        LiteralKind::Boolean => serializer.serialize_bool(text == "true"),
        LiteralKind::Number => {
            if let Ok(integer) = text.parse::<i64>() {
                serializer.serialize_i64(integer)
            } else if let Ok(float) = text.parse::<f64>() {
                serializer.serialize_f64(float)
            } else {
                serializer.serialize_str(text)
            }
        }
        LiteralKind::String | LiteralKind::Unquoted => serializer.serialize_str(text),
    }
}

impl Serialize for Config {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl Config {
    /// Every leaf as `path -> text`, path segments joined with `separator`.
    /// Arrays contribute their elements under the index (`list.0`); empty
    /// objects and arrays contribute nothing.
    ///
    /// # Errors
    /// `DuplicateKey` when two different paths flatten to the same string,
    /// e.g. a quoted `"a.b"` next to a nested `a.b` with `.` as separator.
    pub fn flatten(&self, separator: &str) -> Result<IndexMap<String, String>, HoconError> {
        let mut visitor = Flattener {
            separator,
            prefix: Vec::new(),
            out: IndexMap::new(),
        };
        visitor.visit(&self.to_value())?;
        Ok(visitor.out)
    }
}

struct Flattener<'s> {
    separator: &'s str,
    prefix: Vec<String>,
    out: IndexMap<String, String>,
}

impl Flattener<'_> {
    fn visit(&mut self, value: &Value) -> Result<(), HoconError> {
        match value {
            Value::Object(fields) => {
                for (key, child) in fields {
                    self.prefix.push(key.clone());
                    let visited = self.visit(child);
                    self.prefix.pop();
                    visited?;
                }
                Ok(())
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    self.prefix.push(index.to_string());
                    let visited = self.visit(child);
                    self.prefix.pop();
                    visited?;
                }
                Ok(())
            }
            Value::Literal(literal) => {
                let path = self.prefix.join(self.separator);
                if self.out.contains_key(&path) {
                    return Err(HoconError::DuplicateKey { path });
                }
                self.out.insert(path, literal.text().to_string());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::parse_str;

    #[test]
    fn test_json_uses_native_scalars_and_keeps_order() {
        let config = parse_str("z = 1\na = true\nm = null\ns = \"2\"\nf = 1.5\nw = hello").unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(
            json,
            r#"{"z":1,"a":true,"m":null,"s":"2","f":1.5,"w":"hello"}"#
        );
    }

    #[test]
    fn test_to_json_and_yaml() {
        let config = parse_str("server { port = 8080, hosts = [a, b] }").unwrap();
        let json: serde_json::Value = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(json["server"]["port"], 8080);
        assert_eq!(json["server"]["hosts"][1], "b");

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("port: 8080"));
    }

    #[test]
    fn test_flatten() {
        let config = parse_str("a { b = 1, c = [x, y] }\nd = null").unwrap();
        let flat = config.flatten(".").unwrap();
        assert_eq!(flat.get("a.b").map(String::as_str), Some("1"));
        assert_eq!(flat.get("a.c.1").map(String::as_str), Some("y"));
        assert_eq!(flat.get("d").map(String::as_str), Some("null"));
    }

    #[test]
    fn test_flatten_duplicate_key() {
        let config = parse_str("\"a.b\" = 1\na { b = 2 }").unwrap();
        assert!(matches!(
            config.flatten("."),
            Err(HoconError::DuplicateKey { ref path }) if path == "a.b"
        ));
        assert_eq!(config.flatten("/").unwrap().len(), 2);
    }
}
