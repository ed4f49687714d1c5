//! Layered, read-only access to resolved configuration.
//!
//! A [`Config`] is either a single resolved tree or a pair of configs where
//! the first takes precedence. [`Config::with_fallback`] only builds a new
//! pair, so chaining is cheap and ancestor trees are shared, never copied.
//! Objects that appear in several layers are merged when a path is read.

use crate::convert::{ByteSize, FromValue};
use crate::error::{ConversionError, HoconError};
use crate::path::{AsPath, ConfigPath};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    inner: Arc<Inner>,
}

/// Most paths a lookup cache holds before it stops taking new entries.
const CACHE_CAPACITY: usize = 4096;

#[derive(Debug)]
struct Inner {
    layer: Layer,
    /// Read-through cache of scalar, array and missing lookups, local to
    /// this chain. Objects are never cached.
    cache: Option<RwLock<HashMap<ConfigPath, Option<Value>>>>,
}

#[derive(Debug, Clone)]
enum Layer {
    Root(Arc<Value>),
    Chain { primary: Config, fallback: Config },
}

/// Outcome of looking a path up in one layer.
enum Lookup {
    Found(Value),
    /// A non-object, `null` included, sits on the path and hides every
    /// fallback below it.
    Blocked,
    Missing,
}

impl Default for Config {
    fn default() -> Self {
        Self::empty()
    }
}

impl Config {
    pub fn empty() -> Self {
        Self::from_value(Value::empty_object())
    }

    pub fn from_value(value: Value) -> Self {
        Self::from_layer(Layer::Root(Arc::new(value)), true)
    }

    fn from_layer(layer: Layer, cached: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                layer,
                cache: cached.then(|| RwLock::new(HashMap::new())),
            }),
        }
    }

    /// A config that reads from `self` first and from `fallback` for
    /// anything `self` leaves unbound.
    pub fn with_fallback(&self, fallback: &Config) -> Config {
        Self::from_layer(
            Layer::Chain {
                primary: self.clone(),
                fallback: fallback.clone(),
            },
            self.inner.cache.is_some(),
        )
    }

    /// The same layers with the lookup cache switched on or off. The new
    /// config always starts with an empty cache.
    pub fn with_lookup_cache(&self, enabled: bool) -> Config {
        Self::from_layer(self.inner.layer.clone(), enabled)
    }

    fn locate(&self, segments: &[String]) -> Lookup {
        match &self.inner.layer {
            Layer::Root(root) => locate_value(root, segments),
            Layer::Chain { primary, fallback } => match primary.locate(segments) {
                Lookup::Found(value) if value.is_object() => match fallback.locate(segments) {
                    Lookup::Found(below) => Lookup::Found(value.with_fallback(&below)),
                    Lookup::Blocked | Lookup::Missing => Lookup::Found(value),
                },
                Lookup::Missing => fallback.locate(segments),
                found_or_blocked => found_or_blocked,
            },
        }
    }

    fn lookup(&self, path: &ConfigPath) -> Option<Value> {
        if let Some(cache) = &self.inner.cache {
            if let Some(hit) = cache.read().get(path) {
                return hit.clone();
            }
        }
        let found = match self.locate(path.segments()) {
            Lookup::Found(value) => Some(value),
            Lookup::Blocked | Lookup::Missing => None,
        };
        if let Some(cache) = &self.inner.cache {
            if !found.as_ref().is_some_and(Value::is_object) {
                let mut cache = cache.write();
                if cache.len() < CACHE_CAPACITY {
                    cache.insert(path.clone(), found.clone());
                }
            }
        }
        found
    }

    /// The value bound at `path`, with objects merged across layers.
    pub fn get_value<P: AsPath + ?Sized>(&self, path: &P) -> Result<Value, HoconError> {
        let path = path.to_path()?;
        self.lookup(&path).ok_or_else(|| HoconError::Missing {
            path: path.to_string(),
        })
    }

    /// True when `path` is bound to something other than `null`.
    pub fn has_path<P: AsPath + ?Sized>(&self, path: &P) -> bool {
        path.to_path()
            .ok()
            .and_then(|path| self.lookup(&path))
            .is_some_and(|value| !value.is_null())
    }

    /// Whether `path` is bound to `null`. Unbound paths are an error.
    pub fn is_null<P: AsPath + ?Sized>(&self, path: &P) -> Result<bool, HoconError> {
        self.get_value(path).map(|value| value.is_null())
    }

    pub fn get<T: FromValue, P: AsPath + ?Sized>(&self, path: &P) -> Result<T, HoconError> {
        let path = path.to_path()?;
        let value = self.lookup(&path).ok_or_else(|| HoconError::Missing {
            path: path.to_string(),
        })?;
        T::from_value(&value).map_err(|source| HoconError::Conversion {
            path: path.to_string(),
            source,
        })
    }

    /// Like [`Config::get`], but an unbound or `null` path is `Ok(None)`.
    pub fn get_opt<T: FromValue, P: AsPath + ?Sized>(&self, path: &P) -> Result<Option<T>, HoconError> {
        match self.get::<Option<T>, P>(path) {
            Err(err) if err.is_missing() => Ok(None),
            other => other,
        }
    }

    /// Like [`Config::get`], with any failure replaced by `default`.
    pub fn get_or<T: FromValue, P: AsPath + ?Sized>(&self, path: &P, default: T) -> T {
        self.get(path).unwrap_or(default)
    }

    pub fn get_string<P: AsPath + ?Sized>(&self, path: &P) -> Result<String, HoconError> {
        self.get(path)
    }

    pub fn get_bool<P: AsPath + ?Sized>(&self, path: &P) -> Result<bool, HoconError> {
        self.get(path)
    }

    pub fn get_i32<P: AsPath + ?Sized>(&self, path: &P) -> Result<i32, HoconError> {
        self.get(path)
    }

    pub fn get_i64<P: AsPath + ?Sized>(&self, path: &P) -> Result<i64, HoconError> {
        self.get(path)
    }

    pub fn get_u64<P: AsPath + ?Sized>(&self, path: &P) -> Result<u64, HoconError> {
        self.get(path)
    }

    pub fn get_f64<P: AsPath + ?Sized>(&self, path: &P) -> Result<f64, HoconError> {
        self.get(path)
    }

    pub fn get_duration<P: AsPath + ?Sized>(&self, path: &P) -> Result<Duration, HoconError> {
        self.get(path)
    }

    pub fn get_bytes<P: AsPath + ?Sized>(&self, path: &P) -> Result<ByteSize, HoconError> {
        self.get(path)
    }

    /// Converts every element; a scalar reads as a one-element list.
    pub fn get_list<T: FromValue, P: AsPath + ?Sized>(&self, path: &P) -> Result<Vec<T>, HoconError> {
        self.get(path)
    }

    /// The raw elements of an array. Unlike [`Config::get_list`] a scalar
    /// is rejected.
    pub fn get_array<P: AsPath + ?Sized>(&self, path: &P) -> Result<Vec<Value>, HoconError> {
        let path = path.to_path()?;
        match self.get_value(&path)? {
            Value::Array(items) => Ok(items),
            null if null.is_null() => Ok(Vec::new()),
            other => Err(HoconError::Conversion {
                path: path.to_string(),
                source: ConversionError::WrongType {
                    expected: "array",
                    found: other.type_name(),
                },
            }),
        }
    }

    pub fn get_object<P: AsPath + ?Sized>(&self, path: &P) -> Result<IndexMap<String, Value>, HoconError> {
        self.get::<Config, P>(path).map(|config| match config.to_value() {
            Value::Object(fields) => fields,
            _ => IndexMap::new(),
        })
    }

    /// The merged object at `path` as a config of its own.
    pub fn get_config<P: AsPath + ?Sized>(&self, path: &P) -> Result<Config, HoconError> {
        self.get(path)
    }

    /// The whole merged tree.
    pub fn to_value(&self) -> Value {
        match self.locate(&[]) {
            Lookup::Found(value) => value,
            Lookup::Blocked | Lookup::Missing => Value::empty_object(),
        }
    }

    /// Top-level keys, primary layers first.
    pub fn keys(&self) -> Vec<String> {
        match self.to_value() {
            Value::Object(fields) => fields.into_keys().collect(),
            _ => Vec::new(),
        }
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        match self.to_value() {
            Value::Object(fields) => fields.into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Renders the merged tree as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_value())
    }

    /// Renders the merged tree as YAML.
    ///
    /// # Errors
    /// Returns a `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.to_value())
    }
}

fn locate_value(root: &Value, segments: &[String]) -> Lookup {
    let mut current = root;
    for segment in segments {
        match current {
            Value::Object(fields) => match fields.get(segment) {
                Some(child) => current = child,
                None => return Lookup::Missing,
            },
            _ => return Lookup::Blocked,
        }
    }
    Lookup::Found(current.clone())
}

/// Objects convert to a config rooted at them; `null` to an empty one.
impl FromValue for Config {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Object(_) => Ok(Config::from_value(value.clone())),
            null if null.is_null() => Ok(Config::empty()),
            other => Err(ConversionError::WrongType {
                expected: "object",
                found: other.type_name(),
            }),
        }
    }
}
