use crate::ast::Document;
use crate::config::Config;
use crate::error::HoconError;
use crate::include::{FileIncluder, Includer};
use crate::parser::Parser;
use crate::resolver::{EnvSource, Resolver};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Settings for one parse.
#[derive(Clone)]
pub struct ParseOptions {
    origin: String,
    includer: Option<Arc<dyn Includer>>,
    env: EnvSource,
    strict_includes: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            origin: "input.conf".to_string(),
            includer: None,
            env: EnvSource::default(),
            strict_includes: false,
        }
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("origin", &self.origin)
            .field("includer", &self.includer.is_some())
            .field("env", &self.env)
            .field("strict_includes", &self.strict_includes)
            .finish()
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name shown in diagnostics, usually a file name.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn includer(mut self, includer: impl Includer + 'static) -> Self {
        self.includer = Some(Arc::new(includer));
        self
    }

    pub fn env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }

    /// Makes a missing plain `include` an error instead of a warning.
    pub fn strict_includes(mut self, strict: bool) -> Self {
        self.strict_includes = strict;
        self
    }
}

/// Parses `source` into a document with its substitutions still pending.
pub fn parse_document(source: &str, options: &ParseOptions) -> Result<Document, HoconError> {
    let parser = Parser::new_with_name(source, options.origin.clone())?
        .with_strict_includes(options.strict_includes);
    let mut parser = match &options.includer {
        Some(includer) => parser.with_includer(includer.as_ref()),
        None => parser,
    };
    parser.parse_document()
}

/// Parses and resolves `source`.
pub fn parse_with(source: &str, options: &ParseOptions) -> Result<Config, HoconError> {
    let document = parse_document(source, options)?;
    let root = Resolver::new()
        .with_env(options.env.clone())
        .resolve(&document)?;
    Ok(Config::from_value(root))
}

/// Parses and resolves `source` with default options.
pub fn parse_str(source: &str) -> Result<Config, HoconError> {
    parse_with(source, &ParseOptions::default())
}

/// Reads and resolves the file at `path`. Includes are looked up relative
/// to the including file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Config, HoconError> {
    parse_file_with(path, ParseOptions::default())
}

/// [`parse_file`] with explicit options. The origin and includer are
/// derived from `path` unless an includer was set.
pub fn parse_file_with(path: impl AsRef<Path>, options: ParseOptions) -> Result<Config, HoconError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|err| HoconError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    let mut options = options.origin(path.display().to_string());
    if options.includer.is_none() {
        options = options.includer(FileIncluder::for_file(path));
    }
    parse_with(&source, &options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_simple_parse_to_json() {
        let config = parse_str("name = demo\nport = 8080").unwrap();
        let json: serde_json::Value = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "demo", "port": 8080 }));
    }

    #[test]
    fn test_options_select_environment() {
        let env = EnvSource::Map(HashMap::from([("HOME_DIR".to_string(), "/home/x".to_string())]));
        let options = ParseOptions::new().env(env);
        let config = parse_with("home = ${HOME_DIR}", &options).unwrap();
        assert_eq!(config.get_string("home").unwrap(), "/home/x");

        let options = ParseOptions::new().env(EnvSource::Disabled);
        assert!(parse_with("home = ${HOME_DIR}", &options).is_err());
    }

    #[test]
    fn test_options_includer_and_strictness() {
        let includer = |name: &str| -> Result<Option<Document>, HoconError> {
            if name == "shared" {
                Parser::new("shared = yes")?.parse_document().map(Some)
            } else {
                Ok(None)
            }
        };
        let options = ParseOptions::new().includer(includer);
        let config = parse_with("include \"shared\"\ninclude \"absent\"", &options).unwrap();
        assert!(config.get_bool("shared").unwrap());

        let strict = options.strict_includes(true);
        assert!(parse_with("include \"absent\"", &strict).is_err());
    }

    #[test]
    fn test_options_are_shared_between_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ParseOptions>();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("common.conf"), "level = info").unwrap();
        let options = ParseOptions::new()
            .env(EnvSource::Disabled)
            .includer(FileIncluder::new(dir.path()));

        std::thread::scope(|scope| {
            for index in 0..4 {
                let options = &options;
                scope.spawn(move || {
                    let source = format!("include \"common\"\nworker = {index}");
                    let config = parse_with(&source, options).unwrap();
                    assert_eq!(config.get_string("level").unwrap(), "info");
                    assert_eq!(config.get_i32("worker").unwrap(), index);
                });
            }
        });
    }

    #[test]
    fn test_parse_file_reports_io_errors() {
        let err = parse_file("/definitely/not/here.conf").unwrap_err();
        assert!(matches!(err, HoconError::Io { .. }));
    }
}
