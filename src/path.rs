//! Structured configuration paths.
//!
//! A path is an ordered list of key segments. In text form segments are
//! separated by unquoted `.`; a quoted segment (`"a.b"`) may contain dots,
//! spaces or nothing at all. Parsing a path once and reusing the
//! [`ConfigPath`] avoids re-splitting the same string on every query.

use miette::Diagnostic;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path is empty")]
    #[diagnostic(code(path::empty))]
    Empty,

    #[error("Path `{path}` has an empty segment")]
    #[diagnostic(
        code(path::empty_segment),
        help("Two dots in a row, or a leading/trailing dot, leave a segment empty. Quote it (`\"\"`) if that is intended.")
    )]
    EmptySegment { path: String },

    #[error("Path `{path}` has an unterminated quoted segment")]
    #[diagnostic(code(path::unterminated_quote))]
    UnterminatedQuote { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ConfigPath {
    segments: Vec<String>,
}

impl ConfigPath {
    /// The empty path, addressing the root object.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses `a.b."c.d"` into `["a", "b", "c.d"]`.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let mut builder = PathBuilder::new(trimmed);
        let mut chars = trimmed.chars().peekable();
        let mut plain = String::new();
        while let Some(c) = chars.next() {
            if c != '"' {
                plain.push(c);
                continue;
            }
            builder.push_unquoted(&plain)?;
            plain.clear();

            let mut quoted = String::new();
            let mut closed = false;
            while let Some(q) = chars.next() {
                match q {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some(escaped) => quoted.push(escaped),
                        None => break,
                    },
                    other => quoted.push(other),
                }
            }
            if !closed {
                return Err(PathError::UnterminatedQuote {
                    path: text.to_string(),
                });
            }
            builder.push_quoted(&quoted);
        }
        builder.push_unquoted(&plain)?;
        builder.finish()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<ConfigPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn child(&self, segment: impl Into<String>) -> ConfigPath {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn join(&self, other: &ConfigPath) -> ConfigPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn starts_with(&self, prefix: &ConfigPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// The segments left after removing `prefix`, if it is one.
    pub fn strip_prefix(&self, prefix: &ConfigPath) -> Option<&[String]> {
        self.segments.strip_prefix(prefix.segments.as_slice())
    }

    /// Segments joined with `separator`, without any quoting.
    pub fn flattened(&self, separator: &str) -> String {
        self.segments.join(separator)
    }

    /// Text form that parses back to the same path.
    pub fn render(&self) -> String {
        self.segments
            .iter()
            .map(|segment| render_segment(segment))
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn render_segment(segment: &str) -> String {
    let plain = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
    if plain {
        return segment.to_string();
    }
    let mut out = String::with_capacity(segment.len() + 2);
    out.push('"');
    for c in segment.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl FromStr for ConfigPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigPath::parse(s)
    }
}

/// Anything that can name a path in a query.
pub trait AsPath {
    fn to_path(&self) -> Result<ConfigPath, PathError>;
}

impl AsPath for str {
    fn to_path(&self) -> Result<ConfigPath, PathError> {
        ConfigPath::parse(self)
    }
}

impl AsPath for String {
    fn to_path(&self) -> Result<ConfigPath, PathError> {
        ConfigPath::parse(self)
    }
}

impl AsPath for ConfigPath {
    fn to_path(&self) -> Result<ConfigPath, PathError> {
        Ok(self.clone())
    }
}

impl<T: AsPath + ?Sized> AsPath for &T {
    fn to_path(&self) -> Result<ConfigPath, PathError> {
        (**self).to_path()
    }
}

/// Accumulates key text into segments. Unquoted text splits on `.`,
/// quoted text is appended to the current segment verbatim.
pub(crate) struct PathBuilder {
    source: String,
    segments: Vec<String>,
    current: String,
    current_quoted: bool,
}

impl PathBuilder {
    pub(crate) fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            segments: Vec::new(),
            current: String::new(),
            current_quoted: false,
        }
    }

    pub(crate) fn push_unquoted(&mut self, text: &str) -> Result<(), PathError> {
        for (i, part) in text.split('.').enumerate() {
            if i > 0 {
                self.end_segment()?;
            }
            self.current.push_str(part);
        }
        Ok(())
    }

    pub(crate) fn push_quoted(&mut self, text: &str) {
        self.current.push_str(text);
        self.current_quoted = true;
    }

    fn end_segment(&mut self) -> Result<(), PathError> {
        if self.current.is_empty() && !self.current_quoted {
            return Err(PathError::EmptySegment {
                path: self.source.clone(),
            });
        }
        self.segments.push(std::mem::take(&mut self.current));
        self.current_quoted = false;
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<ConfigPath, PathError> {
        self.end_segment()?;
        Ok(ConfigPath {
            segments: self.segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_path() {
        let path = ConfigPath::parse("a.b.c").unwrap();
        assert_eq!(path.segments(), &["a", "b", "c"]);
    }

    #[test]
    fn test_quoted_segment_keeps_dots() {
        let path = ConfigPath::parse(r#"a."b.c".d"#).unwrap();
        assert_eq!(path.segments(), &["a", "b.c", "d"]);
    }

    #[test]
    fn test_quoted_text_joins_current_segment() {
        let path = ConfigPath::parse(r#"foo"bar".baz"#).unwrap();
        assert_eq!(path.segments(), &["foobar", "baz"]);
    }

    #[test]
    fn test_empty_quoted_segment_is_allowed() {
        let path = ConfigPath::parse(r#"a."".b"#).unwrap();
        assert_eq!(path.segments(), &["a", "", "b"]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ConfigPath::parse("   "), Err(PathError::Empty));
        assert!(matches!(
            ConfigPath::parse("a..b"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            ConfigPath::parse(".a"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            ConfigPath::parse(r#"a."b"#),
            Err(PathError::UnterminatedQuote { .. })
        ));
    }

    #[test]
    fn test_render_parses_back() {
        let path = ConfigPath::from_segments(["server", "host.name", "", "x y"]);
        let rendered = path.render();
        assert_eq!(rendered, r#"server."host.name".""."x y""#);
        assert_eq!(ConfigPath::parse(&rendered).unwrap(), path);
    }

    #[test]
    fn test_prefix_helpers() {
        let path = ConfigPath::parse("a.b.c").unwrap();
        let prefix = ConfigPath::parse("a.b").unwrap();
        assert!(path.starts_with(&prefix));
        assert_eq!(path.strip_prefix(&prefix), Some(&["c".to_string()][..]));
        assert_eq!(path.parent(), Some(prefix.clone()));
        assert_eq!(prefix.child("c"), path);
        assert_eq!(path.flattened("_"), "a_b_c");
    }
}
