use crate::path::PathError;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Every failure the engine can report. Tokenizer, parser and resolver
/// errors abort a parse attempt; conversion and lookup errors are local to
/// one query and leave the `Config` untouched.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum HoconError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Cannot convert the value at `{path}`: {source}")]
    #[diagnostic(
        code(config::conversion),
        help("Use a different accessor, or a `get_or`/`get_opt` variant to tolerate this value.")
    )]
    Conversion {
        path: String,
        #[source]
        source: ConversionError,
    },

    #[error("No configuration value at `{path}`")]
    #[diagnostic(code(config::missing))]
    Missing { path: String },

    #[error("Path `{path}` is bound more than once")]
    #[diagnostic(
        code(config::duplicate_key),
        help("Two different keys flatten to the same path; rename one of them or pick another separator.")
    )]
    DuplicateKey { path: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error("Failed to read `{path}`: {message}")]
    #[diagnostic(code(include::io))]
    Io { path: String, message: String },

    #[error("Circular include: {cycle}")]
    #[diagnostic(
        code(include::cycle),
        help("An included file ends up including itself again.")
    )]
    IncludeCycle { cycle: String },
}

impl HoconError {
    /// True when the error only says that nothing is bound at the queried path.
    pub fn is_missing(&self) -> bool {
        matches!(self, HoconError::Missing { .. })
    }
}

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum TokenizeError {
    #[error("Unterminated string literal at line {line}, column {column}")]
    #[diagnostic(
        code(tokenizer::unterminated_string),
        help("Close the string with a matching `\"` before the end of the line.")
    )]
    UnterminatedString {
        #[source_code]
        src: NamedSource<String>,
        #[label("string starts here")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Unterminated multi-line string at line {line}, column {column}")]
    #[diagnostic(
        code(tokenizer::unterminated_multiline_string),
        help("Multi-line strings must be closed with `\"\"\"`.")
    )]
    UnterminatedMultilineString {
        #[source_code]
        src: NamedSource<String>,
        #[label("multi-line string starts here")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Invalid escape sequence `{escape}` at line {line}, column {column}")]
    #[diagnostic(
        code(tokenizer::invalid_escape),
        help("Valid escapes are \\\" \\\\ \\/ \\b \\f \\n \\r \\t and \\uXXXX.")
    )]
    InvalidEscape {
        escape: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("invalid escape")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Unterminated substitution at line {line}, column {column}")]
    #[diagnostic(
        code(tokenizer::unterminated_substitution),
        help("Substitutions look like `${{path}}` or `${{?path}}` and must close on the same line.")
    )]
    UnterminatedSubstitution {
        #[source_code]
        src: NamedSource<String>,
        #[label("substitution starts here")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Malformed include directive at line {line}, column {column}")]
    #[diagnostic(
        code(tokenizer::malformed_include),
        help("Write `include \"name\"` or `include required(\"name\")`.")
    )]
    MalformedInclude {
        #[source_code]
        src: NamedSource<String>,
        #[label("include starts here")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Unexpected character `{character}` at line {line}, column {column}")]
    #[diagnostic(
        code(tokenizer::unexpected_character),
        help("This character is reserved; quote the text if it is part of a string.")
    )]
    UnexpectedCharacter {
        character: char,
        #[source_code]
        src: NamedSource<String>,
        #[label("not allowed here")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },
}

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ParserError {
    #[error("Expected {expected} but found {found} at line {line}, column {column}{context}")]
    #[diagnostic(
        code(parser::unexpected_token),
        help("The parser found a token it did not expect in this position.")
    )]
    UnexpectedToken {
        expected: String,
        found: String,
        context: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("expected {expected}, but found this")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Unexpected end of file at line {line}, column {column}: expected {expected}")]
    #[diagnostic(
        code(parser::unexpected_eof),
        help("The file ended unexpectedly. Check for a missing `}}` or `]`.")
    )]
    UnexpectedEof {
        expected: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("file ended unexpectedly here")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Expected a value at line {line}, column {column}{context}")]
    #[diagnostic(
        code(parser::empty_value),
        help("Every key needs a value after `=` or `:`; use `null` or `\"\"` for an empty one.")
    )]
    EmptyValue {
        context: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("value missing here")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Invalid key at line {line}, column {column}: {reason}")]
    #[diagnostic(code(parser::invalid_key))]
    InvalidKey {
        reason: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("in this key")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Invalid substitution path `{path}` at line {line}, column {column}: {reason}")]
    #[diagnostic(code(parser::invalid_path))]
    InvalidPath {
        path: String,
        reason: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("in this substitution")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Required include `{name}` not found (line {line}, column {column})")]
    #[diagnostic(
        code(parser::include_not_found),
        help("Drop `required(...)` to make the include optional.")
    )]
    IncludeNotFound {
        name: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("included here")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },
}

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ResolveError {
    #[error("Could not resolve substitution `${{{path}}}` at line {line}, column {column}")]
    #[diagnostic(
        code(resolver::unresolved_substitution),
        help("Define the path, export an environment variable with that name, or use `${{?{path}}}`.")
    )]
    UnresolvedSubstitution {
        path: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("nothing is bound at this path")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Substitution `${{{path}}}` at line {line}, column {column} refers back to itself")]
    #[diagnostic(
        code(resolver::cycle),
        help("A chain of substitutions loops back to this one.")
    )]
    Cycle {
        path: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("part of a substitution cycle")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Cannot concatenate {left} with {right} at line {line}, column {column}")]
    #[diagnostic(
        code(resolver::concatenation_mismatch),
        help("Only strings with strings, arrays with arrays, or objects with objects can be concatenated.")
    )]
    ConcatenationMismatch {
        left: &'static str,
        right: &'static str,
        #[source_code]
        src: NamedSource<String>,
        #[label("in this value")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },
}

/// Why a typed accessor rejected a resolved value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("expected {expected}, found {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("`{value}` is out of range for {target}")]
    Overflow { value: String, target: &'static str },

    #[error("`{value}` is not a valid {target}")]
    InvalidFormat { value: String, target: &'static str },

    #[error("unknown {target} unit `{unit}`")]
    InvalidUnit { unit: String, target: &'static str },

    #[error("null cannot be converted to {target}")]
    Null { target: &'static str },
}
