use crate::error::{HoconError, TokenizeError};
use miette::{NamedSource, SourceSpan};
use std::sync::Arc;

/// Represents the different kinds of tokens that the lexer can produce.
///
/// Keys and literal values share the `Unquoted`/`Quoted` kinds: whether a
/// piece of text is a key or a value depends on where the parser meets it.
/// Numbers, booleans and `null` are plain `Unquoted` text as well; their type
/// is decided when the value is read.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    // == Special Tokens ==
    /// Represents the end of the input.
    Eof,
    /// A run of spaces or tabs. Kept because whitespace between two value
    /// pieces on one line is part of a string concatenation.
    Whitespace(String),
    /// A single line break. Separates fields and array elements.
    Newline,
    /// A `#` or `//` comment up to the end of the line, trimmed.
    Comment(String),

    // == Punctuation ==
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `,`
    Comma,
    /// `=` or `:`
    Assign,
    /// `+=`
    PlusAssign,

    // == Text ==
    /// Bare text such as `localhost`, `8080`, `true` or `a.b.c`.
    Unquoted(String),
    /// A `"..."` string with escapes already decoded.
    Quoted(String),
    /// A `"""..."""` string, read verbatim.
    MultilineString(String),

    // == Directives ==
    /// `${path}` or `${?path}`; `path` is the raw text between the braces.
    Substitution { path: String, optional: bool },
    /// `include "name"` or `include required("name")`.
    Include { name: String, required: bool },
}

impl TokenType {
    /// Short human-readable name used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenType::Eof => "end of file".to_string(),
            TokenType::Whitespace(_) => "whitespace".to_string(),
            TokenType::Newline => "a newline".to_string(),
            TokenType::Comment(_) => "a comment".to_string(),
            TokenType::LBrace => "`{`".to_string(),
            TokenType::RBrace => "`}`".to_string(),
            TokenType::LBracket => "`[`".to_string(),
            TokenType::RBracket => "`]`".to_string(),
            TokenType::Comma => "`,`".to_string(),
            TokenType::Assign => "`=`".to_string(),
            TokenType::PlusAssign => "`+=`".to_string(),
            TokenType::Unquoted(text) => format!("`{text}`"),
            TokenType::Quoted(text) => format!("\"{text}\""),
            TokenType::MultilineString(_) => "a multi-line string".to_string(),
            TokenType::Substitution { path, .. } => format!("`${{{path}}}`"),
            TokenType::Include { name, .. } => format!("include \"{name}\""),
        }
    }
}

/// Byte range of a token plus its 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
    pub line: usize,
    pub column: usize,
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        (span.offset, span.len).into()
    }
}

/// A token with its type and position
#[derive(Debug, Clone)]
pub struct Token {
    pub ttype: TokenType,
    pub span: Span,
}

impl Token {
    pub fn new(ttype: TokenType, span: Span) -> Token {
        Token { ttype, span }
    }
}

#[derive(Clone, Copy)]
struct Mark {
    offset: usize,
    line: usize,
    column: usize,
}

/// Produces tokens lazily, one call to [`Lexer::next_token`] at a time.
pub struct Lexer<'a> {
    input: &'a str,
    source: Arc<NamedSource<String>>,
    position: usize,
    line: usize,
    column: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let source = Arc::new(NamedSource::new("input.conf", input.to_string()));
        Self::with_source(input, source)
    }

    /// Lexes `input`, reporting errors against `source` (normally the same text).
    pub fn with_source(input: &'a str, source: Arc<NamedSource<String>>) -> Self {
        Self {
            input,
            source,
            position: 0,
            line: 1,
            column: 1,
            finished: false,
        }
    }

    /// Collects every token up to and including `Eof`.
    pub fn lex(&mut self) -> Result<Vec<Token>, HoconError> {
        self.by_ref().collect()
    }

    pub fn next_token(&mut self) -> Result<Token, HoconError> {
        let start = self.mark();

        let Some(c) = self.advance() else {
            return Ok(Token::new(TokenType::Eof, self.span_from(start)));
        };

        let ttype = match c {
            '{' => TokenType::LBrace,
            '}' => TokenType::RBrace,
            '[' => TokenType::LBracket,
            ']' => TokenType::RBracket,
            ',' => TokenType::Comma,
            '=' | ':' => TokenType::Assign,
            '\n' => TokenType::Newline,
            '+' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenType::PlusAssign
                } else {
                    return Err(self.unexpected_character('+', start));
                }
            }
            '#' => self.read_comment(),
            '/' if self.peek() == Some('/') => {
                self.advance();
                self.read_comment()
            }
            '"' => {
                if self.rest().starts_with("\"\"") {
                    self.advance();
                    self.advance();
                    self.read_multiline_string(start)?
                } else {
                    TokenType::Quoted(self.read_string_body(start)?)
                }
            }
            '$' if self.peek() == Some('{') => {
                self.advance();
                self.read_substitution(start)?
            }
            '$' => return Err(self.unexpected_character('$', start)),
            c if is_horizontal_whitespace(c) => self.read_whitespace(c),
            c if is_reserved(c) => return Err(self.unexpected_character(c, start)),
            c => self.read_unquoted(c, start)?,
        };

        Ok(Token::new(ttype, self.span_from(start)))
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.rest().chars().next()?;
        self.position += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn mark(&self) -> Mark {
        Mark {
            offset: self.position,
            line: self.line,
            column: self.column,
        }
    }

    fn span_from(&self, start: Mark) -> Span {
        Span {
            offset: start.offset,
            len: self.position - start.offset,
            line: start.line,
            column: start.column,
        }
    }

    fn read_whitespace(&mut self, first: char) -> TokenType {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if !is_horizontal_whitespace(c) {
                break;
            }
            text.push(c);
            self.advance();
        }
        TokenType::Whitespace(text)
    }

    fn read_comment(&mut self) -> TokenType {
        let mut comment_text = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            comment_text.push(c);
            self.advance();
        }
        TokenType::Comment(comment_text.trim().to_string())
    }

    /// Reads the rest of a `"..."` string; the opening quote is already consumed.
    fn read_string_body(&mut self, start: Mark) -> Result<String, HoconError> {
        let mut value = String::new();
        loop {
            let Some(c) = self.advance() else {
                return Err(self.unterminated_string(start));
            };
            match c {
                '"' => return Ok(value),
                '\n' => return Err(self.unterminated_string(start)),
                '\\' => {
                    let escape_start = self.mark();
                    let Some(escaped) = self.advance() else {
                        return Err(self.unterminated_string(start));
                    };
                    match escaped {
                        '"' => value.push('"'),
                        '\\' => value.push('\\'),
                        '/' => value.push('/'),
                        'b' => value.push('\u{0008}'),
                        'f' => value.push('\u{000C}'),
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        'u' => value.push(self.read_unicode_escape(escape_start)?),
                        other => {
                            return Err(self.invalid_escape(format!("\\{other}"), escape_start))
                        }
                    }
                }
                other => value.push(other),
            }
        }
    }

    /// Reads the four hex digits after `\u`, pairing UTF-16 surrogates.
    fn read_unicode_escape(&mut self, escape_start: Mark) -> Result<char, HoconError> {
        let high = self.read_hex4(escape_start)?;
        if !(0xD800..0xDC00).contains(&high) {
            return char::from_u32(high)
                .ok_or_else(|| self.invalid_escape(format!("\\u{high:04X}"), escape_start));
        }
        if !self.rest().starts_with("\\u") {
            return Err(self.invalid_escape(format!("\\u{high:04X}"), escape_start));
        }
        self.advance();
        self.advance();
        let low = self.read_hex4(escape_start)?;
        if !(0xDC00..0xE000).contains(&low) {
            return Err(self.invalid_escape(format!("\\u{high:04X}\\u{low:04X}"), escape_start));
        }
        let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        char::from_u32(combined)
            .ok_or_else(|| self.invalid_escape(format!("\\u{high:04X}\\u{low:04X}"), escape_start))
    }

    fn read_hex4(&mut self, escape_start: Mark) -> Result<u32, HoconError> {
        let mut digits = String::with_capacity(4);
        for _ in 0..4 {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    digits.push(c);
                    self.advance();
                }
                _ => return Err(self.invalid_escape(format!("\\u{digits}"), escape_start)),
            }
        }
        u32::from_str_radix(&digits, 16)
            .map_err(|_| self.invalid_escape(format!("\\u{digits}"), escape_start))
    }

    /// Reads a `"""` string verbatim; the opening delimiter is already consumed.
    /// Quotes directly after the closing `"""` belong to the content.
    fn read_multiline_string(&mut self, start: Mark) -> Result<TokenType, HoconError> {
        let Some(end) = self.rest().find("\"\"\"") else {
            return Err(TokenizeError::UnterminatedMultilineString {
                src: self.named_source(),
                span: self.span_from(start).into(),
                line: start.line,
                column: start.column,
            }
            .into());
        };
        let mut content = self.rest()[..end].to_string();
        for _ in content.chars() {
            self.advance();
        }
        for _ in 0..3 {
            self.advance();
        }
        while self.peek() == Some('"') {
            content.push('"');
            self.advance();
        }
        Ok(TokenType::MultilineString(content))
    }

    /// Reads `${...}`; the `${` is already consumed.
    fn read_substitution(&mut self, start: Mark) -> Result<TokenType, HoconError> {
        let optional = if self.peek() == Some('?') {
            self.advance();
            true
        } else {
            false
        };

        let mut path = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => {
                    return Err(TokenizeError::UnterminatedSubstitution {
                        src: self.named_source(),
                        span: self.span_from(start).into(),
                        line: start.line,
                        column: start.column,
                    }
                    .into())
                }
                Some('}') => break,
                Some('"') => {
                    // Quoted path segments keep their quotes for the path parser.
                    path.push('"');
                    loop {
                        match self.advance() {
                            None | Some('\n') => return Err(self.unterminated_string(start)),
                            Some('"') => break,
                            Some('\\') => {
                                path.push('\\');
                                if let Some(escaped) = self.advance() {
                                    path.push(escaped);
                                }
                            }
                            Some(other) => path.push(other),
                        }
                    }
                    path.push('"');
                }
                Some(other) => path.push(other),
            }
        }

        Ok(TokenType::Substitution {
            path: path.trim().to_string(),
            optional,
        })
    }

    fn read_unquoted(&mut self, first: char, start: Mark) -> Result<TokenType, HoconError> {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_whitespace() || is_reserved(c) || ends_unquoted(c) {
                break;
            }
            if c == '/' && self.peek_second() == Some('/') {
                break;
            }
            text.push(c);
            self.advance();
        }

        if text == "include" {
            if let Some(include) = self.try_include(start)? {
                return Ok(include);
            }
        }
        Ok(TokenType::Unquoted(text))
    }

    /// Recognizes `include "name"` / `include required("name")` after the
    /// word `include`. Leaves the input untouched when neither form follows.
    fn try_include(&mut self, start: Mark) -> Result<Option<TokenType>, HoconError> {
        let after = self
            .rest()
            .trim_start_matches(|c: char| c == ' ' || c == '\t');
        if !(after.starts_with('"') || after.starts_with("required(")) {
            return Ok(None);
        }

        while matches!(self.peek(), Some(' ' | '\t')) {
            self.advance();
        }
        let required = self.rest().starts_with("required(");
        if required {
            for _ in 0.."required(".len() {
                self.advance();
            }
        }

        if self.peek() != Some('"') {
            return Err(self.malformed_include(start));
        }
        let quote_start = self.mark();
        self.advance();
        let name = self.read_string_body(quote_start)?;

        if required {
            while matches!(self.peek(), Some(' ' | '\t')) {
                self.advance();
            }
            if self.peek() != Some(')') {
                return Err(self.malformed_include(start));
            }
            self.advance();
        }

        Ok(Some(TokenType::Include { name, required }))
    }

    // === Error helpers ===

    fn named_source(&self) -> NamedSource<String> {
        (*self.source).clone()
    }

    fn unterminated_string(&self, start: Mark) -> HoconError {
        TokenizeError::UnterminatedString {
            src: self.named_source(),
            span: self.span_from(start).into(),
            line: start.line,
            column: start.column,
        }
        .into()
    }

    fn invalid_escape(&self, escape: String, at: Mark) -> HoconError {
        TokenizeError::InvalidEscape {
            escape,
            src: self.named_source(),
            span: self.span_from(at).into(),
            line: at.line,
            column: at.column,
        }
        .into()
    }

    fn malformed_include(&self, start: Mark) -> HoconError {
        TokenizeError::MalformedInclude {
            src: self.named_source(),
            span: self.span_from(start).into(),
            line: start.line,
            column: start.column,
        }
        .into()
    }

    fn unexpected_character(&self, character: char, start: Mark) -> HoconError {
        TokenizeError::UnexpectedCharacter {
            character,
            src: self.named_source(),
            span: self.span_from(start).into(),
            line: start.line,
            column: start.column,
        }
        .into()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, HoconError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if matches!(
            &token,
            Err(_)
                | Ok(Token {
                    ttype: TokenType::Eof,
                    ..
                })
        ) {
            self.finished = true;
        }
        Some(token)
    }
}

fn is_horizontal_whitespace(c: char) -> bool {
    c.is_whitespace() && c != '\n'
}

fn ends_unquoted(c: char) -> bool {
    matches!(
        c,
        '"' | '$' | '{' | '}' | '[' | ']' | ':' | '=' | ',' | '+' | '#'
    )
}

/// Characters that may not appear in unquoted text and have no meaning of their own.
fn is_reserved(c: char) -> bool {
    matches!(c, '`' | '^' | '?' | '!' | '@' | '*' | '&' | '\\')
}
