use crate::ast::*;
use crate::error::{HoconError, ParserError};
use crate::include::Includer;
use crate::lexer::{Lexer, Span, Token, TokenType};
use crate::path::{ConfigPath, PathBuilder};
use miette::NamedSource;
use std::sync::Arc;

/// An object under construction. `prefix` is the absolute path the object
/// will be bound to, or `None` inside arrays where there is no such path.
#[derive(Debug)]
struct Scope {
    prefix: Option<ConfigPath>,
    object: ObjectNode,
}

/// A recursive descent parser over the lazily produced token stream.
///
/// Fields are assigned into the object being built as soon as they are
/// read, so duplicate keys, dotted keys and includes merge in document
/// order and a self-referential substitution can capture the value its
/// key held just before the assignment.
pub struct Parser<'a> {
    source: Arc<NamedSource<String>>,
    name: String,
    lexer: Lexer<'a>,
    current: Token,
    includer: Option<&'a dyn Includer>,
    strict_includes: bool,
    substitutions: Vec<Substitution>,
    root: Scope,
    scopes: Vec<Scope>,
    /// Absolute path of the innermost field whose value is being read.
    current_key: Option<ConfigPath>,
}

impl<'a> Parser<'a> {
    pub fn new(source_text: &'a str) -> Result<Self, HoconError> {
        Self::new_with_name(source_text, "input.conf".to_string())
    }

    pub fn new_with_name(source_text: &'a str, name: String) -> Result<Self, HoconError> {
        let source = Arc::new(NamedSource::new(name.clone(), source_text.to_string()));
        let mut lexer = Lexer::with_source(source_text, source.clone());
        let current = lexer.next_token()?;

        Ok(Self {
            source,
            name,
            lexer,
            current,
            includer: None,
            strict_includes: false,
            substitutions: Vec::new(),
            root: Scope {
                prefix: Some(ConfigPath::root()),
                object: ObjectNode::new(),
            },
            scopes: Vec::new(),
            current_key: None,
        })
    }

    /// Sets where `include` directives are loaded from. Without an
    /// includer every include counts as not found.
    pub fn with_includer(mut self, includer: &'a dyn Includer) -> Self {
        self.includer = Some(includer);
        self
    }

    /// Treats every include as `required(...)`.
    pub fn with_strict_includes(mut self, strict: bool) -> Self {
        self.strict_includes = strict;
        self
    }

    // === Main Parsing Methods ===

    ///    Document ::= Body | Object { Object }
    pub fn parse_document(&mut self) -> Result<Document, HoconError> {
        self.skip_layout()?;
        match self.current.ttype {
            TokenType::LBrace => {
                while self.check(TokenType::LBrace) {
                    self.advance()?;
                    self.parse_fields(TokenType::RBrace)?;
                    self.expect(TokenType::RBrace)?;
                    self.skip_layout()?;
                }
                if !self.check(TokenType::Eof) {
                    return self.err_unexpected("end of file");
                }
            }
            TokenType::LBracket => return self.err_unexpected("an object at the document root"),
            _ => self.parse_fields(TokenType::Eof)?,
        }

        let root = std::mem::take(&mut self.root.object);
        let substitutions = std::mem::take(&mut self.substitutions);
        log::debug!(
            "parsed `{}`: {} top-level keys, {} substitutions",
            self.name,
            root.len(),
            substitutions.len()
        );
        Ok(Document {
            root,
            substitutions,
        })
    }

    /// Body ::= { (Field | Include) Separator }
    /// Reads fields into the top scope until `closing`, which is left unconsumed.
    fn parse_fields(&mut self, closing: TokenType) -> Result<(), HoconError> {
        loop {
            self.skip_layout()?;
            if self.check(closing.clone()) {
                return Ok(());
            }
            if self.check(TokenType::Eof) {
                return self.err_eof(&closing.describe());
            }

            if let TokenType::Include { name, required } = &self.current.ttype {
                let (name, required) = (name.clone(), *required);
                let span = self.current.span;
                self.advance()?;
                self.parse_include(&name, required, span)?;
            } else {
                self.parse_field()?;
            }

            self.skip_inline()?;
            match self.current.ttype {
                TokenType::Comma => {
                    self.advance()?;
                    self.skip_layout()?;
                    if self.check(TokenType::Comma) {
                        return self.err_unexpected("a key");
                    }
                }
                TokenType::Newline | TokenType::Eof => {}
                _ if self.check(closing.clone()) => {}
                _ => return self.err_unexpected("`,` or a newline"),
            }
        }
    }

    /// Field ::= Key ( ("=" | ":" | "+=") Value | Object )
    fn parse_field(&mut self) -> Result<(), HoconError> {
        let key = self.parse_key()?;
        let full_key = self.top_scope().prefix.as_ref().map(|prefix| prefix.join(&key));

        let outer_key = std::mem::replace(&mut self.current_key, full_key);
        let value = self.parse_field_value(&key);
        self.current_key = outer_key;

        self.top_scope_mut().object.assign(key.segments(), value?);
        Ok(())
    }

    fn parse_field_value(&mut self, key: &ConfigPath) -> Result<Node, HoconError> {
        match self.current.ttype {
            TokenType::Assign => {
                self.advance()?;
                self.skip_layout()?;
                self.parse_value()
            }
            TokenType::PlusAssign => {
                let span = self.current.span;
                self.advance()?;
                self.skip_layout()?;
                let value = self.parse_value()?;
                Ok(self.append_node(key, value, span))
            }
            TokenType::LBrace => self.parse_value(),
            _ => self.err_unexpected("`=`, `:` or `{` after the key"),
        }
    }

    /// Key ::= (Unquoted | Quoted) { [Whitespace] (Unquoted | Quoted) }
    fn parse_key(&mut self) -> Result<ConfigPath, HoconError> {
        let start = self.current.span;
        let mut builder = PathBuilder::new("");
        let mut pending_whitespace = String::new();
        let mut pieces = 0;

        loop {
            match &self.current.ttype {
                TokenType::Unquoted(text) => {
                    let text = format!("{pending_whitespace}{text}");
                    builder
                        .push_unquoted(&text)
                        .map_err(|err| self.invalid_key(err.to_string(), start))?;
                }
                TokenType::Quoted(text) => {
                    let text = text.clone();
                    builder
                        .push_unquoted(&pending_whitespace)
                        .map_err(|err| self.invalid_key(err.to_string(), start))?;
                    builder.push_quoted(&text);
                }
                TokenType::Whitespace(ws) if pieces > 0 => {
                    pending_whitespace.push_str(ws);
                    self.advance()?;
                    continue;
                }
                _ => break,
            }
            pending_whitespace.clear();
            pieces += 1;
            self.advance()?;
        }

        if pieces == 0 {
            return self.err_unexpected("a key");
        }
        builder
            .finish()
            .map_err(|err| self.invalid_key(err.to_string(), start))
    }

    /// Value ::= Piece { [Whitespace] Piece }
    /// Piece ::= Unquoted | Quoted | Multiline | Substitution | Object | Array
    fn parse_value(&mut self) -> Result<Node, HoconError> {
        let start = self.current.span;
        let mut pieces: Vec<Node> = Vec::new();
        let mut pending_whitespace: Option<String> = None;

        loop {
            let piece = match &self.current.ttype {
                TokenType::Unquoted(text) => {
                    let literal = RawLiteral::unquoted(text.clone());
                    self.advance()?;
                    Node::Literal(literal)
                }
                TokenType::Quoted(text) | TokenType::MultilineString(text) => {
                    let literal = RawLiteral::quoted(text.clone());
                    self.advance()?;
                    Node::Literal(literal)
                }
                TokenType::Substitution { path, optional } => {
                    let (path, optional) = (path.clone(), *optional);
                    let span = self.current.span;
                    self.advance()?;
                    self.substitution_node(&path, optional, span)?
                }
                TokenType::LBrace => Node::Object(self.parse_object()?),
                TokenType::LBracket => Node::Array(self.parse_array()?),
                TokenType::Whitespace(ws) => {
                    if !pieces.is_empty() {
                        pending_whitespace = Some(ws.clone());
                    }
                    self.advance()?;
                    continue;
                }
                _ => break,
            };
            if let Some(ws) = pending_whitespace.take() {
                pieces.push(Node::Whitespace(ws));
            }
            pieces.push(piece);
        }

        if pieces.len() > 1 {
            return Ok(Node::Concat(Concat {
                pieces,
                origin: self.origin(start),
            }));
        }
        match pieces.pop() {
            Some(piece) => Ok(piece),
            None => Err(self.empty_value(start)),
        }
    }

    /// Object ::= "{" Body "}"
    fn parse_object(&mut self) -> Result<ObjectNode, HoconError> {
        self.expect(TokenType::LBrace)?;
        self.scopes.push(Scope {
            prefix: self.current_key.clone(),
            object: ObjectNode::new(),
        });
        let fields = self.parse_fields(TokenType::RBrace);
        let scope = self.scopes.pop();
        fields?;
        self.expect(TokenType::RBrace)?;
        Ok(scope.map(|scope| scope.object).unwrap_or_default())
    }

    /// Array ::= "[" [ Value { Separator Value } [","] ] "]"
    fn parse_array(&mut self) -> Result<Vec<Node>, HoconError> {
        self.expect(TokenType::LBracket)?;
        // Elements are not addressable by path.
        let outer_key = self.current_key.take();
        let items = self.parse_array_items();
        self.current_key = outer_key;
        items
    }

    fn parse_array_items(&mut self) -> Result<Vec<Node>, HoconError> {
        let mut items = Vec::new();
        loop {
            self.skip_layout()?;
            if self.match_token(TokenType::RBracket)? {
                return Ok(items);
            }
            if self.check(TokenType::Eof) {
                return self.err_eof("`]`");
            }

            items.push(self.parse_value()?);

            self.skip_inline()?;
            match self.current.ttype {
                TokenType::Comma => {
                    self.advance()?;
                    self.skip_layout()?;
                    if self.check(TokenType::Comma) {
                        return self.err_unexpected("a value");
                    }
                }
                TokenType::Newline | TokenType::RBracket => {}
                TokenType::Eof => return self.err_eof("`]`"),
                _ => return self.err_unexpected("`,`, a newline or `]`"),
            }
        }
    }

    fn parse_include(&mut self, name: &str, required: bool, span: Span) -> Result<(), HoconError> {
        let included = match self.includer {
            Some(includer) => includer.include(name)?,
            None => None,
        };
        let Some(document) = included else {
            if required || self.strict_includes {
                return Err(self.include_not_found(name, span));
            }
            log::warn!("include `{name}` in `{}` not found, skipping", self.name);
            return Ok(());
        };
        log::debug!("merging include `{name}` into `{}`", self.name);
        self.absorb(document);
        Ok(())
    }

    /// Merges an included document into the top scope. Its substitutions
    /// are renumbered into this document and rooted at the scope's path.
    fn absorb(&mut self, document: Document) {
        let offset = self.substitutions.len();
        let prefix = self
            .top_scope()
            .prefix
            .clone()
            .filter(|prefix| !prefix.is_empty());

        let mut root = document.root;
        root.shift_substitutions(offset);
        for mut substitution in document.substitutions {
            if let Some(prior) = substitution
                .self_reference
                .as_mut()
                .and_then(|reference| reference.prior.as_mut())
            {
                prior.shift_substitutions(offset);
            }
            if let Some(prefix) = &prefix {
                let prefixed = prefix.join(&substitution.path);
                let original = std::mem::replace(&mut substitution.path, prefixed);
                substitution.fallback_path.get_or_insert(original);
                if let Some(reference) = substitution.self_reference.as_mut() {
                    reference.key_depth += prefix.len();
                }
            }
            self.substitutions.push(substitution);
        }
        self.top_scope_mut().object.merge(root);
    }

    // === Substitutions ===

    fn substitution_node(&mut self, raw: &str, optional: bool, span: Span) -> Result<Node, HoconError> {
        let path = ConfigPath::parse(raw).map_err(|err| self.invalid_path(raw, err.to_string(), span))?;
        let self_reference = match &self.current_key {
            Some(key) if path.starts_with(key) => Some(SelfReference {
                key_depth: key.len(),
                prior: self.prior_value(key).map(Box::new),
            }),
            _ => None,
        };
        let id = self.push_substitution(Substitution {
            path,
            optional,
            self_reference,
            fallback_path: None,
            origin: self.origin(span),
        });
        Ok(Node::Substitution(id))
    }

    /// `key += value` reads as `key = ${?key} [value]`.
    fn append_node(&mut self, key: &ConfigPath, value: Node, span: Span) -> Node {
        let element = Node::Array(vec![value]);
        let previous = match self.current_key.clone() {
            Some(full_key) => {
                let prior = self.prior_value(&full_key).map(Box::new);
                let id = self.push_substitution(Substitution {
                    self_reference: Some(SelfReference {
                        key_depth: full_key.len(),
                        prior,
                    }),
                    path: full_key,
                    optional: true,
                    fallback_path: None,
                    origin: self.origin(span),
                });
                Node::Substitution(id)
            }
            None => match self.top_scope().object.locate(key.segments()) {
                Slot::Found(node) => node.clone(),
                Slot::Blocked | Slot::Missing => return element,
            },
        };
        Node::Concat(Concat {
            pieces: vec![previous, element],
            origin: self.origin(span),
        })
    }

    /// What `key` is bound to right now, looking through every open scope.
    fn prior_value(&self, key: &ConfigPath) -> Option<Node> {
        let mut prior: Option<Node> = None;
        for scope in std::iter::once(&self.root).chain(self.scopes.iter()) {
            let Some(prefix) = &scope.prefix else {
                prior = None;
                continue;
            };
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            match scope.object.locate(rest) {
                Slot::Found(node) => prior = Some(Node::layered(prior, node)),
                Slot::Blocked => prior = None,
                Slot::Missing => {}
            }
        }
        prior
    }

    fn push_substitution(&mut self, substitution: Substitution) -> SubstitutionId {
        self.substitutions.push(substitution);
        self.substitutions.len() - 1
    }

    // === Tokenizer Helper Methods ===

    fn top_scope(&self) -> &Scope {
        self.scopes.last().unwrap_or(&self.root)
    }

    fn top_scope_mut(&mut self) -> &mut Scope {
        match self.scopes.last_mut() {
            Some(scope) => scope,
            None => &mut self.root,
        }
    }

    fn advance(&mut self) -> Result<Token, HoconError> {
        if self.current.ttype == TokenType::Eof {
            return Ok(self.current.clone());
        }
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    /// Skips whitespace, comments and newlines.
    fn skip_layout(&mut self) -> Result<(), HoconError> {
        while matches!(
            self.current.ttype,
            TokenType::Whitespace(_) | TokenType::Comment(_) | TokenType::Newline
        ) {
            self.advance()?;
        }
        Ok(())
    }

    /// Skips whitespace and comments but stops at a newline.
    fn skip_inline(&mut self) -> Result<(), HoconError> {
        while matches!(
            self.current.ttype,
            TokenType::Whitespace(_) | TokenType::Comment(_)
        ) {
            self.advance()?;
        }
        Ok(())
    }

    fn expect(&mut self, expected: TokenType) -> Result<(), HoconError> {
        if self.check(expected.clone()) {
            self.advance()?;
            Ok(())
        } else {
            self.err_unexpected(&expected.describe())
        }
    }

    fn match_token(&mut self, ttype: TokenType) -> Result<bool, HoconError> {
        if self.check(ttype) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn check(&self, ttype: TokenType) -> bool {
        std::mem::discriminant(&self.current.ttype) == std::mem::discriminant(&ttype)
    }

    // === Error helpers ===

    fn origin(&self, span: Span) -> Origin {
        Origin {
            source: self.source.clone(),
            span,
        }
    }

    fn context(&self) -> String {
        match &self.current_key {
            Some(key) => format!(" (in the value of `{key}`)"),
            None => String::new(),
        }
    }

    fn err_unexpected<T>(&self, expected: &str) -> Result<T, HoconError> {
        if self.current.ttype == TokenType::Eof {
            return self.err_eof(expected);
        }
        let span = self.current.span;
        Err(ParserError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.current.ttype.describe(),
            context: self.context(),
            src: (*self.source).clone(),
            span: span.into(),
            line: span.line,
            column: span.column,
        }
        .into())
    }

    fn err_eof<T>(&self, expected: &str) -> Result<T, HoconError> {
        let span = self.current.span;
        Err(ParserError::UnexpectedEof {
            expected: expected.to_string(),
            src: (*self.source).clone(),
            span: span.into(),
            line: span.line,
            column: span.column,
        }
        .into())
    }

    fn empty_value(&self, span: Span) -> HoconError {
        ParserError::EmptyValue {
            context: self.context(),
            src: (*self.source).clone(),
            span: span.into(),
            line: span.line,
            column: span.column,
        }
        .into()
    }

    fn invalid_key(&self, reason: String, span: Span) -> HoconError {
        ParserError::InvalidKey {
            reason,
            src: (*self.source).clone(),
            span: span.into(),
            line: span.line,
            column: span.column,
        }
        .into()
    }

    fn invalid_path(&self, path: &str, reason: String, span: Span) -> HoconError {
        ParserError::InvalidPath {
            path: path.to_string(),
            reason,
            src: (*self.source).clone(),
            span: span.into(),
            line: span.line,
            column: span.column,
        }
        .into()
    }

    fn include_not_found(&self, name: &str, span: Span) -> HoconError {
        ParserError::IncludeNotFound {
            name: name.to_string(),
            src: (*self.source).clone(),
            span: span.into(),
            line: span.line,
            column: span.column,
        }
        .into()
    }
}
