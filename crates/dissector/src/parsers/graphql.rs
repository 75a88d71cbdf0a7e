//! GraphQL request documents.
//!
//! The document is buffered and tokenized when the input is finished. Every
//! name (field, alias, argument, variable, type, fragment, directive) becomes
//! the current name; every value literal in value position is reported under
//! the current name. A name that is replaced before any value was reported
//! for it is reported with an empty value, so
//!
//! ```text
//! query Q($id: ID = 5) { user(id: 7) { name } }
//! ```
//!
//! yields `Q=`, `id=`, `ID=5`, `user=`, `id=7`, `name=`.
//!
//! Operation and fragment keywords are not names. Strings are unescaped;
//! numbers, booleans, `null` and enum values are reported as written.

use alloc::vec::Vec;

use crate::{
    Limits,
    error::{Limit, ParseError},
    parser::{Machine, Status, impl_parser},
    parsers::decode::NUL_SUBSTITUTE,
    sink::{StreamSink, emit_pair},
};

const NAME: &str = "graphql";
/// Key for values seen before any name.
const ROOT_LABEL: &[u8] = b"graphql";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Name(&'a [u8]),
    Number(&'a [u8]),
    Str(Vec<u8>),
    Punct(u8),
    Spread,
}

/// Splits a buffered document into tokens.
struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

fn syntax(reason: &'static str) -> ParseError {
    ParseError::syntax(NAME, reason)
}

fn name_start(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphabetic()
}

fn name_continue(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

impl<'a> Lexer<'a> {
    fn new(src: &'a [u8]) -> Self {
        let pos = if src.starts_with(b"\xEF\xBB\xBF") { 3 } else { 0 };
        Self { src, pos }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn skip_ignored(&mut self) {
        while let Some(b) = self.peek(0) {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' | b',' => self.pos += 1,
                b'#' => {
                    while let Some(c) = self.peek(0) {
                        if c == b'\n' || c == b'\r' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token<'a>>, ParseError> {
        self.skip_ignored();
        let Some(b) = self.peek(0) else {
            return Ok(None);
        };
        let src = self.src;
        let start = self.pos;
        let token = match b {
            b'!' | b'$' | b'&' | b'(' | b')' | b':' | b'=' | b'@' | b'[' | b']' | b'{' | b'|'
            | b'}' => {
                self.pos += 1;
                Token::Punct(b)
            }
            b'.' => {
                if src[start..].starts_with(b"...") {
                    self.pos += 3;
                    Token::Spread
                } else {
                    return Err(syntax("invalid character"));
                }
            }
            b'"' => {
                if src[start..].starts_with(b"\"\"\"") {
                    Token::Str(self.block_string()?)
                } else {
                    Token::Str(self.string()?)
                }
            }
            b'-' | b'0'..=b'9' => {
                self.pos += 1;
                while let Some(c) = self.peek(0) {
                    if !matches!(c, b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-') {
                        break;
                    }
                    self.pos += 1;
                }
                let text = &src[start..self.pos];
                if !text.iter().any(u8::is_ascii_digit) {
                    return Err(syntax("invalid number"));
                }
                if self.peek(0).is_some_and(name_start) {
                    return Err(syntax("invalid number"));
                }
                Token::Number(text)
            }
            _ if name_start(b) => {
                while self.peek(0).is_some_and(name_continue) {
                    self.pos += 1;
                }
                Token::Name(&src[start..self.pos])
            }
            _ => return Err(syntax("invalid character")),
        };
        Ok(Some(token))
    }

    fn hex4(&mut self) -> Result<u32, ParseError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .peek(0)
                .and_then(|b| (b as char).to_digit(16))
                .ok_or_else(|| syntax("invalid unicode escape"))?;
            code = code * 16 + digit;
            self.pos += 1;
        }
        Ok(code)
    }

    /// Consumes a `\uXXXX` escape only if it holds a low surrogate.
    fn low_surrogate(&mut self) -> Option<u32> {
        let escape = self.src.get(self.pos..self.pos + 6)?;
        if !escape.starts_with(b"\\u") {
            return None;
        }
        let unit = escape[2..]
            .iter()
            .try_fold(0u32, |acc, &b| Some(acc * 16 + (b as char).to_digit(16)?))?;
        if !(0xDC00..=0xDFFF).contains(&unit) {
            return None;
        }
        self.pos += 6;
        Some(unit)
    }

    fn string(&mut self) -> Result<Vec<u8>, ParseError> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            let b = self.peek(0).ok_or_else(|| syntax("unterminated string"))?;
            self.pos += 1;
            match b {
                b'"' => return Ok(out),
                b'\n' | b'\r' => return Err(syntax("unterminated string")),
                b'\\' => {
                    let e = self.peek(0).ok_or_else(|| syntax("unterminated string"))?;
                    self.pos += 1;
                    match e {
                        b'"' | b'\\' | b'/' => out.push(e),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => {
                            let ch = match self.hex4()? {
                                0 => {
                                    out.push(NUL_SUBSTITUTE);
                                    continue;
                                }
                                high @ 0xD800..=0xDBFF => self.low_surrogate().map_or(
                                    char::REPLACEMENT_CHARACTER,
                                    |low| {
                                        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                                        char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
                                    },
                                ),
                                code => char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER),
                            };
                            let mut buf = [0; 4];
                            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                        }
                        _ => return Err(syntax("invalid escape")),
                    }
                }
                _ => out.push(b),
            }
        }
    }

    fn block_string(&mut self) -> Result<Vec<u8>, ParseError> {
        self.pos += 3;
        let mut out = Vec::new();
        loop {
            let rest = &self.src[self.pos..];
            if rest.is_empty() {
                return Err(syntax("unterminated string"));
            }
            if rest.starts_with(b"\\\"\"\"") {
                out.extend_from_slice(b"\"\"\"");
                self.pos += 4;
            } else if rest.starts_with(b"\"\"\"") {
                self.pos += 3;
                return Ok(out);
            } else {
                out.push(rest[0]);
                self.pos += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Selection,
    ObjectValue,
    ListValue,
    ListType,
    /// `(` not yet known to hold arguments or variable definitions.
    Paren,
    Arguments,
    VariableDefinitions,
}

/// Walks the token stream and reports names and values.
struct Walker<'s, S> {
    sink: &'s mut S,
    frames: Vec<Frame>,
    max_depth: usize,
    current: Vec<u8>,
    values: usize,
    expect_value: bool,
    after_dollar: bool,
    after_spread: bool,
    /// Top level: `fragment` seen, `on` expected after the fragment name.
    fragment_names: u8,
}

impl<S: StreamSink> Walker<'_, S> {
    fn name(&mut self, name: &[u8]) -> Result<(), ParseError> {
        if self.values == 0 && !self.current.is_empty() {
            emit_pair(&mut *self.sink, &self.current, b"")?;
        }
        self.current.clear();
        self.current.extend_from_slice(name);
        self.values = 0;
        Ok(())
    }

    fn value(&mut self, value: &[u8]) -> Result<(), ParseError> {
        self.values += 1;
        let key = if self.current.is_empty() {
            ROOT_LABEL
        } else {
            self.current.as_slice()
        };
        emit_pair(&mut *self.sink, key, value)?;
        self.value_done();
        Ok(())
    }

    /// A complete value was consumed; lists keep expecting more.
    fn value_done(&mut self) {
        self.expect_value = self.frames.last() == Some(&Frame::ListValue);
    }

    fn open(&mut self, frame: Frame) -> Result<(), ParseError> {
        if self.frames.len() >= self.max_depth {
            return Err(ParseError::ResourceLimitExceeded(Limit::Depth));
        }
        self.frames.push(frame);
        Ok(())
    }

    fn close(&mut self, accept: &[Frame]) -> Result<Frame, ParseError> {
        match self.frames.pop() {
            Some(frame) if accept.contains(&frame) => Ok(frame),
            _ => Err(syntax("unbalanced brackets")),
        }
    }

    fn token(&mut self, token: Token<'_>) -> Result<(), ParseError> {
        if let Some(top) = self.frames.last_mut() {
            if *top == Frame::Paren {
                *top = if token == Token::Punct(b'$') {
                    Frame::VariableDefinitions
                } else {
                    Frame::Arguments
                };
            }
        }

        if self.after_dollar {
            self.after_dollar = false;
            let Token::Name(name) = token else {
                return Err(syntax("expected variable name"));
            };
            self.name(name)?;
            if self.expect_value {
                self.value_done();
            }
            return Ok(());
        }
        let after_spread = core::mem::take(&mut self.after_spread);

        match token {
            Token::Name(name) => {
                if self.expect_value {
                    return self.value(name);
                }
                if self.frames.is_empty() {
                    match (self.fragment_names, name) {
                        (0, b"query" | b"mutation" | b"subscription") => return Ok(()),
                        (0, b"fragment") => {
                            self.fragment_names = 1;
                            return Ok(());
                        }
                        (1, _) => self.fragment_names = 2,
                        (2, b"on") => {
                            self.fragment_names = 0;
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                if after_spread && name == b"on" {
                    return Ok(());
                }
                self.name(name)
            }
            Token::Number(text) => {
                if !self.expect_value {
                    return Err(syntax("unexpected number"));
                }
                self.value(text)
            }
            Token::Str(text) => self.value(&text),
            Token::Spread => {
                self.after_spread = true;
                Ok(())
            }
            Token::Punct(p) => self.punct(p),
        }
    }

    fn punct(&mut self, p: u8) -> Result<(), ParseError> {
        match p {
            b'$' => self.after_dollar = true,
            b':' => {
                self.expect_value = matches!(
                    self.frames.last(),
                    Some(Frame::Arguments | Frame::ObjectValue)
                );
            }
            b'=' => self.expect_value = true,
            b'(' => {
                if self.expect_value {
                    return Err(syntax("unexpected '('"));
                }
                self.open(Frame::Paren)?;
            }
            b')' => {
                self.close(&[Frame::Arguments, Frame::VariableDefinitions, Frame::Paren])?;
                self.expect_value = false;
            }
            b'{' => {
                let frame = if self.expect_value {
                    Frame::ObjectValue
                } else {
                    Frame::Selection
                };
                self.expect_value = false;
                self.open(frame)?;
            }
            b'}' => {
                if self.close(&[Frame::Selection, Frame::ObjectValue])? == Frame::ObjectValue {
                    self.value_done();
                } else {
                    self.expect_value = false;
                }
            }
            b'[' => {
                let frame = if self.expect_value {
                    Frame::ListValue
                } else {
                    Frame::ListType
                };
                self.open(frame)?;
            }
            b']' => {
                if self.close(&[Frame::ListValue, Frame::ListType])? == Frame::ListValue {
                    self.value_done();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        if !self.frames.is_empty() {
            return Err(syntax("unbalanced brackets"));
        }
        if self.after_dollar || self.expect_value {
            return Err(syntax("unexpected end of input"));
        }
        if self.values == 0 && !self.current.is_empty() {
            emit_pair(&mut *self.sink, &self.current, b"")?;
        }
        Ok(())
    }
}

/// Buffering GraphQL parser.
#[derive(Debug)]
pub struct GraphqlParser<S> {
    sink: S,
    document: Vec<u8>,
    limits: Limits,
    status: Status,
    depth: usize,
}

impl<S: StreamSink> GraphqlParser<S> {
    /// Creates a parser writing to `sink`.
    pub fn new(sink: S, limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            document: Vec::new(),
            limits: *limits,
            status: Status::Active,
            depth,
        }
    }

    /// The downstream sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consumes the parser, returning its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: StreamSink> Machine for GraphqlParser<S> {
    const NAME: &'static str = NAME;

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        if self.document.len() + data.len() > self.limits.max_value_size {
            return Err(ParseError::ResourceLimitExceeded(Limit::ValueSize));
        }
        self.document.extend_from_slice(data);
        Ok(())
    }

    fn end(&mut self) -> Result<(), ParseError> {
        let document = core::mem::take(&mut self.document);
        log::trace!(target: "dissector::graphql", "tokenizing {} bytes", document.len());
        let mut lexer = Lexer::new(&document);
        let mut walker = Walker {
            sink: &mut self.sink,
            frames: Vec::new(),
            max_depth: self.limits.max_depth,
            current: Vec::new(),
            values: 0,
            expect_value: false,
            after_dollar: false,
            after_spread: false,
            fragment_names: 0,
        };
        let mut tokens = 0usize;
        while let Some(token) = lexer.next_token()? {
            walker.token(token)?;
            tokens += 1;
        }
        if tokens == 0 {
            return Err(syntax("empty document"));
        }
        walker.finish()
    }
}

impl_parser!(GraphqlParser<S: StreamSink>);
