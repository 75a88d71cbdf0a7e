//! PHP `serialize()` format.
//!
//! ```text
//! N;  b:1;  i:-7;  d:0.5;  r:2;  R:2;  s:5:"hello";
//! a:2:{i:0;s:1:"x";s:1:"k";b:0;}
//! O:3:"Foo":1:{s:3:"bar";i:1;}
//! C:3:"Foo":7:{<7 raw bytes>}
//! ```
//!
//! Strings are length-counted. The textual escapes `\0` and `\x00`, which
//! appear where private and protected property names were re-encoded, count
//! as one byte each and are reported as `@`. A string whose closing quote is
//! not where its length says, an array with more or fewer items than
//! declared, or class data longer than declared fails with
//! [`ParseError::LengthMismatch`].
//!
//! Array and object members are reported under their dotted key path; a
//! scalar outside any container is reported under its type name (`String`,
//! `Integer`, ...). An object reports its class name under its own key before
//! its members. The raw data of a `C:` object is parsed by a nested instance
//! one level deeper; if that succeeds its pairs are reported under the
//! object's key, otherwise the raw data itself is.

use alloc::vec::Vec;

use crate::{
    BufferedSink, Collector, Limits,
    error::{Limit, ParseError},
    key_path::KeyPath,
    parser::{Machine, Parser, Status, impl_parser},
    parsers::decode::NUL_SUBSTITUTE,
    sink::{PairFlags, StreamSink, emit_pair},
};

const NAME: &str = "php";
const MAX_SCALAR: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Null,
    Bool,
    Int,
    Double,
    Ref,
    Str,
    Array,
    Object,
    Custom,
}

impl Kind {
    fn from_tag(tag: u8) -> Option<Kind> {
        Some(match tag {
            b'N' => Kind::Null,
            b'b' => Kind::Bool,
            b'i' => Kind::Int,
            b'd' => Kind::Double,
            b'r' | b'R' => Kind::Ref,
            b's' => Kind::Str,
            b'a' => Kind::Array,
            b'O' => Kind::Object,
            b'C' => Kind::Custom,
            _ => return None,
        })
    }

    fn type_name(self) -> &'static [u8] {
        match self {
            Kind::Null => b"Null",
            Kind::Bool => b"Boolean",
            Kind::Int => b"Integer",
            Kind::Double => b"Double",
            Kind::Ref => b"Reference",
            Kind::Str => b"String",
            Kind::Array => b"Array",
            Kind::Object | Kind::Custom => b"Object",
        }
    }

    fn valid_scalar(self, text: &[u8]) -> bool {
        let digits = |t: &[u8]| !t.is_empty() && t.iter().all(u8::is_ascii_digit);
        match self {
            Kind::Bool => matches!(text, b"0" | b"1"),
            Kind::Int => digits(text.strip_prefix(b"-").unwrap_or(text)),
            Kind::Ref => digits(text),
            Kind::Double => {
                matches!(text, b"INF" | b"-INF" | b"NAN")
                    || (!text.is_empty()
                        && text
                            .iter()
                            .all(|&b| matches!(b, b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Key,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting a type tag, or `}` inside a container.
    Type,
    Colon,
    /// `N` expects `;` right away.
    Terminator,
    Scalar,
    Length,
    OpenQuote,
    Body,
    Backslash,
    BackslashX,
    BackslashX0,
    CloseQuote,
    AfterString,
    Count,
    OpenBrace,
    ClassData,
    ClassClose,
    End,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    declared: usize,
    /// Keys plus values still expected.
    remaining: usize,
    report_empty: bool,
    pairs_at_open: usize,
}

/// Streaming parser for PHP-serialized values.
#[derive(Debug)]
pub struct PhpParser<S> {
    sink: S,
    path: KeyPath,
    frames: Vec<Frame>,
    state: State,
    kind: Kind,
    role: Role,
    number: usize,
    digits: usize,
    declared: usize,
    remaining: usize,
    /// Scalar text, string key or class name.
    token: Vec<u8>,
    /// String value bytes not yet handed on.
    scratch: Vec<u8>,
    class_data: Vec<u8>,
    pairs: usize,
    limits: Limits,
    status: Status,
    depth: usize,
}

impl<S: StreamSink> PhpParser<S> {
    /// Creates a parser writing to `sink`.
    pub fn new(sink: S, limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            path: KeyPath::new(limits.max_depth),
            frames: Vec::new(),
            state: State::Type,
            kind: Kind::Null,
            role: Role::Value,
            number: 0,
            digits: 0,
            declared: 0,
            remaining: 0,
            token: Vec::new(),
            scratch: Vec::new(),
            class_data: Vec::new(),
            pairs: 0,
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

    fn syntax(reason: &'static str) -> ParseError {
        ParseError::syntax(NAME, reason)
    }

    fn key_for(path: &KeyPath, kind: Kind) -> &[u8] {
        if path.is_empty() {
            kind.type_name()
        } else {
            path.as_bytes()
        }
    }

    fn accumulate(&mut self, b: u8) -> Result<(), ParseError> {
        self.number = self
            .number
            .checked_mul(10)
            .and_then(|n| n.checked_add(usize::from(b - b'0')))
            .ok_or_else(|| Self::syntax("length overflow"))?;
        self.digits += 1;
        Ok(())
    }

    fn take_number(&mut self) -> Result<usize, ParseError> {
        if self.digits == 0 {
            return Err(Self::syntax("missing length"));
        }
        let n = self.number;
        self.number = 0;
        self.digits = 0;
        Ok(n)
    }

    /// A member key or value is starting inside the current container.
    fn claim_item(&mut self) -> Result<(), ParseError> {
        if let Some(frame) = self.frames.last_mut() {
            if frame.remaining == 0 {
                return Err(ParseError::LengthMismatch {
                    expected: frame.declared,
                    actual: frame.declared + 1,
                });
            }
            frame.remaining -= 1;
        }
        Ok(())
    }

    fn expecting_key(&self) -> bool {
        self.frames.last().is_some_and(|f| f.remaining % 2 == 0)
    }

    fn begin_type(&mut self, b: u8) -> Result<(), ParseError> {
        let kind = Kind::from_tag(b).ok_or_else(|| Self::syntax("unknown type tag"))?;
        self.role = if self.expecting_key() {
            if !matches!(kind, Kind::Int | Kind::Str) {
                return Err(Self::syntax("invalid member key type"));
            }
            Role::Key
        } else {
            Role::Value
        };
        self.claim_item()?;
        self.kind = kind;
        self.token.clear();
        self.state = if kind == Kind::Null {
            State::Terminator
        } else {
            State::Colon
        };
        Ok(())
    }

    /// A value (scalar or container) is complete.
    fn after_value(&mut self) {
        if self.frames.is_empty() {
            self.state = State::End;
        } else {
            self.path.pop();
            self.state = State::Type;
        }
    }

    fn complete_scalar(&mut self) -> Result<(), ParseError> {
        if self.role == Role::Key {
            self.path.push(&self.token)?;
            self.state = State::Type;
            return Ok(());
        }
        emit_pair(&mut self.sink, Self::key_for(&self.path, self.kind), &self.token)?;
        self.pairs += 1;
        self.after_value();
        Ok(())
    }

    fn body_byte(&mut self, b: u8) {
        match (self.role, self.kind) {
            (Role::Value, Kind::Str) => self.scratch.push(b),
            _ => {
                if self.token.len() < self.limits.max_key_size {
                    self.token.push(b);
                }
            }
        }
    }

    fn after_body_byte(&mut self) {
        self.remaining -= 1;
        self.state = if self.remaining == 0 {
            State::CloseQuote
        } else {
            State::Body
        };
    }

    /// Emits bytes of an incomplete escape as ordinary string content.
    fn literal_bytes(&mut self, bytes: &[u8]) -> Result<(), ParseError> {
        for &b in bytes {
            if self.remaining == 0 {
                return Err(ParseError::LengthMismatch {
                    expected: self.declared,
                    actual: self.declared + 1,
                });
            }
            self.body_byte(b);
            self.after_body_byte();
        }
        Ok(())
    }

    fn flush_scratch(&mut self) -> Result<(), ParseError> {
        if !self.scratch.is_empty() {
            self.sink.on_value(&self.scratch)?;
            self.scratch.clear();
        }
        Ok(())
    }

    fn open(&mut self, report_empty: bool) -> Result<(), ParseError> {
        if self.frames.len() >= self.limits.max_depth {
            return Err(ParseError::ResourceLimitExceeded(Limit::Depth));
        }
        let declared = self.take_number()?;
        let remaining = declared
            .checked_mul(2)
            .ok_or_else(|| Self::syntax("length overflow"))?;
        self.frames.push(Frame {
            declared,
            remaining,
            report_empty,
            pairs_at_open: self.pairs,
        });
        self.state = State::Type;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ParseError> {
        let frame = self
            .frames
            .pop()
            .ok_or(ParseError::Internal("php: close without open container"))?;
        if frame.remaining != 0 {
            return Err(ParseError::LengthMismatch {
                expected: frame.declared,
                actual: (frame.declared * 2 - frame.remaining) / 2,
            });
        }
        if frame.report_empty && self.pairs == frame.pairs_at_open {
            emit_pair(&mut self.sink, Self::key_for(&self.path, Kind::Array), b"")?;
            self.pairs += 1;
        }
        self.after_value();
        Ok(())
    }

    /// Dissects the data of a `C:` object with a nested parser.
    fn finish_class_data(&mut self) -> Result<(), ParseError> {
        if self.depth + 1 > self.limits.max_depth {
            return Err(ParseError::ResourceLimitExceeded(Limit::Depth));
        }
        let data = core::mem::take(&mut self.class_data);
        let mut child = PhpParser::new(
            BufferedSink::with_depth(Collector::new(), &self.limits, self.depth + 1),
            &self.limits,
            self.depth + 1,
        );
        let outcome = if data.is_empty() {
            child.finish()
        } else {
            child.push(&data).and_then(|_| child.finish())
        };

        let prefix = self.path.as_bytes();
        match outcome {
            Ok(()) => {
                let mut key = Vec::new();
                for pair in child.into_sink().into_inner().into_pairs() {
                    if pair.flags.contains(PairFlags::FIRST) {
                        key.clear();
                        key.extend_from_slice(prefix);
                        if !prefix.is_empty() {
                            key.push(b'.');
                        }
                        key.extend_from_slice(&pair.key);
                        self.sink.on_key(&key)?;
                    }
                    if !pair.value.is_empty() {
                        self.sink.on_value(&pair.value)?;
                    }
                    if pair.flags.contains(PairFlags::LAST) {
                        self.sink.on_done()?;
                        self.pairs += 1;
                    }
                }
            }
            Err(err @ (ParseError::ResourceLimitExceeded(_) | ParseError::Internal(_))) => {
                return Err(err);
            }
            Err(err) => {
                log::debug!(target: "dissector::php", "class data kept raw: {err}");
                emit_pair(&mut self.sink, Self::key_for(&self.path, Kind::Custom), &data)?;
                self.pairs += 1;
            }
        }
        self.after_value();
        Ok(())
    }

    /// Handles one byte. Returns `false` if the byte must be handled again.
    fn step(&mut self, b: u8) -> Result<bool, ParseError> {
        match self.state {
            State::Type => {
                if b == b'}' && !self.frames.is_empty() {
                    self.close()?;
                } else {
                    self.begin_type(b)?;
                }
            }
            State::Colon => {
                if b != b':' {
                    return Err(Self::syntax("expected ':'"));
                }
                self.state = match self.kind {
                    Kind::Bool | Kind::Int | Kind::Double | Kind::Ref => State::Scalar,
                    Kind::Str | Kind::Object | Kind::Custom => State::Length,
                    Kind::Array => State::Count,
                    Kind::Null => return Err(ParseError::Internal("php: colon after null")),
                };
            }
            State::Terminator => {
                if b != b';' {
                    return Err(Self::syntax("expected ';'"));
                }
                self.complete_scalar()?;
            }
            State::Scalar => {
                if b == b';' {
                    if !self.kind.valid_scalar(&self.token) {
                        return Err(Self::syntax("invalid scalar"));
                    }
                    self.complete_scalar()?;
                } else if self.token.len() >= MAX_SCALAR {
                    return Err(Self::syntax("scalar too long"));
                } else {
                    self.token.push(b);
                }
            }
            State::Length => match b {
                b'0'..=b'9' => self.accumulate(b)?,
                b':' => {
                    self.declared = self.take_number()?;
                    self.state = State::OpenQuote;
                }
                _ => return Err(Self::syntax("invalid length")),
            },
            State::OpenQuote => {
                if b != b'"' {
                    return Err(Self::syntax("expected '\"'"));
                }
                if self.role == Role::Value && self.kind == Kind::Str {
                    self.sink.on_key(Self::key_for(&self.path, Kind::Str))?;
                }
                self.remaining = self.declared;
                self.state = if self.remaining == 0 {
                    State::CloseQuote
                } else {
                    State::Body
                };
            }
            State::Body => {
                if b == b'\\' {
                    self.state = State::Backslash;
                } else {
                    self.body_byte(b);
                    self.after_body_byte();
                }
            }
            State::Backslash => match b {
                b'0' => {
                    self.body_byte(NUL_SUBSTITUTE);
                    self.after_body_byte();
                }
                b'x' => self.state = State::BackslashX,
                _ => {
                    self.literal_bytes(b"\\")?;
                    return Ok(false);
                }
            },
            State::BackslashX => {
                if b == b'0' {
                    self.state = State::BackslashX0;
                } else {
                    self.literal_bytes(b"\\x")?;
                    return Ok(false);
                }
            }
            State::BackslashX0 => {
                if b == b'0' {
                    self.body_byte(NUL_SUBSTITUTE);
                    self.after_body_byte();
                } else {
                    self.literal_bytes(b"\\x0")?;
                    return Ok(false);
                }
            }
            State::CloseQuote => {
                if b != b'"' {
                    return Err(ParseError::LengthMismatch {
                        expected: self.declared,
                        actual: self.declared + 1,
                    });
                }
                self.state = State::AfterString;
            }
            State::AfterString => match (self.kind, b) {
                (Kind::Str, b';') => {
                    if self.role == Role::Key {
                        self.complete_scalar()?;
                    } else {
                        self.flush_scratch()?;
                        self.sink.on_done()?;
                        self.pairs += 1;
                        self.after_value();
                    }
                }
                (Kind::Object | Kind::Custom, b':') => {
                    emit_pair(&mut self.sink, Self::key_for(&self.path, self.kind), &self.token)?;
                    self.pairs += 1;
                    self.state = State::Count;
                }
                _ => return Err(Self::syntax("unexpected byte after string")),
            },
            State::Count => match b {
                b'0'..=b'9' => self.accumulate(b)?,
                b':' => self.state = State::OpenBrace,
                _ => return Err(Self::syntax("invalid count")),
            },
            State::OpenBrace => {
                if b != b'{' {
                    return Err(Self::syntax("expected '{'"));
                }
                match self.kind {
                    Kind::Array => self.open(true)?,
                    Kind::Object => self.open(false)?,
                    _ => {
                        self.declared = self.take_number()?;
                        if self.declared > self.limits.max_value_size {
                            return Err(ParseError::ResourceLimitExceeded(Limit::ValueSize));
                        }
                        self.remaining = self.declared;
                        self.class_data.clear();
                        self.state = if self.remaining == 0 {
                            State::ClassClose
                        } else {
                            State::ClassData
                        };
                    }
                }
            }
            State::ClassData => {
                self.class_data.push(b);
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.state = State::ClassClose;
                }
            }
            State::ClassClose => {
                if b != b'}' {
                    return Err(ParseError::LengthMismatch {
                        expected: self.declared,
                        actual: self.declared + 1,
                    });
                }
                self.finish_class_data()?;
            }
            State::End => {
                if !b.is_ascii_whitespace() {
                    return Err(Self::syntax("trailing data"));
                }
            }
        }
        Ok(true)
    }
}

impl<S: StreamSink> Machine for PhpParser<S> {
    const NAME: &'static str = NAME;

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut i = 0;
        while i < data.len() {
            if self.step(data[i])? {
                i += 1;
            }
        }
        self.flush_scratch()
    }

    fn end(&mut self) -> Result<(), ParseError> {
        match self.state {
            State::End => Ok(()),
            State::Type if self.frames.is_empty() => Err(Self::syntax("empty document")),
            _ => Err(Self::syntax("unexpected end of input")),
        }
    }
}

impl_parser!(PhpParser<S: StreamSink>);

#[cfg(test)]
mod tests {
    use alloc::{string::String, vec::Vec};

    use rstest::rstest;

    use super::*;

    fn parse_with(limits: &Limits, chunks: &[&[u8]]) -> Result<String, ParseError> {
        let mut p = PhpParser::new(BufferedSink::new(Collector::new(), limits), limits, 0);
        for chunk in chunks {
            p.push(chunk)?;
        }
        p.finish()?;
        Ok(p.into_sink().into_inner().render())
    }

    fn parse(input: &str) -> Result<String, ParseError> {
        parse_with(&Limits::default(), &[input.as_bytes()])
    }

    #[rstest]
    #[case::string(r#"s:5:"hello";"#, "String=hello\n")]
    #[case::int("i:-42;", "Integer=-42\n")]
    #[case::double("d:0.5;", "Double=0.5\n")]
    #[case::null("N;", "Null=\n")]
    #[case::bool("b:1;", "Boolean=1\n")]
    #[case::array(
        r#"a:2:{i:0;s:1:"x";s:1:"k";a:1:{s:1:"n";b:0;}}"#,
        "0=x\nk.n=0\n"
    )]
    #[case::empty_array(r#"a:1:{s:1:"e";a:0:{}}"#, "e=\n")]
    #[case::object(
        r#"O:3:"Foo":2:{s:3:"bar";i:1;s:6:"\0*\0baz";N;}"#,
        "Object=Foo\nbar=1\n@*@baz=\n"
    )]
    #[case::hex_escape(r#"s:2:"a\x00";"#, "String=a@\n")]
    #[case::backslash_literal(r#"s:3:"a\n";"#, "String=a\\n\n")]
    #[case::quote_inside(r#"s:3:"a"b";"#, "String=a\"b\n")]
    #[case::class_data(
        r#"a:1:{s:1:"c";C:3:"Foo":18:{a:1:{s:1:"x";i:5;}}}"#,
        "c=Foo\nc.x=5\n"
    )]
    #[case::class_data_raw(r#"C:3:"Foo":5:{hello}"#, "Object=Foo\nObject=hello\n")]
    fn values(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(parse(input).unwrap(), expected);
    }

    #[rstest]
    #[case::short_string(r#"a:1:{i:0;s:5:"hey";}"#, 5, 6)]
    #[case::long_string(r#"s:2:"hey";"#, 2, 3)]
    #[case::too_few_items(r#"a:2:{i:0;i:1;}"#, 2, 1)]
    #[case::too_many_items(r#"a:1:{i:0;i:1;i:1;i:2;}"#, 1, 2)]
    #[case::class_data_overrun(r#"C:1:"F":2:{abc}"#, 2, 3)]
    fn length_mismatches(#[case] input: &str, #[case] expected: usize, #[case] actual: usize) {
        assert_eq!(
            parse(input),
            Err(ParseError::LengthMismatch { expected, actual })
        );
    }

    #[rstest]
    #[case::bad_tag("x:1;", "unknown type tag")]
    #[case::bad_key(r#"a:1:{d:1.0;i:1;}"#, "invalid member key type")]
    #[case::bad_bool("b:2;", "invalid scalar")]
    #[case::truncated(r#"a:1:{i:0;"#, "unexpected end of input")]
    #[case::trailing("i:1;i:2;", "trailing data")]
    #[case::empty("", "empty document")]
    fn malformed(#[case] input: &str, #[case] reason: &'static str) {
        assert_eq!(
            parse(input),
            Err(ParseError::MalformedSyntax {
                parser: "php",
                reason
            })
        );
    }

    #[test]
    fn every_split_point_gives_the_same_pairs() {
        let input = br#"a:3:{s:4:"\0a\0b";s:3:"x\x00y";i:7;d:-1.5E+3;s:1:"o";O:1:"K":1:{s:1:"p";C:1:"Z":8:{i:12345;}}}"#;
        let whole = parse_with(&Limits::default(), &[input]).unwrap();
        assert!(whole.contains("o.p.Integer=12345"), "{whole}");
        for cut in 1..input.len() {
            let (head, tail) = input.split_at(cut);
            assert_eq!(parse_with(&Limits::default(), &[head, tail]).unwrap(), whole);
        }
        let singles: Vec<&[u8]> = input.chunks(1).collect();
        assert_eq!(parse_with(&Limits::default(), &singles).unwrap(), whole);
    }

    #[test]
    fn deep_nesting_is_refused() {
        let input = "a:1:{i:0;".repeat(100_000);
        assert_eq!(
            parse(&input),
            Err(ParseError::ResourceLimitExceeded(Limit::Depth))
        );
    }

    #[test]
    fn nested_class_data_is_bounded_by_depth() {
        let limits = Limits {
            max_depth: 1,
            ..Limits::default()
        };
        let out = parse_with(&limits, &[br#"C:1:"A":2:{N;}"#]).unwrap();
        assert_eq!(out, "Object=A\nNull=\n");
        let limits = Limits {
            max_depth: 0,
            ..Limits::default()
        };
        assert_eq!(
            parse_with(&limits, &[br#"C:1:"A":4:{i:1;}"#]),
            Err(ParseError::ResourceLimitExceeded(Limit::Depth))
        );
    }

    #[rstest]
    #[case::within(3, Ok("Object=A\nObject=B\nObject=C\nInteger=1\n"))]
    #[case::one_level_too_deep(2, Err(ParseError::ResourceLimitExceeded(Limit::Depth)))]
    fn deep_class_data_reports_the_limit(
        #[case] max_depth: usize,
        #[case] expected: Result<&str, ParseError>,
    ) {
        let limits = Limits {
            max_depth,
            ..Limits::default()
        };
        let expected = expected.map(str::to_owned);
        let input: &[u8] = br#"C:1:"A":29:{C:1:"B":16:{C:1:"C":4:{i:1;}}}"#;
        assert_eq!(parse_with(&limits, &[input]), expected);
        for cut in 1..input.len() {
            let (head, tail) = input.split_at(cut);
            assert_eq!(parse_with(&limits, &[head, tail]), expected);
        }
    }
}
