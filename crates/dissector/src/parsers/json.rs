//! Incremental JSON dissection.
//!
//! The tokenizer works byte by byte and keeps every partial token (string
//! escapes, numbers, literals, comments) in its own state, so a document may
//! be cut anywhere. The grammar is relaxed the way common server-side
//! parsers relax it: `//` and `/* */` comments are skipped, several top-level
//! values may follow each other, and string contents are not checked for
//! valid UTF-8.
//!
//! # Pairs
//!
//! The key path starts with an internal root segment (`json`). An object key
//! is pushed when its name closes; a scalar inside an object is reported as
//! `(path, text)` and then pops its key, while a nested container keeps the
//! key pushed until it closes. Array elements are reported under the key of
//! the enclosing member. Paths are reported without the root segment; values
//! with no member above them (top-level scalars) use the root segment itself.
//!
//! Numbers and literals are reported as their source text, strings unescaped.
//! A container that closes without having reported anything reports
//! `(path, "")` so that its key is still seen.
//!
//! Nesting is tracked on an explicit stack bounded by
//! [`Limits::max_depth`](crate::Limits::max_depth).

use alloc::vec::Vec;

use crate::{
    Limits,
    error::{Limit, ParseError},
    key_path::KeyPath,
    parser::{Machine, Status, impl_parser},
    parsers::{
        decode::NUL_SUBSTITUTE,
        literal::{LiteralMatcher, Step},
        prefix::BomSniffer,
    },
    sink::{StreamSink, emit_pair},
};

const NAME: &str = "json";
const ROOT: &[u8] = b"json";

// ------------------------------------------------------------------------------------------------
// States
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Before the first top-level value.
    Start,
    /// After `{`.
    ObjectOpen,
    /// After `,` inside an object.
    BeforePropertyName,
    AfterPropertyName,
    BeforePropertyValue,
    /// After `[`.
    ArrayOpen,
    /// After `,` inside an array.
    BeforeArrayValue,
    AfterValue,
    /// After a complete top-level value.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Key,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumState {
    Sign,
    Zero,
    Integer,
    Point,
    Fraction,
    Exponent,
    ExponentSign,
    ExponentInteger,
}

impl NumState {
    fn accepting(self) -> bool {
        matches!(
            self,
            NumState::Zero | NumState::Integer | NumState::Fraction | NumState::ExponentInteger
        )
    }

    fn next(self, b: u8) -> Option<NumState> {
        use NumState::*;
        match (self, b) {
            (Sign, b'0') => Some(Zero),
            (Sign, b'1'..=b'9') => Some(Integer),
            (Zero | Integer, b'.') => Some(Point),
            (Integer, b'0'..=b'9') => Some(Integer),
            (Point | Fraction, b'0'..=b'9') => Some(Fraction),
            (Zero | Integer | Fraction, b'e' | b'E') => Some(Exponent),
            (Exponent, b'+' | b'-') => Some(ExponentSign),
            (Exponent | ExponentSign | ExponentInteger, b'0'..=b'9') => Some(ExponentInteger),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Default,
    CommentStart,
    LineComment,
    BlockComment,
    BlockCommentStar,
    String(Role),
    StringEscape(Role),
    StringUnicode(Role),
    Number(NumState),
    Literal,
}

/// One open container.
#[derive(Debug, Clone, Copy)]
struct Frame {
    object: bool,
    /// Value of the pair counter when the container opened.
    pairs_at_open: usize,
}

// ------------------------------------------------------------------------------------------------
// Parser
// ------------------------------------------------------------------------------------------------

/// Streaming JSON parser reporting one pair per scalar.
#[derive(Debug)]
pub struct JsonParser<S> {
    sink: S,
    path: KeyPath,
    frames: Vec<Frame>,
    parse_state: ParseState,
    lex_state: LexState,
    bom: BomSniffer,
    literal: LiteralMatcher,
    /// Unicode escape digits collected so far and their count.
    unicode: (u16, u8),
    high_surrogate: Option<u16>,
    /// Decoded bytes not yet handed on.
    scratch: Vec<u8>,
    key: Vec<u8>,
    pairs: usize,
    max_depth: usize,
    max_key_size: usize,
    status: Status,
    depth: usize,
}

fn pair_key(path: &KeyPath) -> &[u8] {
    match path.rest() {
        [] => path.first(),
        rest => rest,
    }
}

fn push_utf8(out: &mut Vec<u8>, c: char) {
    let mut buf = [0; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

impl<S: StreamSink> JsonParser<S> {
    /// Creates a parser writing to `sink`.
    pub fn new(sink: S, limits: &Limits, depth: usize) -> Self {
        let mut path = KeyPath::new(limits.max_depth.saturating_add(1));
        // A fresh path always has room for the root segment.
        let _ = path.push(ROOT);
        Self {
            sink,
            path,
            frames: Vec::new(),
            parse_state: ParseState::Start,
            lex_state: LexState::Default,
            bom: BomSniffer::default(),
            literal: LiteralMatcher::default(),
            unicode: (0, 0),
            high_surrogate: None,
            scratch: Vec::new(),
            key: Vec::new(),
            pairs: 0,
            max_depth: limits.max_depth,
            max_key_size: limits.max_key_size,
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

    fn flush_scratch(&mut self) -> Result<(), ParseError> {
        if self.scratch.is_empty() {
            return Ok(());
        }
        match self.lex_state {
            LexState::String(Role::Key)
            | LexState::StringEscape(Role::Key)
            | LexState::StringUnicode(Role::Key) => {
                let room = self.max_key_size.saturating_sub(self.key.len());
                let take = room.min(self.scratch.len());
                self.key.extend_from_slice(&self.scratch[..take]);
            }
            _ => self.sink.on_value(&self.scratch)?,
        }
        self.scratch.clear();
        Ok(())
    }

    fn begin_pair(&mut self) -> Result<(), ParseError> {
        self.sink.on_key(pair_key(&self.path))?;
        Ok(())
    }

    /// A value (scalar or container) is complete.
    fn after_value(&mut self) {
        match self.frames.last() {
            Some(frame) => {
                if frame.object {
                    self.path.pop();
                }
                self.parse_state = ParseState::AfterValue;
            }
            None => self.parse_state = ParseState::End,
        }
    }

    fn finish_scalar(&mut self) -> Result<(), ParseError> {
        self.flush_scratch()?;
        self.sink.on_done()?;
        self.pairs += 1;
        self.lex_state = LexState::Default;
        self.after_value();
        Ok(())
    }

    fn open(&mut self, object: bool) -> Result<(), ParseError> {
        if self.frames.len() >= self.max_depth {
            return Err(ParseError::ResourceLimitExceeded(Limit::Depth));
        }
        self.frames.push(Frame {
            object,
            pairs_at_open: self.pairs,
        });
        self.parse_state = if object {
            ParseState::ObjectOpen
        } else {
            ParseState::ArrayOpen
        };
        Ok(())
    }

    fn close(&mut self) -> Result<(), ParseError> {
        let frame = self
            .frames
            .pop()
            .ok_or(ParseError::Internal("json: close without open container"))?;
        if self.pairs == frame.pairs_at_open {
            emit_pair(&mut self.sink, pair_key(&self.path), b"")?;
            self.pairs += 1;
        }
        self.after_value();
        Ok(())
    }

    fn begin_value(&mut self, b: u8) -> Result<(), ParseError> {
        match b {
            b'{' => self.open(true),
            b'[' => self.open(false),
            b'"' => {
                self.begin_pair()?;
                self.lex_state = LexState::String(Role::Value);
                Ok(())
            }
            b'-' | b'0'..=b'9' => {
                self.begin_pair()?;
                self.scratch.push(b);
                self.lex_state = LexState::Number(match b {
                    b'-' => NumState::Sign,
                    b'0' => NumState::Zero,
                    _ => NumState::Integer,
                });
                Ok(())
            }
            _ => match LiteralMatcher::start(b) {
                Some(matcher) => {
                    self.literal = matcher;
                    self.lex_state = LexState::Literal;
                    Ok(())
                }
                None => Err(Self::syntax("unexpected character")),
            },
        }
    }

    fn structural(&mut self, b: u8) -> Result<(), ParseError> {
        match self.parse_state {
            ParseState::ArrayOpen if b == b']' => self.close(),
            ParseState::Start
            | ParseState::End
            | ParseState::BeforePropertyValue
            | ParseState::ArrayOpen
            | ParseState::BeforeArrayValue => self.begin_value(b),
            ParseState::ObjectOpen if b == b'}' => self.close(),
            ParseState::ObjectOpen | ParseState::BeforePropertyName => {
                if b != b'"' {
                    return Err(Self::syntax("expected property name"));
                }
                self.key.clear();
                self.lex_state = LexState::String(Role::Key);
                Ok(())
            }
            ParseState::AfterPropertyName => {
                if b != b':' {
                    return Err(Self::syntax("expected ':'"));
                }
                self.parse_state = ParseState::BeforePropertyValue;
                Ok(())
            }
            ParseState::AfterValue => match (self.frames.last(), b) {
                (Some(f), b',') => {
                    self.parse_state = if f.object {
                        ParseState::BeforePropertyName
                    } else {
                        ParseState::BeforeArrayValue
                    };
                    Ok(())
                }
                (Some(f), b'}') if f.object => self.close(),
                (Some(f), b']') if !f.object => self.close(),
                _ => Err(Self::syntax("unexpected character after value")),
            },
        }
    }

    fn end_string(&mut self, role: Role) -> Result<(), ParseError> {
        self.release_surrogate();
        self.flush_scratch()?;
        match role {
            Role::Key => {
                self.path.push(&self.key)?;
                self.lex_state = LexState::Default;
                self.parse_state = ParseState::AfterPropertyName;
                Ok(())
            }
            Role::Value => self.finish_scalar(),
        }
    }

    /// A high surrogate not followed by a low one decodes to U+FFFD.
    fn release_surrogate(&mut self) {
        if self.high_surrogate.take().is_some() {
            push_utf8(&mut self.scratch, char::REPLACEMENT_CHARACTER);
        }
    }

    fn code_unit(&mut self, unit: u16) {
        if let Some(high) = self.high_surrogate.take() {
            if (0xDC00..=0xDFFF).contains(&unit) {
                let code = 0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
                push_utf8(
                    &mut self.scratch,
                    char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER),
                );
                return;
            }
            push_utf8(&mut self.scratch, char::REPLACEMENT_CHARACTER);
        }
        match unit {
            0 => self.scratch.push(NUL_SUBSTITUTE),
            0xD800..=0xDBFF => self.high_surrogate = Some(unit),
            _ => push_utf8(
                &mut self.scratch,
                char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER),
            ),
        }
    }

    /// Handles one byte. Returns `false` if the byte must be handled again.
    fn step(&mut self, b: u8) -> Result<bool, ParseError> {
        match self.lex_state {
            LexState::Default => match b {
                b' ' | b'\t' | b'\n' | b'\r' => {}
                b'/' => self.lex_state = LexState::CommentStart,
                _ => self.structural(b)?,
            },
            LexState::CommentStart => {
                self.lex_state = match b {
                    b'/' => LexState::LineComment,
                    b'*' => LexState::BlockComment,
                    _ => return Err(Self::syntax("invalid comment")),
                };
            }
            LexState::LineComment => {
                if b == b'\n' {
                    self.lex_state = LexState::Default;
                }
            }
            LexState::BlockComment => {
                if b == b'*' {
                    self.lex_state = LexState::BlockCommentStar;
                }
            }
            LexState::BlockCommentStar => {
                self.lex_state = match b {
                    b'/' => LexState::Default,
                    b'*' => LexState::BlockCommentStar,
                    _ => LexState::BlockComment,
                };
            }
            LexState::String(role) => match b {
                b'"' => self.end_string(role)?,
                b'\\' => self.lex_state = LexState::StringEscape(role),
                _ => {
                    self.release_surrogate();
                    self.scratch.push(b);
                }
            },
            LexState::StringEscape(role) => {
                if b == b'u' {
                    self.unicode = (0, 0);
                    self.lex_state = LexState::StringUnicode(role);
                    return Ok(true);
                }
                self.release_surrogate();
                let decoded = match b {
                    b'"' | b'\\' | b'/' => b,
                    b'b' => 0x08,
                    b'f' => 0x0C,
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    _ => return Err(Self::syntax("invalid escape sequence")),
                };
                self.scratch.push(decoded);
                self.lex_state = LexState::String(role);
            }
            LexState::StringUnicode(role) => {
                let digit = crate::parsers::decode::hex_value(b)
                    .ok_or_else(|| Self::syntax("invalid unicode escape"))?;
                let (value, count) = self.unicode;
                let value = (value << 4) | u16::from(digit);
                if count == 3 {
                    self.code_unit(value);
                    self.lex_state = LexState::String(role);
                } else {
                    self.unicode = (value, count + 1);
                }
            }
            LexState::Number(state) => match state.next(b) {
                Some(next) => {
                    self.scratch.push(b);
                    self.lex_state = LexState::Number(next);
                }
                None if state.accepting() => {
                    self.finish_scalar()?;
                    return Ok(false);
                }
                None => return Err(Self::syntax("invalid number")),
            },
            LexState::Literal => match self.literal.step(b) {
                Step::NeedMore => {}
                Step::Done(text) => {
                    emit_pair(&mut self.sink, pair_key(&self.path), text)?;
                    self.pairs += 1;
                    self.lex_state = LexState::Default;
                    self.after_value();
                }
                Step::Reject => return Err(Self::syntax("invalid literal")),
            },
        }
        Ok(true)
    }

    fn scan(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut i = 0;
        while i < data.len() {
            if self.step(data[i])? {
                i += 1;
            }
        }
        Ok(())
    }
}

impl<S: StreamSink> Machine for JsonParser<S> {
    const NAME: &'static str = NAME;

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let (replay, data) = self.bom.strip(data);
        self.scan(replay)?;
        self.scan(data)?;
        self.flush_scratch()
    }

    fn end(&mut self) -> Result<(), ParseError> {
        let replay = self.bom.finish();
        self.scan(replay)?;
        match self.lex_state {
            LexState::Number(state) if state.accepting() => self.finish_scalar()?,
            LexState::Default | LexState::LineComment => {}
            LexState::Number(_) => return Err(Self::syntax("invalid number")),
            LexState::CommentStart | LexState::BlockComment | LexState::BlockCommentStar => {
                return Err(Self::syntax("unterminated comment"));
            }
            LexState::String(_) | LexState::StringEscape(_) | LexState::StringUnicode(_) => {
                return Err(Self::syntax("unterminated string"));
            }
            LexState::Literal => return Err(Self::syntax("invalid literal")),
        }
        match self.parse_state {
            ParseState::End => Ok(()),
            ParseState::Start => Err(Self::syntax("empty document")),
            _ => Err(Self::syntax("unexpected end of input")),
        }
    }
}

impl_parser!(JsonParser<S: StreamSink>);

#[cfg(test)]
mod tests {
    use alloc::{string::String, vec::Vec};

    use rstest::rstest;

    use super::*;
    use crate::{BufferedSink, Collector, Parser};

    fn parse_with(limits: &Limits, chunks: &[&[u8]]) -> Result<String, ParseError> {
        let mut p = JsonParser::new(BufferedSink::new(Collector::new(), limits), limits, 0);
        for chunk in chunks {
            p.push(chunk)?;
        }
        p.finish()?;
        Ok(p.into_sink().into_inner().render())
    }

    fn parse(input: &str) -> Result<String, ParseError> {
        parse_with(&Limits::default(), &[input.as_bytes()])
    }

    #[test]
    fn nested_members_are_dotted() {
        assert_eq!(parse(r#"{"a":1,"b":{"c":"x"}}"#).unwrap(), "a=1\nb.c=x\n");
    }

    #[rstest]
    #[case::array_elements(r#"{"k":[1,"two",true,null]}"#, "k=1\nk=two\nk=true\nk=null\n")]
    #[case::nested_arrays(r#"{"m":[[1],[2,{"x":-0.5e+3}]]}"#, "m=1\nm=2\nm.x=-0.5e+3\n")]
    #[case::top_level_scalar(r#""hi""#, "json=hi\n")]
    #[case::multiple_values("1 2\n{\"a\":3}", "json=1\njson=2\na=3\n")]
    #[case::empty_object(r#"{"a":{},"b":[]}"#, "a=\nb=\n")]
    #[case::empty_root("{}", "json=\n")]
    #[case::comments("/* c */ {\"a\" // x\n : 1}", "a=1\n")]
    #[case::escapes(r#"{"e":"\"\\\/\b\f\n\r\tAé"}"#, "e=\"\\/\u{8}\u{c}\n\r\tAé\n")]
    #[case::surrogate_pair(r#"{"s":"\ud83d\ude00"}"#, "s=😀\n")]
    #[case::lone_surrogate(r#"{"s":"\ud83dx"}"#, "s=\u{fffd}x\n")]
    #[case::nul_escape(r#"{"n":"a\u0000b"}"#, "n=a@b\n")]
    #[case::bom("\u{feff}{\"a\":1}", "a=1\n")]
    #[case::escaped_key(r#"{"a.b":1}"#, "a.b=1\n")]
    fn documents(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(parse(input).unwrap(), expected);
    }

    #[rstest]
    #[case::trailing_comma(r#"{"a":1,}"#, "expected property name")]
    #[case::bad_literal("[tru]", "invalid literal")]
    #[case::bad_number("[01]", "unexpected character after value")]
    #[case::dangling_minus("[-]", "invalid number")]
    #[case::unterminated_string(r#"{"a":"x"#, "unterminated string")]
    #[case::unclosed("[1,2", "unexpected end of input")]
    #[case::empty("  ", "empty document")]
    #[case::bad_escape(r#"["\q"]"#, "invalid escape sequence")]
    #[case::mismatched("[1}", "unexpected character after value")]
    fn malformed(#[case] input: &str, #[case] reason: &'static str) {
        assert_eq!(
            parse(input),
            Err(ParseError::MalformedSyntax {
                parser: "json",
                reason
            })
        );
    }

    #[test]
    fn number_at_end_of_input_completes() {
        assert_eq!(parse("42").unwrap(), "json=42\n");
    }

    #[test]
    fn every_split_point_gives_the_same_pairs() {
        let input = "\u{feff}{\"a\\u00e9\":[1.5e3,{\"b\":\"x\\ud83d\\ude00y\"}],/*c*/\"t\":true}";
        let whole = parse(input).unwrap();
        let bytes = input.as_bytes();
        for cut in 1..bytes.len() {
            let (head, tail) = bytes.split_at(cut);
            assert_eq!(parse_with(&Limits::default(), &[head, tail]).unwrap(), whole);
        }
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(parse_with(&Limits::default(), &singles).unwrap(), whole);
    }

    #[test]
    fn deep_nesting_is_refused_without_recursion() {
        let input = "[".repeat(100_000);
        assert_eq!(
            parse(&input),
            Err(ParseError::ResourceLimitExceeded(Limit::Depth))
        );
        let input = "{\"a\":".repeat(100_000);
        assert_eq!(
            parse(&input),
            Err(ParseError::ResourceLimitExceeded(Limit::Depth))
        );
    }

    #[test]
    fn deep_nesting_within_a_raised_limit_completes() {
        let limits = Limits {
            max_depth: 200_000,
            ..Limits::default()
        };
        let input = format!("{}{}", "[".repeat(100_000), "]".repeat(100_000));
        assert_eq!(parse_with(&limits, &[input.as_bytes()]).unwrap(), "json=\n");
    }
}
