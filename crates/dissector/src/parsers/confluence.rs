//! Confluence wiki macros: `{name:attr=value|attr2=value2}`.
//!
//! Each attribute is reported as `(name.attr, value)`; an attribute without
//! `=` gets an empty value. Values are streamed, so a long value costs no
//! buffer. The macro must open with `{` and nothing may follow its closing
//! `}`.

use alloc::vec::Vec;

use crate::{
    Limits,
    error::ParseError,
    parser::{Machine, Status, impl_parser},
    sink::{StreamSink, emit_pair},
};

const NAME: &str = "confluence";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Name,
    Attr,
    Value,
    End,
}

/// Streaming parser of a single Confluence macro.
#[derive(Debug)]
pub struct ConfluenceParser<S> {
    sink: S,
    state: State,
    name: Vec<u8>,
    attr: Vec<u8>,
    scratch: Vec<u8>,
    max_key_size: usize,
    status: Status,
    depth: usize,
}

impl<S: StreamSink> ConfluenceParser<S> {
    /// Creates a parser writing to `sink`.
    pub fn new(sink: S, limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            state: State::Start,
            name: Vec::new(),
            attr: Vec::new(),
            scratch: Vec::new(),
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

    /// `name.attr`, or whichever half is present.
    fn key(&self) -> Vec<u8> {
        let mut key = self.name.clone();
        if !self.attr.is_empty() {
            if !key.is_empty() {
                key.push(b'.');
            }
            key.extend_from_slice(&self.attr);
        }
        if key.is_empty() {
            key.extend_from_slice(NAME.as_bytes());
        }
        key
    }

    fn bare_attr(&mut self) -> Result<(), ParseError> {
        let key = self.key();
        emit_pair(&mut self.sink, &key, b"")?;
        self.attr.clear();
        Ok(())
    }

    fn end_value(&mut self) -> Result<(), ParseError> {
        if !self.scratch.is_empty() {
            self.sink.on_value(&self.scratch)?;
            self.scratch.clear();
        }
        self.sink.on_done()?;
        self.attr.clear();
        Ok(())
    }

    fn step(&mut self, b: u8) -> Result<(), ParseError> {
        match self.state {
            State::Start => {
                if b != b'{' {
                    return Err(ParseError::syntax(NAME, "expected `{`"));
                }
                self.state = State::Name;
            }
            State::Name => match b {
                b':' => self.state = State::Attr,
                b'"' => return Err(ParseError::syntax(NAME, "quote in macro name")),
                _ if self.name.len() < self.max_key_size => self.name.push(b),
                _ => {}
            },
            State::Attr => match b {
                b'=' => {
                    let key = self.key();
                    self.sink.on_key(&key)?;
                    self.state = State::Value;
                }
                b'|' => self.bare_attr()?,
                b'}' => {
                    self.bare_attr()?;
                    self.state = State::End;
                }
                _ if self.attr.len() < self.max_key_size => self.attr.push(b),
                _ => {}
            },
            State::Value => match b {
                b'|' => {
                    self.end_value()?;
                    self.state = State::Attr;
                }
                b'}' => {
                    self.end_value()?;
                    self.state = State::End;
                }
                _ => self.scratch.push(b),
            },
            State::End => return Err(ParseError::syntax(NAME, "data after macro")),
        }
        Ok(())
    }
}

impl<S: StreamSink> Machine for ConfluenceParser<S> {
    const NAME: &'static str = NAME;

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        for &b in data {
            self.step(b)?;
        }
        if self.state == State::Value && !self.scratch.is_empty() {
            self.sink.on_value(&self.scratch)?;
            self.scratch.clear();
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), ParseError> {
        if self.state != State::End {
            log::debug!(target: "dissector::confluence", "macro cut off in {:?}", self.state);
            return Err(ParseError::syntax(NAME, "unterminated macro"));
        }
        Ok(())
    }
}

impl_parser!(ConfluenceParser<S: StreamSink>);

#[cfg(test)]
mod tests {
    use alloc::{string::String, vec::Vec};

    use rstest::rstest;

    use super::*;
    use crate::{BufferedSink, Collector, Parser};

    fn parse(chunks: &[&[u8]]) -> Result<String, ParseError> {
        let limits = Limits::default();
        let mut p = ConfluenceParser::new(BufferedSink::new(Collector::new(), &limits), &limits, 0);
        for chunk in chunks {
            p.push(chunk)?;
        }
        p.finish()?;
        Ok(p.into_sink().into_inner().render())
    }

    #[rstest]
    #[case::attributes("{code:title=a.js|lang=js}", "code.title=a.js\ncode.lang=js\n")]
    #[case::bare_attribute("{info:icon|title=x}", "info.icon=\ninfo.title=x\n")]
    #[case::empty_value("{note:t=}", "note.t=\n")]
    #[case::empty_attribute("{anchor:}", "anchor=\n")]
    #[case::payload("{x:v=<script>alert(1)</script>}", "x.v=<script>alert(1)</script>\n")]
    fn macros(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(parse(&[input.as_bytes()]).unwrap(), expected);
    }

    #[rstest]
    #[case::no_brace("code:a=b}", "expected `{`")]
    #[case::quoted_name("{\"code\":1}", "quote in macro name")]
    #[case::no_colon("{code}", "unterminated macro")]
    #[case::unclosed("{code:a=b", "unterminated macro")]
    #[case::trailing("{code:a=b}x", "data after macro")]
    #[case::empty("", "unterminated macro")]
    fn malformed(#[case] input: &str, #[case] reason: &'static str) {
        assert_eq!(parse(&[input.as_bytes()]), Err(ParseError::syntax("confluence", reason)));
    }

    #[test]
    fn every_split_point_gives_the_same_pairs() {
        let input = b"{panel:title=My Title|borderStyle|bgColor=#fff}";
        let whole = parse(&[input]).unwrap();
        for cut in 1..input.len() {
            let (head, tail) = input.split_at(cut);
            assert_eq!(parse(&[head, tail]).unwrap(), whole);
        }
        let singles: Vec<&[u8]> = input.chunks(1).collect();
        assert_eq!(parse(&singles).unwrap(), whole);
    }
}
