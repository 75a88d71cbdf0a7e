//! JSON that was escaped to travel inside a JSON string.
//!
//! A client that serializes a document twice sends `"{\"a\":\"b\"}"`. This
//! parser undoes one level of that escaping: `\"` becomes `"`, `\\` becomes
//! `\`, any other escape is kept as it is, and bare quotes (the ones that
//! delimited the outer string) are dropped. The result is reported as one
//! value keyed `json_unscreened`, ready to be piped into a JSON parser.

use alloc::vec::Vec;

use crate::{
    Limits,
    error::ParseError,
    parser::{Machine, Status, impl_parser},
    sink::StreamSink,
};

const NAME: &str = "screened_json";
const KEY: &[u8] = b"json_unscreened";

/// Streaming remover of one level of JSON string escaping.
#[derive(Debug)]
pub struct ScreenedJsonParser<S> {
    sink: S,
    started: bool,
    /// A backslash whose meaning depends on the next byte.
    backslash: bool,
    scratch: Vec<u8>,
    status: Status,
    depth: usize,
}

impl<S: StreamSink> ScreenedJsonParser<S> {
    /// Creates a parser writing to `sink`.
    pub fn new(sink: S, _limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            started: false,
            backslash: false,
            scratch: Vec::new(),
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

    fn step(&mut self, b: u8) {
        match (b, core::mem::take(&mut self.backslash)) {
            (b'\\' | b'"', true) => self.scratch.push(b),
            (b'\\', false) => self.backslash = true,
            (b'"', false) => {}
            (_, true) => self.scratch.extend_from_slice(&[b'\\', b]),
            (_, false) => self.scratch.push(b),
        }
    }
}

impl<S: StreamSink> Machine for ScreenedJsonParser<S> {
    const NAME: &'static str = NAME;

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        if !self.started {
            self.sink.on_key(KEY)?;
            self.started = true;
        }
        for &b in data {
            self.step(b);
        }
        if !self.scratch.is_empty() {
            self.sink.on_value(&self.scratch)?;
            self.scratch.clear();
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), ParseError> {
        if self.backslash {
            return Err(ParseError::syntax(NAME, "dangling escape"));
        }
        if self.started {
            self.sink.on_done()?;
        }
        Ok(())
    }
}

impl_parser!(ScreenedJsonParser<S: StreamSink>);

#[cfg(test)]
mod tests {
    use alloc::{string::String, vec::Vec};

    use rstest::rstest;

    use super::*;
    use crate::{BufferedSink, Collector, Parser, ParserKind, ValuePipe};

    fn unscreen(chunks: &[&[u8]]) -> Result<String, ParseError> {
        let limits = Limits::default();
        let mut p =
            ScreenedJsonParser::new(BufferedSink::new(Collector::new(), &limits), &limits, 0);
        for chunk in chunks {
            p.push(chunk)?;
        }
        p.finish()?;
        Ok(p.into_sink().into_inner().render())
    }

    #[rstest]
    #[case::quoted_document(r#""{\"a\":\"b\"}""#, r#"json_unscreened={"a":"b"}"#)]
    #[case::bare_document(r#"{\"a\":1}"#, r#"json_unscreened={"a":1}"#)]
    #[case::escaped_backslash(r#"{\"p\":\"c:\\\\x\"}"#, r#"json_unscreened={"p":"c:\\x"}"#)]
    #[case::other_escapes_kept(r#"{\"n\":\"a\nb\u0041\"}"#, r#"json_unscreened={"n":"a\nb\u0041"}"#)]
    #[case::empty_string(r#""""#, "json_unscreened=")]
    fn documents(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(unscreen(&[input.as_bytes()]).unwrap().trim_end(), expected);
    }

    #[test]
    fn dangling_backslash_fails() {
        assert_eq!(
            unscreen(&[br#"{\"a\"}\"#]),
            Err(ParseError::syntax("screened_json", "dangling escape"))
        );
    }

    #[test]
    fn every_split_point_gives_the_same_pairs() {
        let input = br#""{\"k\":[\"v\\\\\",2]}""#;
        let whole = unscreen(&[input]).unwrap();
        for cut in 1..input.len() {
            let (head, tail) = input.split_at(cut);
            assert_eq!(unscreen(&[head, tail]).unwrap(), whole);
        }
        let singles: Vec<&[u8]> = input.chunks(1).collect();
        assert_eq!(unscreen(&singles).unwrap(), whole);
    }

    #[test]
    fn unscreened_text_feeds_a_json_parser() {
        let limits = Limits::default();
        let pipe = ValuePipe::new(ParserKind::Json, Collector::new(), &limits, 1);
        let mut p = ScreenedJsonParser::new(pipe, &limits, 0);
        p.push(br#""{\"user\":{\"na"#).unwrap();
        p.push(br#"me\":\"admin\"}}""#).unwrap();
        p.finish().unwrap();
        assert_eq!(p.into_sink().into_inner().render(), "user.name=admin\n");
    }
}
