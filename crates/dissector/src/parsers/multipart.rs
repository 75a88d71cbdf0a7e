//! `multipart/form-data` bodies.
//!
//! Each part is reported as one pair. Its key is the `name` parameter of the
//! part's `Content-Disposition` header, or `part-N` with the zero-based part
//! index when there is none. Bytes before the first boundary and after the
//! closing one are ignored.
//!
//! Part bodies are scanned for `CRLF--boundary`. Bytes that start to match
//! are held back; when a later byte breaks the match they are released as
//! body data and scanning resumes at the byte that broke it, which may itself
//! start a new match.

use alloc::{format, vec::Vec};

use bstr::ByteSlice;

use crate::{
    BufferedSink, Collector, Limits,
    error::ParseError,
    parser::{Machine, Parser, Status, impl_parser},
    parsers::delimited::{DelimitedOptions, DelimitedParser},
    sink::{PairFlags, StreamSink},
};

const NAME: &str = "multipart";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Looking for the first boundary.
    Preamble,
    /// A boundary has just been matched.
    BoundaryEnd,
    BoundaryLf,
    ClosingDash,
    Header,
    HeaderLf,
    Body,
    /// After the closing boundary.
    Epilogue,
}

/// Streaming parser for `multipart/form-data`.
#[derive(Debug)]
pub struct MultipartParser<S> {
    sink: S,
    /// `CRLF--boundary`
    delimiter: Vec<u8>,
    matched: usize,
    state: State,
    line: Vec<u8>,
    part_name: Option<Vec<u8>>,
    part_index: usize,
    scratch: Vec<u8>,
    limits: Limits,
    status: Status,
    depth: usize,
}

impl<S: StreamSink> MultipartParser<S> {
    /// Creates a parser for parts separated by `boundary`, as given in the
    /// `Content-Type` header (without the leading dashes).
    pub fn new(sink: S, boundary: impl AsRef<[u8]>, limits: &Limits, depth: usize) -> Self {
        let mut delimiter = b"\r\n--".to_vec();
        delimiter.extend_from_slice(boundary.as_ref());
        Self {
            sink,
            delimiter,
            // The body is treated as if it began with a line break so that a
            // leading boundary needs no special case.
            matched: 2,
            state: State::Preamble,
            line: Vec::new(),
            part_name: None,
            part_index: 0,
            scratch: Vec::new(),
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

    fn flush_scratch(&mut self) -> Result<(), ParseError> {
        if !self.scratch.is_empty() {
            self.sink.on_value(&self.scratch)?;
            self.scratch.clear();
        }
        Ok(())
    }

    fn header_line(&mut self) -> Result<(), ParseError> {
        let line = core::mem::take(&mut self.line);
        let (name, value) = line
            .split_once_str(":")
            .ok_or_else(|| Self::syntax("header without ':'"))?;
        if name.trim().eq_ignore_ascii_case(b"content-disposition") {
            self.part_name = disposition_name(value.trim(), &self.limits, self.depth);
        }
        self.line = line;
        self.line.clear();
        Ok(())
    }

    fn begin_body(&mut self) -> Result<(), ParseError> {
        match self.part_name.take().filter(|n| !n.is_empty()) {
            Some(name) => self.sink.on_key(&name)?,
            None => {
                let key = format!("part-{}", self.part_index);
                self.sink.on_key(key.as_bytes())?;
            }
        }
        log::trace!(target: "dissector::multipart", "part {} begins", self.part_index);
        self.matched = 0;
        self.state = State::Body;
        Ok(())
    }

    /// Handles one byte. Returns `false` if the byte must be handled again.
    fn step(&mut self, b: u8) -> Result<bool, ParseError> {
        match self.state {
            State::Preamble => {
                if b == self.delimiter[self.matched] {
                    self.matched += 1;
                    if self.matched == self.delimiter.len() {
                        self.state = State::BoundaryEnd;
                    }
                } else if self.matched > 0 {
                    self.matched = 0;
                    return Ok(false);
                }
            }
            State::Body => {
                if b == self.delimiter[self.matched] {
                    self.matched += 1;
                    if self.matched == self.delimiter.len() {
                        self.flush_scratch()?;
                        self.sink.on_done()?;
                        self.part_index += 1;
                        self.state = State::BoundaryEnd;
                    }
                } else if self.matched > 0 {
                    // The held-back bytes are a prefix of the delimiter.
                    self.scratch
                        .extend_from_slice(&self.delimiter[..self.matched]);
                    self.matched = 0;
                    return Ok(false);
                } else {
                    self.scratch.push(b);
                }
            }
            State::BoundaryEnd => {
                self.state = match b {
                    b'\r' => State::BoundaryLf,
                    b'-' => State::ClosingDash,
                    _ => return Err(Self::syntax("malformed boundary line")),
                };
            }
            State::BoundaryLf => {
                if b != b'\n' {
                    return Err(Self::syntax("expected CRLF after boundary"));
                }
                self.line.clear();
                self.part_name = None;
                self.state = State::Header;
            }
            State::ClosingDash => {
                if b != b'-' {
                    return Err(Self::syntax("malformed closing boundary"));
                }
                log::debug!(target: "dissector::multipart", "closing boundary after {} parts", self.part_index);
                self.state = State::Epilogue;
            }
            State::Header => match b {
                b'\r' => self.state = State::HeaderLf,
                b'\n' => return Err(Self::syntax("bare LF in part headers")),
                _ => {
                    if self.line.len() < self.limits.max_value_size {
                        self.line.push(b);
                    }
                }
            },
            State::HeaderLf => {
                if b != b'\n' {
                    return Err(Self::syntax("bare CR in part headers"));
                }
                if self.line.is_empty() {
                    self.begin_body()?;
                } else {
                    self.header_line()?;
                    self.state = State::Header;
                }
            }
            State::Epilogue => {}
        }
        Ok(true)
    }
}

/// Extracts the `name` parameter of a `Content-Disposition` value.
fn disposition_name(value: &[u8], limits: &Limits, depth: usize) -> Option<Vec<u8>> {
    let mut params = DelimitedParser::new(
        BufferedSink::with_depth(Collector::new(), limits, depth + 1),
        DelimitedOptions::header_value(),
        limits,
        depth + 1,
    );
    if let Err(err) = params.push(value).and_then(|_| params.finish()) {
        log::debug!(target: "dissector::multipart", "unreadable Content-Disposition: {err}");
        return None;
    }

    let mut name: Option<Vec<u8>> = None;
    let mut in_name = false;
    for pair in params.into_sink().into_inner().into_pairs() {
        if pair.flags.contains(PairFlags::FIRST) {
            in_name = name.is_none() && pair.key.eq_ignore_ascii_case(b"name");
            if in_name {
                name = Some(Vec::new());
            }
        }
        if in_name {
            if let Some(name) = name.as_mut() {
                name.extend_from_slice(&pair.value);
            }
        }
    }
    name
}

impl<S: StreamSink> Machine for MultipartParser<S> {
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
        if self.state == State::Epilogue {
            Ok(())
        } else {
            Err(Self::syntax("missing closing boundary"))
        }
    }
}

impl_parser!(MultipartParser<S: StreamSink>);
