//! Delimited key/value lists: `a=1&b=2`, `name="x"; filename=y`.
//!
//! One state machine covers three flavours, chosen through
//! [`DelimitedOptions`]:
//!
//! * **labeled** lists report every segment under one fixed label; the value
//!   is the decoded text after `=` (or the whole segment when it has none);
//! * **URL-encoded** lists report each decoded key with its decoded value;
//! * **header values** are `;`-separated parameters whose values may be
//!   double-quoted.
//!
//! ```text
//! Start → KeyStart → Key ⇄ KeyEscape → ValueStart → Value ⇄ ValueEscape
//!            ↑                                         │
//!            └──────────────── delimiter ──────────────┘
//! ```
//!
//! `%XX` escapes and `+` (as a space) are decoded in both keys and values.
//! An escape cut by a chunk boundary stays pending in the decoder and is
//! never emitted half-done.

use alloc::vec::Vec;

use crate::{
    Limits,
    error::ParseError,
    parser::{Machine, Parser, Status, drive},
    parsers::decode::PercentDecoder,
    sink::StreamSink,
};

/// Where the reported key of each pair comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Every pair is reported under [`DelimitedOptions::label`].
    Label,
    /// Every pair is reported under its own decoded key. Segments with an
    /// empty key fall back to the label.
    Decoded,
}

/// Flavour of a [`DelimitedParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedOptions {
    /// Name reported by [`Parser::name`] and in errors.
    pub name: &'static str,
    /// Byte separating pairs.
    pub delimiter: u8,
    /// Key reported for pairs without a key of their own.
    pub label: Vec<u8>,
    /// Source of the reported keys.
    pub key_mode: KeyMode,
    /// Whether a value opening with `"` runs to the closing `"`, delimiters
    /// included.
    pub quoted_values: bool,
    /// Whether bytes below 0x20 are a syntax error.
    pub reject_control_bytes: bool,
    /// Whether input without a single delimiter is a syntax error.
    pub require_delimiter: bool,
}

impl DelimitedOptions {
    /// A list whose pairs are all reported under `label`.
    pub fn labeled(label: impl Into<Vec<u8>>, delimiter: u8) -> Self {
        Self {
            name: "delimited",
            delimiter,
            label: label.into(),
            key_mode: KeyMode::Label,
            quoted_values: false,
            reject_control_bytes: false,
            require_delimiter: true,
        }
    }

    /// `application/x-www-form-urlencoded` and query strings.
    #[must_use]
    pub fn url_encoded() -> Self {
        Self {
            name: "urlencoded",
            delimiter: b'&',
            label: b"urlencoded".to_vec(),
            key_mode: KeyMode::Decoded,
            quoted_values: false,
            reject_control_bytes: true,
            require_delimiter: false,
        }
    }

    /// `;`-separated header parameters such as a `Content-Disposition` tail.
    #[must_use]
    pub fn header_value() -> Self {
        Self {
            name: "hdrvalue",
            delimiter: b';',
            label: b"hdrvalue".to_vec(),
            key_mode: KeyMode::Decoded,
            quoted_values: true,
            reject_control_bytes: false,
            require_delimiter: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    KeyStart,
    Key,
    KeyEscape,
    ValueStart,
    Value,
    ValueEscape,
    /// After a closing quote, up to the next delimiter.
    AfterQuote,
    End,
}

/// Streaming parser for delimited key/value lists.
#[derive(Debug)]
pub struct DelimitedParser<S> {
    sink: S,
    options: DelimitedOptions,
    state: State,
    escape: PercentDecoder,
    in_quotes: bool,
    /// Decoded bytes not yet handed to the sink.
    scratch: Vec<u8>,
    /// Labeled mode only: key text, reported as the value if no `=` follows.
    held_key: Vec<u8>,
    /// Decoded key bytes seen in the current segment.
    key_len: usize,
    /// Cap for `held_key`, which is reported as a value.
    max_value_size: usize,
    seen_delimiter: bool,
    status: Status,
    depth: usize,
}

impl<S: StreamSink> DelimitedParser<S> {
    /// Creates a parser writing to `sink`.
    pub fn new(sink: S, options: DelimitedOptions, limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            options,
            state: State::Start,
            escape: PercentDecoder::default(),
            in_quotes: false,
            scratch: Vec::new(),
            held_key: Vec::new(),
            key_len: 0,
            max_value_size: limits.max_value_size,
            seen_delimiter: false,
            status: Status::Active,
            depth,
        }
    }

    /// The downstream sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The downstream sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consumes the parser, returning its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn in_key(&self) -> bool {
        matches!(
            self.state,
            State::Start | State::KeyStart | State::Key | State::KeyEscape
        )
    }

    fn flush_scratch(&mut self) -> Result<(), ParseError> {
        if self.scratch.is_empty() {
            return Ok(());
        }
        if self.in_key() {
            self.key_len += self.scratch.len();
            match self.options.key_mode {
                KeyMode::Label => {
                    let room = self.max_value_size.saturating_sub(self.held_key.len());
                    let take = room.min(self.scratch.len());
                    self.held_key.extend_from_slice(&self.scratch[..take]);
                }
                KeyMode::Decoded => self.sink.on_key(&self.scratch)?,
            }
        } else {
            self.sink.on_value(&self.scratch)?;
        }
        self.scratch.clear();
        Ok(())
    }

    /// The key of the current segment is complete and a value follows.
    fn begin_value(&mut self) -> Result<(), ParseError> {
        self.flush_scratch()?;
        match self.options.key_mode {
            KeyMode::Label => {
                self.held_key.clear();
                self.sink.on_key(&self.options.label)?;
            }
            KeyMode::Decoded if self.key_len == 0 => self.sink.on_key(&self.options.label)?,
            KeyMode::Decoded => {}
        }
        self.state = State::ValueStart;
        Ok(())
    }

    fn complete_pair(&mut self) -> Result<(), ParseError> {
        self.flush_scratch()?;
        self.sink.on_done()?;
        self.key_len = 0;
        self.in_quotes = false;
        Ok(())
    }

    /// The segment ended without `=`.
    fn end_segment(&mut self) -> Result<(), ParseError> {
        self.flush_scratch()?;
        if self.key_len == 0 {
            return Ok(());
        }
        match self.options.key_mode {
            KeyMode::Label => {
                self.sink.on_key(&self.options.label)?;
                self.sink.on_value(&self.held_key)?;
                self.held_key.clear();
            }
            KeyMode::Decoded => {}
        }
        self.sink.on_done()?;
        self.key_len = 0;
        Ok(())
    }

    /// Handles one byte. Returns `false` if the byte must be handled again in
    /// the new state.
    fn step(&mut self, b: u8) -> Result<bool, ParseError> {
        let delimiter = self.options.delimiter;
        match self.state {
            State::Start | State::KeyStart => {
                if b.is_ascii_whitespace() {
                    return Ok(true);
                }
                self.state = State::Key;
                Ok(false)
            }
            State::Key => {
                if b == delimiter {
                    self.end_segment()?;
                    self.seen_delimiter = true;
                    self.state = State::KeyStart;
                } else if b == b'=' {
                    self.begin_value()?;
                } else if b == b'%' {
                    self.escape.begin();
                    self.state = State::KeyEscape;
                } else if b == b'+' {
                    self.scratch.push(b' ');
                } else {
                    self.scratch.push(b);
                }
                Ok(true)
            }
            State::KeyEscape => {
                let consumed = self.escape.step(b, &mut self.scratch);
                if !self.escape.is_active() {
                    self.state = State::Key;
                }
                Ok(consumed)
            }
            State::ValueStart => {
                self.state = State::Value;
                if self.options.quoted_values && b == b'"' {
                    self.in_quotes = true;
                    return Ok(true);
                }
                Ok(false)
            }
            State::Value => {
                if self.in_quotes && b == b'"' {
                    self.complete_pair()?;
                    self.state = State::AfterQuote;
                } else if !self.in_quotes && b == delimiter {
                    self.complete_pair()?;
                    self.seen_delimiter = true;
                    self.state = State::KeyStart;
                } else if b == b'%' {
                    self.escape.begin();
                    self.state = State::ValueEscape;
                } else if b == b'+' {
                    self.scratch.push(b' ');
                } else {
                    self.scratch.push(b);
                }
                Ok(true)
            }
            State::ValueEscape => {
                let consumed = self.escape.step(b, &mut self.scratch);
                if !self.escape.is_active() {
                    self.state = State::Value;
                }
                Ok(consumed)
            }
            State::AfterQuote => {
                if b == delimiter {
                    self.seen_delimiter = true;
                    self.state = State::KeyStart;
                }
                Ok(true)
            }
            State::End => Ok(true),
        }
    }
}

impl<S: StreamSink> Machine for DelimitedParser<S> {
    const NAME: &'static str = "delimited";

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut i = 0;
        while i < data.len() {
            let b = data[i];
            if self.options.reject_control_bytes && b < 0x20 {
                return Err(ParseError::syntax(self.options.name, "control character"));
            }
            if self.step(b)? {
                i += 1;
            }
        }
        self.flush_scratch()
    }

    fn end(&mut self) -> Result<(), ParseError> {
        if self.options.require_delimiter && !self.seen_delimiter {
            return Err(ParseError::syntax(self.options.name, "no delimiter in input"));
        }
        self.escape.flush(&mut self.scratch);
        match self.state {
            State::Start | State::KeyStart | State::Key | State::KeyEscape => self.end_segment()?,
            State::ValueStart | State::Value | State::ValueEscape => self.complete_pair()?,
            State::AfterQuote | State::End => {}
        }
        self.state = State::End;
        Ok(())
    }
}

impl<S: StreamSink> Parser for DelimitedParser<S> {
    fn push(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        drive(self, data)
    }

    fn name(&self) -> &str {
        self.options.name
    }

    fn error(&self) -> bool {
        self.status.is_failed()
    }

    fn depth(&self) -> usize {
        self.depth
    }
}
