//! A whole value that is one percent-encoded string.
//!
//! Unlike the delimited parser there is no `&` or `=` structure: every
//! escape is decoded and everything else, `+` included, passes through. The
//! result is reported as a single value keyed `percent`, streamed as it is
//! decoded. Invalid escapes stay literal (`%zz`, a trailing `%`); control
//! bytes below `0x20` cannot appear in an encoded string and fail the parser.

use alloc::vec::Vec;

use crate::{
    Limits,
    error::ParseError,
    parser::{Machine, Status, impl_parser},
    parsers::decode::PercentDecoder,
    sink::StreamSink,
};

const NAME: &str = "percent";
const KEY: &[u8] = b"percent";

/// Streaming decoder of a percent-encoded value.
#[derive(Debug)]
pub struct PercentParser<S> {
    sink: S,
    escape: PercentDecoder,
    /// Decoded bytes of the current chunk.
    scratch: Vec<u8>,
    started: bool,
    status: Status,
    depth: usize,
}

impl<S: StreamSink> PercentParser<S> {
    /// Creates a parser writing to `sink`.
    pub fn new(sink: S, _limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            escape: PercentDecoder::default(),
            scratch: Vec::new(),
            started: false,
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

    fn flush(&mut self) -> Result<(), ParseError> {
        if !self.scratch.is_empty() {
            self.sink.on_value(&self.scratch)?;
            self.scratch.clear();
        }
        Ok(())
    }
}

impl<S: StreamSink> Machine for PercentParser<S> {
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
            if b < 0x20 {
                return Err(ParseError::syntax(NAME, "control character"));
            }
            if self.escape.is_active() && self.escape.step(b, &mut self.scratch) {
                continue;
            }
            if b == b'%' {
                self.escape.begin();
            } else {
                self.scratch.push(b);
            }
        }
        self.flush()
    }

    fn end(&mut self) -> Result<(), ParseError> {
        if !self.started {
            return Ok(());
        }
        self.escape.flush(&mut self.scratch);
        self.flush()?;
        self.sink.on_done()?;
        Ok(())
    }
}

impl_parser!(PercentParser<S: StreamSink>);
