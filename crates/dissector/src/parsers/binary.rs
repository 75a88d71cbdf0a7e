//! Printable text pulled out of binary payloads.
//!
//! Runs of printable ASCII (`0x20..=0x7E`) at least
//! [`Limits::min_text_run`](crate::Limits::min_text_run) long are reported
//! as fragments of a single value keyed `text`. A run that is still too short
//! when a chunk ends is kept until the next byte decides it.
//!
//! Any non-empty input reports the `text` pair, with an empty value if no run
//! qualified, so the consumer always learns the payload was scanned.

use alloc::vec::Vec;

use crate::{
    Limits,
    error::ParseError,
    parser::{Machine, Status, impl_parser},
    sink::StreamSink,
};

const KEY: &[u8] = b"text";

fn printable(b: u8) -> bool {
    (0x20..=0x7e).contains(&b)
}

/// Streaming extractor of printable runs.
#[derive(Debug)]
pub struct BinaryParser<S> {
    sink: S,
    min_run: usize,
    /// Printable bytes not yet known to form a long enough run.
    pending: Vec<u8>,
    /// The current run already qualified; its bytes go straight out.
    in_text: bool,
    started: bool,
    status: Status,
    depth: usize,
}

impl<S: StreamSink> BinaryParser<S> {
    /// Creates a parser writing to `sink`.
    pub fn new(sink: S, limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            min_run: limits.min_text_run.max(1),
            pending: Vec::new(),
            in_text: false,
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

    fn emit(&mut self, text: &[u8]) -> Result<(), ParseError> {
        self.sink.on_value(text)?;
        Ok(())
    }

    /// Handles a run of printable bytes that does not end the chunk's run.
    fn printable_run(&mut self, run: &[u8]) -> Result<(), ParseError> {
        if self.in_text {
            return self.emit(run);
        }
        if self.pending.len() + run.len() < self.min_run {
            self.pending.extend_from_slice(run);
            return Ok(());
        }
        let pending = core::mem::take(&mut self.pending);
        if !pending.is_empty() {
            self.emit(&pending)?;
        }
        self.pending = pending;
        self.pending.clear();
        self.in_text = true;
        self.emit(run)
    }
}

impl<S: StreamSink> Machine for BinaryParser<S> {
    const NAME: &'static str = "binary";

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, mut data: &[u8]) -> Result<(), ParseError> {
        if !self.started {
            self.sink.on_key(KEY)?;
            self.started = true;
        }
        while !data.is_empty() {
            let text_len = data.iter().position(|&b| !printable(b)).unwrap_or(data.len());
            if text_len > 0 {
                self.printable_run(&data[..text_len])?;
                data = &data[text_len..];
            }
            let binary_len = data.iter().position(|&b| printable(b)).unwrap_or(data.len());
            if binary_len > 0 {
                self.pending.clear();
                self.in_text = false;
                data = &data[binary_len..];
            }
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), ParseError> {
        if self.started {
            self.sink.on_done()?;
        }
        Ok(())
    }
}

impl_parser!(BinaryParser<S: StreamSink>);
