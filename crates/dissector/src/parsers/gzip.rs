//! gzip members (RFC 1952) decompressed on the fly.
//!
//! The decompressed bytes of all members are reported as the value of one
//! pair keyed `gzip`, fragment by fragment as they come out of the inflater.
//! Header fields, the header CRC when present, and each member's CRC-32 and
//! size trailer are checked. Output beyond
//! [`Limits::max_decompressed_size`](crate::Limits::max_decompressed_size)
//! fails the parser.

use alloc::{vec, vec::Vec};

use flate2::{Crc, Decompress, FlushDecompress, Status as InflateStatus};

use crate::{
    Limits,
    error::{Limit, ParseError},
    parser::{Machine, Status, impl_parser},
    sink::StreamSink,
};

const NAME: &str = "gzip";
const KEY: &[u8] = b"gzip";
const OUTPUT_CHUNK: usize = 16 * 1024;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;
const RESERVED: u8 = 0xE0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// The fixed ten-byte member header.
    Header,
    ExtraLen,
    Extra,
    FileName,
    Comment,
    HeaderCrc,
    Body,
    Trailer,
    /// A member is complete; more may follow.
    BetweenMembers,
}

/// Streaming gzip decompressor reporting its output as one value.
#[derive(Debug)]
pub struct GzipParser<S> {
    sink: S,
    state: State,
    /// Header, extra length, header CRC or trailer bytes gathered so far.
    fixed: [u8; 10],
    filled: usize,
    flags: u8,
    extra_left: usize,
    header_crc: Crc,
    inflater: Decompress,
    crc: Crc,
    output: Vec<u8>,
    produced: u64,
    max_output: u64,
    started: bool,
    members: usize,
    status: Status,
    depth: usize,
}

impl<S: StreamSink> GzipParser<S> {
    /// Creates a parser writing to `sink`.
    pub fn new(sink: S, limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            state: State::Header,
            fixed: [0; 10],
            filled: 0,
            flags: 0,
            extra_left: 0,
            header_crc: Crc::new(),
            inflater: Decompress::new(false),
            crc: Crc::new(),
            output: vec![0; OUTPUT_CHUNK],
            produced: 0,
            max_output: limits.max_decompressed_size as u64,
            started: false,
            members: 0,
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

    /// Collects a fixed-size field; true once `len` bytes are in.
    fn gather(&mut self, b: u8, len: usize) -> bool {
        self.fixed[self.filled] = b;
        self.filled += 1;
        if self.filled == len {
            self.filled = 0;
            true
        } else {
            false
        }
    }

    /// Moves to the first optional header field that is present.
    fn next_header_field(&mut self, after: State) {
        let order = [
            (State::ExtraLen, FEXTRA),
            (State::FileName, FNAME),
            (State::Comment, FCOMMENT),
            (State::HeaderCrc, FHCRC),
        ];
        let start = order
            .iter()
            .position(|(s, _)| *s == after)
            .map_or(0, |i| i + 1);
        self.state = order[start..]
            .iter()
            .find(|(_, flag)| self.flags & flag != 0)
            .map_or(State::Body, |(s, _)| *s);
        if self.state == State::Body {
            self.inflater.reset(false);
            self.crc.reset();
            log::trace!(target: "dissector::gzip", "member {} body", self.members);
        }
    }

    fn header_byte(&mut self, b: u8) -> Result<(), ParseError> {
        if self.state != State::HeaderCrc {
            self.header_crc.update(&[b]);
        }
        match self.state {
            State::Header => {
                if self.gather(b, 10) {
                    let header = self.fixed;
                    if header[0] != 0x1f || header[1] != 0x8b {
                        return Err(Self::syntax("bad magic"));
                    }
                    if header[2] != 8 {
                        return Err(Self::syntax("unsupported compression method"));
                    }
                    if header[3] & RESERVED != 0 {
                        return Err(Self::syntax("reserved flag set"));
                    }
                    self.flags = header[3];
                    if !self.started {
                        self.sink.on_key(KEY)?;
                        self.started = true;
                    }
                    self.next_header_field(State::Header);
                }
            }
            State::ExtraLen => {
                if self.gather(b, 2) {
                    self.extra_left = usize::from(u16::from_le_bytes([self.fixed[0], self.fixed[1]]));
                    if self.extra_left == 0 {
                        self.next_header_field(State::ExtraLen);
                    } else {
                        self.state = State::Extra;
                    }
                }
            }
            State::Extra => {
                self.extra_left -= 1;
                if self.extra_left == 0 {
                    self.next_header_field(State::ExtraLen);
                }
            }
            State::FileName | State::Comment => {
                if b == 0 {
                    self.next_header_field(self.state);
                }
            }
            State::HeaderCrc => {
                if self.gather(b, 2) {
                    let expected = u16::from_le_bytes([self.fixed[0], self.fixed[1]]);
                    // Low 16 bits of the CRC-32 over the header.
                    if expected != (self.header_crc.sum() & 0xffff) as u16 {
                        return Err(Self::syntax("header crc mismatch"));
                    }
                    self.next_header_field(State::HeaderCrc);
                }
            }
            State::Trailer => {
                if self.gather(b, 8) {
                    let t = self.fixed;
                    let crc = u32::from_le_bytes([t[0], t[1], t[2], t[3]]);
                    let size = u32::from_le_bytes([t[4], t[5], t[6], t[7]]);
                    if crc != self.crc.sum() {
                        return Err(Self::syntax("crc mismatch"));
                    }
                    if size != self.crc.amount() {
                        return Err(ParseError::LengthMismatch {
                            expected: size as usize,
                            actual: self.crc.amount() as usize,
                        });
                    }
                    self.members += 1;
                    self.state = State::BetweenMembers;
                }
            }
            State::BetweenMembers => {
                self.header_crc.reset();
                self.header_crc.update(&[b]);
                self.state = State::Header;
                self.gather(b, 10);
            }
            State::Body => return Err(ParseError::Internal("gzip: body byte in header path")),
        }
        Ok(())
    }

    /// Runs the inflater over `input`, returning how much of it was used.
    fn inflate(&mut self, input: &[u8]) -> Result<usize, ParseError> {
        let mut used = 0;
        loop {
            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();
            let status = self
                .inflater
                .decompress(&input[used..], &mut self.output, FlushDecompress::None)
                .map_err(|_| Self::syntax("corrupt deflate stream"))?;
            let consumed = (self.inflater.total_in() - before_in) as usize;
            let produced = (self.inflater.total_out() - before_out) as usize;
            used += consumed;

            if produced > 0 {
                self.produced += produced as u64;
                if self.produced > self.max_output {
                    log::debug!(target: "dissector::gzip", "output exceeds {} bytes", self.max_output);
                    return Err(ParseError::ResourceLimitExceeded(Limit::DecompressedSize));
                }
                let out = &self.output[..produced];
                self.crc.update(out);
                self.sink.on_value(out)?;
            }

            if status == InflateStatus::StreamEnd {
                self.state = State::Trailer;
                return Ok(used);
            }
            if consumed == 0 && produced == 0 {
                return Ok(used);
            }
        }
    }
}

impl<S: StreamSink> Machine for GzipParser<S> {
    const NAME: &'static str = NAME;

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut i = 0;
        while i < data.len() {
            if self.state == State::Body {
                let used = self.inflate(&data[i..])?;
                if used == 0 && self.state == State::Body {
                    return Err(ParseError::Internal("gzip: inflater made no progress"));
                }
                i += used;
            } else {
                self.header_byte(data[i])?;
                i += 1;
            }
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), ParseError> {
        if self.state != State::BetweenMembers || self.filled != 0 {
            return Err(Self::syntax("truncated stream"));
        }
        log::trace!(target: "dissector::gzip", "{} members, {} bytes", self.members, self.produced);
        self.sink.on_done()?;
        Ok(())
    }
}

impl_parser!(GzipParser<S: StreamSink>);
