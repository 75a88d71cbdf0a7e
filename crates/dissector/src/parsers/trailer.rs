//! End-of-file markers of binary document formats.
//!
//! Uploads that really are PDF, PNG or JPEG files end with a fixed marker,
//! possibly followed by whitespace or NUL padding. When the marker is there
//! the body is reported as `("BinaryFileSkip", "")` so that matching can skip
//! it; when it is not, the parser fails and the body is handled as unknown
//! data.
//!
//! A file sent base64-encoded inside a text field cannot be checked for its
//! trailer without decoding it. [`TrailerParser::base64`] instead accepts
//! the body if it is entirely base64 text up to its `=` padding.

use alloc::vec::Vec;

use bstr::ByteSlice;

use crate::{
    Limits,
    error::ParseError,
    parser::{Machine, Status, impl_parser},
    sink::{StreamSink, emit_pair},
};

const NAME: &str = "trailer";
const SKIP_KEY: &[u8] = b"BinaryFileSkip";

/// Fewest bytes [`detect_file_kind`] needs, counted from the header on.
pub const MIN_HEADER_LOOKUP: usize = 16;
/// How far into the buffer [`detect_file_kind`] looks for a header.
pub const MAX_HEADER_LOOKUP: usize = 64;

/// A binary file format recognized by its header and trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FileKind {
    /// `%PDF-` ... `%%EOF`
    Pdf,
    /// PNG signature ... `IEND` chunk with its CRC.
    Png,
    /// `FF D8 FF` ... `FF D9`
    Jpeg,
}

impl FileKind {
    const ALL: [FileKind; 3] = [FileKind::Pdf, FileKind::Png, FileKind::Jpeg];

    /// Leading bytes of a file of this kind.
    pub fn header(self) -> &'static [u8] {
        match self {
            FileKind::Pdf => b"%PDF-",
            FileKind::Png => b"\x89PNG\r\n\x1a\n",
            FileKind::Jpeg => b"\xff\xd8\xff",
        }
    }

    /// Leading characters of the base64 encoding of a file of this kind.
    pub fn base64_header(self) -> &'static [u8] {
        match self {
            FileKind::Pdf => b"JVBERi",
            FileKind::Png => b"iVBORw0KGg",
            FileKind::Jpeg => b"/9j/",
        }
    }

    /// Trailing bytes of a file of this kind, before any padding.
    pub fn trailer(self) -> &'static [u8] {
        match self {
            FileKind::Pdf => b"%%EOF",
            FileKind::Png => b"IEND\xaeB`\x82",
            FileKind::Jpeg => b"\xff\xd9",
        }
    }
}

/// Recognizes a binary file from its first bytes.
///
/// The header may sit anywhere in the first [`MAX_HEADER_LOOKUP`] bytes, but
/// at least [`MIN_HEADER_LOOKUP`] bytes must follow from its start.
///
/// ```
/// use dissector::parsers::trailer::{FileKind, detect_file_kind};
///
/// assert_eq!(detect_file_kind(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj"), Some(FileKind::Pdf));
/// assert_eq!(detect_file_kind(b"\r\n\r\n%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0"), Some(FileKind::Pdf));
/// assert_eq!(detect_file_kind(b"%PDF-1.7"), None);
/// assert_eq!(detect_file_kind(b"GIF89a............"), None);
/// ```
pub fn detect_file_kind(buf: &[u8]) -> Option<FileKind> {
    find_header(buf, FileKind::header)
}

/// Like [`detect_file_kind`] for a file sent as base64 text.
///
/// ```
/// use dissector::parsers::trailer::{FileKind, detect_base64_file_kind};
///
/// assert_eq!(detect_base64_file_kind(b"JVBERi0xLjQKJSVFT0Y="), Some(FileKind::Pdf));
/// ```
pub fn detect_base64_file_kind(buf: &[u8]) -> Option<FileKind> {
    find_header(buf, FileKind::base64_header)
}

fn find_header(buf: &[u8], header: fn(FileKind) -> &'static [u8]) -> Option<FileKind> {
    if buf.len() < MIN_HEADER_LOOKUP {
        return None;
    }
    let window = &buf[..buf.len().min(MAX_HEADER_LOOKUP)];
    for kind in FileKind::ALL {
        let Some(pos) = window.find(header(kind)) else {
            continue;
        };
        if buf.len() - pos >= MIN_HEADER_LOOKUP {
            return Some(kind);
        }
        log::trace!(target: "dissector::trailer", "{kind:?} header too close to the end");
        return None;
    }
    None
}

/// How the file is carried in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Encoding {
    /// The file bytes as they are.
    #[default]
    Raw,
    /// Base64 text of the file.
    Base64,
}

fn padding(b: u8) -> bool {
    b == 0 || b.is_ascii_whitespace()
}

/// Checks that a body ends with the trailer of its file kind.
#[derive(Debug)]
pub struct TrailerParser<S> {
    sink: S,
    kind: FileKind,
    encoding: Encoding,
    /// Base64 only: the `=` padding has started.
    padded: bool,
    /// The last bytes before the current padding, with padding bytes inside
    /// them replaced by NUL.
    tail: Vec<u8>,
    padding: usize,
    status: Status,
    depth: usize,
}

impl<S: StreamSink> TrailerParser<S> {
    /// Creates a parser expecting the trailer of `kind`.
    pub fn new(sink: S, kind: FileKind, _limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            kind,
            encoding: Encoding::Raw,
            padded: false,
            tail: Vec::with_capacity(2 * kind.trailer().len()),
            padding: 0,
            status: Status::Active,
            depth,
        }
    }

    /// Creates a parser for a base64-encoded file of `kind`.
    pub fn base64(sink: S, kind: FileKind, limits: &Limits, depth: usize) -> Self {
        Self {
            encoding: Encoding::Base64,
            ..Self::new(sink, kind, limits, depth)
        }
    }

    /// How this parser expects the file to be carried.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The downstream sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consumes the parser, returning its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn feed_base64(&mut self, data: &[u8]) -> Result<(), ParseError> {
        for &b in data {
            if self.padded {
                if b != b'=' && !padding(b) {
                    return Err(ParseError::syntax(NAME, "data after base64 padding"));
                }
            } else if b == b'=' {
                log::trace!(target: "dissector::trailer", "base64 padding reached");
                self.padded = true;
            } else if !(b.is_ascii_alphanumeric() || b == b'+' || b == b'/') {
                return Err(ParseError::syntax(NAME, "invalid base64 character"));
            }
        }
        Ok(())
    }
}

impl<S: StreamSink> Machine for TrailerParser<S> {
    const NAME: &'static str = NAME;

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        if self.encoding == Encoding::Base64 {
            return self.feed_base64(data);
        }
        let keep = self.kind.trailer().len();
        for &b in data {
            if padding(b) {
                self.padding = self.padding.saturating_add(1);
                continue;
            }
            let fill = self.padding.min(keep);
            self.tail.extend(core::iter::repeat_n(0, fill));
            self.padding = 0;
            self.tail.push(b);
            if self.tail.len() > 2 * keep {
                self.tail.drain(..self.tail.len() - keep);
            }
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), ParseError> {
        if self.encoding == Encoding::Raw && !self.tail.ends_with(self.kind.trailer()) {
            log::debug!(target: "dissector::trailer", "no {:?} trailer", self.kind);
            return Err(ParseError::syntax(NAME, "missing end-of-file marker"));
        }
        emit_pair(&mut self.sink, SKIP_KEY, b"")?;
        Ok(())
    }
}

impl_parser!(TrailerParser<S: StreamSink>);
