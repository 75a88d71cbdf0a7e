//! Lenient HTML dissection.
//!
//! HTML in the wild is rarely well formed, so this parser never rejects a
//! document for its markup. It shares the XML parser's output shape: element
//! names (lowercased) form the key path, attributes are reported as
//! `(element.attr, value)` and element text is collected in trimmed runs (see
//! the `text` module) and reported when the element closes.
//!
//! The leniency rules:
//!
//! * Attribute values may be unquoted or missing; a missing value is empty.
//! * Void elements such as `<br>` and `<img>` close themselves.
//! * An end tag closes the innermost open element of that name and every
//!   element opened after it. An end tag matching nothing is ignored.
//! * Elements still open at end of input are closed in order.
//! * `<script>` and `<style>` hold raw text up to their end tag.
//! * A `<` that cannot start a tag is text. Text outside every element is
//!   reported under the key `html`.
//!
//! Comments, doctype declarations and processing instructions are skipped.

use alloc::vec::Vec;

use crate::{
    Limits,
    error::{Limit, ParseError},
    key_path::KeyPath,
    parser::{Machine, Status, impl_parser},
    parsers::{
        decode::decode_reference,
        text::{TextRuns, is_space},
    },
    sink::{StreamSink, emit_pair},
};

const NAME: &str = "html";
const ROOT_LABEL: &[u8] = b"html";
const MAX_REFERENCE: usize = 12;

const VOID_ELEMENTS: [&[u8]; 14] = [
    b"area", b"base", b"br", b"col", b"embed", b"hr", b"img", b"input", b"link", b"meta",
    b"param", b"source", b"track", b"wbr",
];
const RAW_TEXT_ELEMENTS: [&[u8]; 2] = [b"script", b"style"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Text,
    Attr(Option<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    TagOpen,
    StartTagName,
    TagSpace,
    AttrName,
    AfterAttrName,
    BeforeAttrValue,
    /// Inside a value; `None` when it is unquoted.
    AttrValue(Option<u8>),
    SelfClosing,
    EndTagName,
    EndTagTail,
    Reference(Context),
    Bang,
    Comment,
    CommentDash,
    CommentDashDash,
    /// Doctype or processing instruction, up to `>`.
    Skip,
    /// Content of a raw text element.
    RawText(&'static [u8]),
}

#[derive(Debug)]
struct Open {
    name: Vec<u8>,
    text: TextRuns,
}

/// Streaming HTML parser.
#[derive(Debug)]
pub struct HtmlParser<S> {
    sink: S,
    path: KeyPath,
    elements: Vec<Open>,
    /// Text outside every element.
    stray: TextRuns,
    state: State,
    name: Vec<u8>,
    attr: Vec<u8>,
    reference: Vec<u8>,
    /// Attribute value bytes not yet handed on.
    scratch: Vec<u8>,
    /// Bytes of a possible raw text end tag, as they appeared.
    raw_match: Vec<u8>,
    seen_content: bool,
    max_depth: usize,
    max_key_size: usize,
    max_value_size: usize,
    status: Status,
    depth: usize,
}

fn decode_html_reference(body: &[u8], out: &mut Vec<u8>) -> Option<()> {
    if body == b"nbsp" {
        out.extend_from_slice("\u{a0}".as_bytes());
        return Some(());
    }
    decode_reference(body, out)
}

impl<S: StreamSink> HtmlParser<S> {
    /// Creates a parser writing to `sink`.
    pub fn new(sink: S, limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            path: KeyPath::new(limits.max_depth.saturating_add(1)),
            elements: Vec::new(),
            stray: TextRuns::default(),
            state: State::Text,
            name: Vec::new(),
            attr: Vec::new(),
            reference: Vec::new(),
            scratch: Vec::new(),
            raw_match: Vec::new(),
            seen_content: false,
            max_depth: limits.max_depth,
            max_key_size: limits.max_key_size,
            max_value_size: limits.max_value_size.max(1),
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

    fn push_name_byte(buf: &mut Vec<u8>, b: u8, cap: usize) {
        if buf.len() < cap {
            buf.push(b.to_ascii_lowercase());
        }
    }

    fn append_text(&mut self, b: u8) -> Result<(), ParseError> {
        if !is_space(b) {
            self.seen_content = true;
        }
        match self.elements.last_mut() {
            Some(open) => {
                open.text
                    .append(&mut self.sink, self.path.as_bytes(), b, self.max_value_size)?;
            }
            None => self.stray.append(&mut self.sink, ROOT_LABEL, b, self.max_value_size)?,
        }
        Ok(())
    }

    fn open_element(&mut self) -> Result<(), ParseError> {
        if self.elements.len() >= self.max_depth {
            return Err(ParseError::ResourceLimitExceeded(Limit::Depth));
        }
        match self.elements.last_mut() {
            Some(parent) => parent.text.child_opened(),
            None => self.stray.child_opened(),
        }
        self.path.push(&self.name)?;
        self.elements.push(Open {
            name: self.name.clone(),
            text: TextRuns::default(),
        });
        self.seen_content = true;
        Ok(())
    }

    fn close_element(&mut self) -> Result<(), ParseError> {
        if let Some(open) = self.elements.pop() {
            open.text.close(&mut self.sink, self.path.as_bytes())?;
            self.path.pop();
        }
        Ok(())
    }

    /// `>` of a start tag.
    fn finish_start_tag(&mut self) -> Result<(), ParseError> {
        self.state = State::Text;
        if VOID_ELEMENTS.iter().any(|void| *void == self.name) {
            return self.close_element();
        }
        if let Some(&raw) = RAW_TEXT_ELEMENTS.iter().find(|raw| **raw == self.name) {
            self.raw_match.clear();
            self.state = State::RawText(raw);
        }
        Ok(())
    }

    fn end_tag(&mut self) -> Result<(), ParseError> {
        self.state = State::Text;
        let Some(pos) = self.elements.iter().rposition(|open| open.name == self.name) else {
            log::trace!(target: "dissector::html", "end tag without open element ignored");
            return Ok(());
        };
        while self.elements.len() > pos {
            self.close_element()?;
        }
        Ok(())
    }

    fn begin_attr_value(&mut self, quote: Option<u8>) -> Result<(), ParseError> {
        self.path.push(&self.attr)?;
        let result = self.sink.on_key(self.path.as_bytes());
        self.path.pop();
        result?;
        self.state = State::AttrValue(quote);
        Ok(())
    }

    fn end_attr_value(&mut self) -> Result<(), ParseError> {
        if !self.scratch.is_empty() {
            self.sink.on_value(&self.scratch)?;
            self.scratch.clear();
        }
        self.sink.on_done()?;
        self.state = State::TagSpace;
        Ok(())
    }

    /// An attribute given without `=`.
    fn empty_attr(&mut self) -> Result<(), ParseError> {
        self.path.push(&self.attr)?;
        let result = emit_pair(&mut self.sink, self.path.as_bytes(), b"");
        self.path.pop();
        result?;
        Ok(())
    }

    fn emit_decoded(&mut self, context: Context, bytes: &[u8]) -> Result<(), ParseError> {
        match context {
            Context::Attr(_) => self.scratch.extend_from_slice(bytes),
            Context::Text => {
                for &b in bytes {
                    self.append_text(b)?;
                }
            }
        }
        Ok(())
    }

    /// Raw text up to `</name`, compared without regard to case.
    fn step_raw_text(&mut self, raw: &'static [u8], b: u8) -> Result<bool, ParseError> {
        let expected = match self.raw_match.len() {
            0 => b'<',
            1 => b'/',
            n => raw[n - 2],
        };
        if b.to_ascii_lowercase() == expected {
            self.raw_match.push(b);
            if self.raw_match.len() == raw.len() + 2 {
                self.raw_match.clear();
                self.name.clear();
                self.name.extend_from_slice(raw);
                self.state = State::EndTagName;
            }
            return Ok(true);
        }
        if self.raw_match.is_empty() {
            self.append_text(b)?;
            return Ok(true);
        }
        let held = core::mem::take(&mut self.raw_match);
        for &h in &held {
            self.append_text(h)?;
        }
        Ok(false)
    }

    /// Handles one byte. Returns `false` if the byte must be handled again.
    #[allow(clippy::too_many_lines)]
    fn step(&mut self, b: u8) -> Result<bool, ParseError> {
        match self.state {
            State::Text => match b {
                b'<' => self.state = State::TagOpen,
                b'&' => {
                    self.reference.clear();
                    self.state = State::Reference(Context::Text);
                }
                _ => self.append_text(b)?,
            },
            State::TagOpen => match b {
                b'/' => {
                    self.name.clear();
                    self.state = State::EndTagName;
                }
                b'!' => {
                    self.name.clear();
                    self.state = State::Bang;
                }
                b'?' => self.state = State::Skip,
                _ if b.is_ascii_alphabetic() => {
                    self.name.clear();
                    Self::push_name_byte(&mut self.name, b, self.max_key_size);
                    self.state = State::StartTagName;
                }
                _ => {
                    self.state = State::Text;
                    self.append_text(b'<')?;
                    return Ok(false);
                }
            },
            State::StartTagName => match b {
                b'>' => {
                    self.open_element()?;
                    self.finish_start_tag()?;
                }
                b'/' => {
                    self.open_element()?;
                    self.state = State::SelfClosing;
                }
                _ if is_space(b) => {
                    self.open_element()?;
                    self.state = State::TagSpace;
                }
                _ => Self::push_name_byte(&mut self.name, b, self.max_key_size),
            },
            State::TagSpace => match b {
                b'>' => self.finish_start_tag()?,
                b'/' => self.state = State::SelfClosing,
                _ if is_space(b) => {}
                _ => {
                    self.attr.clear();
                    Self::push_name_byte(&mut self.attr, b, self.max_key_size);
                    self.state = State::AttrName;
                }
            },
            State::AttrName => match b {
                b'=' => self.state = State::BeforeAttrValue,
                b'>' => {
                    self.empty_attr()?;
                    self.finish_start_tag()?;
                }
                b'/' => {
                    self.empty_attr()?;
                    self.state = State::SelfClosing;
                }
                _ if is_space(b) => self.state = State::AfterAttrName,
                _ => Self::push_name_byte(&mut self.attr, b, self.max_key_size),
            },
            State::AfterAttrName => match b {
                b'=' => self.state = State::BeforeAttrValue,
                _ if is_space(b) => {}
                _ => {
                    self.empty_attr()?;
                    self.state = State::TagSpace;
                    return Ok(false);
                }
            },
            State::BeforeAttrValue => match b {
                b'"' | b'\'' => self.begin_attr_value(Some(b))?,
                b'>' => {
                    self.empty_attr()?;
                    self.finish_start_tag()?;
                }
                _ if is_space(b) => {}
                _ => {
                    self.begin_attr_value(None)?;
                    return Ok(false);
                }
            },
            State::AttrValue(quote) => match (b, quote) {
                (b'&', _) => {
                    self.reference.clear();
                    self.state = State::Reference(Context::Attr(quote));
                }
                (_, Some(q)) if b == q => self.end_attr_value()?,
                (b'>', None) => {
                    self.end_attr_value()?;
                    self.finish_start_tag()?;
                }
                (_, None) if is_space(b) => self.end_attr_value()?,
                _ => self.scratch.push(b),
            },
            State::SelfClosing => {
                if b == b'>' {
                    self.state = State::Text;
                    self.close_element()?;
                } else {
                    self.state = State::TagSpace;
                    return Ok(false);
                }
            }
            State::EndTagName => match b {
                b'>' => self.end_tag()?,
                _ if is_space(b) => self.state = State::EndTagTail,
                _ => Self::push_name_byte(&mut self.name, b, self.max_key_size),
            },
            State::EndTagTail => {
                if b == b'>' {
                    self.end_tag()?;
                }
            }
            State::Reference(context) => {
                let resume = match context {
                    Context::Text => State::Text,
                    Context::Attr(quote) => State::AttrValue(quote),
                };
                if b == b';' {
                    let mut decoded = Vec::new();
                    if decode_html_reference(&self.reference, &mut decoded).is_none() {
                        decoded.push(b'&');
                        decoded.extend_from_slice(&self.reference);
                        decoded.push(b';');
                    }
                    self.state = resume;
                    self.emit_decoded(context, &decoded)?;
                } else if (b.is_ascii_alphanumeric() || b == b'#')
                    && self.reference.len() < MAX_REFERENCE
                {
                    self.reference.push(b);
                } else {
                    let mut literal = Vec::with_capacity(self.reference.len() + 1);
                    literal.push(b'&');
                    literal.extend_from_slice(&self.reference);
                    self.state = resume;
                    self.emit_decoded(context, &literal)?;
                    return Ok(false);
                }
            }
            State::Bang => {
                self.name.push(b);
                if self.name == b"--" {
                    self.state = State::Comment;
                } else if b == b'>' {
                    self.state = State::Text;
                } else if !b"--".starts_with(&self.name) {
                    self.state = State::Skip;
                }
            }
            State::Comment => {
                if b == b'-' {
                    self.state = State::CommentDash;
                }
            }
            State::CommentDash => {
                self.state = if b == b'-' {
                    State::CommentDashDash
                } else {
                    State::Comment
                };
            }
            State::CommentDashDash => {
                self.state = match b {
                    b'>' => State::Text,
                    b'-' => State::CommentDashDash,
                    _ => State::Comment,
                };
            }
            State::Skip => {
                if b == b'>' {
                    self.state = State::Text;
                }
            }
            State::RawText(raw) => return self.step_raw_text(raw, b),
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

    /// Text-like input cut off by the end of the document.
    fn flush_unfinished(&mut self) -> Result<(), ParseError> {
        match self.state {
            State::TagOpen => self.append_text(b'<')?,
            State::Reference(Context::Text) => {
                let mut literal = Vec::with_capacity(self.reference.len() + 1);
                literal.push(b'&');
                literal.extend_from_slice(&self.reference);
                self.emit_decoded(Context::Text, &literal)?;
            }
            State::RawText(_) => {
                let held = core::mem::take(&mut self.raw_match);
                for &h in &held {
                    self.append_text(h)?;
                }
            }
            _ => {}
        }
        self.state = State::Text;
        Ok(())
    }
}

impl<S: StreamSink> Machine for HtmlParser<S> {
    const NAME: &'static str = NAME;

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        self.scan(data)?;
        if !self.scratch.is_empty() {
            self.sink.on_value(&self.scratch)?;
            self.scratch.clear();
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), ParseError> {
        self.flush_unfinished()?;
        if !self.seen_content {
            return Err(ParseError::syntax(NAME, "empty document"));
        }
        while !self.elements.is_empty() {
            self.close_element()?;
        }
        let stray = core::mem::take(&mut self.stray);
        if !stray.is_blank() {
            stray.close(&mut self.sink, ROOT_LABEL)?;
        }
        Ok(())
    }
}

impl_parser!(HtmlParser<S: StreamSink>);
