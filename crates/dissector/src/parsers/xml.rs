//! Incremental XML dissection.
//!
//! A byte-level tokenizer covering elements, attributes, character data,
//! entity and character references, CDATA sections, comments, processing
//! instructions and DTD declarations. Every construct keeps its partial state
//! between chunks.
//!
//! Elements push their name onto the key path. Attributes are reported as
//! `(element.attr, value)` as soon as their value closes. Character data is
//! collected per element in runs separated by child elements. Each run is
//! trimmed at both ends and the runs are concatenated, so `<a>sta<b/>rt</a>`
//! reports `a=start`. On close the element reports `(path, text)` if there is
//! text or if it has no child elements at all. Elements with children and no
//! text report nothing themselves.
//!
//! An `<!ENTITY` declaration anywhere in the prolog reports [`ENTITY_MARKER`]
//! so that external-entity attempts reach matching even though entities are
//! never expanded. A `<script>` element (any case) fails the parser.

use alloc::vec::Vec;

use crate::{
    Limits,
    error::{Limit, ParseError},
    key_path::KeyPath,
    parser::{Machine, Status, impl_parser},
    parsers::{
        decode::decode_reference,
        prefix::BomSniffer,
        text::{TextRuns, is_space},
    },
    sink::{StreamSink, emit_pair},
};

const NAME: &str = "xml";
const ROOT_LABEL: &[u8] = b"xml";

/// Value reported for every `<!ENTITY` declaration.
pub const ENTITY_MARKER: &[u8] = b"08a80340-06d3-11ea-9f87-0242ac11000f";

const ENTITY_DECL: &[u8] = b"<!ENTITY";
const MAX_REFERENCE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Text,
    Attr(u8),
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
    AttrValue(u8),
    EmptyTagClose,
    EndTagName,
    EndTagTail,
    Reference(Context),
    Bang,
    Comment,
    CommentDash,
    CommentDashDash,
    Cdata,
    CdataBracket,
    CdataBracketBracket,
    Declaration,
    Pi,
    PiQuestion,
}

/// Streaming XML parser.
#[derive(Debug)]
pub struct XmlParser<S> {
    sink: S,
    path: KeyPath,
    elements: Vec<TextRuns>,
    state: State,
    bom: BomSniffer,
    name: Vec<u8>,
    attr: Vec<u8>,
    reference: Vec<u8>,
    /// Attribute value bytes not yet handed on.
    scratch: Vec<u8>,
    seen_root: bool,
    entity_match: usize,
    decl_brackets: usize,
    decl_quote: Option<u8>,
    max_depth: usize,
    max_key_size: usize,
    max_value_size: usize,
    status: Status,
    depth: usize,
}

fn is_name_byte(b: u8) -> bool {
    !is_space(b) && !matches!(b, b'<' | b'>' | b'/' | b'=' | b'"' | b'\'' | b'&')
}

impl<S: StreamSink> XmlParser<S> {
    /// Creates a parser writing to `sink`.
    pub fn new(sink: S, limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            path: KeyPath::new(limits.max_depth.saturating_add(1)),
            elements: Vec::new(),
            state: State::Text,
            bom: BomSniffer::default(),
            name: Vec::new(),
            attr: Vec::new(),
            reference: Vec::new(),
            scratch: Vec::new(),
            seen_root: false,
            entity_match: 0,
            decl_brackets: 0,
            decl_quote: None,
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

    fn syntax(reason: &'static str) -> ParseError {
        ParseError::syntax(NAME, reason)
    }

    fn push_name_byte(buf: &mut Vec<u8>, b: u8, cap: usize) {
        if buf.len() < cap {
            buf.push(b);
        }
    }

    fn append_text(&mut self, b: u8) -> Result<(), ParseError> {
        let Some(element) = self.elements.last_mut() else {
            if is_space(b) {
                return Ok(());
            }
            return Err(Self::syntax("text outside root element"));
        };
        element.append(&mut self.sink, self.path.as_bytes(), b, self.max_value_size)?;
        Ok(())
    }

    fn open_element(&mut self) -> Result<(), ParseError> {
        if self.name.is_empty() {
            return Err(Self::syntax("empty element name"));
        }
        if self.name.eq_ignore_ascii_case(b"script") {
            return Err(Self::syntax("script element"));
        }
        if self.elements.is_empty() && self.seen_root {
            return Err(Self::syntax("multiple root elements"));
        }
        if self.elements.len() >= self.max_depth {
            return Err(ParseError::ResourceLimitExceeded(Limit::Depth));
        }
        if let Some(parent) = self.elements.last_mut() {
            parent.child_opened();
        }
        self.path.push(&self.name)?;
        self.elements.push(TextRuns::default());
        self.seen_root = true;
        Ok(())
    }

    fn close_element(&mut self) -> Result<(), ParseError> {
        let element = self
            .elements
            .pop()
            .ok_or(ParseError::Internal("xml: close without open element"))?;
        element.close(&mut self.sink, self.path.as_bytes())?;
        self.path.pop();
        Ok(())
    }

    fn end_tag(&mut self) -> Result<(), ParseError> {
        if self.elements.is_empty() || self.path.last() != self.name.as_slice() {
            return Err(Self::syntax("mismatched end tag"));
        }
        self.close_element()
    }

    fn begin_attr_value(&mut self, quote: u8) -> Result<(), ParseError> {
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

    /// Tracks `<!ENTITY` inside markup declarations.
    fn match_entity(&mut self, b: u8) -> Result<(), ParseError> {
        if b == ENTITY_DECL[self.entity_match] {
            self.entity_match += 1;
            if self.entity_match == ENTITY_DECL.len() {
                self.entity_match = 0;
                log::debug!(target: "dissector::xml", "entity declaration");
                let key = if self.path.is_empty() {
                    ROOT_LABEL
                } else {
                    self.path.as_bytes()
                };
                emit_pair(&mut self.sink, key, ENTITY_MARKER)?;
            }
        } else {
            self.entity_match = usize::from(b == b'<');
        }
        Ok(())
    }

    fn enter_declaration(&mut self) {
        self.decl_brackets = 0;
        self.decl_quote = None;
        self.state = State::Declaration;
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
                    self.entity_match = 2;
                    self.state = State::Bang;
                }
                b'?' => self.state = State::Pi,
                _ if is_name_byte(b) => {
                    self.name.clear();
                    self.name.push(b);
                    self.state = State::StartTagName;
                }
                _ => return Err(Self::syntax("invalid tag")),
            },
            State::StartTagName => match b {
                b'>' => {
                    self.open_element()?;
                    self.state = State::Text;
                }
                b'/' => {
                    self.open_element()?;
                    self.state = State::EmptyTagClose;
                }
                _ if is_space(b) => {
                    self.open_element()?;
                    self.state = State::TagSpace;
                }
                _ if is_name_byte(b) => Self::push_name_byte(&mut self.name, b, self.max_key_size),
                _ => return Err(Self::syntax("invalid element name")),
            },
            State::TagSpace => match b {
                b'>' => self.state = State::Text,
                b'/' => self.state = State::EmptyTagClose,
                _ if is_space(b) => {}
                _ if is_name_byte(b) => {
                    self.attr.clear();
                    self.attr.push(b);
                    self.state = State::AttrName;
                }
                _ => return Err(Self::syntax("invalid attribute")),
            },
            State::AttrName => match b {
                b'=' => self.state = State::BeforeAttrValue,
                _ if is_space(b) => self.state = State::AfterAttrName,
                _ if is_name_byte(b) => Self::push_name_byte(&mut self.attr, b, self.max_key_size),
                _ => return Err(Self::syntax("attribute without value")),
            },
            State::AfterAttrName => match b {
                b'=' => self.state = State::BeforeAttrValue,
                _ if is_space(b) => {}
                _ => return Err(Self::syntax("attribute without value")),
            },
            State::BeforeAttrValue => match b {
                b'"' | b'\'' => self.begin_attr_value(b)?,
                _ if is_space(b) => {}
                _ => return Err(Self::syntax("unquoted attribute value")),
            },
            State::AttrValue(quote) => match b {
                _ if b == quote => self.end_attr_value()?,
                b'&' => {
                    self.reference.clear();
                    self.state = State::Reference(Context::Attr(quote));
                }
                b'<' => return Err(Self::syntax("'<' in attribute value")),
                _ => self.scratch.push(b),
            },
            State::EmptyTagClose => {
                if b != b'>' {
                    return Err(Self::syntax("expected '>'"));
                }
                self.close_element()?;
                self.state = State::Text;
            }
            State::EndTagName => match b {
                b'>' => {
                    self.end_tag()?;
                    self.state = State::Text;
                }
                _ if is_space(b) => self.state = State::EndTagTail,
                _ => Self::push_name_byte(&mut self.name, b, self.max_key_size),
            },
            State::EndTagTail => match b {
                b'>' => {
                    self.end_tag()?;
                    self.state = State::Text;
                }
                _ if is_space(b) => {}
                _ => return Err(Self::syntax("invalid end tag")),
            },
            State::Reference(context) => {
                let resume = match context {
                    Context::Text => State::Text,
                    Context::Attr(quote) => State::AttrValue(quote),
                };
                if b == b';' {
                    let mut decoded = Vec::new();
                    if decode_reference(&self.reference, &mut decoded).is_none() {
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
                self.match_entity(b)?;
                self.name.push(b);
                let seen = self.name.as_slice();
                if seen == b"--" {
                    self.state = State::Comment;
                } else if seen == b"[CDATA[" {
                    self.state = State::Cdata;
                } else if !b"--".starts_with(seen) && !b"[CDATA[".starts_with(seen) {
                    self.enter_declaration();
                    return self.step_declaration(b).map(|()| true);
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
            State::Cdata => {
                if b == b']' {
                    self.state = State::CdataBracket;
                } else {
                    self.append_text(b)?;
                }
            }
            State::CdataBracket => {
                if b == b']' {
                    self.state = State::CdataBracketBracket;
                } else {
                    self.append_text(b']')?;
                    self.state = State::Cdata;
                    return Ok(false);
                }
            }
            State::CdataBracketBracket => match b {
                b'>' => self.state = State::Text,
                b']' => self.append_text(b']')?,
                _ => {
                    self.append_text(b']')?;
                    self.append_text(b']')?;
                    self.state = State::Cdata;
                    return Ok(false);
                }
            },
            State::Declaration => {
                self.match_entity(b)?;
                self.step_declaration(b)?;
            }
            State::Pi => {
                if b == b'?' {
                    self.state = State::PiQuestion;
                }
            }
            State::PiQuestion => {
                self.state = match b {
                    b'>' => State::Text,
                    b'?' => State::PiQuestion,
                    _ => State::Pi,
                };
            }
        }
        Ok(true)
    }

    /// Bracket and quote tracking inside `<!...>`; the entity matcher has
    /// already seen `b`.
    fn step_declaration(&mut self, b: u8) -> Result<(), ParseError> {
        if let Some(quote) = self.decl_quote {
            if b == quote {
                self.decl_quote = None;
            }
            return Ok(());
        }
        match b {
            b'"' | b'\'' => self.decl_quote = Some(b),
            b'[' => self.decl_brackets += 1,
            b']' => self.decl_brackets = self.decl_brackets.saturating_sub(1),
            b'>' if self.decl_brackets == 0 => self.state = State::Text,
            _ => {}
        }
        Ok(())
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

impl<S: StreamSink> Machine for XmlParser<S> {
    const NAME: &'static str = NAME;

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let (replay, data) = self.bom.strip(data);
        self.scan(replay)?;
        self.scan(data)?;
        if !self.scratch.is_empty() {
            self.sink.on_value(&self.scratch)?;
            self.scratch.clear();
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), ParseError> {
        let replay = self.bom.finish();
        self.scan(replay)?;
        if !self.seen_root {
            return Err(Self::syntax("no root element"));
        }
        if self.state != State::Text || !self.elements.is_empty() {
            return Err(Self::syntax("unexpected end of input"));
        }
        Ok(())
    }
}

impl_parser!(XmlParser<S: StreamSink>);

#[cfg(test)]
mod tests {
    use alloc::{string::String, vec::Vec};

    use rstest::rstest;

    use super::*;
    use crate::{BufferedSink, Collector, Parser};

    fn parse_with(limits: &Limits, chunks: &[&[u8]]) -> Result<String, ParseError> {
        let mut p = XmlParser::new(BufferedSink::new(Collector::new(), limits), limits, 0);
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
    fn elements_attributes_and_text() {
        let out = parse(r#"<root><a x="1">hi</a><b/><c> t1 <d>v</d> t2 </c></root>"#).unwrap();
        assert_eq!(out, "root.a.x=1\nroot.a=hi\nroot.b=\nroot.c.d=v\nroot.c=t1t2\n");
    }

    #[rstest]
    #[case::prolog(
        "<?xml version=\"1.0\"?>\n<!-- note -- here -->\n<a>1</a>\n",
        "a=1\n"
    )]
    #[case::references(
        r#"<a t='&lt;&#65;&#x42;&amp;'>&quot;x&apos; &#0;</a>"#,
        "a.t=<AB&\na=\"x' @\n"
    )]
    #[case::unknown_reference("<a>&bogus; & b</a>", "a=&bogus; & b\n")]
    #[case::cdata("<a><![CDATA[<x> ]] ]]></a>", "a=<x> ]]\n")]
    #[case::wrapper_only("<a><b>1</b><c>2</c></a>", "a.b=1\na.c=2\n")]
    #[case::empty_with_attribute("<a k=\"v\"></a>", "a.k=v\na=\n")]
    #[case::end_tag_space("<a>x</a >", "a=x\n")]
    #[case::bom("\u{feff}<a>x</a>", "a=x\n")]
    #[case::runs_trimmed_and_joined("<a> sta <b>z</b> rt </a>", "a.b=z\na=start\n")]
    #[case::inner_space_kept("<a>\n  two  words\t\n</a>", "a=two  words\n")]
    #[case::space_only_runs("<a> <b/> </a>", "a.b=\n")]
    fn documents(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(parse(input).unwrap(), expected);
    }

    #[test]
    fn entity_declaration_reports_marker() {
        let out = parse(
            "<!DOCTYPE r [<!ENTITY e SYSTEM \"file:///etc/passwd\"> <!ELEMENT r ANY>]><r>&e;</r>",
        )
        .unwrap();
        assert_eq!(out, "xml=08a80340-06d3-11ea-9f87-0242ac11000f\nr=&e;\n");
    }

    #[rstest]
    #[case::script("<r><ScRiPt>x</ScRiPt></r>", "script element")]
    #[case::mismatched("<a></b>", "mismatched end tag")]
    #[case::unclosed("<a><b></b>", "unexpected end of input")]
    #[case::text_outside("x<a/>", "text outside root element")]
    #[case::two_roots("<a/><b/>", "multiple root elements")]
    #[case::empty("  ", "no root element")]
    #[case::bare_attribute("<a b></a>", "attribute without value")]
    fn malformed(#[case] input: &str, #[case] reason: &'static str) {
        assert_eq!(
            parse(input),
            Err(ParseError::MalformedSyntax {
                parser: "xml",
                reason
            })
        );
    }

    #[test]
    fn every_split_point_gives_the_same_pairs() {
        let input = "\u{feff}<?xml?><!DOCTYPE r [<!ENTITY x \"y>\">]><r a=\"1&amp;2\"><![CDATA[c]]]>\
                     t&#x41;<e/><!--z--></r>";
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
    fn deep_nesting_is_refused() {
        let input = "<a>".repeat(100_000);
        assert_eq!(
            parse(&input),
            Err(ParseError::ResourceLimitExceeded(Limit::Depth))
        );
    }

    #[test]
    fn long_text_is_reported_in_capped_pieces() {
        let limits = Limits {
            max_value_size: 4,
            ..Limits::default()
        };
        let mut p = XmlParser::new(
            BufferedSink::new(Collector::new(), &Limits::default()),
            &limits,
            0,
        );
        p.push(b"<a>abcdef").unwrap();
        p.push(b"ghij</a>").unwrap();
        p.finish().unwrap();
        assert_eq!(p.into_sink().into_inner().render(), "a=abcd\na=efgh\na=ij\n");
    }

    #[test]
    fn space_after_a_cap_flush_is_kept() {
        let limits = Limits {
            max_value_size: 4,
            ..Limits::default()
        };
        let run = |chunks: &[&[u8]]| {
            let mut p = XmlParser::new(
                BufferedSink::new(Collector::new(), &Limits::default()),
                &limits,
                0,
            );
            for chunk in chunks {
                p.push(chunk).unwrap();
            }
            p.finish().unwrap();
            p.into_sink().into_inner().render()
        };
        let input: &[u8] = b"<a>abcd efgh </a>";
        assert_eq!(run(&[input]), "a=abcd\na= efg\na=h\n");
        for cut in 1..input.len() {
            let (head, tail) = input.split_at(cut);
            assert_eq!(run(&[head, tail]), "a=abcd\na= efg\na=h\n");
        }
    }
}
