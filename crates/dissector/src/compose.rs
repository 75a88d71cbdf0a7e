//! Putting parsers together.
//!
//! [`ParserKind`] names a format together with the parameters it needs and
//! builds an [`AnyParser`], a parser of whichever format was chosen. The
//! caller decides the format; nothing here sniffs content types.
//!
//! [`ValuePipe`] is a [`StreamSink`] that feeds the value it receives into
//! another parser, which is how a format nested inside a value is dissected
//! (a gzip body holding JSON, a JSON string holding a query string, ...).

use alloc::{boxed::Box, vec::Vec};

use crate::{
    BufferedSink, Limits, Parser,
    error::{ParseError, SinkError},
    parsers::{
        BinaryParser, ConfluenceParser, DelimitedOptions, DelimitedParser, FileKind,
        GraphqlParser, GzipParser, HtmlParser, JsonParser, KnownBenignParser, KnownSource,
        MultipartParser, PercentParser, PhpParser, ScreenedJsonParser, TrailerParser, XmlParser,
    },
    sink::{EventSink, StreamSink},
};

/// A parser whose pairs go through a [`BufferedSink`] into `E`.
pub type Buffered<E> = AnyParser<BufferedSink<E>>;

/// A body format and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserKind {
    /// A delimited `key=value` list.
    Delimited(DelimitedOptions),
    /// JSON.
    Json,
    /// XML.
    Xml,
    /// PHP `serialize()` output.
    Php,
    /// `multipart/form-data` with the given boundary.
    Multipart {
        /// Boundary from the `Content-Type` header, without leading dashes.
        boundary: Vec<u8>,
    },
    /// gzip.
    Gzip,
    /// Printable runs in binary data.
    Binary,
    /// End-of-file marker check for a binary document.
    Trailer(FileKind),
    /// A binary document sent as base64, whose body is only validated.
    Base64Trailer(FileKind),
    /// GraphQL.
    Graphql,
    /// Text of an HTML document.
    Html,
    /// A single percent-encoded string.
    Percent,
    /// JSON escaped into a JSON string.
    ScreenedJson,
    /// A Confluence wiki macro.
    Confluence,
    /// A body from a known benign source, skipped.
    KnownBenign(KnownSource),
}

impl ParserKind {
    /// `application/x-www-form-urlencoded` bodies and query strings.
    #[must_use]
    pub fn url_encoded() -> Self {
        ParserKind::Delimited(DelimitedOptions::url_encoded())
    }

    /// `;`-separated header parameters.
    #[must_use]
    pub fn header_value() -> Self {
        ParserKind::Delimited(DelimitedOptions::header_value())
    }

    /// Builds a parser of this kind writing to `sink`.
    pub fn build<S: StreamSink>(&self, sink: S, limits: &Limits, depth: usize) -> AnyParser<S> {
        match self {
            ParserKind::Delimited(options) => {
                AnyParser::Delimited(DelimitedParser::new(sink, options.clone(), limits, depth))
            }
            ParserKind::Json => AnyParser::Json(JsonParser::new(sink, limits, depth)),
            ParserKind::Xml => AnyParser::Xml(XmlParser::new(sink, limits, depth)),
            ParserKind::Php => AnyParser::Php(PhpParser::new(sink, limits, depth)),
            ParserKind::Multipart { boundary } => {
                AnyParser::Multipart(MultipartParser::new(sink, boundary, limits, depth))
            }
            ParserKind::Gzip => AnyParser::Gzip(GzipParser::new(sink, limits, depth)),
            ParserKind::Binary => AnyParser::Binary(BinaryParser::new(sink, limits, depth)),
            ParserKind::Trailer(kind) => {
                AnyParser::Trailer(TrailerParser::new(sink, *kind, limits, depth))
            }
            ParserKind::Base64Trailer(kind) => {
                AnyParser::Trailer(TrailerParser::base64(sink, *kind, limits, depth))
            }
            ParserKind::Graphql => AnyParser::Graphql(GraphqlParser::new(sink, limits, depth)),
            ParserKind::Html => AnyParser::Html(HtmlParser::new(sink, limits, depth)),
            ParserKind::Percent => AnyParser::Percent(PercentParser::new(sink, limits, depth)),
            ParserKind::ScreenedJson => {
                AnyParser::ScreenedJson(ScreenedJsonParser::new(sink, limits, depth))
            }
            ParserKind::Confluence => {
                AnyParser::Confluence(ConfluenceParser::new(sink, limits, depth))
            }
            ParserKind::KnownBenign(source) => {
                AnyParser::KnownBenign(KnownBenignParser::new(sink, *source, limits, depth))
            }
        }
    }

    /// Builds a parser of this kind whose pairs are buffered into `inner`.
    pub fn buffered<E: EventSink>(&self, inner: E, limits: &Limits, depth: usize) -> Buffered<E> {
        self.build(BufferedSink::with_depth(inner, limits, depth), limits, depth)
    }
}

/// A parser of any format.
#[derive(Debug)]
pub enum AnyParser<S> {
    /// See [`DelimitedParser`].
    Delimited(DelimitedParser<S>),
    /// See [`JsonParser`].
    Json(JsonParser<S>),
    /// See [`XmlParser`].
    Xml(XmlParser<S>),
    /// See [`PhpParser`].
    Php(PhpParser<S>),
    /// See [`MultipartParser`].
    Multipart(MultipartParser<S>),
    /// See [`GzipParser`].
    Gzip(GzipParser<S>),
    /// See [`BinaryParser`].
    Binary(BinaryParser<S>),
    /// See [`TrailerParser`].
    Trailer(TrailerParser<S>),
    /// See [`GraphqlParser`].
    Graphql(GraphqlParser<S>),
    /// See [`HtmlParser`].
    Html(HtmlParser<S>),
    /// See [`PercentParser`].
    Percent(PercentParser<S>),
    /// See [`ScreenedJsonParser`].
    ScreenedJson(ScreenedJsonParser<S>),
    /// See [`ConfluenceParser`].
    Confluence(ConfluenceParser<S>),
    /// See [`KnownBenignParser`].
    KnownBenign(KnownBenignParser<S>),
}

macro_rules! dispatch {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            AnyParser::Delimited($p) => $body,
            AnyParser::Json($p) => $body,
            AnyParser::Xml($p) => $body,
            AnyParser::Php($p) => $body,
            AnyParser::Multipart($p) => $body,
            AnyParser::Gzip($p) => $body,
            AnyParser::Binary($p) => $body,
            AnyParser::Trailer($p) => $body,
            AnyParser::Graphql($p) => $body,
            AnyParser::Html($p) => $body,
            AnyParser::Percent($p) => $body,
            AnyParser::ScreenedJson($p) => $body,
            AnyParser::Confluence($p) => $body,
            AnyParser::KnownBenign($p) => $body,
        }
    };
}

impl<S: StreamSink> AnyParser<S> {
    /// The downstream sink.
    pub fn sink(&self) -> &S {
        dispatch!(self, p => p.sink())
    }

    /// Consumes the parser, returning its sink.
    pub fn into_sink(self) -> S {
        dispatch!(self, p => p.into_sink())
    }
}

impl<S: StreamSink> Parser for AnyParser<S> {
    fn push(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        dispatch!(self, p => p.push(data))
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        dispatch!(self, p => p.finish())
    }

    fn name(&self) -> &str {
        dispatch!(self, p => p.name())
    }

    fn error(&self) -> bool {
        dispatch!(self, p => p.error())
    }

    fn depth(&self) -> usize {
        dispatch!(self, p => p.depth())
    }
}

/// Feeds every value into a nested parser of a given kind.
///
/// Keys are dropped; the nested parser reports its own. The first non-empty
/// fragment of a value starts a fresh parser over the inner sink, later
/// fragments are pushed as they arrive and [`StreamSink::on_done`] finishes
/// it and takes the sink back. Each outer pair is therefore dissected on its
/// own, and all of them land in the same sink. Empty values start nothing.
///
/// A nested failure is returned to the outer parser as
/// [`SinkError::Nested`].
///
/// ```
/// use dissector::{Collector, Limits, Parser, ParserKind, ValuePipe, parsers::DelimitedOptions};
///
/// let limits = Limits::default();
/// let query = ValuePipe::new(ParserKind::url_encoded(), Collector::new(), &limits, 1);
/// let mut outer = ParserKind::Delimited(DelimitedOptions::labeled("q", b'&'))
///     .build(query, &limits, 0);
/// outer.push(b"a%3D1%26b%3D2&c%3D3").unwrap();
/// outer.finish().unwrap();
///
/// let pairs = outer.into_sink().into_inner();
/// assert_eq!(pairs.render(), "a=1\nb=2\nc=3\n");
/// ```
#[derive(Debug)]
pub struct ValuePipe<E: EventSink> {
    kind: ParserKind,
    limits: Limits,
    depth: usize,
    stage: Stage<E>,
}

#[derive(Debug)]
enum Stage<E: EventSink> {
    Idle(E),
    Running(Buffered<E>),
    /// Only observable while a transition is in progress.
    Moving,
}

impl<E: EventSink> ValuePipe<E> {
    /// Dissects each value as `kind` at recursion level `depth`, reporting
    /// pairs to `inner`.
    pub fn new(kind: ParserKind, inner: E, limits: &Limits, depth: usize) -> Self {
        Self {
            kind,
            limits: *limits,
            depth,
            stage: Stage::Idle(inner),
        }
    }

    /// The kind every value is dissected as.
    pub fn kind(&self) -> &ParserKind {
        &self.kind
    }

    /// The parser of the value in progress, if any.
    pub fn parser(&self) -> Option<&Buffered<E>> {
        match &self.stage {
            Stage::Running(parser) => Some(parser),
            Stage::Idle(_) | Stage::Moving => None,
        }
    }

    /// The sink nested pairs are reported to.
    pub fn inner(&self) -> &E {
        match &self.stage {
            Stage::Idle(inner) => inner,
            Stage::Running(parser) => parser.sink().inner(),
            Stage::Moving => unreachable!("pipe stage is restored before returning"),
        }
    }

    /// Unwraps the sink. Pairs of a value still in progress that were not
    /// flushed yet are lost.
    pub fn into_inner(self) -> E {
        match self.stage {
            Stage::Idle(inner) => inner,
            Stage::Running(parser) => parser.into_sink().into_inner(),
            Stage::Moving => unreachable!("pipe stage is restored before returning"),
        }
    }

    fn running(&mut self) -> &mut Buffered<E> {
        if let Stage::Idle(_) = self.stage {
            if let Stage::Idle(inner) = core::mem::replace(&mut self.stage, Stage::Moving) {
                log::trace!(target: "dissector::compose", "nested {:?} parser started", self.kind);
                self.stage = Stage::Running(self.kind.buffered(inner, &self.limits, self.depth));
            }
        }
        match &mut self.stage {
            Stage::Running(parser) => parser,
            Stage::Idle(_) | Stage::Moving => unreachable!("pipe stage is restored before returning"),
        }
    }
}

fn nested(err: ParseError) -> SinkError {
    SinkError::Nested(Box::new(err))
}

impl<E: EventSink> StreamSink for ValuePipe<E> {
    fn on_key(&mut self, _key: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_value(&mut self, value: &[u8]) -> Result<(), SinkError> {
        if value.is_empty() {
            return Ok(());
        }
        self.running().push(value).map(|_| ()).map_err(nested)
    }

    fn on_done(&mut self) -> Result<(), SinkError> {
        match core::mem::replace(&mut self.stage, Stage::Moving) {
            Stage::Running(mut parser) => {
                let outcome = parser.finish();
                if outcome.is_err() {
                    // The failed parser keeps the sink; the outer parser is
                    // about to fail as well.
                    self.stage = Stage::Running(parser);
                } else {
                    self.stage = Stage::Idle(parser.into_sink().into_inner());
                }
                outcome.map_err(nested)
            }
            idle => {
                self.stage = idle;
                Ok(())
            }
        }
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Collector, error::Limit};

    #[test]
    fn names_follow_the_format() {
        let limits = Limits::default();
        let kinds = [
            (ParserKind::url_encoded(), "urlencoded"),
            (ParserKind::header_value(), "hdrvalue"),
            (ParserKind::Json, "json"),
            (ParserKind::Xml, "xml"),
            (ParserKind::Php, "php"),
            (ParserKind::Multipart { boundary: b"b".to_vec() }, "multipart"),
            (ParserKind::Gzip, "gzip"),
            (ParserKind::Binary, "binary"),
            (ParserKind::Trailer(FileKind::Pdf), "trailer"),
            (ParserKind::Base64Trailer(FileKind::Png), "trailer"),
            (ParserKind::Graphql, "graphql"),
            (ParserKind::Html, "html"),
            (ParserKind::Percent, "percent"),
            (ParserKind::ScreenedJson, "screened_json"),
            (ParserKind::Confluence, "confluence"),
            (ParserKind::KnownBenign(KnownSource::SensorData), "known_benign"),
        ];
        for (kind, name) in kinds {
            let p = kind.buffered(Collector::new(), &limits, 3);
            assert_eq!(p.name(), name);
            assert_eq!(p.depth(), 3);
            assert!(!p.error());
        }
    }

    #[test]
    fn any_parser_keeps_the_error() {
        let limits = Limits {
            max_depth: 2,
            ..Limits::default()
        };
        let mut p = ParserKind::Json.buffered(Collector::new(), &limits, 0);
        let err = ParseError::ResourceLimitExceeded(Limit::Depth);
        assert_eq!(p.push(b"[[[[1]]]]"), Err(err.clone()));
        assert!(p.error());
        assert_eq!(p.finish(), Err(err));
    }

    #[test]
    fn nested_failure_surfaces_as_sink_error() {
        let limits = Limits::default();
        let inner = ValuePipe::new(ParserKind::Json, Collector::new(), &limits, 1);
        let mut outer = ParserKind::Delimited(DelimitedOptions::labeled("v", b'&'))
            .build(inner, &limits, 0);
        let err = outer.push(b"{bad&").unwrap_err();
        let ParseError::DownstreamSinkFailure(SinkError::Nested(cause)) = &err else {
            panic!("unexpected error {err:?}");
        };
        assert!(matches!(**cause, ParseError::MalformedSyntax { parser: "json", .. }), "{cause:?}");
        assert!(err.to_string().starts_with("downstream sink failure: nested parser: json: malformed input"));
    }

    #[test]
    fn every_value_gets_a_fresh_parser() {
        let limits = Limits::default();
        let inner = ValuePipe::new(ParserKind::Json, Collector::new(), &limits, 1);
        let mut outer = ParserKind::url_encoded().build(inner, &limits, 0);
        outer.push(b"a=%7B%22x%22%3A1%7D&b=&c=%7B%22k%22%3A2%7D").unwrap();
        outer.finish().unwrap();
        assert!(outer.sink().parser().is_none());

        let pairs = outer.into_sink().into_inner();
        assert_eq!(pairs.render(), "x=1\nk=2\n");
        assert!(pairs.pairs().iter().all(|p| p.depth == 1));
    }

    #[test]
    fn later_values_are_dissected_too() {
        let limits = Limits::default();
        let inner = ValuePipe::new(ParserKind::url_encoded(), Collector::new(), &limits, 1);
        let mut outer = ParserKind::Delimited(DelimitedOptions::labeled("q", b'&'))
            .build(inner, &limits, 0);
        for chunk in [b"x%3D1".as_slice(), b"&y%3D", b"2&z%3D3"] {
            outer.push(chunk).unwrap();
        }
        outer.finish().unwrap();
        assert_eq!(outer.sink().inner().render(), "x=1\ny=2\nz=3\n");
    }
}
