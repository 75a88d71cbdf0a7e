use rstest::rstest;

use super::fixtures::documents;
use crate::{
    BufferedSink, Collector, EventSink, Limits, PairFlags, Parser, ParserKind, SinkError,
    error::ParseError,
    parsers::{FileKind, KnownSource},
};

#[test]
fn input_after_finish_is_ignored() {
    let limits = Limits::default();
    for (kind, doc) in documents() {
        let mut p = kind.buffered(Collector::new(), &limits, 0);
        p.push(&doc).unwrap();
        p.finish().unwrap();
        let before = p.sink().inner().render();
        assert_eq!(p.push(b"more"), Ok(0), "{kind:?}");
        assert_eq!(p.finish(), Ok(()));
        assert!(!p.error());
        assert_eq!(p.sink().inner().render(), before);
    }
}

#[test]
fn finish_is_an_empty_push() {
    let limits = Limits::default();
    for (kind, doc) in documents() {
        let mut a = kind.buffered(Collector::new(), &limits, 0);
        a.push(&doc).unwrap();
        a.finish().unwrap();
        let mut b = kind.buffered(Collector::new(), &limits, 0);
        b.push(&doc).unwrap();
        assert_eq!(b.push(&[]), Ok(0));
        assert_eq!(a.into_sink().into_inner(), b.into_sink().into_inner(), "{kind:?}");
    }
}

#[rstest]
#[case::url_encoded(ParserKind::url_encoded(), b"a=\x01b")]
#[case::json(ParserKind::Json, b"{]")]
#[case::xml(ParserKind::Xml, b"<a></b>")]
#[case::php(ParserKind::Php, b"s:9:\"short\";")]
#[case::multipart(ParserKind::Multipart { boundary: b"b".to_vec() }, b"--b\nx")]
#[case::gzip(ParserKind::Gzip, b"definitely not gzip")]
#[case::trailer(ParserKind::Trailer(FileKind::Png), b"\x89PNG\r\n\x1a\n")]
#[case::graphql(ParserKind::Graphql, b"{ a ")]
#[case::html(ParserKind::Html, b"<!-- only a comment -->")]
#[case::percent(ParserKind::Percent, b"a%20\x01")]
#[case::screened_json(ParserKind::ScreenedJson, b"{\\")]
#[case::base64_trailer(ParserKind::Base64Trailer(FileKind::Pdf), b"JVBE*")]
#[case::confluence(ParserKind::Confluence, b"{a:b=c}d")]
#[case::known_benign(ParserKind::KnownBenign(KnownSource::SensorData), b"{\"sensor_data\":\"")]
fn errors_are_terminal(#[case] kind: ParserKind, #[case] input: &[u8]) {
    let limits = Limits::default();
    let mut p = kind.buffered(Collector::new(), &limits, 0);
    let err = match p.push(input) {
        Err(err) => err,
        Ok(_) => p.finish().unwrap_err(),
    };
    assert!(p.error());
    assert_eq!(p.push(b"anything"), Err(err.clone()));
    assert_eq!(p.finish(), Err(err));
}

/// Refuses every pair whose key is `stop`.
#[derive(Debug, Default)]
struct Refusing(Collector);

impl EventSink for Refusing {
    fn on_kv(
        &mut self,
        key: &[u8],
        value: &[u8],
        flags: PairFlags,
        depth: usize,
    ) -> Result<(), SinkError> {
        if key == b"stop" {
            return Err(SinkError::new("refused"));
        }
        self.0.on_kv(key, value, flags, depth)
    }
}

#[test]
fn sink_failure_stops_the_parser() {
    let limits = Limits::default();
    let mut p = ParserKind::url_encoded().build(
        BufferedSink::new(Refusing::default(), &limits),
        &limits,
        0,
    );
    let err = p.push(b"a=1&stop=2&c=3").unwrap_err();
    assert_eq!(err, ParseError::DownstreamSinkFailure(SinkError::new("refused")));
    assert!(p.error());
    assert_eq!(p.into_sink().into_inner().0.render(), "a=1\n");
}
