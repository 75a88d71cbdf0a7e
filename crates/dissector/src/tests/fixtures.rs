//! One small valid document per format, shared by the crate-level tests.

use alloc::{string::String, vec, vec::Vec};
use std::io::Write;

use flate2::{Compression, write::GzEncoder};

use crate::{
    BufferedSink, Collector, Limits, Parser, ParserKind,
    error::ParseError,
    parsers::{FileKind, KnownSource},
};

pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub(crate) fn documents() -> Vec<(ParserKind, Vec<u8>)> {
    vec![
        (ParserKind::url_encoded(), b"a=1&b=x%2By+z&c=%41%42&d&=e".to_vec()),
        (
            ParserKind::header_value(),
            br#"form-data; name="a;b"; filename=x%20y.txt"#.to_vec(),
        ),
        (
            ParserKind::Json,
            br#"{"a":[1,{"b":"x\u00e9"}],"c":null,"d":{}} // trailing comment"#.to_vec(),
        ),
        (
            ParserKind::Xml,
            br#"<?xml version="1.0"?><r a="1"><b>t&amp;x</b><![CDATA[c]]><e/></r>"#.to_vec(),
        ),
        (ParserKind::Php, br#"a:2:{s:1:"k";s:2:"v\0";i:1;a:0:{}}"#.to_vec()),
        (
            ParserKind::Multipart { boundary: b"zz".to_vec() },
            b"--zz\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nv\r\n-\r\n--zz\r\n\r\nw\r\n--zz--".to_vec(),
        ),
        (ParserKind::Gzip, gzip(b"compressed text, compressed text")),
        (
            ParserKind::Binary,
            b"\x00\x01hello world, this is text\x02\x03tiny\x04another printable run".to_vec(),
        ),
        (
            ParserKind::Trailer(FileKind::Pdf),
            b"%PDF-1.4\n1 0 obj\nendobj\n%%EOF\n".to_vec(),
        ),
        (
            ParserKind::Graphql,
            b"query { a(x: 1, y: [\"s\"]) { b ...F } }".to_vec(),
        ),
        (
            ParserKind::Html,
            b"<!doctype html><p class=a title='t&amp;t'>x <br>y<script>if(a<b)</script></p>".to_vec(),
        ),
        (ParserKind::Percent, b"%3Cb%3E+x%zz".to_vec()),
        (ParserKind::ScreenedJson, br#""{\"a\":[1,\"\\\\\"]}""#.to_vec()),
        (
            ParserKind::Base64Trailer(FileKind::Pdf),
            b"JVBERi0xLjQKJSVFT0YK".to_vec(),
        ),
        (ParserKind::Confluence, b"{code:title=a|lang=js|linenumbers}".to_vec()),
        (
            ParserKind::KnownBenign(KnownSource::SensorData),
            br#"{"sensor_data":"7a74G7m23Vrp0o5c9;1;2"}"#.to_vec(),
        ),
    ]
}

/// Feeds `chunks` to a fresh parser and renders the outcome.
pub(crate) fn dissect(kind: &ParserKind, chunks: &[&[u8]]) -> (Result<(), ParseError>, String) {
    let limits = Limits::default();
    let mut parser = kind.build(BufferedSink::new(Collector::new(), &limits), &limits, 0);
    let mut outcome = Ok(());
    for chunk in chunks {
        if let Err(err) = parser.push(chunk) {
            outcome = Err(err);
            break;
        }
    }
    if outcome.is_ok() {
        outcome = parser.finish();
    }
    (outcome, parser.into_sink().into_inner().render())
}
