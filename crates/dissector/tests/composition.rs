#![expect(missing_docs)]

use std::io::Write;

use dissector::{
    AnyParser, Collector, Limit, Limits, ParseError, Parser, ParserKind, SinkError, ValuePipe,
    parsers::DelimitedOptions,
};
use flate2::{Compression, write::GzEncoder};
use serde_json::json;

mod common;

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::best());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// An outer parser of `outer` whose values are dissected as `inner`.
fn piped(
    outer: &ParserKind,
    inner: &ParserKind,
    limits: &Limits,
) -> AnyParser<ValuePipe<Collector>> {
    outer.build(ValuePipe::new(inner.clone(), Collector::new(), limits, 1), limits, 0)
}

fn run(
    outer: &ParserKind,
    inner: &ParserKind,
    chunks: &[&[u8]],
) -> Result<Collector, ParseError> {
    let limits = Limits::default();
    let mut p = piped(outer, inner, &limits);
    for chunk in chunks {
        p.push(chunk)?;
    }
    p.finish()?;
    Ok(p.into_sink().into_inner())
}

#[test]
fn gzip_body_holding_json() {
    let doc = serde_json::to_vec(&json!({
        "user": { "name": "admin", "roles": ["a", "b"] },
        "note": "x".repeat(300),
    }))
    .unwrap();
    let body = gzip(&doc);

    let collected = run(&ParserKind::Gzip, &ParserKind::Json, &[&body]).unwrap();
    let rendered = collected.render();
    assert_eq!(
        rendered,
        format!("user.name=admin\nuser.roles=a\nuser.roles=b\nnote={}\n", "x".repeat(300))
    );
    assert!(collected.pairs().iter().all(|p| p.depth == 1));

    for split in common::two_way_splits(&body) {
        assert_eq!(
            run(&ParserKind::Gzip, &ParserKind::Json, &split).unwrap(),
            collected
        );
    }
}

#[test]
fn json_string_holding_xml() {
    let doc = br#"{"payload":"<a k=\"v\"><b>1</b></a>"}"#;
    let collected = run(&ParserKind::Json, &ParserKind::Xml, &[doc]).unwrap();
    assert_eq!(collected.render(), "a.k=v\na.b=1\n");
}

#[test]
fn nested_failure_stops_the_outer_parser() {
    let body = gzip(br#"{"a": [1, 2}"#);
    let limits = Limits::default();
    let mut p = piped(&ParserKind::Gzip, &ParserKind::Json, &limits);
    let err = p.push(&body).and_then(|_| p.finish()).unwrap_err();
    assert!(
        matches!(err.root_cause(), ParseError::MalformedSyntax { parser: "json", .. }),
        "{err:?}"
    );
    assert!(p.error());
    assert_eq!(p.push(b"more"), Err(err));
}

#[test]
fn nested_limits_apply_to_the_inner_parser() {
    let limits = Limits {
        max_depth: 3,
        ..Limits::default()
    };
    let body = gzip(b"[[[[[1]]]]]");
    let mut p = piped(&ParserKind::Gzip, &ParserKind::Json, &limits);
    let err = p.push(&body).and_then(|_| p.finish()).unwrap_err();
    let ParseError::DownstreamSinkFailure(SinkError::Nested(cause)) = &err else {
        panic!("unexpected error {err:?}");
    };
    assert_eq!(**cause, ParseError::ResourceLimitExceeded(Limit::Depth));
}

#[test]
fn every_outer_value_is_dissected() {
    let q = ParserKind::Delimited(DelimitedOptions::labeled("q", b'&'));
    let body = b"x%3D1&y%3D2&z%3D3";
    let collected = run(&q, &ParserKind::url_encoded(), &[body]).unwrap();
    assert_eq!(collected.render(), "x=1\ny=2\nz=3\n");

    for split in common::two_way_splits(body) {
        assert_eq!(run(&q, &ParserKind::url_encoded(), &split).unwrap(), collected);
    }
}

#[test]
fn json_members_each_hold_a_document() {
    let doc = br#"{"a":"{\"k\":1}","b":"","c":"[true]"}"#;
    let collected = run(&ParserKind::Json, &ParserKind::Json, &[doc]).unwrap();
    assert_eq!(collected.pairs().len(), 2);
    assert_eq!(collected.pairs()[0].to_string(), "k=1");
    assert_eq!(collected.pairs()[1].value, "true");
}

#[test]
fn decompression_bomb_is_cut_off() {
    let limits = Limits {
        max_decompressed_size: 1 << 10,
        ..Limits::default()
    };
    let body = gzip(&vec![b'a'; 1 << 20]);
    assert!(body.len() < 4096);
    assert_eq!(
        common::collect(&ParserKind::Gzip, &limits, &[&body]),
        Err(ParseError::ResourceLimitExceeded(Limit::DecompressedSize))
    );
}
