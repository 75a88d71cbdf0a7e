//! Benchmark – dissecting bodies fed in many small chunks
#![allow(missing_docs)]

use std::{io::Write, time::Duration};

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use dissector::{Collector, Limits, Parser, ParserKind};
use flate2::{Compression, write::GzEncoder};

/// A JSON document of many small records, at least `target_len` bytes long.
fn make_json_payload(target_len: usize) -> Vec<u8> {
    let mut s = String::with_capacity(target_len + 64);
    s.push_str("{\"items\":[");
    let mut i = 0usize;
    while s.len() < target_len {
        if i > 0 {
            s.push(',');
        }
        s.push_str(&format!(
            "{{\"id\":{i},\"name\":\"item {i}\",\"tags\":[\"a\",\"b\"],\"ok\":true}}"
        ));
        i += 1;
    }
    s.push_str("]}");
    s.into_bytes()
}

/// A form body of `key=value` pairs with escapes, at least `target_len` bytes.
fn make_form_payload(target_len: usize) -> Vec<u8> {
    let mut s = String::with_capacity(target_len + 32);
    let mut i = 0usize;
    while s.len() < target_len {
        if i > 0 {
            s.push('&');
        }
        s.push_str(&format!("field{i}=value+with%20escapes%21{i}"));
        i += 1;
    }
    s.into_bytes()
}

fn make_xml_payload(target_len: usize) -> Vec<u8> {
    let mut s = String::with_capacity(target_len + 32);
    s.push_str("<root>");
    let mut i = 0usize;
    while s.len() < target_len {
        s.push_str(&format!("<row id=\"{i}\"><v>a &amp; b {i}</v></row>"));
        i += 1;
    }
    s.push_str("</root>");
    s.into_bytes()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).expect("in-memory write");
    enc.finish().expect("in-memory finish")
}

/// Feeds `payload` in `parts` chunks and returns the number of pairs seen.
fn run_dissector(kind: &ParserKind, payload: &[u8], parts: usize) -> usize {
    assert!(parts > 0);
    let chunk_size = payload.len().div_ceil(parts);
    let limits = Limits::default();

    let mut parser = kind.buffered(Collector::new(), &limits, 0);
    for chunk in payload.chunks(chunk_size) {
        parser.push(chunk).expect("benchmark payloads are valid");
    }
    parser.finish().expect("benchmark payloads are valid");
    parser.sink().inner().pairs().len()
}

fn bench_dissect_chunks(c: &mut Criterion) {
    let json = make_json_payload(10_000);
    let cases = [
        ("json", ParserKind::Json, json.clone()),
        ("urlencoded", ParserKind::url_encoded(), make_form_payload(10_000)),
        ("xml", ParserKind::Xml, make_xml_payload(10_000)),
        ("html", ParserKind::Html, make_xml_payload(10_000)),
        ("gzip", ParserKind::Gzip, gzip(&json)),
    ];

    let mut group = c.benchmark_group("dissect_split");

    for &parts in &[1usize, 100, 1_000] {
        for (name, kind, payload) in &cases {
            group.bench_with_input(
                BenchmarkId::new(parts.to_string(), name),
                payload,
                |b, payload| {
                    b.iter(|| {
                        let count = run_dissector(kind, black_box(payload), parts);
                        black_box(count);
                    });
                },
            );
        }
    }
    group.finish();
}

fn criterion() -> Criterion {
    let mut c = Criterion::default();
    if cfg!(feature = "bench-fast") {
        c = c
            .warm_up_time(Duration::from_millis(10))
            .measurement_time(Duration::from_millis(100))
            .sample_size(10);
    } else {
        c = c
            .warm_up_time(Duration::from_secs(3))
            .measurement_time(Duration::from_secs(5));
    }
    c
}

criterion_group! { name = benches; config = criterion(); targets = bench_dissect_chunks }
criterion_main!(benches);
