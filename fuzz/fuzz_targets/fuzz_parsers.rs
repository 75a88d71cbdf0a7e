#![no_main]

use arbitrary::Arbitrary;
use dissector::{
    Collector, Limits, ParseError, Parser, ParserKind, chunk_utils::split_by,
    parsers::{DelimitedOptions, FileKind, KnownSource},
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    kind: u8,
    boundary: Vec<u8>,
    max_depth: u8,
    max_value_size: u16,
    cuts: Vec<usize>,
    data: Vec<u8>,
}

fn kind_of(input: &Input) -> ParserKind {
    match input.kind % 18 {
        0 => ParserKind::url_encoded(),
        1 => ParserKind::header_value(),
        2 => ParserKind::Delimited(DelimitedOptions::labeled("v", b',')),
        3 => ParserKind::Json,
        4 => ParserKind::Xml,
        5 => ParserKind::Php,
        6 => {
            let mut boundary = input.boundary.clone();
            boundary.truncate(70);
            if boundary.is_empty() {
                boundary.push(b'-');
            }
            ParserKind::Multipart { boundary }
        }
        7 => ParserKind::Gzip,
        8 => ParserKind::Binary,
        9 => ParserKind::Trailer(FileKind::Pdf),
        10 => ParserKind::Trailer(FileKind::Png),
        11 => ParserKind::Base64Trailer(FileKind::Jpeg),
        12 => ParserKind::Html,
        13 => ParserKind::Percent,
        14 => ParserKind::ScreenedJson,
        15 => ParserKind::Confluence,
        16 => ParserKind::KnownBenign(KnownSource::SensorData),
        _ => ParserKind::Graphql,
    }
}

fn run(kind: &ParserKind, limits: &Limits, chunks: &[&[u8]]) -> (Result<(), ParseError>, String) {
    let mut parser = kind.buffered(Collector::new(), limits, 0);
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
    assert_eq!(parser.error(), outcome.is_err());
    if let Err(err) = &outcome {
        assert_eq!(parser.push(b"x"), Err(err.clone()));
    } else {
        assert_eq!(parser.push(b"x"), Ok(0));
    }
    (outcome, parser.into_sink().into_inner().render())
}

fuzz_target!(|input: Input| {
    let kind = kind_of(&input);
    let limits = Limits {
        max_depth: usize::from(input.max_depth).max(1),
        max_value_size: usize::from(input.max_value_size).max(1),
        max_decompressed_size: 1 << 20,
        ..Limits::default()
    };

    let whole = run(&kind, &limits, &[input.data.as_slice()]);
    let split = run(&kind, &limits, &split_by(&input.data, &input.cuts));
    if whole.0.is_ok() {
        assert_eq!(whole, split, "{kind:?}");
    }
});
