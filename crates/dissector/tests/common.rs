#![allow(missing_docs)]
#![allow(dead_code)]

use dissector::{BufferedSink, Collector, Limits, ParseError, Parser, ParserKind};

/// A form submission with one named and one unnamed part.
pub const MULTIPART_FORM: &[u8] = b"--X\r\n\
Content-Disposition: form-data; name=\"f1\"\r\n\
\r\n\
hello\r\n\
--X\r\n\
Content-Type: application/octet-stream\r\n\
\r\n\
\x00\x01binary\r\n\r\n--X--\r\n";

/// Runs `kind` over `chunks` and returns the collected pairs.
pub fn collect(
    kind: &ParserKind,
    limits: &Limits,
    chunks: &[&[u8]],
) -> Result<Collector, ParseError> {
    let mut parser = kind.build(BufferedSink::new(Collector::new(), limits), limits, 0);
    for chunk in chunks {
        parser.push(chunk)?;
    }
    parser.finish()?;
    Ok(parser.into_sink().into_inner())
}

/// Every way of cutting `input` in two.
pub fn two_way_splits(input: &[u8]) -> impl Iterator<Item = [&[u8]; 2]> {
    (1..input.len()).map(move |cut| {
        let (head, tail) = input.split_at(cut);
        [head, tail]
    })
}
