//! Bodies from known benign sources, skipped without dissection.
//!
//! Some clients post large opaque blobs that would only produce noise if
//! dissected. [`detect_known_source`] recognizes them from the start of the
//! body and [`KnownBenignParser`] confirms the body is complete by finding
//! the source's tail near the end, then reports a single marker pair instead
//! of the content.

use alloc::vec::Vec;

use bstr::ByteSlice;

use crate::{
    Limits,
    error::ParseError,
    parser::{Machine, Status, impl_parser},
    sink::{StreamSink, emit_pair},
};

const NAME: &str = "known_benign";

/// How far from the end the tail of a source may appear.
pub const TAIL_LOOKUP: usize = 32;

/// A recognized source of benign bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum KnownSource {
    /// Bot-detection sensor payloads: `{"sensor_data":"..."}`.
    SensorData,
}

impl KnownSource {
    /// Bytes the body starts with.
    pub fn prefix(self) -> &'static [u8] {
        match self {
            KnownSource::SensorData => br#"{"sensor_data":""#,
        }
    }

    /// Bytes found near the end of a complete body.
    pub fn tail(self) -> &'static [u8] {
        match self {
            KnownSource::SensorData => br#""}"#,
        }
    }

    /// Key of the pair reported for a skipped body.
    pub fn marker(self) -> &'static [u8] {
        match self {
            KnownSource::SensorData => b"SENSOR_DATA",
        }
    }
}

/// Recognizes a benign source from the first bytes of a body.
///
/// ```
/// use dissector::parsers::{KnownSource, detect_known_source};
///
/// assert_eq!(
///     detect_known_source(br#"{"sensor_data":"2;0;3;..."}"#),
///     Some(KnownSource::SensorData)
/// );
/// assert_eq!(detect_known_source(br#"{"user":"x"}"#), None);
/// ```
pub fn detect_known_source(buf: &[u8]) -> Option<KnownSource> {
    buf.starts_with(KnownSource::SensorData.prefix())
        .then_some(KnownSource::SensorData)
}

/// Skips a body from a [`KnownSource`].
#[derive(Debug)]
pub struct KnownBenignParser<S> {
    sink: S,
    source: KnownSource,
    /// The last bytes seen, at least [`TAIL_LOOKUP`] of them when available.
    window: Vec<u8>,
    status: Status,
    depth: usize,
}

impl<S: StreamSink> KnownBenignParser<S> {
    /// Creates a parser for a body from `source`.
    pub fn new(sink: S, source: KnownSource, _limits: &Limits, depth: usize) -> Self {
        Self {
            sink,
            source,
            window: Vec::with_capacity(2 * TAIL_LOOKUP),
            status: Status::Active,
            depth,
        }
    }

    /// The source this body is expected to come from.
    pub fn source(&self) -> KnownSource {
        self.source
    }

    /// The downstream sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consumes the parser, returning its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: StreamSink> Machine for KnownBenignParser<S> {
    const NAME: &'static str = NAME;

    fn status(&mut self) -> &mut Status {
        &mut self.status
    }

    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let data = &data[data.len().saturating_sub(TAIL_LOOKUP)..];
        self.window.extend_from_slice(data);
        if self.window.len() > 2 * TAIL_LOOKUP {
            self.window.drain(..self.window.len() - TAIL_LOOKUP);
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), ParseError> {
        let window = &self.window[self.window.len().saturating_sub(TAIL_LOOKUP)..];
        if window.find(self.source.tail()).is_none() {
            log::debug!(target: "dissector::benign", "no {:?} tail", self.source);
            return Err(ParseError::syntax(NAME, "source tail not found"));
        }
        emit_pair(&mut self.sink, self.source.marker(), b"")?;
        Ok(())
    }
}

impl_parser!(KnownBenignParser<S: StreamSink>);

#[cfg(test)]
mod tests {
    use alloc::{string::String, vec::Vec};

    use rstest::rstest;

    use super::*;
    use crate::{BufferedSink, Collector, Parser};

    fn skip(chunks: &[&[u8]]) -> Result<String, ParseError> {
        let limits = Limits::default();
        let mut p = KnownBenignParser::new(
            BufferedSink::new(Collector::new(), &limits),
            KnownSource::SensorData,
            &limits,
            0,
        );
        for chunk in chunks {
            p.push(chunk)?;
        }
        p.finish()?;
        Ok(p.into_sink().into_inner().render())
    }

    #[rstest]
    #[case::bare(br#"{"sensor_data":"2;0;3;<script>x</script>"}"#.as_slice())]
    #[case::trailing_newline(b"{\"sensor_data\":\"abc\"}\r\n".as_slice())]
    fn sensor_data_is_skipped(#[case] body: &[u8]) {
        assert_eq!(skip(&[body]).unwrap(), "SENSOR_DATA=\n");
        for cut in 1..body.len() {
            let (head, tail) = body.split_at(cut);
            assert_eq!(skip(&[head, tail]).unwrap(), "SENSOR_DATA=\n");
        }
    }

    #[test]
    fn tail_far_from_the_end_fails() {
        let mut body = br#"{"sensor_data":"x"}"#.to_vec();
        body.extend(core::iter::repeat_n(b' ', TAIL_LOOKUP));
        assert_eq!(
            skip(&[&body]),
            Err(ParseError::syntax("known_benign", "source tail not found"))
        );
    }

    #[rstest]
    #[case::cut_off(br#"{"sensor_data":"2;0;3"#.as_slice())]
    #[case::empty(b"".as_slice())]
    fn incomplete_bodies_fail(#[case] body: &[u8]) {
        assert_eq!(
            skip(&[body]),
            Err(ParseError::syntax("known_benign", "source tail not found"))
        );
    }

    #[test]
    fn long_bodies_keep_a_small_window() {
        let mut body = br#"{"sensor_data":""#.to_vec();
        body.extend(core::iter::repeat_n(b'a', 1 << 16));
        body.extend_from_slice(br#""}"#);
        let pieces: Vec<&[u8]> = body.chunks(7).collect();
        assert_eq!(skip(&pieces).unwrap(), "SENSOR_DATA=\n");
    }
}
