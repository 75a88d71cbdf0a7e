//! Adapter from fragment-oriented [`StreamSink`] calls to capped
//! [`EventSink`] pairs.
//!
//! Keys are accumulated up to [`Limits::max_key_size`] and then truncated
//! silently. Values are accumulated up to [`Limits::max_value_size`]; whenever
//! the value buffer reaches the cap it is flushed downstream immediately, the
//! first flush of a pair carrying [`PairFlags::FIRST`]. `on_done` always
//! flushes once more with [`PairFlags::LAST`], even if nothing is left, so the
//! consumer sees exactly one closing call per pair.
//!
//! Because flushes happen at exact cap boundaries, what reaches the consumer
//! depends only on the concatenated bytes, never on how the producer
//! fragmented them.

use alloc::vec::Vec;

use crate::{
    Limits,
    error::SinkError,
    sink::{EventSink, PairFlags, StreamSink},
};

/// Accumulating adapter in front of an [`EventSink`].
#[derive(Debug, Clone)]
pub struct BufferedSink<S> {
    inner: S,
    key: Vec<u8>,
    value: Vec<u8>,
    /// Flags for the next flush; `FIRST` until the pair's first flush.
    flags: PairFlags,
    depth: usize,
    max_key_size: usize,
    max_value_size: usize,
}

impl<S: EventSink> BufferedSink<S> {
    /// Wraps `inner`, reporting pairs at recursion depth zero.
    pub fn new(inner: S, limits: &Limits) -> Self {
        Self::with_depth(inner, limits, 0)
    }

    /// Wraps `inner`, reporting pairs at the given recursion depth.
    pub fn with_depth(inner: S, limits: &Limits, depth: usize) -> Self {
        Self {
            inner,
            key: Vec::new(),
            value: Vec::new(),
            flags: PairFlags::FIRST,
            depth,
            max_key_size: limits.max_key_size,
            max_value_size: limits.max_value_size.max(1),
        }
    }

    /// The wrapped sink.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The wrapped sink, mutably.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwraps the adapter. A pair still under construction is lost.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Depth reported with every pair.
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn flush(&mut self, flags: PairFlags) -> Result<(), SinkError> {
        let flags = if self.key.is_empty() {
            flags | PairFlags::UNNAMED
        } else {
            flags
        };
        self.inner.on_kv(&self.key, &self.value, flags, self.depth)?;
        self.value.clear();
        Ok(())
    }
}

impl<S: EventSink> StreamSink for BufferedSink<S> {
    fn on_key(&mut self, key: &[u8]) -> Result<(), SinkError> {
        let room = self.max_key_size.saturating_sub(self.key.len());
        if key.len() > room {
            log::trace!(target: "dissector::buffered", "key truncated at {} bytes", self.max_key_size);
        }
        self.key.extend_from_slice(&key[..key.len().min(room)]);
        Ok(())
    }

    fn on_value(&mut self, mut value: &[u8]) -> Result<(), SinkError> {
        while !value.is_empty() {
            let room = self.max_value_size - self.value.len();
            let take = value.len().min(room);
            self.value.extend_from_slice(&value[..take]);
            value = &value[take..];
            if self.value.len() == self.max_value_size {
                self.flush(self.flags)?;
                self.flags = self.flags.without(PairFlags::FIRST);
            }
        }
        Ok(())
    }

    fn on_done(&mut self) -> Result<(), SinkError> {
        let result = self.flush(self.flags | PairFlags::LAST);
        self.key.clear();
        self.value.clear();
        self.flags = PairFlags::FIRST;
        result
    }

    fn reset(&mut self) {
        self.key.clear();
        self.value.clear();
        self.flags = PairFlags::FIRST;
    }
}

impl<S: EventSink> EventSink for BufferedSink<S> {
    fn on_kv(
        &mut self,
        key: &[u8],
        value: &[u8],
        flags: PairFlags,
        depth: usize,
    ) -> Result<(), SinkError> {
        self.inner.on_kv(key, value, flags, depth)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::sink::Collector;

    fn sink(max_key_size: usize, max_value_size: usize) -> BufferedSink<Collector> {
        BufferedSink::new(
            Collector::new(),
            &Limits {
                max_key_size,
                max_value_size,
                ..Limits::default()
            },
        )
    }

    #[test]
    fn small_pair_is_one_call_with_both_flags() {
        let mut s = sink(16, 16);
        s.on_key(b"ke").unwrap();
        s.on_key(b"y").unwrap();
        s.on_value(b"va").unwrap();
        s.on_value(b"lue").unwrap();
        s.on_done().unwrap();
        let pairs = s.into_inner().into_pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].key, "key");
        assert_eq!(pairs[0].value, "value");
        assert_eq!(pairs[0].flags, PairFlags::BOTH);
    }

    #[test]
    fn key_is_truncated_at_cap() {
        let mut s = sink(4, 16);
        s.on_key(b"abc").unwrap();
        s.on_key(b"defgh").unwrap();
        s.on_done().unwrap();
        assert_eq!(s.inner().pairs()[0].key, "abcd");
    }

    #[test]
    fn value_flushes_at_cap_then_closes_empty() {
        let mut s = sink(16, 4);
        s.on_key(b"k").unwrap();
        s.on_value(b"abcdefgh").unwrap();
        s.on_done().unwrap();
        let pairs = s.into_inner().into_pairs();
        let shape: Vec<_> = pairs
            .iter()
            .map(|p| (p.value.to_string(), p.flags))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("abcd".to_string(), PairFlags::FIRST),
                ("efgh".to_string(), PairFlags::NONE),
                (String::new(), PairFlags::LAST),
            ]
        );
    }

    #[rstest]
    #[case::whole(&[b"0123456789".as_slice()])]
    #[case::bytes(&[b"0".as_slice(), b"1", b"2", b"3", b"4", b"5", b"6", b"7", b"8", b"9"])]
    #[case::uneven(&[b"012".as_slice(), b"34567", b"89"])]
    fn fragmentation_does_not_change_flushes(#[case] parts: &[&[u8]]) {
        let mut s = sink(16, 3);
        s.on_key(b"k").unwrap();
        for part in parts {
            s.on_value(part).unwrap();
        }
        s.on_done().unwrap();
        assert_eq!(s.inner().render(), "k=012\nk=345\nk=678\nk=9\n");
    }

    #[test]
    fn empty_key_is_flagged_unnamed() {
        let mut s = sink(16, 16);
        s.on_value(b"v").unwrap();
        s.on_done().unwrap();
        assert_eq!(s.inner().pairs()[0].flags, PairFlags::BOTH | PairFlags::UNNAMED);
    }

    #[test]
    fn reset_discards_partial_pair() {
        let mut s = sink(16, 16);
        s.on_key(b"stale").unwrap();
        s.on_value(b"junk").unwrap();
        s.reset();
        s.on_key(b"k").unwrap();
        s.on_done().unwrap();
        assert_eq!(s.inner().render(), "k=\n");
    }
}
