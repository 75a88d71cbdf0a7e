//! Sink contracts between parsers and whatever consumes their pairs.
//!
//! Two shapes exist:
//!
//! * [`EventSink`] receives one call per complete (or flushed) pair. This is
//!   what attack matching consumes.
//! * [`StreamSink`] receives a key and a value as an arbitrary sequence of
//!   fragments, closed by [`StreamSink::on_done`]. Every parser in this crate
//!   writes to a `StreamSink`, so it never has to hold a whole value itself.
//!
//! [`BufferedSink`](crate::BufferedSink) turns the second shape into the
//! first. [`Collector`] is the simplest `EventSink`: it records every pair.

use alloc::{string::String, vec::Vec};
use core::{fmt, ops::BitOr};

use bstr::{BString, ByteSlice};

use crate::error::SinkError;

/// Per-pair flag bits handed to [`EventSink::on_kv`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PairFlags(u8);

impl PairFlags {
    /// No flag set: a middle fragment of a value larger than the value cap.
    pub const NONE: PairFlags = PairFlags(0);
    /// First fragment of a value.
    pub const FIRST: PairFlags = PairFlags(0x01);
    /// Last fragment of a value.
    pub const LAST: PairFlags = PairFlags(0x02);
    /// The complete value in a single call.
    pub const BOTH: PairFlags = PairFlags(0x03);
    /// The pair carries no key of its own.
    pub const UNNAMED: PairFlags = PairFlags(0x04);

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: PairFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub(crate) const fn without(self, other: PairFlags) -> PairFlags {
        PairFlags(self.0 & !other.0)
    }
}

impl BitOr for PairFlags {
    type Output = PairFlags;

    fn bitor(self, rhs: PairFlags) -> PairFlags {
        PairFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for PairFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (PairFlags::FIRST, "FIRST"),
            (PairFlags::LAST, "LAST"),
            (PairFlags::UNNAMED, "UNNAMED"),
        ];
        let mut wrote = false;
        for (flag, name) in names {
            if self.contains(flag) {
                if wrote {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                wrote = true;
            }
        }
        if !wrote {
            f.write_str("NONE")?;
        }
        Ok(())
    }
}

/// Consumer of complete key/value pairs.
pub trait EventSink {
    /// Receives one pair (or one capped fragment of a long value).
    ///
    /// `depth` is the recursion level of the parser that produced the pair:
    /// zero for a top-level body, one for a value dissected out of it, and so
    /// on.
    ///
    /// # Errors
    ///
    /// Any error aborts the producing parser.
    fn on_kv(
        &mut self,
        key: &[u8],
        value: &[u8],
        flags: PairFlags,
        depth: usize,
    ) -> Result<(), SinkError>;
}

/// Consumer of pairs delivered as key and value fragments.
pub trait StreamSink {
    /// Appends bytes to the key of the pair under construction.
    ///
    /// # Errors
    ///
    /// Any error aborts the producing parser.
    fn on_key(&mut self, key: &[u8]) -> Result<(), SinkError>;

    /// Appends bytes to the value of the pair under construction.
    ///
    /// # Errors
    ///
    /// Any error aborts the producing parser.
    fn on_value(&mut self, value: &[u8]) -> Result<(), SinkError>;

    /// Completes the pair under construction and clears it.
    ///
    /// # Errors
    ///
    /// Any error aborts the producing parser.
    fn on_done(&mut self) -> Result<(), SinkError>;

    /// Discards a partially built pair.
    fn reset(&mut self);
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn on_kv(
        &mut self,
        key: &[u8],
        value: &[u8],
        flags: PairFlags,
        depth: usize,
    ) -> Result<(), SinkError> {
        (**self).on_kv(key, value, flags, depth)
    }
}

impl<T: StreamSink + ?Sized> StreamSink for &mut T {
    fn on_key(&mut self, key: &[u8]) -> Result<(), SinkError> {
        (**self).on_key(key)
    }

    fn on_value(&mut self, value: &[u8]) -> Result<(), SinkError> {
        (**self).on_value(value)
    }

    fn on_done(&mut self) -> Result<(), SinkError> {
        (**self).on_done()
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Sends one whole pair through a stream sink.
pub(crate) fn emit_pair<S: StreamSink + ?Sized>(
    sink: &mut S,
    key: &[u8],
    value: &[u8],
) -> Result<(), SinkError> {
    sink.on_key(key)?;
    if !value.is_empty() {
        sink.on_value(value)?;
    }
    sink.on_done()
}

/// A pair as recorded by [`Collector`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Pair {
    /// Key bytes.
    pub key: BString,
    /// Value bytes.
    pub value: BString,
    /// Flags the pair was delivered with.
    pub flags: PairFlags,
    /// Recursion level of the producing parser.
    pub depth: usize,
}

impl fmt::Debug for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:?}, {:?}, {:?}, {})",
            self.key, self.value, self.flags, self.depth
        )
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key.as_bstr(), self.value.as_bstr())
    }
}

/// An [`EventSink`] that records every pair it is given.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Collector {
    pairs: Vec<Pair>,
}

impl Collector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pair received so far, in arrival order.
    #[must_use]
    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    /// Consumes the collector, returning its pairs.
    #[must_use]
    pub fn into_pairs(self) -> Vec<Pair> {
        self.pairs
    }

    /// Forgets every pair received so far.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Received pairs as `(key, value)` tuples of lossily decoded text.
    #[must_use]
    pub fn kv_strings(&self) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .map(|p| (p.key.to_str_lossy().into_owned(), p.value.to_str_lossy().into_owned()))
            .collect()
    }

    /// One `key=value` line per pair.
    #[must_use]
    pub fn render(&self) -> String {
        use core::fmt::Write;

        let mut out = String::new();
        for pair in &self.pairs {
            let _ = writeln!(out, "{pair}");
        }
        out
    }
}

impl EventSink for Collector {
    fn on_kv(
        &mut self,
        key: &[u8],
        value: &[u8],
        flags: PairFlags,
        depth: usize,
    ) -> Result<(), SinkError> {
        self.pairs.push(Pair {
            key: BString::from(key),
            value: BString::from(value),
            flags,
            depth,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_compose() {
        assert_eq!(PairFlags::FIRST | PairFlags::LAST, PairFlags::BOTH);
        assert!(PairFlags::BOTH.contains(PairFlags::FIRST));
        assert!(!PairFlags::FIRST.contains(PairFlags::LAST));
        assert_eq!(PairFlags::BOTH.without(PairFlags::FIRST), PairFlags::LAST);
        assert_eq!(format!("{:?}", PairFlags::BOTH | PairFlags::UNNAMED), "FIRST|LAST|UNNAMED");
        assert_eq!(format!("{:?}", PairFlags::NONE), "NONE");
    }

    #[test]
    fn collector_renders_lines() {
        let mut c = Collector::new();
        c.on_kv(b"a", b"1", PairFlags::BOTH, 0).unwrap();
        c.on_kv(b"b.c", b"x y", PairFlags::BOTH, 1).unwrap();
        assert_eq!(c.render(), "a=1\nb.c=x y\n");
        assert_eq!(c.pairs()[1].depth, 1);
    }
}
