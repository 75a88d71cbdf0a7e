//! Dotted key path built up while descending into nested documents.
//!
//! A path is a sequence of segments joined by `.`. Shallow, short paths live
//! entirely in an inline buffer with an inline table of segment end offsets,
//! so the common case never allocates. When a push would overflow either
//! inline capacity the content is copied to the heap; when pops shrink it
//! back under both capacities it returns to the inline form.
//!
//! The whole path is kept contiguous, so [`KeyPath::as_bytes`],
//! [`KeyPath::first`] and [`KeyPath::rest`] are plain subslices and cost
//! nothing to read after a mutation.

use alloc::vec::Vec;
use core::fmt;

use bstr::ByteSlice;

use crate::error::{Limit, ParseError};

const INLINE_BYTES: usize = 128;
const INLINE_SEGMENTS: usize = 16;
const SEPARATOR: u8 = b'.';

#[derive(Clone)]
enum Repr {
    Inline {
        bytes: [u8; INLINE_BYTES],
        len: usize,
        ends: [usize; INLINE_SEGMENTS],
        depth: usize,
    },
    Heap {
        bytes: Vec<u8>,
        ends: Vec<usize>,
    },
}

impl Repr {
    const EMPTY: Repr = Repr::Inline {
        bytes: [0; INLINE_BYTES],
        len: 0,
        ends: [0; INLINE_SEGMENTS],
        depth: 0,
    };

    fn bytes(&self) -> &[u8] {
        match self {
            Repr::Inline { bytes, len, .. } => &bytes[..*len],
            Repr::Heap { bytes, .. } => bytes,
        }
    }

    fn ends(&self) -> &[usize] {
        match self {
            Repr::Inline { ends, depth, .. } => &ends[..*depth],
            Repr::Heap { ends, .. } => ends,
        }
    }
}

/// Segmented key path with a non-allocating fast path.
#[derive(Clone)]
pub struct KeyPath {
    repr: Repr,
    max_depth: usize,
}

impl KeyPath {
    /// An empty path holding at most `max_depth` segments.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            repr: Repr::EMPTY,
            max_depth,
        }
    }

    /// Number of segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.repr.ends().len()
    }

    /// Whether the path has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Whether the path currently lives in the inline buffer.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self.repr, Repr::Inline { .. })
    }

    /// All segments joined by `.`.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.repr.bytes()
    }

    /// The first segment, or an empty slice.
    #[must_use]
    pub fn first(&self) -> &[u8] {
        match self.repr.ends().first() {
            Some(&end) => &self.repr.bytes()[..end],
            None => &[],
        }
    }

    /// Everything after the first segment and its separator.
    #[must_use]
    pub fn rest(&self) -> &[u8] {
        match self.repr.ends() {
            [first, _, ..] => &self.repr.bytes()[first + 1..],
            _ => &[],
        }
    }

    /// The last segment, or an empty slice.
    #[must_use]
    pub fn last(&self) -> &[u8] {
        let ends = self.repr.ends();
        match ends {
            [] => &[],
            [end] => &self.repr.bytes()[..*end],
            [.., prev, end] => &self.repr.bytes()[prev + 1..*end],
        }
    }

    /// Appends a segment.
    ///
    /// # Errors
    ///
    /// [`Limit::Depth`] if the path already holds `max_depth` segments.
    pub fn push(&mut self, segment: &[u8]) -> Result<(), ParseError> {
        let depth = self.depth();
        if depth >= self.max_depth {
            return Err(ParseError::ResourceLimitExceeded(Limit::Depth));
        }
        let sep = usize::from(depth > 0);
        let needed = self.repr.bytes().len() + sep + segment.len();

        if let Repr::Inline {
            bytes,
            len,
            ends,
            depth,
        } = &mut self.repr
        {
            if needed <= INLINE_BYTES && *depth < INLINE_SEGMENTS {
                if sep == 1 {
                    bytes[*len] = SEPARATOR;
                }
                bytes[*len + sep..needed].copy_from_slice(segment);
                *len = needed;
                ends[*depth] = needed;
                *depth += 1;
                return Ok(());
            }
            log::trace!(target: "dissector::key_path", "spilling key path to heap at depth {depth}");
            self.repr = Repr::Heap {
                bytes: self.repr.bytes().to_vec(),
                ends: self.repr.ends().to_vec(),
            };
        }

        if let Repr::Heap { bytes, ends } = &mut self.repr {
            if sep == 1 {
                bytes.push(SEPARATOR);
            }
            bytes.extend_from_slice(segment);
            ends.push(bytes.len());
        }
        Ok(())
    }

    /// Removes the last segment. Popping an empty path does nothing.
    pub fn pop(&mut self) {
        match &mut self.repr {
            Repr::Inline { len, depth, ends, .. } => {
                if *depth == 0 {
                    return;
                }
                *depth -= 1;
                *len = if *depth == 0 { 0 } else { ends[*depth - 1] };
            }
            Repr::Heap { bytes, ends } => {
                ends.pop();
                bytes.truncate(ends.last().copied().unwrap_or(0));
                if bytes.len() <= INLINE_BYTES && ends.len() <= INLINE_SEGMENTS {
                    let mut inline = Repr::EMPTY;
                    if let Repr::Inline {
                        bytes: ib,
                        len,
                        ends: ie,
                        depth,
                    } = &mut inline
                    {
                        ib[..bytes.len()].copy_from_slice(bytes);
                        *len = bytes.len();
                        ie[..ends.len()].copy_from_slice(ends);
                        *depth = ends.len();
                    }
                    self.repr = inline;
                }
            }
        }
    }

    /// Removes every segment, returning to the inline form.
    pub fn clear(&mut self) {
        self.repr = Repr::EMPTY;
    }
}

impl fmt::Debug for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPath")
            .field("path", &self.as_bytes().as_bstr())
            .field("depth", &self.depth())
            .field("inline", &self.is_inline())
            .finish()
    }
}

impl PartialEq for KeyPath {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes() && self.repr.ends() == other.repr.ends()
    }
}

impl Eq for KeyPath {}
