//! Helpers that cut a payload into chunks, for property tests and fuzzing.

use alloc::vec::Vec;

/// Split `payload` into approximately equal-sized chunks.
///
/// # Panics
///
/// Panics if `parts` is zero.
#[must_use]
pub fn produce_chunks(payload: &[u8], parts: usize) -> Vec<&[u8]> {
    assert!(parts > 0);
    let chunk_size = payload.len().div_ceil(parts).max(1);
    payload.chunks(chunk_size).collect()
}

/// Split `payload` at cut points derived from arbitrary numbers.
///
/// Each number picks the length of the next chunk (at least one byte) from
/// what is left; any remainder becomes the last chunk. Every chunk is
/// non-empty, so none of them closes a parser by accident.
#[must_use]
pub fn split_by<'a>(payload: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut rest = payload;
    for &cut in cuts {
        if rest.is_empty() {
            break;
        }
        let (head, tail) = rest.split_at(1 + cut % rest.len());
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}
