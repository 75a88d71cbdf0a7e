//! Byte-order-mark sniffing ahead of a text tokenizer.
//!
//! The first bytes of a document are held back until it is clear whether
//! they form a UTF-8 BOM. A complete BOM is dropped; a partial match is
//! handed back for normal processing together with the rest of the chunk.

const BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct BomSniffer {
    matched: usize,
    settled: bool,
}

impl BomSniffer {
    /// Splits a chunk into held-back bytes to replay first and the remainder
    /// to process.
    pub(crate) fn strip<'a>(&mut self, data: &'a [u8]) -> (&'static [u8], &'a [u8]) {
        if self.settled {
            return (&[], data);
        }
        for (i, &b) in data.iter().enumerate() {
            if b == BOM[self.matched] {
                self.matched += 1;
                if self.matched == BOM.len() {
                    self.settled = true;
                    return (&[], &data[i + 1..]);
                }
            } else {
                self.settled = true;
                return (&BOM[..self.matched], &data[i..]);
            }
        }
        (&[], &[])
    }

    /// End of input: anything still held back is ordinary data.
    pub(crate) fn finish(&mut self) -> &'static [u8] {
        if self.settled {
            return &[];
        }
        self.settled = true;
        &BOM[..self.matched]
    }
}
