//! `%XX` decoding as a resumable two-stage machine, and the character
//! references shared by the markup parsers.

use alloc::vec::Vec;

use bstr::ByteSlice;

/// Byte substituted for any escape that decodes to NUL.
pub(crate) const NUL_SUBSTITUTE: u8 = b'@';

pub(crate) fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodes the body of `&...;`. `None` for unknown names and bad numbers.
pub(crate) fn decode_reference(body: &[u8], out: &mut Vec<u8>) -> Option<()> {
    let code = match body {
        b"lt" => u32::from(b'<'),
        b"gt" => u32::from(b'>'),
        b"amp" => u32::from(b'&'),
        b"quot" => u32::from(b'"'),
        b"apos" => u32::from(b'\''),
        [b'#', b'x' | b'X', hex @ ..] if !hex.is_empty() => {
            u32::from_str_radix(hex.to_str().ok()?, 16).ok()?
        }
        [b'#', dec @ ..] if !dec.is_empty() => dec.to_str().ok()?.parse().ok()?,
        _ => return None,
    };
    if code == 0 {
        out.push(NUL_SUBSTITUTE);
        return Some(());
    }
    let c = char::from_u32(code)?;
    let mut buf = [0; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    Some(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Idle,
    /// Seen `%`.
    Percent,
    /// Seen `%` and one hex digit.
    High(u8),
}

/// Percent-escape decoder whose partial state survives chunk boundaries.
///
/// Invalid escapes are passed through literally: `%zz` decodes to `%zz` and a
/// `%` at end of input stays `%`. In `%%41` the first `%` is literal and the
/// second starts a new escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct PercentDecoder {
    stage: Stage,
}

impl PercentDecoder {
    pub(crate) fn begin(&mut self) {
        self.stage = Stage::Percent;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.stage != Stage::Idle
    }

    /// Feeds the byte after a `%` (or after `%h`).
    ///
    /// Returns `false` when `b` did not belong to the escape; the literal
    /// prefix has then been written to `out` and the caller must process `b`
    /// itself.
    pub(crate) fn step(&mut self, b: u8, out: &mut Vec<u8>) -> bool {
        match self.stage {
            Stage::Idle => false,
            Stage::Percent => {
                if hex_value(b).is_some() {
                    self.stage = Stage::High(b);
                    true
                } else if b == b'%' {
                    out.push(b'%');
                    true
                } else {
                    out.push(b'%');
                    self.stage = Stage::Idle;
                    false
                }
            }
            Stage::High(high) => {
                self.stage = Stage::Idle;
                match (hex_value(high), hex_value(b)) {
                    (Some(h), Some(l)) => {
                        let byte = (h << 4) | l;
                        out.push(if byte == 0 { NUL_SUBSTITUTE } else { byte });
                        true
                    }
                    _ => {
                        out.extend_from_slice(&[b'%', high]);
                        false
                    }
                }
            }
        }
    }

    /// Writes out an unfinished escape literally and returns to idle.
    pub(crate) fn flush(&mut self, out: &mut Vec<u8>) {
        match core::mem::take(&mut self.stage) {
            Stage::Idle => {}
            Stage::Percent => out.push(b'%'),
            Stage::High(high) => out.extend_from_slice(&[b'%', high]),
        }
    }
}
