/// What happened after feeding one more byte into the literal matcher?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Byte matched, but the literal is not finished yet.
    NeedMore,
    /// Byte matched *and* was the last one; carries the full literal text.
    Done(&'static [u8]),
    /// Byte did **not** match the expected one.
    Reject,
}

/// `None`  ➜  we are **not** in the middle of a literal
/// `Some`  ➜  `(remaining_bytes, full_literal)` while matching
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub(crate) struct LiteralMatcher(Option<(&'static [u8], &'static [u8])>);

impl LiteralMatcher {
    /// Start matching after the *first* byte (`n`, `t`, or `f`).
    pub(crate) fn start(first: u8) -> Option<Self> {
        let full: &'static [u8] = match first {
            b'n' => b"null",
            b't' => b"true",
            b'f' => b"false",
            _ => return None,
        };
        Some(LiteralMatcher(Some((&full[1..], full))))
    }

    /// Give the matcher the next input byte and learn what to do next.
    pub(crate) fn step(&mut self, b: u8) -> Step {
        let Some((remaining, full)) = self.0.take() else {
            return Step::Reject;
        };
        match remaining.split_first() {
            Some((&expected, rest)) if expected == b => {
                if rest.is_empty() {
                    Step::Done(full)
                } else {
                    self.0 = Some((rest, full));
                    Step::NeedMore
                }
            }
            _ => {
                self.0 = Some((remaining, full));
                Step::Reject
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LiteralMatcher, Step};

    #[test]
    fn matches_true() {
        let mut m = LiteralMatcher::start(b't').unwrap();
        assert_eq!(m.step(b'r'), Step::NeedMore);
        assert_eq!(m.step(b'u'), Step::NeedMore);
        assert_eq!(m.step(b'e'), Step::Done(b"true"));
    }

    #[test]
    fn rejects_mismatch_and_unknown_start() {
        let mut m = LiteralMatcher::start(b'n').unwrap();
        assert_eq!(m.step(b'o'), Step::Reject);
        assert!(LiteralMatcher::start(b'x').is_none());
    }
}
