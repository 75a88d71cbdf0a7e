//! The push/finish contract shared by every format parser.
//!
//! A parser is created once per body (or per nested value), fed any number of
//! non-empty chunks through [`Parser::push`] and closed exactly once with
//! [`Parser::finish`], which is the same as pushing an empty chunk. Output is
//! a function of the concatenated input only: splitting it differently never
//! changes the pairs the sink receives.
//!
//! Failures are terminal. The first error is stored and handed back, cloned,
//! on every later call; no input is consumed after it.

use crate::error::ParseError;

/// Incremental, chunk-invariant parser.
pub trait Parser {
    /// Feeds the next chunk. An empty chunk closes the input.
    ///
    /// Returns the number of bytes consumed, which is all of them unless the
    /// call fails. After a successful close every further call is ignored and
    /// consumes nothing.
    ///
    /// # Errors
    ///
    /// The stored terminal error, or a new one raised by this chunk.
    fn push(&mut self, data: &[u8]) -> Result<usize, ParseError>;

    /// Closes the input and flushes whatever the format allows.
    ///
    /// # Errors
    ///
    /// Truncated input is a syntax error for most formats; see each parser.
    fn finish(&mut self) -> Result<(), ParseError> {
        self.push(&[]).map(|_| ())
    }

    /// Short stable name, used in errors and logs.
    fn name(&self) -> &str;

    /// Whether the parser is in its terminal error state.
    fn error(&self) -> bool;

    /// Recursion level this instance was created at.
    fn depth(&self) -> usize;
}

/// Lifecycle of a parser instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum Status {
    #[default]
    Active,
    Finished,
    Failed(ParseError),
}

impl Status {
    pub(crate) fn is_failed(&self) -> bool {
        matches!(self, Status::Failed(_))
    }
}

/// The part of a parser that differs per format. [`drive`] wraps it with the
/// shared lifecycle bookkeeping.
pub(crate) trait Machine {
    const NAME: &'static str;

    fn status(&mut self) -> &mut Status;

    /// Consumes one non-empty chunk.
    fn feed(&mut self, data: &[u8]) -> Result<(), ParseError>;

    /// Handles end of input.
    fn end(&mut self) -> Result<(), ParseError>;
}

pub(crate) fn drive<M: Machine>(machine: &mut M, data: &[u8]) -> Result<usize, ParseError> {
    match machine.status() {
        Status::Failed(err) => return Err(err.clone()),
        Status::Finished => {
            log::debug!(target: "dissector", "{}: input after finish ignored", M::NAME);
            return Ok(0);
        }
        Status::Active => {}
    }

    let outcome = if data.is_empty() {
        machine.end().map(|()| 0)
    } else {
        machine.feed(data).map(|()| data.len())
    };

    match outcome {
        Ok(consumed) => {
            if data.is_empty() {
                *machine.status() = Status::Finished;
            }
            Ok(consumed)
        }
        Err(err) => {
            log::debug!(target: "dissector", "{}: {err}", M::NAME);
            *machine.status() = Status::Failed(err.clone());
            Err(err)
        }
    }
}

/// Implements [`Parser`] for a [`Machine`] that stores its recursion level in
/// a `depth` field and its lifecycle in a `status` field.
macro_rules! impl_parser {
    ($ty:ident < $($gen:ident : $bound:path),* >) => {
        impl<$($gen: $bound),*> $crate::parser::Parser for $ty<$($gen),*> {
            fn push(&mut self, data: &[u8]) -> Result<usize, $crate::error::ParseError> {
                $crate::parser::drive(self, data)
            }

            fn name(&self) -> &str {
                <Self as $crate::parser::Machine>::NAME
            }

            fn error(&self) -> bool {
                self.status.is_failed()
            }

            fn depth(&self) -> usize {
                self.depth
            }
        }
    };
}

pub(crate) use impl_parser;
