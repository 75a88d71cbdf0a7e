use core::fmt;

use alloc::{boxed::Box, string::String};

use thiserror::Error;

/// The bounded resource a parser ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limit {
    /// Structural nesting exceeded [`Limits::max_depth`](crate::Limits::max_depth).
    Depth,
    /// A buffered document or token exceeded
    /// [`Limits::max_value_size`](crate::Limits::max_value_size).
    ValueSize,
    /// Decompressed output exceeded
    /// [`Limits::max_decompressed_size`](crate::Limits::max_decompressed_size).
    DecompressedSize,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Limit::Depth => "maximum nesting depth",
            Limit::ValueSize => "maximum buffered size",
            Limit::DecompressedSize => "maximum decompressed size",
        })
    }
}

/// Failure reported by a downstream sink.
///
/// Returning it from any sink method aborts the current `push` of the parser
/// feeding that sink, which then stays in its error state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink declined the pair.
    #[error("{0}")]
    Refused(String),
    /// A parser fed from the sink failed; see [`ValuePipe`](crate::ValuePipe).
    #[error("nested parser: {0}")]
    Nested(Box<ParseError>),
}

impl SinkError {
    /// Builds a refusal from anything that renders as a message.
    pub fn new(message: impl Into<String>) -> Self {
        SinkError::Refused(message.into())
    }

    /// The nested parser's own error, if this failure came from one.
    #[must_use]
    pub fn nested(&self) -> Option<&ParseError> {
        match self {
            SinkError::Refused(_) => None,
            SinkError::Nested(err) => Some(err),
        }
    }
}

/// Why a parser stopped.
///
/// Once a parser returns one of these it is terminal: every later `push`
/// returns a clone of the same error without consuming input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The input violates the grammar of the format.
    #[error("{parser}: malformed input: {reason}")]
    MalformedSyntax {
        /// Name of the failing parser.
        parser: &'static str,
        /// Short description of the violation.
        reason: &'static str,
    },
    /// A length-prefixed field disagrees with its actual content.
    #[error("length mismatch: declared {expected}, found {actual}")]
    LengthMismatch {
        /// Declared length or count.
        expected: usize,
        /// Length or count actually present.
        actual: usize,
    },
    /// A configured bound was hit.
    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(Limit),
    /// The sink refused a key, value or completion callback.
    #[error("downstream sink failure: {0}")]
    DownstreamSinkFailure(#[from] SinkError),
    /// A state the parser should never reach.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl ParseError {
    /// The innermost error behind any chain of nested parser failures.
    ///
    /// ```
    /// use dissector::{Limit, ParseError, SinkError};
    ///
    /// let inner = ParseError::ResourceLimitExceeded(Limit::Depth);
    /// let outer = ParseError::DownstreamSinkFailure(SinkError::Nested(Box::new(inner.clone())));
    /// assert_eq!(outer.root_cause(), &inner);
    /// ```
    #[must_use]
    pub fn root_cause(&self) -> &ParseError {
        let mut err = self;
        while let ParseError::DownstreamSinkFailure(SinkError::Nested(inner)) = err {
            err = inner;
        }
        err
    }

    pub(crate) fn syntax(parser: &'static str, reason: &'static str) -> Self {
        ParseError::MalformedSyntax { parser, reason }
    }
}
