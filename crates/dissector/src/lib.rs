//! Streaming dissection of untrusted request bodies into `(key, value)` pairs.
//!
//! Each supported body format has an incremental parser that accepts input
//! in chunks of any size, cut anywhere, and reports the same ordered pairs no
//! matter how the input was split. Parsers never recurse per nesting level;
//! depth, buffer sizes and decompressed size are bounded by [`Limits`].
//!
//! ```
//! use dissector::{BufferedSink, Collector, Limits, Parser, parsers::JsonParser};
//!
//! let limits = Limits::default();
//! let mut parser = JsonParser::new(BufferedSink::new(Collector::new(), &limits), &limits, 0);
//! parser.push(br#"{"user": {"name": "ad"#).unwrap();
//! parser.push(br#"min", "roles": ["a", "b"]}}"#).unwrap();
//! parser.finish().unwrap();
//!
//! let pairs = parser.into_sink().into_inner();
//! assert_eq!(pairs.render(), "user.name=admin\nuser.roles=a\nuser.roles=b\n");
//! ```
//!
//! Pairs flow into a [`StreamSink`] as key and value fragments;
//! [`BufferedSink`] assembles them into capped [`EventSink`] calls.
//! [`ParserKind`] and [`AnyParser`] pick a format at run time and
//! [`ValuePipe`] dissects a value with a nested parser.

extern crate alloc;

mod buffered;
mod compose;
mod error;
mod key_path;
mod options;
mod parser;
mod sink;

pub mod parsers;

#[cfg(any(test, feature = "fuzzing"))]
pub mod chunk_utils;

#[cfg(test)]
mod tests;

pub use buffered::BufferedSink;
pub use compose::{AnyParser, Buffered, ParserKind, ValuePipe};
pub use error::{Limit, ParseError, SinkError};
pub use key_path::KeyPath;
pub use options::Limits;
pub use parser::Parser;
pub use sink::{Collector, EventSink, Pair, PairFlags, StreamSink};
