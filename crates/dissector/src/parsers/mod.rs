//! One incremental parser per body format.
//!
//! Every parser is created with the sink it reports to, the [`Limits`] it
//! enforces and the recursion level it runs at, and implements
//! [`Parser`](crate::Parser).
//!
//! [`Limits`]: crate::Limits

pub(crate) mod decode;
pub(crate) mod literal;
pub(crate) mod prefix;
pub(crate) mod text;

pub mod benign;
pub mod binary;
pub mod confluence;
pub mod delimited;
pub mod graphql;
pub mod gzip;
pub mod html;
pub mod json;
pub mod multipart;
pub mod percent;
pub mod php;
pub mod screened_json;
pub mod trailer;
pub mod xml;

pub use benign::{KnownBenignParser, KnownSource, TAIL_LOOKUP, detect_known_source};
pub use binary::BinaryParser;
pub use confluence::ConfluenceParser;
pub use delimited::{DelimitedOptions, DelimitedParser, KeyMode};
pub use graphql::GraphqlParser;
pub use gzip::GzipParser;
pub use html::HtmlParser;
pub use json::JsonParser;
pub use multipart::MultipartParser;
pub use percent::PercentParser;
pub use php::PhpParser;
pub use screened_json::ScreenedJsonParser;
pub use trailer::{
    Encoding, FileKind, MAX_HEADER_LOOKUP, MIN_HEADER_LOOKUP, TrailerParser,
    detect_base64_file_kind, detect_file_kind,
};
pub use xml::{ENTITY_MARKER, XmlParser};
