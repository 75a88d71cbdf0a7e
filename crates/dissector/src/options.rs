/// Bounds applied by the sinks and parsers of this crate.
///
/// Every parser receives a copy at construction and never allocates beyond
/// what these numbers allow (plus small constant overhead).
///
/// # Examples
///
/// ```rust
/// use dissector::Limits;
///
/// let limits = Limits {
///     max_depth: 16,
///     ..Default::default()
/// };
/// assert_eq!(limits.max_key_size, 64 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Limits {
    /// Maximum number of key bytes a [`BufferedSink`](crate::BufferedSink)
    /// keeps for one pair. Further key bytes are dropped silently.
    ///
    /// # Default
    ///
    /// `65536`
    pub max_key_size: usize,

    /// Maximum number of value bytes a [`BufferedSink`](crate::BufferedSink)
    /// holds before flushing a fragment downstream.
    ///
    /// Parsers that must see a whole document before they can report anything
    /// (GraphQL) refuse documents larger than this with
    /// [`Limit::ValueSize`](crate::Limit::ValueSize).
    ///
    /// # Default
    ///
    /// `65536`
    pub max_value_size: usize,

    /// Maximum structural nesting depth.
    ///
    /// Applies to key paths, container nesting and nested parser instances
    /// alike. Exceeding it fails the parser with
    /// [`Limit::Depth`](crate::Limit::Depth).
    ///
    /// # Default
    ///
    /// `64`
    pub max_depth: usize,

    /// Shortest printable run the binary/text splitter reports as text.
    ///
    /// # Default
    ///
    /// `10`
    pub min_text_run: usize,

    /// Maximum number of bytes a gzip stream may inflate to.
    ///
    /// # Default
    ///
    /// `16777216` (16 MiB)
    pub max_decompressed_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_key_size: 64 * 1024,
            max_value_size: 64 * 1024,
            max_depth: 64,
            min_text_run: 10,
            max_decompressed_size: 16 * 1024 * 1024,
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::Limits;

    #[test]
    fn partial_config_keeps_defaults() {
        let limits: Limits = serde_json::from_str(r#"{"max_depth": 8}"#).unwrap();
        assert_eq!(limits.max_depth, 8);
        assert_eq!(limits.max_value_size, Limits::default().max_value_size);
    }
}
