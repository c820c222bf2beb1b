//! Domain errors for table, index and query configuration.
//!
//! Library entry points return `anyhow::Result`; these variants travel inside
//! it so callers can `downcast_ref::<BincloneError>()` when they need to react
//! to a specific failure (e.g. a mismatched index).

/// Configuration and input errors raised by the fingerprint pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BincloneError
{
    /// Region window must cover at least one line
    #[error("invalid region window {0}: must be at least 1")]
    InvalidWindow(usize),

    /// Percentile must lie in (0, 1]
    #[error("invalid percentile {0}: must be in (0, 1]")]
    InvalidPercentile(f64),

    /// Bucket prefix does not fit the table or a u64
    #[error("invalid bucket size {sb_size} for a table of {table_len} symbols (need 1 <= sb_size <= 64 and sb_size < table size)")]
    InvalidBucketSize
    {
        sb_size: usize,
        table_len: usize,
    },

    /// Index was built under a different window/table/bucket configuration
    #[error("configuration mismatch on {field}: index has {index}, query uses {query}")]
    ConfigMismatch
    {
        field: &'static str,
        index: String,
        query: String,
    },

    /// Query stream cannot fill a single region window
    #[error("query stream has {lines} normalized lines, fewer than the region window of {window}")]
    QueryTooShort
    {
        lines: usize,
        window: usize,
    },

    /// Persisted table or index content is malformed
    #[error("malformed {what}: {reason}")]
    Format
    {
        what: &'static str,
        reason: String,
    },
}

impl BincloneError
{
    pub(crate) fn mismatch(
        field: &'static str,
        index: impl ToString,
        query: impl ToString,
    ) -> Self
    {
        Self::ConfigMismatch { field, index: index.to_string(), query: query.to_string() }
    }
}
