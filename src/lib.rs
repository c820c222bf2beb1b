//! **binclone** - Near-duplicate region detection for disassembly listings
//!
//! Listings are normalized into token streams, sliced into fixed-height
//! windows and reduced to per-symbol frequency bit vectors against a
//! corpus-learned threshold table. A bucketed index over those vectors
//! answers "which regions look like this one" by Hamming similarity.

/// Command-line interface with clap integration
pub mod cli;

/// Command handlers (progress, colored status, table/JSON output)
pub mod cli_ext {
    pub mod commands;
}

/// Fingerprint pipeline: normalize → segment → window → threshold → encode → index → query
pub mod core {
    /// Domain error enum carried inside `anyhow::Error`
    pub mod error;
    pub use error::BincloneError;

    /// Rule-based operand classification and synonym collapsing
    pub mod normalize;
    pub use normalize::{ListingDialect, NormalizationRules, NormalizedLine, Normalizer};

    /// Whole-file and per-function stream segmentation
    pub mod segment;
    pub use segment::{SegmentMode, Segmenter, StreamId, TokenStream, segmenter_for};

    /// Incremental sliding-window token counts
    pub mod window;
    pub use window::{FrequencyCount, Window, first_window, windows};

    /// Corpus-learned per-symbol thresholds
    pub mod threshold;
    pub use threshold::ThresholdTable;

    /// Bit vectors, bucket hashes and arbitrary-width full vectors
    pub mod fingerprint;
    pub use fingerprint::{BitVector, Encoder, Fingerprint, FullVector, similarity};

    /// Bucketed similarity index with JSONL persistence
    pub mod index;
    pub use index::{IndexHandle, IndexRecord, SimilarityIndex};

    /// Bucket lookup, ranking and contiguous grouping
    pub mod query;
    pub use query::{Match, MatchGroup, QueryEngine, QueryOptions, QueryReport};

    /// Parallel listing loading
    pub mod corpus;
    pub use corpus::CorpusLoader;

    /// `build_table` / `build_index` / `query` entry points
    pub mod pipeline;
    pub use pipeline::{FingerprintParams, build_index, build_table, query};
}

/// Infrastructure - Configuration, I/O, and corpus discovery
pub mod infra {
    /// Layered configuration (file + environment) with TOML defaults
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Memory-mapped file I/O for large files (>1MB threshold)
    pub mod io;
    pub use io::{FileContent, read_file_smart};

    /// Gitignore-aware corpus walking with include/ignore globs
    pub mod walk;
    pub use walk::FileWalker;
}

// Strategic re-exports for library consumers
pub use cli::{AppContext, Cli, Commands};
pub use core::{
    BincloneError, FingerprintParams, NormalizationRules, Normalizer, QueryOptions, QueryReport, SimilarityIndex,
    ThresholdTable, TokenStream, build_index, build_table, query,
};
pub use infra::{Config, FileWalker, load_config};
