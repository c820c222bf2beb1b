//! Library entry points: `build_table`, `build_index`, `query`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::core::{
    error::BincloneError,
    index::SimilarityIndex,
    normalize::Normalizer,
    query::{QueryEngine, QueryOptions, QueryReport},
    segment::{SegmentMode, TokenStream},
    threshold::{self, ThresholdTable},
};

/// Region width, bucket width and threshold rank shared by build and query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintParams
{
    /// Lines per window (W)
    pub window: usize,

    /// Leading bits forming the bucket hash
    pub sb_size: usize,

    /// Order-statistic rank fraction for thresholds
    pub percentile: f64,
}

impl Default for FingerprintParams
{
    fn default() -> Self
    {
        Self { window: 60, sb_size: 16, percentile: 0.5 }
    }
}

impl FingerprintParams
{
    /// Window and percentile checks; bucket size needs the table and is checked there
    pub fn validate(&self) -> Result<(), BincloneError>
    {
        threshold::validate_params(self.window, self.percentile)
    }
}

/// Learn the threshold table from a corpus.
pub fn build_table(
    streams: &[TokenStream],
    params: &FingerprintParams,
) -> Result<ThresholdTable>
{
    ThresholdTable::build(streams, params.window, params.percentile)
}

/// Encode a corpus into a bucketed index stamped with the normalization rules.
#[instrument(skip_all, fields(streams = streams.len(), sb_size = params.sb_size))]
pub fn build_index(
    streams: &[TokenStream],
    table: &ThresholdTable,
    normalizer: &Normalizer,
    params: &FingerprintParams,
    segment: SegmentMode,
) -> Result<SimilarityIndex>
{
    let index = SimilarityIndex::build(streams, table, params.window, params.sb_size, segment)?;
    if index.is_degenerate()
    {
        warn!("index built from an empty threshold table; query results will be low confidence");
    }

    Ok(index.with_rules_id(normalizer.rules_id()))
}

/// Retrieve near-duplicates of the query stream's first window.
pub fn query(
    stream: &TokenStream,
    index: &SimilarityIndex,
    table: &ThresholdTable,
    normalizer: &Normalizer,
    opts: QueryOptions,
) -> Result<QueryReport>
{
    index.ensure_rules(&normalizer.rules_id())?;

    QueryEngine::new(index, table, opts)?.query(stream)
}
