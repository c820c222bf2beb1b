//! Query path: first window → fingerprint → bucket lookup → rank → group.
//!
//! Similarity is `1 - hamming / N` with `N` the full vector length (the
//! threshold table size), so scores are comparable across bucket widths.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::{
    error::BincloneError,
    fingerprint::{Encoder, similarity},
    index::{IndexRecord, SimilarityIndex},
    segment::{StreamId, TokenStream},
    threshold::ThresholdTable,
    window::first_window,
};

/// Query-time knobs; `sb_size` must equal the index's
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions
{
    pub sb_size: usize,

    /// Keep at most this many ranked matches
    pub limit: Option<usize>,

    /// Drop candidates scoring below this
    pub min_similarity: f64,
}

impl QueryOptions
{
    pub fn new(sb_size: usize) -> Self
    {
        Self { sb_size, limit: None, min_similarity: 0.0 }
    }

    pub fn with_limit(
        mut self,
        limit: Option<usize>,
    ) -> Self
    {
        self.limit = limit;
        self
    }

    pub fn with_min_similarity(
        mut self,
        min: f64,
    ) -> Self
    {
        self.min_similarity = min;
        self
    }
}

/// One ranked candidate window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match
{
    pub source: PathBuf,
    pub function: Option<String>,
    pub start_line: usize,
    pub offset: usize,

    /// Listing line of the matched window
    pub line: usize,

    /// Differing bits against the query vector
    pub distance: u32,
    pub similarity: f64,
}

/// Run of candidates with consecutive offsets in one stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchGroup
{
    pub source: PathBuf,
    pub function: Option<String>,
    pub start_line: usize,
    pub first_offset: usize,
    pub last_offset: usize,
    pub best_similarity: f64,
}

impl Match
{
    pub fn stream_id(&self) -> StreamId
    {
        StreamId { source: self.source.clone(), function: self.function.clone(), start_line: self.start_line }
    }
}

impl MatchGroup
{
    pub fn stream_id(&self) -> StreamId
    {
        StreamId { source: self.source.clone(), function: self.function.clone(), start_line: self.start_line }
    }

    pub fn windows(&self) -> usize
    {
        self.last_offset - self.first_offset + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport
{
    /// Query stream identity
    pub query: String,
    pub bucket: u64,

    /// Normalizing constant N (full vector length)
    pub bits: usize,

    /// Bucket size before filtering
    pub candidates: usize,
    pub matches: Vec<Match>,

    /// Contiguous regions over all retained candidates; fewer means a tighter hit
    pub groups: Vec<MatchGroup>,

    /// Set when the index carries no discriminative bits
    pub low_confidence: bool,
}

impl QueryReport
{
    pub fn group_count(&self) -> usize
    {
        self.groups
            .len()
    }
}

/// Read-only query executor over one index/table pair
#[derive(Debug)]
pub struct QueryEngine<'a>
{
    index: &'a SimilarityIndex,
    encoder: Option<Encoder<'a>>,
    bits: usize,
    opts: QueryOptions,
}

impl<'a> QueryEngine<'a>
{
    /// Reject tables, windows or bucket widths the index was not built with.
    pub fn new(
        index: &'a SimilarityIndex,
        table: &'a ThresholdTable,
        opts: QueryOptions,
    ) -> Result<Self>
    {
        index.ensure_compatible(table, opts.sb_size)?;

        let encoder = if index.is_degenerate() { None } else { Some(Encoder::new(table, opts.sb_size)?) };

        Ok(Self { index, encoder, bits: table.len(), opts })
    }

    /// Match the query stream's first window against the index.
    #[instrument(skip(self, stream), fields(query = %stream.id))]
    pub fn query(
        &self,
        stream: &TokenStream,
    ) -> Result<QueryReport>
    {
        let window = self
            .index
            .header()
            .window;

        let first = first_window(stream, window)
            .ok_or(BincloneError::QueryTooShort { lines: stream.len(), window })?;

        let Some(encoder) = &self.encoder
        else
        {
            return Ok(QueryReport {
                query: stream
                    .id
                    .to_string(),
                bucket: 0,
                bits: 0,
                candidates: 0,
                matches: Vec::new(),
                groups: Vec::new(),
                low_confidence: true,
            });
        };

        let fp = encoder.encode(&first.counts);
        let candidates = self
            .index
            .lookup(fp.bucket);
        debug!(bucket = fp.bucket, candidates = candidates.len(), "bucket lookup");

        let mut matches: Vec<Match> = candidates
            .iter()
            .map(|r| {
                let distance = r
                    .full_vector
                    .hamming(&fp.full);
                to_match(r, distance, similarity(&r.full_vector, &fp.full, self.bits))
            })
            .filter(|m| m.similarity >= self.opts.min_similarity)
            .collect();

        // Candidates arrive in (stream, offset) order, which grouping relies on
        let groups = group_contiguous(&matches);

        rank(&mut matches);
        if let Some(limit) = self.opts.limit
        {
            matches.truncate(limit);
        }

        Ok(QueryReport {
            query: stream
                .id
                .to_string(),
            bucket: fp.bucket,
            bits: self.bits,
            candidates: candidates.len(),
            matches,
            groups,
            low_confidence: false,
        })
    }
}

fn to_match(
    r: &IndexRecord,
    distance: u32,
    similarity: f64,
) -> Match
{
    Match {
        source: r
            .source
            .clone(),
        function: r
            .function
            .clone(),
        start_line: r.start_line,
        offset: r.offset,
        line: r.line,
        distance,
        similarity,
    }
}

/// Similarity descending, ties by (stream id, offset) ascending
fn rank(matches: &mut [Match])
{
    matches.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| {
                (&a.source, &a.function, a.start_line, a.offset).cmp(&(&b.source, &b.function, b.start_line, b.offset))
            })
    });
}

/// Merge offsets that step by exactly one within the same stream
fn group_contiguous(ordered: &[Match]) -> Vec<MatchGroup>
{
    let mut groups: Vec<MatchGroup> = Vec::new();

    for m in ordered
    {
        if let Some(g) = groups.last_mut()
            && g.source == m.source
            && g.function == m.function
            && g.start_line == m.start_line
            && m.offset == g.last_offset + 1
        {
            g.last_offset = m.offset;
            g.best_similarity = g
                .best_similarity
                .max(m.similarity);
            continue;
        }

        groups.push(MatchGroup {
            source: m
                .source
                .clone(),
            function: m
                .function
                .clone(),
            start_line: m.start_line,
            first_offset: m.offset,
            last_offset: m.offset,
            best_similarity: m.similarity,
        });
    }

    groups
}
