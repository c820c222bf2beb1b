//! Append-only multimap from bucket hash to window records.
//!
//! Built in one pass over every corpus window, then read-only. A rebuild
//! produces a fresh index; [`IndexHandle`] swaps the shared reference so
//! in-flight queries keep the snapshot they started with.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::{
    error::BincloneError,
    fingerprint::{Encoder, FullVector},
    segment::{SegmentMode, StreamId, TokenStream},
    threshold::ThresholdTable,
    window::windows,
};

/// One indexed window; never mutated after build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord
{
    /// Listing the window came from
    pub source: PathBuf,

    /// Function name for per-function streams
    pub function: Option<String>,

    /// Listing line where the owning stream starts
    pub start_line: usize,

    /// Window offset within the stream
    pub offset: usize,

    /// Listing line of the window's first instruction
    pub line: usize,

    pub bucket_hash: u64,
    pub full_vector: FullVector,
}

impl IndexRecord
{
    pub fn stream_id(&self) -> StreamId
    {
        StreamId { source: self.source.clone(), function: self.function.clone(), start_line: self.start_line }
    }

    /// Deterministic (stream id, offset) ordering key
    fn sort_key(&self) -> (&Path, Option<&str>, usize, usize)
    {
        (self.source.as_path(), self.function.as_deref(), self.start_line, self.offset)
    }
}

/// Configuration the index was built under; checked by every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHeader
{
    pub window: usize,
    pub sb_size: usize,
    pub table_id: String,
    pub table_len: usize,
    pub segment: SegmentMode,

    /// Built from an empty table: no discriminative bits, results are low confidence
    pub degenerate: bool,
    pub records: usize,

    /// Normalization rules identity the corpus was tokenized with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SimilarityIndex
{
    header: IndexHeader,
    buckets: HashMap<u64, Vec<IndexRecord>>,
}

impl SimilarityIndex
{
    /// Encode every window of every stream and bucket the records.
    #[instrument(skip(streams, table), fields(streams = streams.len(), table = %table.id()))]
    pub fn build(
        streams: &[TokenStream],
        table: &ThresholdTable,
        window: usize,
        sb_size: usize,
        segment: SegmentMode,
    ) -> Result<Self>
    {
        if window != table.window()
        {
            return Err(BincloneError::mismatch("window", table.window(), window).into());
        }

        let mut header = IndexHeader {
            window,
            sb_size,
            table_id: table.id(),
            table_len: table.len(),
            segment,
            degenerate: false,
            records: 0,
            rules_id: None,
        };

        if table.is_empty()
        {
            warn!("threshold table is empty; index is degenerate and every match is low confidence");
            header.degenerate = true;
            return Ok(Self { header, buckets: HashMap::new() });
        }

        let encoder = Encoder::new(table, sb_size)?;

        let per_stream: Vec<Vec<IndexRecord>> = streams
            .par_iter()
            .map(|stream| {
                windows(stream, window)
                    .map(|w| {
                        let fp = encoder.encode(&w.counts);
                        IndexRecord {
                            source: stream
                                .id
                                .source
                                .clone(),
                            function: stream
                                .id
                                .function
                                .clone(),
                            start_line: stream
                                .id
                                .start_line,
                            offset: w.offset,
                            line: stream.lines[w.offset].line,
                            bucket_hash: fp.bucket,
                            full_vector: fp.full,
                        }
                    })
                    .collect()
            })
            .collect();

        let index = Self::from_records(
            header,
            per_stream
                .into_iter()
                .flatten(),
        );

        info!(
            records = index.len(),
            buckets = index.bucket_count(),
            "similarity index built"
        );

        Ok(index)
    }

    /// Bucket records and fix their order; header record count is recomputed.
    fn from_records(
        mut header: IndexHeader,
        records: impl IntoIterator<Item = IndexRecord>,
    ) -> Self
    {
        let mut buckets: HashMap<u64, Vec<IndexRecord>> = HashMap::new();
        let mut n = 0;
        for r in records
        {
            buckets
                .entry(r.bucket_hash)
                .or_default()
                .push(r);
            n += 1;
        }

        for list in buckets.values_mut()
        {
            list.sort_by(|a, b| {
                a.sort_key()
                    .cmp(&b.sort_key())
            });
        }

        header.records = n;
        Self { header, buckets }
    }

    pub fn header(&self) -> &IndexHeader
    {
        &self.header
    }

    pub fn is_degenerate(&self) -> bool
    {
        self.header
            .degenerate
    }

    /// Exact-key bucket retrieval
    pub fn lookup(
        &self,
        bucket: u64,
    ) -> &[IndexRecord]
    {
        self.buckets
            .get(&bucket)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize
    {
        self.header
            .records
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    pub fn bucket_count(&self) -> usize
    {
        self.buckets
            .len()
    }

    /// Record the normalization rules the corpus streams were produced with
    pub fn with_rules_id(
        mut self,
        rules_id: String,
    ) -> Self
    {
        self.header.rules_id = Some(rules_id);
        self
    }

    /// Unstamped indexes accept any rules
    pub fn ensure_rules(
        &self,
        rules_id: &str,
    ) -> Result<(), BincloneError>
    {
        match &self.header.rules_id
        {
            Some(id) if id != rules_id => Err(BincloneError::mismatch("normalization rules", id, rules_id)),
            _ => Ok(()),
        }
    }

    /// Fail fast when a table/bucket width differs from the build configuration
    pub fn ensure_compatible(
        &self,
        table: &ThresholdTable,
        sb_size: usize,
    ) -> Result<(), BincloneError>
    {
        let h = &self.header;

        if h.window != table.window()
        {
            return Err(BincloneError::mismatch("window", h.window, table.window()));
        }
        if h.table_len != table.len()
        {
            return Err(BincloneError::mismatch("table size", h.table_len, table.len()));
        }
        if h.table_id != table.id()
        {
            return Err(BincloneError::mismatch("table id", &h.table_id, table.id()));
        }
        if h.sb_size != sb_size
        {
            return Err(BincloneError::mismatch("bucket size", h.sb_size, sb_size));
        }
        Ok(())
    }

    /// Records in (bucket, stream id, offset) order
    pub fn records(&self) -> impl Iterator<Item = &IndexRecord>
    {
        let mut keys: Vec<&u64> = self
            .buckets
            .keys()
            .collect();
        keys.sort();

        keys.into_iter()
            .flat_map(|k| self.buckets[k].iter())
    }

    /// Write JSON Lines: header line, then one record per line.
    pub fn save(
        &self,
        path: &Path,
    ) -> Result<()>
    {
        if let Some(parent) = path.parent()
            && !parent
                .as_os_str()
                .is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer(&mut writer, &self.header).context("Failed to serialize index header")?;
        writer
            .write_all(b"\n")
            .context("Failed to write newline")?;

        for r in self.records()
        {
            serde_json::to_writer(&mut writer, r).context("Failed to serialize index record")?;
            writer
                .write_all(b"\n")
                .context("Failed to write newline")?;
        }

        writer
            .flush()
            .context("Failed to flush index")?;
        Ok(())
    }

    /// Read an index written by [`SimilarityIndex::save`].
    pub fn load(path: &Path) -> Result<Self>
    {
        let f = File::open(path).with_context(|| format!("Failed to open index {}", path.display()))?;
        let mut lines = BufReader::new(f)
            .lines()
            .enumerate();

        let header: IndexHeader = match lines.next()
        {
            Some((_, line)) =>
            {
                let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str(&line).context("Failed to parse index header")?
            }
            None =>
            {
                return Err(BincloneError::Format { what: "index", reason: "missing header line".into() }.into());
            }
        };

        let mut records = Vec::with_capacity(header.records);
        for (i, line) in lines
        {
            let line = line.with_context(|| format!("Failed to read line {}", i + 1))?;
            if line
                .trim()
                .is_empty()
            {
                continue;
            }
            let r: IndexRecord = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse index record on line {}", i + 1))?;
            records.push(r);
        }

        if records.len() != header.records
        {
            return Err(BincloneError::Format {
                what: "index",
                reason: format!("header declares {} records, found {}", header.records, records.len()),
            }
            .into());
        }

        Ok(Self::from_records(header, records))
    }
}

/// Shared, atomically replaceable index reference
#[derive(Debug)]
pub struct IndexHandle
{
    inner: RwLock<Arc<SimilarityIndex>>,
}

impl IndexHandle
{
    pub fn new(index: SimilarityIndex) -> Self
    {
        Self { inner: RwLock::new(Arc::new(index)) }
    }

    /// Current index; stays valid across later swaps
    pub fn snapshot(&self) -> Arc<SimilarityIndex>
    {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install a rebuilt index, returning the previous one
    pub fn swap(
        &self,
        index: SimilarityIndex,
    ) -> Arc<SimilarityIndex>
    {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}
