//! Corpus-wide per-symbol thresholds learned by order statistics.
//!
//! Every window of every stream contributes one value per symbol (zero when
//! the symbol is absent). A symbol's threshold is the value at rank
//! `round(len * percentile)` of its sorted list; zero thresholds are dropped
//! because such a symbol can never discriminate.
//!
//! The build is a map-reduce over streams. Per-symbol sorting makes the
//! result independent of stream order, and keys are laid out in
//! lexicographic order so the canonical bit order is as well.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::{error::BincloneError, segment::TokenStream, window::windows};

/// Immutable symbol → threshold mapping with a fixed iteration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable
{
    /// Region window the table was learned with
    window: usize,

    /// Order-statistic rank fraction in (0, 1]
    percentile: f64,

    /// Canonical order is load-bearing for every bit vector
    thresholds: IndexMap<String, u32>,
}

/// Per-stream partial aggregation
#[derive(Default)]
struct Partial
{
    windows: usize,
    values: HashMap<String, Vec<u32>>,
}

impl Partial
{
    fn merge(
        mut self,
        other: Partial,
    ) -> Partial
    {
        self.windows += other.windows;
        for (sym, mut vals) in other.values
        {
            self.values
                .entry(sym)
                .or_default()
                .append(&mut vals);
        }
        self
    }
}

impl ThresholdTable
{
    /// Assemble a table from already-ordered thresholds, validating parameters.
    pub fn from_parts(
        window: usize,
        percentile: f64,
        thresholds: IndexMap<String, u32>,
    ) -> Result<Self>
    {
        validate_params(window, percentile)?;

        if let Some((sym, _)) = thresholds
            .iter()
            .find(|(_, t)| **t == 0)
        {
            return Err(BincloneError::Format {
                what: "threshold table",
                reason: format!("symbol {sym:?} has a zero threshold"),
            }
            .into());
        }

        Ok(Self { window, percentile, thresholds })
    }

    /// Learn thresholds from every window of every stream.
    #[instrument(skip(streams), fields(streams = streams.len()))]
    pub fn build(
        streams: &[TokenStream],
        window: usize,
        percentile: f64,
    ) -> Result<Self>
    {
        validate_params(window, percentile)?;

        let partial = streams
            .par_iter()
            .map(|stream| {
                let mut p = Partial::default();
                for w in windows(stream, window)
                {
                    p.windows += 1;
                    for (sym, count) in w.counts
                    {
                        p.values
                            .entry(sym)
                            .or_default()
                            .push(count);
                    }
                }
                p
            })
            .reduce(Partial::default, Partial::merge);

        let total = partial.windows;
        if total == 0
        {
            warn!("corpus produced no windows; threshold table is empty");
        }

        // Lexicographic key order decouples the canonical order from input order
        let ordered: BTreeMap<String, Vec<u32>> = partial
            .values
            .into_iter()
            .collect();

        let mut thresholds = IndexMap::with_capacity(ordered.len());
        for (sym, mut vals) in ordered
        {
            // Absent-from-window counts are explicit zeros
            vals.resize(total, 0);
            vals.sort_unstable();

            let t = vals[rank(vals.len(), percentile)];
            if t == 0
            {
                debug!(symbol = %sym, "dropping non-discriminative symbol");
                continue;
            }
            thresholds.insert(sym, t);
        }

        info!(windows = total, symbols = thresholds.len(), "threshold table built");

        Ok(Self { window, percentile, thresholds })
    }

    pub fn window(&self) -> usize
    {
        self.window
    }

    pub fn percentile(&self) -> f64
    {
        self.percentile
    }

    pub fn len(&self) -> usize
    {
        self.thresholds
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.thresholds
            .is_empty()
    }

    pub fn get(
        &self,
        symbol: &str,
    ) -> Option<u32>
    {
        self.thresholds
            .get(symbol)
            .copied()
    }

    /// Entries in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)>
    {
        self.thresholds
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
    }

    /// Content identity over parameters and ordered entries.
    ///
    /// Two tables with equal ids produce identical bit vectors for identical
    /// windows; indexes record it so queries can reject foreign tables.
    pub fn id(&self) -> String
    {
        let mut h = blake3::Hasher::new();
        h.update(&(self.window as u64).to_le_bytes());
        h.update(
            &self
                .percentile
                .to_bits()
                .to_le_bytes(),
        );
        for (sym, t) in &self.thresholds
        {
            h.update(sym.as_bytes());
            h.update(&[0]);
            h.update(&t.to_le_bytes());
        }

        h.finalize()
            .to_hex()
            .as_str()[..16]
            .to_string()
    }

    /// Persist as pretty JSON; key order round-trips.
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
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize threshold table")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Load and re-validate a persisted table.
    pub fn load(path: &Path) -> Result<Self>
    {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read threshold table {}", path.display()))?;
        let raw: ThresholdTable = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse threshold table {}", path.display()))?;

        Self::from_parts(raw.window, raw.percentile, raw.thresholds)
            .with_context(|| format!("Invalid threshold table {}", path.display()))
    }
}

/// Order-statistic rank, half-to-even rounding, clamped into the list
fn rank(
    len: usize,
    percentile: f64,
) -> usize
{
    let r = (len as f64 * percentile).round_ties_even() as usize;
    r.min(len.saturating_sub(1))
}

/// Window must be positive and percentile in (0, 1]
pub(crate) fn validate_params(
    window: usize,
    percentile: f64,
) -> Result<(), BincloneError>
{
    if window == 0
    {
        return Err(BincloneError::InvalidWindow(window));
    }
    if !(percentile > 0.0 && percentile <= 1.0)
    {
        return Err(BincloneError::InvalidPercentile(percentile));
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use std::path::PathBuf;

    use super::*;
    use crate::core::{normalize::NormalizedLine, segment::StreamId};

    fn stream(
        name: &str,
        lines: &[&[&str]],
    ) -> TokenStream
    {
        TokenStream {
            id: StreamId { source: PathBuf::from(name), function: None, start_line: 0 },
            lines: lines
                .iter()
                .enumerate()
                .map(|(i, toks)| NormalizedLine {
                    line: i,
                    tokens: toks
                        .iter()
                        .map(|t| t.to_string())
                        .collect(),
                })
                .collect(),
        }
    }

    /// Width-1 windows: mov counts 3,1,0,2 and add counts 0,0,1,0
    fn corpus() -> Vec<TokenStream>
    {
        vec![stream("a", &[&["mov", "mov", "mov"], &["mov"], &["add"], &["mov", "mov"], &["nop"]])]
    }

    #[test]
    fn median_drops_zero_symbols()
    {
        let t = ThresholdTable::build(&corpus(), 1, 0.5).unwrap();

        assert_eq!(t.len(), 1);
        assert_eq!(t.get("mov"), Some(2));
        assert_eq!(t.get("add"), None);
        assert_eq!(t.get("nop"), None);
    }

    #[test]
    fn percentile_selects_rank()
    {
        let top = ThresholdTable::build(&corpus(), 1, 1.0).unwrap();
        let keys: Vec<(&str, u32)> = top
            .iter()
            .collect();
        assert_eq!(keys, vec![("add", 1), ("mov", 3)]);

        let low = ThresholdTable::build(&corpus(), 1, 0.25).unwrap();
        assert_eq!(low.get("mov"), Some(1));
        assert!(low.get("add").is_none());
    }

    #[test]
    fn stream_order_does_not_matter()
    {
        let a = stream("a", &[&["mov", "REGSEG"], &["add", "REGSEG", "byte"], &["mov"], &["ret"]]);
        let b = stream("b", &[&["push", "REGSEG"], &["mov", "REGSEG", "REGSEG"], &["call", "VAL"], &["mov"], &["pop"]]);
        let c = stream("c", &[&["mov", "MEM", "REGSEG"], &["mov", "MEM", "REGSEG"], &["leave"]]);

        let fwd = ThresholdTable::build(&[a.clone(), b.clone(), c.clone()], 2, 0.5).unwrap();
        let rev = ThresholdTable::build(&[c, a, b], 2, 0.5).unwrap();

        assert_eq!(fwd, rev);
        assert_eq!(fwd.id(), rev.id());
    }

    #[test]
    fn empty_corpus_gives_empty_table()
    {
        let t = ThresholdTable::build(&[stream("a", &[&["mov"]])], 4, 0.5).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn rejects_bad_parameters()
    {
        let err = ThresholdTable::build(&corpus(), 0, 0.5).unwrap_err();
        assert_eq!(err.downcast_ref::<BincloneError>(), Some(&BincloneError::InvalidWindow(0)));

        for p in [0.0, -0.1, 1.5, f64::NAN]
        {
            assert!(ThresholdTable::build(&corpus(), 1, p).is_err(), "percentile {p}");
        }
    }

    #[test]
    fn rank_rounds_half_to_even()
    {
        assert_eq!(rank(3, 0.5), 2);
        assert_eq!(rank(5, 0.5), 2);
        assert_eq!(rank(4, 1.0), 3);
        assert_eq!(rank(10, 0.8), 8);
    }

    #[test]
    fn save_load_keeps_order() -> Result<()>
    {
        let table = ThresholdTable::from_parts(
            60,
            0.8,
            IndexMap::from([("zeta".to_string(), 1), ("alpha".to_string(), 4), ("mov".to_string(), 9)]),
        )?;

        let dir = tempfile::TempDir::new()?;
        let path = dir
            .path()
            .join("tables/thresholds.json");
        table.save(&path)?;
        let loaded = ThresholdTable::load(&path)?;

        let keys: Vec<&str> = loaded
            .iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mov"]);
        assert_eq!(loaded.id(), table.id());
        Ok(())
    }

    #[test]
    fn id_tracks_order()
    {
        let ab = ThresholdTable::from_parts(
            4,
            0.5,
            IndexMap::from([("a".to_string(), 1), ("b".to_string(), 2)]),
        )
        .unwrap();
        let ba = ThresholdTable::from_parts(
            4,
            0.5,
            IndexMap::from([("b".to_string(), 2), ("a".to_string(), 1)]),
        )
        .unwrap();

        assert_ne!(ab.id(), ba.id());
    }

    #[test]
    fn load_rejects_zero_threshold() -> Result<()>
    {
        let dir = tempfile::TempDir::new()?;
        let path = dir
            .path()
            .join("t.json");
        fs::write(&path, r#"{"window":4,"percentile":0.5,"thresholds":{"mov":0}}"#)?;

        assert!(ThresholdTable::load(&path).is_err());
        Ok(())
    }
}
