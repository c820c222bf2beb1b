//! Corpus loading: listing files → normalized, segmented token streams.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::{
    core::{
        normalize::Normalizer,
        segment::{Segmenter, TokenStream},
    },
    infra::io::read_file_smart,
};

/// Normalizer + segmenter pair applied to every listing
pub struct CorpusLoader<'a>
{
    normalizer: &'a Normalizer,
    segmenter: &'a dyn Segmenter,
}

impl<'a> CorpusLoader<'a>
{
    pub fn new(
        normalizer: &'a Normalizer,
        segmenter: &'a dyn Segmenter,
    ) -> Self
    {
        Self { normalizer, segmenter }
    }

    pub fn normalizer(&self) -> &'a Normalizer
    {
        self.normalizer
    }

    /// Read and segment one listing.
    pub fn load_file(
        &self,
        path: &Path,
    ) -> Result<Vec<TokenStream>>
    {
        let content = read_file_smart(path)?;
        let text = content.text();

        let streams = self
            .segmenter
            .segment(path, &text, self.normalizer);

        debug!(path = %path.display(), streams = streams.len(), "segmented listing");
        Ok(streams)
    }

    /// Load every listing in parallel; `on_file` fires once per finished file.
    ///
    /// Streams come back in path order, then in listing order within a file.
    /// The first unreadable file aborts the load.
    #[instrument(skip_all, fields(files = paths.len(), segment = %self.segmenter.mode()))]
    pub fn load_all<F>(
        &self,
        paths: &[PathBuf],
        on_file: F,
    ) -> Result<Vec<TokenStream>>
    where
        F: Fn(&Path) + Sync,
    {
        let mut sorted: Vec<&PathBuf> = paths
            .iter()
            .collect();
        sorted.sort();

        let per_file: Vec<Result<Vec<TokenStream>>> = sorted
            .par_iter()
            .map(|path| {
                let streams = self
                    .load_file(path)
                    .with_context(|| format!("Failed to load listing {}", path.display()))?;
                on_file(path);
                Ok(streams)
            })
            .collect();

        let mut streams = Vec::new();
        for piece in per_file
        {
            streams.extend(piece?);
        }

        let lines: usize = streams
            .iter()
            .map(TokenStream::len)
            .sum();
        if lines == 0
        {
            warn!("corpus contains no instruction lines");
        }
        info!(streams = streams.len(), lines, "corpus loaded");

        Ok(streams)
    }

    /// The query stream of a listing: its first non-empty stream.
    pub fn load_query(
        &self,
        path: &Path,
    ) -> Result<TokenStream>
    {
        let streams = self
            .load_file(path)
            .with_context(|| format!("Failed to load query listing {}", path.display()))?;

        streams
            .into_iter()
            .find(|s| !s.is_empty())
            .with_context(|| format!("Query listing {} contains no instructions", path.display()))
    }
}
