//! Grouping of normalized listing lines into named token streams.
//!
//! Two strategies share one trait so the rest of the pipeline (windows,
//! thresholds, encoder, index) never forks per variant.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::core::normalize::{NormalizedLine, Normalizer};

/// Identity of one token stream within a corpus
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId
{
    /// Listing file the stream was read from
    pub source: PathBuf,

    /// Function name for per-function streams
    pub function: Option<String>,

    /// 0-based listing line where the stream starts (disambiguates repeated names)
    pub start_line: usize,
}

impl fmt::Display for StreamId
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        match &self.function
        {
            Some(name) => write!(f, "{}::{}>{}", self.source.display(), name, self.start_line),
            None => write!(f, "{}", self.source.display()),
        }
    }
}

/// Ordered normalized lines with their stream identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStream
{
    pub id: StreamId,
    pub lines: Vec<NormalizedLine>,
}

impl TokenStream
{
    pub fn len(&self) -> usize
    {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.lines.is_empty()
    }
}

/// Segmentation strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMode
{
    /// One stream per listing file
    #[default]
    WholeFile,

    /// One stream per function block
    PerFunction,
}

impl fmt::Display for SegmentMode
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        match self
        {
            SegmentMode::WholeFile => write!(f, "whole_file"),
            SegmentMode::PerFunction => write!(f, "per_function"),
        }
    }
}

pub trait Segmenter: Send + Sync
{
    /// Split a listing's text into token streams.
    fn segment(
        &self,
        source: &Path,
        text: &str,
        normalizer: &Normalizer,
    ) -> Vec<TokenStream>;

    /// Strategy label for logs and index headers
    fn mode(&self) -> SegmentMode;
}

// Simple segmenter registry
pub fn segmenter_for(mode: SegmentMode) -> Box<dyn Segmenter>
{
    match mode
    {
        SegmentMode::WholeFile => Box::new(WholeFile),
        SegmentMode::PerFunction => Box::new(PerFunction),
    }
}

/// Entire listing (after the header) as one stream
pub struct WholeFile;

impl Segmenter for WholeFile
{
    fn segment(
        &self,
        source: &Path,
        text: &str,
        normalizer: &Normalizer,
    ) -> Vec<TokenStream>
    {
        let skip = normalizer
            .dialect()
            .header_lines;

        let lines = text
            .lines()
            .enumerate()
            .skip(skip)
            .filter_map(|(i, raw)| normalizer.normalize_line(i, raw))
            .collect();

        vec![TokenStream {
            id: StreamId { source: source.to_path_buf(), function: None, start_line: skip },
            lines,
        }]
    }

    fn mode(&self) -> SegmentMode
    {
        SegmentMode::WholeFile
    }
}

/// One stream per function block; unindented lines open a block
pub struct PerFunction;

impl Segmenter for PerFunction
{
    fn segment(
        &self,
        source: &Path,
        text: &str,
        normalizer: &Normalizer,
    ) -> Vec<TokenStream>
    {
        let skip = normalizer
            .dialect()
            .header_lines;

        let mut out = Vec::new();

        // Lines before the first header are prologue and never kept
        let mut current: Option<TokenStream> = None;

        for (i, raw) in text
            .lines()
            .enumerate()
            .skip(skip)
        {
            if raw
                .trim()
                .is_empty()
            {
                continue;
            }

            if !raw.starts_with(char::is_whitespace)
            {
                if let Some(done) = current.take()
                    && !done.is_empty()
                {
                    out.push(done);
                }

                current = Some(TokenStream {
                    id: StreamId {
                        source: source.to_path_buf(),
                        function: Some(function_name(raw)),
                        start_line: i,
                    },
                    lines: Vec::new(),
                });
                continue;
            }

            if let Some(block) = current.as_mut()
                && let Some(line) = normalizer.normalize_line(i, raw)
            {
                block
                    .lines
                    .push(line);
            }
        }

        if let Some(done) = current
            && !done.is_empty()
        {
            out.push(done);
        }

        out
    }

    fn mode(&self) -> SegmentMode
    {
        SegmentMode::PerFunction
    }
}

/// `0804840b <main>:` → `main`; other headers lose their trailing colon
fn function_name(header: &str) -> String
{
    let header = header.trim();

    if let Some(open) = header.find('<')
        && let Some(close) = header.rfind('>')
        && close > open
    {
        return header[open + 1..close].to_string();
    }

    header
        .trim_end_matches(':')
        .to_string()
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::normalize::{ListingDialect, NormalizationRules};

    fn normalizer(header_lines: usize) -> Normalizer
    {
        let dialect = ListingDialect { column_offset: 20, header_lines, ..ListingDialect::default() };
        Normalizer::new(NormalizationRules::default(), dialect)
    }

    fn ins(text: &str) -> String
    {
        format!("{:<20}{}", "  401000:", text)
    }

    fn listing() -> String
    {
        [
            "banner".to_string(),
            ins("nop"),
            "00401000 <alpha>:".to_string(),
            ins("push ebp"),
            ins("mov ebp,esp"),
            String::new(),
            "00401010 <alpha>:".to_string(),
            ins("ret"),
            "00401020 <beta>:".to_string(),
            ins("leave"),
            ins("ret"),
        ]
        .join("\n")
    }

    #[test]
    fn whole_file_skips_header_and_keeps_every_instruction()
    {
        let streams = WholeFile.segment(Path::new("a.txt"), &listing(), &normalizer(1));

        assert_eq!(streams.len(), 1);
        let s = &streams[0];
        assert_eq!(s.id.function, None);
        assert_eq!(s.id.start_line, 1);
        assert_eq!(s.id.to_string(), "a.txt");
        // Header lines are shorter than the column and drop out as malformed
        assert_eq!(s.len(), 6);
        assert_eq!(s.lines[0].line, 1);
    }

    #[test]
    fn per_function_discards_prologue_and_disambiguates_names()
    {
        let streams = PerFunction.segment(Path::new("a.txt"), &listing(), &normalizer(1));

        let ids: Vec<String> = streams
            .iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a.txt::alpha>2", "a.txt::alpha>6", "a.txt::beta>8"]);

        let lens: Vec<usize> = streams
            .iter()
            .map(TokenStream::len)
            .collect();
        assert_eq!(lens, vec![2, 1, 2]);
    }

    #[test]
    fn per_function_without_headers_is_empty()
    {
        let text = [ins("push ebp"), ins("ret")].join("\n");
        assert!(
            PerFunction
                .segment(Path::new("x"), &text, &normalizer(0))
                .is_empty()
        );
    }

    #[test]
    fn per_function_drops_blocks_without_instructions()
    {
        let text = [
            "00401000 <a>:".to_string(),
            ins("ret"),
            String::new(),
            "Disassembly of section .plt:".to_string(),
            String::new(),
            "00401100 <b>:".to_string(),
        ]
        .join("\n");

        let streams = PerFunction.segment(Path::new("x"), &text, &normalizer(0));

        let ids: Vec<String> = streams
            .iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["x::a>0"]);
        assert!(
            streams
                .iter()
                .all(|s| !s.is_empty())
        );
    }

    #[test]
    fn registry_matches_mode()
    {
        assert_eq!(segmenter_for(SegmentMode::WholeFile).mode(), SegmentMode::WholeFile);
        assert_eq!(segmenter_for(SegmentMode::PerFunction).mode(), SegmentMode::PerFunction);
    }

    #[test]
    fn header_name_forms()
    {
        assert_eq!(function_name("0804840b <main>:"), "main");
        assert_eq!(function_name("sub_401000:"), "sub_401000");
    }
}
