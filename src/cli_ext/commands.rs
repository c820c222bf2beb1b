//! CLI command handlers for table/index building and querying.
//!
//! Configuration is read once per command; flags override `binclone.toml`.
//! Results go to stdout, progress bars and diagnostics to stderr.

use std::{fmt::Display, path::Path};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::{OwoColorize, Style};
use tabled::{Table, Tabled};
use tracing::instrument;

use crate::{
    cli::{AppContext, BuildArgs, CorpusArgs, IndexArgs, OutputFormat, QueryArgs, TableArgs},
    core::{
        corpus::CorpusLoader,
        index::SimilarityIndex,
        normalize::Normalizer,
        pipeline::{self, FingerprintParams},
        query::{QueryOptions, QueryReport},
        segment::{SegmentMode, TokenStream, segmenter_for},
        threshold::ThresholdTable,
    },
    infra::{
        config::{Config, load_config},
        walk::FileWalker,
    },
};

/// Learn and save the threshold table.
pub fn table(
    args: TableArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let cfg = load_config(ctx.config.as_deref())?;
    let params = FingerprintParams {
        window: args
            .window
            .unwrap_or(cfg.fingerprint.window),
        percentile: args
            .percentile
            .unwrap_or(cfg.fingerprint.percentile),
        ..cfg.fingerprint
    };
    params.validate()?;

    let corpus = load_corpus(&args.corpus, &cfg, ctx)?;
    let table = pipeline::build_table(&corpus.streams, &params)?;

    let out = args
        .output
        .unwrap_or_else(|| {
            cfg.paths
                .table
                .clone()
        });
    table.save(&out)?;

    report_table(&table, &out, ctx);
    Ok(())
}

/// Fingerprint a corpus against a saved table and save the index.
pub fn index(
    args: IndexArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let cfg = load_config(ctx.config.as_deref())?;

    let table_path = args
        .table
        .unwrap_or_else(|| {
            cfg.paths
                .table
                .clone()
        });
    let table = ThresholdTable::load(&table_path)?;

    // Window and percentile are fixed by the table
    let params = FingerprintParams {
        window: table.window(),
        percentile: table.percentile(),
        sb_size: args
            .sb_size
            .unwrap_or(cfg.fingerprint.sb_size),
    };

    let corpus = load_corpus(&args.corpus, &cfg, ctx)?;
    let index = pipeline::build_index(&corpus.streams, &table, &corpus.normalizer, &params, corpus.mode)?;

    let out = args
        .output
        .unwrap_or_else(|| {
            cfg.paths
                .index
                .clone()
        });
    index.save(&out)?;

    report_index(&index, &out, ctx);
    Ok(())
}

/// Table then index over one corpus load.
pub fn build(
    args: BuildArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let cfg = load_config(ctx.config.as_deref())?;
    let params = FingerprintParams {
        window: args
            .window
            .unwrap_or(cfg.fingerprint.window),
        percentile: args
            .percentile
            .unwrap_or(cfg.fingerprint.percentile),
        sb_size: args
            .sb_size
            .unwrap_or(cfg.fingerprint.sb_size),
    };
    params.validate()?;

    let corpus = load_corpus(&args.corpus, &cfg, ctx)?;

    let table = pipeline::build_table(&corpus.streams, &params)?;
    let table_out = args
        .table
        .unwrap_or_else(|| {
            cfg.paths
                .table
                .clone()
        });
    table.save(&table_out)?;
    report_table(&table, &table_out, ctx);

    let index = pipeline::build_index(&corpus.streams, &table, &corpus.normalizer, &params, corpus.mode)?;
    let index_out = args
        .index
        .unwrap_or_else(|| {
            cfg.paths
                .index
                .clone()
        });
    index.save(&index_out)?;
    report_index(&index, &index_out, ctx);

    Ok(())
}

/// Search the index for regions similar to the query listing's first window.
#[instrument(skip_all, fields(query = %args.query.display()))]
pub fn query(
    args: QueryArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let cfg = load_config(ctx.config.as_deref())?;

    let table_path = args
        .table
        .unwrap_or_else(|| {
            cfg.paths
                .table
                .clone()
        });
    let index_path = args
        .index
        .unwrap_or_else(|| {
            cfg.paths
                .index
                .clone()
        });
    let table = ThresholdTable::load(&table_path)?;
    let index = SimilarityIndex::load(&index_path)?;

    let normalizer = cfg.query_normalizer(args.header_lines);
    let segmenter = segmenter_for(
        args.segment
            .unwrap_or(cfg.query.segment),
    );
    let stream = CorpusLoader::new(&normalizer, segmenter.as_ref()).load_query(&args.query)?;

    let opts = QueryOptions::new(
        args.sb_size
            .unwrap_or(
                index
                    .header()
                    .sb_size,
            ),
    )
    .with_limit(
        args.limit
            .or(cfg.query.limit),
    )
    .with_min_similarity(
        args.min_similarity
            .unwrap_or(cfg.query.min_similarity),
    );

    let report = pipeline::query(&stream, &index, &table, &normalizer, opts)?;

    match args.format
    {
        OutputFormat::Json =>
        {
            println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize query report")?);
        }
        OutputFormat::Table => print_report(&report, ctx),
    }

    Ok(())
}

/// Streams of one corpus load plus the settings they were produced with
struct LoadedCorpus
{
    normalizer: Normalizer,
    mode: SegmentMode,
    streams: Vec<TokenStream>,
}

fn load_corpus(
    args: &CorpusArgs,
    cfg: &Config,
    ctx: &AppContext,
) -> Result<LoadedCorpus>
{
    let ignores = [
        cfg.corpus
            .ignore
            .as_slice(),
        args.ignore
            .as_slice(),
    ]
    .concat();
    let walker = FileWalker::new(&ignores)?.with_include(&cfg.corpus.include)?;

    let files = walker.collect(&args.corpus)?;
    if files.is_empty()
    {
        bail!("No listing files found under {}", display_roots(&args.corpus));
    }

    let mode = args
        .segment
        .unwrap_or(cfg.corpus.segment);
    let segmenter = segmenter_for(mode);
    let normalizer = cfg.corpus_normalizer();

    let progress = progress_bar(ctx, files.len() as u64);
    let streams = CorpusLoader::new(&normalizer, segmenter.as_ref()).load_all(&files, |path| {
        progress.inc(1);
        progress.set_message(
            path.file_name()
                .map(|n| {
                    n.to_string_lossy()
                        .into_owned()
                })
                .unwrap_or_default(),
        );
    })?;
    progress.finish_and_clear();

    Ok(LoadedCorpus { normalizer, mode, streams })
}

fn progress_bar(
    ctx: &AppContext,
    len: u64,
) -> ProgressBar
{
    if ctx.quiet
    {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

fn display_roots(roots: &[impl AsRef<Path>]) -> String
{
    roots
        .iter()
        .map(|r| {
            r.as_ref()
                .display()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Apply `style` unless colors are disabled
fn paint(
    ctx: &AppContext,
    text: impl Display,
    style: Style,
) -> String
{
    if ctx.no_color { text.to_string() } else { text.style(style).to_string() }
}

fn report_table(
    table: &ThresholdTable,
    out: &Path,
    ctx: &AppContext,
)
{
    if ctx.quiet
    {
        return;
    }

    println!(
        "{} Threshold table: {} symbols (window {}, percentile {}) -> {}",
        paint(ctx, "✓", Style::new().green()),
        table.len(),
        table.window(),
        table.percentile(),
        out.display()
    );
    if table.is_empty()
    {
        println!(
            "{}",
            paint(ctx, "  no discriminative symbols; queries against this table are low confidence", Style::new().yellow())
        );
    }
}

fn report_index(
    index: &SimilarityIndex,
    out: &Path,
    ctx: &AppContext,
)
{
    if ctx.quiet
    {
        return;
    }

    let header = index.header();
    println!(
        "{} Index: {} windows in {} buckets (window {}, sb_size {}, table {}) -> {}",
        paint(ctx, "✓", Style::new().green()),
        index.len(),
        index.bucket_count(),
        header.window,
        header.sb_size,
        header.table_id,
        out.display()
    );
}

#[derive(Tabled)]
struct MatchRow
{
    rank: usize,
    similarity: String,
    distance: u32,
    region: String,
    line: usize,
    offset: usize,
}

fn print_report(
    report: &QueryReport,
    ctx: &AppContext,
)
{
    println!("{} {}", paint(ctx, "Query:", Style::new().bold()), report.query);

    if report.low_confidence
    {
        println!(
            "{}",
            paint(ctx, "Low confidence: the index carries no discriminative symbols", Style::new().yellow())
        );
        return;
    }

    if report
        .matches
        .is_empty()
    {
        println!("No similar regions found (bucket {:#x}, {} candidates)", report.bucket, report.candidates);
        return;
    }

    let rows: Vec<MatchRow> = report
        .matches
        .iter()
        .enumerate()
        .map(|(i, m)| MatchRow {
            rank: i + 1,
            similarity: format!("{:.3}", m.similarity),
            distance: m.distance,
            region: m
                .stream_id()
                .to_string(),
            // Listing lines are shown 1-based
            line: m.line + 1,
            offset: m.offset,
        })
        .collect();

    println!("{}", Table::new(rows));
    println!(
        "{} of {} candidates in bucket {:#x}; {} contiguous {}",
        report
            .matches
            .len(),
        report.candidates,
        report.bucket,
        report.group_count(),
        if report.group_count() == 1 { "group" } else { "groups" }
    );
}
