use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::core::segment::SegmentMode;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext
{
    pub quiet: bool,             // global --quiet
    pub no_color: bool,          // global --no-color
    pub config: Option<PathBuf>, // global --config
}

#[derive(Parser)]
#[command(name = "binclone")]
#[command(about = "Find near-duplicate code regions across disassembly listings")]
#[command(version, long_about = None)]
pub struct Cli
{
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Read configuration from this file instead of ./binclone.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli
{
    pub fn context(&self) -> AppContext
    {
        AppContext { quiet: self.quiet, no_color: self.no_color, config: self.config.clone() }
    }
}

#[derive(Subcommand)]
pub enum Commands
{
    /// Initialize a binclone.toml config file
    Init(InitArgs),

    /// Learn the per-symbol threshold table from a corpus
    Table(TableArgs),

    /// Fingerprint a corpus into a bucketed similarity index
    Index(IndexArgs),

    /// Build the threshold table and the index in one pass
    Build(BuildArgs),

    /// Find indexed regions similar to a query listing
    Query(QueryArgs),
}

#[derive(Debug, Parser)]
pub struct InitArgs
{
    /// Directory to create config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

/// Corpus selection shared by table/index/build
#[derive(Debug, Clone, Args)]
pub struct CorpusArgs
{
    /// Listing files or directories to scan
    #[arg(required = true, value_name = "CORPUS")]
    pub corpus: Vec<PathBuf>,

    /// Stream segmentation strategy
    #[arg(long, value_enum)]
    pub segment: Option<SegmentMode>,

    /// Additional glob patterns to ignore
    #[arg(short, long)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct TableArgs
{
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Region window in normalized lines
    #[arg(short, long)]
    pub window: Option<usize>,

    /// Threshold rank fraction in (0, 1]
    #[arg(short, long)]
    pub percentile: Option<f64>,

    /// Where to write the threshold table
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct IndexArgs
{
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Threshold table to fingerprint with
    #[arg(short, long)]
    pub table: Option<PathBuf>,

    /// Leading bits used as the bucket hash
    #[arg(short, long)]
    pub sb_size: Option<usize>,

    /// Where to write the index
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct BuildArgs
{
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Region window in normalized lines
    #[arg(short, long)]
    pub window: Option<usize>,

    /// Threshold rank fraction in (0, 1]
    #[arg(short, long)]
    pub percentile: Option<f64>,

    /// Leading bits used as the bucket hash
    #[arg(short, long)]
    pub sb_size: Option<usize>,

    /// Where to write the threshold table
    #[arg(long)]
    pub table: Option<PathBuf>,

    /// Where to write the index
    #[arg(long)]
    pub index: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct QueryArgs
{
    /// Listing whose first window is searched for
    pub query: PathBuf,

    /// Threshold table the index was built with
    #[arg(short, long)]
    pub table: Option<PathBuf>,

    /// Index to search
    #[arg(short, long)]
    pub index: Option<PathBuf>,

    /// Bucket width (defaults to the index's)
    #[arg(short, long)]
    pub sb_size: Option<usize>,

    /// Maximum number of matches to print
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Drop matches below this similarity
    #[arg(long)]
    pub min_similarity: Option<f64>,

    /// Banner lines to skip in the query listing
    #[arg(long)]
    pub header_lines: Option<usize>,

    /// Segmentation of the query listing
    #[arg(long, value_enum)]
    pub segment: Option<SegmentMode>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat
{
    Table,
    Json,
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_query_with_overrides()
    {
        let cli = Cli::try_parse_from([
            "binclone",
            "--quiet",
            "query",
            "q.txt",
            "--sb-size",
            "8",
            "--limit",
            "5",
            "--format",
            "json",
            "--segment",
            "per-function",
        ])
        .unwrap();

        assert!(cli.quiet);
        let Commands::Query(args) = cli.command
        else
        {
            panic!("expected query");
        };
        assert_eq!(args.query, PathBuf::from("q.txt"));
        assert_eq!(args.sb_size, Some(8));
        assert_eq!(args.limit, Some(5));
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.segment, Some(SegmentMode::PerFunction));
    }

    #[test]
    fn corpus_is_required()
    {
        assert!(Cli::try_parse_from(["binclone", "table"]).is_err());

        let cli = Cli::try_parse_from(["binclone", "build", "a", "b", "-w", "30", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        let Commands::Build(args) = cli.command
        else
        {
            panic!("expected build");
        };
        assert_eq!(args.corpus.corpus.len(), 2);
        assert_eq!(args.window, Some(30));
    }
}
