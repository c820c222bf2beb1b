use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    cli::{AppContext, InitArgs},
    core::{
        normalize::{ListingDialect, NormalizationRules, Normalizer},
        pipeline::FingerprintParams,
        segment::SegmentMode,
    },
};

/// Config file names probed in the working directory, in priority order
pub const CONFIG_FILES: [&str; 2] = ["binclone.toml", ".binclone.toml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Listing layout
    pub dialect: ListingDialect,

    /// Token alphabet (synonym groups, register prefixes)
    pub normalize: NormalizationRules,

    /// Window, bucket width and threshold percentile
    pub fingerprint: FingerprintParams,

    /// Corpus discovery and segmentation
    pub corpus: CorpusConfig,

    /// Query defaults
    pub query: QueryConfig,

    /// Default artifact locations
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig
{
    pub segment: SegmentMode,

    /// Listing file globs (empty = every file)
    pub include: Vec<String>,

    /// Extra ignore globs (in addition to .gitignore)
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig
{
    pub segment: SegmentMode,

    /// Query listings carry their own banner length
    pub header_lines: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    pub min_similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig
{
    pub table: PathBuf,
    pub index: PathBuf,
}

impl Default for CorpusConfig
{
    fn default() -> Self
    {
        Self {
            segment: SegmentMode::WholeFile,
            include: vec!["*.txt".to_string(), "*.asm".to_string(), "*.s".to_string(), "*.S".to_string()],
            ignore: Vec::new(),
        }
    }
}

impl Default for QueryConfig
{
    fn default() -> Self
    {
        Self { segment: SegmentMode::WholeFile, header_lines: 0, limit: Some(20), min_similarity: 0.0 }
    }
}

impl Default for PathsConfig
{
    fn default() -> Self
    {
        Self { table: PathBuf::from("binclone/thresholds.json"), index: PathBuf::from("binclone/index.jsonl") }
    }
}

impl Config
{
    /// Normalizer for corpus listings
    pub fn corpus_normalizer(&self) -> Normalizer
    {
        Normalizer::new(self.normalize.clone(), self.dialect.clone())
    }

    /// Normalizer for query listings: same rules, query header length
    /// unless `header_lines` overrides it
    pub fn query_normalizer(
        &self,
        header_lines: Option<usize>,
    ) -> Normalizer
    {
        self.corpus_normalizer()
            .with_header_lines(header_lines.unwrap_or(self.query.header_lines))
    }
}

/// Load configuration: explicit file, else the first of [`CONFIG_FILES`]
/// in the working directory, then `BINCLONE_*` environment overrides
/// (`BINCLONE_FINGERPRINT__WINDOW=40`). Missing sections take defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<Config>
{
    let mut builder = config::Config::builder();

    match explicit
    {
        Some(path) =>
        {
            if !path.exists()
            {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            builder = builder.add_source(config::File::from(path));
        }
        None =>
        {
            if let Some(path) = CONFIG_FILES
                .iter()
                .map(Path::new)
                .find(|p| p.exists())
            {
                builder = builder.add_source(config::File::from(path));
            }
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BINCLONE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force
    {
        anyhow::bail!("Config file already exists at {}. Use --force to overwrite.", config_path.display());
    }

    let config = Config::default();
    let toml_string = toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
