use anyhow::Result;
use binclone::{
    cli::{Cli, Commands},
    cli_ext::commands,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()>
{
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries results
    let filter = EnvFilter::try_from_env("BINCLONE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    // Build a context once, pass everywhere
    let ctx = cli.context();

    match cli.command
    {
        Commands::Init(args) => binclone::infra::config::init(args, &ctx),
        Commands::Table(args) => commands::table(args, &ctx),
        Commands::Index(args) => commands::index(args, &ctx),
        Commands::Build(args) => commands::build(args, &ctx),
        Commands::Query(args) => commands::query(args, &ctx),
    }
}
