use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use repdb_cli::{TextEvent, execute_script, json_line};
use repdb_engine::{EngineConfig, TransactionCoordinator};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_SCRIPT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/default.txt");

#[derive(Parser)]
#[command(name = "repdb")]
#[command(about = "Replicated concurrency control and recovery simulator")]
struct Cli {
    /// Instruction script to run (`-` reads stdin)
    #[arg(default_value = DEFAULT_SCRIPT)]
    input: PathBuf,

    /// Number of sites
    #[arg(long, default_value_t = EngineConfig::default().site_count, value_parser = clap::value_parser!(u32).range(1..))]
    sites: u32,

    /// Number of variables
    #[arg(long, default_value_t = EngineConfig::default().variable_count, value_parser = clap::value_parser!(u32).range(1..))]
    variables: u32,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "repdb=info")]
    log_level: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let source = load(&cli.input)?;
    let config = EngineConfig::new()
        .with_site_count(cli.sites)
        .with_variable_count(cli.variables);
    tracing::info!(input = %cli.input.display(), sites = config.site_count, variables = config.variable_count, "running script");

    let mut coordinator = TransactionCoordinator::new(config)?;
    let events = execute_script(&mut coordinator, &source);

    let mut out = io::stdout().lock();
    for event in &events {
        match cli.format {
            Format::Text => writeln!(out, "{}", TextEvent(event))?,
            Format::Json => writeln!(out, "{}", json_line(event)?)?,
        }
    }
    out.flush()?;
    Ok(())
}

fn load(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read instructions from stdin")?;
        return Ok(source);
    }
    std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read instructions from {}", input.display()))
}
