//! Last Minute EPG - command line entry point

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use lastminute_epg::config::AppConfig;
use lastminute_epg::epg::parse_xmltv_time;
use lastminute_epg::fetch::EpgDownloader;
use lastminute_epg::listing::ListingMode;
use lastminute_epg::pipeline;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "lastminute-epg")]
#[command(version)]
#[command(about = "Builds a 'what's on now' listing from an XMLTV EPG feed")]
struct Cli {
    /// Configuration file (defaults to the per-user config dir)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the EPG feed into the cache
    Fetch,
    /// Build the listing from the cached feed
    Generate(GenerateArgs),
    /// Fetch, then generate
    Run(GenerateArgs),
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Output flavour (overrides the config file)
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Reference instant as YYYYMMDDHHMMSS, defaults to the local clock
    #[arg(long, value_parser = parse_now)]
    now: Option<NaiveDateTime>,

    /// EPG file to read instead of the cached one
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Where to write the listing
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Also dump the parsed EPG as JSON into the cache dir
    #[arg(long, default_value_t = false)]
    snapshot: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    EpgOnly,
    Complete,
}

impl From<ModeArg> for ListingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::EpgOnly => ListingMode::EpgOnly,
            ModeArg::Complete => ListingMode::Complete,
        }
    }
}

fn parse_now(s: &str) -> std::result::Result<NaiveDateTime, String> {
    parse_xmltv_time(s).ok_or_else(|| format!("expected YYYYMMDDHHMMSS, got '{}'", s))
}

fn generate(mut config: AppConfig, args: GenerateArgs) -> Result<()> {
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }
    config.snapshot |= args.snapshot;

    // One instant for the whole run
    let now = args.now.unwrap_or_else(|| Local::now().naive_local());
    let input = args.input.unwrap_or_else(|| config.raw_epg_path());
    let output = args.output.unwrap_or_else(|| config.output_path());

    let lookup = pipeline::lookup_for(&config);
    let report = pipeline::generate(&config, lookup.as_ref(), &input, &output, now)
        .with_context(|| format!("generation from {} failed", input.display()))?;

    info!(
        channels = report.channels,
        programmes = report.programmes,
        skipped = report.skipped,
        airing = report.current,
        "done"
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lastminute_epg={}", cli.log_level).into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Command::Fetch => {
            EpgDownloader::fetch_to_cache(&config).context("EPG download failed")?;
        }
        Command::Generate(args) => generate(config, args)?,
        Command::Run(args) => {
            EpgDownloader::fetch_to_cache(&config).context("EPG download failed")?;
            generate(config, args)?;
        }
    }

    Ok(())
}
