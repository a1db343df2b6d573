use anyhow::{Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use starmig::config;
use starmig::convert::convert_repo;
use starmig::registry::JsonlRegistry;

#[derive(Parser, Debug)]
#[command(name = "starmig")]
#[command(about = "Migrate an astronomical data repository to the new generation")]
#[command(version)]
struct Args {
    /// Root of the legacy repository to convert
    #[arg(short, long)]
    root: PathBuf,

    /// Scan configuration (TOML); falls back to STARMIG_CONFIG_PATH
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Destination ledger file (JSONL)
    #[arg(short, long, default_value = "associations.jsonl")]
    ledger: PathBuf,

    /// Override the destination collection from the config
    #[arg(long)]
    collection: Option<String>,
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config_path = config::resolve_config_path(args.config.as_deref())
        .ok_or_else(|| anyhow!("no scan config given; pass --config or set STARMIG_CONFIG_PATH"))?;
    let mut cfg = config::load_config(&config_path)?;
    if let Some(collection) = args.collection {
        cfg.collection = collection;
    }

    let mut registry = JsonlRegistry::new(&args.ledger);
    let outcome = convert_repo(&cfg, &args.root, &mut registry, &|_| true)?;

    println!(
        "discovered {} records, ingested {}, certified {} validity intervals ({} joined rows)",
        outcome.discovered, outcome.ingested, outcome.certified_timespans, outcome.joined_records
    );
    if outcome.gap_messages > 0 || outcome.overlap_messages > 0 {
        println!(
            "corrected {} validity gaps and {} overlaps; see log for details",
            outcome.gap_messages, outcome.overlap_messages
        );
    }
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "starmig=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
