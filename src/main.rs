use anyhow::{Context, Result};
use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

use fund_load::{open_fresh_pipeline, ChainStore, Config, JsonChainStore, ResultWriter};

const USAGE: &str = "Usage:
  fund-load run <input.jsonl> [config.json]   validate a load stream and record accepted loads
  fund-load chain [config.json]               print the sealed ledger chain";

fn main() -> Result<()> {
    // Uses the `RUST_LOG` environment var for configuration. E.g. `RUST_LOG=debug cargo run`
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("run") => {
            let input = args.get(2).context(USAGE)?;
            let config = load_config(args.get(3))?;
            run(Path::new(input), &config)
        }
        Some("chain") => {
            let config = load_config(args.get(2))?;
            print_chain(&config)
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

fn load_config(path: Option<&String>) -> Result<Config> {
    let path = path.cloned().or_else(|| env::var("FUND_LOAD_CONFIG").ok());
    match path {
        Some(path) => Config::from_file(&path).with_context(|| format!("Failed to load config {path}")),
        None => Ok(Config::default()),
    }
}

/// Fresh run: wipe the aggregation store, chain and results, then process the stream
fn run(input: &Path, config: &Config) -> Result<()> {
    let mut pipeline = open_fresh_pipeline(config).context("Failed to open a fresh pipeline")?;

    let results_path = &config.paths.results;
    if let Some(parent) = results_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {parent:?}"))?;
    }
    let compact = File::create(results_path).with_context(|| format!("Failed to create {results_path:?}"))?;
    let detailed_path = config.paths.detailed_results();
    let detailed = File::create(&detailed_path).with_context(|| format!("Failed to create {detailed_path:?}"))?;
    let mut results = ResultWriter::with_detailed(BufWriter::new(compact), BufWriter::new(detailed));

    let reader = BufReader::new(File::open(input).with_context(|| format!("Failed to open {input:?}"))?);
    let summary = pipeline.run(reader, &mut results).context("Processing failed")?;

    println!("Processed: {}", summary.processed);
    println!("Accepted:  {}", summary.accepted);
    println!("Rejected:  {}", summary.rejected);
    println!("Malformed: {}", summary.malformed);
    if summary.seal_failures > 0 {
        println!("Seal failures: {}", summary.seal_failures);
    }
    println!("Blocks:    {}", pipeline.ledger().chain().len());
    println!("Results:   {}", results_path.display());

    Ok(())
}

fn print_chain(config: &Config) -> Result<()> {
    let chain = JsonChainStore::new(&config.paths.chain)
        .load()
        .context("Failed to load chain")?;
    println!("{}", serde_json::to_string_pretty(&chain)?);
    Ok(())
}
