use anyhow::Result;
use clap::Parser;
use pulse_simulator::{Scenario, generate, write_digitizer_file};
use std::{fs, path::PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// JSON scenario describing the pulse population
    #[clap(short, long)]
    config: PathBuf,

    /// Directory to write wave<N>.txt files into
    #[clap(short, long)]
    output: PathBuf,

    /// Number of wave files to produce, seeded consecutively
    #[clap(short, long, default_value = "1")]
    files: usize,

    /// Seed of the first file
    #[clap(short, long, default_value = "0")]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();

    let scenario: Scenario = serde_json::from_str(&fs::read_to_string(&args.config)?)?;
    fs::create_dir_all(&args.output)?;

    for index in 0..args.files {
        let records = generate(&scenario, args.seed + index as u64)?;
        let path = args.output.join(format!("wave{index}.txt"));
        write_digitizer_file(&path, &records)?;
        info!(file = %path.display(), events = records.len(), "wrote digitizer file");
    }
    Ok(())
}
