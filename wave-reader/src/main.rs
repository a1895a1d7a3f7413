use anyhow::{Result, anyhow};
use clap::Parser;
use pulsefit_common::store::InMemoryStore;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wave_reader::{load_waves, quick_scan};

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Directory containing digitizer wave<N>.txt files
    #[clap(short, long)]
    path: PathBuf,

    /// Maximum number of records to read per file, negative reads the whole stream
    #[clap(short = 'n', long, default_value = "-1", allow_hyphen_values = true)]
    number_of_waves: i64,

    /// Keep only every k-th record
    #[clap(short, long, default_value = "1")]
    decimation: usize,

    /// Count record blocks without materialising them
    #[clap(long, default_value = "false")]
    scan_only: bool,
}

fn wave_files(path: &Path) -> Result<Vec<PathBuf>> {
    let pattern = path.join("wave[0-9]*.txt");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| anyhow!("path {} is not valid UTF-8", path.display()))?;
    let mut files = glob::glob(pattern)?.collect::<Result<Vec<_>, _>>()?;
    files.sort();
    Ok(files)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();

    let files = wave_files(&args.path)?;
    if files.is_empty() {
        return Err(anyhow!(
            "no digitizer wave files found under {}",
            args.path.display()
        ));
    }
    info!(count = files.len(), "found digitizer wave files");

    for file in files {
        let mut reader = BufReader::new(File::open(&file)?);
        if args.scan_only {
            let events = quick_scan(reader)?;
            info!(file = %file.display(), events, "scanned");
        } else {
            let mut store = InMemoryStore::new();
            let summary = load_waves(
                &mut reader,
                &mut store,
                args.number_of_waves,
                args.decimation,
            )?;
            info!(
                file = %file.display(),
                blocks = summary.blocks_read,
                stored = summary.records_stored,
                truncated = summary.truncated,
                "ingested"
            );
        }
    }
    Ok(())
}
