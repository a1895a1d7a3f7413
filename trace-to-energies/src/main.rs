mod parameters;
mod processing;
mod pulse_fitting;

use anyhow::{Result, anyhow};
use clap::Parser;
use parameters::{CalibrationWrapper, Mode, Polarity};
use processing::{EnergyFitter, FitMode, build_template};
use pulse_fitting::{
    Real, Template, TemplateBuilder, align::DEFAULT_STAGES, cfd, template::TriggerAlignment,
};
use pulsefit_common::{
    EnergyCalibration, FitResult,
    store::{FitResultSink, InMemoryStore, WaveformSource},
};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::PathBuf,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wave_reader::load_waves;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Digitizer text file holding the waveform blocks
    #[clap(short, long)]
    waveforms: PathBuf,

    /// Maximum records to ingest, negative reads the whole stream
    #[clap(long, default_value = "-1", allow_hyphen_values = true)]
    cap: i64,

    /// Ingest only every k-th record
    #[clap(long, default_value = "1")]
    decimation: usize,

    /// Constant-fraction discrimination threshold fraction
    #[clap(long, default_value = "0.6")]
    cfd_fraction: Real,

    /// First sample of the baseline/detrend reference window
    #[clap(long, default_value = "0")]
    reference_start: usize,

    /// One past the last sample of the reference window
    #[clap(long, default_value = "1500")]
    reference_end: usize,

    /// Pulse polarity of the channel; negative channels are flipped on entry
    #[clap(long, value_enum, default_value_t = Polarity::Positive)]
    polarity: Polarity,

    /// Per-channel calibration `m,q` applied to fitted amplitudes
    #[clap(long)]
    calibration: Option<CalibrationWrapper>,

    /// Where to write fit results; one `event,amplitude,offset,shift,converged[,energy]` line each
    #[clap(short, long)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();
    info!(mode = %args.mode, "starting");

    cfd::check_fraction(args.cfd_fraction)?;
    let reference_window = args.reference_start..args.reference_end;

    let mut store = InMemoryStore::new();
    let mut reader = BufReader::new(File::open(&args.waveforms)?);
    let summary = load_waves(&mut reader, &mut store, args.cap, args.decimation)?;
    info!(
        records = summary.records_stored,
        truncated = summary.truncated,
        "ingested waveform records"
    );

    let record_length = store
        .get(0)
        .filter(|record| record.is_valid())
        .map(|record| record.record_length as usize)
        .ok_or_else(|| anyhow!("no valid waveform records in {}", args.waveforms.display()))?;

    match &args.mode {
        Mode::BuildTemplate(params) => {
            let mut prototype = TemplateBuilder::new();
            if let Some(bound) = params.saturation {
                prototype = prototype.with_saturation_bound(bound);
            }
            if let Some(bound) = params.low_signal {
                prototype = prototype.with_low_signal_bound(bound);
            }
            if let Some(post_trigger) = params.post_trigger {
                prototype = prototype.with_trigger_alignment(TriggerAlignment {
                    post_trigger,
                    cfd_fraction: args.cfd_fraction,
                });
            }

            let mut template = build_template(&store, &prototype, &reference_window, args.polarity)?;
            if let Some(points) = params.discard_points {
                template.zero_leading(points);
            }
            if params.clip_undershoot {
                let trigger = template
                    .trigger_index(args.cfd_fraction)?
                    .ok_or_else(|| anyhow!("template has no trigger crossing"))?;
                template.clip_undershoot(trigger);
            }
            template.save(&params.template_out)?;
            info!(
                samples = template.len(),
                path = %params.template_out.display(),
                "template written"
            );
        }
        Mode::WindowedFit(params) => {
            let template = Template::load(&params.template)?;
            let fitter = EnergyFitter::new(
                &template,
                record_length,
                reference_window,
                args.polarity,
                FitMode::Windowed {
                    window: params.fit_start..params.fit_end,
                },
            )?;
            run_batch(&fitter, &mut store, &args)?;
        }
        Mode::MatchedFilter(params) => {
            let template = Template::load(&params.template)?;
            let stages = if params.stages.is_empty() {
                DEFAULT_STAGES.to_vec()
            } else {
                params.stages.iter().map(|stage| stage.0).collect()
            };
            let fitter = EnergyFitter::new(
                &template,
                record_length,
                reference_window,
                args.polarity,
                FitMode::MatchedFilter {
                    cfd_fraction: args.cfd_fraction,
                    stages,
                    refine_cap: params.refine_cap,
                },
            )?;
            run_batch(&fitter, &mut store, &args)?;
        }
    }
    Ok(())
}

fn run_batch(fitter: &EnergyFitter, store: &mut InMemoryStore, args: &Cli) -> Result<()> {
    let results = fitter.process_batch(&*store);
    let fitted = results.iter().flatten().count();
    let non_converged = results
        .iter()
        .flatten()
        .filter(|result| !result.converged)
        .count();
    info!(
        events = results.len(),
        fitted,
        discarded = results.len() - fitted,
        non_converged,
        "batch complete"
    );

    for (index, result) in results.into_iter().enumerate() {
        if let Some(result) = result {
            store.append_result(index, result);
        }
    }
    write_results(store.results(), args)
}

fn write_results(results: &[(usize, FitResult)], args: &Cli) -> Result<()> {
    let calibration: Option<EnergyCalibration> =
        args.calibration.as_ref().map(|wrapper| wrapper.0);

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    for (index, result) in results {
        let line = format!(
            "{index},{},{},{},{}",
            result.amplitude, result.offset, result.shift, result.converged
        );
        match calibration {
            Some(calibration) => {
                writeln!(out, "{line},{}", calibration.energy(result.amplitude))?
            }
            None => writeln!(out, "{line}")?,
        }
    }
    out.flush()?;
    Ok(())
}
