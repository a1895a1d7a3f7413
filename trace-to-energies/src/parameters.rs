use crate::pulse_fitting::{Real, SearchStage, align::DEFAULT_REFINE_CAP};
use anyhow::{Error, anyhow};
use clap::{Parser, Subcommand};
use pulsefit_common::EnergyCalibration;
use std::{path::PathBuf, str::FromStr};

/// Whether the channel's pulses rise or dip from the baseline. Negative
/// channels are flipped on entry, so every downstream stage sees
/// positive-going pulses and one calibration sign convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum Polarity {
    #[default]
    Positive,
    Negative,
}

impl Polarity {
    pub(crate) fn apply(&self, samples: &mut [Real]) {
        if matches!(self, Self::Negative) {
            for sample in samples.iter_mut() {
                *sample = -*sample;
            }
        }
    }
}

/// `radius,stride` pair for one alignment stage.
#[derive(Debug, Clone)]
pub(crate) struct SearchStageWrapper(pub(crate) SearchStage);

impl FromStr for SearchStageWrapper {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vals: Vec<_> = s.split(',').collect();
        if let [radius, stride] = vals[..] {
            let stage = SearchStage {
                radius: i64::from_str(radius.trim())?,
                stride: i64::from_str(stride.trim())?,
            };
            if stage.radius <= 0 || stage.stride <= 0 {
                return Err(anyhow!(
                    "search stage radius and stride must be positive, got '{s}'"
                ));
            }
            Ok(SearchStageWrapper(stage))
        } else {
            Err(anyhow!(
                "incorrect number of parameters in search stage, expected pattern '*,*', got '{s}'"
            ))
        }
    }
}

/// `m,q` calibration pair mapping fit amplitude to energy.
#[derive(Debug, Clone)]
pub(crate) struct CalibrationWrapper(pub(crate) EnergyCalibration);

impl FromStr for CalibrationWrapper {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vals: Vec<_> = s.split(',').collect();
        if let [gain, intercept] = vals[..] {
            Ok(CalibrationWrapper(EnergyCalibration {
                gain: Real::from_str(gain.trim())?,
                intercept: Real::from_str(intercept.trim())?,
            }))
        } else {
            Err(anyhow!(
                "incorrect number of parameters in calibration, expected pattern 'm,q', got '{s}'"
            ))
        }
    }
}

#[derive(Debug, Subcommand, strum::Display)]
pub(crate) enum Mode {
    #[clap(about = "Averages a waveform population into a normalized template and writes it out")]
    #[strum(to_string = "build-template")]
    BuildTemplate(BuildTemplateParameters),
    #[clap(
        about = "Fits every event against the template over a fixed sample window; for pulses with negligible timing jitter"
    )]
    #[strum(to_string = "windowed-fit")]
    WindowedFit(WindowedFitParameters),
    #[clap(
        about = "Runs the full matched-filter alignment search per event, seeded by constant-fraction discrimination"
    )]
    #[strum(to_string = "matched-filter")]
    MatchedFilter(MatchedFilterParameters),
}

#[derive(Debug, Clone, Parser)]
pub(crate) struct BuildTemplateParameters {
    /// Where to write the template samples
    #[clap(long)]
    pub(crate) template_out: PathBuf,

    /// Reject events whose peak exceeds this many counts
    #[clap(long)]
    pub(crate) saturation: Option<Real>,

    /// Reject events whose peak falls below this many counts
    #[clap(long)]
    pub(crate) low_signal: Option<Real>,

    /// Align each event on its CFD crossing before summing, with the
    /// trigger nominally at this fraction of the record
    #[clap(long)]
    pub(crate) post_trigger: Option<Real>,

    /// Zero the first N samples of the built template
    #[clap(long)]
    pub(crate) discard_points: Option<usize>,

    /// Zero the undershoot tail after the first negative excursion past the trigger
    #[clap(long, default_value = "false")]
    pub(crate) clip_undershoot: bool,
}

#[derive(Debug, Clone, Parser)]
pub(crate) struct WindowedFitParameters {
    /// Previously built template to fit against
    #[clap(long)]
    pub(crate) template: PathBuf,

    /// First sample of the fit window
    #[clap(long)]
    pub(crate) fit_start: usize,

    /// One past the last sample of the fit window
    #[clap(long)]
    pub(crate) fit_end: usize,
}

#[derive(Debug, Clone, Parser)]
pub(crate) struct MatchedFilterParameters {
    /// Previously built template to fit against
    #[clap(long)]
    pub(crate) template: PathBuf,

    /// Alignment stages as `radius,stride` pairs, coarse to fine
    #[clap(long = "stage")]
    pub(crate) stages: Vec<SearchStageWrapper>,

    /// Maximum refinement passes of the finest stage
    #[clap(long, default_value_t = DEFAULT_REFINE_CAP)]
    pub(crate) refine_cap: usize,
}
