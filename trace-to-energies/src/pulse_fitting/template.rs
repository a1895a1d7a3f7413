use super::{Real, cfd, error::FitError, preprocess};
use itertools::Itertools;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    num::ParseFloatError,
    ops::Range,
    path::Path,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum TemplateIoError {
    #[error("template io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid template sample on line {line}: {source}")]
    Parse {
        line: usize,
        source: ParseFloatError,
    },
}

/// Normalized reference pulse shape for one detector channel.
///
/// Baseline-free, detrended, with the dominant excursion scaled to a unit
/// peak. Built once per channel and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Template {
    samples: Vec<Real>,
}

impl Template {
    #[cfg(test)]
    pub(crate) fn from_samples(samples: Vec<Real>) -> Self {
        Self { samples }
    }

    #[cfg(test)]
    pub(crate) fn samples(&self) -> &[Real] {
        &self.samples
    }

    pub(crate) fn len(&self) -> usize {
        self.samples.len()
    }

    /// CFD trigger index of the template itself, used to seed the per-event
    /// alignment search.
    pub(crate) fn trigger_index(&self, fraction: Real) -> Result<Option<usize>, FitError> {
        cfd::locate(&self.samples, fraction)
    }

    /// The template padded with zeros, or truncated, to `len` samples.
    pub(crate) fn extended_to(&self, len: usize) -> Vec<Real> {
        let mut extended = self.samples.clone();
        extended.resize(len, 0.0);
        extended
    }

    /// Zeroes the first `n` samples; the leading points of an averaged
    /// population carry acquisition artefacts rather than shape.
    pub(crate) fn zero_leading(&mut self, n: usize) {
        let n = n.min(self.samples.len());
        for sample in &mut self.samples[..n] {
            *sample = 0.0;
        }
    }

    /// Zeroes everything from the first negative sample at or after `from`,
    /// removing the undershoot tail.
    pub(crate) fn clip_undershoot(&mut self, from: usize) {
        if let Some(first) = self.samples[from.min(self.samples.len())..]
            .iter()
            .position(|&sample| sample < 0.0)
        {
            for sample in &mut self.samples[from + first..] {
                *sample = 0.0;
            }
        }
    }

    /// Writes the samples as plain text, one per line. The decimal
    /// rendering is shortest-roundtrip, so a reload reproduces the same
    /// bits.
    pub(crate) fn save(&self, path: &Path) -> Result<(), TemplateIoError> {
        let mut file = BufWriter::new(File::create(path)?);
        for sample in &self.samples {
            writeln!(file, "{sample}")?;
        }
        file.flush()?;
        Ok(())
    }

    pub(crate) fn load(path: &Path) -> Result<Self, TemplateIoError> {
        let text = fs::read_to_string(path)?;
        let samples = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                line.trim()
                    .parse()
                    .map_err(|source| TemplateIoError::Parse {
                        line: index + 1,
                        source,
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { samples })
    }
}

/// Optional trigger alignment of the accumulated population: each event is
/// displaced so its CFD crossing lands on the record's nominal trigger
/// position before entering the sum.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TriggerAlignment {
    /// Fraction of the record at which the digitizer places the trigger.
    pub(crate) post_trigger: Real,
    pub(crate) cfd_fraction: Real,
}

/// Accumulates equal-length waveforms into their elementwise mean.
///
/// Accumulators are mergeable, so a population can be summed as per-worker
/// partials and reduced at the end.
#[derive(Debug, Clone, Default)]
pub(crate) struct TemplateBuilder {
    sum: Vec<Real>,
    count: usize,
    saturation_bound: Option<Real>,
    low_signal_bound: Option<Real>,
    alignment: Option<TriggerAlignment>,
}

impl TemplateBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rejects events whose peak exceeds `bound` counts.
    pub(crate) fn with_saturation_bound(mut self, bound: Real) -> Self {
        self.saturation_bound = Some(bound);
        self
    }

    /// Rejects events whose peak falls below `bound` counts.
    pub(crate) fn with_low_signal_bound(mut self, bound: Real) -> Self {
        self.low_signal_bound = Some(bound);
        self
    }

    pub(crate) fn with_trigger_alignment(mut self, alignment: TriggerAlignment) -> Self {
        self.alignment = Some(alignment);
        self
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    /// Adds one waveform to the running sum. A rejected waveform leaves
    /// the sum untouched.
    pub(crate) fn accumulate(&mut self, samples: &[Real]) -> Result<(), FitError> {
        if self.count == 0 && self.sum.is_empty() {
            self.sum = vec![0.0; samples.len()];
        }
        if samples.len() != self.sum.len() {
            return Err(FitError::InconsistentLength {
                expected: self.sum.len(),
                got: samples.len(),
            });
        }

        let peak = samples.iter().cloned().fold(Real::NEG_INFINITY, Real::max);
        if let Some(bound) = self.saturation_bound {
            if peak > bound {
                return Err(FitError::Saturation { peak, bound });
            }
        }
        if let Some(bound) = self.low_signal_bound {
            if peak < bound {
                return Err(FitError::LowSignal { peak, bound });
            }
        }

        match self.alignment {
            None => {
                for (accumulated, &sample) in self.sum.iter_mut().zip(samples) {
                    *accumulated += sample;
                }
            }
            Some(alignment) => {
                let nominal = (samples.len() as Real * alignment.post_trigger).floor() as i64;
                let trigger = cfd::locate(samples, alignment.cfd_fraction)?
                    .ok_or(FitError::TriggerNotFound)? as i64;
                // A crossing well before the nominal trigger position is
                // noise, not the pulse edge.
                if (trigger as Real) < nominal as Real * 0.4 {
                    return Err(FitError::TriggerNotFound);
                }
                let shift = trigger - nominal;
                for (index, accumulated) in self.sum.iter_mut().enumerate() {
                    let source = index as i64 + shift;
                    if source >= 0 && (source as usize) < samples.len() {
                        *accumulated += samples[source as usize];
                    }
                }
            }
        }
        self.count += 1;
        Ok(())
    }

    /// Merges two partial accumulators.
    pub(crate) fn merge(mut self, other: Self) -> Result<Self, FitError> {
        if other.count == 0 {
            return Ok(self);
        }
        if self.count == 0 {
            self.sum = other.sum;
            self.count = other.count;
            return Ok(self);
        }
        if self.sum.len() != other.sum.len() {
            return Err(FitError::InconsistentLength {
                expected: self.sum.len(),
                got: other.sum.len(),
            });
        }
        for (accumulated, sample) in self.sum.iter_mut().zip(other.sum) {
            *accumulated += sample;
        }
        self.count += other.count;
        Ok(self)
    }

    /// Elementwise mean of the population, baseline corrected and detrended
    /// over `reference_window`, then normalized so the dominant excursion
    /// becomes a unit peak.
    pub(crate) fn build(self, reference_window: &Range<usize>) -> Result<Template, FitError> {
        if self.count == 0 {
            return Err(FitError::EmptyPopulation);
        }
        let mut average = self.sum;
        for sample in &mut average {
            *sample /= self.count as Real;
        }
        preprocess::baseline_correct(&mut average, reference_window)?;
        preprocess::detrend(&mut average, reference_window)?;

        let (min, max) = match average.iter().minmax().into_option() {
            Some((min, max)) => (*min, *max),
            None => return Err(FitError::DegenerateTemplate),
        };
        // Whichever excursion lies farther from zero becomes the positive
        // unit peak, so negative-going channels produce the same template
        // orientation as positive-going ones.
        let scale = if max > -min { 1.0 / max } else { -1.0 / min };
        if !scale.is_finite() {
            return Err(FitError::DegenerateTemplate);
        }
        for sample in &mut average {
            *sample *= scale;
        }
        Ok(Template { samples: average })
    }
}
