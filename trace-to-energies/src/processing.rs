use crate::parameters::Polarity;
use crate::pulse_fitting::{
    FitError, Real, SearchStage, Template, TemplateBuilder, align, cfd, fit, preprocess,
};
use pulsefit_common::{FitResult, record::WaveformRecord, store::WaveformSource};
use rayon::prelude::*;
use std::ops::Range;
use tracing::{error, warn};

/// How the final amplitude estimate is obtained for each event.
#[derive(Debug, Clone)]
pub(crate) enum FitMode {
    /// Direct fit over a fixed window; pulses are assumed already
    /// time-aligned.
    Windowed { window: Range<usize> },
    /// CFD-seeded multi-resolution alignment search.
    MatchedFilter {
        cfd_fraction: Real,
        stages: Vec<SearchStage>,
        refine_cap: usize,
    },
}

/// Shared read-only state for one batch run: the template (extended to the
/// record length for the cyclic search) and the preprocessing windows.
/// Construction validates the configuration; setup failures are fatal
/// before any event is processed.
pub(crate) struct EnergyFitter {
    template: Vec<Real>,
    template_trigger: i64,
    reference_window: Range<usize>,
    polarity: Polarity,
    mode: FitMode,
}

impl EnergyFitter {
    pub(crate) fn new(
        template: &Template,
        record_length: usize,
        reference_window: Range<usize>,
        polarity: Polarity,
        mode: FitMode,
    ) -> Result<Self, FitError> {
        preprocess::check_window(&reference_window, record_length)?;

        let template_trigger = match &mode {
            FitMode::Windowed { window } => {
                preprocess::check_window(window, record_length.min(template.len()))?;
                0
            }
            FitMode::MatchedFilter {
                cfd_fraction,
                stages,
                ..
            } => {
                if stages.is_empty() {
                    return Err(FitError::EmptySearchWindow);
                }
                template
                    .trigger_index(*cfd_fraction)?
                    .ok_or(FitError::TriggerNotFound)? as i64
            }
        };

        Ok(Self {
            template: template.extended_to(record_length),
            template_trigger,
            reference_window,
            polarity,
            mode,
        })
    }

    /// Fits one record. Event-scoped failures discard the event.
    pub(crate) fn process_record(&self, record: &WaveformRecord) -> Result<FitResult, FitError> {
        let mut samples = record.samples.clone();
        self.polarity.apply(&mut samples);
        preprocess::baseline_correct(&mut samples, &self.reference_window)?;
        preprocess::detrend(&mut samples, &self.reference_window)?;

        match &self.mode {
            FitMode::Windowed { window } => {
                let fit = fit::fit(&self.template, &samples, window)?;
                Ok(FitResult {
                    amplitude: fit.amplitude,
                    offset: fit.offset,
                    shift: 0,
                    converged: true,
                })
            }
            FitMode::MatchedFilter {
                cfd_fraction,
                stages,
                refine_cap,
            } => {
                let trigger = cfd::locate(&samples, *cfd_fraction)?
                    .ok_or(FitError::TriggerNotFound)? as i64;
                let centre = trigger - self.template_trigger;
                let alignment =
                    align::align(&self.template, &samples, centre, stages, *refine_cap)?;
                Ok(FitResult {
                    amplitude: alignment.fit.amplitude,
                    offset: alignment.fit.offset,
                    shift: alignment.shift,
                    converged: alignment.converged,
                })
            }
        }
    }

    /// Fits every record of the source in parallel. Workers own their
    /// event's working copy and write to preassigned output slots, so the
    /// result vector needs no lock; discarded events leave `None` in their
    /// slot.
    pub(crate) fn process_batch(
        &self,
        source: &(impl WaveformSource + Sync),
    ) -> Vec<Option<FitResult>> {
        (0..source.size())
            .into_par_iter()
            .map(|index| {
                let record = source.get(index)?;
                if !record.is_valid() {
                    warn!(index, "skipping invalid record");
                    return None;
                }
                match self.process_record(record) {
                    Ok(result) => Some(result),
                    Err(e) if e.is_event_scoped() => {
                        warn!(index, %e, "event discarded");
                        None
                    }
                    Err(e) => {
                        error!(index, %e, "event discarded");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Sums a waveform population into a template, using per-worker partial
/// accumulators merged at the end. Events the builder rejects are logged
/// and excluded; they never corrupt the running sum.
pub(crate) fn build_template(
    source: &(impl WaveformSource + Sync),
    prototype: &TemplateBuilder,
    reference_window: &Range<usize>,
    polarity: Polarity,
) -> Result<Template, FitError> {
    let builder = (0..source.size())
        .into_par_iter()
        .fold(
            || prototype.clone(),
            |mut partial, index| {
                let Some(record) = source.get(index) else {
                    return partial;
                };
                if !record.is_valid() {
                    warn!(index, "skipping invalid record");
                    return partial;
                }
                let mut samples = record.samples.clone();
                polarity.apply(&mut samples);
                if let Err(e) = partial.accumulate(&samples) {
                    warn!(index, %e, "event excluded from template");
                }
                partial
            },
        )
        .map(Ok)
        .try_reduce(|| prototype.clone(), TemplateBuilder::merge)?;

    builder.build(reference_window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use pulse_simulator::{Amplitude, NoiseSource, PulseShape, Scenario, generate};

    const RECORD_LENGTH: usize = 2000;
    const REFERENCE_WINDOW: Range<usize> = 0..400;
    const TRUE_AMPLITUDE: f64 = 1200.0;

    fn scenario(events: usize, jitter: i64) -> Scenario {
        Scenario {
            record_length: RECORD_LENGTH,
            events,
            baseline: 800.0,
            drift_per_sample: 0.005,
            trigger_jitter: jitter,
            pulse: PulseShape::Biexp {
                start: 600.0,
                rise: 8.0,
                decay: 80.0,
                peak_height: 1.0,
            },
            amplitude: Amplitude::Constant(TRUE_AMPLITUDE),
            noise: Some(NoiseSource::Gaussian { sd: 2.0 }),
            board_id: 31,
            channel: 0,
        }
    }

    fn stages() -> Vec<SearchStage> {
        vec![
            SearchStage {
                radius: 120,
                stride: 10,
            },
            SearchStage {
                radius: 12,
                stride: 1,
            },
        ]
    }

    fn template_from(records: &[WaveformRecord]) -> Template {
        build_template(
            &records.to_vec(),
            &TemplateBuilder::new(),
            &REFERENCE_WINDOW,
            Polarity::Positive,
        )
        .expect("population is valid")
    }

    #[test]
    fn windowed_fit_recovers_the_true_amplitude() {
        let template = template_from(&generate(&scenario(100, 0), 1).expect("scenario is valid"));
        let held_out = generate(&scenario(10, 0), 2).expect("scenario is valid");

        let fitter = EnergyFitter::new(
            &template,
            RECORD_LENGTH,
            REFERENCE_WINDOW,
            Polarity::Positive,
            FitMode::Windowed { window: 550..1400 },
        )
        .expect("configuration is valid");

        let results = fitter.process_batch(&held_out);
        assert_eq!(results.len(), 10);
        for result in results {
            let result = result.expect("event fits");
            assert!(
                (result.amplitude - TRUE_AMPLITUDE).abs() < 0.02 * TRUE_AMPLITUDE,
                "amplitude {}",
                result.amplitude
            );
        }
    }

    #[test]
    fn matched_filter_recovers_amplitude_under_trigger_jitter() {
        let template = template_from(&generate(&scenario(100, 0), 3).expect("scenario is valid"));
        let held_out = generate(&scenario(10, 40), 4).expect("scenario is valid");

        let fitter = EnergyFitter::new(
            &template,
            RECORD_LENGTH,
            REFERENCE_WINDOW,
            Polarity::Positive,
            FitMode::MatchedFilter {
                cfd_fraction: 0.6,
                stages: stages(),
                refine_cap: 50,
            },
        )
        .expect("configuration is valid");

        let results = fitter.process_batch(&held_out);
        for result in results {
            let result = result.expect("event fits");
            assert!(
                (result.amplitude - TRUE_AMPLITUDE).abs() < 0.02 * TRUE_AMPLITUDE,
                "amplitude {}",
                result.amplitude
            );
            assert!(result.shift.abs() <= 42, "shift {}", result.shift);
        }
    }

    #[test]
    fn flat_events_are_discarded_not_fatal() {
        let template = template_from(&generate(&scenario(50, 0), 5).expect("scenario is valid"));
        let mut records = generate(&scenario(3, 0), 6).expect("scenario is valid");
        // A flat trace has no CFD crossing once preprocessed.
        records[1].samples = vec![800.0; RECORD_LENGTH];

        let fitter = EnergyFitter::new(
            &template,
            RECORD_LENGTH,
            REFERENCE_WINDOW,
            Polarity::Positive,
            FitMode::MatchedFilter {
                cfd_fraction: 0.6,
                stages: stages(),
                refine_cap: 50,
            },
        )
        .expect("configuration is valid");

        let results = fitter.process_batch(&records);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
        assert!(results[2].is_some());
    }

    #[test]
    fn invalid_records_leave_empty_slots() {
        let template = template_from(&generate(&scenario(50, 0), 7).expect("scenario is valid"));
        let mut records = generate(&scenario(2, 0), 8).expect("scenario is valid");
        records.push(WaveformRecord::invalid());

        let fitter = EnergyFitter::new(
            &template,
            RECORD_LENGTH,
            REFERENCE_WINDOW,
            Polarity::Positive,
            FitMode::Windowed { window: 550..1400 },
        )
        .expect("configuration is valid");

        let results = fitter.process_batch(&records);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_some());
        assert!(results[1].is_some());
        assert!(results[2].is_none());
    }

    #[test]
    fn bad_configuration_fails_before_processing() {
        let template = template_from(&generate(&scenario(20, 0), 9).expect("scenario is valid"));

        assert!(matches!(
            EnergyFitter::new(
                &template,
                RECORD_LENGTH,
                0..RECORD_LENGTH + 1,
                Polarity::Positive,
                FitMode::Windowed { window: 550..1400 },
            ),
            Err(FitError::DegenerateWindow { .. })
        ));

        assert!(matches!(
            EnergyFitter::new(
                &template,
                RECORD_LENGTH,
                REFERENCE_WINDOW,
                Polarity::Positive,
                FitMode::MatchedFilter {
                    cfd_fraction: 1.5,
                    stages: stages(),
                    refine_cap: 50,
                },
            ),
            Err(FitError::InvalidFraction(_))
        ));

        assert!(matches!(
            EnergyFitter::new(
                &template,
                RECORD_LENGTH,
                REFERENCE_WINDOW,
                Polarity::Positive,
                FitMode::MatchedFilter {
                    cfd_fraction: 0.6,
                    stages: Vec::new(),
                    refine_cap: 50,
                },
            ),
            Err(FitError::EmptySearchWindow)
        ));
    }

    #[test]
    fn negative_channel_recovers_amplitude_after_polarity_flip() {
        let mut negative = scenario(100, 0);
        negative.amplitude = Amplitude::Constant(-TRUE_AMPLITUDE);
        let template = build_template(
            &generate(&negative, 11).expect("scenario is valid"),
            &TemplateBuilder::new(),
            &REFERENCE_WINDOW,
            Polarity::Negative,
        )
        .expect("population is valid");

        negative.events = 10;
        negative.trigger_jitter = 30;
        let held_out = generate(&negative, 12).expect("scenario is valid");

        let fitter = EnergyFitter::new(
            &template,
            RECORD_LENGTH,
            REFERENCE_WINDOW,
            Polarity::Negative,
            FitMode::MatchedFilter {
                cfd_fraction: 0.6,
                stages: stages(),
                refine_cap: 50,
            },
        )
        .expect("configuration is valid");

        for result in fitter.process_batch(&held_out) {
            let result = result.expect("event fits");
            assert!(
                (result.amplitude - TRUE_AMPLITUDE).abs() < 0.02 * TRUE_AMPLITUDE,
                "amplitude {}",
                result.amplitude
            );
        }
    }

    #[test]
    fn saturated_events_are_excluded_from_the_template() {
        let mut records = generate(&scenario(40, 0), 10).expect("scenario is valid");
        let clean_template = template_from(&records);

        // Saturate a few events well past the band.
        for record in records.iter_mut().take(5) {
            for sample in &mut record.samples {
                *sample *= 20.0;
            }
        }
        let prototype = TemplateBuilder::new().with_saturation_bound(16_000.0);
        let banded = build_template(
            &records.to_vec(),
            &prototype,
            &REFERENCE_WINDOW,
            Polarity::Positive,
        )
        .expect("population is valid");

        // The surviving population is smaller but the normalized shape is
        // unchanged within noise.
        for (a, b) in clean_template.samples().iter().zip(banded.samples()) {
            assert_approx_eq!(a, b, 0.05);
        }
    }
}
