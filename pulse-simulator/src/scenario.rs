use crate::{
    noise::{Noise, NoiseError, NoiseSource},
    pulse::PulseShape,
};
use pulsefit_common::{BoardId, Channel, record::WaveformRecord};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", untagged)]
pub enum Amplitude {
    Constant(f64),
    Uniform { min: f64, max: f64 },
}

impl Amplitude {
    fn sample(&self, rng: &mut impl Rng) -> f64 {
        match *self {
            Self::Constant(value) => value,
            Self::Uniform { min, max } => rng.random_range(min..max),
        }
    }
}

/// One synthetic acquisition run: a population of pulses of a common shape
/// on a noisy, drifting baseline.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Scenario {
    pub record_length: usize,
    pub events: usize,
    pub baseline: f64,
    #[serde(default)]
    pub drift_per_sample: f64,
    /// Maximum trigger jitter in samples; each event's pulse is displaced
    /// by a uniform integer in `[-jitter, jitter]`.
    #[serde(default)]
    pub trigger_jitter: i64,
    pub pulse: PulseShape,
    pub amplitude: Amplitude,
    #[serde(default)]
    pub noise: Option<NoiseSource>,
    #[serde(default)]
    pub board_id: BoardId,
    #[serde(default)]
    pub channel: Channel,
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("scenario has a zero record length")]
    ZeroRecordLength,
    #[error(transparent)]
    Noise(#[from] NoiseError),
}

/// Generates the scenario's waveform population. The same seed always
/// reproduces the same records.
pub fn generate(scenario: &Scenario, seed: u64) -> Result<Vec<WaveformRecord>, ScenarioError> {
    if scenario.record_length == 0 {
        return Err(ScenarioError::ZeroRecordLength);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(scenario.events);

    for event in 0..scenario.events {
        let displacement = if scenario.trigger_jitter > 0 {
            rng.random_range(-scenario.trigger_jitter..=scenario.trigger_jitter)
        } else {
            0
        };
        let amplitude = scenario.amplitude.sample(&mut rng);
        let mut noise = scenario.noise.as_ref().map(Noise::new).transpose()?;

        let samples = (0..scenario.record_length)
            .map(|index| {
                let time = index as f64 - displacement as f64;
                let mut value = scenario.baseline
                    + scenario.drift_per_sample * index as f64
                    + amplitude * scenario.pulse.value_at(time);
                if let Some(noise) = noise.as_mut() {
                    value += noise.sample(&mut rng);
                }
                value
            })
            .collect();

        records.push(WaveformRecord {
            record_length: scenario.record_length as i32,
            board_id: scenario.board_id,
            channel: scenario.channel,
            event_number: event as u32,
            pattern: "0x0000".to_owned(),
            trigger_timestamp: event as i64 * 1000,
            dc_offset: 0x3333,
            samples,
        });
    }
    Ok(records)
}
