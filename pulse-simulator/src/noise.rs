use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum NoiseSource {
    Gaussian { sd: f64 },
    /// Uniform noise low-pass filtered by an exponential moving average,
    /// giving correlated sample-to-sample fluctuation.
    SmoothUniform { max: f64, factor: f64 },
}

#[derive(Debug, Error)]
pub enum NoiseError {
    #[error("gaussian noise sd {0} is not a positive finite number")]
    InvalidSd(f64),
    #[error("smoothing factor {0} is outside (0, 1]")]
    InvalidFactor(f64),
}

/// Stateful per-record noise sampler built from a [`NoiseSource`].
pub(crate) enum Noise {
    Gaussian(Normal<f64>),
    SmoothUniform { max: f64, factor: f64, prev: f64 },
}

impl Noise {
    pub(crate) fn new(source: &NoiseSource) -> Result<Self, NoiseError> {
        match *source {
            NoiseSource::Gaussian { sd } => Normal::new(0.0, sd)
                .map(Self::Gaussian)
                .map_err(|_| NoiseError::InvalidSd(sd)),
            NoiseSource::SmoothUniform { max, factor } => {
                if factor > 0.0 && factor <= 1.0 {
                    Ok(Self::SmoothUniform {
                        max,
                        factor,
                        prev: f64::default(),
                    })
                } else {
                    Err(NoiseError::InvalidFactor(factor))
                }
            }
        }
    }

    pub(crate) fn sample(&mut self, rng: &mut impl Rng) -> f64 {
        match self {
            Self::Gaussian(normal) => normal.sample(rng),
            Self::SmoothUniform { max, factor, prev } => {
                *prev = *prev * (1.0 - *factor) + rng.random_range(-1.0..1.0) * *factor;
                *max * *prev
            }
        }
    }
}
