//! Synthetic digitizer waveform generation.
//!
//! Builds populations of pulse records with configurable shape, amplitude
//! distribution, baseline drift, trigger jitter and noise, for fixture
//! files and reconstruction tests. Scenarios are described in JSON and
//! generated deterministically from a seed.

pub mod noise;
pub mod pulse;
pub mod scenario;
pub mod writer;

pub use noise::NoiseSource;
pub use pulse::PulseShape;
pub use scenario::{Amplitude, Scenario, ScenarioError, generate};
pub use writer::write_digitizer_file;
