use super::Real;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub(crate) enum FitError {
    #[error("window [{start}, {end}) is degenerate for a slice of {len} samples")]
    DegenerateWindow {
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("template population is empty")]
    EmptyPopulation,
    #[error("record of {got} samples does not match {expected}")]
    InconsistentLength { expected: usize, got: usize },
    #[error("CFD fraction {0} is outside (0, 1)")]
    InvalidFraction(Real),
    #[error("no sample crosses the trigger threshold")]
    TriggerNotFound,
    #[error("peak {peak} exceeds the saturation bound {bound}")]
    Saturation { peak: Real, bound: Real },
    #[error("peak {peak} is below the low-signal bound {bound}")]
    LowSignal { peak: Real, bound: Real },
    #[error("template segment has no usable variance")]
    DegenerateTemplate,
    #[error("alignment search window resolved to zero candidates")]
    EmptySearchWindow,
}

impl FitError {
    /// Errors that discard a single event; the batch carries on. The
    /// remaining kinds are configuration or population problems, fatal
    /// before any processing starts.
    pub(crate) fn is_event_scoped(&self) -> bool {
        matches!(
            self,
            Self::DegenerateWindow { .. }
                | Self::InconsistentLength { .. }
                | Self::TriggerNotFound
                | Self::Saturation { .. }
                | Self::LowSignal { .. }
                | Self::DegenerateTemplate
                | Self::EmptySearchWindow
        )
    }
}
