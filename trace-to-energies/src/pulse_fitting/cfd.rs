use super::{Real, error::FitError};
use itertools::Itertools;

pub(crate) fn check_fraction(fraction: Real) -> Result<(), FitError> {
    if fraction > 0.0 && fraction < 1.0 {
        Ok(())
    } else {
        Err(FitError::InvalidFraction(fraction))
    }
}

/// Constant-fraction discrimination: the first sample strictly above
/// `min + fraction * (max - min)`, scanning from the start.
///
/// Returns `None` when no sample crosses the threshold; callers that
/// require a trigger map that to [`FitError::TriggerNotFound`].
pub(crate) fn locate(samples: &[Real], fraction: Real) -> Result<Option<usize>, FitError> {
    check_fraction(fraction)?;

    let (min, max) = match samples.iter().minmax().into_option() {
        Some((min, max)) => (*min, *max),
        None => return Ok(None),
    };
    let threshold = min + fraction * (max - min);
    Ok(samples.iter().position(|&sample| sample > threshold))
}
