use super::{Real, error::FitError};
use std::ops::Range;

/// Closed-form least-squares fit of a waveform segment against the
/// template: `wave[i] ≈ amplitude · template[i] + offset`. The amplitude is
/// the energy estimator; the offset absorbs any residual baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct LinearFit {
    pub(crate) amplitude: Real,
    pub(crate) offset: Real,
}

/// Ordinary least squares over `(template, wave)` pairs with the template
/// as the independent variable.
///
/// Fails on fewer than two pairs or on a template segment with no
/// variance; never returns a non-finite coefficient.
pub(crate) fn fit_pairs(
    pairs: impl Iterator<Item = (Real, Real)>,
) -> Result<LinearFit, FitError> {
    let mut count = 0usize;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for (x, y) in pairs {
        count += 1;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }
    if count < 2 {
        return Err(FitError::DegenerateTemplate);
    }

    let n = count as Real;
    let avg_x = sum_x / n;
    let avg_y = sum_y / n;
    let cov_xy = sum_xy / n - avg_x * avg_y;
    let var_x = sum_x2 / n - avg_x * avg_x;
    if !(var_x > 0.0) || !var_x.is_finite() {
        return Err(FitError::DegenerateTemplate);
    }

    let amplitude = cov_xy / var_x;
    let offset = avg_y - amplitude * avg_x;
    if !amplitude.is_finite() || !offset.is_finite() {
        return Err(FitError::DegenerateTemplate);
    }
    Ok(LinearFit { amplitude, offset })
}

/// Windowed fit of `wave[window]` against `template[window]`.
pub(crate) fn fit(
    template: &[Real],
    wave: &[Real],
    window: &Range<usize>,
) -> Result<LinearFit, FitError> {
    let len = template.len().min(wave.len());
    if window.start + 2 > window.end || window.end > len {
        return Err(FitError::DegenerateWindow {
            start: window.start,
            end: window.end,
            len,
        });
    }
    fit_pairs(window.clone().map(|i| (template[i], wave[i])))
}

/// Cyclic fit at an integer shift: pairs `template[k]` with
/// `wave[(k + shift) mod N]` over the full record.
///
/// Negative template samples are excluded, so only the positive lobe of
/// the template contributes to the correlation sums; the undershoot tail
/// would otherwise bias the amplitude estimate.
pub(crate) fn fit_shifted(
    template: &[Real],
    wave: &[Real],
    shift: i64,
) -> Result<LinearFit, FitError> {
    if template.len() != wave.len() {
        return Err(FitError::InconsistentLength {
            expected: template.len(),
            got: wave.len(),
        });
    }
    let n = wave.len() as i64;
    if n == 0 {
        return Err(FitError::DegenerateTemplate);
    }
    fit_pairs(
        template
            .iter()
            .enumerate()
            .filter(|&(_, &x)| x >= 0.0)
            .map(|(k, &x)| {
                let j = (k as i64 + shift).rem_euclid(n) as usize;
                (x, wave[j])
            }),
    )
}
