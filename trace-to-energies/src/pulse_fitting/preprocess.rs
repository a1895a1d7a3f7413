use super::{Real, error::FitError};
use std::ops::Range;

/// A usable window has at least two samples and lies inside the slice.
pub(crate) fn check_window(window: &Range<usize>, len: usize) -> Result<(), FitError> {
    if window.start + 2 <= window.end && window.end <= len {
        Ok(())
    } else {
        Err(FitError::DegenerateWindow {
            start: window.start,
            end: window.end,
            len,
        })
    }
}

/// Subtracts the mean of `samples[window]` from every sample of the slice.
pub(crate) fn baseline_correct(samples: &mut [Real], window: &Range<usize>) -> Result<(), FitError> {
    check_window(window, samples.len())?;
    let mean = samples[window.clone()].iter().sum::<Real>() / window.len() as Real;
    for sample in samples.iter_mut() {
        *sample -= mean;
    }
    Ok(())
}

/// Fits a line to `samples[window]` by least squares over the sample index
/// and subtracts it from the whole slice; the trend observed in the
/// reference window is extrapolated across the full record.
pub(crate) fn detrend(samples: &mut [Real], window: &Range<usize>) -> Result<(), FitError> {
    check_window(window, samples.len())?;

    let n = window.len() as Real;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for index in window.clone() {
        let x = index as Real;
        let y = samples[index];
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }
    let avg_x = sum_x / n;
    let avg_y = sum_y / n;
    let cov_xy = sum_xy / n - avg_x * avg_y;
    // With two or more distinct indices in the window the index variance
    // is always positive.
    let var_x = sum_x2 / n - avg_x * avg_x;

    let slope = cov_xy / var_x;
    let intercept = avg_y - slope * avg_x;
    for (index, sample) in samples.iter_mut().enumerate() {
        *sample -= slope * index as Real + intercept;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn baseline_window_mean_becomes_zero() {
        let mut samples = vec![5.0, 7.0, 6.0, 8.0, 100.0, 200.0];
        baseline_correct(&mut samples, &(0..4)).expect("window is valid");

        let mean: f64 = samples[0..4].iter().sum::<f64>() / 4.0;
        assert_approx_eq!(mean, 0.0, 1e-12);
        // Samples outside the window get the same shift.
        assert_approx_eq!(samples[4], 100.0 - 6.5, 1e-12);
        assert_approx_eq!(samples[5], 200.0 - 6.5, 1e-12);
    }

    #[test]
    fn detrend_removes_the_window_slope() {
        // y = 3x + 2 over the whole record, fitted over a partial window.
        let mut samples: Vec<f64> = (0..100).map(|i| 3.0 * i as f64 + 2.0).collect();
        detrend(&mut samples, &(0..40)).expect("window is valid");

        for sample in &samples {
            assert_approx_eq!(*sample, 0.0, 1e-8);
        }
    }

    #[test]
    fn detrend_leaves_residuals_with_zero_slope() {
        let mut samples: Vec<f64> = (0..50)
            .map(|i| 0.7 * i as f64 - 4.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        detrend(&mut samples, &(0..50)).expect("window is valid");

        // Refit the window; the residual slope must vanish.
        let n = 50.0;
        let sum_x: f64 = (0..50).map(|i| i as f64).sum();
        let sum_y: f64 = samples.iter().sum();
        let sum_xy: f64 = samples.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
        let sum_x2: f64 = (0..50).map(|i| (i as f64) * (i as f64)).sum();
        let slope = (sum_xy / n - sum_x / n * sum_y / n) / (sum_x2 / n - (sum_x / n).powi(2));
        assert_approx_eq!(slope, 0.0, 1e-10);
    }

    #[test]
    fn degenerate_windows_are_rejected() {
        let mut samples = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            baseline_correct(&mut samples, &(1..1)),
            Err(FitError::DegenerateWindow { .. })
        ));
        assert!(matches!(
            baseline_correct(&mut samples, &(2..3)),
            Err(FitError::DegenerateWindow { .. })
        ));
        assert!(matches!(
            detrend(&mut samples, &(1..9)),
            Err(FitError::DegenerateWindow { .. })
        ));
    }
}
