use serde::Deserialize;

/// Analytic pulse shapes evaluated per sample index.
///
/// Shapes are positioned in absolute sample time; the generator shifts them
/// per event to model trigger jitter. Configure a unit peak height so the
/// sampled event amplitude scales the shape directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "kebab-case", tag = "type")]
pub enum PulseShape {
    Gaussian {
        peak_time: f64,
        sd: f64,
        peak_height: f64,
    },
    /// Biexponential `A(e^{-t/decay} - e^{-t/rise})` starting at `start`,
    /// with the coefficient chosen so the maximum equals `peak_height`.
    Biexp {
        start: f64,
        rise: f64,
        decay: f64,
        peak_height: f64,
    },
}

impl PulseShape {
    /// Sample time at which the shape reaches its peak.
    pub fn peak_time(&self) -> f64 {
        match *self {
            Self::Gaussian { peak_time, .. } => peak_time,
            Self::Biexp {
                start, rise, decay, ..
            } => start + biexp_peak_time(rise, decay),
        }
    }

    pub fn value_at(&self, time: f64) -> f64 {
        match *self {
            Self::Gaussian {
                peak_time,
                sd,
                peak_height,
            } => peak_height * f64::exp(-0.5 * f64::powi((time - peak_time) / sd, 2)),
            Self::Biexp {
                start,
                rise,
                decay,
                peak_height,
            } => {
                if time < start {
                    f64::default()
                } else {
                    let time = time - start;
                    let coef = peak_height / biexp_peak_value(rise, decay);
                    coef * (f64::exp(-time / decay) - f64::exp(-time / rise))
                }
            }
        }
    }
}

/* f(t) = e^{-t/decay} - e^{-t/rise}
   f'(t') = 0 at t' = decay*rise/(decay - rise) * ln(decay/rise) */

fn biexp_peak_time(rise: f64, decay: f64) -> f64 {
    decay * rise / (decay - rise) * f64::ln(decay / rise)
}

fn biexp_peak_value(rise: f64, decay: f64) -> f64 {
    let peak_time = biexp_peak_time(rise, decay);
    f64::exp(-peak_time / decay) - f64::exp(-peak_time / rise)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn gaussian_peaks_at_peak_time() {
        let shape = PulseShape::Gaussian {
            peak_time: 100.0,
            sd: 10.0,
            peak_height: 3.0,
        };
        assert_approx_eq!(shape.value_at(100.0), 3.0);
        assert!(shape.value_at(90.0) < 3.0);
        assert_approx_eq!(shape.value_at(90.0), shape.value_at(110.0));
    }

    #[test]
    fn biexp_reaches_configured_peak() {
        let shape = PulseShape::Biexp {
            start: 50.0,
            rise: 5.0,
            decay: 40.0,
            peak_height: 2.0,
        };
        let peak_time = shape.peak_time();
        assert!(peak_time > 50.0);
        assert_approx_eq!(shape.value_at(peak_time), 2.0, 1e-9);
        assert_eq!(shape.value_at(49.0), 0.0);
        assert!(shape.value_at(peak_time + 1.0) < 2.0);
        assert!(shape.value_at(peak_time - 1.0) < 2.0);
    }
}
