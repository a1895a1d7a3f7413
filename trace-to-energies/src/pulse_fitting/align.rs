use super::{
    Real,
    error::FitError,
    fit::{LinearFit, fit_shifted},
};

/// One stage of the coarse-to-fine shift search: candidate shifts are
/// scanned over `[centre - radius, centre + radius)` at `stride` samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SearchStage {
    pub(crate) radius: i64,
    pub(crate) stride: i64,
}

/// The stage ladder used when none is configured.
pub(crate) const DEFAULT_STAGES: [SearchStage; 3] = [
    SearchStage {
        radius: 2500,
        stride: 100,
    },
    SearchStage {
        radius: 200,
        stride: 10,
    },
    SearchStage {
        radius: 20,
        stride: 1,
    },
];

pub(crate) const DEFAULT_REFINE_CAP: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Alignment {
    pub(crate) shift: i64,
    pub(crate) fit: LinearFit,
    /// Cleared when the refinement loop hit its pass cap; the shift is then
    /// the last one computed, flagged for downstream review.
    pub(crate) converged: bool,
}

/// Scans one stage window, returning the shift whose cyclic fit maximises
/// the amplitude. The comparison is a strict greater-than, so ties keep
/// the earliest shift in scan order and NaN never wins.
fn scan_stage(
    template: &[Real],
    wave: &[Real],
    centre: i64,
    stage: SearchStage,
) -> Result<(i64, LinearFit), FitError> {
    if stage.stride <= 0 || stage.radius <= 0 {
        return Err(FitError::EmptySearchWindow);
    }

    let mut candidates = 0usize;
    let mut best: Option<(i64, LinearFit)> = None;
    let mut shift = centre - stage.radius;
    while shift < centre + stage.radius {
        candidates += 1;
        if let Ok(fit) = fit_shifted(template, wave, shift) {
            let wins = match &best {
                Some((_, incumbent)) => fit.amplitude > incumbent.amplitude,
                None => !fit.amplitude.is_nan(),
            };
            if wins {
                best = Some((shift, fit));
            }
        }
        shift += stage.stride;
    }

    if candidates == 0 {
        return Err(FitError::EmptySearchWindow);
    }
    best.ok_or(FitError::DegenerateTemplate)
}

/// Multi-resolution search for the shift of `wave` against `template` that
/// maximises the fitted amplitude.
///
/// Each stage recentres on the best shift of the previous one; after the
/// finest stage the search repeats that stage, recentred on its own
/// result, until two consecutive passes agree. `refine_cap` bounds the
/// repetition: on hitting it, the last computed shift is returned with
/// `converged` cleared rather than aborting the event.
pub(crate) fn align(
    template: &[Real],
    wave: &[Real],
    search_centre: i64,
    stages: &[SearchStage],
    refine_cap: usize,
) -> Result<Alignment, FitError> {
    let Some((&finest, coarse)) = stages.split_last() else {
        return Err(FitError::EmptySearchWindow);
    };

    let mut centre = search_centre;
    for stage in coarse {
        (centre, _) = scan_stage(template, wave, centre, *stage)?;
    }

    let (mut shift, mut fit) = scan_stage(template, wave, centre, finest)?;
    for _ in 0..refine_cap {
        let (next_shift, next_fit) = scan_stage(template, wave, shift, finest)?;
        let stable = next_shift == shift;
        shift = next_shift;
        fit = next_fit;
        if stable {
            return Ok(Alignment {
                shift,
                fit,
                converged: true,
            });
        }
    }
    Ok(Alignment {
        shift,
        fit,
        converged: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use rand_distr::{Distribution, Normal};

    const LEN: usize = 512;

    fn template() -> Vec<f64> {
        (0..LEN)
            .map(|i| f64::exp(-0.5 * ((i as f64 - 100.0) / 12.0).powi(2)))
            .collect()
    }

    fn embedded(template: &[f64], shift: i64, amplitude: f64, noise_sd: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, noise_sd.max(f64::MIN_POSITIVE)).expect("sd is valid");
        (0..LEN)
            .map(|i| {
                let source = (i as i64 - shift).rem_euclid(LEN as i64) as usize;
                let noise = if noise_sd > 0.0 {
                    normal.sample(&mut rng)
                } else {
                    0.0
                };
                amplitude * template[source] + noise
            })
            .collect()
    }

    const STAGES: [SearchStage; 2] = [
        SearchStage {
            radius: 60,
            stride: 8,
        },
        SearchStage {
            radius: 10,
            stride: 1,
        },
    ];

    #[test]
    fn recovers_a_known_shift() {
        let template = template();
        for expected in [-37i64, 0, 5, 83] {
            let wave = embedded(&template, expected, 250.0, 0.0, 1);
            let alignment =
                align(&template, &wave, 0, &STAGES, DEFAULT_REFINE_CAP).expect("search is valid");
            assert_eq!(alignment.shift, expected);
            assert!(alignment.converged);
            assert_approx_eq!(alignment.fit.amplitude, 250.0, 1e-6);
        }
    }

    #[test]
    fn recovers_shift_from_an_offset_centre() {
        let template = template();
        let wave = embedded(&template, 40, 120.0, 0.5, 2);
        let alignment =
            align(&template, &wave, 48, &STAGES, DEFAULT_REFINE_CAP).expect("search is valid");
        assert!((alignment.shift - 40).abs() <= 1, "shift {}", alignment.shift);
    }

    #[test]
    fn recovery_rate_degrades_monotonically_with_noise() {
        let template = template();
        let trials = 25;
        let rates: Vec<f64> = [0.0, 0.5, 8.0]
            .iter()
            .map(|&sd| {
                let mut recovered = 0;
                for trial in 0..trials {
                    let mut seed_rng = StdRng::seed_from_u64(1000 + trial);
                    let expected = seed_rng.random_range(-50..50);
                    let wave = embedded(&template, expected, 1.0, sd, 2000 + trial);
                    let alignment = align(&template, &wave, 0, &STAGES, DEFAULT_REFINE_CAP)
                        .expect("search is valid");
                    if (alignment.shift - expected).abs() <= 3 {
                        recovered += 1;
                    }
                }
                recovered as f64 / trials as f64
            })
            .collect();

        assert_eq!(rates[0], 1.0);
        assert!(rates[1] <= rates[0]);
        assert!(rates[2] <= rates[1]);
        assert!(rates[2] < 0.8, "rate {} at heavy noise", rates[2]);
    }

    #[test]
    fn empty_stage_ladder_is_rejected() {
        let template = template();
        let wave = embedded(&template, 0, 1.0, 0.0, 3);
        assert_eq!(
            align(&template, &wave, 0, &[], DEFAULT_REFINE_CAP),
            Err(FitError::EmptySearchWindow)
        );
    }

    #[test]
    fn zero_radius_stage_is_an_empty_window() {
        let template = template();
        let wave = embedded(&template, 0, 1.0, 0.0, 4);
        let stages = [SearchStage {
            radius: 0,
            stride: 1,
        }];
        assert_eq!(
            align(&template, &wave, 0, &stages, DEFAULT_REFINE_CAP),
            Err(FitError::EmptySearchWindow)
        );
    }

    #[test]
    fn constant_template_loses_every_candidate() {
        let template = vec![1.0; LEN];
        let wave = vec![2.0; LEN];
        assert_eq!(
            align(&template, &wave, 0, &STAGES, DEFAULT_REFINE_CAP),
            Err(FitError::DegenerateTemplate)
        );
    }

    #[test]
    fn first_seen_shift_wins_ties() {
        // A period-two template makes every odd candidate tie exactly; the
        // scan must keep the lower shift.
        let template: Vec<f64> = (0..8).map(|i| if i % 2 == 0 { 1.0 } else { 0.5 }).collect();
        let wave = template.clone();
        let stage = SearchStage {
            radius: 2,
            stride: 2,
        };
        let (shift, _) = scan_stage(&template, &wave, 1, stage).expect("window is non-empty");
        assert_eq!(shift, -1);
    }

    #[test]
    fn oscillating_ties_hit_the_refinement_cap() {
        // With every candidate tied, recentring walks the window leftwards
        // forever; the cap must stop it and flag the result.
        let template: Vec<f64> = (0..8).map(|i| if i % 2 == 0 { 1.0 } else { 0.5 }).collect();
        let wave = template.clone();
        let stages = [SearchStage {
            radius: 2,
            stride: 2,
        }];
        let alignment = align(&template, &wave, 1, &stages, 10).expect("search is valid");
        assert!(!alignment.converged);
    }
}
