//! # Observation preparation
//!
//! Turn the irregular fixes of each individual into a **regular time grid** the
//! state-space model runs on, together with everything the sampler needs: error
//! coefficients, interpolation indices and smoothed initial locations.
//!
//! ## Grid
//! -----------------
//! For a track spanning `D` days and a step `dt` (days), the grid has
//! `floor(D / dt) + 1` steps starting at the first fix: `t_i = t_0 + i · dt`.
//! The last fix may fall after the last step by less than `dt`.
//!
//! ## Assignment of fixes to steps
//! -----------------
//! Every fix at time `t` with `s = (t - t_0) / dt` gets
//! * its **interval** `k = min(floor(s), n - 2)`: the measurement equation
//!   interpolates between latent steps `k` and `k + 1`;
//! * its **weight** `w = 1 - (s - k)` on step `k` (`w ∈ (0, 1]` inside the grid,
//!   `w ≤ 0` for a fix after the last step, i.e. linear extrapolation);
//! * its **nearest step** `round(s)` with exact halves going to the earlier step,
//!   clamped to the grid. A step is flagged `observed` when at least one fix is
//!   nearest to it.
//!
//! ## Failure modes
//! -----------------
//! * [`BsamError::InsufficientData`] – fewer than two distinct timestamps, or a span
//!   shorter than one step (no step can be built).
//! * [`BsamError::InconsistentErrorSpec`] – malformed explicit errors, see
//!   [`crate::error_models::resolve_errors`].
//!
//! Preparation is pure: the same input and parameters always produce the same
//! [`RegularizedTrack`].
pub mod bundle;
pub mod smoothing;

use itertools::Itertools;

use crate::{
    bsam_errors::BsamError,
    constants::{Day, Degree, NormalizedId, TagId, MAX_STEPS, MJD, STEP_EPS},
    error_models::{resolve_errors, ErrorCoefficients, ErrorParameterization},
    observations::{
        normalize::{IndividualTrack, NormalizedTable},
        LocationClass,
    },
};

use smoothing::loess;

/// Parameters of the preparation stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrepareParams {
    /// Grid step in days (> 0)
    pub tstep: Day,
    /// Loess span controlling the smoothness of the initial locations (> 0)
    pub span: f64,
    /// How observation errors are derived
    pub errors: ErrorParameterization,
}

impl Default for PrepareParams {
    fn default() -> Self {
        PrepareParams {
            tstep: 1.0,
            span: 0.2,
            errors: ErrorParameterization::LocationClass,
        }
    }
}

/// One step of the regular grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridStep {
    pub time: MJD,
    /// At least one fix is nearest to this step
    pub observed: bool,
    /// Smoothed longitude used to initialise the sampler
    pub init_lon: Degree,
    /// Smoothed latitude used to initialise the sampler
    pub init_lat: Degree,
}

/// A fix placed on the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedObservation {
    pub time: MJD,
    pub lc: LocationClass,
    pub lon: Degree,
    pub lat: Degree,
    pub lon_error: Option<Degree>,
    pub lat_error: Option<Degree>,
    /// Index of the grid interval `[k, k + 1]` the fix is interpolated in
    pub interval: usize,
    /// Interpolation weight on step `interval`
    pub weight: f64,
    /// Index of the closest grid step
    pub nearest_step: usize,
    pub errors: ErrorCoefficients,
}

/// Regular-grid view of one individual's track.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularizedTrack {
    pub code: NormalizedId,
    pub tstep: Day,
    pub steps: Vec<GridStep>,
    pub observations: Vec<PreparedObservation>,
}

impl RegularizedTrack {
    pub fn n_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn n_observations(&self) -> usize {
        self.observations.len()
    }

    /// Number of grid steps with at least one nearby fix.
    pub fn n_observed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.observed).count()
    }

    /// Number of fixes per interval, `n_steps - 1` entries.
    pub fn interval_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_steps().saturating_sub(1)];
        for obs in &self.observations {
            counts[obs.interval] += 1;
        }
        counts
    }
}

/// Number of grid steps covering `span` days at step `tstep`.
///
/// `None` when the ratio is not finite or the grid would exceed [`MAX_STEPS`].
pub fn step_count(span: Day, tstep: Day) -> Option<usize> {
    let intervals = (span / tstep + STEP_EPS).floor();
    if !intervals.is_finite() || intervals < 0.0 || intervals >= MAX_STEPS as f64 {
        return None;
    }
    Some(intervals as usize + 1)
}

/// Nearest step of relative position `s`, exact halves go to the earlier step.
fn nearest_step(s: f64, n_steps: usize) -> usize {
    let below = s.floor();
    let idx = if s - below > 0.5 { below + 1.0 } else { below };
    (idx.max(0.0) as usize).min(n_steps - 1)
}

/// Place the fixes of one individual on a regular grid.
///
/// Arguments
/// -----------------
/// * `id`: original identifier of the individual (error reports only).
/// * `track`: time-sorted fixes under the normalized code.
/// * `params`: grid step, smoothing span and error parameterization.
///
/// Return
/// ----------
/// * The [`RegularizedTrack`], or an [`BsamError::InsufficientData`] /
///   [`BsamError::InconsistentErrorSpec`] error.
pub fn prepare_track(
    id: &TagId,
    track: &IndividualTrack,
    params: &PrepareParams,
) -> Result<RegularizedTrack, BsamError> {
    let observations = &track.observations;

    if let Some((i, obs)) = observations
        .iter()
        .enumerate()
        .find(|(_, o)| !o.time.is_finite())
    {
        return Err(BsamError::InvalidTimestamp(format!(
            "observation {i} of individual {id} has time {}",
            obs.time
        )));
    }
    if let Some((i, _)) = observations
        .iter()
        .enumerate()
        .find(|(_, o)| !(o.lon.is_finite() && o.lat.is_finite()))
    {
        return Err(BsamError::InvalidCoordinate(format!(
            "observation {i} of individual {id} has a non-finite position"
        )));
    }

    // explicit-error consistency is checked first: it is a caller bug regardless of length
    let errors = resolve_errors(id, observations, params.errors)?;

    let distinct = observations.iter().map(|o| o.time.to_bits()).unique().count();
    if distinct < 2 {
        return Err(BsamError::InsufficientData {
            id: id.clone(),
            reason: format!("{distinct} distinct observation time(s), at least 2 are required"),
        });
    }

    let t0 = observations
        .iter()
        .map(|o| o.time)
        .fold(f64::INFINITY, f64::min);
    let t_end = observations
        .iter()
        .map(|o| o.time)
        .fold(f64::NEG_INFINITY, f64::max);
    let n_steps = step_count(t_end - t0, params.tstep).ok_or_else(|| {
        BsamError::InvalidParameter(format!(
            "individual {id}: a track of {:.4} days at tstep = {} days needs more than {MAX_STEPS} grid steps",
            t_end - t0,
            params.tstep
        ))
    })?;
    if n_steps < 2 {
        return Err(BsamError::InsufficientData {
            id: id.clone(),
            reason: format!(
                "track spans {:.4} days, shorter than one time step of {} days",
                t_end - t0,
                params.tstep
            ),
        });
    }

    let step_times: Vec<MJD> = (0..n_steps)
        .map(|i| t0 + i as f64 * params.tstep)
        .collect();

    let mut observed = vec![false; n_steps];
    let prepared: Vec<PreparedObservation> = observations
        .iter()
        .zip(errors)
        .map(|(obs, errors)| {
            let s = (obs.time - t0) / params.tstep;
            let interval = ((s + STEP_EPS).floor().max(0.0) as usize).min(n_steps - 2);
            let weight = 1.0 - (s - interval as f64);
            let nearest = nearest_step(s, n_steps);
            observed[nearest] = true;

            PreparedObservation {
                time: obs.time,
                lc: obs.lc,
                lon: obs.lon,
                lat: obs.lat,
                lon_error: obs.lon_error,
                lat_error: obs.lat_error,
                interval,
                weight,
                nearest_step: nearest,
                errors,
            }
        })
        .collect();

    let times: Vec<MJD> = observations.iter().map(|o| o.time).collect();
    let lons: Vec<Degree> = observations.iter().map(|o| o.lon).collect();
    let lats: Vec<Degree> = observations.iter().map(|o| o.lat).collect();
    let init_lon = loess(&times, &lons, params.span, &step_times)?;
    let init_lat = loess(&times, &lats, params.span, &step_times)?;

    let steps = step_times
        .into_iter()
        .zip(observed)
        .zip(init_lon.into_iter().zip(init_lat))
        .map(|((time, observed), (init_lon, init_lat))| GridStep {
            time,
            observed,
            init_lon,
            init_lat,
        })
        .collect();

    Ok(RegularizedTrack {
        code: track.code,
        tstep: params.tstep,
        steps,
        observations: prepared,
    })
}

/// Prepare every individual of the table, in first-appearance order.
///
/// Per-individual failures are returned in place so the caller decides whether
/// they abort the run (hierarchical fits, error-spec problems) or only skip the
/// individual (single-series fits with too little data).
pub fn prepare_tracks(
    table: &NormalizedTable,
    params: &PrepareParams,
) -> Vec<Result<RegularizedTrack, BsamError>> {
    table
        .tracks()
        .iter()
        .map(|track| {
            let id = table.ids().relabel(track.code);
            prepare_track(&id, track, params)
        })
        .collect()
}

/// Summary statistics of per-individual observation counts.
///
/// Percentiles use the nearest-rank rule on sorted counts: index `round(q × (N-1))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObsCountStats {
    pub min: usize,
    pub median: usize,
    pub max: usize,
    pub total: usize,
}

impl std::fmt::Display for ObsCountStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            writeln!(f, "Observation count per individual - summary")?;
            writeln!(f, "------------------------------------------")?;
            writeln!(f, "min    : {}", self.min)?;
            writeln!(f, "median : {}", self.median)?;
            writeln!(f, "max    : {}", self.max)?;
            write!(f, "total  : {}", self.total)
        } else {
            write!(
                f,
                "min={}, median={}, max={}, total={}",
                self.min, self.median, self.max, self.total
            )
        }
    }
}

/// Observation count statistics over prepared tracks, `None` when empty.
pub fn obs_count_stats<'a>(
    tracks: impl IntoIterator<Item = &'a RegularizedTrack>,
) -> Option<ObsCountStats> {
    let counts: Vec<usize> = tracks
        .into_iter()
        .map(|t| t.n_observations())
        .sorted_unstable()
        .collect();
    let n = counts.len();
    if n == 0 {
        return None;
    }
    let mid = ((0.5 * (n as f64 - 1.0)).round() as usize).min(n - 1);

    Some(ObsCountStats {
        min: counts[0],
        median: counts[mid],
        max: counts[n - 1],
        total: counts.iter().sum(),
    })
}

#[cfg(test)]
mod prepare_test {
    use super::*;
    use crate::observations::{normalize::normalize, Observation, ObservationTable};
    use approx::assert_relative_eq;

    fn track(times: &[f64]) -> IndividualTrack {
        IndividualTrack {
            code: 1,
            observations: times
                .iter()
                .enumerate()
                .map(|(i, &t)| {
                    Observation::new("t1", t, LocationClass::A, -60.0 + 0.1 * i as f64, 45.0)
                })
                .collect(),
        }
    }

    fn params(tstep: f64) -> PrepareParams {
        PrepareParams {
            tstep,
            ..PrepareParams::default()
        }
    }

    #[test]
    fn test_step_count() {
        assert_eq!(step_count(1.0, 1.0), Some(2));
        assert_eq!(step_count(2.9, 1.0), Some(3));
        assert_eq!(step_count(3.0, 0.25), Some(13));
        // 0.1 * 3 is not exactly 0.3 in binary
        assert_eq!(step_count(0.1 + 0.1 + 0.1, 0.1), Some(4));
    }

    #[test]
    fn test_step_count_bounds() {
        assert_eq!(step_count(f64::INFINITY, 1.0), None);
        assert_eq!(step_count(f64::NAN, 1.0), None);
        assert_eq!(step_count(1.0, 0.0), None);
        assert_eq!(step_count(MAX_STEPS as f64, 1.0), None);
        assert_eq!(step_count((MAX_STEPS - 1) as f64, 1.0), Some(MAX_STEPS));
    }

    #[test]
    fn test_non_finite_input_is_rejected() {
        let id: TagId = "t1".into();
        let err = prepare_track(&id, &track(&[0.0, f64::INFINITY]), &params(1.0)).unwrap_err();
        assert!(matches!(err, BsamError::InvalidTimestamp(_)));

        let mut bad = track(&[0.0, 1.0, 2.0]);
        bad.observations[1].lat = f64::NAN;
        let err = prepare_track(&id, &bad, &params(1.0)).unwrap_err();
        assert!(matches!(err, BsamError::InvalidCoordinate(_)));
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        let err = prepare_track(&"t1".into(), &track(&[0.0, 3650.0]), &params(1e-5)).unwrap_err();
        assert!(matches!(err, BsamError::InvalidParameter(_)));
    }

    #[test]
    fn test_two_fixes_one_step_apart() {
        let grid = prepare_track(&"t1".into(), &track(&[100.0, 101.0]), &params(1.0)).unwrap();
        assert_eq!(grid.n_steps(), 2);
        assert_eq!(grid.observations[0].interval, 0);
        assert_relative_eq!(grid.observations[0].weight, 1.0);
        // the last fix sits exactly on the last step: end of interval 0
        assert_eq!(grid.observations[1].interval, 0);
        assert_relative_eq!(grid.observations[1].weight, 0.0);
        assert_eq!(grid.observations[1].nearest_step, 1);
        assert!(grid.steps.iter().all(|s| s.observed));
    }

    #[test]
    fn test_grid_length() {
        let grid =
            prepare_track(&"t1".into(), &track(&[0.0, 0.3, 1.7, 2.95]), &params(0.5)).unwrap();
        assert_eq!(grid.n_steps(), 6);
        assert_relative_eq!(grid.steps[5].time, 2.5);
        assert_eq!(grid.interval_counts().iter().sum::<usize>(), 4);
    }

    #[test]
    fn test_assignment_and_tie_break() {
        let grid = prepare_track(
            &"t1".into(),
            &track(&[0.0, 0.5, 1.25, 2.0]),
            &params(1.0),
        )
        .unwrap();
        let nearest: Vec<_> = grid.observations.iter().map(|o| o.nearest_step).collect();
        let intervals: Vec<_> = grid.observations.iter().map(|o| o.interval).collect();
        // 0.5 is a tie between steps 0 and 1 and goes to the earlier one
        assert_eq!(nearest, vec![0, 0, 1, 2]);
        assert_eq!(intervals, vec![0, 0, 1, 1]);
        assert_relative_eq!(grid.observations[2].weight, 0.75);
        assert_eq!(
            grid.steps.iter().map(|s| s.observed).collect::<Vec<_>>(),
            vec![true, true, true]
        );
    }

    #[test]
    fn test_gap_steps_are_flagged() {
        let grid = prepare_track(&"t1".into(), &track(&[0.0, 0.1, 4.0]), &params(1.0)).unwrap();
        assert_eq!(
            grid.steps.iter().map(|s| s.observed).collect::<Vec<_>>(),
            vec![true, false, false, false, true]
        );
        assert_eq!(grid.n_observed_steps(), 2);
    }

    #[test]
    fn test_fix_after_last_step_extrapolates() {
        let grid = prepare_track(&"t1".into(), &track(&[0.0, 1.0, 2.5]), &params(1.0)).unwrap();
        assert_eq!(grid.n_steps(), 3);
        let last = &grid.observations[2];
        assert_eq!(last.interval, 1);
        assert_relative_eq!(last.weight, -0.5);
        assert_eq!(last.nearest_step, 2);
    }

    #[test]
    fn test_single_timestamp_is_insufficient() {
        let err = prepare_track(&"t1".into(), &track(&[5.0, 5.0, 5.0]), &params(1.0)).unwrap_err();
        assert!(matches!(err, BsamError::InsufficientData { .. }));
    }

    #[test]
    fn test_span_shorter_than_step_is_insufficient() {
        let err = prepare_track(&"t1".into(), &track(&[5.0, 5.4]), &params(1.0)).unwrap_err();
        assert!(matches!(err, BsamError::InsufficientData { .. }));
    }

    #[test]
    fn test_initial_values_follow_track() {
        let grid = prepare_track(
            &"t1".into(),
            &track(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]),
            &PrepareParams {
                tstep: 1.0,
                span: 0.8,
                ..PrepareParams::default()
            },
        )
        .unwrap();
        for (i, step) in grid.steps.iter().enumerate() {
            assert_relative_eq!(step.init_lon, -60.0 + 0.1 * i as f64, epsilon = 1e-8);
            assert_relative_eq!(step.init_lat, 45.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_prepare_is_deterministic() {
        let table: ObservationTable = [0.0, 0.37, 1.2, 2.9, 3.3, 6.1]
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                Observation::new(
                    if i % 2 == 0 { "a" } else { "b" },
                    t,
                    LocationClass::B,
                    (i as f64).sin(),
                    (i as f64).cos(),
                )
            })
            .collect();
        let normalized = normalize(&table).unwrap();

        let first = prepare_tracks(&normalized, &params(0.5));
        let second = prepare_tracks(&normalized, &params(0.5));
        assert_eq!(first, second);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }

    #[test]
    fn test_obs_count_stats() {
        let a = prepare_track(&"a".into(), &track(&[0.0, 1.0]), &params(1.0)).unwrap();
        let b = prepare_track(&"b".into(), &track(&[0.0, 1.0, 2.0, 3.0]), &params(1.0)).unwrap();
        let c = prepare_track(&"c".into(), &track(&[0.0, 0.5, 2.0]), &params(1.0)).unwrap();

        let stats = obs_count_stats([&a, &b, &c]).unwrap();
        assert_eq!(
            stats,
            ObsCountStats {
                min: 2,
                median: 3,
                max: 4,
                total: 9
            }
        );
        assert_eq!(stats.to_string(), "min=2, median=3, max=4, total=9");
        assert!(obs_count_stats(std::iter::empty()).is_none());
    }
}
