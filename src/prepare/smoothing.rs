//! Local weighted regression (loess) used to seed the latent locations.
//!
//! The smoother itself is `loess_rs`: a tricube-weighted local quadratic, evaluated
//! directly at every distinct observation time with no robustness iterations. Fixes
//! sharing a timestamp are averaged first. The smoothed curve is then carried onto
//! the requested times by linear interpolation between the observation times, and
//! by extending the first and last segments outside the observed range.
//!
//! Small spans follow the data closely; sparse tracks need larger spans. Spans above
//! one use the whole track in every local fit.
use itertools::Itertools;
use loess_rs::prelude::*;

use crate::{bsam_errors::BsamError, constants::MJD};

/// Fewest distinct times handed to the quadratic smoother; shorter tracks are
/// interpolated as they are.
const MIN_SMOOTHED: usize = 4;

/// Sort by time and average the values of fixes sharing a timestamp.
fn collapse_duplicates(times: &[MJD], values: &[f64]) -> (Vec<MJD>, Vec<f64>) {
    let mut xs = Vec::with_capacity(times.len());
    let mut ys = Vec::with_capacity(times.len());
    let sorted = times
        .iter()
        .copied()
        .zip(values.iter().copied())
        .sorted_by(|a, b| a.0.total_cmp(&b.0))
        .chunk_by(|(t, _)| *t);
    for (t, group) in &sorted {
        let (sum, count) = group.fold((0.0, 0usize), |(s, c), (_, v)| (s + v, c + 1));
        xs.push(t);
        ys.push(sum / count as f64);
    }
    (xs, ys)
}

/// Piecewise-linear evaluation of `(xs, ys)` at `target`.
///
/// `xs` is strictly increasing. Outside `[xs[0], xs[n-1]]` the end segments are
/// extended; a single knot gives a constant.
fn interpolate(xs: &[f64], ys: &[f64], target: f64) -> f64 {
    let n = xs.len();
    if n == 1 {
        return ys[0];
    }
    // index of the segment [xs[k], xs[k+1]] used for `target`
    let k = xs.partition_point(|&x| x <= target).clamp(1, n - 1) - 1;
    let w = (target - xs[k]) / (xs[k + 1] - xs[k]);
    ys[k] + w * (ys[k + 1] - ys[k])
}

/// Smooth `(times, values)` and evaluate the fit at each of `at`.
///
/// Arguments
/// -----------------
/// * `times`: observation times, any order.
/// * `values`: observed coordinate, same length as `times`.
/// * `span`: fraction of the data used in each local fit (> 0).
/// * `at`: times where the fit is evaluated.
///
/// Return
/// ----------
/// * One fitted value per entry of `at`.
pub fn loess(times: &[MJD], values: &[f64], span: f64, at: &[MJD]) -> Result<Vec<f64>, BsamError> {
    if times.len() != values.len() {
        return Err(BsamError::InvalidParameter(format!(
            "loess: {} times for {} values",
            times.len(),
            values.len()
        )));
    }
    if !(span.is_finite() && span > 0.0) {
        return Err(BsamError::InvalidParameter(format!(
            "loess: span must be > 0, got {span}"
        )));
    }
    if times.is_empty() {
        return Err(BsamError::InvalidParameter(
            "loess: no data to smooth".into(),
        ));
    }

    let (knots, mut smoothed) = collapse_duplicates(times, values);

    if knots.len() >= MIN_SMOOTHED {
        // centred times keep the local quadratic well conditioned at MJD scale
        let origin = knots[0];
        let centred: Vec<f64> = knots.iter().map(|t| t - origin).collect();

        // at least three points in every local quadratic
        let fraction = span.min(1.0).max(3.0 / knots.len() as f64);
        let fitted = Loess::new()
            .fraction(fraction)
            .iterations(0)
            .degree(Quadratic)
            .weight_function(Tricube)
            .surface_mode(Direct)
            .boundary_policy(NoBoundary)
            .zero_weight_fallback(UseLocalMean)
            .adapter(Batch)
            .build()
            .and_then(|model| model.fit(&centred, &smoothed));

        match fitted {
            Ok(result)
                if result.y.len() == smoothed.len() && result.y.iter().all(|v| v.is_finite()) =>
            {
                smoothed = result.y;
            }
            Ok(_) => {
                tracing::debug!(
                    n = knots.len(),
                    span,
                    "loess fit is not finite, interpolating the raw track"
                );
            }
            Err(e) => {
                tracing::debug!(
                    n = knots.len(),
                    span,
                    error = %e,
                    "loess failed, interpolating the raw track"
                );
            }
        }
    }

    Ok(at
        .iter()
        .map(|&target| interpolate(&knots, &smoothed, target))
        .collect())
}
