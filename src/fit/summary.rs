//! # Posterior reduction
//!
//! Collapse raw draws into per-step location summaries and per-parameter
//! summaries.
//!
//! Quantiles use linear interpolation between order statistics
//! (`h = (n - 1) p`, the usual "type 7" definition), so the 50 % quantile is the
//! conventional median.
//!
//! Node naming
//! -----------------
//! Row `r` (1-based, over the stacked grid) of the latent locations is `x[r,1]`
//! (longitude) and `x[r,2]` (latitude); the behavioural state of switching models
//! is `b[r]`. Every other monitored scalar is a model parameter.
use itertools::Itertools;

use super::{BehaviouralState, DataRow, FitResult, ParameterSummary, StepSummary};
use crate::{
    bsam_errors::SamplerError,
    constants::NormalizedId,
    prepare::{bundle::SamplerData, RegularizedTrack},
    sampler::{NodeKey, PosteriorDraws},
};

/// Quantile `p ∈ [0, 1]` of already sorted values, `NaN` when empty.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * p.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Mean, 2.5 %, 50 % and 97.5 % quantiles of `draws`.
fn moments(draws: &[f64]) -> (f64, f64, f64, f64) {
    let sorted: Vec<f64> = draws.iter().copied().sorted_by(f64::total_cmp).collect();
    let mean = draws.iter().sum::<f64>() / draws.len() as f64;
    (
        mean,
        quantile_sorted(&sorted, 0.025),
        quantile_sorted(&sorted, 0.5),
        quantile_sorted(&sorted, 0.975),
    )
}

/// Sample standard deviation, `0` for fewer than two draws.
fn std_dev(draws: &[f64], mean: f64) -> f64 {
    if draws.len() < 2 {
        return 0.0;
    }
    let ss: f64 = draws.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (draws.len() - 1) as f64).sqrt()
}

fn pooled(draws: &PosteriorDraws, key: &NodeKey) -> Result<Vec<f64>, SamplerError> {
    draws
        .pooled(key)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| SamplerError::MissingNode(key.to_string()))
}

/// Per-step summaries of every track of `data`, in layout order.
pub fn step_summaries(
    draws: &PosteriorDraws,
    data: &SamplerData,
    tracks: &[&RegularizedTrack],
) -> Result<Vec<StepSummary<NormalizedId>>, SamplerError> {
    let switching = data.model.is_switching();
    let mut rows = Vec::with_capacity(data.n_rows());

    for (place, track) in data.layout.iter().zip(tracks) {
        for (local, step) in track.steps.iter().enumerate() {
            let r = place.first_row + local + 1;
            let (lon, lon_q025, lon_median, lon_q975) =
                moments(&pooled(draws, &NodeKey::indexed("x", &[r, 1]))?);
            let (lat, lat_q025, lat_median, lat_q975) =
                moments(&pooled(draws, &NodeKey::indexed("x", &[r, 2]))?);

            let (b, b_median, state) = if switching {
                let (b, _, b_median, _) = moments(&pooled(draws, &NodeKey::indexed("b", &[r]))?);
                (Some(b), Some(b_median), Some(BehaviouralState::from_mean(b)))
            } else {
                (None, None, None)
            };

            rows.push(StepSummary {
                id: place.code,
                date: step.time,
                observed: step.observed,
                lon,
                lat,
                lon_median,
                lat_median,
                lon_q025,
                lon_q975,
                lat_q025,
                lat_q975,
                b,
                b_median,
                state,
            });
        }
    }
    Ok(rows)
}

/// Summaries of every monitored node other than `x` and `b`, sorted by node.
pub fn parameter_summaries(draws: &PosteriorDraws) -> Vec<ParameterSummary> {
    draws
        .nodes()
        .into_iter()
        .filter(|key| key.name != "x" && key.name != "b")
        .filter_map(|key| {
            let values = draws.pooled(key).filter(|d| !d.is_empty())?;
            let (mean, q025, median, q975) = moments(&values);
            Some(ParameterSummary {
                node: key.clone(),
                mean,
                sd: std_dev(&values, mean),
                q025,
                median,
                q975,
            })
        })
        .collect()
}

/// Assemble the [`FitResult`] of one sampler run.
pub fn build_result(
    data: &SamplerData,
    tracks: &[&RegularizedTrack],
    tstep: f64,
    draws: PosteriorDraws,
) -> Result<FitResult<NormalizedId>, SamplerError> {
    let summary = step_summaries(&draws, data, tracks)?;
    let parameters = parameter_summaries(&draws);
    let data_rows: Vec<DataRow<NormalizedId>> = super::data_rows(tracks);

    Ok(FitResult {
        ids: tracks.iter().map(|t| t.code).collect(),
        model: data.model,
        tstep,
        data: data_rows,
        estimated_locations: summary.len(),
        posterior: draws,
        summary,
        parameters,
    })
}
