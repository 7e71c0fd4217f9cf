//! # Single-series orchestration
//!
//! Fit every individual on its own: one [`SamplerData`] bundle, one sampler run.
//!
//! Runs are dispatched on a dedicated `rayon` pool of `workers` threads. The
//! result vector is collected by index, so its order is the input's
//! first-appearance order whatever the completion order.
//!
//! Individuals are isolated from each other:
//! * a track that could not be prepared (e.g. too little data) is reported as is,
//!   without calling the sampler;
//! * a sampler failure becomes a [`BsamError::Sampler`] entry keyed by the
//!   individual's original identifier.
use rayon::prelude::*;
use tracing::{debug, warn};

use super::{summary::build_result, FitParams, FitResult};
use crate::{
    bsam_errors::BsamError,
    constants::NormalizedId,
    model::ModelKind,
    observations::normalize::IdMap,
    prepare::{bundle::SamplerData, RegularizedTrack},
    sampler::{RunConfig, Sampler},
};

#[cfg(feature = "progress")]
use super::progress_bar::FitProgress;

/// Outcome of one individual, in input order.
pub type IndividualOutcome = Result<FitResult<NormalizedId>, BsamError>;

fn fit_one<S: Sampler + ?Sized>(
    model: ModelKind,
    track: &RegularizedTrack,
    ids: &IdMap,
    tstep: f64,
    config: &RunConfig,
    sampler: &S,
) -> IndividualOutcome {
    let id = ids.relabel(track.code);
    let data = SamplerData::from_tracks(model, &[track])?;

    debug!(
        "fitting {model} to individual {id}: {} steps, {} observations",
        track.n_steps(),
        track.n_observations()
    );

    let draws = sampler
        .run(&data, config)
        .map_err(|source| BsamError::Sampler {
            id: Some(id.clone()),
            source,
        })?;

    build_result(&data, &[track], tstep, draws).map_err(|source| BsamError::Sampler {
        id: Some(id),
        source,
    })
}

/// Fit each prepared track independently.
///
/// Arguments
/// -----------------
/// * `model`: a non-hierarchical [`ModelKind`].
/// * `prepared`: one preparation outcome per individual, in input order.
/// * `ids`: identifier map used to key failures by original id.
/// * `params`: schedule, worker count and display options.
/// * `sampler`: the engine.
///
/// Return
/// ----------
/// * One outcome per input entry, same order. The outer error only reports a
///   worker pool that could not be built.
pub fn fit_individuals<S: Sampler + ?Sized>(
    model: ModelKind,
    prepared: Vec<Result<RegularizedTrack, BsamError>>,
    ids: &IdMap,
    params: &FitParams,
    sampler: &S,
) -> Result<Vec<IndividualOutcome>, BsamError> {
    if model.is_hierarchical() {
        return Err(BsamError::InvalidModel(format!(
            "{model} is hierarchical, it cannot be fitted one individual at a time"
        )));
    }

    let config = params.run_config();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.workers)
        .thread_name(|i| format!("bsam-worker-{i}"))
        .build()
        .map_err(|e| BsamError::WorkerPool(e.to_string()))?;

    #[cfg(feature = "progress")]
    let progress = FitProgress::new(prepared.len(), params.quiet);

    let outcomes: Vec<IndividualOutcome> = pool.install(|| {
        prepared
            .into_par_iter()
            .map(|entry| {
                let outcome = entry.and_then(|track| {
                    fit_one(model, &track, ids, params.tstep, &config, sampler)
                });
                if let Err(e) = &outcome {
                    warn!("{e}");
                }
                #[cfg(feature = "progress")]
                progress.finish_one(outcome.is_ok());
                outcome
            })
            .collect()
    });

    #[cfg(feature = "progress")]
    {
        progress.finish();
        debug!(failed = progress.failed(), "individual fits finished");
    }

    Ok(outcomes)
}
