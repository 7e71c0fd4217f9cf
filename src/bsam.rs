//! # Fitting entry point
//!
//! [`fit_ssm`] runs the whole pipeline on an [`ObservationTable`]:
//!
//! 1. validate the model name and the parameters;
//! 2. normalize identifiers (dense codes in first-appearance order);
//! 3. prepare a regular grid per individual;
//! 4. run the single-series or the hierarchical orchestrator;
//! 5. relabel results to the original identifiers.
//!
//! Error policy
//! -----------------
//! * Caller mistakes fail the whole call **before any sampler run**: unknown model
//!   name, out-of-range parameters, an empty table, malformed explicit errors on any
//!   individual.
//! * In single-series mode, an individual with too little data, or whose sampler
//!   run fails, is reported as an `Err` entry of [`FitBundle::Individual`]; the
//!   other individuals are still fitted.
//! * In hierarchical mode, any such failure aborts the call.
//!
//! Example
//! -----------------
//! ```rust,no_run
//! use camino::Utf8Path;
//! use bsam::{
//!     bsam::fit_ssm,
//!     fit::FitParams,
//!     observations::csv_reader::read_observations_file,
//!     sampler::jags::JagsSampler,
//! };
//!
//! let table = read_observations_file(Utf8Path::new("tracks.csv")).unwrap();
//! let params = FitParams::builder().tstep(0.25).workers(4).build().unwrap();
//! let fit = fit_ssm(&table, "DCRWS", &params, &JagsSampler::new()).unwrap();
//!
//! for (id, err) in fit.failures() {
//!     eprintln!("{id}: {err}");
//! }
//! ```
use std::time::Instant;

use tracing::{info, warn};

use crate::{
    aggregate::{relabel_individuals, relabel_joint, FitBundle, SsmFit},
    bsam_errors::BsamError,
    fit::{hierarchical::fit_joint, single::fit_individuals, FitParams},
    model::ModelKind,
    observations::{normalize::normalize, ObservationTable},
    prepare::{obs_count_stats, prepare_tracks},
    sampler::Sampler,
};

/// Fit the model named `model` (`"DCRW"`, `"DCRWS"`, `"hDCRW"` or `"hDCRWS"`).
///
/// Arguments
/// -----------------
/// * `table`: observations of one or more individuals.
/// * `model`: model name, validated against the four supported variants.
/// * `params`: fit parameters, see [`FitParams`].
/// * `sampler`: the engine drawing from the posterior.
///
/// Return
/// ----------
/// * An [`SsmFit`] with the bundle of results and the elapsed wall-clock time, or
///   the first validation error ([`BsamError::InvalidModel`] for an unknown name).
///
/// See also
/// ------------
/// * [`fit_ssm_with_kind`] – same, with an already validated [`ModelKind`].
pub fn fit_ssm<S: Sampler + ?Sized>(
    table: &ObservationTable,
    model: &str,
    params: &FitParams,
    sampler: &S,
) -> Result<SsmFit, BsamError> {
    let kind: ModelKind = model.parse()?;
    fit_ssm_with_kind(table, kind, params, sampler)
}

/// [`fit_ssm`] for a [`ModelKind`].
pub fn fit_ssm_with_kind<S: Sampler + ?Sized>(
    table: &ObservationTable,
    model: ModelKind,
    params: &FitParams,
    sampler: &S,
) -> Result<SsmFit, BsamError> {
    let start = Instant::now();
    params.validate()?;

    let normalized = normalize(table)?;
    let mut prepared = prepare_tracks(&normalized, &params.prepare_params());

    // caller mistakes abort before any sampler run
    let fatal = prepared.iter().position(|outcome| match outcome {
        Err(BsamError::InsufficientData { .. }) => model.is_hierarchical(),
        Err(e) => e.is_validation(),
        Ok(_) => false,
    });
    if let Some(Err(e)) = fatal.map(|i| prepared.swap_remove(i)) {
        return Err(e);
    }

    if let Some(stats) = obs_count_stats(prepared.iter().filter_map(|p| p.as_ref().ok())) {
        info!(
            "fitting {model} to {} individuals, tstep = {} d, observations per individual: {stats}",
            normalized.len(),
            params.tstep
        );
    }

    let bundle = if model.is_hierarchical() {
        let joint = fit_joint(model, prepared, params, sampler)?;
        FitBundle::Hierarchical(relabel_joint(normalized.ids(), joint))
    } else {
        let outcomes = fit_individuals(model, prepared, normalized.ids(), params, sampler)?;
        FitBundle::Individual(relabel_individuals(normalized.ids(), outcomes))
    };

    let failures = bundle.failures().len();
    if failures > 0 {
        warn!(
            "{failures} of {} individuals could not be fitted",
            normalized.len()
        );
    }

    let elapsed = start.elapsed();
    info!(
        "{model} fit finished in {:.3} s, {} locations estimated",
        elapsed.as_secs_f64(),
        bundle.estimated_locations()
    );

    Ok(SsmFit {
        model,
        tstep: params.tstep,
        bundle,
        elapsed,
    })
}
