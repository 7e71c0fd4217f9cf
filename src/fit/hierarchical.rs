//! # Hierarchical orchestration
//!
//! All individuals are stacked into one [`SamplerData`] bundle (see
//! [`crate::prepare::bundle`] for the `first`/`last`/`yfirst` row bounds) and the
//! sampler is run once. Hyper-parameters are shared, so no partial result exists:
//! any individual that cannot be prepared, or any sampler failure, aborts the fit.
use tracing::{debug, info};

use super::{summary::build_result, FitParams, FitResult};
use crate::{
    bsam_errors::BsamError,
    constants::NormalizedId,
    model::ModelKind,
    prepare::{bundle::SamplerData, RegularizedTrack},
    sampler::Sampler,
};

/// Fit every prepared track jointly.
///
/// Arguments
/// -----------------
/// * `model`: a hierarchical [`ModelKind`].
/// * `prepared`: one preparation outcome per individual, in input order; the
///   first error is returned as is.
/// * `params`: schedule and display options.
/// * `sampler`: the engine.
///
/// Return
/// ----------
/// * The combined [`FitResult`], whose rows carry each individual's code.
pub fn fit_joint<S: Sampler + ?Sized>(
    model: ModelKind,
    prepared: Vec<Result<RegularizedTrack, BsamError>>,
    params: &FitParams,
    sampler: &S,
) -> Result<FitResult<NormalizedId>, BsamError> {
    if !model.is_hierarchical() {
        return Err(BsamError::InvalidModel(format!(
            "{model} is not hierarchical, fit it one individual at a time"
        )));
    }

    let tracks = prepared.into_iter().collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&RegularizedTrack> = tracks.iter().collect();
    let data = SamplerData::from_tracks(model, &refs)?;

    info!(
        "fitting {model} jointly to {} individuals ({} grid steps)",
        refs.len(),
        data.n_rows()
    );

    let draws = sampler
        .run(&data, &params.run_config())
        .map_err(|source| BsamError::Sampler { id: None, source })?;
    debug!("joint sampler run returned {} draws per node", draws.n_draws());

    build_result(&data, &refs, params.tstep, draws)
        .map_err(|source| BsamError::Sampler { id: None, source })
}
