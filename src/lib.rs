//! Bayesian state-space movement models (DCRW, DCRWS, hDCRW, hDCRWS) for animal
//! tracking data, fitted through an external Gibbs sampler.
//!
//! Start with [`bsam::fit_ssm`].
pub mod aggregate;
pub mod bsam;
pub mod bsam_errors;
pub mod constants;
pub mod error_models;
pub mod fit;
pub mod model;
pub mod observations;
pub mod prepare;
pub mod sampler;

pub use aggregate::{FitBundle, IndividualFits, SsmFit};
pub use bsam::{fit_ssm, fit_ssm_with_kind};
pub use bsam_errors::{BsamError, SamplerError};
pub use fit::{FitParams, FitResult};
pub use model::ModelKind;
pub use observations::{LocationClass, Observation, ObservationTable};
