//! # Location error models
//!
//! Every observation enters the measurement equation through a Student-t error with
//! a precision and degrees of freedom per coordinate. This module turns quality
//! classes (or explicit errors) into those [`ErrorCoefficients`].
//!
//! ## Argos classes
//!
//! Argos errors are heavy-tailed and grow from class `3` to class `B`. The table scales
//! a reference standard deviation by a per-class multiplier and pairs it with a
//! per-class degrees of freedom:
//!
//! ```text
//! itau2 = 1 / (ARGOS_REFERENCE_SD * multiplier)^2
//! ```
//!
//! Class `Z` uses the `B` row. Class `G` without explicit errors uses a tight,
//! near-Gaussian row.
//!
//! ## Explicit errors
//!
//! With class `G`, callers may supply 1-σ longitude/latitude errors per fix, giving
//! `itau2 = 1 / err^2` and `nu = GAUSSIAN_NU`.
//!
//! Per individual, the following is enforced (otherwise
//! [`BsamError::InconsistentErrorSpec`]):
//! * explicit errors only on class `G`;
//! * both components or none;
//! * strictly positive, finite values;
//! * all `G` fixes of the individual carry errors, or none do;
//! * with [`ErrorParameterization::Explicit`], every fix carries errors.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    bsam_errors::BsamError,
    constants::{Degree, TagId},
    observations::{LocationClass, Observation},
};

/// Reference standard deviation (degrees) of a class `3` Argos fix.
pub const ARGOS_REFERENCE_SD: Degree = 0.004;

/// Degrees of freedom used for errors treated as Gaussian.
pub const GAUSSIAN_NU: f64 = 100.0;

/// How observation errors are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorParameterization {
    /// Lookup by location quality class; explicit errors are honoured on `G` fixes.
    #[default]
    LocationClass,
    /// Every fix must carry explicit errors (and therefore be class `G`).
    Explicit,
}

impl fmt::Display for ErrorParameterization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorParameterization::LocationClass => f.write_str("location_class"),
            ErrorParameterization::Explicit => f.write_str("explicit"),
        }
    }
}

impl FromStr for ErrorParameterization {
    type Err = BsamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "location_class" | "lc" => Ok(ErrorParameterization::LocationClass),
            "explicit" => Ok(ErrorParameterization::Explicit),
            _ => Err(BsamError::InvalidParameter(format!(
                "unknown error parameterization: {s}"
            ))),
        }
    }
}

/// Student-t error parameters of one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorCoefficients {
    /// Precision (1/variance, degrees⁻²) on longitude
    pub itau2_lon: f64,
    /// Precision (1/variance, degrees⁻²) on latitude
    pub itau2_lat: f64,
    /// Degrees of freedom on longitude
    pub nu_lon: f64,
    /// Degrees of freedom on latitude
    pub nu_lat: f64,
}

/// `(multiplier_lon, multiplier_lat, nu_lon, nu_lat)` per class.
fn class_row(lc: LocationClass) -> (f64, f64, f64, f64) {
    match lc {
        LocationClass::Three => (1.00, 1.00, 3.07, 2.64),
        LocationClass::Two => (1.54, 1.29, 2.02, 2.77),
        LocationClass::One => (3.72, 2.55, 2.17, 2.16),
        LocationClass::Zero => (23.90, 103.70, 2.21, 1.53),
        LocationClass::A => (13.51, 14.99, 2.35, 1.44),
        LocationClass::B | LocationClass::Z => (44.22, 32.53, 1.56, 1.69),
        LocationClass::G => (0.10, 0.10, GAUSSIAN_NU, GAUSSIAN_NU),
    }
}

/// Error coefficients looked up from the quality class.
pub fn class_coefficients(lc: LocationClass) -> ErrorCoefficients {
    let (m_lon, m_lat, nu_lon, nu_lat) = class_row(lc);
    ErrorCoefficients {
        itau2_lon: (ARGOS_REFERENCE_SD * m_lon).powi(-2),
        itau2_lat: (ARGOS_REFERENCE_SD * m_lat).powi(-2),
        nu_lon,
        nu_lat,
    }
}

/// Error coefficients from explicit 1-σ errors (degrees).
pub fn explicit_coefficients(lon_error: Degree, lat_error: Degree) -> ErrorCoefficients {
    ErrorCoefficients {
        itau2_lon: lon_error.powi(-2),
        itau2_lat: lat_error.powi(-2),
        nu_lon: GAUSSIAN_NU,
        nu_lat: GAUSSIAN_NU,
    }
}

fn inconsistent(id: &TagId, reason: String) -> BsamError {
    BsamError::InconsistentErrorSpec {
        id: id.clone(),
        reason,
    }
}

/// Resolve the error coefficients of every observation of one individual.
///
/// Arguments
/// -----------------
/// * `id`: original identifier, used in error reports.
/// * `observations`: fixes of this individual.
/// * `mode`: the requested [`ErrorParameterization`].
///
/// Return
/// ----------
/// * One [`ErrorCoefficients`] per observation, in the same order, or
///   [`BsamError::InconsistentErrorSpec`] when the explicit errors are malformed.
pub fn resolve_errors(
    id: &TagId,
    observations: &[Observation],
    mode: ErrorParameterization,
) -> Result<Vec<ErrorCoefficients>, BsamError> {
    let mut g_with = 0usize;
    let mut g_without = 0usize;

    for (i, obs) in observations.iter().enumerate() {
        match (obs.lon_error, obs.lat_error) {
            (Some(lon_err), Some(lat_err)) => {
                if obs.lc != LocationClass::G {
                    return Err(inconsistent(
                        id,
                        format!(
                            "observation {i} has explicit errors but quality class {} (expected G)",
                            obs.lc
                        ),
                    ));
                }
                if !(lon_err.is_finite() && lon_err > 0.0 && lat_err.is_finite() && lat_err > 0.0)
                {
                    return Err(inconsistent(
                        id,
                        format!("observation {i} has non-positive explicit errors"),
                    ));
                }
                g_with += 1;
            }
            (None, None) => {
                if mode == ErrorParameterization::Explicit {
                    return Err(inconsistent(
                        id,
                        format!("observation {i} has no explicit errors"),
                    ));
                }
                if obs.lc == LocationClass::G {
                    g_without += 1;
                }
            }
            _ => {
                return Err(inconsistent(
                    id,
                    format!("observation {i} has only one explicit error component"),
                ));
            }
        }
    }

    if g_with > 0 && g_without > 0 {
        return Err(inconsistent(
            id,
            format!(
                "explicit errors supplied for {g_with} of {} class G observations",
                g_with + g_without
            ),
        ));
    }

    Ok(observations
        .iter()
        .map(|obs| match (obs.lon_error, obs.lat_error) {
            (Some(lon_err), Some(lat_err)) => explicit_coefficients(lon_err, lat_err),
            _ => class_coefficients(obs.lc),
        })
        .collect())
}
