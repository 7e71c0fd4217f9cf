//! # State-space model variants
//!
//! The four movement models share one measurement equation (observations are
//! interpolated between consecutive latent locations and perturbed by
//! t-distributed errors) and differ along two axes:
//!
//! | Variant  | Joint over individuals | Behavioural switching |
//! |----------|------------------------|-----------------------|
//! | `DCRW`   | no                     | no                    |
//! | `DCRWS`  | no                     | yes                   |
//! | `hDCRW`  | yes                    | no                    |
//! | `hDCRWS` | yes                    | yes                   |
//!
//! Untrusted names are validated once at the boundary with [`FromStr`]; past that
//! point the pipeline only handles [`ModelKind`] and matches on it exhaustively.
//!
//! The declarative model descriptions consumed by the sampler are embedded in the
//! crate (`src/models/*.bug`) and exposed through [`ModelKind::model_code`].
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::bsam_errors::BsamError;

static DCRW_MODEL: &str = include_str!("models/dcrw.bug");
static DCRWS_MODEL: &str = include_str!("models/dcrws.bug");
static HDCRW_MODEL: &str = include_str!("models/hdcrw.bug");
static HDCRWS_MODEL: &str = include_str!("models/hdcrws.bug");

/// Closed set of supported movement models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// First-difference correlated random walk, one individual per sampler run.
    #[serde(rename = "DCRW")]
    Dcrw,
    /// DCRW with two behavioural states, one individual per sampler run.
    #[serde(rename = "DCRWS")]
    Dcrws,
    /// DCRW fitted jointly across individuals with shared parameters.
    #[serde(rename = "hDCRW")]
    HDcrw,
    /// Switching DCRW fitted jointly across individuals with shared parameters.
    #[serde(rename = "hDCRWS")]
    HDcrws,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Dcrw,
        ModelKind::Dcrws,
        ModelKind::HDcrw,
        ModelKind::HDcrws,
    ];

    /// Canonical model name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Dcrw => "DCRW",
            ModelKind::Dcrws => "DCRWS",
            ModelKind::HDcrw => "hDCRW",
            ModelKind::HDcrws => "hDCRWS",
        }
    }

    /// `true` when all individuals are fitted in a single joint sampler run.
    pub fn is_hierarchical(self) -> bool {
        matches!(self, ModelKind::HDcrw | ModelKind::HDcrws)
    }

    /// `true` when the model carries a discrete behavioural state per time step.
    pub fn is_switching(self) -> bool {
        matches!(self, ModelKind::Dcrws | ModelKind::HDcrws)
    }

    /// Declarative model description handed to the sampler.
    pub fn model_code(self) -> &'static str {
        match self {
            ModelKind::Dcrw => DCRW_MODEL,
            ModelKind::Dcrws => DCRWS_MODEL,
            ModelKind::HDcrw => HDCRW_MODEL,
            ModelKind::HDcrws => HDCRWS_MODEL,
        }
    }

    /// Nodes whose posterior draws are requested from the sampler.
    ///
    /// `x` holds the latent locations (one row per grid step, columns lon/lat) and
    /// `b` the behavioural state of switching models.
    pub fn monitored_nodes(self) -> &'static [&'static str] {
        if self.is_switching() {
            &["Sigma", "alpha", "gamma", "theta", "psi", "x", "b"]
        } else {
            &["Sigma", "gamma", "theta", "psi", "x"]
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = BsamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DCRW" => Ok(ModelKind::Dcrw),
            "DCRWS" => Ok(ModelKind::Dcrws),
            "hDCRW" => Ok(ModelKind::HDcrw),
            "hDCRWS" => Ok(ModelKind::HDcrws),
            _ => Err(BsamError::InvalidModel(s.to_string())),
        }
    }
}

impl TryFrom<&str> for ModelKind {
    type Error = BsamError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod test_model_kind {
    use super::*;

    #[test]
    fn test_valid_model_names() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_invalid_model_names() {
        for name in ["dcrw", "DCRW ", "hdcrws", "", "CRW", "hDCRWSS"] {
            assert_eq!(
                name.parse::<ModelKind>(),
                Err(BsamError::InvalidModel(name.to_string()))
            );
        }
    }

    #[test]
    fn test_variant_axes() {
        assert!(!ModelKind::Dcrw.is_hierarchical() && !ModelKind::Dcrw.is_switching());
        assert!(!ModelKind::Dcrws.is_hierarchical() && ModelKind::Dcrws.is_switching());
        assert!(ModelKind::HDcrw.is_hierarchical() && !ModelKind::HDcrw.is_switching());
        assert!(ModelKind::HDcrws.is_hierarchical() && ModelKind::HDcrws.is_switching());
    }

    #[test]
    fn test_model_code_matches_variant() {
        assert!(ModelKind::Dcrws.model_code().contains("dcat"));
        assert!(!ModelKind::Dcrw.model_code().contains("dcat"));
        assert!(ModelKind::HDcrw.model_code().contains("Nb"));
        assert!(ModelKind::HDcrws.monitored_nodes().contains(&"b"));
        assert!(!ModelKind::HDcrw.monitored_nodes().contains(&"b"));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ModelKind::HDcrws).unwrap();
        assert_eq!(json, "\"hDCRWS\"");
        let back: ModelKind = serde_json::from_str("\"DCRW\"").unwrap();
        assert_eq!(back, ModelKind::Dcrw);
    }
}
