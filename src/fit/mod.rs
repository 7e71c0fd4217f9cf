//! # Model fitting
//!
//! Configuration, result types and the two orchestrators that turn prepared
//! tracks into posterior summaries.
//!
//! ## Orchestrators
//! -----------------
//! * [`single::fit_individuals`] – one sampler run per individual, dispatched on a
//!   bounded worker pool. A failing individual never affects the others.
//! * [`hierarchical::fit_joint`] – one sampler run over all individuals stacked
//!   together, sharing hyper-parameters. Any failure aborts the whole fit.
//!
//! Both produce [`FitResult`]s keyed by the dense [`NormalizedId`] of each
//! individual; relabelling to caller identifiers happens in [`crate::aggregate`].
//!
//! ## Configuration
//! -----------------
//! [`FitParams`] collects every knob of a run (grid step, sampler schedule,
//! smoothing span, error parameterization, worker count, timeout, seed). It is
//! built through [`FitParams::builder`] or loaded from JSON with
//! [`FitParams::from_json`]; both paths go through [`FitParams::validate`].
//!
//! Defaults
//! -----------------
//! | field     | default          |
//! |-----------|------------------|
//! | `tstep`   | `1.0` day        |
//! | `adapt`   | `10000`          |
//! | `samples` | `5000`           |
//! | `thin`    | `5`              |
//! | `chains`  | `2`              |
//! | `span`    | `0.2`            |
//! | `workers` | `1`              |
//! | `timeout` | none             |
pub mod hierarchical;
#[cfg(feature = "progress")]
pub(crate) mod progress_bar;
pub mod single;
pub mod summary;

use std::{cmp::Ordering::Greater, fmt, time::Duration};

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::{
    bsam_errors::BsamError,
    constants::{Day, Degree, NormalizedId, MJD},
    error_models::ErrorParameterization,
    model::ModelKind,
    observations::LocationClass,
    prepare::{PrepareParams, RegularizedTrack},
    sampler::{NodeKey, PosteriorDraws, RunConfig},
};

/// Parameters of one call to [`crate::bsam::fit_ssm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitParams {
    /// Grid step in days
    pub tstep: Day,
    /// Adaptation iterations of the sampler
    pub adapt: usize,
    /// Burn-in and monitored iterations of the sampler
    pub samples: usize,
    /// Thinning factor of the monitored iterations
    pub thin: usize,
    /// Number of independent chains
    pub chains: usize,
    /// Loess span for the initial locations
    pub span: f64,
    /// Derivation of observation errors
    pub errors: ErrorParameterization,
    /// Concurrent sampler runs in single-series mode
    pub workers: usize,
    /// Wall-clock limit of each sampler run, in seconds
    pub timeout_secs: Option<f64>,
    /// Base seed of the sampler's random number generators
    pub seed: Option<u64>,
    /// Silence the progress display
    pub quiet: bool,
}

impl Default for FitParams {
    fn default() -> Self {
        FitParams {
            tstep: 1.0,
            adapt: 10_000,
            samples: 5_000,
            thin: 5,
            chains: 2,
            span: 0.2,
            errors: ErrorParameterization::LocationClass,
            workers: 1,
            timeout_secs: None,
            seed: None,
            quiet: false,
        }
    }
}

#[inline]
fn gt0(x: f64) -> bool {
    x.partial_cmp(&0.0) == Some(Greater)
}

fn invalid(msg: &str) -> BsamError {
    BsamError::InvalidParameter(msg.to_string())
}

impl FitParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fluent, validating construction of [`FitParams`].
    ///
    /// ```rust
    /// use bsam::fit::FitParams;
    ///
    /// let params = FitParams::builder()
    ///     .tstep(0.25)
    ///     .adapt(2000)
    ///     .samples(1000)
    ///     .thin(2)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(params.chains, 2);
    /// ```
    pub fn builder() -> FitParamsBuilder {
        FitParamsBuilder::new()
    }

    /// Check every range constraint, returning the first violation.
    pub fn validate(&self) -> Result<(), BsamError> {
        if !gt0(self.tstep) || !self.tstep.is_finite() {
            return Err(invalid("tstep must be a finite number of days > 0"));
        }
        if self.adapt == 0 {
            return Err(invalid("adapt must be > 0"));
        }
        if self.samples == 0 {
            return Err(invalid("samples must be > 0"));
        }
        if self.thin == 0 {
            return Err(invalid("thin must be >= 1"));
        }
        if self.thin > self.samples {
            return Err(invalid("thin must not exceed samples"));
        }
        if self.chains == 0 {
            return Err(invalid("chains must be >= 1"));
        }
        if !gt0(self.span) || !self.span.is_finite() {
            return Err(invalid("span must be > 0"));
        }
        if self.workers == 0 {
            return Err(invalid("workers must be >= 1"));
        }
        if let Some(t) = self.timeout_secs {
            if !gt0(t) || Duration::try_from_secs_f64(t).is_err() {
                return Err(invalid(
                    "timeout must be a positive number of seconds representable as a duration",
                ));
            }
        }
        Ok(())
    }

    /// Load and validate parameters from a JSON file; missing fields take their default.
    pub fn from_json(path: &Utf8Path) -> Result<Self, BsamError> {
        let contents = std::fs::read_to_string(path)?;
        let params: FitParams = serde_json::from_str(&contents)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> Result<String, BsamError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Wall-clock limit of one sampler run; out-of-range values are rejected by [`FitParams::validate`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .and_then(|t| Duration::try_from_secs_f64(t).ok())
    }

    /// Sampler schedule derived from these parameters.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            adapt: self.adapt,
            samples: self.samples,
            thin: self.thin,
            chains: self.chains,
            seed: self.seed,
            timeout: self.timeout(),
        }
    }

    /// Preparation parameters derived from these parameters.
    pub fn prepare_params(&self) -> PrepareParams {
        PrepareParams {
            tstep: self.tstep,
            span: self.span,
            errors: self.errors,
        }
    }
}

/// Builder for [`FitParams`], validated on [`FitParamsBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct FitParamsBuilder {
    params: FitParams,
}

impl FitParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tstep(mut self, v: Day) -> Self {
        self.params.tstep = v;
        self
    }
    pub fn adapt(mut self, v: usize) -> Self {
        self.params.adapt = v;
        self
    }
    pub fn samples(mut self, v: usize) -> Self {
        self.params.samples = v;
        self
    }
    pub fn thin(mut self, v: usize) -> Self {
        self.params.thin = v;
        self
    }
    pub fn chains(mut self, v: usize) -> Self {
        self.params.chains = v;
        self
    }
    pub fn span(mut self, v: f64) -> Self {
        self.params.span = v;
        self
    }
    pub fn errors(mut self, v: ErrorParameterization) -> Self {
        self.params.errors = v;
        self
    }
    pub fn workers(mut self, v: usize) -> Self {
        self.params.workers = v;
        self
    }
    pub fn timeout_secs(mut self, v: f64) -> Self {
        self.params.timeout_secs = Some(v);
        self
    }
    pub fn seed(mut self, v: u64) -> Self {
        self.params.seed = Some(v);
        self
    }
    pub fn quiet(mut self, v: bool) -> Self {
        self.params.quiet = v;
        self
    }

    pub fn build(self) -> Result<FitParams, BsamError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

/// Behavioural state read from the posterior mean of `b ∈ [1, 2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviouralState {
    /// Directed, persistent movement (`b < 1.25`)
    Transit,
    /// Area-restricted search (`b > 1.75`)
    AreaRestricted,
    /// Posterior mass split between both states
    Uncertain,
}

impl BehaviouralState {
    pub const TRANSIT_BELOW: f64 = 1.25;
    pub const RESTRICTED_ABOVE: f64 = 1.75;

    /// NaN means no usable draws and maps to [`BehaviouralState::Uncertain`].
    pub fn from_mean(b: f64) -> Self {
        if b < Self::TRANSIT_BELOW {
            BehaviouralState::Transit
        } else if b > Self::RESTRICTED_ABOVE {
            BehaviouralState::AreaRestricted
        } else {
            BehaviouralState::Uncertain
        }
    }

    /// State index used by the model (`1` transit, `2` area-restricted), `None` when uncertain.
    pub fn index(self) -> Option<u8> {
        match self {
            BehaviouralState::Transit => Some(1),
            BehaviouralState::AreaRestricted => Some(2),
            BehaviouralState::Uncertain => None,
        }
    }
}

impl fmt::Display for BehaviouralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BehaviouralState::Transit => f.write_str("transit"),
            BehaviouralState::AreaRestricted => f.write_str("area_restricted"),
            BehaviouralState::Uncertain => f.write_str("uncertain"),
        }
    }
}

/// Posterior summary of one grid step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSummary<I> {
    pub id: I,
    pub date: MJD,
    /// At least one observation is nearest to this step
    pub observed: bool,
    pub lon: Degree,
    pub lat: Degree,
    pub lon_median: Degree,
    pub lat_median: Degree,
    pub lon_q025: Degree,
    pub lon_q975: Degree,
    pub lat_q025: Degree,
    pub lat_q975: Degree,
    /// Posterior mean of the behavioural state (switching models)
    pub b: Option<f64>,
    pub b_median: Option<f64>,
    pub state: Option<BehaviouralState>,
}

/// One input observation as kept in a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRow<I> {
    pub id: I,
    pub date: MJD,
    pub lc: LocationClass,
    pub lon: Degree,
    pub lat: Degree,
    pub lon_error: Option<Degree>,
    pub lat_error: Option<Degree>,
}

/// Posterior summary of one scalar model parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSummary {
    pub node: NodeKey,
    pub mean: f64,
    pub sd: f64,
    pub q025: f64,
    pub median: f64,
    pub q975: f64,
}

/// Outcome of one sampler run: one individual, or all of them for hierarchical models.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult<I> {
    /// Individuals covered, in input order
    pub ids: Vec<I>,
    pub model: ModelKind,
    pub tstep: Day,
    /// Input observations used by the fit
    pub data: Vec<DataRow<I>>,
    /// Number of estimated grid locations
    pub estimated_locations: usize,
    /// Raw draws returned by the sampler
    pub posterior: PosteriorDraws,
    /// One row per grid step, grouped by individual
    pub summary: Vec<StepSummary<I>>,
    pub parameters: Vec<ParameterSummary>,
}

impl<I> FitResult<I> {
    /// Replace every identifier through `f`, keeping everything else.
    pub fn map_ids<J>(self, f: impl Fn(&I) -> J) -> FitResult<J> {
        FitResult {
            ids: self.ids.iter().map(&f).collect(),
            model: self.model,
            tstep: self.tstep,
            data: self
                .data
                .into_iter()
                .map(|row| DataRow {
                    id: f(&row.id),
                    date: row.date,
                    lc: row.lc,
                    lon: row.lon,
                    lat: row.lat,
                    lon_error: row.lon_error,
                    lat_error: row.lat_error,
                })
                .collect(),
            estimated_locations: self.estimated_locations,
            posterior: self.posterior,
            summary: self
                .summary
                .into_iter()
                .map(|s| StepSummary {
                    id: f(&s.id),
                    date: s.date,
                    observed: s.observed,
                    lon: s.lon,
                    lat: s.lat,
                    lon_median: s.lon_median,
                    lat_median: s.lat_median,
                    lon_q025: s.lon_q025,
                    lon_q975: s.lon_q975,
                    lat_q025: s.lat_q025,
                    lat_q975: s.lat_q975,
                    b: s.b,
                    b_median: s.b_median,
                    state: s.state,
                })
                .collect(),
            parameters: self.parameters,
        }
    }

    /// Summary rows of individual `id`.
    pub fn summary_of<'a>(&'a self, id: &'a I) -> impl Iterator<Item = &'a StepSummary<I>>
    where
        I: PartialEq,
    {
        self.summary.iter().filter(move |s| s.id == *id)
    }

    /// Summary of parameter `name` (scalar node or first element).
    pub fn parameter(&self, node: &NodeKey) -> Option<&ParameterSummary> {
        self.parameters.iter().find(|p| p.node == *node)
    }
}

/// Input rows of prepared tracks, tagged with their normalized code.
pub(crate) fn data_rows(tracks: &[&RegularizedTrack]) -> Vec<DataRow<NormalizedId>> {
    tracks
        .iter()
        .flat_map(|t| {
            t.observations.iter().map(move |o| DataRow {
                id: t.code,
                date: o.time,
                lc: o.lc,
                lon: o.lon,
                lat: o.lat,
                lon_error: o.lon_error,
                lat_error: o.lat_error,
            })
        })
        .collect()
}

#[cfg(test)]
mod fit_params_test {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = FitParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.run_config(), RunConfig::default());
    }

    #[test]
    fn test_builder_rejects_out_of_range() {
        assert!(FitParams::builder().tstep(0.0).build().is_err());
        assert!(FitParams::builder().tstep(f64::NAN).build().is_err());
        assert!(FitParams::builder().adapt(0).build().is_err());
        assert!(FitParams::builder().samples(0).build().is_err());
        assert!(FitParams::builder().thin(0).build().is_err());
        assert!(FitParams::builder().samples(10).thin(20).build().is_err());
        assert!(FitParams::builder().chains(0).build().is_err());
        assert!(FitParams::builder().span(-0.1).build().is_err());
        assert!(FitParams::builder().workers(0).build().is_err());
        assert!(FitParams::builder().timeout_secs(0.0).build().is_err());
        assert!(FitParams::builder().timeout_secs(f64::INFINITY).build().is_err());
        assert!(FitParams::builder().timeout_secs(1e30).build().is_err());
    }

    #[test]
    fn test_huge_timeout_never_panics() {
        let params = FitParams {
            timeout_secs: Some(1e30),
            ..FitParams::default()
        };
        assert!(params.validate().is_err());
        assert_eq!(params.timeout(), None);
        assert_eq!(params.run_config().timeout, None);
    }

    #[test]
    fn test_builder_sets_fields() {
        let params = FitParams::builder()
            .tstep(0.5)
            .chains(3)
            .workers(4)
            .timeout_secs(90.0)
            .seed(7)
            .build()
            .unwrap();
        let run = params.run_config();
        assert_eq!(run.chains, 3);
        assert_eq!(run.seed, Some(7));
        assert_eq!(run.timeout, Some(Duration::from_secs(90)));
        assert_eq!(params.prepare_params().tstep, 0.5);
    }

    #[test]
    fn test_json_partial_config() {
        let params: FitParams =
            serde_json::from_str(r#"{"tstep": 0.25, "errors": "explicit", "workers": 3}"#).unwrap();
        assert_eq!(params.tstep, 0.25);
        assert_eq!(params.errors, ErrorParameterization::Explicit);
        assert_eq!(params.samples, 5_000);

        let back: FitParams = serde_json::from_str(&params.to_json().unwrap()).unwrap();
        assert_eq!(back, params);

        assert!(serde_json::from_str::<FitParams>(r#"{"tsteps": 1.0}"#).is_err());
    }

    #[test]
    fn test_from_json_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("fit.json")).unwrap();
        std::fs::write(&path, r#"{"thin": 0}"#).unwrap();
        assert!(matches!(
            FitParams::from_json(&path),
            Err(BsamError::InvalidParameter(_))
        ));

        std::fs::write(&path, r#"{"thin": 2, "seed": 11}"#).unwrap();
        let params = FitParams::from_json(&path).unwrap();
        assert_eq!((params.thin, params.seed), (2, Some(11)));
    }

    #[test]
    fn test_behavioural_state_thresholds() {
        assert_eq!(BehaviouralState::from_mean(1.0), BehaviouralState::Transit);
        assert_eq!(BehaviouralState::from_mean(1.249), BehaviouralState::Transit);
        assert_eq!(BehaviouralState::from_mean(1.25), BehaviouralState::Uncertain);
        assert_eq!(BehaviouralState::from_mean(1.75), BehaviouralState::Uncertain);
        assert_eq!(BehaviouralState::from_mean(1.9), BehaviouralState::AreaRestricted);
        assert_eq!(BehaviouralState::from_mean(f64::NAN), BehaviouralState::Uncertain);
        assert_eq!(BehaviouralState::AreaRestricted.index(), Some(2));
    }
}
