//! # Result aggregation
//!
//! Turn the per-code outcomes of the orchestrators into caller-facing results:
//!
//! * normalized codes are relabelled to the original [`TagId`]s, in the summary
//!   rows and in the retained input rows;
//! * single-series outcomes become an [`IndividualFits`] map, ordered by first
//!   appearance in the input table;
//! * a hierarchical outcome stays one combined [`FitResult`] whose rows carry
//!   their individual.
//!
//! The combined summary table (all individuals, all steps) can be written as CSV
//! with [`FitBundle::write_summary_csv`].
use std::{io::Write, time::Duration};

use ahash::RandomState;
use hifitime::Epoch;
use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    bsam_errors::BsamError,
    constants::{Day, Degree, NormalizedId, TagId, MJD},
    fit::{single::IndividualOutcome, FitResult, StepSummary},
    model::ModelKind,
    observations::normalize::IdMap,
};

/// Per-individual outcomes of a single-series fit, in input order.
///
/// Failed individuals stay in the map as `Err` entries; they never hide the
/// results of the others.
pub type IndividualFits = IndexMap<TagId, Result<FitResult<TagId>, BsamError>, RandomState>;

/// Borrow the fit of `id`.
///
/// Return
/// ----------
/// * `Ok(Some(fit))` – the individual was fitted.
/// * `Ok(None)` – unknown identifier.
/// * `Err(e)` – the individual failed with `e`.
pub fn fit_for<'a>(
    all: &'a IndividualFits,
    id: &TagId,
) -> Result<Option<&'a FitResult<TagId>>, &'a BsamError> {
    match all.get(id) {
        None => Ok(None),
        Some(Err(e)) => Err(e),
        Some(Ok(fit)) => Ok(Some(fit)),
    }
}

/// Relabel single-series outcomes, the `i`-th outcome belonging to code `i + 1`.
pub fn relabel_individuals(ids: &IdMap, outcomes: Vec<IndividualOutcome>) -> IndividualFits {
    ids.iter()
        .zip(outcomes)
        .map(|((_, original), outcome)| {
            (
                original.clone(),
                outcome.map(|fit| fit.map_ids(|code| ids.relabel(*code))),
            )
        })
        .collect()
}

/// Relabel a hierarchical result.
pub fn relabel_joint(ids: &IdMap, fit: FitResult<NormalizedId>) -> FitResult<TagId> {
    fit.map_ids(|code| ids.relabel(*code))
}

/// Everything a fit produced.
#[derive(Debug, PartialEq)]
pub enum FitBundle {
    /// One entry per individual (DCRW, DCRWS)
    Individual(IndividualFits),
    /// One combined result (hDCRW, hDCRWS)
    Hierarchical(FitResult<TagId>),
}

impl FitBundle {
    /// Failed individuals with their error; always empty for hierarchical bundles.
    pub fn failures(&self) -> Vec<(&TagId, &BsamError)> {
        match self {
            FitBundle::Individual(fits) => fits
                .iter()
                .filter_map(|(id, r)| r.as_ref().err().map(|e| (id, e)))
                .collect(),
            FitBundle::Hierarchical(_) => Vec::new(),
        }
    }

    /// Successful fits, in input order.
    pub fn fits(&self) -> Vec<&FitResult<TagId>> {
        match self {
            FitBundle::Individual(fits) => fits.values().filter_map(|r| r.as_ref().ok()).collect(),
            FitBundle::Hierarchical(fit) => vec![fit],
        }
    }

    /// Summary rows of every successful individual, grouped by individual in input order.
    pub fn combined_summary(&self) -> Vec<&StepSummary<TagId>> {
        self.fits().into_iter().flat_map(|f| f.summary.iter()).collect()
    }

    /// Total number of estimated locations over successful fits.
    pub fn estimated_locations(&self) -> usize {
        self.fits().iter().map(|f| f.estimated_locations).sum()
    }

    /// Write the combined summary table as CSV.
    ///
    /// Columns: `id, date, mjd, lon, lat, lon_median, lat_median, lon_q025, lon_q975,
    /// lat_q025, lat_q975, observed, b, b_median, state` (the last three are empty for
    /// non-switching models). `date` is the ISO-8601 UTC form of `mjd`.
    pub fn write_summary_csv<W: Write>(&self, writer: W) -> Result<(), BsamError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in self.combined_summary() {
            csv_writer.serialize(SummaryRecord::from(row))?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SummaryRecord {
    id: String,
    date: String,
    mjd: MJD,
    lon: Degree,
    lat: Degree,
    lon_median: Degree,
    lat_median: Degree,
    lon_q025: Degree,
    lon_q975: Degree,
    lat_q025: Degree,
    lat_q975: Degree,
    observed: bool,
    b: Option<f64>,
    b_median: Option<f64>,
    state: Option<String>,
}

impl From<&StepSummary<TagId>> for SummaryRecord {
    fn from(s: &StepSummary<TagId>) -> Self {
        SummaryRecord {
            id: s.id.to_string(),
            date: Epoch::from_mjd_utc(s.date).to_string(),
            mjd: s.date,
            lon: s.lon,
            lat: s.lat,
            lon_median: s.lon_median,
            lat_median: s.lat_median,
            lon_q025: s.lon_q025,
            lon_q975: s.lon_q975,
            lat_q025: s.lat_q025,
            lat_q975: s.lat_q975,
            observed: s.observed,
            b: s.b,
            b_median: s.b_median,
            state: s.state.map(|st| st.to_string()),
        }
    }
}

/// Result of [`crate::bsam::fit_ssm`].
#[derive(Debug, PartialEq)]
pub struct SsmFit {
    pub model: ModelKind,
    pub tstep: Day,
    pub bundle: FitBundle,
    /// Wall-clock duration of the whole call
    pub elapsed: Duration,
}

impl SsmFit {
    pub fn failures(&self) -> Vec<(&TagId, &BsamError)> {
        self.bundle.failures()
    }

    /// `true` when every individual was fitted.
    pub fn is_complete(&self) -> bool {
        self.bundle.failures().is_empty()
    }
}
