//! # Tracking observations
//!
//! Raw, possibly irregularly timed locations of tagged individuals.
//!
//! ## Data model
//! -----------------
//! * [`Observation`] – one location fix: individual, time, quality class, lon/lat and
//!   optional explicit errors.
//! * [`LocationClass`] – Argos location quality class (`3, 2, 1, 0, A, B, Z`) or `G`
//!   for fixes with externally supplied errors (GPS, geolocation).
//! * [`ObservationTable`] – rows in input order; this is what callers hand to
//!   [`fit_ssm`](crate::bsam::fit_ssm).
//!
//! ## Ingestion
//! -----------------
//! * [`csv_reader`] – CSV files with `id,date,lc,lon,lat[,lonerr,laterr]` columns.
//! * [`ObservationTable::push`] / `FromIterator` – in-memory construction.
//!
//! ## Invariants
//! -----------------
//! * Explicit errors are only meaningful with class `G`; this is checked per
//!   individual by the preparer, not at construction time.
//! * Times are **MJD (UTC)**, angles are **degrees**.
//!
//! See also
//! ------------
//! * [`normalize`] – dense per-individual codes in first-appearance order.
//! * [`crate::error_models`] – how classes and explicit errors become error coefficients.
pub mod csv_reader;
pub mod normalize;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    bsam_errors::BsamError,
    constants::{Degree, TagId, MJD},
};

/// Argos location quality class.
///
/// Classes are ordered from the most to the least accurate Argos fix;
/// `Z` is treated exactly like `B` by the error model. `G` marks fixes whose
/// errors are known (GPS or user-supplied).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocationClass {
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "0")]
    Zero,
    A,
    B,
    Z,
    G,
}

impl LocationClass {
    pub fn code(self) -> &'static str {
        match self {
            LocationClass::Three => "3",
            LocationClass::Two => "2",
            LocationClass::One => "1",
            LocationClass::Zero => "0",
            LocationClass::A => "A",
            LocationClass::B => "B",
            LocationClass::Z => "Z",
            LocationClass::G => "G",
        }
    }
}

impl fmt::Display for LocationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LocationClass {
    type Err = BsamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "3" => Ok(LocationClass::Three),
            "2" => Ok(LocationClass::Two),
            "1" => Ok(LocationClass::One),
            "0" => Ok(LocationClass::Zero),
            "A" | "a" => Ok(LocationClass::A),
            "B" | "b" => Ok(LocationClass::B),
            "Z" | "z" => Ok(LocationClass::Z),
            "G" | "g" => Ok(LocationClass::G),
            other => Err(BsamError::InvalidLocationClass(other.to_string())),
        }
    }
}

/// A single location fix.
///
/// # Fields
///
/// * `id` - The individual this fix belongs to
/// * `time` - The time of the fix (MJD, UTC)
/// * `lc` - The location quality class
/// * `lon` / `lat` - The observed position in degrees
/// * `lon_error` / `lat_error` - Optional explicit 1-σ errors in degrees (class `G` only)
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: TagId,
    pub time: MJD,
    pub lc: LocationClass,
    pub lon: Degree,
    pub lat: Degree,
    pub lon_error: Option<Degree>,
    pub lat_error: Option<Degree>,
}

impl Observation {
    /// Create a fix whose error comes from its quality class.
    pub fn new(
        id: impl Into<TagId>,
        time: MJD,
        lc: LocationClass,
        lon: Degree,
        lat: Degree,
    ) -> Self {
        Observation {
            id: id.into(),
            time,
            lc,
            lon,
            lat,
            lon_error: None,
            lat_error: None,
        }
    }

    /// Attach explicit longitude/latitude errors (degrees).
    pub fn with_errors(mut self, lon_error: Degree, lat_error: Degree) -> Self {
        self.lon_error = Some(lon_error);
        self.lat_error = Some(lat_error);
        self
    }

    /// `true` when at least one explicit error component is present.
    pub fn has_explicit_error(&self) -> bool {
        self.lon_error.is_some() || self.lat_error.is_some()
    }
}

/// Observations of one or more individuals, kept in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    rows: Vec<Observation>,
}

impl ObservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, obs: Observation) {
        self.rows.push(obs);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }
}

impl FromIterator<Observation> for ObservationTable {
    fn from_iter<T: IntoIterator<Item = Observation>>(iter: T) -> Self {
        ObservationTable {
            rows: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Observation>> for ObservationTable {
    fn from(rows: Vec<Observation>) -> Self {
        ObservationTable { rows }
    }
}

impl<'a> IntoIterator for &'a ObservationTable {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
