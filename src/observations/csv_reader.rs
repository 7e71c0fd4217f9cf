//! # CSV ingestion of tracking data
//!
//! Expected header (column order is free, extra columns are ignored):
//!
//! ```text
//! id,date,lc,lon,lat[,lonerr,laterr]
//! ```
//!
//! * `id` – any label; canonical integers are kept as numbers, everything else verbatim.
//! * `date` – either an MJD number or a Gregorian UTC timestamp such as
//!   `2019-03-02 14:05:00` or `2019-03-02T14:05:00 UTC` (parsed with `hifitime`).
//! * `lc` – location quality class, see [`LocationClass`].
//! * `lon`, `lat` – degrees.
//! * `lonerr`, `laterr` – optional explicit 1-σ errors in degrees (class `G` only).
use std::{io::Read, str::FromStr};

use camino::Utf8Path;
use hifitime::Epoch;
use serde::Deserialize;

use crate::{
    bsam_errors::BsamError,
    constants::{TagId, MJD},
    observations::{LocationClass, Observation, ObservationTable},
};

#[derive(Debug, Deserialize)]
struct CsvRecord {
    id: String,
    date: String,
    lc: String,
    lon: f64,
    lat: f64,
    #[serde(default)]
    lonerr: Option<f64>,
    #[serde(default)]
    laterr: Option<f64>,
}

/// Parse a `date` cell into MJD (UTC).
///
/// Numeric cells are taken as MJD directly; anything else goes through
/// [`Epoch::from_str`] after normalizing a `YYYY-MM-DD hh:mm:ss` separator.
pub fn parse_timestamp(raw: &str) -> Result<MJD, BsamError> {
    let raw = raw.trim();
    if let Ok(mjd) = raw.parse::<f64>() {
        if !mjd.is_finite() {
            return Err(BsamError::InvalidTimestamp(format!("{raw}: not a finite MJD")));
        }
        return Ok(mjd);
    }

    let normalized = if raw.len() >= 19 && raw.as_bytes()[10] == b' ' {
        format!("{}T{}", &raw[..10], &raw[11..])
    } else {
        raw.to_string()
    };

    Epoch::from_str(&normalized)
        .map(|epoch| epoch.to_mjd_utc_days())
        .map_err(|e| BsamError::InvalidTimestamp(format!("{raw}: {e}")))
}

fn record_to_observation(record: CsvRecord) -> Result<Observation, BsamError> {
    let id = match TagId::from_str(record.id.trim()) {
        Ok(id) => id,
        Err(never) => match never {},
    };

    for (name, value) in [("lon", record.lon), ("lat", record.lat)] {
        if !value.is_finite() {
            return Err(BsamError::InvalidCoordinate(format!(
                "{name} = {value} for individual {id}"
            )));
        }
    }

    Ok(Observation {
        id,
        time: parse_timestamp(&record.date)?,
        lc: record.lc.parse()?,
        lon: record.lon,
        lat: record.lat,
        lon_error: record.lonerr,
        lat_error: record.laterr,
    })
}

/// Read an [`ObservationTable`] from any CSV source.
pub fn read_observations<R: Read>(reader: R) -> Result<ObservationTable, BsamError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    csv_reader
        .deserialize::<CsvRecord>()
        .map(|record| record_to_observation(record?))
        .collect()
}

/// Read an [`ObservationTable`] from a CSV file on disk.
pub fn read_observations_file(path: &Utf8Path) -> Result<ObservationTable, BsamError> {
    let file = std::fs::File::open(path)?;
    read_observations(file)
}
