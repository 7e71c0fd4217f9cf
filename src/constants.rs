//! # Constants and type definitions for bsam
//!
//! This module centralizes the **unit aliases**, **numerical tolerances**, and **identifier
//! types** shared by the whole pipeline.
//!
//! ## Overview
//!
//! - Time and angle aliases (`MJD`, `Day`, `Degree`)
//! - [`TagId`], the caller-facing identifier of a tracked individual
//! - [`NormalizedId`], the dense integer code assigned during normalization
//! - [`FastHashMap`], the `ahash`-backed map used for lookups
use std::{collections::HashMap, convert::Infallible, fmt, str::FromStr};

use ahash::RandomState;
use serde::{Deserialize, Serialize};

// -------------------------------------------------------------------------------------------------
// Unit conversions and tolerances
// -------------------------------------------------------------------------------------------------

/// Number of seconds in a day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Relative slack applied when counting grid steps, absorbs floating-point drift
/// in `span / tstep` for spans that are an exact multiple of the step.
pub const STEP_EPS: f64 = 1e-9;

/// Largest regular grid built for one individual.
pub const MAX_STEPS: usize = 1_000_000;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Modified Julian Date (days, UTC)
pub type MJD = f64;
/// Duration expressed in days
pub type Day = f64;
/// Angle in degrees
pub type Degree = f64;

/// Dense code of an individual, `1..=k` in order of first appearance.
pub type NormalizedId = u32;

/// `HashMap` using [`ahash`](https://docs.rs/ahash) for fast hashing.
pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

// -------------------------------------------------------------------------------------------------
// Identifiers
// -------------------------------------------------------------------------------------------------

/// Identifier of a tracked individual as supplied by the caller.
///
/// This can be:
/// - A numeric tag (e.g. `Int(118)`)
/// - Any other label (e.g. `"ct36-F-09"`)
///
/// Parsing keeps the original text intact: `"007"` stays a `String` because
/// turning it into `Int(7)` would not print back to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagId {
    /// Integer tag number
    Int(i64),
    /// Free-form label
    String(String),
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagId::Int(n) => write!(f, "{n}"),
            TagId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for TagId {
    fn from(n: i64) -> Self {
        TagId::Int(n)
    }
}

impl From<u32> for TagId {
    fn from(n: u32) -> Self {
        TagId::Int(i64::from(n))
    }
}

impl From<String> for TagId {
    fn from(s: String) -> Self {
        TagId::String(s)
    }
}

impl From<&str> for TagId {
    fn from(s: &str) -> Self {
        TagId::String(s.to_string())
    }
}

impl FromStr for TagId {
    type Err = Infallible;

    /// Pure canonical integers become `Int`, everything else is kept verbatim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<i64>() {
            Ok(n) if n.to_string() == s => Ok(TagId::Int(n)),
            _ => Ok(TagId::String(s.to_string())),
        }
    }
}

#[cfg(test)]
mod constants_test {
    use super::*;

    #[test]
    fn test_tag_id_from_str() {
        assert_eq!("118".parse::<TagId>().unwrap(), TagId::Int(118));
        assert_eq!("-4".parse::<TagId>().unwrap(), TagId::Int(-4));
        assert_eq!(
            "007".parse::<TagId>().unwrap(),
            TagId::String("007".to_string())
        );
        assert_eq!(
            "ct36-F-09".parse::<TagId>().unwrap(),
            TagId::String("ct36-F-09".to_string())
        );
    }

    #[test]
    fn test_tag_id_display_round_trip() {
        for raw in ["12", "seal-a", "0042", "+3"] {
            let id: TagId = raw.parse().unwrap();
            assert_eq!(id.to_string(), raw);
        }
    }
}
