use std::time::Duration;

use thiserror::Error;

use crate::constants::TagId;

/// Failures of the external sampler.
///
/// Engine diagnostics are carried verbatim so the caller can decide whether to re-run
/// with different adapt/sample/thin settings.
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Unable to launch sampler `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sampler exited with {status}: {diagnostics}")]
    Failed { status: String, diagnostics: String },

    #[error("Sampler exceeded the wall-clock timeout of {0:?}")]
    Timeout(Duration),

    #[error("Malformed sampler output: {0}")]
    MalformedOutput(String),

    #[error("Monitored node missing from sampler output: {0}")]
    MissingNode(String),

    #[error("Sampler workspace I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PartialEq for SamplerError {
    fn eq(&self, other: &Self) -> bool {
        use SamplerError::*;
        match (self, other) {
            (Launch { program: a, .. }, Launch { program: b, .. }) => a == b,
            (
                Failed {
                    status: s1,
                    diagnostics: d1,
                },
                Failed {
                    status: s2,
                    diagnostics: d2,
                },
            ) => s1 == s2 && d1 == d2,
            (Timeout(a), Timeout(b)) => a == b,
            (MalformedOutput(a), MalformedOutput(b)) => a == b,
            (MissingNode(a), MissingNode(b)) => a == b,
            (Io(_), Io(_)) => true,
            _ => false,
        }
    }
}

fn scope(id: &Option<TagId>) -> String {
    match id {
        Some(id) => format!("individual {id}"),
        None => "the hierarchical fit".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum BsamError {
    #[error("Invalid model: {0} (expected one of DCRW, DCRWS, hDCRW, hDCRWS)")]
    InvalidModel(String),

    #[error("Insufficient data for individual {id}: {reason}")]
    InsufficientData { id: TagId, reason: String },

    #[error("Inconsistent error specification for individual {id}: {reason}")]
    InconsistentErrorSpec { id: TagId, reason: String },

    #[error("Sampler failed for {}: {source}", scope(.id))]
    Sampler {
        id: Option<TagId>,
        #[source]
        source: SamplerError,
    },

    #[error("Invalid fit parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid location quality class: {0}")]
    InvalidLocationClass(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("The observation table is empty")]
    EmptyTable,

    #[error("Unable to build the worker pool: {0}")]
    WorkerPool(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid configuration file: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Unable to perform file operation: {0}")]
    Io(#[from] std::io::Error),
}

impl BsamError {
    /// `true` for errors raised by input validation, before any sampler run.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BsamError::InvalidModel(_)
                | BsamError::InsufficientData { .. }
                | BsamError::InconsistentErrorSpec { .. }
                | BsamError::InvalidParameter(_)
                | BsamError::InvalidLocationClass(_)
                | BsamError::InvalidTimestamp(_)
                | BsamError::InvalidCoordinate(_)
                | BsamError::EmptyTable
        )
    }
}

impl PartialEq for BsamError {
    fn eq(&self, other: &Self) -> bool {
        use BsamError::*;
        match (self, other) {
            (InvalidModel(a), InvalidModel(b)) => a == b,
            (
                InsufficientData {
                    id: i1,
                    reason: r1,
                },
                InsufficientData {
                    id: i2,
                    reason: r2,
                },
            ) => i1 == i2 && r1 == r2,
            (
                InconsistentErrorSpec {
                    id: i1,
                    reason: r1,
                },
                InconsistentErrorSpec {
                    id: i2,
                    reason: r2,
                },
            ) => i1 == i2 && r1 == r2,
            (
                Sampler {
                    id: i1,
                    source: s1,
                },
                Sampler {
                    id: i2,
                    source: s2,
                },
            ) => i1 == i2 && s1 == s2,
            (InvalidParameter(a), InvalidParameter(b)) => a == b,
            (InvalidLocationClass(a), InvalidLocationClass(b)) => a == b,
            (InvalidTimestamp(a), InvalidTimestamp(b)) => a == b,
            (InvalidCoordinate(a), InvalidCoordinate(b)) => a == b,
            (WorkerPool(a), WorkerPool(b)) => a == b,

            // Not comparable: equal when the variant matches
            (Csv(_), Csv(_)) => true,
            (Config(_), Config(_)) => true,
            (Io(_), Io(_)) => true,

            (EmptyTable, EmptyTable) => true,

            _ => false,
        }
    }
}
