//! # Sampler input bundle
//!
//! Stack one or more [`RegularizedTrack`]s into the named arrays consumed by the
//! model code of [`crate::model`].
//!
//! ## Data nodes
//! -----------------
//! | name              | shape          | content                                                  |
//! |-------------------|----------------|----------------------------------------------------------|
//! | `y`               | `nobs × 2`     | observed lon/lat                                         |
//! | `itau2`, `nu`     | `nobs × 2`     | error precision and degrees of freedom                   |
//! | `w`               | `nobs`         | interpolation weight on the lower step                   |
//! | `idx`             | `rows + 1`     | cumulative observation count, obs of row `i` are `idx[i]+1..=idx[i+1]` |
//! | `obs`             | `rows`         | `1` when a fix is nearest to the row's step, `0` in a gap |
//! | `Omega`           | `2 × 2`        | Wishart scale (identity)                                 |
//! | `RegN`            | scalar         | grid length (single-series models)                       |
//! | `Nb`, `first`, `last`, `yfirst` | scalar, `Nb` | individual count and 1-based row/obs bounds (hierarchical models) |
//! | `ind`             | `rows`         | normalized code of the individual owning each row (hierarchical models) |
//! | `lambda`          | `2`            | initial state probabilities (switching models)           |
//!
//! Initial values hold `x`, the smoothed locations of every grid row.
//!
//! Grids are stacked in the order given, so row `r` of `x` always maps back to a
//! single `(individual, step)` through [`TrackLayout`].
use indexmap::IndexMap;

use crate::{bsam_errors::BsamError, constants::NormalizedId, model::ModelKind};

use super::RegularizedTrack;

/// A numeric array in the sampler's data format.
///
/// Matrices are stored row-major; the writer transposes them as needed.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix {
        rows: usize,
        cols: usize,
        values: Vec<f64>,
    },
}

impl DataValue {
    fn matrix_2(pairs: impl IntoIterator<Item = (f64, f64)>) -> DataValue {
        let values: Vec<f64> = pairs.into_iter().flat_map(|(a, b)| [a, b]).collect();
        DataValue::Matrix {
            rows: values.len() / 2,
            cols: 2,
            values,
        }
    }

    fn counts(values: impl IntoIterator<Item = usize>) -> DataValue {
        DataValue::Vector(values.into_iter().map(|v| v as f64).collect())
    }
}

/// Placement of one individual in the stacked arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackLayout {
    pub code: NormalizedId,
    /// 0-based index of the first grid row of this individual in `x`
    pub first_row: usize,
    pub n_steps: usize,
    /// 0-based index of the first observation of this individual in `y`
    pub first_obs: usize,
    pub n_obs: usize,
}

impl TrackLayout {
    /// Grid rows of this individual, 0-based.
    pub fn rows(&self) -> std::ops::Range<usize> {
        self.first_row..self.first_row + self.n_steps
    }
}

/// Everything one sampler run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerData {
    pub model: ModelKind,
    pub data: IndexMap<String, DataValue>,
    pub inits: IndexMap<String, DataValue>,
    pub layout: Vec<TrackLayout>,
}

impl SamplerData {
    /// Build the sampler input for `model` from prepared tracks.
    ///
    /// Single-series models take exactly one track, hierarchical models one or more.
    pub fn from_tracks(
        model: ModelKind,
        tracks: &[&RegularizedTrack],
    ) -> Result<SamplerData, BsamError> {
        if tracks.is_empty() {
            return Err(BsamError::InvalidParameter(
                "no prepared track to hand to the sampler".into(),
            ));
        }
        if !model.is_hierarchical() && tracks.len() != 1 {
            return Err(BsamError::InvalidParameter(format!(
                "{model} fits one individual per run, got {}",
                tracks.len()
            )));
        }

        let mut layout = Vec::with_capacity(tracks.len());
        let (mut row, mut obs) = (0usize, 0usize);
        for track in tracks {
            layout.push(TrackLayout {
                code: track.code,
                first_row: row,
                n_steps: track.n_steps(),
                first_obs: obs,
                n_obs: track.n_observations(),
            });
            row += track.n_steps();
            obs += track.n_observations();
        }
        let total_rows = row;

        let observations = || tracks.iter().flat_map(|t| t.observations.iter());

        // idx[r + 1] - idx[r] = observations interpolated in the interval starting at global row r
        let mut per_row = vec![0usize; total_rows];
        for (track, place) in tracks.iter().zip(&layout) {
            for o in &track.observations {
                per_row[place.first_row + o.interval] += 1;
            }
        }
        let idx: Vec<usize> = std::iter::once(0)
            .chain(per_row.iter().scan(0usize, |acc, n| {
                *acc += n;
                Some(*acc)
            }))
            .collect();

        let mut data = IndexMap::new();
        data.insert(
            "y".to_string(),
            DataValue::matrix_2(observations().map(|o| (o.lon, o.lat))),
        );
        data.insert(
            "itau2".to_string(),
            DataValue::matrix_2(observations().map(|o| (o.errors.itau2_lon, o.errors.itau2_lat))),
        );
        data.insert(
            "nu".to_string(),
            DataValue::matrix_2(observations().map(|o| (o.errors.nu_lon, o.errors.nu_lat))),
        );
        data.insert(
            "w".to_string(),
            DataValue::Vector(observations().map(|o| o.weight).collect()),
        );
        data.insert("idx".to_string(), DataValue::counts(idx));
        data.insert(
            "obs".to_string(),
            DataValue::counts(
                tracks
                    .iter()
                    .flat_map(|t| t.steps.iter())
                    .map(|s| usize::from(s.observed)),
            ),
        );
        data.insert(
            "Omega".to_string(),
            DataValue::Matrix {
                rows: 2,
                cols: 2,
                values: vec![1.0, 0.0, 0.0, 1.0],
            },
        );

        if model.is_hierarchical() {
            data.insert("Nb".to_string(), DataValue::Scalar(layout.len() as f64));
            data.insert(
                "first".to_string(),
                DataValue::counts(layout.iter().map(|l| l.first_row + 1)),
            );
            data.insert(
                "last".to_string(),
                DataValue::counts(layout.iter().map(|l| l.first_row + l.n_steps)),
            );
            data.insert(
                "yfirst".to_string(),
                DataValue::counts(layout.iter().map(|l| l.first_obs + 1)),
            );
            data.insert(
                "ind".to_string(),
                DataValue::Vector(
                    layout
                        .iter()
                        .flat_map(|l| std::iter::repeat(f64::from(l.code)).take(l.n_steps))
                        .collect(),
                ),
            );
        } else {
            data.insert("RegN".to_string(), DataValue::Scalar(total_rows as f64));
        }

        if model.is_switching() {
            data.insert("lambda".to_string(), DataValue::Vector(vec![0.5, 0.5]));
        }

        let mut inits = IndexMap::new();
        inits.insert(
            "x".to_string(),
            DataValue::matrix_2(
                tracks
                    .iter()
                    .flat_map(|t| t.steps.iter())
                    .map(|s| (s.init_lon, s.init_lat)),
            ),
        );

        Ok(SamplerData {
            model,
            data,
            inits,
            layout,
        })
    }

    /// Total number of latent grid rows.
    pub fn n_rows(&self) -> usize {
        self.layout.iter().map(|l| l.n_steps).sum()
    }

    /// Layout entry owning global row `row`, with the local step index.
    pub fn locate_row(&self, row: usize) -> Option<(&TrackLayout, usize)> {
        self.layout
            .iter()
            .find(|l| l.rows().contains(&row))
            .map(|l| (l, row - l.first_row))
    }
}
