//! # Identifier normalization
//!
//! Downstream stages never see caller identifiers: every individual is given a
//! dense code `1..=k` in order of **first appearance** in the input table, and
//! its observations are grouped under that code (time-sorted, stable on ties).
//! [`IdMap`] keeps the bijection so results can be relabelled at the end.
//!
//! Invariants
//! -----------------
//! * `IdMap::original(IdMap::code_of(id)) == id` for every id of the table.
//! * `NormalizedTable::tracks()[c - 1].code == c`.
use crate::{
    bsam_errors::BsamError,
    constants::{FastHashMap, NormalizedId, TagId},
    observations::{Observation, ObservationTable},
};

/// Bijection between caller identifiers and dense codes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdMap {
    codes: FastHashMap<TagId, NormalizedId>,
    originals: Vec<TagId>,
}

/// Code given to the individual seen after `known` others.
fn next_code(known: usize) -> Result<NormalizedId, BsamError> {
    known
        .checked_add(1)
        .and_then(|n| NormalizedId::try_from(n).ok())
        .ok_or_else(|| {
            BsamError::InvalidParameter(format!(
                "too many individuals: at most {} can be fitted at once",
                NormalizedId::MAX
            ))
        })
}

impl IdMap {
    /// Return the code of `id`, assigning the next free one on first sight.
    fn intern(&mut self, id: &TagId) -> Result<NormalizedId, BsamError> {
        if let Some(code) = self.codes.get(id) {
            return Ok(*code);
        }
        let code = next_code(self.originals.len())?;
        self.originals.push(id.clone());
        self.codes.insert(id.clone(), code);
        Ok(code)
    }

    pub fn code_of(&self, id: &TagId) -> Option<NormalizedId> {
        self.codes.get(id).copied()
    }

    pub fn original(&self, code: NormalizedId) -> Option<&TagId> {
        (code as usize)
            .checked_sub(1)
            .and_then(|i| self.originals.get(i))
    }

    /// Original identifier of `code`, falling back to the code itself when unknown.
    pub fn relabel(&self, code: NormalizedId) -> TagId {
        self.original(code)
            .cloned()
            .unwrap_or_else(|| TagId::from(code))
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    /// `(code, original)` pairs in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (NormalizedId, &TagId)> {
        self.originals
            .iter()
            .enumerate()
            .map(|(i, id)| (i as NormalizedId + 1, id))
    }
}

/// Observations of one individual under its normalized code.
#[derive(Debug, Clone, PartialEq)]
pub struct IndividualTrack {
    pub code: NormalizedId,
    pub observations: Vec<Observation>,
}

/// Input table regrouped per individual, in first-appearance order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    ids: IdMap,
    tracks: Vec<IndividualTrack>,
}

impl NormalizedTable {
    pub fn ids(&self) -> &IdMap {
        &self.ids
    }

    pub fn tracks(&self) -> &[IndividualTrack] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Replace caller identifiers by dense codes and group observations per individual.
///
/// Arguments
/// -----------------
/// * `table`: raw observations in input order.
///
/// Return
/// ----------
/// * The grouped table, or [`BsamError::EmptyTable`] when there is nothing to fit.
pub fn normalize(table: &ObservationTable) -> Result<NormalizedTable, BsamError> {
    if table.is_empty() {
        return Err(BsamError::EmptyTable);
    }

    let mut ids = IdMap::default();
    let mut tracks: Vec<IndividualTrack> = Vec::new();

    for obs in table {
        let code = ids.intern(&obs.id)?;
        if code as usize > tracks.len() {
            tracks.push(IndividualTrack {
                code,
                observations: Vec::new(),
            });
        }
        tracks[code as usize - 1].observations.push(obs.clone());
    }

    for track in &mut tracks {
        // stable: simultaneous fixes keep their input order
        track
            .observations
            .sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    Ok(NormalizedTable { ids, tracks })
}

#[cfg(test)]
mod normalize_test {
    use super::*;
    use crate::observations::LocationClass;

    fn obs(id: &str, time: f64) -> Observation {
        Observation::new(id.parse::<TagId>().unwrap(), time, LocationClass::A, 0.0, 0.0)
    }

    #[test]
    fn test_first_appearance_codes() {
        let table: ObservationTable = vec![
            obs("zeta", 3.0),
            obs("17", 1.0),
            obs("zeta", 1.0),
            obs("alpha", 0.0),
            obs("17", 2.0),
        ]
        .into();

        let normalized = normalize(&table).unwrap();
        let ids = normalized.ids();

        assert_eq!(ids.len(), 3);
        assert_eq!(ids.code_of(&"zeta".into()), Some(1));
        assert_eq!(ids.code_of(&TagId::Int(17)), Some(2));
        assert_eq!(ids.code_of(&"alpha".into()), Some(3));

        let codes: Vec<_> = normalized.tracks().iter().map(|t| t.code).collect();
        assert_eq!(codes, vec![1, 2, 3]);

        let zeta_times: Vec<_> = normalized.tracks()[0]
            .observations
            .iter()
            .map(|o| o.time)
            .collect();
        assert_eq!(zeta_times, vec![1.0, 3.0]);
    }

    #[test]
    fn test_relabel_inverts_codes() {
        let table: ObservationTable = ["b", "a", "007", "12", "a", "b"]
            .iter()
            .enumerate()
            .map(|(i, id)| obs(id, i as f64))
            .collect();

        let normalized = normalize(&table).unwrap();
        for row in table.iter() {
            let code = normalized.ids().code_of(&row.id).unwrap();
            assert_eq!(normalized.ids().relabel(code), row.id);
        }

        let codes: Vec<_> = normalized.ids().iter().map(|(c, _)| c).collect();
        assert_eq!(codes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(
            normalize(&ObservationTable::new()),
            Err(BsamError::EmptyTable)
        );
    }

    #[test]
    fn test_code_space_is_bounded() {
        assert_eq!(next_code(0), Ok(1));
        assert_eq!(next_code(41), Ok(42));
        let last = NormalizedId::MAX as usize - 1;
        assert_eq!(next_code(last), Ok(NormalizedId::MAX));
        assert!(matches!(
            next_code(last + 1),
            Err(BsamError::InvalidParameter(_))
        ));
        assert!(matches!(
            next_code(usize::MAX),
            Err(BsamError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_unknown_code() {
        let normalized = normalize(&vec![obs("a", 0.0)].into()).unwrap();
        assert_eq!(normalized.ids().original(0), None);
        assert_eq!(normalized.ids().original(2), None);
        assert_eq!(normalized.ids().relabel(9), TagId::Int(9));
    }
}
