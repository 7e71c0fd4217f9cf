#![allow(dead_code)]

use std::{sync::Mutex, thread, time::Duration};

use approx::assert_relative_eq;
use bsam::{
    constants::{FastHashMap, NormalizedId},
    fit::StepSummary,
    model::ModelKind,
    prepare::bundle::{DataValue, SamplerData},
    sampler::{ChainDraws, NodeKey, PosteriorDraws, RunConfig, Sampler},
    LocationClass, Observation, ObservationTable, SamplerError,
};

/// Offsets added to the initial location in each retained draw.
const X_JITTER: [f64; 3] = [-0.01, 0.0, 0.01];

/// Deterministic stand-in for the external engine.
///
/// Latent locations are drawn around their initial values, behavioural states
/// alternate 1/2 along the stacked rows and every parameter gets fixed draws.
#[derive(Default)]
pub struct MockSampler {
    /// Runs touching one of these codes fail
    pub fail_codes: Vec<NormalizedId>,
    /// Runs touching one of these codes sleep first
    pub delays: Vec<(NormalizedId, Duration)>,
    /// `(model, codes)` of every run, in call order
    pub calls: Mutex<Vec<(ModelKind, Vec<NormalizedId>)>>,
    /// Codes of every run, in completion order
    pub finished: Mutex<Vec<Vec<NormalizedId>>>,
}

impl MockSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(codes: &[NormalizedId]) -> Self {
        MockSampler {
            fail_codes: codes.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_delays(delays: &[(NormalizedId, Duration)]) -> Self {
        MockSampler {
            delays: delays.to_vec(),
            ..Self::default()
        }
    }

    pub fn finish_order(&self) -> Vec<Vec<NormalizedId>> {
        self.finished.lock().unwrap().clone()
    }

    pub fn n_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn called_codes(&self) -> Vec<Vec<NormalizedId>> {
        let mut codes: Vec<_> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect();
        codes.sort();
        codes
    }
}

fn init_locations(data: &SamplerData) -> Vec<(f64, f64)> {
    match &data.inits["x"] {
        DataValue::Matrix { values, .. } => values.chunks(2).map(|c| (c[0], c[1])).collect(),
        other => panic!("unexpected x inits: {other:?}"),
    }
}

fn chain_draws(data: &SamplerData) -> ChainDraws {
    let mut chain: ChainDraws = FastHashMap::default();

    for (i, (lon, lat)) in init_locations(data).into_iter().enumerate() {
        let r = i + 1;
        chain.insert(
            NodeKey::indexed("x", &[r, 1]),
            X_JITTER.iter().map(|d| lon + d).collect(),
        );
        chain.insert(
            NodeKey::indexed("x", &[r, 2]),
            X_JITTER.iter().map(|d| lat + d).collect(),
        );
        if data.model.is_switching() {
            let state = if r % 2 == 1 { 1.0 } else { 2.0 };
            chain.insert(NodeKey::indexed("b", &[r]), vec![state; X_JITTER.len()]);
        }
    }

    for (name, value) in [("psi", 1.2), ("gamma", 0.8), ("theta", 0.1)] {
        chain.insert(NodeKey::scalar(name), vec![value; X_JITTER.len()]);
    }
    for (i, j) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
        let value = if i == j { 0.5 } else { 0.0 };
        chain.insert(NodeKey::indexed("Sigma", &[i, j]), vec![value; X_JITTER.len()]);
    }
    if data.model.is_switching() {
        for k in [1, 2] {
            chain.insert(NodeKey::indexed("alpha", &[k]), vec![0.7; X_JITTER.len()]);
        }
    }
    chain
}

impl Sampler for MockSampler {
    fn run(&self, data: &SamplerData, config: &RunConfig) -> Result<PosteriorDraws, SamplerError> {
        let codes: Vec<NormalizedId> = data.layout.iter().map(|l| l.code).collect();
        self.calls.lock().unwrap().push((data.model, codes.clone()));

        let delay = self
            .delays
            .iter()
            .filter(|(c, _)| codes.contains(c))
            .map(|(_, d)| *d)
            .max();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        self.finished.lock().unwrap().push(codes.clone());

        if codes.iter().any(|c| self.fail_codes.contains(c)) {
            return Err(SamplerError::Failed {
                status: "exit status: 1".into(),
                diagnostics: "RUNTIME ERROR: Invalid parent values".into(),
            });
        }

        let chain = chain_draws(data);
        Ok(PosteriorDraws::new(vec![chain; config.chains]))
    }
}

/// Regular track of `n` Argos fixes, 6 hours apart, drifting east.
pub fn track(id: &str, start: f64, n: usize) -> Vec<Observation> {
    let classes = [
        LocationClass::Three,
        LocationClass::A,
        LocationClass::B,
        LocationClass::One,
        LocationClass::Z,
    ];
    (0..n)
        .map(|i| {
            Observation::new(
                id.parse::<bsam::constants::TagId>().unwrap(),
                start + 0.25 * i as f64,
                classes[i % classes.len()],
                -63.0 + 0.05 * i as f64,
                44.0 + 0.01 * i as f64,
            )
        })
        .collect()
}

/// Rows of several individuals, interleaved in time like a real deployment export.
pub fn table(tracks: Vec<Vec<Observation>>) -> ObservationTable {
    let mut rows: Vec<Observation> = tracks.into_iter().flatten().collect();
    rows.sort_by(|a, b| a.time.total_cmp(&b.time));
    rows.into()
}

pub fn assert_step_close<I>(step: &StepSummary<I>, lon: f64, lat: f64, epsilon: f64) {
    assert_relative_eq!(step.lon, lon, epsilon = epsilon);
    assert_relative_eq!(step.lat, lat, epsilon = epsilon);
    assert_relative_eq!(step.lon_median, lon, epsilon = epsilon);
    assert_relative_eq!(step.lat_median, lat, epsilon = epsilon);
}
