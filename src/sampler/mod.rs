//! # Sampler abstraction
//!
//! The movement models are fitted by an **external Gibbs sampler**. This module
//! defines the seam between the fitting pipeline and that engine:
//!
//! * [`Sampler`] – run one model on one [`SamplerData`] bundle and return the
//!   posterior draws of the monitored nodes.
//! * [`RunConfig`] – adaptation/sampling/thinning schedule, chain count, seed and
//!   wall-clock budget.
//! * [`PosteriorDraws`] – draws per chain, keyed by [`NodeKey`].
//!
//! Implementations
//! -----------------
//! * [`jags::JagsSampler`] – drives a JAGS installation through its command-line
//!   interface in a temporary working directory.
//!
//! Any other engine (or a deterministic test double) can be plugged in by
//! implementing [`Sampler`]; the pipeline never depends on a concrete engine.
pub mod coda;
pub mod jags;
pub mod rdump;

use std::{fmt, str::FromStr, time::Duration};

use itertools::Itertools;
use smallvec::SmallVec;

use crate::{bsam_errors::SamplerError, constants::FastHashMap, prepare::bundle::SamplerData};

/// Sampling schedule of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunConfig {
    /// Adaptation (burn-in) iterations, discarded
    pub adapt: usize,
    /// Post-adaptation iterations per chain
    pub samples: usize,
    /// Keep every `thin`-th draw
    pub thin: usize,
    /// Number of independent chains
    pub chains: usize,
    /// Base seed, chain `k` uses `seed + k`
    pub seed: Option<u64>,
    /// Wall-clock limit of the run
    pub timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            adapt: 10_000,
            samples: 5_000,
            thin: 5,
            chains: 2,
            seed: None,
            timeout: None,
        }
    }
}

impl RunConfig {
    /// Number of retained draws per chain.
    pub fn retained(&self) -> usize {
        self.samples / self.thin.max(1)
    }
}

/// Name and (1-based) indices of a monitored scalar node, e.g. `x[12,2]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub name: String,
    pub index: SmallVec<[usize; 2]>,
}

impl NodeKey {
    pub fn scalar(name: impl Into<String>) -> Self {
        NodeKey {
            name: name.into(),
            index: SmallVec::new(),
        }
    }

    pub fn indexed(name: impl Into<String>, index: &[usize]) -> Self {
        NodeKey {
            name: name.into(),
            index: SmallVec::from_slice(index),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.index.iter().join(","))
        }
    }
}

impl FromStr for NodeKey {
    type Err = SamplerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        coda::parse_node_key(s)
    }
}

/// Draws of one chain.
pub type ChainDraws = FastHashMap<NodeKey, Vec<f64>>;

/// Posterior draws of every monitored node, per chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PosteriorDraws {
    chains: Vec<ChainDraws>,
}

impl PosteriorDraws {
    pub fn new(chains: Vec<ChainDraws>) -> Self {
        PosteriorDraws { chains }
    }

    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn chains(&self) -> &[ChainDraws] {
        &self.chains
    }

    /// Every node present in the first chain, sorted.
    pub fn nodes(&self) -> Vec<&NodeKey> {
        self.chains
            .first()
            .map(|chain| chain.keys().sorted().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        !self.chains.is_empty() && self.chains.iter().all(|c| c.contains_key(key))
    }

    /// Draws of `key` from every chain, concatenated in chain order.
    pub fn pooled(&self, key: &NodeKey) -> Option<Vec<f64>> {
        let mut pooled = Vec::new();
        for chain in &self.chains {
            pooled.extend_from_slice(chain.get(key)?);
        }
        (!self.chains.is_empty()).then_some(pooled)
    }

    /// Total number of pooled draws per node.
    pub fn n_draws(&self) -> usize {
        self.chains
            .iter()
            .map(|c| c.values().next().map_or(0, Vec::len))
            .sum()
    }

    /// Check that every node of `names` was returned (at least one entry per name).
    pub fn require(&self, names: &[&str]) -> Result<(), SamplerError> {
        for name in names {
            let present = self
                .chains
                .first()
                .is_some_and(|c| c.keys().any(|k| k.name == *name));
            if !present {
                return Err(SamplerError::MissingNode(name.to_string()));
            }
        }
        Ok(())
    }
}

/// External engine able to draw from the posterior of a model.
///
/// Implementations must be usable from several worker threads at once: the
/// single-series orchestrator runs one sampler call per individual in parallel.
pub trait Sampler: Send + Sync {
    /// Run the model carried by `data` and return the draws of its monitored nodes
    /// ([`crate::model::ModelKind::monitored_nodes`]).
    fn run(&self, data: &SamplerData, config: &RunConfig) -> Result<PosteriorDraws, SamplerError>;
}
