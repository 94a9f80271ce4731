use crate::history::{signature, TargetSet};
use crate::BrerError;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Static metadata for one restrained pair, as listed in `pair_data.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct PairRecord {
    pub name: String,
    pub sites: Vec<u32>,
    /// Weight of each entry in `bins`.
    pub distribution: Vec<f64>,
    /// Candidate target distances.
    pub bins: Vec<f64>,
}

impl PairRecord {
    pub fn new(name: &str, sites: Vec<u32>, distribution: Vec<f64>, bins: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            sites,
            distribution,
            bins,
        }
    }

    fn validate(&self) -> Result<(), BrerError> {
        if self.bins.is_empty() {
            return Err(BrerError::Configuration(format!("pair {} has no bins", self.name)));
        }
        if self.bins.len() != self.distribution.len() {
            return Err(BrerError::Configuration(format!(
                "pair {} has {} bins but {} distribution weights",
                self.name,
                self.bins.len(),
                self.distribution.len()
            )));
        }
        if self.distribution.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(BrerError::Configuration(format!("pair {} has an invalid weight", self.name)));
        }
        if !self.distribution.iter().any(|w| *w > 0.0) {
            return Err(BrerError::Configuration(format!("pair {} has no positive weight", self.name)));
        }
        Ok(())
    }

    /// Distinct targets this pair can actually be assigned.
    fn reachable_targets(&self) -> usize {
        let mut seen: Vec<f64> = Vec::new();
        for (bin, weight) in self.bins.iter().zip(&self.distribution) {
            if *weight > 0.0 && !seen.contains(bin) {
                seen.push(*bin);
            }
        }
        seen.len()
    }
}

#[derive(Deserialize)]
struct PairEntry {
    sites: Vec<u32>,
    distribution: Vec<f64>,
    bins: Vec<f64>,
}

/// Every restrained pair of the system, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MultiPair {
    pairs: BTreeMap<String, PairRecord>,
}

impl MultiPair {
    pub fn from_records(records: Vec<PairRecord>) -> Result<Self, BrerError> {
        let mut pairs = BTreeMap::new();
        for record in records {
            record.validate()?;
            if pairs.contains_key(&record.name) {
                return Err(BrerError::Configuration(format!("duplicate pair name {}", record.name)));
            }
            pairs.insert(record.name.clone(), record);
        }
        Ok(Self { pairs })
    }

    /// Read `{"<name>": {"sites": [...], "distribution": [...], "bins": [...]}, ...}`.
    pub fn read_from_json<P: AsRef<Path>>(path: P) -> Result<Self, BrerError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let entries: BTreeMap<String, PairEntry> = serde_json::from_str(&text)?;
        let records = entries
            .into_iter()
            .map(|(name, entry)| PairRecord {
                name,
                sites: entry.sites,
                distribution: entry.distribution,
                bins: entry.bins,
            })
            .collect();
        Self::from_records(records)
    }

    pub fn get(&self, name: &str) -> Option<&PairRecord> {
        self.pairs.get(name)
    }

    /// Records in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = &PairRecord> {
        self.pairs.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Source of candidate training targets.
pub trait Resampler {
    fn draw_targets(&mut self) -> Result<TargetSet, BrerError>;

    /// The last draw was already trained. Implementations with a finite
    /// target space should stop proposing it.
    fn reject(&mut self, _targets: &TargetSet) {}
}

struct PairSampler {
    name: String,
    bins: Vec<f64>,
    weights: WeightedIndex<f64>,
}

/// Draws each pair's target from its binned distribution.
///
/// Rejected target sets are never proposed again. Once every reachable
/// combination has been rejected, drawing fails.
pub struct DistributionResampler {
    samplers: Vec<PairSampler>,
    rng: StdRng,
    rejected: FxHashSet<String>,
    space_size: usize,
}

impl DistributionResampler {
    pub fn new(pairs: &MultiPair, seed: Option<u64>) -> Result<Self, BrerError> {
        if pairs.is_empty() {
            return Err(BrerError::Configuration("no pairs to sample targets for".to_string()));
        }
        let mut samplers = Vec::with_capacity(pairs.len());
        let mut space_size: usize = 1;
        for record in pairs.iter() {
            let weights = WeightedIndex::new(&record.distribution)
                .map_err(|e| BrerError::Configuration(format!("pair {}: {}", record.name, e)))?;
            space_size = space_size.saturating_mul(record.reachable_targets());
            samplers.push(PairSampler {
                name: record.name.clone(),
                bins: record.bins.clone(),
                weights,
            });
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            samplers,
            rng,
            rejected: FxHashSet::default(),
            space_size,
        })
    }

    /// Number of distinct target sets this resampler can produce.
    pub fn space_size(&self) -> usize {
        self.space_size
    }

    fn sample(&mut self) -> TargetSet {
        self.samplers
            .iter()
            .map(|s| (s.name.clone(), s.bins[s.weights.sample(&mut self.rng)]))
            .collect()
    }
}

impl Resampler for DistributionResampler {
    fn draw_targets(&mut self) -> Result<TargetSet, BrerError> {
        if self.rejected.len() >= self.space_size {
            return Err(BrerError::Configuration(format!(
                "target space exhausted: all {} target sets have been trained",
                self.space_size
            )));
        }
        loop {
            let candidate = self.sample();
            if !self.rejected.contains(&signature(&candidate)) {
                return Ok(candidate);
            }
        }
    }

    fn reject(&mut self, targets: &TargetSet) {
        let key = signature(targets);
        debug!(signature = %key, "rejecting previously trained targets");
        self.rejected.insert(key);
    }
}
