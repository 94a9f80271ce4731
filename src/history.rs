use crate::fs_ops::FileLock;
use crate::BrerError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::warn;

/// Target distance per pair name, as drawn for one training phase.
pub type TargetSet = HashMap<String, f64>;

/// Canonical key for a target set: values ordered by pair name, comma separated.
pub fn signature(targets: &TargetSet) -> String {
    targets
        .iter()
        .sorted_by(|a, b| a.0.cmp(b.0))
        .map(|(_, value)| format_value(*value))
        .join(",")
}

/// Shortest round-trip form of `value` as the ensemble's history files spell it:
/// `1.0` keeps its fractional part, and values below `1e-4` or from `1e16` up
/// use a signed two-digit exponent (`1e-05`, `1.5e+16`).
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let repr = format!("{:?}", value);
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => repr,
    }
}

/// Append-only record of every trained target set and the alphas it produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLedger {
    entries: BTreeMap<String, Vec<f64>>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, targets: &TargetSet) -> bool {
        self.entries.contains_key(&signature(targets))
    }

    pub fn contains_signature(&self, signature: &str) -> bool {
        self.entries.contains_key(signature)
    }

    pub fn get(&self, signature: &str) -> Option<&[f64]> {
        self.entries.get(signature).map(Vec::as_slice)
    }

    /// Record the alphas trained for `targets`, ordered by pair name.
    ///
    /// Returns `Ok(false)` without touching the ledger if the signature is
    /// already present.
    pub fn record(&mut self, alphas: &HashMap<String, f64>, targets: &TargetSet) -> Result<bool, BrerError> {
        let key = signature(targets);
        if self.entries.contains_key(&key) {
            warn!(signature = %key, "targets already stored in history, keeping the existing entry");
            return Ok(false);
        }

        let sorted_alphas = targets
            .keys()
            .sorted()
            .map(|name| {
                alphas
                    .get(name)
                    .copied()
                    .ok_or_else(|| BrerError::MissingValue(format!("alpha for pair {}", name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.entries.insert(key, sorted_alphas);
        Ok(true)
    }

    /// Copy in every entry of `other` whose signature is not yet recorded.
    /// Returns the number of entries added.
    pub fn merge(&mut self, other: &HistoryLedger) -> usize {
        let mut added = 0;
        for (key, alphas) in &other.entries {
            if !self.entries.contains_key(key) {
                self.entries.insert(key.clone(), alphas.clone());
                added += 1;
            }
        }
        added
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a standalone history file (the ensemble-wide `history.json`).
    /// A missing file is an empty ledger.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BrerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), BrerError> {
        crate::fs_ops::write_json_atomic(path.as_ref(), self)
    }

    /// Fold this ledger into the shared history file at `path`.
    ///
    /// Load, merge and save run under an exclusive lock so concurrent members
    /// never drop each other's entries. Returns the number of entries added.
    pub fn merge_into_file<P: AsRef<Path>>(&self, path: P) -> Result<usize, BrerError> {
        let path = path.as_ref();
        let _lock = FileLock::acquire(path)?;
        let mut shared = Self::load(path)?;
        let added = shared.merge(self);
        if added > 0 || !path.exists() {
            shared.save(path)?;
        }
        Ok(added)
    }
}
