use crate::BrerError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Stage of a BRER iteration. Phases cycle training -> convergence -> production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Training,
    Convergence,
    Production,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::Training => Phase::Convergence,
            Phase::Convergence => Phase::Production,
            Phase::Production => Phase::Training,
        }
    }

    /// Convergence and production runs are replicated per work sample.
    pub fn requires_work_sample(self) -> bool {
        !matches!(self, Phase::Training)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Training => "training",
            Phase::Convergence => "convergence",
            Phase::Production => "production",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = BrerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "training" => Ok(Phase::Training),
            "convergence" => Ok(Phase::Convergence),
            "production" => Ok(Phase::Production),
            other => Err(BrerError::Configuration(format!("unknown phase '{}'", other))),
        }
    }
}

/// Key/value view over a typed parameter record.
///
/// The legal key set is fixed by `REQUIREMENTS`. Bulk loads reject keys outside
/// that set and report the first required key that is absent.
pub trait ParameterStore: Sized + Serialize + DeserializeOwned {
    const REQUIREMENTS: &'static [&'static str];

    /// Keys that may be loaded but never changed through `set`.
    const FIXED: &'static [&'static str] = &[];

    fn as_dictionary(&self) -> Result<Map<String, Value>, BrerError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(BrerError::Other(format!("parameter record serialized to {}", other))),
        }
    }

    fn from_dictionary(map: &Map<String, Value>) -> Result<Self, BrerError> {
        for key in map.keys() {
            if !Self::REQUIREMENTS.contains(&key.as_str()) {
                return Err(BrerError::UnknownKey(key.clone()));
            }
        }
        for key in Self::REQUIREMENTS {
            if !map.contains_key(*key) {
                return Err(BrerError::MissingValue((*key).to_string()));
            }
        }
        Ok(serde_json::from_value(Value::Object(map.clone()))?)
    }

    fn get(&self, key: &str) -> Result<Value, BrerError> {
        if !Self::REQUIREMENTS.contains(&key) {
            return Err(BrerError::UnknownKey(key.to_string()));
        }
        self.as_dictionary()?
            .remove(key)
            .ok_or_else(|| BrerError::MissingValue(key.to_string()))
    }

    /// Replace one value; the record is revalidated as a whole.
    fn set(&mut self, key: &str, value: Value) -> Result<(), BrerError> {
        if !Self::REQUIREMENTS.contains(&key) {
            return Err(BrerError::UnknownKey(key.to_string()));
        }
        if Self::FIXED.contains(&key) {
            return Err(BrerError::Configuration(format!("{} cannot be changed once the record exists", key)));
        }
        let mut map = self.as_dictionary()?;
        map.insert(key.to_string(), value);
        *self = Self::from_dictionary(&map)?;
        Ok(())
    }

    /// Parse `raw` as JSON, falling back to a plain string (`phase=training`).
    fn set_parsed(&mut self, key: &str, raw: &str) -> Result<(), BrerError> {
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        self.set(key, value)
    }
}

/// Parameters shared by every restraint of one ensemble member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralParams {
    pub ensemble_num: u32,
    pub iteration: u32,
    pub phase: Phase,
    pub start_time: f64,
    #[serde(rename = "A")]
    pub a: f64,
    pub tau: f64,
    pub tolerance: f64,
    pub num_samples: u32,
    pub sample_period: f64,
    pub production_time: f64,
}

impl Default for GeneralParams {
    fn default() -> Self {
        Self {
            ensemble_num: 1,
            iteration: 0,
            phase: Phase::Training,
            start_time: 0.0,
            a: 50.0,
            tau: 50.0,
            tolerance: 0.25,
            num_samples: 50,
            sample_period: 100.0,
            production_time: 10_000.0,
        }
    }
}

impl ParameterStore for GeneralParams {
    const REQUIREMENTS: &'static [&'static str] = &[
        "ensemble_num",
        "iteration",
        "phase",
        "start_time",
        "A",
        "tau",
        "tolerance",
        "num_samples",
        "sample_period",
        "production_time",
    ];
    /// The member's identity; it names the directory the document lives in.
    const FIXED: &'static [&'static str] = &["ensemble_num"];
}

/// Typed update of a single general parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeneralParam {
    Iteration(u32),
    Phase(Phase),
    StartTime(f64),
    A(f64),
    Tau(f64),
    Tolerance(f64),
    NumSamples(u32),
    SamplePeriod(f64),
    ProductionTime(f64),
}

impl GeneralParams {
    pub fn apply(&mut self, param: GeneralParam) {
        match param {
            GeneralParam::Iteration(v) => self.iteration = v,
            GeneralParam::Phase(v) => self.phase = v,
            GeneralParam::StartTime(v) => self.start_time = v,
            GeneralParam::A(v) => self.a = v,
            GeneralParam::Tau(v) => self.tau = v,
            GeneralParam::Tolerance(v) => self.tolerance = v,
            GeneralParam::NumSamples(v) => self.num_samples = v,
            GeneralParam::SamplePeriod(v) => self.sample_period = v,
            GeneralParam::ProductionTime(v) => self.production_time = v,
        }
    }
}

/// Parameters unique to one restrained pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PairParams {
    sites: Vec<u32>,
    logging_filename: String,
    alpha: f64,
    target: f64,
}

impl ParameterStore for PairParams {
    const REQUIREMENTS: &'static [&'static str] = &["sites", "logging_filename", "alpha", "target"];
    const FIXED: &'static [&'static str] = &["sites", "logging_filename"];
}

/// Typed update of a mutable pair parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairParam {
    Alpha(f64),
    Target(f64),
}

impl PairParams {
    pub const DEFAULT_ALPHA: f64 = 0.0;
    pub const DEFAULT_TARGET: f64 = 3.0;

    /// New pair with its sites loaded and alpha/target at their defaults.
    pub fn new(name: &str, sites: Vec<u32>) -> Self {
        Self {
            sites,
            logging_filename: Self::logging_filename_for(name),
            alpha: Self::DEFAULT_ALPHA,
            target: Self::DEFAULT_TARGET,
        }
    }

    pub fn logging_filename_for(name: &str) -> String {
        format!("{}.log", name)
    }

    pub fn sites(&self) -> &[u32] {
        &self.sites
    }

    pub fn logging_filename(&self) -> &str {
        &self.logging_filename
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn apply(&mut self, param: PairParam) {
        match param {
            PairParam::Alpha(v) => self.alpha = v,
            PairParam::Target(v) => self.target = v,
        }
    }
}
