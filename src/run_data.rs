use crate::fs_ops::write_json_atomic;
use crate::history::{HistoryLedger, TargetSet};
use crate::pair_data::{MultiPair, PairRecord};
use crate::params::{GeneralParam, GeneralParams, PairParam, PairParams, ParameterStore};
use crate::BrerError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

const GENERAL_KEY: &str = "general parameters";
const PAIR_KEY: &str = "pair parameters";
const HISTORY_KEY: &str = "history";

/// A single parameter update, addressed either to the general record or to a named pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    General(GeneralParam),
    Pair(String, PairParam),
}

/// All persisted metadata of one ensemble member: general parameters, one
/// record per restrained pair, and the training history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunData {
    #[serde(rename = "general parameters")]
    general: GeneralParams,
    #[serde(rename = "pair parameters")]
    pairs: BTreeMap<String, PairParams>,
    history: HistoryLedger,
}

impl RunData {
    /// Defaults for `ensemble_num`, with no pairs and an empty history.
    pub fn new(ensemble_num: u32) -> Self {
        Self {
            general: GeneralParams {
                ensemble_num,
                ..GeneralParams::default()
            },
            pairs: BTreeMap::new(),
            history: HistoryLedger::new(),
        }
    }

    /// Defaults plus one freshly created record per pair in `pairs`.
    pub fn initialize(ensemble_num: u32, pairs: &MultiPair) -> Result<Self, BrerError> {
        let mut data = Self::new(ensemble_num);
        for record in pairs.iter() {
            data.from_pair_data(record)?;
        }
        Ok(data)
    }

    /// Load the member document at `path` if one exists, otherwise create and
    /// write a virgin document. Returns the data and whether it was created.
    pub fn load_or_create(path: &Path, ensemble_num: u32, pairs: &MultiPair) -> Result<(Self, bool), BrerError> {
        if path.exists() {
            let data = Self::load(path)?;
            if data.general.ensemble_num != ensemble_num {
                return Err(BrerError::Configuration(format!(
                    "{} belongs to ensemble member {}, not {}",
                    path.display(),
                    data.general.ensemble_num,
                    ensemble_num
                )));
            }
            if !data.names().eq(pairs.names()) {
                warn!(
                    path = %path.display(),
                    "pair set in the state document differs from the pair metadata file; using the document"
                );
            }
            info!(path = %path.display(), iteration = data.general.iteration, phase = %data.general.phase, "resuming from state document");
            return Ok((data, false));
        }

        let data = Self::initialize(ensemble_num, pairs)?;
        data.save(path)?;
        info!(path = %path.display(), pairs = data.pairs.len(), "wrote initial state document");
        Ok((data, true))
    }

    /// Register a pair that has no persisted state yet.
    pub(crate) fn from_pair_data(&mut self, record: &PairRecord) -> Result<(), BrerError> {
        if self.pairs.contains_key(&record.name) {
            return Err(BrerError::Configuration(format!(
                "pair {} already has state; refusing to reset it",
                record.name
            )));
        }
        self.pairs
            .insert(record.name.clone(), PairParams::new(&record.name, record.sites.clone()));
        Ok(())
    }

    pub fn general(&self) -> &GeneralParams {
        &self.general
    }

    /// For string-keyed overrides through [`ParameterStore::set`].
    pub fn general_mut(&mut self) -> &mut GeneralParams {
        &mut self.general
    }

    pub fn pair(&self, name: &str) -> Result<&PairParams, BrerError> {
        self.pairs
            .get(name)
            .ok_or_else(|| BrerError::UnknownPair(name.to_string()))
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &PairParams)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Pair names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }

    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }

    pub fn set(&mut self, param: Param) -> Result<(), BrerError> {
        self.set_all([param])
    }

    /// Apply a batch of updates. Every pair name is checked before anything
    /// is written, so a bad batch leaves the data untouched.
    pub fn set_all<I>(&mut self, params: I) -> Result<(), BrerError>
    where
        I: IntoIterator<Item = Param>,
    {
        let params: Vec<Param> = params.into_iter().collect();
        for param in &params {
            if let Param::Pair(name, _) = param {
                self.pair(name)?;
            }
        }
        for param in params {
            match param {
                Param::General(p) => self.general.apply(p),
                Param::Pair(name, p) => {
                    if let Some(pair) = self.pairs.get_mut(&name) {
                        pair.apply(p);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn record_history(&mut self, alphas: &HashMap<String, f64>, targets: &TargetSet) -> Result<bool, BrerError> {
        self.history.record(alphas, targets)
    }

    pub fn merge_history(&mut self, other: &HistoryLedger) -> usize {
        self.history.merge(other)
    }

    pub fn as_dictionary(&self) -> Result<Value, BrerError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_dictionary(value: &Value) -> Result<Self, BrerError> {
        let doc = as_object(value, "state document")?;
        for key in doc.keys() {
            if ![GENERAL_KEY, PAIR_KEY, HISTORY_KEY].contains(&key.as_str()) {
                return Err(BrerError::UnknownKey(key.clone()));
            }
        }

        let general = GeneralParams::from_dictionary(as_object(section(doc, GENERAL_KEY)?, GENERAL_KEY)?)?;

        let mut pairs = BTreeMap::new();
        for (name, params) in as_object(section(doc, PAIR_KEY)?, PAIR_KEY)? {
            let params = PairParams::from_dictionary(as_object(params, name)?)?;
            pairs.insert(name.clone(), params);
        }

        let history = serde_json::from_value(section(doc, HISTORY_KEY)?.clone())?;

        Ok(Self { general, pairs, history })
    }

    pub fn save(&self, path: &Path) -> Result<(), BrerError> {
        write_json_atomic(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, BrerError> {
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        Self::from_dictionary(&value)
    }
}

fn section<'a>(doc: &'a Map<String, Value>, key: &str) -> Result<&'a Value, BrerError> {
    doc.get(key)
        .ok_or_else(|| BrerError::MissingValue(key.to_string()))
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, BrerError> {
    value
        .as_object()
        .ok_or_else(|| BrerError::Configuration(format!("{} must be a JSON object", what)))
}
