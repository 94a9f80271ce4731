use crate::params::{GeneralParams, PairParams, Phase};
use serde::{Deserialize, Serialize};

/// Phase-specific restraint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum RestraintKind {
    /// Alpha is learned by the engine; `a`, `tau` and `tolerance` steer the learning.
    Training {
        #[serde(rename = "A")]
        a: f64,
        tau: f64,
        tolerance: f64,
        num_samples: u32,
    },
    /// Alpha is fixed; the run continues until the restraint converges.
    Convergence { alpha: f64, tolerance: f64 },
    /// Alpha is fixed; the run continues until the end time.
    Production { alpha: f64 },
}

/// Restraint handed to the engine for one pair during one phase step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestraintConfig {
    pub name: String,
    pub sites: Vec<u32>,
    pub logging_filename: String,
    pub target: f64,
    pub sample_period: f64,
    #[serde(flatten)]
    pub kind: RestraintKind,
}

impl RestraintConfig {
    pub fn build(phase: Phase, general: &GeneralParams, name: &str, pair: &PairParams) -> Self {
        let kind = match phase {
            Phase::Training => RestraintKind::Training {
                a: general.a,
                tau: general.tau,
                tolerance: general.tolerance,
                num_samples: general.num_samples,
            },
            Phase::Convergence => RestraintKind::Convergence {
                alpha: pair.alpha(),
                tolerance: general.tolerance,
            },
            Phase::Production => RestraintKind::Production { alpha: pair.alpha() },
        };
        Self {
            name: name.to_string(),
            sites: pair.sites().to_vec(),
            logging_filename: pair.logging_filename().to_string(),
            target: pair.target(),
            sample_period: general.sample_period,
            kind,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.kind {
            RestraintKind::Training { .. } => Phase::Training,
            RestraintKind::Convergence { .. } => Phase::Convergence,
            RestraintKind::Production { .. } => Phase::Production,
        }
    }
}
