#![allow(dead_code)]

use brer::directory::CHECKPOINT_FILE;
use brer::engine::{PhaseOutcome, PhaseRequest, RestraintReport, SimulationEngine};
use brer::history::TargetSet;
use brer::pair_data::{MultiPair, PairRecord, Resampler};
use brer::params::Phase;
use brer::restraint::RestraintConfig;
use brer::run_config::{RunConfig, RunSettings};
use brer::BrerError;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

pub fn targets(items: &[(&str, f64)]) -> TargetSet {
    items.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

pub fn two_pairs() -> MultiPair {
    MultiPair::from_records(vec![
        PairRecord::new("A-B", vec![3673, 5636], vec![0.5, 0.5], vec![1.0, 1.5]),
        PairRecord::new("C-D", vec![102, 2170], vec![0.5, 0.5], vec![2.0, 2.5]),
    ])
    .unwrap()
}

pub fn settings(ensemble_dir: &Path) -> RunSettings {
    RunSettings {
        topology: ensemble_dir.join("syx.tpr"),
        ensemble_dir: ensemble_dir.to_path_buf(),
        ensemble_num: 1,
        work_sample: 1,
    }
}

/// Hands out a fixed sequence of target sets and remembers rejections.
#[derive(Default)]
pub struct ScriptedResampler {
    pub draws: VecDeque<TargetSet>,
    pub drawn: usize,
    pub rejected: Vec<TargetSet>,
}

impl ScriptedResampler {
    pub fn new(draws: Vec<TargetSet>) -> Self {
        Self {
            draws: draws.into(),
            ..Self::default()
        }
    }
}

impl Resampler for ScriptedResampler {
    fn draw_targets(&mut self) -> Result<TargetSet, BrerError> {
        self.drawn += 1;
        self.draws
            .pop_front()
            .ok_or_else(|| BrerError::Configuration("scripted targets exhausted".to_string()))
    }

    fn reject(&mut self, targets: &TargetSet) {
        self.rejected.push(targets.clone());
    }
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub phase: Phase,
    pub working_dir: PathBuf,
    pub restraints: Vec<RestraintConfig>,
    pub end_time: Option<f64>,
    pub resume: bool,
}

/// Engine stand-in: reports alpha = 10 + index of the restraint and echoes
/// the requested target. Optionally writes a checkpoint like a real run.
pub struct FakeEngine {
    pub requests: Vec<SeenRequest>,
    pub elapsed_time: f64,
    pub write_checkpoint: bool,
    pub fail: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
            elapsed_time: 1500.0,
            write_checkpoint: true,
            fail: false,
        }
    }

    pub fn without_checkpoints() -> Self {
        Self {
            write_checkpoint: false,
            ..Self::new()
        }
    }
}

impl SimulationEngine for FakeEngine {
    fn run_phase(&mut self, request: &PhaseRequest<'_>) -> Result<PhaseOutcome, BrerError> {
        self.requests.push(SeenRequest {
            phase: request.phase,
            working_dir: request.working_dir.to_path_buf(),
            restraints: request.restraints.to_vec(),
            end_time: request.end_time,
            resume: request.resume,
        });
        if self.fail {
            return Err(BrerError::Engine("simulated crash".to_string()));
        }
        if self.write_checkpoint {
            fs::write(request.working_dir.join(CHECKPOINT_FILE), request.phase.as_str())?;
        }
        let per_restraint = request
            .restraints
            .iter()
            .enumerate()
            .map(|(i, r)| RestraintReport {
                name: r.name.clone(),
                alpha: 10.0 + i as f64,
                target: r.target,
            })
            .collect();
        Ok(PhaseOutcome {
            per_restraint,
            elapsed_time: self.elapsed_time,
        })
    }
}

pub type TestConfig = RunConfig<FakeEngine, ScriptedResampler>;

pub fn config(dir: &Path, engine: FakeEngine, draws: Vec<TargetSet>) -> TestConfig {
    RunConfig::new(settings(dir), &two_pairs(), engine, ScriptedResampler::new(draws)).unwrap()
}

pub fn read_document(dir: &Path) -> serde_json::Value {
    let text = fs::read_to_string(dir.join("mem_1").join("state.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}
