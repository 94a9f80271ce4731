//! Phase state machine for a single ensemble member.
//!
//! Each call to [`RunConfig::run`] performs exactly one phase step:
//! training -> convergence -> production -> training (next iteration).
//! The state document is rewritten after every step, so a crashed member
//! resumes by calling `run` again.

use crate::directory::{self, checkpoint_path};
use crate::engine::{PhaseOutcome, PhaseRequest, SimulationEngine};
use crate::fs_ops::{CheckpointRelocator, DirectoryMaterializer, LocalFs};
use crate::history::{signature, HistoryLedger};
use crate::pair_data::{MultiPair, Resampler};
use crate::params::{GeneralParam, GeneralParams, PairParam, ParameterStore, Phase};
use crate::restraint::RestraintConfig;
use crate::run_data::{Param, RunData};
use crate::BrerError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn, Span};

/// Where a member lives and what it simulates.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Engine input (a `.tpr` run input file).
    pub topology: PathBuf,
    /// Top directory holding every ensemble member.
    pub ensemble_dir: PathBuf,
    pub ensemble_num: u32,
    /// Replicate index used by convergence and production.
    pub work_sample: u32,
}

pub struct RunConfig<E, R, F = LocalFs> {
    settings: RunSettings,
    state_path: PathBuf,
    run_data: RunData,
    engine: E,
    resampler: R,
    fs: F,
    span: Span,
}

impl<E, R> RunConfig<E, R, LocalFs>
where
    E: SimulationEngine,
    R: Resampler,
{
    pub fn new(settings: RunSettings, pairs: &MultiPair, engine: E, resampler: R) -> Result<Self, BrerError> {
        Self::with_fs(settings, pairs, engine, resampler, LocalFs)
    }
}

impl<E, R, F> RunConfig<E, R, F>
where
    E: SimulationEngine,
    R: Resampler,
    F: CheckpointRelocator + DirectoryMaterializer,
{
    /// Load the member's state document, or write a fresh one from `pairs`.
    pub fn with_fs(settings: RunSettings, pairs: &MultiPair, engine: E, resampler: R, fs: F) -> Result<Self, BrerError> {
        let member_dir = directory::member_dir(&settings.ensemble_dir, settings.ensemble_num);
        directory::materialize(&fs, &member_dir)?;

        let state_path = directory::state_path(&settings.ensemble_dir, settings.ensemble_num);
        let (run_data, _) = RunData::load_or_create(&state_path, settings.ensemble_num, pairs)?;
        let span = info_span!("brer", member = settings.ensemble_num);

        {
            let _entered = span.enter();
            info!(names = ?run_data.names().collect::<Vec<_>>(), "initialized run configuration");
        }

        Ok(Self {
            settings,
            state_path,
            run_data,
            engine,
            resampler,
            fs,
            span,
        })
    }

    /// Emit this member's events inside `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn run_data(&self) -> &RunData {
        &self.run_data
    }

    pub fn history(&self) -> &HistoryLedger {
        self.run_data.history()
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn resampler(&self) -> &R {
        &self.resampler
    }

    /// Apply `KEY=VALUE` style general parameter overrides and persist them.
    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) -> Result<(), BrerError> {
        if overrides.is_empty() {
            return Ok(());
        }
        let mut staged = self.run_data.clone();
        for (key, value) in overrides {
            staged.general_mut().set_parsed(key, value)?;
        }
        staged.save(&self.state_path)?;
        self.run_data = staged;
        Ok(())
    }

    /// Fold externally recorded history (e.g. other members') into this member's ledger.
    pub fn merge_history(&mut self, other: &HistoryLedger) -> Result<usize, BrerError> {
        let mut staged = self.run_data.clone();
        let added = staged.merge_history(other);
        if added > 0 {
            staged.save(&self.state_path)?;
            self.run_data = staged;
        }
        Ok(added)
    }

    /// Working directory of the current phase step.
    pub fn working_dir(&self) -> Result<PathBuf, BrerError> {
        let general = self.run_data.general();
        directory::resolve(
            &self.settings.ensemble_dir,
            general.ensemble_num,
            general.iteration,
            general.phase,
            Some(self.settings.work_sample),
        )
    }

    /// Run one phase step and advance to the next phase. Returns the new phase.
    pub fn run(&mut self) -> Result<Phase, BrerError> {
        let span = self.span.clone();
        let _entered = span.enter();

        let mut staged = self.run_data.clone();
        let phase = staged.general().phase;
        let working_dir = self.working_dir()?;
        directory::materialize(&self.fs, &working_dir)?;
        info!(iteration = staged.general().iteration, phase = %phase, dir = %working_dir.display(), "starting phase step");

        match phase {
            Phase::Training => self.train(&mut staged, &working_dir)?,
            Phase::Convergence => self.converge(&mut staged, &working_dir)?,
            Phase::Production => self.produce(&mut staged, &working_dir)?,
        }

        let next = advance(&mut staged)?;
        staged.save(&self.state_path)?;
        self.run_data = staged;
        info!(phase = %next, iteration = self.run_data.general().iteration, "phase step complete");
        Ok(next)
    }

    fn train(&mut self, staged: &mut RunData, working_dir: &Path) -> Result<(), BrerError> {
        reject_cross_iteration_carry(staged.general())?;

        // A checkpoint here comes from an interrupted draw with different targets
        let cpt = checkpoint_path(working_dir);
        if cpt.exists() {
            let backup = self.fs.backup(&cpt)?;
            warn!(backup = %backup.display(), "found a checkpoint while training; backed it up and starting over with new targets");
        }

        let mut targets = self.resampler.draw_targets()?;
        while staged.history().contains(&targets) {
            debug!(signature = %signature(&targets), "targets already trained, redrawing");
            self.resampler.reject(&targets);
            targets = self.resampler.draw_targets()?;
        }
        info!(signature = %signature(&targets), "new targets");

        let mut updates = Vec::with_capacity(targets.len());
        for (name, target) in &targets {
            updates.push(Param::Pair(name.clone(), PairParam::Target(*target)));
        }
        staged.set_all(updates)?;
        staged.save(&self.state_path)?;
        self.run_data = staged.clone();

        let outcome = self.delegate(staged, working_dir, None, false)?;

        let mut alphas = HashMap::with_capacity(outcome.per_restraint.len());
        let mut updates = Vec::with_capacity(outcome.per_restraint.len() * 2);
        for report in &outcome.per_restraint {
            alphas.insert(report.name.clone(), report.alpha);
            updates.push(Param::Pair(report.name.clone(), PairParam::Alpha(report.alpha)));
            updates.push(Param::Pair(report.name.clone(), PairParam::Target(report.target)));
        }
        staged.set_all(updates)?;
        staged.record_history(&alphas, &targets)?;
        log_restraints(staged, Phase::Training);
        Ok(())
    }

    fn converge(&mut self, staged: &mut RunData, working_dir: &Path) -> Result<(), BrerError> {
        let resume = self.carry_checkpoint(staged.general(), working_dir)?;
        let outcome = self.delegate(staged, working_dir, None, resume)?;

        // Production ends relative to this absolute time
        staged.set(Param::General(GeneralParam::StartTime(outcome.elapsed_time)))?;
        log_restraints(staged, Phase::Convergence);
        Ok(())
    }

    fn produce(&mut self, staged: &mut RunData, working_dir: &Path) -> Result<(), BrerError> {
        let resume = self.carry_checkpoint(staged.general(), working_dir)?;
        let general = staged.general();
        let end_time = general.start_time + general.production_time;
        self.delegate(staged, working_dir, Some(end_time), resume)?;
        log_restraints(staged, Phase::Production);
        Ok(())
    }

    /// Make sure the working directory holds the checkpoint this phase should
    /// continue from. Returns whether one is present.
    fn carry_checkpoint(&self, general: &GeneralParams, working_dir: &Path) -> Result<bool, BrerError> {
        let cpt = checkpoint_path(working_dir);
        if cpt.exists() {
            info!(phase = %general.phase, "checkpoint already exists, not moving any files");
            return Ok(true);
        }

        match general.phase {
            Phase::Training | Phase::Convergence => {
                reject_cross_iteration_carry(general)?;
                Ok(false)
            }
            Phase::Production => {
                let convergence_dir = directory::resolve(
                    &self.settings.ensemble_dir,
                    general.ensemble_num,
                    general.iteration,
                    Phase::Convergence,
                    Some(self.settings.work_sample),
                )?;
                let src = checkpoint_path(&convergence_dir);
                if !src.exists() {
                    return Err(BrerError::MissingCheckpoint(src));
                }
                self.fs.copy(&src, &cpt)?;
                info!(from = %src.display(), "carried convergence checkpoint into production");
                Ok(true)
            }
        }
    }

    fn delegate(
        &mut self,
        staged: &RunData,
        working_dir: &Path,
        end_time: Option<f64>,
        resume: bool,
    ) -> Result<PhaseOutcome, BrerError> {
        let general = staged.general();
        let restraints: Vec<RestraintConfig> = staged
            .pairs()
            .map(|(name, pair)| RestraintConfig::build(general.phase, general, name, pair))
            .collect();
        let request = PhaseRequest {
            phase: general.phase,
            topology: &self.settings.topology,
            working_dir,
            restraints: &restraints,
            end_time,
            resume,
        };
        self.engine.run_phase(&request)
    }
}

/// Checkpoints are only carried within iteration 0.
fn reject_cross_iteration_carry(general: &GeneralParams) -> Result<(), BrerError> {
    if general.iteration > 0 {
        return Err(BrerError::Configuration(format!(
            "carrying a checkpoint into {} of iteration {} is not supported",
            general.phase, general.iteration
        )));
    }
    Ok(())
}

fn advance(staged: &mut RunData) -> Result<Phase, BrerError> {
    let general = staged.general();
    let next = general.phase.next();
    let mut updates = vec![Param::General(GeneralParam::Phase(next))];
    if next == Phase::Training {
        updates.push(Param::General(GeneralParam::Iteration(general.iteration + 1)));
        updates.push(Param::General(GeneralParam::StartTime(0.0)));
    }
    staged.set_all(updates)?;
    Ok(next)
}

fn log_restraints(data: &RunData, phase: Phase) {
    for (name, pair) in data.pairs() {
        info!(pair = name, alpha = pair.alpha(), target = pair.target(), "{} info", phase);
    }
}
