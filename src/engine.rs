use crate::params::Phase;
use crate::restraint::RestraintConfig;
use crate::BrerError;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Everything the engine needs to run one phase step.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseRequest<'a> {
    pub phase: Phase,
    pub topology: &'a Path,
    pub working_dir: &'a Path,
    pub restraints: &'a [RestraintConfig],
    /// Absolute simulation time at which to stop; production only.
    pub end_time: Option<f64>,
    /// A checkpoint is present in `working_dir` and should be continued.
    pub resume: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestraintReport {
    pub name: String,
    pub alpha: f64,
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub per_restraint: Vec<RestraintReport>,
    /// Absolute simulation time reached when the step finished.
    pub elapsed_time: f64,
}

/// Runs the simulation work of a phase step. Blocks until the step is done.
pub trait SimulationEngine {
    fn run_phase(&mut self, request: &PhaseRequest<'_>) -> Result<PhaseOutcome, BrerError>;
}

/// Engine backed by an external program.
///
/// The program runs inside the working directory, receives the request as
/// JSON on stdin and must print a `PhaseOutcome` as JSON on stdout.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a command line on whitespace: `"python run_md.py --gpu"`.
    pub fn from_command_line(line: &str) -> Result<Self, BrerError> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| BrerError::Configuration("engine command is empty".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }
}

impl SimulationEngine for CommandEngine {
    fn run_phase(&mut self, request: &PhaseRequest<'_>) -> Result<PhaseOutcome, BrerError> {
        info!(program = %self.program, phase = %request.phase, dir = %request.working_dir.display(), "launching engine");
        let payload = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| BrerError::Engine(format!("failed to start {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // The engine may legitimately exit without reading its request
            if let Err(e) = stdin.write_all(&payload) {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(BrerError::Io(e));
                }
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(BrerError::Engine(format!("{} exited with {}", self.program, output.status)));
        }
        debug!(bytes = output.stdout.len(), "engine finished");

        serde_json::from_slice(&output.stdout)
            .map_err(|e| BrerError::Engine(format!("unreadable engine output: {}", e)))
    }
}
