//! Working directory tree for an ensemble:
//!
//! ```text
//! <top>/mem_<n>/state.json
//! <top>/mem_<n>/<iteration>/training/state.cpt
//! <top>/mem_<n>/<iteration>/convergence/<work_sample>/state.cpt
//! <top>/mem_<n>/<iteration>/production/<work_sample>/state.cpt
//! ```

use crate::fs_ops::DirectoryMaterializer;
use crate::params::Phase;
use crate::BrerError;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_FILE: &str = "state.cpt";
pub const STATE_FILE: &str = "state.json";

/// Resolve the working directory for one phase step.
///
/// Convergence and production need a work sample; training ignores it.
pub fn resolve(
    top_dir: &Path,
    ensemble_num: u32,
    iteration: u32,
    phase: Phase,
    work_sample: Option<u32>,
) -> Result<PathBuf, BrerError> {
    let phase_dir = member_dir(top_dir, ensemble_num)
        .join(iteration.to_string())
        .join(phase.as_str());

    if !phase.requires_work_sample() {
        return Ok(phase_dir);
    }
    match work_sample {
        Some(sample) => Ok(phase_dir.join(sample.to_string())),
        None => Err(BrerError::Configuration(format!(
            "the {} phase requires a work sample",
            phase
        ))),
    }
}

pub fn member_dir(top_dir: &Path, ensemble_num: u32) -> PathBuf {
    top_dir.join(format!("mem_{}", ensemble_num))
}

pub fn state_path(top_dir: &Path, ensemble_num: u32) -> PathBuf {
    member_dir(top_dir, ensemble_num).join(STATE_FILE)
}

pub fn checkpoint_path(working_dir: &Path) -> PathBuf {
    working_dir.join(CHECKPOINT_FILE)
}

/// Create `path` and any missing parents. Safe to call repeatedly.
pub fn materialize(materializer: &dyn DirectoryMaterializer, path: &Path) -> Result<(), BrerError> {
    materializer.mkdir_all(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::LocalFs;

    #[test]
    fn test_training_path() {
        let path = resolve(Path::new("/ens"), 2, 0, Phase::Training, None).unwrap();
        assert_eq!(path, PathBuf::from("/ens/mem_2/0/training"));
    }

    #[test]
    fn test_training_ignores_work_sample() {
        let with = resolve(Path::new("/ens"), 2, 3, Phase::Training, Some(7)).unwrap();
        let without = resolve(Path::new("/ens"), 2, 3, Phase::Training, None).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_work_sample_phases() {
        let conv = resolve(Path::new("/ens"), 1, 0, Phase::Convergence, Some(4)).unwrap();
        assert_eq!(conv, PathBuf::from("/ens/mem_1/0/convergence/4"));
        let prod = resolve(Path::new("/ens"), 1, 5, Phase::Production, Some(1)).unwrap();
        assert_eq!(prod, PathBuf::from("/ens/mem_1/5/production/1"));
    }

    #[test]
    fn test_missing_work_sample_is_configuration_error() {
        for phase in [Phase::Convergence, Phase::Production] {
            let result = resolve(Path::new("/ens"), 1, 0, phase, None);
            assert!(matches!(result, Err(BrerError::Configuration(_))), "{} accepted no work sample", phase);
        }
    }

    #[test]
    fn test_state_and_checkpoint_paths() {
        assert_eq!(state_path(Path::new("/ens"), 3), PathBuf::from("/ens/mem_3/state.json"));
        assert_eq!(checkpoint_path(Path::new("/w")), PathBuf::from("/w/state.cpt"));
    }

    #[test]
    fn test_materialize_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = resolve(dir.path(), 1, 0, Phase::Production, Some(1)).unwrap();
        materialize(&LocalFs, &path).unwrap();
        materialize(&LocalFs, &path).unwrap();
        assert!(path.is_dir());
    }
}
