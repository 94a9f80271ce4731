mod common;

use brer::params::Phase;
use brer::restraint::RestraintKind;
use brer::BrerError;
use common::*;
use serde_json::json;
use std::fs;

/// Walks one member through a full iteration:
/// training -> convergence -> production -> training (iteration 1).
#[test]
fn test_full_iteration_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let top = dir.path();
    let mut config = config(top, FakeEngine::new(), vec![targets(&[("A-B", 1.0), ("C-D", 2.0)])]);

    // A virgin document exists before any simulation work
    assert_eq!(read_document(top)["general parameters"]["phase"], json!("training"));

    // Training
    assert_eq!(config.run().unwrap(), Phase::Convergence);
    let doc = read_document(top);
    assert_eq!(doc["general parameters"]["phase"], json!("convergence"));
    assert_eq!(doc["history"]["1.0,2.0"], json!([10.0, 11.0]));
    assert_eq!(doc["pair parameters"]["A-B"]["alpha"], json!(10.0));
    assert_eq!(doc["pair parameters"]["C-D"]["target"], json!(2.0));

    let training = &config.engine().requests[0];
    assert_eq!(training.phase, Phase::Training);
    assert_eq!(training.working_dir, top.join("mem_1/0/training"));
    assert!(!training.resume);
    assert_eq!(training.restraints.len(), 2);
    assert_eq!(training.restraints[0].target, 1.0);
    assert!(matches!(training.restraints[0].kind, RestraintKind::Training { .. }));

    // Convergence
    assert_eq!(config.run().unwrap(), Phase::Production);
    let convergence = &config.engine().requests[1];
    assert_eq!(convergence.working_dir, top.join("mem_1/0/convergence/1"));
    assert_eq!(convergence.end_time, None);
    assert_eq!(
        convergence.restraints[1].kind,
        RestraintKind::Convergence { alpha: 11.0, tolerance: 0.25 }
    );
    assert_eq!(config.run_data().general().start_time, 1500.0);
    assert_eq!(read_document(top)["general parameters"]["start_time"], json!(1500.0));

    // Production picks up the convergence checkpoint and runs to start + production time
    assert_eq!(config.run().unwrap(), Phase::Training);
    let production = &config.engine().requests[2];
    let production_cpt = top.join("mem_1/0/production/1/state.cpt");
    assert_eq!(fs::read_to_string(&production_cpt).unwrap(), "production");
    assert!(production.resume);
    assert_eq!(production.end_time, Some(1500.0 + 10_000.0));
    assert_eq!(production.restraints[0].kind, RestraintKind::Production { alpha: 10.0 });

    let doc = read_document(top);
    assert_eq!(doc["general parameters"]["phase"], json!("training"));
    assert_eq!(doc["general parameters"]["iteration"], json!(1));
    assert_eq!(doc["general parameters"]["start_time"], json!(0.0));
}

#[test]
fn test_iteration_only_advances_on_production_edge() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), FakeEngine::new(), vec![targets(&[("A-B", 1.5), ("C-D", 2.5)])]);

    let mut seen = vec![(config.run_data().general().phase, config.run_data().general().iteration)];
    for _ in 0..3 {
        config.run().unwrap();
        seen.push((config.run_data().general().phase, config.run_data().general().iteration));
    }
    assert_eq!(
        seen,
        vec![
            (Phase::Training, 0),
            (Phase::Convergence, 0),
            (Phase::Production, 0),
            (Phase::Training, 1),
        ]
    );
}

#[test]
fn test_second_iteration_training_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let top = dir.path();
    let mut config = config(
        top,
        FakeEngine::new(),
        vec![targets(&[("A-B", 1.0), ("C-D", 2.0)]), targets(&[("A-B", 1.5), ("C-D", 2.0)])],
    );
    for _ in 0..3 {
        config.run().unwrap();
    }

    let state = top.join("mem_1/state.json");
    let before = fs::read(&state).unwrap();
    let result = config.run();
    assert!(matches!(result, Err(BrerError::Configuration(_))), "got {:?}", result);
    assert_eq!(fs::read(&state).unwrap(), before);
    assert_eq!(config.engine().requests.len(), 3);
    assert_eq!(config.resampler().drawn, 1);
}

#[test]
fn test_work_sample_selects_directory() {
    let dir = tempfile::tempdir().unwrap();
    let top = dir.path();
    let mut settings = settings(top);
    settings.work_sample = 3;
    let mut config = brer::run_config::RunConfig::new(
        settings,
        &two_pairs(),
        FakeEngine::new(),
        ScriptedResampler::new(vec![targets(&[("A-B", 1.0), ("C-D", 2.0)])]),
    )
    .unwrap();

    config.run().unwrap();
    config.run().unwrap();
    assert_eq!(config.engine().requests[0].working_dir, top.join("mem_1/0/training"));
    assert_eq!(config.engine().requests[1].working_dir, top.join("mem_1/0/convergence/3"));
    assert!(top.join("mem_1/0/convergence/3/state.cpt").exists());
}
