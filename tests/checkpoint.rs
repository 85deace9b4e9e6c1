//! Checkpoint files written by the engine, and resuming from them.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use arbor::gp::{
    CheckpointConfig, CompiledTree, Engine, EvolutionConfig, EvolutionError, PersistenceError, PrimitiveSet, Type,
    Value, checkpoint_path, latest_checkpoint, load_checkpoint, load_logbook, save_logbook,
};
use std::path::Path;

fn pset() -> PrimitiveSet {
    let mut pset = PrimitiveSet::new("MAIN", [Type::Float], Type::Float);
    pset.add_binary("add", |a: f64, b: f64| a + b).unwrap();
    pset.add_binary("mul", |a: f64, b: f64| a * b).unwrap();
    pset.add_binary("div", arbor::gp::protected_div).unwrap();
    pset.add_terminal("one", 1.0).unwrap();
    pset.rename_argument(0, "x").unwrap();
    pset
}

/// Squared error against 2x + 1; a non-float or NaN result scores infinity.
fn linear_error(program: &CompiledTree<'_>) -> Vec<f64> {
    let total: f64 = (0..10_i32)
        .map(f64::from)
        .map(|x| match program.call(&[Value::Float(x)]) {
            Ok(Value::Float(y)) => (y - (2.0 * x + 1.0)).powi(2),
            _ => f64::INFINITY,
        })
        .sum();
    vec![if total.is_nan() { f64::INFINITY } else { total }]
}

fn config(dir: &Path, generations: usize) -> EvolutionConfig {
    EvolutionConfig {
        population_size: 30,
        generations,
        seed: 11,
        checkpoint: Some(CheckpointConfig {
            dir: dir.to_path_buf(),
            interval: 2,
        }),
        ..EvolutionConfig::default()
    }
}

#[test]
fn test_engine_writes_checkpoints_on_interval() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(pset(), config(dir.path(), 5)).unwrap();
    let evolution = engine.run(&linear_error).unwrap();

    // Every second generation, plus the last one.
    for generation in [0, 2, 4, 5] {
        assert!(checkpoint_path(dir.path(), generation).exists(), "gen {generation}");
    }
    for generation in [1, 3] {
        assert!(!checkpoint_path(dir.path(), generation).exists(), "gen {generation}");
    }

    let latest = latest_checkpoint(dir.path()).unwrap().unwrap();
    assert_eq!(latest, checkpoint_path(dir.path(), 5));

    let checkpoint = load_checkpoint(&latest, engine.pset()).unwrap();
    assert_eq!(checkpoint.generation, 5);
    assert_eq!(checkpoint.seed, 11);
    assert_eq!(checkpoint.population, evolution.population);
    assert_eq!(checkpoint.hall_of_fame, evolution.hall_of_fame);
    assert_eq!(checkpoint.logbook.len(), evolution.logbook.len());
}

#[test]
fn test_resume_continues_to_configured_generations() {
    let dir = tempfile::tempdir().unwrap();
    let short = Engine::new(pset(), config(dir.path(), 4)).unwrap();
    short.run(&linear_error).unwrap();

    let long = Engine::new(pset(), config(dir.path(), 9)).unwrap();
    let latest = latest_checkpoint(dir.path()).unwrap().unwrap();
    let resumed = long.resume(&latest, &linear_error).unwrap();

    assert_eq!(resumed.logbook.len(), 10);
    let generations: Vec<usize> = resumed.logbook.records().iter().map(|r| r.generation).collect();
    assert_eq!(generations, (0..=9).collect::<Vec<_>>());
    assert_eq!(resumed.population.len(), 30);
    assert_eq!(latest_checkpoint(dir.path()).unwrap(), Some(checkpoint_path(dir.path(), 9)));

    // The archive never loses ground across the resume.
    let before = load_checkpoint(&latest, long.pset()).unwrap();
    let best_before = before.hall_of_fame.best().unwrap().fitness().unwrap().primary();
    let best_after = resumed.hall_of_fame.best().unwrap().fitness().unwrap().primary();
    assert!(best_after <= best_before);
}

#[test]
fn test_resume_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    Engine::new(pset(), config(dir.path(), 2)).unwrap().run(&linear_error).unwrap();
    let latest = latest_checkpoint(dir.path()).unwrap().unwrap();

    let other = tempfile::tempdir().unwrap();
    let engine = Engine::new(pset(), config(other.path(), 6)).unwrap();
    let a = engine.resume(&latest, &linear_error).unwrap();
    let b = engine.resume(&latest, &linear_error).unwrap();
    assert_eq!(a.population, b.population);
    assert_eq!(a.logbook.len(), b.logbook.len());
}

#[test]
fn test_resume_rejects_foreign_primitive_set() {
    let dir = tempfile::tempdir().unwrap();
    Engine::new(pset(), config(dir.path(), 1)).unwrap().run(&linear_error).unwrap();
    let latest = latest_checkpoint(dir.path()).unwrap().unwrap();

    let mut foreign = PrimitiveSet::new("OTHER", [Type::Float], Type::Float);
    foreign.add_unary("neg", |x: f64| -x).unwrap();
    let engine = Engine::new(foreign, config(dir.path(), 3)).unwrap();
    assert!(matches!(
        engine.resume(&latest, &linear_error),
        Err(EvolutionError::Persistence(PersistenceError::Tree { .. }))
    ));
}

#[test]
fn test_missing_checkpoint_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(pset(), config(dir.path(), 3)).unwrap();
    assert!(matches!(
        engine.resume(&dir.path().join("gen_00007.json"), &linear_error),
        Err(EvolutionError::Persistence(PersistenceError::Io(_)))
    ));
    assert_eq!(latest_checkpoint(dir.path()).unwrap(), None);
}

#[test]
fn test_logbook_export_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let config = EvolutionConfig {
        checkpoint: None,
        ..config(dir.path(), 3)
    };
    let evolution = Engine::new(pset(), config).unwrap().run(&linear_error).unwrap();

    let path = dir.path().join("logbook.json");
    save_logbook(&evolution.logbook, &path).unwrap();
    let loaded = load_logbook(&path).unwrap();
    assert_eq!(loaded.len(), 4);
    assert_eq!(loaded.to_string(), evolution.logbook.to_string());
}

#[test]
fn test_resume_uses_configured_hall_of_fame_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let first = EvolutionConfig {
        hall_of_fame: 4,
        ..config(dir.path(), 2)
    };
    Engine::new(pset(), first).unwrap().run(&linear_error).unwrap();
    let latest = latest_checkpoint(dir.path()).unwrap().unwrap();
    let stored = load_checkpoint(&latest, &pset()).unwrap().hall_of_fame;
    assert_eq!(stored.capacity(), 4);

    for capacity in [1, 8] {
        let other = tempfile::tempdir().unwrap();
        let config = EvolutionConfig {
            hall_of_fame: capacity,
            ..config(other.path(), 4)
        };
        let resumed = Engine::new(pset(), config).unwrap().resume(&latest, &linear_error).unwrap();
        assert_eq!(resumed.hall_of_fame.capacity(), capacity);
        assert!(resumed.hall_of_fame.len() <= capacity);
        let best_before = stored.best().unwrap().fitness().unwrap().primary();
        let best_after = resumed.hall_of_fame.best().unwrap().fitness().unwrap().primary();
        assert!(best_after <= best_before);
    }
}

#[test]
fn test_resume_rejects_other_weights() {
    let dir = tempfile::tempdir().unwrap();
    Engine::new(pset(), config(dir.path(), 1)).unwrap().run(&linear_error).unwrap();
    let latest = latest_checkpoint(dir.path()).unwrap().unwrap();

    let other = tempfile::tempdir().unwrap();
    let maximize = EvolutionConfig {
        weights: vec![1.0],
        ..config(other.path(), 3)
    };
    let engine = Engine::new(pset(), maximize).unwrap();
    match engine.resume(&latest, &linear_error) {
        Err(EvolutionError::CheckpointWeights { expected, found }) => {
            assert_eq!(expected, vec![1.0]);
            assert_eq!(found, vec![-1.0]);
        }
        result => panic!("expected a weights mismatch, got {result:?}"),
    }
}
