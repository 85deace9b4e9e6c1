//! Checkpoints and logbook export.
//!
//! Everything is written as JSON. Trees are stored as node sequences and
//! carry primitive and terminal ids, so a checkpoint can only be loaded
//! against the primitive set it was written with; loading validates every
//! tree to catch a mismatched set early.

use crate::gp::fitness::Individual;
use crate::gp::hall_of_fame::HallOfFame;
use crate::gp::primitives::PrimitiveSet;
use crate::gp::statistics::Logbook;
use crate::gp::tree::TreeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Failure to save or load run state.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// File system error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// A stored tree does not fit the primitive set.
    #[error("individual {index} does not fit the primitive set: {source}")]
    Tree {
        /// Position in the population, hall of fame members after it.
        index: usize,
        /// Validation failure.
        source: TreeError,
    },
}

/// Snapshot of a run at the end of a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last completed generation.
    pub generation: usize,
    /// Seed of the run.
    pub seed: u64,
    /// Population after the generation.
    pub population: Vec<Individual>,
    /// Archive after the generation.
    pub hall_of_fame: HallOfFame,
    /// Statistics up to and including the generation.
    pub logbook: Logbook,
}

/// Write a checkpoint, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if serialization or file I/O fails.
pub fn save_checkpoint(checkpoint: &Checkpoint, path: &Path) -> Result<(), PersistenceError> {
    write_json(checkpoint, path)
}

/// Read a checkpoint and validate its trees against `pset`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or a tree does
/// not validate.
pub fn load_checkpoint(path: &Path, pset: &PrimitiveSet) -> Result<Checkpoint, PersistenceError> {
    let file = fs::File::open(path)?;
    let checkpoint: Checkpoint = serde_json::from_reader(BufReader::new(file))?;
    let members = checkpoint.population.iter().chain(checkpoint.hall_of_fame.members());
    for (index, individual) in members.enumerate() {
        pset.validate(individual.tree())
            .map_err(|source| PersistenceError::Tree { index, source })?;
    }
    Ok(checkpoint)
}

/// Write a logbook as JSON.
///
/// # Errors
///
/// Returns an error if serialization or file I/O fails.
pub fn save_logbook(logbook: &Logbook, path: &Path) -> Result<(), PersistenceError> {
    write_json(logbook, path)
}

/// Read a logbook written by [`save_logbook`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_logbook(path: &Path) -> Result<Logbook, PersistenceError> {
    let file = fs::File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Path of the checkpoint file for `generation` inside `dir`.
#[must_use]
pub fn checkpoint_path(dir: &Path, generation: usize) -> PathBuf {
    dir.join(format!("gen_{generation:05}.json"))
}

/// Most recent checkpoint in `dir`, by generation number in the file name.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn latest_checkpoint(dir: &Path) -> Result<Option<PathBuf>, PersistenceError> {
    let mut best: Option<(usize, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let generation = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("gen_"))
            .and_then(|n| n.strip_suffix(".json"))
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(generation) = generation {
            if best.as_ref().is_none_or(|(g, _)| generation > *g) {
                best = Some((generation, path));
            }
        }
    }
    Ok(best.map(|(_, path)| path))
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}
