//! Selection operators.
//!
//! Tournament selection picks parents for variation; best-k truncation
//! picks survivors in the elitist loop. Both rank by fitness only.

use crate::gp::fitness::{Individual, compare_individuals};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Error raised when selection is asked to do something impossible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// Nothing to select from.
    #[error("cannot select from an empty population")]
    EmptyPopulation,
    /// An individual had no fitness.
    #[error("individual {0} has not been evaluated")]
    Unevaluated(usize),
    /// Tournament size must be at least one.
    #[error("tournament size must be at least 1")]
    ZeroTournament,
}

/// Parent selection scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    /// Sample `size` individuals uniformly with replacement, keep the best.
    Tournament {
        /// Number of aspirants per tournament.
        size: usize,
    },
}

impl Default for Selection {
    fn default() -> Self {
        Self::Tournament { size: 3 }
    }
}

impl Selection {
    /// Select `n` individuals, cloned, by `n` independent tournaments.
    ///
    /// # Errors
    ///
    /// Fails on an empty population, an unevaluated individual or a zero
    /// tournament size.
    pub fn select<R: Rng>(
        &self,
        population: &[Individual],
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Individual>, SelectionError> {
        check_evaluated(population)?;
        let Self::Tournament { size } = *self;
        if size == 0 {
            return Err(SelectionError::ZeroTournament);
        }
        Ok((0..n)
            .map(|_| population[tournament(population, size, rng)].clone())
            .collect())
    }
}

/// One tournament: index of the best of `size` uniform draws. Ties keep the
/// first drawn aspirant.
fn tournament<R: Rng>(population: &[Individual], size: usize, rng: &mut R) -> usize {
    let mut best = rng.gen_range(0..population.len());
    for _ in 1..size {
        let idx = rng.gen_range(0..population.len());
        if compare_individuals(&population[idx], &population[best]) == Ordering::Greater {
            best = idx;
        }
    }
    best
}

/// The `k` fittest individuals, cloned, best first.
///
/// The sort is stable, so equal fitness keeps population order.
///
/// # Errors
///
/// Fails on an empty population or an unevaluated individual.
pub fn select_best(population: &[Individual], k: usize) -> Result<Vec<Individual>, SelectionError> {
    check_evaluated(population)?;
    let mut ranked: Vec<&Individual> = population.iter().collect();
    ranked.sort_by(|a, b| compare_individuals(b, a));
    Ok(ranked.into_iter().take(k).cloned().collect())
}

fn check_evaluated(population: &[Individual]) -> Result<(), SelectionError> {
    if population.is_empty() {
        return Err(SelectionError::EmptyPopulation);
    }
    match population.iter().position(|ind| !ind.is_evaluated()) {
        Some(index) => Err(SelectionError::Unevaluated(index)),
        None => Ok(()),
    }
}
