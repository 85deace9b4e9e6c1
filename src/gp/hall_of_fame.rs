//! Bounded archive of the best individuals seen during a run.

use crate::gp::fitness::{Individual, compare_individuals};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Best-ever individuals, fittest first.
///
/// Members are distinct by tree. Equal fitness keeps the older member
/// ahead of the newer one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HallOfFame {
    capacity: usize,
    members: Vec<Individual>,
}

impl HallOfFame {
    /// Archive holding at most `capacity` members. Zero disables it.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            members: Vec::with_capacity(capacity),
        }
    }

    /// Offer every evaluated individual of `population`, in order.
    pub fn update(&mut self, population: &[Individual]) {
        if self.capacity == 0 {
            return;
        }
        for candidate in population.iter().filter(|ind| ind.is_evaluated()) {
            let full = self.members.len() >= self.capacity;
            if full {
                let Some(worst) = self.members.last() else {
                    continue;
                };
                if compare_individuals(candidate, worst) != Ordering::Greater {
                    continue;
                }
            }
            if self.members.iter().any(|m| m.tree() == candidate.tree()) {
                continue;
            }
            // After every member at least as fit, so ties stay oldest first.
            let at = self
                .members
                .partition_point(|m| compare_individuals(m, candidate) != Ordering::Less);
            self.members.insert(at, candidate.clone());
            self.members.truncate(self.capacity);
        }
    }

    /// Members, fittest first.
    #[must_use]
    pub fn members(&self) -> &[Individual] {
        &self.members
    }

    /// The fittest member.
    #[must_use]
    pub fn best(&self) -> Option<&Individual> {
        self.members.first()
    }

    /// Maximum number of members.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the archive is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
