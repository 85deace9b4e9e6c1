//! Static height limit for the variation operators.
//!
//! The limit wraps crossover and mutation. An offspring taller than the
//! limit is thrown away and replaced by a clone of one of the parents that
//! went into the operator. The replacement parent is drawn right after the
//! operator runs.

use crate::gp::crossover::cx_one_point;
use crate::gp::generate::{BuildError, Generation};
use crate::gp::mutation::mut_uniform;
use crate::gp::primitives::PrimitiveSet;
use crate::gp::tree::Tree;
use log::trace;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default maximum tree height.
pub const DEFAULT_MAX_HEIGHT: usize = 17;

/// What happens to an offspring that exceeds the height limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloatPolicy {
    /// Replace it with a clone of a randomly chosen input parent.
    ///
    /// This favours parents whose offspring keep busting the limit, but it
    /// is the classic behaviour and stays the default.
    #[default]
    RevertToRandomParent,
    /// No height check.
    Unlimited,
}

/// Height limit applied around the variation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightLimit {
    /// Maximum allowed height.
    pub max_height: usize,
    /// Handling of oversized offspring.
    pub policy: BloatPolicy,
}

impl Default for HeightLimit {
    fn default() -> Self {
        Self {
            max_height: DEFAULT_MAX_HEIGHT,
            policy: BloatPolicy::default(),
        }
    }
}

impl HeightLimit {
    /// Crossover through the limit. Returns the offspring and the number of
    /// them that were reverted.
    #[must_use]
    pub fn mate<R: Rng>(&self, first: &Tree, second: &Tree, rng: &mut R) -> (Tree, Tree, usize) {
        let (child1, child2) = cx_one_point(first, second, rng);
        let parents = [first, second];
        let mut reverts = 0;
        let child1 = self.enforce(child1, &parents, &mut reverts, rng);
        let child2 = self.enforce(child2, &parents, &mut reverts, rng);
        (child1, child2, reverts)
    }

    /// Mutation through the limit. Returns the mutant and whether it was
    /// reverted.
    ///
    /// # Errors
    ///
    /// Propagates a failed subtree build.
    pub fn mutate<R: Rng>(
        &self,
        tree: &Tree,
        pset: &PrimitiveSet,
        generation: &Generation,
        rng: &mut R,
    ) -> Result<(Tree, bool), BuildError> {
        let mutant = mut_uniform(tree, pset, generation, rng)?;
        let mut reverts = 0;
        let mutant = self.enforce(mutant, &[tree], &mut reverts, rng);
        Ok((mutant, reverts > 0))
    }

    fn enforce<R: Rng>(&self, child: Tree, parents: &[&Tree], reverts: &mut usize, rng: &mut R) -> Tree {
        if self.policy == BloatPolicy::Unlimited || child.height() <= self.max_height {
            return child;
        }
        *reverts += 1;
        trace!(
            "offspring height {} exceeds limit {}, reverting to a parent",
            child.height(),
            self.max_height
        );
        let parent = if parents.len() == 1 {
            parents[0]
        } else {
            parents[rng.gen_range(0..parents.len())]
        };
        parent.clone()
    }
}
