//! Subtree mutation.

use crate::gp::generate::{BuildError, Generation};
use crate::gp::primitives::PrimitiveSet;
use crate::gp::tree::Tree;
use rand::Rng;

/// Uniform-point subtree mutation.
///
/// Picks any node uniformly, root included, and replaces its subtree with a
/// fresh one of the same output type built by `generation`.
///
/// # Errors
///
/// Returns the [`BuildError`] if no replacement subtree can be built. The
/// input tree is left untouched.
pub fn mut_uniform<R: Rng>(
    tree: &Tree,
    pset: &PrimitiveSet,
    generation: &Generation,
    rng: &mut R,
) -> Result<Tree, BuildError> {
    let index = rng.gen_range(0..tree.size());
    let ty = tree.nodes()[index].ty();
    let replacement = generation.build(pset, ty, rng)?;
    Ok(tree.splice(tree.subtree(index), replacement.nodes()))
}
