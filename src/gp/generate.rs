//! Random typed tree generation.
//!
//! Three initialisers, all rooted at a requested type:
//!
//! - **Full**: every branch reaches exactly the drawn height.
//! - **Grow**: branches may stop early, with the set's terminal ratio as the
//!   leaf probability once the minimum depth is reached.
//! - **Half and half**: a fair coin picks Full or Grow per tree.
//!
//! Nodes are chosen depth first, left to right, so a seeded RNG always
//! produces the same tree.

use crate::gp::primitives::{PrimitiveSet, TerminalKind};
use crate::gp::tree::{Node, Tree};
use crate::gp::value::Type;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Why a tree could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A primitive of this type was required but none is registered.
    #[error("no primitive returns {0}")]
    NoPrimitive(Type),
    /// A terminal of this type was required but none is registered.
    #[error("no terminal of type {0}")]
    NoTerminal(Type),
    /// An ephemeral generator produced a value of the wrong type.
    #[error("ephemeral `{name}` produced {found}, declared {expected}")]
    EphemeralType {
        /// Ephemeral name.
        name: String,
        /// Declared type.
        expected: Type,
        /// Type of the sampled value.
        found: Type,
    },
    /// The depth range is empty.
    #[error("empty depth range {min}..={max}")]
    DepthRange {
        /// Lower bound.
        min: usize,
        /// Upper bound.
        max: usize,
    },
}

/// Tree initialisation method and its depth range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Generation {
    /// Every leaf at the drawn height.
    Full {
        /// Minimum height.
        min: usize,
        /// Maximum height.
        max: usize,
    },
    /// Leaves may appear above the drawn height.
    Grow {
        /// Minimum height.
        min: usize,
        /// Maximum height.
        max: usize,
    },
    /// Full or Grow, chosen per tree.
    HalfAndHalf {
        /// Minimum height.
        min: usize,
        /// Maximum height.
        max: usize,
    },
}

impl Generation {
    /// Inclusive depth bounds.
    #[must_use]
    pub fn depth_range(&self) -> (usize, usize) {
        match *self {
            Self::Full { min, max } | Self::Grow { min, max } | Self::HalfAndHalf { min, max } => {
                (min, max)
            }
        }
    }

    /// Build a tree whose root produces `ty`.
    ///
    /// # Errors
    ///
    /// See [`BuildError`].
    pub fn build<R: Rng>(&self, pset: &PrimitiveSet, ty: Type, rng: &mut R) -> Result<Tree, BuildError> {
        match *self {
            Self::Full { min, max } => gen_full(pset, ty, min, max, rng),
            Self::Grow { min, max } => gen_grow(pset, ty, min, max, rng),
            Self::HalfAndHalf { min, max } => gen_half_and_half(pset, ty, min, max, rng),
        }
    }
}

/// Generate a tree where every leaf sits at the same, randomly drawn, depth.
///
/// # Errors
///
/// See [`BuildError`].
pub fn gen_full<R: Rng>(
    pset: &PrimitiveSet,
    ty: Type,
    min: usize,
    max: usize,
    rng: &mut R,
) -> Result<Tree, BuildError> {
    generate(pset, ty, min, max, rng, |height, depth, _| depth == height)
}

/// Generate a tree whose branches may end before the drawn depth.
///
/// # Errors
///
/// See [`BuildError`].
pub fn gen_grow<R: Rng>(
    pset: &PrimitiveSet,
    ty: Type,
    min: usize,
    max: usize,
    rng: &mut R,
) -> Result<Tree, BuildError> {
    let ratio = pset.terminal_ratio();
    generate(pset, ty, min, max, rng, |height, depth, rng| {
        depth == height || (depth >= min && rng.gen_bool(ratio))
    })
}

/// Generate with Full or Grow, picked by a fair coin.
///
/// # Errors
///
/// See [`BuildError`].
pub fn gen_half_and_half<R: Rng>(
    pset: &PrimitiveSet,
    ty: Type,
    min: usize,
    max: usize,
    rng: &mut R,
) -> Result<Tree, BuildError> {
    if rng.gen_bool(0.5) {
        gen_grow(pset, ty, min, max, rng)
    } else {
        gen_full(pset, ty, min, max, rng)
    }
}

/// Shared driver: `leaf(height, depth, rng)` decides whether the position at
/// `depth` becomes a terminal.
fn generate<R, F>(
    pset: &PrimitiveSet,
    ty: Type,
    min: usize,
    max: usize,
    rng: &mut R,
    mut leaf: F,
) -> Result<Tree, BuildError>
where
    R: Rng,
    F: FnMut(usize, usize, &mut R) -> bool,
{
    if min > max {
        return Err(BuildError::DepthRange { min, max });
    }
    let height = rng.gen_range(min..=max);
    let mut nodes = Vec::new();
    let mut stack = vec![(0usize, ty)];

    while let Some((depth, ty)) = stack.pop() {
        if leaf(height, depth, rng) {
            nodes.push(pick_terminal(pset, ty, rng)?);
        } else {
            let candidates = pset.primitives_of(ty);
            if candidates.is_empty() {
                return Err(BuildError::NoPrimitive(ty));
            }
            let id = candidates[rng.gen_range(0..candidates.len())];
            let Some(prim) = pset.primitive(id) else {
                return Err(BuildError::NoPrimitive(ty));
            };
            nodes.push(Node::Primitive {
                id,
                arity: prim.arity(),
                ret: ty,
            });
            // Reversed so the leftmost child is built first.
            stack.extend(prim.inputs().iter().rev().map(|&arg| (depth + 1, arg)));
        }
    }
    Ok(Tree::from_nodes_unchecked(nodes))
}

fn pick_terminal<R: Rng>(pset: &PrimitiveSet, ty: Type, rng: &mut R) -> Result<Node, BuildError> {
    let candidates = pset.terminals_of(ty);
    if candidates.is_empty() {
        return Err(BuildError::NoTerminal(ty));
    }
    let id = candidates[rng.gen_range(0..candidates.len())];
    let Some(term) = pset.terminal(id) else {
        return Err(BuildError::NoTerminal(ty));
    };
    let node = match term.kind() {
        TerminalKind::Argument(index) => Node::Argument {
            id,
            index: *index,
            ret: ty,
        },
        TerminalKind::Constant(value) => Node::Constant {
            id,
            value: value.clone(),
        },
        TerminalKind::Ephemeral(sample) => {
            let value = sample(rng);
            if value.ty() != ty {
                return Err(BuildError::EphemeralType {
                    name: term.name().to_owned(),
                    expected: ty,
                    found: value.ty(),
                });
            }
            Node::Constant { id, value }
        }
    };
    Ok(node)
}
