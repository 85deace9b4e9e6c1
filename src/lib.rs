// Allow unwrap and lossy numeric casts in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(
    test,
    allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::float_cmp
    )
)]
//! Arbor: strongly typed genetic programming.
//!
//! This crate evolves small typed expression trees towards a target
//! behaviour, with:
//! - Explicit input/output schemas on every primitive, checked at build,
//!   variation and compile time
//! - Seeded, bit-reproducible runs, with optional parallel fitness
//!   evaluation
//! - JSON checkpoints of populations and statistics
//!
//! See [`gp`] for the engine.

pub mod error;
pub mod gp;

pub use error::{EvalError, EvalResult};
