//! Strongly typed genetic programming.
//!
//! Programs are typed expression trees built from a [`PrimitiveSet`]. The
//! engine evolves a population of them against a user-supplied
//! [`Evaluator`], keeping every tree well typed through generation,
//! crossover and mutation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Engine (simple / mu + lambda)        │
//! ├──────────────┬───────────────┬──────────────┤
//! │  Statistics  │  Hall of Fame │  Checkpoints │
//! ├──────────────┴───────────────┴──────────────┤
//! │   Selection │ Crossover │ Mutation │ Limit  │
//! ├─────────────────────────────────────────────┤
//! │   Generator (Full / Grow / Half and half)   │
//! ├─────────────────────────────────────────────┤
//! │   Tree + Compiler  ◄──  Primitive set       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use arbor::gp::{CompiledTree, Engine, EvolutionConfig, PrimitiveSet, Type, Value};
//!
//! let mut pset = PrimitiveSet::new("MAIN", [Type::Float], Type::Float);
//! pset.add_binary("add", |a: f64, b: f64| a + b)?;
//! pset.add_binary("mul", |a: f64, b: f64| a * b)?;
//! pset.rename_argument(0, "x")?;
//!
//! let error = |program: &CompiledTree<'_>| {
//!     let y = program.call(&[Value::Float(3.0)]).ok().and_then(|v| v.as_float());
//!     vec![y.map_or(f64::INFINITY, |y| (y - 12.0).abs())]
//! };
//!
//! let config = EvolutionConfig {
//!     population_size: 50,
//!     generations: 5,
//!     ..EvolutionConfig::default()
//! };
//! let evolution = Engine::new(pset, config)?.run(&error)?;
//! assert_eq!(evolution.logbook.len(), 6);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod compiler;
mod crossover;
mod evolution;
mod fitness;
mod float_repr;
mod generate;
mod hall_of_fame;
mod limit;
mod mutation;
mod persistence;
mod primitives;
mod selection;
mod statistics;
mod tree;
mod value;

pub use compiler::CompiledTree;
pub use crossover::cx_one_point;
pub use evolution::{CheckpointConfig, ConfigError, Engine, Evolution, EvolutionConfig, EvolutionError, Strategy};
pub use fitness::{Evaluator, Fitness, Individual, evaluate_population};
pub use generate::{BuildError, Generation, gen_full, gen_grow, gen_half_and_half};
pub use hall_of_fame::HallOfFame;
pub use limit::{BloatPolicy, DEFAULT_MAX_HEIGHT, HeightLimit};
pub use mutation::mut_uniform;
pub use persistence::{
    Checkpoint, PersistenceError, checkpoint_path, latest_checkpoint, load_checkpoint, load_logbook,
    save_checkpoint, save_logbook,
};
pub use primitives::{
    EphemeralFn, Operand, PROTECTED_DIV_FALLBACK, Primitive, PrimitiveFn, PrimitiveSet, RegistryError, Symbol,
    Terminal, TerminalKind, operand, protected_div, protected_div_int,
};
pub use selection::{Selection, SelectionError, select_best};
pub use statistics::{
    Extractor, FitnessValue, GenerationRecord, Logbook, Max, Mean, Min, Record, Reducer, Statistics, StdDev,
    TreeHeight, TreeSize,
};
pub use tree::{Node, Tree, TreeError};
pub use value::{Type, Value};
