//! The evolutionary loop.
//!
//! Two strategies share one engine:
//!
//! - **Simple**: tournament-select a full population of parents, pair them
//!   for crossover, mutate, evaluate, and replace the population wholesale.
//! - **Mu + lambda**: breed `lambda` offspring from the `mu` parents, then
//!   keep the best `mu` of parents and offspring together.
//!
//! All randomness comes from one `SmallRng` seeded from the configuration.
//! Draws happen in a fixed order, so a seed reproduces a run exactly:
//!
//! ```text
//! init: tree 0, tree 1, ...
//! gen:  selection ─► crossover pair by pair ─► mutation one by one
//!       (height-limit parent draw right after the operator that needs it)
//! ```

#![allow(clippy::cast_precision_loss)]

use crate::gp::fitness::{Evaluator, Fitness, Individual, evaluate_population};
use crate::gp::generate::{BuildError, Generation};
use crate::gp::hall_of_fame::HallOfFame;
use crate::gp::limit::{BloatPolicy, DEFAULT_MAX_HEIGHT, HeightLimit};
use crate::gp::persistence::{Checkpoint, PersistenceError, checkpoint_path, load_checkpoint, save_checkpoint};
use crate::gp::primitives::PrimitiveSet;
use crate::gp::selection::{Selection, SelectionError, select_best};
use crate::gp::statistics::{GenerationRecord, Logbook, Statistics};
use crate::gp::tree::{Tree, TreeError};
use log::{debug, info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Replacement strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Offspring replace the whole population.
    #[default]
    Simple,
    /// Best `population_size` of parents plus `lambda` offspring survive.
    MuPlusLambda {
        /// Offspring per generation.
        lambda: usize,
    },
}

/// Periodic checkpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory the checkpoint files go into.
    pub dir: PathBuf,
    /// Save every N generations, plus the final one.
    pub interval: usize,
}

/// Configuration for an evolutionary run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Individuals per generation (`mu` for mu + lambda).
    pub population_size: usize,
    /// Crossover probability.
    pub cxpb: f64,
    /// Mutation probability.
    pub mutpb: f64,
    /// Generations after the initial one.
    pub generations: usize,
    /// Aspirants per tournament.
    pub tournament_size: usize,
    /// Initial population generator.
    pub init: Generation,
    /// Subtree generator used by mutation.
    pub mutation: Generation,
    /// Height limit for variation offspring.
    pub max_height: usize,
    /// Hall of fame capacity; 0 disables it.
    pub hall_of_fame: usize,
    /// One weight per objective: negative minimises, positive maximises.
    pub weights: Vec<f64>,
    /// RNG seed.
    pub seed: u64,
    /// Replacement strategy.
    pub strategy: Strategy,
    /// Handling of offspring over the height limit.
    pub bloat: BloatPolicy,
    /// Evaluate fitness on the rayon pool.
    pub parallel: bool,
    /// Attempts per initial tree before giving up.
    pub build_attempts: usize,
    /// Periodic checkpoints, if any.
    pub checkpoint: Option<CheckpointConfig>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 300,
            cxpb: 0.5,
            mutpb: 0.1,
            generations: 40,
            tournament_size: 3,
            init: Generation::HalfAndHalf { min: 1, max: 2 },
            mutation: Generation::Full { min: 0, max: 2 },
            max_height: DEFAULT_MAX_HEIGHT,
            hall_of_fame: 1,
            weights: vec![-1.0],
            seed: 42,
            strategy: Strategy::Simple,
            bloat: BloatPolicy::RevertToRandomParent,
            parallel: true,
            build_attempts: 16,
            checkpoint: None,
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Population size is zero.
    #[error("population size must be positive")]
    EmptyPopulation,
    /// A probability lies outside `[0, 1]`.
    #[error("{name} must lie in [0, 1], got {value}")]
    Probability {
        /// Field name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// `cxpb + mutpb` exceeds one in the mu + lambda loop.
    #[error("cxpb + mutpb must not exceed 1 for mu + lambda, got {0}")]
    ProbabilitySum(f64),
    /// Tournament size is zero.
    #[error("tournament size must be at least 1")]
    TournamentSize,
    /// A generator's depth range is empty.
    #[error("{name} depth range {min}..={max} is empty")]
    DepthRange {
        /// Field name.
        name: &'static str,
        /// Lower bound.
        min: usize,
        /// Upper bound.
        max: usize,
    },
    /// No objective weights.
    #[error("at least one objective weight is required")]
    NoWeights,
    /// A weight is zero or not finite.
    #[error("weight {index} must be finite and non-zero, got {value}")]
    Weight {
        /// Position of the weight.
        index: usize,
        /// Offending value.
        value: f64,
    },
    /// Lambda is zero.
    #[error("lambda must be at least 1")]
    Lambda,
    /// Crossover needs two distinct parents.
    #[error("mu + lambda crossover needs a population of at least 2")]
    MuTooSmall,
    /// Build attempts is zero.
    #[error("build attempts must be at least 1")]
    BuildAttempts,
    /// Checkpoint interval is zero.
    #[error("checkpoint interval must be at least 1")]
    CheckpointInterval,
}

impl EvolutionConfig {
    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        for (name, value) in [("cxpb", self.cxpb), ("mutpb", self.mutpb)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }
        if self.tournament_size == 0 {
            return Err(ConfigError::TournamentSize);
        }
        for (name, generation) in [("init", self.init), ("mutation", self.mutation)] {
            let (min, max) = generation.depth_range();
            if min > max {
                return Err(ConfigError::DepthRange { name, min, max });
            }
        }
        if self.weights.is_empty() {
            return Err(ConfigError::NoWeights);
        }
        if let Some((index, &value)) = self
            .weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w == 0.0)
        {
            return Err(ConfigError::Weight { index, value });
        }
        if let Strategy::MuPlusLambda { lambda } = self.strategy {
            if lambda == 0 {
                return Err(ConfigError::Lambda);
            }
            if self.cxpb + self.mutpb > 1.0 {
                return Err(ConfigError::ProbabilitySum(self.cxpb + self.mutpb));
            }
            if self.cxpb > 0.0 && self.population_size < 2 {
                return Err(ConfigError::MuTooSmall);
            }
        }
        if self.build_attempts == 0 {
            return Err(ConfigError::BuildAttempts);
        }
        if self.checkpoint.as_ref().is_some_and(|c| c.interval == 0) {
            return Err(ConfigError::CheckpointInterval);
        }
        Ok(())
    }

    fn height_limit(&self) -> HeightLimit {
        HeightLimit {
            max_height: self.max_height,
            policy: self.bloat,
        }
    }
}

/// Error that stops a run.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// An initial tree could not be built.
    #[error("no initial tree after {attempts} attempts: {source}")]
    Build {
        /// Attempts made.
        attempts: usize,
        /// Error of the last attempt.
        source: BuildError,
    },
    /// A tree failed to compile.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// Selection failed.
    #[error(transparent)]
    Selection(#[from] SelectionError),
    /// The evaluator returned the wrong number of objectives.
    #[error("evaluator returned {found} objectives, expected {expected}")]
    FitnessArity {
        /// Configured number of weights.
        expected: usize,
        /// Number returned.
        found: usize,
    },
    /// A resumed population was empty.
    #[error("cannot evolve an empty population")]
    EmptyPopulation,
    /// Loading a checkpoint failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// A checkpoint was scored under different objective weights.
    #[error("checkpoint fitness uses weights {found:?}, run is configured with {expected:?}")]
    CheckpointWeights {
        /// Configured weights.
        expected: Vec<f64>,
        /// Weights stored in the checkpoint.
        found: Vec<f64>,
    },
}

/// Result of a run.
#[derive(Debug, Clone)]
pub struct Evolution {
    /// Final population, all evaluated.
    pub population: Vec<Individual>,
    /// One record per generation, initial generation included.
    pub logbook: Logbook,
    /// Best individuals seen.
    pub hall_of_fame: HallOfFame,
}

/// Evolution engine: a primitive set, a configuration and a statistics
/// collector.
#[derive(Debug, Clone)]
pub struct Engine {
    pset: PrimitiveSet,
    config: EvolutionConfig,
    statistics: Statistics,
}

/// Loop state carried from one generation to the next.
struct RunState {
    population: Vec<Individual>,
    logbook: Logbook,
    hall_of_fame: HallOfFame,
}

impl Engine {
    /// Validate `config` and build an engine with the standard statistics.
    ///
    /// # Errors
    ///
    /// Returns the configuration error, before anything runs.
    pub fn new(pset: PrimitiveSet, config: EvolutionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!("engine configured for `{}`: {config:?}", pset.name());
        Ok(Self {
            pset,
            config,
            statistics: Statistics::standard(),
        })
    }

    /// Replace the statistics collector.
    #[must_use]
    pub fn with_statistics(mut self, statistics: Statistics) -> Self {
        self.statistics = statistics;
        self
    }

    /// Primitive set.
    #[must_use]
    pub fn pset(&self) -> &PrimitiveSet {
        &self.pset
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Generate `population_size` unevaluated individuals.
    ///
    /// Each tree is retried up to `build_attempts` times.
    ///
    /// # Errors
    ///
    /// Fails when a tree cannot be built within the attempts.
    pub fn initial_population<R: Rng>(&self, rng: &mut R) -> Result<Vec<Individual>, EvolutionError> {
        (0..self.config.population_size)
            .map(|_| self.build_initial(rng).map(Individual::new))
            .collect()
    }

    fn build_initial<R: Rng>(&self, rng: &mut R) -> Result<Tree, EvolutionError> {
        let mut last = None;
        for _ in 0..self.config.build_attempts {
            match self.config.init.build(&self.pset, self.pset.output(), rng) {
                Ok(tree) => return Ok(tree),
                Err(e) => last = Some(e),
            }
        }
        Err(EvolutionError::Build {
            attempts: self.config.build_attempts,
            source: last.unwrap_or(BuildError::NoTerminal(self.pset.output())),
        })
    }

    /// Generate an initial population and evolve it.
    ///
    /// # Errors
    ///
    /// See [`EvolutionError`].
    pub fn run<E: Evaluator + ?Sized>(&self, evaluator: &E) -> Result<Evolution, EvolutionError> {
        let mut rng = SmallRng::seed_from_u64(self.config.seed);
        let population = self.initial_population(&mut rng)?;
        self.evolve(population, evaluator, &mut rng)
    }

    /// Evolve a supplied population, such as one loaded from a checkpoint.
    ///
    /// Individuals that already carry a fitness are not re-evaluated.
    ///
    /// # Errors
    ///
    /// See [`EvolutionError`].
    pub fn run_from<E: Evaluator + ?Sized>(
        &self,
        population: Vec<Individual>,
        evaluator: &E,
    ) -> Result<Evolution, EvolutionError> {
        if population.is_empty() {
            return Err(EvolutionError::EmptyPopulation);
        }
        let mut rng = SmallRng::seed_from_u64(self.config.seed);
        self.evolve(population, evaluator, &mut rng)
    }

    /// Continue a checkpointed run up to the configured generation count.
    ///
    /// The RNG is reseeded from the configured seed and the checkpoint's
    /// generation, so a resumed run is reproducible but differs from an
    /// uninterrupted one. The hall of fame is rebuilt at the configured
    /// capacity from the stored members.
    ///
    /// # Errors
    ///
    /// Fails if the checkpoint cannot be loaded, does not fit this engine's
    /// primitive set, or was scored under other objective weights, or if the
    /// run itself fails.
    pub fn resume<E: Evaluator + ?Sized>(&self, path: &Path, evaluator: &E) -> Result<Evolution, EvolutionError> {
        let checkpoint = load_checkpoint(path, &self.pset)?;
        if checkpoint.population.is_empty() {
            return Err(EvolutionError::EmptyPopulation);
        }
        info!(
            "resuming `{}` from generation {}",
            self.pset.name(),
            checkpoint.generation
        );
        let expected = &self.config.weights;
        let foreign = checkpoint
            .population
            .iter()
            .chain(checkpoint.hall_of_fame.members())
            .filter_map(Individual::fitness)
            .map(Fitness::weights)
            .find(|found| !same_weights(found, expected));
        if let Some(found) = foreign {
            return Err(EvolutionError::CheckpointWeights {
                expected: expected.clone(),
                found: found.to_vec(),
            });
        }
        if checkpoint.hall_of_fame.capacity() != self.config.hall_of_fame {
            debug!(
                "hall of fame capacity {} -> {}",
                checkpoint.hall_of_fame.capacity(),
                self.config.hall_of_fame
            );
        }
        let mut hall_of_fame = HallOfFame::new(self.config.hall_of_fame);
        hall_of_fame.update(checkpoint.hall_of_fame.members());

        let mut rng = SmallRng::seed_from_u64(self.config.seed ^ checkpoint.generation as u64);
        let state = RunState {
            population: checkpoint.population,
            logbook: checkpoint.logbook,
            hall_of_fame,
        };
        self.generations(state, checkpoint.generation + 1, evaluator, &mut rng)
    }

    fn evolve<E: Evaluator + ?Sized>(
        &self,
        mut population: Vec<Individual>,
        evaluator: &E,
        rng: &mut SmallRng,
    ) -> Result<Evolution, EvolutionError> {
        let mut hall_of_fame = HallOfFame::new(self.config.hall_of_fame);
        let mut logbook = Logbook::for_statistics(&self.statistics);

        let nevals = self.evaluate(&mut population, evaluator)?;
        hall_of_fame.update(&population);
        self.record(&mut logbook, &population, 0, nevals, 0);

        let state = RunState {
            population,
            logbook,
            hall_of_fame,
        };
        self.generations(state, 1, evaluator, rng)
    }

    fn generations<E: Evaluator + ?Sized>(
        &self,
        mut state: RunState,
        first: usize,
        evaluator: &E,
        rng: &mut SmallRng,
    ) -> Result<Evolution, EvolutionError> {
        if first == 1 {
            self.save(&state, 0);
        }
        for generation in first..=self.config.generations {
            match self.config.strategy {
                Strategy::Simple => self.step_simple(&mut state, generation, evaluator, rng)?,
                Strategy::MuPlusLambda { lambda } => {
                    self.step_mu_plus_lambda(&mut state, generation, lambda, evaluator, rng)?;
                }
            }
            self.save(&state, generation);
        }
        Ok(Evolution {
            population: state.population,
            logbook: state.logbook,
            hall_of_fame: state.hall_of_fame,
        })
    }

    fn step_simple<E: Evaluator + ?Sized>(
        &self,
        state: &mut RunState,
        generation: usize,
        evaluator: &E,
        rng: &mut SmallRng,
    ) -> Result<(), EvolutionError> {
        let selection = Selection::Tournament {
            size: self.config.tournament_size,
        };
        let mut offspring = selection.select(&state.population, state.population.len(), rng)?;
        let reverts = self.vary_and(&mut offspring, rng);
        let nevals = self.evaluate(&mut offspring, evaluator)?;

        state.hall_of_fame.update(&offspring);
        self.record(&mut state.logbook, &offspring, generation, nevals, reverts);
        state.population = offspring;
        Ok(())
    }

    fn step_mu_plus_lambda<E: Evaluator + ?Sized>(
        &self,
        state: &mut RunState,
        generation: usize,
        lambda: usize,
        evaluator: &E,
        rng: &mut SmallRng,
    ) -> Result<(), EvolutionError> {
        let (mut offspring, reverts) = self.vary_or(&state.population, lambda, rng);
        let nevals = self.evaluate(&mut offspring, evaluator)?;

        let mut pool = std::mem::take(&mut state.population);
        pool.append(&mut offspring);
        // Archive and statistics see the whole pool, before truncation.
        state.hall_of_fame.update(&pool);
        self.record(&mut state.logbook, &pool, generation, nevals, reverts);
        state.population = select_best(&pool, self.config.population_size)?;
        Ok(())
    }

    /// Pairwise crossover then per-individual mutation, in place. Returns
    /// the number of height-limit reversions.
    fn vary_and(&self, offspring: &mut [Individual], rng: &mut SmallRng) -> usize {
        let limit = self.config.height_limit();
        let mut reverts = 0;
        for i in (1..offspring.len()).step_by(2) {
            if rng.gen_bool(self.config.cxpb) {
                let (first, second, n) = limit.mate(offspring[i - 1].tree(), offspring[i].tree(), rng);
                offspring[i - 1].set_tree(first);
                offspring[i].set_tree(second);
                reverts += n;
            }
        }
        for individual in offspring.iter_mut() {
            if rng.gen_bool(self.config.mutpb) {
                reverts += self.mutate(individual, &limit, rng);
            }
        }
        reverts
    }

    /// Breed `lambda` offspring, each by exactly one of crossover, mutation
    /// or cloning. Returns the offspring and the number of reversions.
    fn vary_or(&self, parents: &[Individual], lambda: usize, rng: &mut SmallRng) -> (Vec<Individual>, usize) {
        let limit = self.config.height_limit();
        let n = parents.len();
        let mut reverts = 0;
        let mut offspring = Vec::with_capacity(lambda);
        for _ in 0..lambda {
            let u: f64 = rng.r#gen();
            if u < self.config.cxpb && n >= 2 {
                let a = rng.gen_range(0..n);
                let mut b = rng.gen_range(0..n - 1);
                if b >= a {
                    b += 1;
                }
                let (child, _, r) = limit.mate(parents[a].tree(), parents[b].tree(), rng);
                reverts += r;
                offspring.push(Individual::new(child));
            } else if u < self.config.cxpb + self.config.mutpb {
                let mut child = parents[rng.gen_range(0..n)].clone();
                reverts += self.mutate(&mut child, &limit, rng);
                offspring.push(child);
            } else {
                offspring.push(parents[rng.gen_range(0..n)].clone());
            }
        }
        (offspring, reverts)
    }

    /// Mutate through the height limit. A failed subtree build leaves the
    /// individual as it was.
    fn mutate(&self, individual: &mut Individual, limit: &HeightLimit, rng: &mut SmallRng) -> usize {
        match limit.mutate(individual.tree(), &self.pset, &self.config.mutation, rng) {
            Ok((tree, reverted)) => {
                individual.set_tree(tree);
                usize::from(reverted)
            }
            Err(e) => {
                warn!("mutation could not build a subtree, keeping the parent: {e}");
                0
            }
        }
    }

    fn evaluate<E: Evaluator + ?Sized>(
        &self,
        population: &mut [Individual],
        evaluator: &E,
    ) -> Result<usize, EvolutionError> {
        evaluate_population(
            &self.pset,
            population,
            evaluator,
            &self.config.weights,
            self.config.parallel,
        )
    }

    fn record(&self, logbook: &mut Logbook, population: &[Individual], generation: usize, nevals: usize, reverts: usize) {
        let best = population
            .iter()
            .filter_map(Individual::fitness)
            .max_by(|a, b| a.compare(b))
            .map_or(f64::NAN, crate::gp::fitness::Fitness::primary);
        info!("gen {generation:>4}: nevals={nevals:<4} reverts={reverts:<3} best={best:.6}");
        logbook.push(GenerationRecord {
            generation,
            nevals,
            reverts,
            record: self.statistics.compile(population),
        });
    }

    fn save(&self, state: &RunState, generation: usize) {
        let Some(policy) = &self.config.checkpoint else {
            return;
        };
        if !generation.is_multiple_of(policy.interval) && generation != self.config.generations {
            return;
        }
        let checkpoint = Checkpoint {
            generation,
            seed: self.config.seed,
            population: state.population.clone(),
            hall_of_fame: state.hall_of_fame.clone(),
            logbook: state.logbook.clone(),
        };
        let path = checkpoint_path(&policy.dir, generation);
        match save_checkpoint(&checkpoint, &path) {
            Ok(()) => debug!("saved checkpoint {}", path.display()),
            Err(e) => warn!("failed to save checkpoint {}: {e}", path.display()),
        }
    }
}

fn same_weights(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}
