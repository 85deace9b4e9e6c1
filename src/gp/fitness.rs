//! Fitness, individuals and population evaluation.
//!
//! Fitness is a tuple of objective values with one weight per objective.
//! Negative weights minimise, positive weights maximise. Individuals cache
//! their fitness until their tree changes, so each one is evaluated once.
//!
//! Evaluation runs on the rayon pool when enabled. The RNG is never used
//! while evaluating, so parallel and sequential runs give identical results.

use crate::gp::compiler::CompiledTree;
use crate::gp::evolution::EvolutionError;
use crate::gp::primitives::PrimitiveSet;
use crate::gp::tree::Tree;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Scores a compiled program.
///
/// The evaluator owns its training data. Evaluation errors raised by the
/// program must be turned into a penalty value here; the engine only sees
/// the returned objectives.
pub trait Evaluator: Sync {
    /// Objective values for `program`, one per configured weight.
    fn evaluate(&self, program: &CompiledTree<'_>) -> Vec<f64>;
}

impl<F> Evaluator for F
where
    F: Fn(&CompiledTree<'_>) -> Vec<f64> + Sync,
{
    fn evaluate(&self, program: &CompiledTree<'_>) -> Vec<f64> {
        self(program)
    }
}

/// Weighted multi-objective fitness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fitness {
    #[serde(with = "crate::gp::float_repr::vec")]
    values: Vec<f64>,
    weights: Vec<f64>,
}

impl Fitness {
    /// Pair objective values with their weights.
    #[must_use]
    pub fn new(values: Vec<f64>, weights: &[f64]) -> Self {
        Self {
            values,
            weights: weights.to_vec(),
        }
    }

    /// Raw objective values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Objective weights.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// First objective value, or NaN if there is none.
    #[must_use]
    pub fn primary(&self) -> f64 {
        self.values.first().copied().unwrap_or(f64::NAN)
    }

    /// Lexicographic comparison of `value * weight`. `Greater` means
    /// `self` is fitter. A NaN weighted value is worse than any number.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        let ours = self.values.iter().zip(&self.weights).map(|(v, w)| v * w);
        let theirs = other.values.iter().zip(&other.weights).map(|(v, w)| v * w);
        for (a, b) in ours.zip(theirs) {
            let ord = match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Whether `self` is strictly fitter than `other`.
    #[must_use]
    pub fn is_better_than(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Greater
    }
}

/// One candidate program and its cached fitness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    tree: Tree,
    fitness: Option<Fitness>,
    #[serde(skip)]
    height: OnceLock<usize>,
}

impl Individual {
    /// Wrap an unevaluated tree.
    #[must_use]
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            fitness: None,
            height: OnceLock::new(),
        }
    }

    /// Program tree.
    #[must_use]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Replace the tree, dropping the fitness and cached height.
    pub fn set_tree(&mut self, tree: Tree) {
        self.tree = tree;
        self.fitness = None;
        self.height = OnceLock::new();
    }

    /// Cached fitness, if evaluated.
    #[must_use]
    pub fn fitness(&self) -> Option<&Fitness> {
        self.fitness.as_ref()
    }

    /// Whether a fitness is cached.
    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// Store a fitness.
    pub fn set_fitness(&mut self, fitness: Fitness) {
        self.fitness = Some(fitness);
    }

    /// Drop the cached fitness.
    pub fn invalidate(&mut self) {
        self.fitness = None;
    }

    /// Tree height, computed on first use.
    #[must_use]
    pub fn height(&self) -> usize {
        *self.height.get_or_init(|| self.tree.height())
    }

    /// Tree size.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }
}

// The height cache is derived state and takes no part in equality.
impl PartialEq for Individual {
    fn eq(&self, other: &Self) -> bool {
        self.tree == other.tree && self.fitness == other.fitness
    }
}

impl From<Tree> for Individual {
    fn from(tree: Tree) -> Self {
        Self::new(tree)
    }
}

/// Compare two individuals by fitness; unevaluated ones rank lowest.
pub(crate) fn compare_individuals(a: &Individual, b: &Individual) -> Ordering {
    match (a.fitness(), b.fitness()) {
        (Some(fa), Some(fb)) => fa.compare(fb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Evaluate every individual lacking a fitness. Returns how many were
/// evaluated.
///
/// # Errors
///
/// Fails if a tree does not compile against `pset`, or the evaluator
/// returns a different number of objectives than `weights`.
pub fn evaluate_population<E: Evaluator + ?Sized>(
    pset: &PrimitiveSet,
    population: &mut [Individual],
    evaluator: &E,
    weights: &[f64],
    parallel: bool,
) -> Result<usize, EvolutionError> {
    let score = |ind: &mut Individual| -> Result<usize, EvolutionError> {
        if ind.is_evaluated() {
            return Ok(0);
        }
        let program = pset.compile(ind.tree())?;
        let values = evaluator.evaluate(&program);
        if values.len() != weights.len() {
            return Err(EvolutionError::FitnessArity {
                expected: weights.len(),
                found: values.len(),
            });
        }
        ind.set_fitness(Fitness::new(values, weights));
        Ok(1)
    };

    if parallel {
        population.par_iter_mut().map(score).sum()
    } else {
        population.iter_mut().map(score).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::value::{Type, Value};

    #[test]
    fn test_minimising_weight() {
        let weights = [-1.0];
        let low = Fitness::new(vec![0.5], &weights);
        let high = Fitness::new(vec![2.0], &weights);
        assert!(low.is_better_than(&high));
        assert!(!high.is_better_than(&low));
        assert_eq!(low.compare(&low.clone()), Ordering::Equal);
    }

    #[test]
    fn test_lexicographic_objectives() {
        let weights = [1.0, -1.0];
        let a = Fitness::new(vec![3.0, 10.0], &weights);
        let b = Fitness::new(vec![3.0, 5.0], &weights);
        let c = Fitness::new(vec![4.0, 100.0], &weights);
        assert!(b.is_better_than(&a));
        assert!(c.is_better_than(&b));
    }

    #[test]
    fn test_nan_is_worst() {
        let weights = [-1.0];
        let nan = Fitness::new(vec![f64::NAN], &weights);
        let huge = Fitness::new(vec![f64::MAX], &weights);
        assert!(huge.is_better_than(&nan));
        assert_eq!(nan.compare(&nan.clone()), Ordering::Equal);
    }

    #[test]
    fn test_set_tree_invalidates() {
        let mut pset = PrimitiveSet::new("MAIN", [Type::Float], Type::Float);
        pset.add_unary("neg", |x: f64| -x).unwrap();
        let mut ind = Individual::new(Tree::parse(&pset, "neg(ARG0)").unwrap());
        assert_eq!(ind.height(), 1);
        ind.set_fitness(Fitness::new(vec![1.0], &[-1.0]));
        assert!(ind.is_evaluated());

        ind.set_tree(Tree::parse(&pset, "neg(neg(ARG0))").unwrap());
        assert!(!ind.is_evaluated());
        assert_eq!(ind.height(), 2);
    }

    #[test]
    fn test_evaluate_population_counts_and_checks_arity() {
        let mut pset = PrimitiveSet::new("MAIN", [Type::Float], Type::Float);
        pset.add_unary("neg", |x: f64| -x).unwrap();
        let tree = Tree::parse(&pset, "neg(ARG0)").unwrap();
        let mut pop = vec![Individual::new(tree.clone()), Individual::new(tree)];
        pop[1].set_fitness(Fitness::new(vec![0.0], &[-1.0]));

        let evaluator = |program: &CompiledTree<'_>| {
            let out = program.call(&[Value::Float(2.0)]).map_or(f64::NAN, |v| {
                v.as_float().unwrap_or(f64::NAN)
            });
            vec![out]
        };
        let nevals = evaluate_population(&pset, &mut pop, &evaluator, &[-1.0], true).unwrap();
        assert_eq!(nevals, 1);
        assert_eq!(pop[0].fitness().unwrap().values(), &[-2.0]);

        pop[0].invalidate();
        let err = evaluate_population(&pset, &mut pop, &evaluator, &[-1.0, 1.0], false).unwrap_err();
        assert!(matches!(err, EvolutionError::FitnessArity { expected: 2, found: 1 }));
    }
}
