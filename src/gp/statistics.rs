//! Per-generation statistics and the logbook.
//!
//! A [`Statistics`] collector pairs named extractors (what to measure on an
//! individual) with named reducers (how to fold the measurements). Every
//! extractor is reduced by every reducer, giving one scalar per
//! `(metric, reducer)` pair per generation.
//!
//! ```text
//!   population ──► extractor ──► [f64] ──► reducer ──► Record["fitness"]["min"]
//! ```

#![allow(clippy::cast_precision_loss)]

use crate::gp::fitness::Individual;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Measures one scalar on an individual.
pub trait Extractor: Send + Sync {
    /// The measurement, or `None` to skip this individual.
    fn extract(&self, individual: &Individual) -> Option<f64>;
}

impl<F> Extractor for F
where
    F: Fn(&Individual) -> Option<f64> + Send + Sync,
{
    fn extract(&self, individual: &Individual) -> Option<f64> {
        self(individual)
    }
}

/// Folds a sequence of measurements into one scalar.
pub trait Reducer: Send + Sync {
    /// Reduce `values`. Called with an empty slice when nothing was
    /// measured.
    fn reduce(&self, values: &[f64]) -> f64;
}

impl<F> Reducer for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn reduce(&self, values: &[f64]) -> f64 {
        self(values)
    }
}

/// First objective value; skips unevaluated individuals.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitnessValue;

impl Extractor for FitnessValue {
    fn extract(&self, individual: &Individual) -> Option<f64> {
        individual.fitness().map(crate::gp::fitness::Fitness::primary)
    }
}

/// Node count.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSize;

impl Extractor for TreeSize {
    fn extract(&self, individual: &Individual) -> Option<f64> {
        Some(individual.size() as f64)
    }
}

/// Tree height.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeHeight;

impl Extractor for TreeHeight {
    fn extract(&self, individual: &Individual) -> Option<f64> {
        Some(individual.height() as f64)
    }
}

/// Arithmetic mean. NaN for no input.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

impl Reducer for Mean {
    fn reduce(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation (divides by `n`). NaN for no input.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDev;

impl Reducer for StdDev {
    fn reduce(&self, values: &[f64]) -> f64 {
        let mean = Mean.reduce(values);
        if mean.is_nan() {
            return f64::NAN;
        }
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        var.sqrt()
    }
}

/// Smallest value. NaN for no input.
#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

impl Reducer for Min {
    fn reduce(&self, values: &[f64]) -> f64 {
        values.iter().copied().reduce(f64::min).unwrap_or(f64::NAN)
    }
}

/// Largest value. NaN for no input.
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl Reducer for Max {
    fn reduce(&self, values: &[f64]) -> f64 {
        values.iter().copied().reduce(f64::max).unwrap_or(f64::NAN)
    }
}

/// Reduced values of one generation: `metric -> reducer -> value`.
pub type Record = BTreeMap<String, BTreeMap<String, f64>>;

/// Collector of named metrics and reducers.
#[derive(Clone, Default)]
pub struct Statistics {
    metrics: Vec<(String, Arc<dyn Extractor>)>,
    reducers: Vec<(String, Arc<dyn Reducer>)>,
}

impl fmt::Debug for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metrics: Vec<&str> = self.metrics.iter().map(|(n, _)| n.as_str()).collect();
        let reducers: Vec<&str> = self.reducers.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("Statistics")
            .field("metrics", &metrics)
            .field("reducers", &reducers)
            .finish()
    }
}

impl Statistics {
    /// Empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fitness and size, each with mean, std, min and max.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .metric("fitness", FitnessValue)
            .metric("size", TreeSize)
            .reducer("avg", Mean)
            .reducer("std", StdDev)
            .reducer("min", Min)
            .reducer("max", Max)
    }

    /// Add a named metric. A repeated name replaces the earlier one.
    #[must_use]
    pub fn metric(mut self, name: &str, extractor: impl Extractor + 'static) -> Self {
        self.metrics.retain(|(n, _)| n != name);
        self.metrics.push((name.to_owned(), Arc::new(extractor)));
        self
    }

    /// Add a named reducer. A repeated name replaces the earlier one.
    #[must_use]
    pub fn reducer(mut self, name: &str, reducer: impl Reducer + 'static) -> Self {
        self.reducers.retain(|(n, _)| n != name);
        self.reducers.push((name.to_owned(), Arc::new(reducer)));
        self
    }

    /// Reduce every metric over `population`.
    #[must_use]
    pub fn compile(&self, population: &[Individual]) -> Record {
        let mut record = Record::new();
        for (metric, extractor) in &self.metrics {
            let values: Vec<f64> = population.iter().filter_map(|ind| extractor.extract(ind)).collect();
            let row = self
                .reducers
                .iter()
                .map(|(name, reducer)| (name.clone(), reducer.reduce(&values)))
                .collect();
            record.insert(metric.clone(), row);
        }
        record
    }

    /// Metric names in registration order.
    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|(n, _)| n.as_str())
    }

    /// Reducer names in registration order.
    pub fn reducer_names(&self) -> impl Iterator<Item = &str> {
        self.reducers.iter().map(|(n, _)| n.as_str())
    }
}

/// One logbook row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Generation index; 0 is the initial population.
    pub generation: usize,
    /// Fitness evaluations made in this generation.
    pub nevals: usize,
    /// Offspring reverted by the height limit in this generation.
    pub reverts: usize,
    /// Reduced statistics.
    #[serde(with = "crate::gp::float_repr::record")]
    pub record: Record,
}

/// Generation-indexed statistics log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Logbook {
    metrics: Vec<String>,
    reducers: Vec<String>,
    records: Vec<GenerationRecord>,
}

impl Logbook {
    /// Empty logbook whose table layout follows `stats`.
    #[must_use]
    pub fn for_statistics(stats: &Statistics) -> Self {
        Self {
            metrics: stats.metric_names().map(str::to_owned).collect(),
            reducers: stats.reducer_names().map(str::to_owned).collect(),
            records: Vec::new(),
        }
    }

    /// Append a row.
    pub fn push(&mut self, record: GenerationRecord) {
        self.records.push(record);
    }

    /// All rows in order.
    #[must_use]
    pub fn records(&self) -> &[GenerationRecord] {
        &self.records
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Value of `reducer` over `metric` at `generation`.
    #[must_use]
    pub fn get(&self, generation: usize, metric: &str, reducer: &str) -> Option<f64> {
        self.records
            .iter()
            .find(|r| r.generation == generation)
            .and_then(|r| r.record.get(metric))
            .and_then(|row| row.get(reducer))
            .copied()
    }

    /// One reducer over one metric across all generations.
    #[must_use]
    pub fn series(&self, metric: &str, reducer: &str) -> Vec<f64> {
        self.records
            .iter()
            .map(|r| {
                r.record
                    .get(metric)
                    .and_then(|row| row.get(reducer))
                    .copied()
                    .unwrap_or(f64::NAN)
            })
            .collect()
    }
}

impl fmt::Display for Logbook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5} {:>6} {:>7}", "gen", "nevals", "reverts")?;
        for metric in &self.metrics {
            for reducer in &self.reducers {
                write!(f, " {:>12}", format!("{metric}.{reducer}"))?;
            }
        }
        writeln!(f)?;
        for row in &self.records {
            write!(f, "{:>5} {:>6} {:>7}", row.generation, row.nevals, row.reverts)?;
            for metric in &self.metrics {
                for reducer in &self.reducers {
                    let value = row
                        .record
                        .get(metric)
                        .and_then(|r| r.get(reducer))
                        .copied()
                        .unwrap_or(f64::NAN);
                    write!(f, " {value:>12.4}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::fitness::Fitness;
    use crate::gp::primitives::PrimitiveSet;
    use crate::gp::tree::Tree;
    use crate::gp::value::Type;

    fn population() -> Vec<Individual> {
        let mut pset = PrimitiveSet::new("MAIN", [Type::Float], Type::Float);
        pset.add_unary("neg", |x: f64| -x).unwrap();
        let sources = ["ARG0", "neg(ARG0)", "neg(neg(ARG0))"];
        sources
            .iter()
            .zip([1.0, 2.0, 3.0])
            .map(|(src, err)| {
                let mut ind = Individual::new(Tree::parse(&pset, src).unwrap());
                ind.set_fitness(Fitness::new(vec![err], &[-1.0]));
                ind
            })
            .collect()
    }

    #[test]
    fn test_builtin_reducers() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((Mean.reduce(&values) - 5.0).abs() < 1e-12);
        assert!((StdDev.reduce(&values) - 2.0).abs() < 1e-12);
        assert!((Min.reduce(&values) - 2.0).abs() < 1e-12);
        assert!((Max.reduce(&values) - 9.0).abs() < 1e-12);
        assert!(Mean.reduce(&[]).is_nan());
        assert!(StdDev.reduce(&[]).is_nan());
        assert!(Min.reduce(&[]).is_nan());
        assert!(Max.reduce(&[]).is_nan());
    }

    #[test]
    fn test_standard_record() {
        let pop = population();
        let record = Statistics::standard().compile(&pop);
        assert!((record["fitness"]["avg"] - 2.0).abs() < 1e-12);
        assert!((record["fitness"]["min"] - 1.0).abs() < 1e-12);
        assert!((record["size"]["max"] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unevaluated_skipped() {
        let mut pop = population();
        pop[0].invalidate();
        let record = Statistics::standard().compile(&pop);
        assert!((record["fitness"]["avg"] - 2.5).abs() < 1e-12);
        // Size still counts all three.
        assert!((record["size"]["avg"] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_closure_metric_and_reducer() {
        let pop = population();
        let stats = Statistics::new()
            .metric("height", |ind: &Individual| Some(ind.height() as f64))
            .reducer("sum", |v: &[f64]| v.iter().sum::<f64>());
        let record = stats.compile(&pop);
        assert!((record["height"]["sum"] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_logbook_lookup_and_table() {
        let pop = population();
        let stats = Statistics::standard();
        let mut log = Logbook::for_statistics(&stats);
        for generation in 0..3 {
            log.push(GenerationRecord {
                generation,
                nevals: 3,
                reverts: 0,
                record: stats.compile(&pop),
            });
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.get(2, "fitness", "min"), Some(1.0));
        assert_eq!(log.get(3, "fitness", "min"), None);
        assert_eq!(log.series("size", "max"), vec![3.0, 3.0, 3.0]);

        let table = log.to_string();
        assert_eq!(table.lines().count(), 4);
        assert!(table.starts_with("  gen nevals reverts"));
        assert!(table.contains("fitness.avg"));
    }
}
