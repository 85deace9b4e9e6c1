//! Evolve `float(i) + x` from integer and float building blocks.
//!
//! Usage: `cargo run --release --example number_io [config.json]`
//!
//! The optional JSON file overrides any `EvolutionConfig` field, e.g.
//! `{"population_size": 500, "strategy": {"MuPlusLambda": {"lambda": 1000}}}`.
//! Set `RUST_LOG=info` for per-generation progress.

#![allow(clippy::print_stdout, clippy::print_stderr)]
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use std::error::Error;
use std::fs;

use arbor::EvalError;
use arbor::gp::{CompiledTree, Engine, EvolutionConfig, PrimitiveSet, Type, Value, protected_div, protected_div_int};

fn number_io() -> Result<PrimitiveSet, Box<dyn Error>> {
    let mut pset = PrimitiveSet::new("MAIN", [Type::Int, Type::Float], Type::Float);
    pset.add_binary("addInt", i64::wrapping_add)?;
    pset.add_binary("subInt", i64::wrapping_sub)?;
    pset.add_binary("mulInt", i64::wrapping_mul)?;
    pset.add_binary("divInt", protected_div_int)?;
    pset.add_binary("addFloat", |a: f64, b: f64| a + b)?;
    pset.add_binary("subFloat", |a: f64, b: f64| a - b)?;
    pset.add_binary("mulFloat", |a: f64, b: f64| a * b)?;
    pset.add_binary("divFloat", protected_div)?;
    pset.add_unary("int_to_float", |i: i64| i as f64)?;
    pset.add_primitive("float_to_int", [Type::Float], Type::Int, |args| {
        let x = arbor::gp::operand::<f64>("float_to_int", args, 0)?;
        if x.is_finite() && x.abs() < 9.0e18 {
            Ok(Value::Int(x as i64))
        } else {
            Err(EvalError::Domain {
                primitive: "float_to_int".into(),
                reason: format!("{x} has no integer value"),
            })
        }
    })?;
    pset.add_unary("sqrFloat", |x: f64| x * x)?;
    pset.add_unary("cos", f64::cos)?;
    pset.add_unary("sin", f64::sin)?;
    pset.rename_argument(0, "i")?;
    pset.rename_argument(1, "x")?;
    Ok(pset)
}

/// Mean squared error over a fixed grid; failed evaluations score infinity.
fn error(program: &CompiledTree<'_>) -> Vec<f64> {
    let points: Vec<(i64, f64)> = (0..50_i32)
        .map(|k| (i64::from(k * 13 % 101 - 50), f64::from(k) * 0.37 - 9.0))
        .collect();
    let total: f64 = points
        .iter()
        .map(|&(i, x)| match program.call(&[Value::Int(i), Value::Float(x)]) {
            Ok(Value::Float(y)) => (y - (i as f64 + x)).powi(2),
            _ => f64::INFINITY,
        })
        .sum();
    vec![total / points.len() as f64]
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config: EvolutionConfig = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => EvolutionConfig::default(),
    };

    let engine = Engine::new(number_io()?, config)?;
    let evolution = engine.run(&error)?;

    println!("{}", evolution.logbook);
    println!();
    for (rank, individual) in evolution.hall_of_fame.members().iter().enumerate() {
        let fitness = individual.fitness().map_or(f64::NAN, |f| f.primary());
        println!(
            "#{:<2} mse={fitness:<12.6} height={:<2} {}",
            rank + 1,
            individual.height(),
            individual.tree().render(engine.pset())
        );
    }
    Ok(())
}
