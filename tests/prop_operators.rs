//! Property-based tests for tree generation and the variation operators.
//!
//! Every operator must keep trees well typed for any seed.
//! Run with: cargo test --release prop_operators

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand::rngs::SmallRng;

use arbor::gp::{
    BloatPolicy, Generation, HeightLimit, PrimitiveSet, Tree, Type, Value, cx_one_point, gen_full, gen_grow,
    gen_half_and_half, mut_uniform,
};

/// Two types, each with primitives and terminals, plus an ephemeral.
fn pset() -> PrimitiveSet {
    let mut pset = PrimitiveSet::new("MAIN", [Type::Int, Type::Float], Type::Float);
    pset.add_binary("addFloat", |a: f64, b: f64| a + b).unwrap();
    pset.add_binary("mulFloat", |a: f64, b: f64| a * b).unwrap();
    pset.add_binary("addInt", i64::wrapping_add).unwrap();
    pset.add_unary("int_to_float", |i: i64| i as f64).unwrap();
    pset.add_unary("round", |x: f64| x.round() as i64).unwrap();
    pset.add_terminal("ten", 10_i64).unwrap();
    pset.add_ephemeral("rand", Type::Float, |rng| {
        Value::Float(f64::from(rng.next_u32() % 100) / 10.0)
    })
    .unwrap();
    pset.rename_argument(0, "i").unwrap();
    pset.rename_argument(1, "x").unwrap();
    pset
}

fn random_tree(pset: &PrimitiveSet, max: usize, rng: &mut SmallRng) -> Tree {
    gen_half_and_half(pset, pset.output(), 0, max, rng).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Full trees have every leaf at the drawn depth.
    #[test]
    fn prop_full_height_is_exact(depth in 0usize..6, seed in any::<u64>()) {
        let pset = pset();
        let mut rng = SmallRng::seed_from_u64(seed);
        let tree = gen_full(&pset, Type::Float, depth, depth, &mut rng).unwrap();
        prop_assert_eq!(tree.height(), depth);
        prop_assert!(pset.validate(&tree).is_ok());
    }

    /// Grown trees stay within the depth range and validate.
    #[test]
    fn prop_grow_height_bounded(min in 0usize..3, extra in 0usize..4, seed in any::<u64>()) {
        let pset = pset();
        let mut rng = SmallRng::seed_from_u64(seed);
        let tree = gen_grow(&pset, Type::Float, min, min + extra, &mut rng).unwrap();
        prop_assert!(tree.height() <= min + extra);
        prop_assert!(pset.validate(&tree).is_ok());
        prop_assert_eq!(tree.root_type(), Type::Float);
    }

    /// Crossover offspring validate and conserve the node count.
    #[test]
    fn prop_crossover_well_typed(seed in any::<u64>()) {
        let pset = pset();
        let mut rng = SmallRng::seed_from_u64(seed);
        let a = random_tree(&pset, 4, &mut rng);
        let b = random_tree(&pset, 4, &mut rng);
        let (c1, c2) = cx_one_point(&a, &b, &mut rng);
        prop_assert!(pset.validate(&c1).is_ok());
        prop_assert!(pset.validate(&c2).is_ok());
        prop_assert_eq!(c1.size() + c2.size(), a.size() + b.size());
    }

    /// Mutants validate and keep the root type.
    #[test]
    fn prop_mutation_well_typed(seed in any::<u64>(), max in 0usize..4) {
        let pset = pset();
        let mut rng = SmallRng::seed_from_u64(seed);
        let tree = random_tree(&pset, 4, &mut rng);
        let mutant = mut_uniform(&tree, &pset, &Generation::Grow { min: 0, max }, &mut rng).unwrap();
        prop_assert!(pset.validate(&mutant).is_ok());
        prop_assert_eq!(mutant.root_type(), tree.root_type());
    }

    /// Under the limit an offspring is either small enough or a parent clone.
    #[test]
    fn prop_height_limit_reverts(seed in any::<u64>(), max_height in 1usize..5) {
        let pset = pset();
        let mut rng = SmallRng::seed_from_u64(seed);
        let a = random_tree(&pset, 5, &mut rng);
        let b = random_tree(&pset, 5, &mut rng);
        let limit = HeightLimit { max_height, policy: BloatPolicy::RevertToRandomParent };

        let (c1, c2, reverts) = limit.mate(&a, &b, &mut rng);
        let mut reverted = 0;
        for child in [&c1, &c2] {
            prop_assert!(child.height() <= max_height || *child == a || *child == b);
            if child.height() > max_height {
                reverted += 1;
            }
        }
        prop_assert!(reverts >= reverted);

        let (mutant, _) = limit
            .mutate(&a, &pset, &Generation::Full { min: 0, max: 3 }, &mut rng)
            .unwrap();
        prop_assert!(mutant.height() <= max_height || mutant == a);
    }

    /// Rendered trees parse back to the same tree.
    #[test]
    fn prop_render_parse(seed in any::<u64>()) {
        let pset = pset();
        let mut rng = SmallRng::seed_from_u64(seed);
        let tree = random_tree(&pset, 4, &mut rng);
        let text = tree.render(&pset);
        let parsed = Tree::parse(&pset, &text).unwrap();
        prop_assert_eq!(parsed.render(&pset), text);
    }
}

#[test]
fn test_crossover_without_type_match_is_noop() {
    let pset = pset();
    // The only non-root node of `a` is an Int; `b` has no non-root Int.
    let a = Tree::parse(&pset, "int_to_float(i)").unwrap();
    let b = Tree::parse(&pset, "addFloat(x, x)").unwrap();
    for seed in 0..50 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let (c1, c2) = cx_one_point(&a, &b, &mut rng);
        assert_eq!(c1, a);
        assert_eq!(c2, b);
    }
}

#[test]
fn test_crossover_single_node_parent_is_noop() {
    let pset = pset();
    let a = Tree::parse(&pset, "x").unwrap();
    let b = Tree::parse(&pset, "mulFloat(x, int_to_float(ten))").unwrap();
    let mut rng = SmallRng::seed_from_u64(1);
    let (c1, c2) = cx_one_point(&a, &b, &mut rng);
    assert_eq!((c1, c2), (a, b));
}
