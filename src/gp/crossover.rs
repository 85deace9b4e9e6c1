//! Subtree crossover.
//!
//! One-point crossover swaps a subtree of one parent with a subtree of the
//! same output type from the other parent. The root is never a crossover
//! point, since swapping whole trees would only clone the parents.

use crate::gp::tree::Tree;
use rand::Rng;

/// One-point subtree crossover.
///
/// Picks a non-root node uniformly in `first`, then a non-root node of the
/// same type uniformly in `second`, and swaps the two subtrees. Returns the
/// two offspring in parent order.
///
/// If either parent has fewer than two nodes, or `second` has no non-root
/// node of the chosen type, the parents are returned unchanged.
#[must_use]
pub fn cx_one_point<R: Rng>(first: &Tree, second: &Tree, rng: &mut R) -> (Tree, Tree) {
    if first.size() < 2 || second.size() < 2 {
        return (first.clone(), second.clone());
    }

    let index1 = rng.gen_range(1..first.size());
    let ty = first.nodes()[index1].ty();
    let matches = second.positions_of(ty);
    if matches.is_empty() {
        return (first.clone(), second.clone());
    }
    let index2 = matches[rng.gen_range(0..matches.len())];

    let range1 = first.subtree(index1);
    let range2 = second.subtree(index2);
    let child1 = first.splice(range1.clone(), &second.nodes()[range2.clone()]);
    let child2 = second.splice(range2, &first.nodes()[range1]);
    (child1, child2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::primitives::PrimitiveSet;
    use crate::gp::value::Type;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn pset() -> PrimitiveSet {
        let mut pset = PrimitiveSet::new("MAIN", [Type::Int, Type::Float], Type::Float);
        pset.add_binary("addFloat", |a: f64, b: f64| a + b).unwrap();
        pset.add_binary("mulFloat", |a: f64, b: f64| a * b).unwrap();
        pset.add_binary("addInt", i64::wrapping_add).unwrap();
        pset.add_unary("int_to_float", |i: i64| i as f64).unwrap();
        pset.rename_argument(0, "i").unwrap();
        pset.rename_argument(1, "x").unwrap();
        pset
    }

    #[test]
    fn test_offspring_are_well_typed() {
        let pset = pset();
        let a = Tree::parse(&pset, "addFloat(int_to_float(addInt(i, i)), x)").unwrap();
        let b = Tree::parse(&pset, "mulFloat(x, int_to_float(i))").unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..100 {
            let (c1, c2) = cx_one_point(&a, &b, &mut rng);
            pset.validate(&c1).unwrap();
            pset.validate(&c2).unwrap();
            // Swapping conserves the total node count.
            assert_eq!(c1.size() + c2.size(), a.size() + b.size());
        }
    }

    #[test]
    fn test_single_node_parent_is_noop() {
        let pset = pset();
        let a = Tree::parse(&pset, "x").unwrap();
        let b = Tree::parse(&pset, "mulFloat(x, x)").unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let (c1, c2) = cx_one_point(&a, &b, &mut rng);
        assert_eq!(c1, a);
        assert_eq!(c2, b);
        let (c2, c1) = cx_one_point(&b, &a, &mut rng);
        assert_eq!(c1, a);
        assert_eq!(c2, b);
    }

    #[test]
    fn test_no_common_type_is_noop() {
        let pset = pset();
        // Every non-root node of `a` is an int subtree, `b` has only floats.
        let a = Tree::parse(&pset, "int_to_float(addInt(i, i))").unwrap();
        let b = Tree::parse(&pset, "addFloat(x, x)").unwrap();
        let mut rng = SmallRng::seed_from_u64(9);
        for _ in 0..20 {
            let (c1, c2) = cx_one_point(&a, &b, &mut rng);
            assert_eq!(c1, a);
            assert_eq!(c2, b);
        }
    }
}
