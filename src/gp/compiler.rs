//! Turning a tree into a callable program.
//!
//! A compiled tree borrows its primitive set and evaluates the prefix node
//! sequence right to left with a value stack. No source text is generated
//! and nothing is evaluated dynamically.

use crate::error::{EvalError, EvalResult};
use crate::gp::primitives::{PrimitiveSet, TerminalKind};
use crate::gp::tree::{Node, Tree, TreeError};
use crate::gp::value::{Type, Value};

impl PrimitiveSet {
    /// Check that `tree` is well typed against this set.
    ///
    /// Every node must reference a registered entry with a matching schema,
    /// every child's type must equal the input its parent declares at that
    /// position, and the root must produce the set's output type.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, scanning in prefix order.
    pub fn validate(&self, tree: &Tree) -> Result<(), TreeError> {
        // Stack of input types still owed, the last entry is the next child.
        let mut expected: Vec<Type> = vec![self.output()];
        for (index, node) in tree.nodes().iter().enumerate() {
            let Some(want) = expected.pop() else {
                return Err(TreeError::TrailingNodes(index));
            };
            self.check_node(index, node)?;
            if node.ty() != want {
                return Err(TreeError::TypeMismatch {
                    index,
                    expected: want,
                    found: node.ty(),
                });
            }
            if let Node::Primitive { id, .. } = node {
                if let Some(prim) = self.primitive(*id) {
                    expected.extend(prim.inputs().iter().rev());
                }
            }
        }
        if expected.is_empty() {
            Ok(())
        } else {
            Err(TreeError::Truncated)
        }
    }

    fn check_node(&self, index: usize, node: &Node) -> Result<(), TreeError> {
        let mismatch = |reason: String| TreeError::Registry { index, reason };
        match node {
            Node::Primitive { id, arity, ret } => {
                let prim = self
                    .primitive(*id)
                    .ok_or_else(|| mismatch(format!("no primitive with id {id}")))?;
                if prim.arity() != *arity || prim.output() != *ret {
                    return Err(mismatch(format!("schema of `{}` differs", prim.name())));
                }
            }
            Node::Argument { id, index: arg, ret } => {
                let term = self
                    .terminal(*id)
                    .ok_or_else(|| mismatch(format!("no terminal with id {id}")))?;
                let matches =
                    matches!(term.kind(), TerminalKind::Argument(i) if i == arg) && term.ty() == *ret;
                if !matches {
                    return Err(mismatch(format!("`{}` is not argument {arg}", term.name())));
                }
            }
            Node::Constant { id, value } => {
                let term = self
                    .terminal(*id)
                    .ok_or_else(|| mismatch(format!("no terminal with id {id}")))?;
                let matches = match term.kind() {
                    TerminalKind::Constant(fixed) => fixed == value,
                    TerminalKind::Ephemeral(_) => term.ty() == value.ty(),
                    TerminalKind::Argument(_) => false,
                };
                if !matches {
                    return Err(mismatch(format!("`{}` cannot hold {value}", term.name())));
                }
            }
        }
        Ok(())
    }

    /// Compile `tree` into a callable taking this set's root arguments.
    ///
    /// # Errors
    ///
    /// Fails if the tree does not validate against this set.
    pub fn compile<'a>(&'a self, tree: &'a Tree) -> Result<CompiledTree<'a>, TreeError> {
        self.validate(tree)?;
        Ok(CompiledTree { pset: self, tree })
    }
}

/// A validated tree bound to its primitive set.
///
/// Calling it is pure: the same arguments always produce the same result,
/// and ephemeral constants were frozen when the tree was built.
#[derive(Debug, Clone, Copy)]
pub struct CompiledTree<'a> {
    pset: &'a PrimitiveSet,
    tree: &'a Tree,
}

impl CompiledTree<'_> {
    /// Underlying tree.
    #[must_use]
    pub fn tree(&self) -> &Tree {
        self.tree
    }

    /// Evaluate with positional root arguments.
    ///
    /// # Errors
    ///
    /// Fails if the argument count or types differ from the set's declared
    /// inputs, or if a primitive reports an error.
    pub fn call(&self, args: &[Value]) -> EvalResult<Value> {
        let inputs = self.pset.inputs();
        if args.len() != inputs.len() {
            return Err(EvalError::ArgumentCount {
                expected: inputs.len(),
                found: args.len(),
            });
        }
        for (index, (arg, &ty)) in args.iter().zip(inputs).enumerate() {
            if arg.ty() != ty {
                return Err(EvalError::ArgumentType {
                    index,
                    expected: ty,
                    found: arg.ty(),
                });
            }
        }

        let mut stack: Vec<Value> = Vec::with_capacity(self.tree.size());
        for node in self.tree.nodes().iter().rev() {
            let value = match node {
                Node::Argument { index, .. } => args[*index].clone(),
                Node::Constant { value, .. } => value.clone(),
                Node::Primitive { id, arity, .. } => {
                    let Some(prim) = self.pset.primitive(*id) else {
                        unreachable!("compiled trees are validated");
                    };
                    // Children sit on top of the stack, first child last.
                    let split = stack.len() - arity;
                    let mut operands = stack.split_off(split);
                    operands.reverse();
                    let result = prim.apply(&operands)?;
                    if result.ty() != prim.output() {
                        return Err(EvalError::ReturnType {
                            primitive: prim.name().to_owned(),
                            expected: prim.output(),
                            found: result.ty(),
                        });
                    }
                    result
                }
            };
            stack.push(value);
        }
        stack.pop().ok_or(EvalError::ArgumentCount {
            expected: 1,
            found: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::primitives::protected_div;

    fn number_io_set() -> PrimitiveSet {
        let mut pset = PrimitiveSet::new("MAIN", [Type::Int, Type::Float], Type::Float);
        pset.add_binary("addFloat", |a: f64, b: f64| a + b).unwrap();
        pset.add_binary("subFloat", |a: f64, b: f64| a - b).unwrap();
        pset.add_binary("divFloat", protected_div).unwrap();
        pset.add_unary("int_to_float", |i: i64| i as f64).unwrap();
        pset.rename_argument(0, "i").unwrap();
        pset.rename_argument(1, "x").unwrap();
        pset
    }

    #[test]
    fn test_call_evaluates_tree() {
        let pset = number_io_set();
        let tree = Tree::parse(&pset, "addFloat(int_to_float(i), x)").unwrap();
        let program = pset.compile(&tree).unwrap();
        let out = program.call(&[Value::Int(3), Value::Float(0.5)]).unwrap();
        assert_eq!(out, Value::Float(3.5));
    }

    #[test]
    fn test_operand_order() {
        let pset = number_io_set();
        let tree = Tree::parse(&pset, "subFloat(x, int_to_float(i))").unwrap();
        let program = pset.compile(&tree).unwrap();
        let out = program.call(&[Value::Int(1), Value::Float(10.0)]).unwrap();
        assert_eq!(out, Value::Float(9.0));
    }

    #[test]
    fn test_protected_division_in_tree() {
        let pset = number_io_set();
        let tree = Tree::parse(&pset, "divFloat(x, subFloat(x, x))").unwrap();
        let program = pset.compile(&tree).unwrap();
        let out = program.call(&[Value::Int(0), Value::Float(4.0)]).unwrap();
        assert_eq!(out, Value::Float(1.0));
    }

    #[test]
    fn test_nan_constant_validates() {
        let mut pset = number_io_set();
        pset.add_terminal("nan", f64::NAN).unwrap();
        let tree = Tree::parse(&pset, "addFloat(x, nan)").unwrap();
        pset.validate(&tree).unwrap();
        let program = pset.compile(&tree).unwrap();
        let out = program.call(&[Value::Int(0), Value::Float(1.0)]).unwrap();
        assert!(out.as_float().unwrap().is_nan());

        let text = tree.render(&pset);
        assert_eq!(text, "addFloat(x, NaN)");
        assert_eq!(Tree::parse(&pset, &text).unwrap(), tree);
    }

    #[test]
    fn test_argument_checks() {
        let pset = number_io_set();
        let tree = Tree::parse(&pset, "x").unwrap();
        let program = pset.compile(&tree).unwrap();
        assert_eq!(
            program.call(&[Value::Float(1.0)]),
            Err(EvalError::ArgumentCount {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            program.call(&[Value::Int(1), Value::Int(2)]),
            Err(EvalError::ArgumentType {
                index: 1,
                expected: Type::Float,
                found: Type::Int
            })
        );
    }

    #[test]
    fn test_validate_rejects_bad_trees() {
        let pset = number_io_set();
        // Root type differs from the set output.
        let int_root = Tree::from_nodes(vec![Node::Argument {
            id: 0,
            index: 0,
            ret: Type::Int,
        }])
        .unwrap();
        assert!(matches!(
            pset.validate(&int_root),
            Err(TreeError::TypeMismatch { index: 0, .. })
        ));

        // Unknown primitive id.
        let dangling = Tree::from_nodes(vec![
            Node::Primitive {
                id: 99,
                arity: 1,
                ret: Type::Float,
            },
            Node::Argument {
                id: 1,
                index: 1,
                ret: Type::Float,
            },
        ])
        .unwrap();
        assert!(matches!(
            pset.compile(&dangling),
            Err(TreeError::Registry { index: 0, .. })
        ));
    }

    #[test]
    fn test_return_type_checked() {
        let mut pset = PrimitiveSet::new("MAIN", [Type::Float], Type::Float);
        pset.add_primitive("liar", [Type::Float], Type::Float, |_| Ok(Value::Int(0)))
            .unwrap();
        let tree = Tree::parse(&pset, "liar(ARG0)").unwrap();
        let program = pset.compile(&tree).unwrap();
        assert!(matches!(
            program.call(&[Value::Float(1.0)]),
            Err(EvalError::ReturnType { .. })
        ));
    }
}
