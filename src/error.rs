//! Error types for compiled-tree evaluation.

use crate::gp::Type;

/// Failure raised while executing a compiled tree.
///
/// These are the recoverable failures of program evaluation. A fitness
/// evaluator is expected to turn them into a penalty value; the engine never
/// inspects them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// The callable was invoked with the wrong number of arguments.
    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount {
        /// Declared number of root arguments.
        expected: usize,
        /// Number of arguments supplied.
        found: usize,
    },
    /// An argument did not match the declared root input type.
    #[error("argument {index} should be {expected}, got {found}")]
    ArgumentType {
        /// Position of the offending argument.
        index: usize,
        /// Declared type.
        expected: Type,
        /// Type of the supplied value.
        found: Type,
    },
    /// A primitive received an operand of the wrong type.
    #[error("primitive `{primitive}` received {found} where {expected} was required")]
    OperandType {
        /// Name of the primitive.
        primitive: String,
        /// Declared operand type.
        expected: Type,
        /// Type actually received.
        found: Type,
    },
    /// A primitive body returned a value outside its declared output type.
    #[error("primitive `{primitive}` returned {found}, declared {expected}")]
    ReturnType {
        /// Name of the primitive.
        primitive: String,
        /// Declared output type.
        expected: Type,
        /// Type actually returned.
        found: Type,
    },
    /// Integer arithmetic overflowed.
    #[error("arithmetic overflow in `{0}`")]
    Overflow(String),
    /// A primitive was applied outside its mathematical domain.
    #[error("domain error in `{primitive}`: {reason}")]
    Domain {
        /// Name of the primitive.
        primitive: String,
        /// Human-readable description.
        reason: String,
    },
}

/// Result type for compiled-tree evaluation.
pub type EvalResult<T> = Result<T, EvalError>;
