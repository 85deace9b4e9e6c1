//! Typed primitive set: the registry of functions and terminals a tree may
//! be built from.
//!
//! Every primitive carries an explicit input/output schema. The schema is
//! checked whenever a tree is built, varied, or compiled, so the executable
//! function never has to trust its operands blindly.

use crate::error::{EvalError, EvalResult};
use crate::gp::value::{Type, Value};
use rand::RngCore;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Executable body of a primitive.
pub type PrimitiveFn = Arc<dyn Fn(&[Value]) -> EvalResult<Value> + Send + Sync>;

/// Sampler for an ephemeral constant.
pub type EphemeralFn = Arc<dyn Fn(&mut dyn RngCore) -> Value + Send + Sync>;

/// Value returned by [`protected_div`] and [`protected_div_int`] on a zero
/// divisor.
pub const PROTECTED_DIV_FALLBACK: i64 = 1;

/// Error raised while registering primitives or terminals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A primitive, terminal or argument with this name already exists.
    #[error("name `{0}` is already registered")]
    DuplicateName(String),
    /// No argument terminal with this index or name exists.
    #[error("unknown argument `{0}`")]
    UnknownArgument(String),
    /// Primitives must take at least one input; use a terminal instead.
    #[error("primitive `{0}` has no inputs")]
    NullaryPrimitive(String),
}

/// A typed function usable as an internal tree node.
#[derive(Clone)]
pub struct Primitive {
    name: String,
    inputs: Vec<Type>,
    output: Type,
    func: PrimitiveFn,
}

impl Primitive {
    /// Registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered input types.
    #[must_use]
    pub fn inputs(&self) -> &[Type] {
        &self.inputs
    }

    /// Output type.
    #[must_use]
    pub fn output(&self) -> Type {
        self.output
    }

    /// Number of children a node of this primitive takes.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.inputs.len()
    }

    /// Apply the primitive to already-evaluated operands.
    ///
    /// # Errors
    ///
    /// Propagates whatever the primitive body reports.
    pub fn apply(&self, args: &[Value]) -> EvalResult<Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// Where a terminal's value comes from.
#[derive(Clone)]
pub enum TerminalKind {
    /// Positional root argument, bound at call time.
    Argument(usize),
    /// Fixed value.
    Constant(Value),
    /// Value sampled once per tree instance.
    Ephemeral(EphemeralFn),
}

impl fmt::Debug for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument(i) => f.debug_tuple("Argument").field(i).finish(),
            Self::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Self::Ephemeral(_) => f.write_str("Ephemeral"),
        }
    }
}

/// A typed leaf source.
#[derive(Debug, Clone)]
pub struct Terminal {
    name: String,
    ty: Type,
    kind: TerminalKind,
}

impl Terminal {
    /// Display name (argument terminals may be renamed).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output type.
    #[must_use]
    pub fn ty(&self) -> Type {
        self.ty
    }

    /// Value source.
    #[must_use]
    pub fn kind(&self) -> &TerminalKind {
        &self.kind
    }
}

/// Rust types that map onto a tree [`Type`].
///
/// Used by the typed registration helpers so that schemas are inferred from
/// the closure signature instead of being written twice.
pub trait Operand: Sized + 'static {
    /// Tree type of this Rust type.
    const TYPE: Type;

    /// Extract from a runtime value.
    fn from_value(value: &Value) -> Option<Self>;

    /// Wrap into a runtime value.
    fn into_value(self) -> Value;
}

impl Operand for bool {
    const TYPE: Type = Type::Bool;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl Operand for i64 {
    const TYPE: Type = Type::Int;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl Operand for f64 {
    const TYPE: Type = Type::Float;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_float()
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl Operand for String {
    const TYPE: Type = Type::Text;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(str::to_owned)
    }

    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

/// Read operand `index` of a primitive call as `T`.
///
/// # Errors
///
/// Returns [`EvalError::ArgumentCount`] when the operand is missing and
/// [`EvalError::OperandType`] when it has the wrong type.
pub fn operand<T: Operand>(primitive: &str, args: &[Value], index: usize) -> EvalResult<T> {
    let value = args.get(index).ok_or(EvalError::ArgumentCount {
        expected: index + 1,
        found: args.len(),
    })?;
    T::from_value(value).ok_or_else(|| EvalError::OperandType {
        primitive: primitive.to_owned(),
        expected: T::TYPE,
        found: value.ty(),
    })
}

/// Float division returning [`PROTECTED_DIV_FALLBACK`] on a zero divisor.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn protected_div(left: f64, right: f64) -> f64 {
    if right == 0.0 {
        PROTECTED_DIV_FALLBACK as f64
    } else {
        left / right
    }
}

/// Integer division returning [`PROTECTED_DIV_FALLBACK`] on a zero divisor
/// or on overflow (`i64::MIN / -1`).
#[must_use]
pub fn protected_div_int(left: i64, right: i64) -> i64 {
    left.checked_div(right).unwrap_or(PROTECTED_DIV_FALLBACK)
}

/// Registry of typed primitives and terminals for one program signature.
///
/// The set is built once and then shared read-only by the generator, the
/// genetic operators and the compiler.
#[derive(Debug, Clone)]
pub struct PrimitiveSet {
    name: String,
    inputs: Vec<Type>,
    output: Type,
    primitives: Vec<Primitive>,
    terminals: Vec<Terminal>,
    primitives_by_type: BTreeMap<Type, Vec<usize>>,
    terminals_by_type: BTreeMap<Type, Vec<usize>>,
    names: HashSet<String>,
}

impl PrimitiveSet {
    /// Create a set for programs taking `inputs` and returning `output`.
    ///
    /// One argument terminal named `ARG0`, `ARG1`, ... is registered per
    /// input.
    #[must_use]
    pub fn new(name: &str, inputs: impl Into<Vec<Type>>, output: Type) -> Self {
        let inputs = inputs.into();
        let mut set = Self {
            name: name.to_owned(),
            inputs: Vec::new(),
            output,
            primitives: Vec::new(),
            terminals: Vec::new(),
            primitives_by_type: BTreeMap::new(),
            terminals_by_type: BTreeMap::new(),
            names: HashSet::new(),
        };
        for (index, &ty) in inputs.iter().enumerate() {
            let arg_name = format!("ARG{index}");
            set.names.insert(arg_name.clone());
            set.push_terminal(Terminal {
                name: arg_name,
                ty,
                kind: TerminalKind::Argument(index),
            });
        }
        set.inputs = inputs;
        set
    }

    /// Register a primitive with an explicit schema.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken or `inputs` is empty.
    pub fn add_primitive<F>(
        &mut self,
        name: &str,
        inputs: impl Into<Vec<Type>>,
        output: Type,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        let inputs = inputs.into();
        if inputs.is_empty() {
            return Err(RegistryError::NullaryPrimitive(name.to_owned()));
        }
        self.claim_name(name)?;
        let id = self.primitives.len();
        self.primitives.push(Primitive {
            name: name.to_owned(),
            inputs,
            output,
            func: Arc::new(func),
        });
        self.primitives_by_type.entry(output).or_default().push(id);
        Ok(())
    }

    /// Register a one-input primitive whose schema is inferred from `f`.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken.
    pub fn add_unary<A, R, F>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        A: Operand,
        R: Operand,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let prim = name.to_owned();
        self.add_primitive(name, [A::TYPE], R::TYPE, move |args| {
            let a = operand::<A>(&prim, args, 0)?;
            Ok(f(a).into_value())
        })
    }

    /// Register a two-input primitive whose schema is inferred from `f`.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken.
    pub fn add_binary<A, B, R, F>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        A: Operand,
        B: Operand,
        R: Operand,
        F: Fn(A, B) -> R + Send + Sync + 'static,
    {
        let prim = name.to_owned();
        self.add_primitive(name, [A::TYPE, B::TYPE], R::TYPE, move |args| {
            let a = operand::<A>(&prim, args, 0)?;
            let b = operand::<B>(&prim, args, 1)?;
            Ok(f(a, b).into_value())
        })
    }

    /// Register a three-input primitive whose schema is inferred from `f`.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken.
    pub fn add_ternary<A, B, C, R, F>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        A: Operand,
        B: Operand,
        C: Operand,
        R: Operand,
        F: Fn(A, B, C) -> R + Send + Sync + 'static,
    {
        let prim = name.to_owned();
        self.add_primitive(name, [A::TYPE, B::TYPE, C::TYPE], R::TYPE, move |args| {
            let a = operand::<A>(&prim, args, 0)?;
            let b = operand::<B>(&prim, args, 1)?;
            let c = operand::<C>(&prim, args, 2)?;
            Ok(f(a, b, c).into_value())
        })
    }

    /// Register a fixed-value terminal. Its type is the value's type.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken.
    pub fn add_terminal(&mut self, name: &str, value: impl Into<Value>) -> Result<(), RegistryError> {
        self.claim_name(name)?;
        let value = value.into();
        self.push_terminal(Terminal {
            name: name.to_owned(),
            ty: value.ty(),
            kind: TerminalKind::Constant(value),
        });
        Ok(())
    }

    /// Register an ephemeral constant of type `ty`.
    ///
    /// `sample` is called once per new tree position; the drawn value is then
    /// frozen in that tree.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken.
    pub fn add_ephemeral<F>(&mut self, name: &str, ty: Type, sample: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut dyn RngCore) -> Value + Send + Sync + 'static,
    {
        self.claim_name(name)?;
        self.push_terminal(Terminal {
            name: name.to_owned(),
            ty,
            kind: TerminalKind::Ephemeral(Arc::new(sample)),
        });
        Ok(())
    }

    /// Rename argument `ARG{index}` for display.
    ///
    /// # Errors
    ///
    /// Fails if there is no such argument or the new name is taken.
    pub fn rename_argument(&mut self, index: usize, new_name: &str) -> Result<(), RegistryError> {
        let id = self
            .terminals
            .iter()
            .position(|t| matches!(t.kind, TerminalKind::Argument(i) if i == index))
            .ok_or_else(|| RegistryError::UnknownArgument(format!("ARG{index}")))?;
        if self.terminals[id].name == new_name {
            return Ok(());
        }
        self.claim_name(new_name)?;
        let old = std::mem::replace(&mut self.terminals[id].name, new_name.to_owned());
        self.names.remove(&old);
        Ok(())
    }

    /// Name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared root input types.
    #[must_use]
    pub fn inputs(&self) -> &[Type] {
        &self.inputs
    }

    /// Declared program return type.
    #[must_use]
    pub fn output(&self) -> Type {
        self.output
    }

    /// Primitive by id.
    #[must_use]
    pub fn primitive(&self, id: usize) -> Option<&Primitive> {
        self.primitives.get(id)
    }

    /// Terminal by id.
    #[must_use]
    pub fn terminal(&self, id: usize) -> Option<&Terminal> {
        self.terminals.get(id)
    }

    /// Ids of primitives returning `ty`.
    #[must_use]
    pub fn primitives_of(&self, ty: Type) -> &[usize] {
        self.primitives_by_type.get(&ty).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids of terminals of type `ty`.
    #[must_use]
    pub fn terminals_of(&self, ty: Type) -> &[usize] {
        self.terminals_by_type.get(&ty).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of registered primitives.
    #[must_use]
    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Number of registered terminals, arguments included.
    #[must_use]
    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }

    /// Share of terminals among all entries; the Grow method's leaf
    /// probability.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn terminal_ratio(&self) -> f64 {
        let total = self.terminals.len() + self.primitives.len();
        if total == 0 {
            return 0.0;
        }
        self.terminals.len() as f64 / total as f64
    }

    /// Look up a primitive or terminal by its display name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        if let Some(id) = self.primitives.iter().position(|p| p.name == name) {
            return Some(Symbol::Primitive(id));
        }
        self.terminals
            .iter()
            .position(|t| t.name == name)
            .map(Symbol::Terminal)
    }

    fn claim_name(&mut self, name: &str) -> Result<(), RegistryError> {
        if !self.names.insert(name.to_owned()) {
            return Err(RegistryError::DuplicateName(name.to_owned()));
        }
        Ok(())
    }

    fn push_terminal(&mut self, terminal: Terminal) {
        let id = self.terminals.len();
        self.terminals_by_type.entry(terminal.ty).or_default().push(id);
        self.terminals.push(terminal);
    }
}

/// Result of a name lookup in a [`PrimitiveSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// Primitive id.
    Primitive(usize),
    /// Terminal id.
    Terminal(usize),
}
