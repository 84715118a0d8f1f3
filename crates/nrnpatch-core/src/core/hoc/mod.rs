//! # Hoc Module
//!
//! This module defines the protocol through which the library talks to the wrapped
//! simulator's interpreter, and an in-memory implementation of that protocol.
//!
//! ## Overview
//!
//! The simulator is treated as an opaque collaborator. Everything the library needs
//! from it is expressed by the [`Hoc`] trait: constructing objects from named
//! templates, reading and writing attributes, calling methods, and draining the
//! interpreter's captured error stream. Foreign objects are only ever seen through
//! opaque [`HocRef`] identities.
//!
//! ## Key Components
//!
//! - [`Hoc`] - The backend seam implemented by concrete interpreter bindings
//! - [`Value`] - Dynamically-typed values exchanged with the interpreter
//! - [`RangeRef`] - Pointers to interpreter variables (`_ref_v`, `_ref_t`, ...)
//! - [`memory`] - An in-memory backend used for dry runs and tests

pub mod memory;

use std::fmt;

/// Opaque identity of an object owned by the foreign interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HocRef(u64);

impl HocRef {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// The receiver of an attribute access or method call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    /// The interpreter's top-level namespace (`h.t`, `h.finitialize()`, ...).
    Global,
    /// A foreign object.
    Object(HocRef),
    /// A location along a section, given as the normalized arc position `x`.
    Segment(HocRef, f64),
}

/// A pointer to a variable inside the interpreter, such as a membrane potential.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRef {
    pub target: Target,
    pub variable: String,
}

impl RangeRef {
    pub fn new(target: Target, variable: impl Into<String>) -> Self {
        Self {
            target,
            variable: variable.into(),
        }
    }

    /// The simulation clock.
    pub fn time() -> Self {
        Self::new(Target::Global, "t")
    }
}

/// A dynamically-typed value crossing the interpreter boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Number(f64),
    Text(String),
    Object(HocRef),
    Segment(HocRef, f64),
    Pointer(RangeRef),
    List(Vec<Value>),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<HocRef> {
        match self {
            Value::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// A short type description, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "NoneType",
            Value::Number(_) => "float",
            Value::Text(_) => "str",
            Value::Object(_) => "hoc.HocObject",
            Value::Segment(..) => "nrn.Segment",
            Value::Pointer(_) => "hoc.HocObject (pointer to hoc scalar)",
            Value::List(_) => "list",
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<HocRef> for Value {
    fn from(obj: HocRef) -> Self {
        Value::Object(obj)
    }
}

impl From<RangeRef> for Value {
    fn from(ptr: RangeRef) -> Self {
        Value::Pointer(ptr)
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Value::List(values.into_iter().map(Value::Number).collect())
    }
}

/// Failure reported by the interpreter for a single protocol call.
#[derive(Debug, Clone, PartialEq)]
pub enum HocFault {
    /// The receiver has no attribute or method of this name.
    UnknownAttribute { name: String },
    /// The interpreter raised; details were written to its error stream.
    Runtime { message: String },
}

impl HocFault {
    pub fn runtime(message: impl Into<String>) -> Self {
        HocFault::Runtime {
            message: message.into(),
        }
    }
}

impl fmt::Display for HocFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HocFault::UnknownAttribute { name } => write!(f, "no attribute '{}'", name),
            HocFault::Runtime { message } => f.write_str(message),
        }
    }
}

/// How the interpreter classifies an inserted or instantiated mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MechanismKind {
    /// Located at a single point of a section (synapses, clamps).
    PointProcess,
    /// A point process that is not attached to a section (stimulators).
    ArtificialCell,
    /// Distributed over the membrane of a section (`pas`, `hh`).
    Density,
}

/// The object-construction and attribute-access protocol of the wrapped interpreter.
///
/// Implementations must keep foreign identities stable: a [`HocRef`] returned once
/// must refer to the same object until [`Hoc::release`] is called for it.
pub trait Hoc {
    /// Instantiates the named template.
    fn create(&mut self, template: &str, args: &[Value]) -> Result<HocRef, HocFault>;

    fn get(&self, target: Target, name: &str) -> Result<Value, HocFault>;

    fn set(&mut self, target: Target, name: &str, value: Value) -> Result<(), HocFault>;

    /// Reads one element of an array attribute (`netcon.weight[0]`).
    fn get_indexed(&self, target: Target, name: &str, index: usize) -> Result<Value, HocFault>;

    fn set_indexed(
        &mut self,
        target: Target,
        name: &str,
        index: usize,
        value: Value,
    ) -> Result<(), HocFault>;

    fn call(&mut self, target: Target, method: &str, args: &[Value]) -> Result<Value, HocFault>;

    /// Names of every template the interpreter can currently instantiate.
    fn templates(&self) -> Vec<String>;

    fn mechanism_kind(&self, name: &str) -> Option<MechanismKind>;

    /// The interpreter's own name for an object (`ExpSyn[0]`, `soma`, ...).
    fn name_of(&self, obj: HocRef) -> String;

    /// The template an object was instantiated from, if the object is alive.
    fn template_of(&self, obj: HocRef) -> Option<String>;

    /// Drops the interpreter's last reference to an object.
    fn release(&mut self, obj: HocRef);

    /// Drains everything the interpreter wrote to its error stream since the last drain.
    fn take_output(&mut self) -> String;

    /// Hoc statements equivalent to the mutating calls made so far, for backends
    /// that keep such a log.
    fn transcript(&self) -> Vec<String> {
        Vec::new()
    }
}
