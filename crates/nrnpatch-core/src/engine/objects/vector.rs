use super::{Wrapped, wrapper};
use crate::core::errors::rules::Operation;
use crate::core::errors::{PatchError, Result};
use crate::core::hoc::{RangeRef, Target, Value};
use crate::engine::interpreter::Interpreter;

wrapper!(
    /// A buffer of numbers living in the interpreter.
    Vector
);

impl Vector {
    /// Copies the contents out of the interpreter.
    pub fn to_vec(self, interp: &mut Interpreter) -> Result<Vec<f64>> {
        let size = self.len(interp)?;
        let target = Target::Object(interp.handle(self.0)?);
        (0..size)
            .map(|i| {
                let value = interp
                    .hoc()
                    .get_indexed(target, "x", i)
                    .map_err(|fault| interp.read_fault(fault, &interp.describe(self.0), "x"))?;
                value.as_number().ok_or_else(|| {
                    PatchError::Foreign(format!(
                        "{}.x[{}] is a {}, not a number",
                        interp.describe(self.0),
                        i,
                        value.type_name()
                    ))
                })
            })
            .collect()
    }

    pub fn len(self, interp: &mut Interpreter) -> Result<usize> {
        let size = self.call(interp, "size", &[])?;
        Ok(size.as_number().unwrap_or(0.0) as usize)
    }

    pub fn is_empty(self, interp: &mut Interpreter) -> Result<bool> {
        self.len(interp).map(|n| n == 0)
    }

    /// Samples the variable behind `pointer` at every time step.
    pub fn record(self, interp: &mut Interpreter, pointer: RangeRef) -> Result<()> {
        self.invoke(interp, "record", vec![Value::Pointer(pointer)], Operation::Record)
    }

    /// Plays the contents into the variable behind `pointer`, one sample every
    /// `dt` ms, or one per time step when `dt` is unset.
    pub fn play(self, interp: &mut Interpreter, pointer: RangeRef, dt: Option<f64>) -> Result<()> {
        let mut args = vec![Value::Pointer(pointer)];
        args.extend(dt.map(Value::Number));
        self.invoke(interp, "play", args, Operation::Any)
    }

    fn invoke(
        self,
        interp: &mut Interpreter,
        method: &str,
        args: Vec<Value>,
        operation: Operation,
    ) -> Result<()> {
        let handle = interp.handle(self.0)?;
        let name = interp.describe(self.0);
        interp
            .call_on(Target::Object(handle), &name, method, &args, operation)
            .map(|_| ())
    }
}
