use super::{Recordable, Section};
use crate::core::errors::{PatchError, Result};
use crate::core::hoc::{RangeRef, Target, Value};
use crate::engine::interpreter::Interpreter;

/// A location along a section, at the normalized arc position `x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub section: Section,
    pub x: f64,
}

impl Segment {
    pub(crate) fn target(&self, interp: &Interpreter) -> Result<Target> {
        if !(0.0..=1.0).contains(&self.x) {
            return Err(PatchError::InvalidArgument(format!(
                "Segment position {} is outside of [0, 1]",
                self.x
            )));
        }
        Ok(Target::Segment(interp.handle(self.section.0)?, self.x))
    }

    /// The interpreter value passed wherever a segment is expected.
    pub fn transform(&self, interp: &Interpreter) -> Result<Value> {
        match self.target(interp)? {
            Target::Segment(section, x) => Ok(Value::Segment(section, x)),
            _ => Err(PatchError::Transform(self.describe(interp))),
        }
    }

    /// A pointer to a range variable at this location (`seg._ref_<variable>`).
    pub fn range_ref(&self, interp: &Interpreter, variable: &str) -> Result<RangeRef> {
        Ok(RangeRef::new(self.target(interp)?, variable))
    }

    pub fn voltage_ref(&self, interp: &Interpreter) -> Result<RangeRef> {
        self.range_ref(interp, "v")
    }

    pub fn attr(&self, interp: &Interpreter, name: &str) -> Result<Value> {
        let target = self.target(interp)?;
        interp
            .hoc()
            .get(target, name)
            .map_err(|fault| interp.read_fault(fault, &self.describe(interp), name))
    }

    pub fn set_attr(&self, interp: &mut Interpreter, name: &str, value: Value) -> Result<()> {
        let target = self.target(interp)?;
        let object = self.describe(interp);
        interp.set_on(target, &object, name, value)
    }

    pub fn describe(&self, interp: &Interpreter) -> String {
        format!("{}({})", interp.describe(self.section.0), self.x)
    }
}

impl Recordable for Segment {
    fn record_ref(&self, interp: &Interpreter) -> Result<RangeRef> {
        self.voltage_ref(interp)
    }
}
