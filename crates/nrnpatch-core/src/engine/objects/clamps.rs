use super::{Connectable, Section, wrapper};
use crate::core::errors::{PatchError, Result};
use crate::core::hoc::Value;
use crate::engine::interpreter::Interpreter;

wrapper!(
    /// A current clamp injecting `amplitude` nA from `delay` for `duration` ms.
    IClamp
);

wrapper!(
    /// A single-electrode voltage clamp.
    SEClamp
);

impl Connectable for IClamp {}
impl Connectable for SEClamp {}

/// The current injected by an [`IClamp`].
#[derive(Debug, Clone, PartialEq)]
pub enum Amplitude {
    Constant(f64),
    /// One sample per time step, played into the clamp's amplitude.
    Waveform(Vec<f64>),
}

/// Settings for `Section::iclamp`. Unset values fall back to the interpreter's
/// IClamp defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct IClampOptions {
    pub x: f64,
    pub delay: Option<f64>,
    pub duration: Option<f64>,
    pub amplitude: Option<Amplitude>,
}

impl Default for IClampOptions {
    fn default() -> Self {
        Self {
            x: 0.5,
            delay: None,
            duration: None,
            amplitude: None,
        }
    }
}

impl Interpreter {
    /// Places a current clamp at `x` on `section`, or on the currently accessed
    /// section when none is given.
    pub fn iclamp(&mut self, x: f64, section: Option<Section>) -> Result<IClamp> {
        let section = match section {
            Some(section) => section,
            None => self.cas()?.ok_or_else(|| {
                PatchError::SectionStack(
                    "IClamp needs a section and no section is currently accessed".to_string(),
                )
            })?,
        };
        let clamp = self.point_process("IClamp", section.segment(x), &[])?;
        Ok(IClamp(clamp.0))
    }

    /// Places a voltage clamp at `x` on `section` with the configured default timing.
    pub fn se_clamp(&mut self, section: Section, x: f64) -> Result<SEClamp> {
        let clamp = SEClamp(self.point_process("SEClamp", section.segment(x), &[])?.0);
        let defaults = self.config.seclamp;
        clamp.set_delay(self, defaults.delay)?;
        clamp.set_duration(self, defaults.duration)?;
        Ok(clamp)
    }
}

macro_rules! aliased {
    ($($getter:ident / $setter:ident => $attribute:literal),* $(,)?) => {
        $(
            pub fn $getter(self, interp: &Interpreter) -> Result<f64> {
                interp.number_attr(self.0, $attribute)
            }

            pub fn $setter(self, interp: &mut Interpreter, value: f64) -> Result<()> {
                interp.set_attr(self.0, $attribute, Value::Number(value))
            }
        )*
    };
}

impl IClamp {
    aliased! {
        amplitude / set_amplitude => "amp",
        delay / set_delay => "del",
        duration / set_duration => "dur",
    }

    /// The injected current of the last time step.
    pub fn current(self, interp: &Interpreter) -> Result<f64> {
        interp.number_attr(self.0, "i")
    }
}

impl SEClamp {
    aliased! {
        delay / set_delay => "dur1",
        duration / set_duration => "dur2",
        after / set_after => "dur3",
        holding / set_holding => "amp1",
        level / set_level => "amp2",
        resistance / set_resistance => "rs",
    }

    pub fn current(self, interp: &Interpreter) -> Result<f64> {
        interp.number_attr(self.0, "i")
    }
}
