use super::{Connectable, Endpoint, HocObject, Vector, Wrapped, wrapper};
use crate::core::errors::rules::{ErrorContext, Operation};
use crate::core::errors::{PatchError, Result};
use crate::core::hoc::Value;
use crate::core::models::facet::Facet;
use crate::core::models::ids::ObjectId;
use crate::engine::interpreter::Interpreter;

wrapper!(
    /// An artificial cell emitting spikes at regular or noisy intervals.
    NetStim
);

wrapper!(
    /// An artificial cell replaying a fixed pattern of spike times.
    VecStim
);

impl Connectable for NetStim {}
impl Connectable for VecStim {}

impl Interpreter {
    pub fn net_stim(&mut self) -> Result<NetStim> {
        let context = ErrorContext::new().with("object", "NetStim");
        self.instantiate("NetStim", &[], Operation::Any, &context)
            .map(NetStim)
    }

    /// Creates a `VecStim`, optionally replaying `pattern` (spike times in ms).
    pub fn vec_stim(&mut self, pattern: Option<Vec<f64>>) -> Result<VecStim> {
        if !self.hoc().templates().iter().any(|t| t == "VecStim") {
            return Err(PatchError::UnknownTemplate("VecStim".to_string()));
        }
        let context = ErrorContext::new().with("object", "VecStim");
        let vec_stim = VecStim(self.instantiate("VecStim", &[], Operation::Any, &context)?);
        if let Some(pattern) = pattern {
            vec_stim.play(self, &pattern)?;
        }
        Ok(vec_stim)
    }
}

impl NetStim {
    pub fn start(self, interp: &Interpreter) -> Result<f64> {
        interp.number_attr(self.0, "start")
    }

    pub fn set_start(self, interp: &mut Interpreter, start: f64) -> Result<()> {
        interp.set_attr(self.0, "start", Value::Number(start))
    }

    pub fn number(self, interp: &Interpreter) -> Result<f64> {
        interp.number_attr(self.0, "number")
    }

    pub fn set_number(self, interp: &mut Interpreter, number: f64) -> Result<()> {
        interp.set_attr(self.0, "number", Value::Number(number))
    }

    pub fn interval(self, interp: &Interpreter) -> Result<f64> {
        interp.number_attr(self.0, "interval")
    }

    pub fn set_interval(self, interp: &mut Interpreter, interval: f64) -> Result<()> {
        interp.set_attr(self.0, "interval", Value::Number(interval))
    }

    /// Fraction of randomness in the intervals, from 0 (regular) to 1 (Poisson).
    pub fn noise(self, interp: &Interpreter) -> Result<f64> {
        interp.number_attr(self.0, "noise")
    }

    pub fn set_noise(self, interp: &mut Interpreter, noise: f64) -> Result<()> {
        interp.set_attr(self.0, "noise", Value::Number(noise))
    }
}

impl VecStim {
    /// Replaces the replayed spike times. The pattern vector is kept alive by the `VecStim`.
    pub fn play(self, interp: &mut Interpreter, pattern: &[f64]) -> Result<()> {
        let vector = interp.vector(pattern)?;
        let value = interp.transform(&vector)?;
        self.call(interp, "play", &[value])?;
        let previous = match &mut interp.entry_mut(self.0)?.facet {
            Facet::VecStim(facet) => {
                facet.pattern = Some(pattern.to_vec());
                facet.vector.replace(vector.0)
            }
            _ => None,
        };
        interp.reference(self.0, vector.0);
        if let Some(previous) = previous {
            interp.dereference(self.0, previous);
        }
        interp.release(&vector);
        Ok(())
    }

    pub fn pattern(self, interp: &Interpreter) -> Result<Option<Vec<f64>>> {
        match &interp.entry(self.0)?.facet {
            Facet::VecStim(facet) => Ok(facet.pattern.clone()),
            _ => Ok(None),
        }
    }

    /// The vector holding the pattern, if one was played.
    pub fn vector(self, interp: &Interpreter) -> Result<Option<Vector>> {
        match &interp.entry(self.0)?.facet {
            Facet::VecStim(facet) => Ok(facet.vector.map(Vector)),
            _ => Ok(None),
        }
    }
}

/// Spike generator settings for `PointProcess::stimulate`.
///
/// Without a pattern a `NetStim` is used; its timing fields override the
/// `NetStim` defaults when set. The weight and delay of the connection fall back
/// to the interpreter's stimulus defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stimulus {
    pub pattern: Option<Vec<f64>>,
    pub start: Option<f64>,
    pub number: Option<f64>,
    pub interval: Option<f64>,
    pub noise: Option<f64>,
    pub weight: Option<f64>,
    pub delay: Option<f64>,
}

impl Stimulus {
    pub fn periodic() -> Self {
        Self::default()
    }

    pub fn pattern(times: Vec<f64>) -> Self {
        Self {
            pattern: Some(times),
            ..Self::default()
        }
    }

    pub fn start(mut self, start: f64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn number(mut self, number: f64) -> Self {
        self.number = Some(number);
        self
    }

    pub fn interval(mut self, interval: f64) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn noise(mut self, noise: f64) -> Self {
        self.noise = Some(noise);
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn delay(mut self, delay: f64) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn apply(&self, interp: &mut Interpreter, net_stim: NetStim) -> Result<()> {
        if let Some(start) = self.start {
            net_stim.set_start(interp, start)?;
        }
        if let Some(number) = self.number {
            net_stim.set_number(interp, number)?;
        }
        if let Some(interval) = self.interval {
            net_stim.set_interval(interp, interval)?;
        }
        if let Some(noise) = self.noise {
            net_stim.set_noise(interp, noise)?;
        }
        Ok(())
    }
}

/// The generator created by `PointProcess::stimulate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stimulator {
    Periodic(NetStim),
    Pattern(VecStim),
}

impl Wrapped for Stimulator {
    fn id(&self) -> ObjectId {
        match self {
            Stimulator::Periodic(net_stim) => net_stim.0,
            Stimulator::Pattern(vec_stim) => vec_stim.0,
        }
    }
}

impl Connectable for Stimulator {}

impl From<Stimulator> for Endpoint {
    fn from(stimulator: Stimulator) -> Self {
        Endpoint::Object(stimulator.id())
    }
}

impl From<Stimulator> for HocObject {
    fn from(stimulator: Stimulator) -> Self {
        HocObject(stimulator.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::interpreter::tests::interpreter;

    #[test]
    fn net_stim_timing_is_forwarded() {
        let mut p = interpreter();
        let stim = p.net_stim().unwrap();
        assert_eq!(stim.interval(&p).unwrap(), 10.0);
        Stimulus::periodic()
            .interval(2.0)
            .noise(0.5)
            .apply(&mut p, stim)
            .unwrap();
        assert_eq!(stim.interval(&p).unwrap(), 2.0);
        assert_eq!(stim.noise(&p).unwrap(), 0.5);
    }

    #[test]
    fn vec_stim_keeps_its_pattern_vector_alive() {
        let mut p = interpreter();
        let stim = p.vec_stim(Some(vec![1.0, 5.0])).unwrap();
        let vector = stim.vector(&p).unwrap().unwrap();
        assert_eq!(vector.to_vec(&mut p).unwrap(), [1.0, 5.0]);

        stim.play(&mut p, &[3.0]).unwrap();
        assert_eq!(stim.pattern(&p).unwrap(), Some(vec![3.0]));
        assert!(!p.registry.contains(vector.0));
        assert_eq!(p.references(stim.id()).len(), 1);
    }

    #[test]
    fn vec_stim_without_pattern_has_no_vector() {
        let mut p = interpreter();
        let stim = p.vec_stim(None).unwrap();
        assert_eq!(stim.pattern(&p).unwrap(), None);
        assert_eq!(stim.vector(&p).unwrap(), None);
    }
}
