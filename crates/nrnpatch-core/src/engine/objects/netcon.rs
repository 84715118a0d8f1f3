use super::{Endpoint, HocObject, Vector, Wrapped, wrapper};
use crate::core::errors::rules::{ErrorContext, Operation};
use crate::core::errors::{PatchError, Result};
use crate::core::hoc::{Target, Value};
use crate::core::models::facet::{Facet, NetConFacet};
use crate::core::models::ids::ObjectId;
use crate::engine::interpreter::Interpreter;

wrapper!(
    /// A connection that delivers events from a source to a target.
    NetCon
);

/// Connection parameters. Unset values fall back to the interpreter's NetCon defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetConOptions {
    pub weight: Option<f64>,
    pub delay: Option<f64>,
    pub threshold: Option<f64>,
}

impl NetConOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn delay(mut self, delay: f64) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

impl Interpreter {
    /// The registry entry an endpoint stands for. Segments stand for their section;
    /// foreign objects are wrapped so they take part in the connectable checks.
    fn endpoint_object(&mut self, endpoint: &Endpoint) -> Option<ObjectId> {
        match endpoint {
            Endpoint::Object(id) => Some(*id),
            Endpoint::Segment(segment) => Some(segment.section.0),
            Endpoint::Foreign(Value::Object(handle)) => Some(self.wrap(*handle).id()),
            Endpoint::None | Endpoint::Foreign(_) => None,
        }
    }

    /// Connects `source` to `target`.
    ///
    /// Without a target the connection is a spike detector on `source`, and the
    /// source keeps it alive. With a target, both endpoints must be connectable
    /// and each records the connection to the other.
    pub fn net_con(
        &mut self,
        source: impl Into<Endpoint>,
        target: impl Into<Endpoint>,
        options: NetConOptions,
    ) -> Result<NetCon> {
        let (source, target) = (source.into(), target.into());
        let source_value = self.transform_netcon(&source)?;
        let target_value = self.transform_netcon(&target)?;
        let context = ErrorContext::new()
            .with("object", "NetCon")
            .with("source", source_value.type_name())
            .with("target", target_value.type_name());
        let netcon = NetCon(self.instantiate(
            "NetCon",
            &[source_value, target_value],
            Operation::NetCon,
            &context,
        )?);

        let from = self.endpoint_object(&source);
        let to = self.endpoint_object(&target);
        if target != Endpoint::None {
            if let (Some(from), Some(to)) = (from, to) {
                let checked = self
                    .assert_connectable(from, "Source")
                    .and_then(|_| self.assert_connectable(to, "Target"));
                if let Err(err) = checked {
                    self.registry.unroot(netcon.0);
                    self.collect();
                    return Err(err);
                }
                self.registry.add_connection(from, to, netcon.0);
                self.registry.add_connection(to, from, netcon.0);
            }
        } else if let Some(from) = from {
            self.reference(from, netcon.0);
        }
        for endpoint in [from, to].into_iter().flatten() {
            self.reference(netcon.0, endpoint);
        }
        if let Facet::NetCon(facet) = &mut self.entry_mut(netcon.0)?.facet {
            facet.source = from;
            facet.target = to;
        }

        let defaults = self.config.netcon;
        netcon.set_weight(self, options.weight.unwrap_or(defaults.weight))?;
        netcon.set_delay(self, options.delay.unwrap_or(defaults.delay))?;
        netcon.set_threshold(self, options.threshold.unwrap_or(defaults.threshold))?;
        Ok(netcon)
    }
}

fn facet(interp: &Interpreter, netcon: NetCon) -> Result<&NetConFacet> {
    match &interp.entry(netcon.0)?.facet {
        Facet::NetCon(facet) => Ok(facet),
        _ => Err(PatchError::InvalidArgument(format!(
            "{} is not a NetCon",
            interp.describe(netcon.0)
        ))),
    }
}

impl NetCon {
    pub fn weight(self, interp: &Interpreter) -> Result<f64> {
        self.weight_at(interp, 0)
    }

    pub fn weight_at(self, interp: &Interpreter, index: usize) -> Result<f64> {
        let handle = interp.handle(self.0)?;
        let name = interp.describe(self.0);
        let value = interp
            .hoc()
            .get_indexed(Target::Object(handle), "weight", index)
            .map_err(|fault| interp.read_fault(fault, &name, "weight"))?;
        value.as_number().ok_or_else(|| {
            PatchError::Foreign(format!("{}.weight[{}] is not a number", name, index))
        })
    }

    pub fn set_weight(self, interp: &mut Interpreter, weight: f64) -> Result<()> {
        self.set_weight_at(interp, 0, weight)
    }

    pub fn set_weight_at(self, interp: &mut Interpreter, index: usize, weight: f64) -> Result<()> {
        let target = Target::Object(interp.handle(self.0)?);
        let context = ErrorContext::new().with("object", interp.describe(self.0));
        interp.guarded(Operation::Any, &context, |hoc| {
            hoc.set_indexed(target, "weight", index, Value::Number(weight))
        })
    }

    pub fn delay(self, interp: &Interpreter) -> Result<f64> {
        interp.number_attr(self.0, "delay")
    }

    pub fn set_delay(self, interp: &mut Interpreter, delay: f64) -> Result<()> {
        interp.set_attr(self.0, "delay", Value::Number(delay))
    }

    pub fn threshold(self, interp: &Interpreter) -> Result<f64> {
        interp.number_attr(self.0, "threshold")
    }

    pub fn set_threshold(self, interp: &mut Interpreter, threshold: f64) -> Result<()> {
        interp.set_attr(self.0, "threshold", Value::Number(threshold))
    }

    /// Records the times of the events passing through this connection.
    ///
    /// Without a vector, the connection's own recorder is returned, created on
    /// first use. A given vector replaces the recorder.
    pub fn record(self, interp: &mut Interpreter, vector: Option<Vector>) -> Result<Vector> {
        let recorder = facet(interp, self)?.recorder;
        let vector = match (vector, recorder) {
            (Some(vector), _) => vector,
            (None, Some(existing)) if interp.registry.contains(existing) => {
                return Ok(Vector(existing));
            }
            (None, _) => interp.vector(&[])?,
        };
        let value = interp.transform(&vector)?;
        self.call(interp, "record", &[value])?;
        interp.reference(self.0, vector.0);
        if let Facet::NetCon(facet) = &mut interp.entry_mut(self.0)?.facet {
            facet.recorder = Some(vector.0);
        }
        Ok(vector)
    }

    /// The wrapped object events come from, if the source was one.
    pub fn source(self, interp: &Interpreter) -> Result<Option<HocObject>> {
        Ok(facet(interp, self)?.source.map(HocObject))
    }

    pub fn target(self, interp: &Interpreter) -> Result<Option<HocObject>> {
        Ok(facet(interp, self)?.target.map(HocObject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::HocError;
    use crate::engine::interpreter::tests::interpreter;
    use crate::core::models::kind::ObjectKind;
    use crate::engine::objects::SynapseOptions;

    #[test]
    fn raw_object_targets_are_wrapped_and_tracked() {
        let mut p = interpreter();
        let source = p.net_stim().unwrap();
        let handle = p.hoc_mut().create("NetStim", &[]).unwrap();
        let nc = p
            .net_con(source, Value::Object(handle), NetConOptions::default())
            .unwrap();

        let target = p.wrap(handle);
        assert_eq!(p.kind_of(target.id()), Some(ObjectKind::NetStim));
        assert_eq!(p.connection(&source, &target, true).unwrap(), nc);
        assert_eq!(nc.target(&p).unwrap(), Some(target));
        assert!(p.references(nc.id()).contains(&target));
    }

    #[test]
    fn options_fall_back_to_configured_defaults() {
        let mut p = interpreter();
        let a = p.net_stim().unwrap();
        let b = p.net_stim().unwrap();
        let nc = p.net_con(a, b, NetConOptions::new().delay(2.5)).unwrap();
        assert_eq!(nc.weight(&p).unwrap(), 0.1);
        assert_eq!(nc.delay(&p).unwrap(), 2.5);
        assert_eq!(nc.threshold(&p).unwrap(), -20.0);
        nc.set_weight(&mut p, 0.5).unwrap();
        assert_eq!(nc.weight(&p).unwrap(), 0.5);
    }

    #[test]
    fn connected_endpoints_know_each_other() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let syn = s.synapse(&mut p, "ExpSyn", &SynapseOptions::default()).unwrap();
        let stim = p.net_stim().unwrap();
        let nc = p.net_con(stim, syn, NetConOptions::default()).unwrap();

        assert_eq!(nc.source(&p).unwrap(), Some(stim.into()));
        assert_eq!(nc.target(&p).unwrap(), Some(syn.into()));
        assert_eq!(p.connection(&stim, &syn, true).unwrap(), nc);
        assert_eq!(p.connection(&syn, &stim, true).unwrap(), nc);
        assert_eq!(p.references(nc.id()).len(), 2);
    }

    #[test]
    fn spike_detector_is_kept_alive_by_its_source() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let nc = p.net_con(s, Endpoint::None, NetConOptions::default()).unwrap();
        assert!(p.references(s.id()).contains(&nc.into()));
        assert_eq!(nc.target(&p).unwrap(), None);

        assert_eq!(p.release(&nc), 0);
        assert_eq!(p.release(&s), 2);
    }

    #[test]
    fn section_to_vector_is_a_connect_error() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let v = p.vector(&[]).unwrap();
        let err = p.net_con(s, v, NetConOptions::default()).unwrap_err();
        match err {
            PatchError::Hoc(HocError::Connect(message)) => {
                assert!(message.starts_with("Target is not a point process"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn numbers_are_an_incorrect_type_connect_error() {
        let mut p = interpreter();
        let err = p
            .net_con(Value::Number(1.0), Value::Number(2.0), NetConOptions::default())
            .unwrap_err();
        match err {
            PatchError::Hoc(HocError::Connect(message)) => {
                assert!(message.starts_with("Incorrect types passed to NetCon"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn record_reuses_its_recorder_unless_given_a_vector() {
        let mut p = interpreter();
        let a = p.net_stim().unwrap();
        let b = p.net_stim().unwrap();
        let nc = p.net_con(a, b, NetConOptions::default()).unwrap();
        let recorder = nc.record(&mut p, None).unwrap();
        assert_eq!(nc.record(&mut p, None).unwrap(), recorder);

        let own = p.vector(&[]).unwrap();
        assert_eq!(nc.record(&mut p, Some(own)).unwrap(), own);
        assert_eq!(nc.record(&mut p, None).unwrap(), own);
    }
}
