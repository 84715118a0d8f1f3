use super::stimulus::{Stimulator, Stimulus};
use super::{Connectable, Location, NetConOptions, Section, Segment, Wrapped, wrapper};
use crate::core::errors::rules::{ErrorContext, Operation};
use crate::core::errors::{PatchError, Result};
use crate::core::hoc::{Target, Value};
use crate::engine::interpreter::Interpreter;

wrapper!(
    /// A mechanism located at a single point of a section, such as a synapse.
    PointProcess
);

impl Connectable for PointProcess {}

/// Placement and initial state of a point process created by `Section::synapse`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynapseOptions {
    /// Location along the section; the section's default location when unset.
    pub x: Option<f64>,
    /// Attributes assigned after creation.
    pub attributes: Vec<(String, f64)>,
    /// Whether to add the synapse to the section's synapse list.
    pub store: bool,
    /// Extra constructor arguments, passed after the location.
    pub args: Vec<Value>,
}

impl Interpreter {
    /// Creates a point process of `template` at `location`.
    ///
    /// The point process and its section keep each other alive.
    pub fn point_process(
        &mut self,
        template: &str,
        location: impl Into<Location>,
        args: &[Value],
    ) -> Result<PointProcess> {
        if !self.is_point_process(template) {
            return Err(PatchError::UnknownTemplate(template.to_string()));
        }
        let location = location.into();
        let section = location.section();
        let mut all_args = Vec::with_capacity(args.len() + 1);
        all_args.push(location.segment().transform(self)?);
        all_args.extend_from_slice(args);

        let context = ErrorContext::new().with("object", template);
        let id = self.instantiate(template, &all_args, Operation::SectionAccess, &context)?;
        self.reference(id, section.0);
        self.reference(section.0, id);
        Ok(PointProcess(id))
    }
}

impl PointProcess {
    /// Where the point process sits.
    pub fn location(self, interp: &Interpreter) -> Result<Segment> {
        let handle = interp.handle(self.0)?;
        let name = interp.describe(self.0);
        let value = interp
            .hoc()
            .get(Target::Object(handle), "loc")
            .map_err(|fault| interp.read_fault(fault, &name, "loc"))?;
        match value {
            Value::Segment(section, x) => match interp.registry.lookup(section) {
                Some(id) => Ok(Section(id).segment(x)),
                None => Err(PatchError::Foreign(format!(
                    "{} sits on a section that was never wrapped",
                    name
                ))),
            },
            other => Err(PatchError::Foreign(format!(
                "{}.loc returned a {}",
                name,
                other.type_name()
            ))),
        }
    }

    /// Drives this point process with a spike generator.
    ///
    /// A periodic stimulus creates a `NetStim`, a pattern a `VecStim`. The
    /// generator is connected to this point process and returned. The `NetCon`
    /// lives as long as both endpoints; look it up with
    /// [`Interpreter::connection`].
    pub fn stimulate(self, interp: &mut Interpreter, stimulus: &Stimulus) -> Result<Stimulator> {
        let stimulator = match &stimulus.pattern {
            Some(pattern) => Stimulator::Pattern(interp.vec_stim(Some(pattern.clone()))?),
            None => {
                let net_stim = interp.net_stim()?;
                stimulus.apply(interp, net_stim)?;
                Stimulator::Periodic(net_stim)
            }
        };
        let defaults = interp.config.stimulus;
        let options = NetConOptions::new()
            .weight(stimulus.weight.unwrap_or(defaults.weight))
            .delay(stimulus.delay.unwrap_or(defaults.delay));
        let netcon = interp.net_con(stimulator, self, options)?;
        interp.registry.unroot(netcon.id());
        Ok(stimulator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::HocError;
    use crate::engine::interpreter::tests::interpreter;
    use crate::engine::objects::HocObject;

    #[test]
    fn unknown_point_processes_are_rejected() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        assert!(matches!(
            p.point_process("NetStim", s, &[]),
            Err(PatchError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn point_process_and_section_reference_each_other() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let syn = p.point_process("ExpSyn", s.segment(0.25), &[]).unwrap();
        assert_eq!(p.references(syn.id()), [HocObject::from(s)]);
        assert_eq!(p.references(s.id()), [HocObject::from(syn)]);
        assert_eq!(syn.location(&p).unwrap(), s.segment(0.25));
        assert_eq!(
            p.point_process("ExpSyn", s, &[]).unwrap().location(&p).unwrap(),
            s.segment(0.5)
        );
    }

    #[test]
    fn out_of_range_location_is_rejected_before_creation() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let before = p.live_objects();
        assert!(p.point_process("ExpSyn", s.segment(2.0), &[]).is_err());
        assert_eq!(p.live_objects(), before);
    }

    #[test]
    fn periodic_stimulus_uses_a_net_stim() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let syn = p.point_process("ExpSyn", s, &[]).unwrap();
        let stimulus = Stimulus::periodic().start(5.0).number(3.0);
        let stim = syn.stimulate(&mut p, &stimulus).unwrap();
        let Stimulator::Periodic(net_stim) = stim else {
            panic!("expected a NetStim, got {stim:?}");
        };
        assert_eq!(net_stim.start(&p).unwrap(), 5.0);
        assert_eq!(net_stim.number(&p).unwrap(), 3.0);

        let nc = p.connection(&stim, &syn, true).unwrap();
        assert_eq!(nc.weight(&p).unwrap(), 0.04);
        assert_eq!(nc.delay(&p).unwrap(), 0.0);
    }

    #[test]
    fn pattern_stimulus_uses_a_vec_stim() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let syn = p.point_process("ExpSyn", s, &[]).unwrap();
        let stimulus = Stimulus::pattern(vec![1.0, 2.0, 3.0]).weight(0.5);
        let stim = syn.stimulate(&mut p, &stimulus).unwrap();
        let Stimulator::Pattern(vec_stim) = stim else {
            panic!("expected a VecStim, got {stim:?}");
        };
        assert_eq!(vec_stim.pattern(&p).unwrap(), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(p.connection(&stim, &syn, true).unwrap().weight(&p).unwrap(), 0.5);
    }

    #[test]
    fn stimulation_is_collected_with_its_endpoints() {
        let mut p = interpreter();
        let before = p.live_objects();
        let s = p.new_section(None).unwrap();
        let syn = p.point_process("ExpSyn", s, &[]).unwrap();
        let stim = syn.stimulate(&mut p, &Stimulus::periodic()).unwrap();
        let nc = p.connection(&stim, &syn, true).unwrap();

        // The synapse keeps the connection and its source alive.
        assert_eq!(p.release(&stim), 0);
        assert!(p.kind_of(nc.id()).is_some());
        assert_eq!(p.release(&syn), 0);
        p.release(&s);
        assert!(p.kind_of(nc.id()).is_none());
        assert_eq!(p.live_objects(), before);
    }

    #[test]
    fn point_process_without_a_section_is_a_section_access_error() {
        let mut p = interpreter();
        let err = p.create("ExpSyn", &[]).unwrap_err();
        assert!(matches!(err, PatchError::Hoc(HocError::General(_))));
        let mut q = interpreter();
        assert!(matches!(
            q.iclamp(0.5, None),
            Err(PatchError::SectionStack(_))
        ));
    }
}
