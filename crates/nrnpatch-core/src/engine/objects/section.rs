use super::{
    Amplitude, Arced, Connectable, Endpoint, IClamp, IClampOptions, Location, NetCon,
    NetConOptions, PointProcess, Recordable, Segment, SynapseOptions, Vector, Wrapped, wrapper,
};
use crate::core::errors::rules::Operation;
use crate::core::errors::{PatchError, Result};
use crate::core::hoc::{RangeRef, Target, Value};
use crate::core::models::facet::{Facet, SectionFacet};
use crate::engine::interpreter::Interpreter;
use nalgebra::Point3;
use std::ops::{Deref, DerefMut};
use tracing::warn;

wrapper!(
    /// A cable section: an unbranched stretch of membrane divided into segments.
    Section
);

impl Connectable for Section {}
impl Arced for Section {}

impl Recordable for Section {
    fn record_ref(&self, interp: &Interpreter) -> Result<RangeRef> {
        self.segment(self.arc()).voltage_ref(interp)
    }
}

/// Diameters of the points added by [`Section::add_3d`].
#[derive(Debug, Clone, PartialEq)]
pub enum Diameters {
    /// Every point gets the section's current diameter.
    Inherit,
    Uniform(f64),
    /// One diameter per point.
    PerPoint(Vec<f64>),
}

fn facet(interp: &Interpreter, section: Section) -> Result<&SectionFacet> {
    match &interp.entry(section.0)?.facet {
        Facet::Section(facet) => Ok(facet),
        _ => Err(PatchError::InvalidArgument(format!(
            "{} is not a section",
            interp.describe(section.0)
        ))),
    }
}

fn facet_mut(interp: &mut Interpreter, section: Section) -> Result<&mut SectionFacet> {
    let name = interp.describe(section.0);
    match &mut interp.entry_mut(section.0)?.facet {
        Facet::Section(facet) => Ok(facet),
        _ => Err(PatchError::InvalidArgument(format!("{} is not a section", name))),
    }
}

impl Section {
    pub fn segment(self, x: f64) -> Segment {
        Segment { section: self, x }
    }

    /// One segment per compartment, at the compartment centers.
    pub fn segments(self, interp: &Interpreter) -> Result<Vec<Segment>> {
        let nseg = self.segment_count(interp)?;
        Ok((0..nseg)
            .map(|i| self.segment((i as f64 + 0.5) / nseg as f64))
            .collect())
    }

    pub fn segment_count(self, interp: &Interpreter) -> Result<usize> {
        Ok(interp.number_attr(self.0, "nseg")? as usize)
    }

    pub fn set_segment_count(self, interp: &mut Interpreter, nseg: usize) -> Result<()> {
        if nseg == 0 {
            return Err(PatchError::InvalidArgument(
                "A section needs at least one segment".to_string(),
            ));
        }
        interp.set_attr(self.0, "nseg", Value::Number(nseg as f64))
    }

    pub fn length(self, interp: &Interpreter) -> Result<f64> {
        interp.number_attr(self.0, "L")
    }

    pub fn set_length(self, interp: &mut Interpreter, length: f64) -> Result<()> {
        interp.set_attr(self.0, "L", Value::Number(length))
    }

    pub fn diameter(self, interp: &Interpreter) -> Result<f64> {
        interp.number_attr(self.0, "diam")
    }

    pub fn set_diameter(self, interp: &mut Interpreter, diameter: f64) -> Result<()> {
        interp.set_attr(self.0, "diam", Value::Number(diameter))
    }

    pub fn set_dimensions(self, interp: &mut Interpreter, length: f64, diameter: f64) -> Result<()> {
        self.set_length(interp, length)?;
        self.set_diameter(interp, diameter)
    }

    /// Appends 3-D points to the section's geometry.
    pub fn add_3d(
        self,
        interp: &mut Interpreter,
        points: &[Point3<f64>],
        diameters: Diameters,
    ) -> Result<()> {
        let diameters = match diameters {
            Diameters::Inherit => vec![self.diameter(interp)?; points.len()],
            Diameters::Uniform(d) => vec![d; points.len()],
            Diameters::PerPoint(d) if d.len() == points.len() => d,
            Diameters::PerPoint(d) => {
                return Err(PatchError::InvalidArgument(format!(
                    "Got {} diameters for {} points",
                    d.len(),
                    points.len()
                )));
            }
        };
        for (point, diameter) in points.iter().zip(diameters) {
            self.call(
                interp,
                "pt3dadd",
                &[
                    Value::Number(point.x),
                    Value::Number(point.y),
                    Value::Number(point.z),
                    Value::Number(diameter),
                ],
            )?;
        }
        Ok(())
    }

    pub fn clear_3d(self, interp: &mut Interpreter) -> Result<()> {
        self.call(interp, "pt3dclear", &[]).map(|_| ())
    }

    pub fn point_count_3d(self, interp: &mut Interpreter) -> Result<usize> {
        let n = self.call(interp, "n3d", &[])?;
        Ok(n.as_number().unwrap_or(0.0) as usize)
    }

    /// The `index`-th 3-D point and its diameter.
    pub fn point_3d(self, interp: &mut Interpreter, index: usize) -> Result<(Point3<f64>, f64)> {
        let i = [Value::Number(index as f64)];
        let mut read = |method: &str| -> Result<f64> {
            let value = self.call(interp, method, &i)?;
            value.as_number().ok_or_else(|| {
                PatchError::Foreign(format!("{} returned a {}", method, value.type_name()))
            })
        };
        let point = Point3::new(read("x3d")?, read("y3d")?, read("z3d")?);
        Ok((point, read("diam3d")?))
    }

    /// Attaches this section to `parent`. The two keep each other alive.
    pub fn connect(self, interp: &mut Interpreter, parent: Section) -> Result<()> {
        let parent_value = interp.transform(&parent)?;
        self.call(interp, "connect", &[parent_value])?;
        interp.reference(self.0, parent.0);
        interp.reference(parent.0, self.0);
        Ok(())
    }

    /// Inserts a density mechanism (`pas`, `hh`, ...).
    pub fn insert(self, interp: &mut Interpreter, mechanism: &str) -> Result<()> {
        self.call(interp, "insert", &[Value::from(mechanism)]).map(|_| ())
    }

    /// Every section of the tree this section belongs to.
    pub fn wholetree(self, interp: &mut Interpreter) -> Result<Vec<Section>> {
        let tree = self.call(interp, "wholetree", &[])?;
        interp.wrap_sections(tree)
    }

    pub fn children(self, interp: &mut Interpreter) -> Result<Vec<Section>> {
        let children = self.call(interp, "children", &[])?;
        interp.wrap_sections(children)
    }

    /// Records the membrane potential at `x`. Each location has one recorder,
    /// created on first use.
    pub fn record(self, interp: &mut Interpreter, x: f64) -> Result<Vector> {
        let key = x.to_bits();
        if let Some(&existing) = facet(interp, self)?.recordings.get(&key) {
            if interp.registry.contains(existing) {
                return Ok(Vector(existing));
            }
        }
        let vector = interp.record(self.segment(x))?;
        interp.reference(self.0, vector.0);
        facet_mut(interp, self)?.recordings.insert(key, vector.0);
        Ok(vector)
    }

    /// The recorders created by [`Section::record`], by location.
    pub fn recordings(self, interp: &Interpreter) -> Result<Vec<(f64, Vector)>> {
        Ok(facet(interp, self)?
            .recordings
            .iter()
            .map(|(x, id)| (f64::from_bits(*x), Vector(*id)))
            .collect())
    }

    /// Places a current clamp on this section.
    pub fn iclamp(self, interp: &mut Interpreter, options: &IClampOptions) -> Result<IClamp> {
        let clamp = interp.iclamp(options.x, Some(self))?;
        let defaults = interp.config().iclamp;
        clamp.set_delay(interp, options.delay.unwrap_or(defaults.delay))?;
        clamp.set_duration(interp, options.duration.unwrap_or(defaults.duration))?;
        let amplitude = options
            .amplitude
            .clone()
            .unwrap_or(Amplitude::Constant(defaults.amplitude));
        match amplitude {
            Amplitude::Constant(amplitude) => clamp.set_amplitude(interp, amplitude)?,
            Amplitude::Waveform(samples) => {
                let waveform = interp.vector(&samples)?;
                let dt = interp.dt()?;
                let amp = RangeRef::new(Target::Object(interp.handle(clamp.0)?), "amp");
                waveform.play(interp, amp, Some(dt))?;
                interp.reference(clamp.0, waveform.0);
                interp.release(&waveform);
            }
        }
        Ok(clamp)
    }

    /// Places a point process on this section and applies `options`.
    pub fn synapse(
        self,
        interp: &mut Interpreter,
        template: &str,
        options: &SynapseOptions,
    ) -> Result<PointProcess> {
        let location = match options.x {
            Some(x) => Location::Segment(self.segment(x)),
            None => Location::Section(self),
        };
        let synapse = interp.point_process(template, location, &options.args)?;
        for (name, value) in &options.attributes {
            synapse.set_attr(interp, name, Value::Number(*value))?;
        }
        if options.store {
            facet_mut(interp, self)?.synapses.push(synapse.0);
        }
        Ok(synapse)
    }

    /// Synapses created with [`SynapseOptions::store`] set.
    pub fn synapses(self, interp: &Interpreter) -> Result<Vec<PointProcess>> {
        Ok(facet(interp, self)?
            .synapses
            .iter()
            .map(|id| PointProcess(*id))
            .collect())
    }

    /// Connects the membrane potential at `x` to `synapse`.
    pub fn connect_synapse(
        self,
        interp: &mut Interpreter,
        synapse: impl Into<Endpoint>,
        x: Option<f64>,
        options: NetConOptions,
    ) -> Result<NetCon> {
        let source = self.segment(x.unwrap_or_else(|| self.arc()));
        interp.net_con(source, synapse, options)
    }

    /// Makes this the currently accessed section until the guard is dropped.
    pub fn push(self, interp: &mut Interpreter) -> Result<PushedSection<'_>> {
        let handle = interp.handle(self.0)?;
        let name = interp.describe(self.0);
        interp.call_on(Target::Object(handle), &name, "push", &[], Operation::SectionAccess)?;
        Ok(PushedSection {
            interp,
            section: self,
            pop_on_drop: true,
        })
    }

    /// Pops this section off the section stack. It must be on top.
    pub fn pop(self, interp: &mut Interpreter) -> Result<()> {
        match interp.cas()? {
            Some(top) if top == self => interp.pop_section(),
            _ => Err(PatchError::SectionStack(format!(
                "Cannot pop {}: it is not the currently accessed section",
                interp.describe(self.0)
            ))),
        }
    }
}

/// A section pushed onto the section stack. Popped again when dropped, unless
/// [`PushedSection::keep`] is called.
#[derive(Debug)]
pub struct PushedSection<'a> {
    interp: &'a mut Interpreter,
    section: Section,
    pop_on_drop: bool,
}

impl PushedSection<'_> {
    pub fn section(&self) -> Section {
        self.section
    }

    /// Leaves the section on the stack.
    pub fn keep(mut self) {
        self.pop_on_drop = false;
    }
}

impl Deref for PushedSection<'_> {
    type Target = Interpreter;

    fn deref(&self) -> &Interpreter {
        self.interp
    }
}

impl DerefMut for PushedSection<'_> {
    fn deref_mut(&mut self) -> &mut Interpreter {
        self.interp
    }
}

impl Drop for PushedSection<'_> {
    fn drop(&mut self) {
        if self.pop_on_drop {
            if let Err(err) = self.section.pop(self.interp) {
                warn!(error = %err, "Failed to pop section on guard drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::interpreter::tests::interpreter;
    use crate::engine::objects::HocObject;

    #[test]
    fn segments_are_centered_in_their_compartments() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        s.set_segment_count(&mut p, 5).unwrap();
        let xs: Vec<f64> = s.segments(&p).unwrap().iter().map(|seg| seg.x).collect();
        assert_eq!(xs, [0.1, 0.3, 0.5, 0.7, 0.9]);
        assert!(s.set_segment_count(&mut p, 0).is_err());
    }

    #[test]
    fn set_dimensions_updates_length_and_diameter() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        s.set_dimensions(&mut p, 10.0, 10.0).unwrap();
        assert_eq!(s.length(&p).unwrap(), 10.0);
        assert_eq!(s.diameter(&p).unwrap(), 10.0);
    }

    #[test]
    fn add_3d_inherits_or_takes_diameters() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        s.set_dimensions(&mut p, 10.0, 10.0).unwrap();
        s.add_3d(&mut p, &[Point3::origin()], Diameters::Inherit).unwrap();
        assert_eq!(s.point_3d(&mut p, 0).unwrap(), (Point3::origin(), 10.0));

        s.clear_3d(&mut p).unwrap();
        s.add_3d(
            &mut p,
            &[Point3::new(0.0, 2.0, 0.0), Point3::new(4.0, 3.0, 2.0)],
            Diameters::Uniform(4.0),
        )
        .unwrap();
        assert_eq!(s.point_count_3d(&mut p).unwrap(), 2);
        let (second, _) = s.point_3d(&mut p, 1).unwrap();
        assert_eq!(second.z, 2.0);
        assert_eq!(s.point_3d(&mut p, 0).unwrap().1, 4.0);

        let err = s
            .add_3d(&mut p, &[Point3::origin()], Diameters::PerPoint(vec![1.0, 2.0]))
            .unwrap_err();
        assert!(matches!(err, PatchError::InvalidArgument(_)));
    }

    #[test]
    fn wholetree_matches_interpreter_topology() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let children: Vec<Section> = (0..3).map(|_| p.new_section(None).unwrap()).collect();
        for child in &children {
            child.connect(&mut p, s).unwrap();
        }
        let tree = s.wholetree(&mut p).unwrap();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree[0], s);
        assert_eq!(s.children(&mut p).unwrap(), children);
    }

    #[test]
    fn connect_creates_mutual_references() {
        let mut p = interpreter();
        let a = p.new_section(None).unwrap();
        let b = p.new_section(None).unwrap();
        a.connect(&mut p, b).unwrap();
        assert_eq!(p.references(a.id()), [HocObject::from(b)]);
        assert_eq!(p.references(b.id()), [HocObject::from(a)]);
    }

    #[test]
    fn record_keeps_one_recorder_per_location() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let r = s.record(&mut p, 0.5).unwrap();
        let r2 = s.record(&mut p, 0.7).unwrap();
        assert_ne!(r, r2);
        assert_eq!(s.record(&mut p, 0.5).unwrap(), r);
        assert_eq!(s.recordings(&p).unwrap().len(), 2);
    }

    #[test]
    fn push_guard_pops_on_drop() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let s2 = p.new_section(None).unwrap();
        s.push(&mut p).unwrap().keep();
        assert_eq!(p.cas().unwrap(), Some(s));
        {
            let mut pushed = s2.push(&mut p).unwrap();
            assert_eq!(pushed.cas().unwrap(), Some(s2));
        }
        assert_eq!(p.cas().unwrap(), Some(s));
        assert!(matches!(s2.pop(&mut p), Err(PatchError::SectionStack(_))));
        s.pop(&mut p).unwrap();
        assert_eq!(p.cas().unwrap(), None);
    }

    #[test]
    fn synapse_references_section_both_ways_and_stores_on_request() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let syn = s
            .synapse(&mut p, "ExpSyn", &SynapseOptions::default())
            .unwrap();
        assert_eq!(p.references(s.id()), [HocObject::from(syn)]);
        assert_eq!(p.references(syn.id()), [HocObject::from(s)]);
        assert!(s.synapses(&p).unwrap().is_empty());

        let options = SynapseOptions {
            store: true,
            attributes: vec![("tau".to_string(), 2.0)],
            ..SynapseOptions::default()
        };
        let stored = s.synapse(&mut p, "ExpSyn", &options).unwrap();
        assert_eq!(s.synapses(&p).unwrap(), [stored]);
        assert_eq!(stored.attr(&p, "tau").unwrap(), Value::Number(2.0));
    }

    #[test]
    fn iclamp_with_waveform_plays_into_amplitude() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let options = IClampOptions {
            amplitude: Some(Amplitude::Waveform(vec![-10.0; 400])),
            ..IClampOptions::default()
        };
        let clamp = s.iclamp(&mut p, &options).unwrap();
        assert_eq!(clamp.duration(&p).unwrap(), 100.0);
        assert_eq!(p.references(clamp.id()).len(), 2);
        assert!(
            p.hoc()
                .transcript()
                .iter()
                .any(|line| line.ends_with(".play(&IClamp[0].amp, 0.025)"))
        );
    }

    #[test]
    fn connect_synapse_uses_the_membrane_potential_as_source() {
        let mut p = interpreter();
        let s1 = p.new_section(None).unwrap();
        let s2 = p.new_section(None).unwrap();
        let syn = s2.synapse(&mut p, "ExpSyn", &SynapseOptions::default()).unwrap();
        let nc = s1
            .connect_synapse(&mut p, syn, None, NetConOptions::default())
            .unwrap();
        assert_eq!(p.connection(&s1, &syn, true).unwrap(), nc);
    }
}
