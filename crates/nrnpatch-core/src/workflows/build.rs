use crate::core::errors::PatchError;
use crate::engine::interpreter::Interpreter;
use crate::engine::objects::{
    Amplitude, Diameters, HocObject, IClampOptions, NetCon, NetConOptions, PointProcess, Section,
    Stimulator, Stimulus, SynapseOptions, Vector,
};
use nalgebra::Point3;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to read model file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse model file '{path}': {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Model refers to unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },
    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },
    #[error("Invalid model: {0}")]
    Invalid(String),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionSpec {
    pub name: String,
    pub length: Option<f64>,
    pub diameter: Option<f64>,
    pub nseg: Option<usize>,
    /// Name of the section this one is attached to.
    pub parent: Option<String>,
    #[serde(default)]
    pub mechanisms: Vec<String>,
    /// 3-D points as `[x, y, z, diameter]`.
    #[serde(default)]
    pub points: Vec<[f64; 4]>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynapseSpec {
    pub name: String,
    pub section: String,
    pub template: String,
    pub x: Option<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StimulusSpec {
    pub name: String,
    /// The synapse driven by the stimulus.
    pub target: String,
    pub pattern: Option<Vec<f64>>,
    pub start: Option<f64>,
    pub number: Option<f64>,
    pub interval: Option<f64>,
    pub noise: Option<f64>,
    pub weight: Option<f64>,
    pub delay: Option<f64>,
}

/// A connection from the membrane potential of a section to a synapse.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSpec {
    pub source: String,
    pub target: String,
    pub x: Option<f64>,
    pub weight: Option<f64>,
    pub delay: Option<f64>,
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum ClampSpec {
    Current {
        section: String,
        #[serde(default = "default_x")]
        x: f64,
        delay: Option<f64>,
        duration: Option<f64>,
        amplitude: Option<f64>,
        waveform: Option<Vec<f64>>,
    },
    Voltage {
        section: String,
        #[serde(default = "default_x")]
        x: f64,
        delay: Option<f64>,
        duration: Option<f64>,
        level: Option<f64>,
    },
}

fn default_x() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordingSpec {
    pub section: String,
    #[serde(default = "default_x")]
    pub x: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSpec {
    pub tstop: f64,
    pub v_init: Option<f64>,
    pub dt: Option<f64>,
}

/// A declarative description of a model.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    pub name: Option<String>,
    #[serde(default, rename = "section")]
    pub sections: Vec<SectionSpec>,
    #[serde(default, rename = "synapse")]
    pub synapses: Vec<SynapseSpec>,
    #[serde(default, rename = "stimulus")]
    pub stimuli: Vec<StimulusSpec>,
    #[serde(default, rename = "connection")]
    pub connections: Vec<ConnectionSpec>,
    #[serde(default, rename = "clamp")]
    pub clamps: Vec<ClampSpec>,
    #[serde(default, rename = "recording")]
    pub recordings: Vec<RecordingSpec>,
    pub run: Option<RunSpec>,
}

impl ModelSpec {
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let content = std::fs::read_to_string(path).map_err(|e| BuildError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| BuildError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }
}

/// Handles to everything a [`ModelSpec`] created, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltModel {
    pub sections: BTreeMap<String, Section>,
    pub synapses: BTreeMap<String, PointProcess>,
    pub stimuli: BTreeMap<String, Stimulator>,
    pub connections: Vec<NetCon>,
    pub clamps: Vec<HocObject>,
    /// Membrane potential recordings keyed by `section(x)`.
    pub recordings: BTreeMap<String, Vector>,
    pub time: Option<Vector>,
}

impl BuiltModel {
    pub fn section(&self, name: &str) -> Result<Section, BuildError> {
        lookup(&self.sections, "section", name)
    }

    pub fn synapse(&self, name: &str) -> Result<PointProcess, BuildError> {
        lookup(&self.synapses, "synapse", name)
    }
}

fn lookup<T: Copy>(map: &BTreeMap<String, T>, kind: &'static str, name: &str) -> Result<T, BuildError> {
    map.get(name).copied().ok_or_else(|| BuildError::UnknownName {
        kind,
        name: name.to_string(),
    })
}

fn check_unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> Result<(), BuildError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(BuildError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Builds `spec` in `interp` and, if the model asks for it, runs the simulation.
#[instrument(skip_all, name = "build_workflow", fields(model = spec.name.as_deref().unwrap_or("unnamed")))]
pub fn run(interp: &mut Interpreter, spec: &ModelSpec) -> Result<BuiltModel, BuildError> {
    check_unique("section", spec.sections.iter().map(|s| s.name.as_str()))?;
    check_unique("synapse", spec.synapses.iter().map(|s| s.name.as_str()))?;
    check_unique("stimulus", spec.stimuli.iter().map(|s| s.name.as_str()))?;

    let mut model = BuiltModel::default();
    build_sections(interp, spec, &mut model)?;

    for synapse in &spec.synapses {
        let section = model.section(&synapse.section)?;
        let options = SynapseOptions {
            x: synapse.x,
            attributes: synapse
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), *value))
                .collect(),
            store: true,
            args: Vec::new(),
        };
        let pp = section.synapse(interp, &synapse.template, &options)?;
        model.synapses.insert(synapse.name.clone(), pp);
    }

    for stimulus in &spec.stimuli {
        let target = model.synapse(&stimulus.target)?;
        let settings = Stimulus {
            pattern: stimulus.pattern.clone(),
            start: stimulus.start,
            number: stimulus.number,
            interval: stimulus.interval,
            noise: stimulus.noise,
            weight: stimulus.weight,
            delay: stimulus.delay,
        };
        let stimulator = target.stimulate(interp, &settings)?;
        model.stimuli.insert(stimulus.name.clone(), stimulator);
    }

    for connection in &spec.connections {
        let source = model.section(&connection.source)?;
        let target = model.synapse(&connection.target)?;
        let options = NetConOptions {
            weight: connection.weight,
            delay: connection.delay,
            threshold: connection.threshold,
        };
        let netcon = source.connect_synapse(interp, target, connection.x, options)?;
        model.connections.push(netcon);
    }

    for clamp in &spec.clamps {
        model.clamps.push(build_clamp(interp, &model, clamp)?);
    }

    for recording in &spec.recordings {
        let section = model.section(&recording.section)?;
        let vector = section.record(interp, recording.x)?;
        model
            .recordings
            .insert(format!("{}({})", recording.section, recording.x), vector);
    }

    info!(
        sections = model.sections.len(),
        synapses = model.synapses.len(),
        stimuli = model.stimuli.len(),
        connections = model.connections.len(),
        "Model built."
    );

    if let Some(run) = &spec.run {
        model.time = Some(interp.time()?);
        if let Some(dt) = run.dt {
            interp.set_dt(dt)?;
        }
        interp.finitialize(run.v_init)?;
        interp.continuerun(run.tstop, false)?;
        info!(tstop = run.tstop, "Simulation finished.");
    }
    Ok(model)
}

fn build_sections(interp: &mut Interpreter, spec: &ModelSpec, model: &mut BuiltModel) -> Result<(), BuildError> {
    for section_spec in &spec.sections {
        let section = interp.new_section(Some(&section_spec.name))?;
        if let Some(nseg) = section_spec.nseg {
            section.set_segment_count(interp, nseg)?;
        }
        if let Some(length) = section_spec.length {
            section.set_length(interp, length)?;
        }
        if let Some(diameter) = section_spec.diameter {
            section.set_diameter(interp, diameter)?;
        }
        for mechanism in &section_spec.mechanisms {
            section.insert(interp, mechanism)?;
        }
        if !section_spec.points.is_empty() {
            let points: Vec<Point3<f64>> = section_spec
                .points
                .iter()
                .map(|p| Point3::new(p[0], p[1], p[2]))
                .collect();
            let diameters = section_spec.points.iter().map(|p| p[3]).collect();
            section.add_3d(interp, &points, Diameters::PerPoint(diameters))?;
        }
        model.sections.insert(section_spec.name.clone(), section);
    }

    for section_spec in &spec.sections {
        if let Some(parent) = &section_spec.parent {
            let child = model.section(&section_spec.name)?;
            let parent = model.section(parent)?;
            debug!(child = %section_spec.name, parent = %interp.describe(parent.0), "Connecting sections.");
            child.connect(interp, parent)?;
        }
    }
    Ok(())
}

fn build_clamp(interp: &mut Interpreter, model: &BuiltModel, clamp: &ClampSpec) -> Result<HocObject, BuildError> {
    match clamp {
        ClampSpec::Current {
            section,
            x,
            delay,
            duration,
            amplitude,
            waveform,
        } => {
            let amplitude = match (amplitude, waveform) {
                (Some(_), Some(_)) => {
                    return Err(BuildError::Invalid(format!(
                        "Current clamp on '{}' has both an amplitude and a waveform",
                        section
                    )));
                }
                (Some(amplitude), None) => Some(Amplitude::Constant(*amplitude)),
                (None, Some(waveform)) => Some(Amplitude::Waveform(waveform.clone())),
                (None, None) => None,
            };
            let options = IClampOptions {
                x: *x,
                delay: *delay,
                duration: *duration,
                amplitude,
            };
            let clamp = model.section(section)?.iclamp(interp, &options)?;
            Ok(clamp.into())
        }
        ClampSpec::Voltage {
            section,
            x,
            delay,
            duration,
            level,
        } => {
            let clamp = interp.se_clamp(model.section(section)?, *x)?;
            if let Some(delay) = delay {
                clamp.set_delay(interp, *delay)?;
            }
            if let Some(duration) = duration {
                clamp.set_duration(interp, *duration)?;
            }
            if let Some(level) = level {
                clamp.set_level(interp, *level)?;
            }
            Ok(clamp.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hoc::memory::MemoryHoc;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MODEL: &str = r#"
name = "two-cell"

[[section]]
name = "soma"
length = 20.0
diameter = 20.0
mechanisms = ["hh"]

[[section]]
name = "dend"
parent = "soma"
nseg = 5
points = [[0.0, 0.0, 0.0, 2.0], [0.0, 100.0, 0.0, 1.0]]

[[section]]
name = "target"

[[synapse]]
name = "input"
section = "dend"
template = "ExpSyn"
x = 0.9
attributes = { tau = 2.0 }

[[synapse]]
name = "relay"
section = "target"
template = "ExpSyn"

[[stimulus]]
name = "drive"
target = "input"
start = 5.0
number = 3.0

[[connection]]
source = "soma"
target = "relay"
weight = 0.2

[[clamp]]
kind = "current"
section = "soma"
amplitude = 0.5

[[clamp]]
kind = "voltage"
section = "target"
level = -50.0

[[recording]]
section = "soma"

[run]
tstop = 40.0
v_init = -70.0
"#;

    fn write_model(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn interpreter() -> Interpreter {
        Interpreter::with_defaults(Box::new(MemoryHoc::new())).unwrap()
    }

    #[test]
    fn load_parses_every_table() {
        let file = write_model(MODEL);
        let spec = ModelSpec::load(file.path()).unwrap();
        assert_eq!(spec.name.as_deref(), Some("two-cell"));
        assert_eq!(spec.sections.len(), 3);
        assert_eq!(spec.sections[1].points.len(), 2);
        assert_eq!(spec.clamps.len(), 2);
        assert!(matches!(spec.clamps[1], ClampSpec::Voltage { x, .. } if x == 0.5));
        assert_eq!(spec.run.as_ref().map(|r| r.tstop), Some(40.0));
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let missing = ModelSpec::load(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(matches!(missing, BuildError::Io { .. }));
        let file = write_model("[[section]]\nname = 1\n");
        assert!(matches!(
            ModelSpec::load(file.path()).unwrap_err(),
            BuildError::Toml { .. }
        ));
    }

    #[test]
    fn run_builds_the_whole_model() {
        let spec: ModelSpec = toml::from_str(MODEL).unwrap();
        let mut p = interpreter();
        let model = run(&mut p, &spec).unwrap();

        let soma = model.section("soma").unwrap();
        let dend = model.section("dend").unwrap();
        assert_eq!(soma.length(&p).unwrap(), 20.0);
        assert_eq!(dend.segment_count(&p).unwrap(), 5);
        assert_eq!(dend.point_count_3d(&mut p).unwrap(), 2);
        assert_eq!(soma.children(&mut p).unwrap(), [dend]);
        assert_eq!(dend.synapses(&p).unwrap(), [model.synapse("input").unwrap()]);

        let drive = model.stimuli["drive"];
        let input = model.synapse("input").unwrap();
        assert!(p.connection(&drive, &input, true).is_ok());
        let relay = model.synapse("relay").unwrap();
        assert_eq!(p.connection(&soma, &relay, true).unwrap().weight(&p).unwrap(), 0.2);

        assert_eq!(model.clamps.len(), 2);
        assert!(model.recordings.contains_key("soma(0.5)"));
        assert!(model.time.is_some());
        assert_eq!(p.t().unwrap(), 40.0);
    }

    #[test]
    fn unknown_references_are_reported_by_name() {
        let spec: ModelSpec = toml::from_str(
            "[[section]]\nname = \"soma\"\n\n[[synapse]]\nname = \"s\"\nsection = \"axon\"\ntemplate = \"ExpSyn\"\n",
        )
        .unwrap();
        let err = run(&mut interpreter(), &spec).unwrap_err();
        assert!(matches!(err, BuildError::UnknownName { kind: "section", ref name } if name == "axon"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let spec: ModelSpec =
            toml::from_str("[[section]]\nname = \"soma\"\n\n[[section]]\nname = \"soma\"\n").unwrap();
        assert!(matches!(
            run(&mut interpreter(), &spec).unwrap_err(),
            BuildError::DuplicateName { kind: "section", .. }
        ));
    }

    #[test]
    fn current_clamp_cannot_have_amplitude_and_waveform() {
        let spec: ModelSpec = toml::from_str(
            "[[section]]\nname = \"soma\"\n\n[[clamp]]\nkind = \"current\"\nsection = \"soma\"\namplitude = 1.0\nwaveform = [1.0]\n",
        )
        .unwrap();
        assert!(matches!(
            run(&mut interpreter(), &spec).unwrap_err(),
            BuildError::Invalid(_)
        ));
    }
}
