use super::{Hoc, HocFault, HocRef, MechanismKind, Target, Value};
use phf::{Map, phf_map};
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::{E, PI};

const HOC_ERROR: &str = "hoc error";
const SECTION_TEMPLATE: &str = "Section";

/// Attribute defaults of the templates the in-memory interpreter knows about.
#[rustfmt::skip]
static TEMPLATE_DEFAULTS: Map<&'static str, &'static [(&'static str, f64)]> = phf_map! {
    "Section" => &[("nseg", 1.0), ("L", 100.0), ("diam", 500.0), ("Ra", 35.4), ("cm", 1.0)],
    "NetCon" => &[("delay", 1.0), ("threshold", 10.0), ("x", 0.0)],
    "NetStim" => &[("interval", 10.0), ("number", 10.0), ("start", 50.0), ("noise", 0.0)],
    "VecStim" => &[("ping", 1.0)],
    "IClamp" => &[("del", 0.0), ("dur", 0.0), ("amp", 0.0), ("i", 0.0)],
    "SEClamp" => &[("dur1", 0.0), ("dur2", 0.0), ("dur3", 0.0), ("amp1", 0.0), ("amp2", 0.0), ("amp3", 0.0), ("rs", 1.0), ("i", 0.0)],
    "VClamp" => &[("dur", 0.0), ("amp", 0.0), ("gain", 1e5), ("rstim", 1.0), ("i", 0.0)],
    "OClamp" => &[("on", 0.0), ("off", 0.0), ("rs", 1.0), ("vc", 0.0), ("i", 0.0)],
    "ExpSyn" => &[("tau", 0.1), ("e", 0.0), ("i", 0.0), ("g", 0.0)],
    "Exp2Syn" => &[("tau1", 0.1), ("tau2", 10.0), ("e", 0.0), ("i", 0.0), ("g", 0.0)],
    "AlphaSynapse" => &[("onset", 0.0), ("tau", 0.1), ("gmax", 0.0), ("e", 0.0), ("i", 0.0)],
    "APCount" => &[("n", 0.0), ("thresh", -20.0), ("time", 0.0)],
    "PointProcessMark" => &[("mark", 0.0)],
};

#[rustfmt::skip]
static BUILTIN_MECHANISMS: Map<&'static str, MechanismKind> = phf_map! {
    "APCount" => MechanismKind::PointProcess,
    "AlphaSynapse" => MechanismKind::PointProcess,
    "Exp2Syn" => MechanismKind::PointProcess,
    "ExpSyn" => MechanismKind::PointProcess,
    "IClamp" => MechanismKind::PointProcess,
    "OClamp" => MechanismKind::PointProcess,
    "PointProcessMark" => MechanismKind::PointProcess,
    "SEClamp" => MechanismKind::PointProcess,
    "VClamp" => MechanismKind::PointProcess,
    "NetStim" => MechanismKind::ArtificialCell,
    "VecStim" => MechanismKind::ArtificialCell,
    "extracellular" => MechanismKind::Density,
    "fastpas" => MechanismKind::Density,
    "hh" => MechanismKind::Density,
    "k_ion" => MechanismKind::Density,
    "na_ion" => MechanismKind::Density,
    "pas" => MechanismKind::Density,
};

#[rustfmt::skip]
static GLOBAL_DEFAULTS: &[(&str, f64)] = &[
    ("t", 0.0), ("dt", 0.025), ("celsius", 6.3), ("tstop", 5.0),
    ("v_init", -65.0), ("secondorder", 0.0), ("E", E), ("PI", PI),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Section,
    SectionRef,
    Vector,
    NetCon,
    ParallelContext,
    Mechanism(MechanismKind),
}

#[derive(Debug, Clone, Default)]
struct MemObject {
    template: String,
    name: String,
    attrs: HashMap<String, Value>,
    arrays: HashMap<String, Vec<f64>>,
    data: Vec<f64>,
    points: Vec<[f64; 4]>,
    parent: Option<HocRef>,
    mechanisms: Vec<String>,
    location: Option<(HocRef, f64)>,
    section: Option<HocRef>,
}

/// An interpreter that lives entirely in memory.
///
/// It keeps the object graph, attribute values and section topology the way the
/// simulator would, and reproduces the simulator's error output for the failure
/// modes the translation layer knows about. It performs no numerical integration:
/// advancing the clock only moves `t`. Every mutating call is appended to a
/// transcript written in hoc syntax.
#[derive(Debug, Clone)]
pub struct MemoryHoc {
    objects: BTreeMap<HocRef, MemObject>,
    next_id: u64,
    counters: HashMap<String, usize>,
    classes: BTreeMap<String, Class>,
    libraries: HashMap<String, Vec<(String, MechanismKind)>>,
    globals: HashMap<String, Value>,
    segment_attrs: HashMap<(HocRef, u64, String), Value>,
    section_stack: Vec<HocRef>,
    loaded_files: Vec<String>,
    gids: HashMap<i64, i64>,
    rank: i64,
    nhost: i64,
    output: String,
    transcript: Vec<String>,
}

impl Default for MemoryHoc {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHoc {
    /// Creates an interpreter with the simulator's built-in templates and mechanisms.
    pub fn new() -> Self {
        let mut classes = BTreeMap::new();
        classes.insert(SECTION_TEMPLATE.to_string(), Class::Section);
        classes.insert("SectionRef".to_string(), Class::SectionRef);
        classes.insert("Vector".to_string(), Class::Vector);
        classes.insert("NetCon".to_string(), Class::NetCon);
        classes.insert("ParallelContext".to_string(), Class::ParallelContext);
        for (name, kind) in BUILTIN_MECHANISMS.entries() {
            classes.insert(name.to_string(), Class::Mechanism(*kind));
        }

        let globals = GLOBAL_DEFAULTS
            .iter()
            .map(|(name, value)| (name.to_string(), Value::Number(*value)))
            .collect();

        Self {
            objects: BTreeMap::new(),
            next_id: 1,
            counters: HashMap::new(),
            classes,
            libraries: HashMap::new(),
            globals,
            segment_attrs: HashMap::new(),
            section_stack: Vec::new(),
            loaded_files: Vec::new(),
            gids: HashMap::new(),
            rank: 0,
            nhost: 1,
            output: String::new(),
            transcript: Vec::new(),
        }
    }

    /// Pretends to be node `rank` out of `nhost` parallel nodes.
    pub fn with_rank(mut self, rank: i64, nhost: i64) -> Self {
        self.rank = rank;
        self.nhost = nhost.max(1);
        self
    }

    /// Makes a compiled mechanism library available to `nrn_load_dll`.
    pub fn with_library(mut self, path: &str, mechanisms: &[(&str, MechanismKind)]) -> Self {
        self.libraries.insert(
            path.to_string(),
            mechanisms
                .iter()
                .map(|(name, kind)| (name.to_string(), *kind))
                .collect(),
        );
        self
    }

    pub fn loaded_files(&self) -> &[String] {
        &self.loaded_files
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn contains(&self, obj: HocRef) -> bool {
        self.objects.contains_key(&obj)
    }

    fn fail(&mut self, message: &str) -> HocFault {
        self.output.push_str("NEURON: ");
        self.output.push_str(message);
        self.output.push_str("\n near line 0\n ^\n");
        HocFault::runtime(HOC_ERROR)
    }

    fn object(&self, obj: HocRef) -> Result<&MemObject, HocFault> {
        self.objects
            .get(&obj)
            .ok_or_else(|| HocFault::runtime(format!("object {} has been released", obj)))
    }

    fn object_mut(&mut self, obj: HocRef) -> Result<&mut MemObject, HocFault> {
        self.objects
            .get_mut(&obj)
            .ok_or_else(|| HocFault::runtime(format!("object {} has been released", obj)))
    }

    fn class_of(&self, obj: HocRef) -> Option<Class> {
        self.objects
            .get(&obj)
            .and_then(|o| self.classes.get(&o.template))
            .copied()
    }

    fn is_section(&self, obj: HocRef) -> bool {
        self.class_of(obj) == Some(Class::Section)
    }

    fn is_netcon_endpoint(&self, obj: HocRef) -> bool {
        matches!(
            self.class_of(obj),
            Some(Class::Mechanism(
                MechanismKind::PointProcess | MechanismKind::ArtificialCell
            ))
        )
    }

    fn sections(&self) -> impl Iterator<Item = HocRef> + '_ {
        self.objects
            .iter()
            .filter(|(_, o)| o.template == SECTION_TEMPLATE)
            .map(|(id, _)| *id)
    }

    fn root_of(&self, mut section: HocRef) -> HocRef {
        while let Some(parent) = self.objects.get(&section).and_then(|o| o.parent) {
            section = parent;
        }
        section
    }

    fn render(&self, value: &Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Number(n) => format!("{}", n),
            Value::Text(s) => format!("\"{}\"", s),
            Value::Object(obj) => self.name_of(*obj),
            Value::Segment(sec, x) => format!("{}({})", self.name_of(*sec), x),
            Value::Pointer(ptr) => format!("&{}", self.render_target(ptr.target, &ptr.variable)),
            Value::List(items) => format!(
                "[{}]",
                items
                    .iter()
                    .map(|v| self.render(v))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    fn render_target(&self, target: Target, name: &str) -> String {
        match target {
            Target::Global => name.to_string(),
            Target::Object(obj) => format!("{}.{}", self.name_of(obj), name),
            Target::Segment(sec, x) => format!("{}.{}({})", self.name_of(sec), name, x),
        }
    }

    fn render_args(&self, args: &[Value]) -> String {
        args.iter()
            .map(|v| self.render(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn allocate(&mut self, template: &str, name: Option<String>) -> HocRef {
        let id = HocRef::new(self.next_id);
        self.next_id += 1;
        let index = self.counters.entry(template.to_string()).or_insert(0);
        let name = name.unwrap_or_else(|| {
            if template == SECTION_TEMPLATE {
                format!("__nrnsec_{}", id)
            } else {
                format!("{}[{}]", template, index)
            }
        });
        *index += 1;

        let mut object = MemObject {
            template: template.to_string(),
            name,
            ..MemObject::default()
        };
        if let Some(defaults) = TEMPLATE_DEFAULTS.get(template) {
            for (attr, value) in defaults.iter() {
                object.attrs.insert(attr.to_string(), Value::Number(*value));
            }
        }
        self.objects.insert(id, object);
        id
    }

    fn index_arg(args: &[Value], position: usize) -> Option<usize> {
        args.get(position)
            .and_then(Value::as_number)
            .filter(|n| *n >= 0.0)
            .map(|n| n as usize)
    }

    fn numbers(value: &Value) -> Option<Vec<f64>> {
        match value {
            Value::List(items) => items.iter().map(Value::as_number).collect(),
            Value::Number(n) => Some(vec![0.0; n.max(0.0) as usize]),
            _ => None,
        }
    }

    fn create_netcon(&mut self, args: &[Value]) -> Result<HocRef, HocFault> {
        let source = args.first().cloned().unwrap_or_default();
        let target = args.get(1).cloned().unwrap_or_default();
        for (position, endpoint) in [(1, &source), (2, &target)] {
            match endpoint {
                Value::Nil => {}
                Value::Pointer(_) if position == 1 => {}
                Value::Object(obj) if self.is_netcon_endpoint(*obj) => {}
                Value::Object(_) | Value::Segment(..) | Value::Pointer(_) => {
                    return Err(self.fail(&format!(
                        "arg {} must be a point process or NULLObject",
                        position
                    )));
                }
                _ => return Err(self.fail("interpreter stack type error")),
            }
        }
        let id = self.allocate("NetCon", None);
        let object = self.object_mut(id)?;
        object.arrays.insert("weight".to_string(), vec![0.0]);
        object.attrs.insert("pre".to_string(), source);
        object.attrs.insert("syn".to_string(), target);
        Ok(id)
    }

    fn create_point_process(
        &mut self,
        template: &str,
        kind: MechanismKind,
        args: &[Value],
    ) -> Result<HocRef, HocFault> {
        if kind == MechanismKind::ArtificialCell {
            return Ok(self.allocate(template, None));
        }
        let location = match args.first() {
            Some(Value::Segment(sec, x)) if self.is_section(*sec) => (*sec, *x),
            Some(Value::Number(x)) => match self.section_stack.last() {
                Some(sec) => (*sec, *x),
                None => return Err(self.fail("Section access unspecified")),
            },
            None => match self.section_stack.last() {
                Some(sec) => (*sec, 0.5),
                None => return Err(self.fail("Section access unspecified")),
            },
            Some(_) => return Err(self.fail("interpreter stack type error")),
        };
        let id = self.allocate(template, None);
        self.object_mut(id)?.location = Some(location);
        Ok(id)
    }

    fn call_global(&mut self, method: &str, args: &[Value]) -> Result<Value, HocFault> {
        match method {
            "load_file" => {
                let path = match args.first() {
                    Some(Value::Text(path)) => path.clone(),
                    _ => return Err(self.fail("load_file expects a file name")),
                };
                if !self.loaded_files.contains(&path) {
                    self.loaded_files.push(path);
                }
                Ok(Value::Number(1.0))
            }
            "nrn_load_dll" => {
                let path = match args.first() {
                    Some(Value::Text(path)) => path.clone(),
                    _ => return Err(self.fail("nrn_load_dll expects a file name")),
                };
                match self.libraries.get(&path).cloned() {
                    Some(mechanisms) => {
                        for (name, kind) in mechanisms {
                            self.classes.insert(name, Class::Mechanism(kind));
                        }
                        Ok(Value::Number(1.0))
                    }
                    None => Ok(Value::Number(0.0)),
                }
            }
            "finitialize" => {
                if let Some(v) = args.first().and_then(Value::as_number) {
                    self.globals.insert("v_init".to_string(), Value::Number(v));
                }
                self.globals.insert("t".to_string(), Value::Number(0.0));
                Ok(Value::Number(1.0))
            }
            "continuerun" => {
                let stop = args
                    .first()
                    .and_then(Value::as_number)
                    .ok_or_else(|| self.fail("continuerun expects a stop time"))?;
                self.globals.insert("t".to_string(), Value::Number(stop));
                Ok(Value::Number(0.0))
            }
            "run" => {
                if let Some(stop) = args.first().and_then(Value::as_number) {
                    self.globals.insert("tstop".to_string(), Value::Number(stop));
                }
                let stop = self.globals.get("tstop").cloned().unwrap_or_default();
                self.globals.insert("t".to_string(), stop);
                Ok(Value::Number(0.0))
            }
            "cas" => match self.section_stack.last() {
                Some(sec) => Ok(Value::Object(*sec)),
                None => Err(self.fail("Section access unspecified")),
            },
            "pop_section" => match self.section_stack.pop() {
                Some(_) => Ok(Value::Number(0.0)),
                None => Err(self.fail("Section access unspecified")),
            },
            "allsec" => Ok(Value::List(self.sections().map(Value::Object).collect())),
            _ => Err(HocFault::UnknownAttribute {
                name: method.to_string(),
            }),
        }
    }

    fn call_section(
        &mut self,
        sec: HocRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, HocFault> {
        match method {
            "push" => {
                self.section_stack.push(sec);
                Ok(Value::Number(1.0))
            }
            "connect" => {
                let parent = match args.first() {
                    Some(Value::Object(parent)) if self.is_section(*parent) => *parent,
                    Some(Value::Segment(parent, _)) if self.is_section(*parent) => *parent,
                    _ => return Err(self.fail("connect: argument is not a section")),
                };
                if self.root_of(parent) == sec {
                    return Err(self.fail("connect: would create a loop"));
                }
                self.object_mut(sec)?.parent = Some(parent);
                Ok(Value::Object(sec))
            }
            "insert" => {
                let name = match args.first() {
                    Some(Value::Text(name)) => name.clone(),
                    _ => return Err(self.fail("insert expects a mechanism name")),
                };
                if self.classes.get(&name) != Some(&Class::Mechanism(MechanismKind::Density))
                    && BUILTIN_MECHANISMS.get(name.as_str()) != Some(&MechanismKind::Density)
                {
                    return Err(self.fail(&format!("{} is not a density mechanism", name)));
                }
                let object = self.object_mut(sec)?;
                if !object.mechanisms.contains(&name) {
                    object.mechanisms.push(name);
                }
                Ok(Value::Object(sec))
            }
            "pt3dadd" => {
                let coords: Option<Vec<f64>> = args.iter().map(Value::as_number).collect();
                match coords {
                    Some(c) if c.len() == 4 => {
                        self.object_mut(sec)?.points.push([c[0], c[1], c[2], c[3]]);
                        Ok(Value::Number(1.0))
                    }
                    _ => Err(self.fail("pt3dadd expects x, y, z, diam")),
                }
            }
            "pt3dclear" => {
                self.object_mut(sec)?.points.clear();
                Ok(Value::Number(0.0))
            }
            "n3d" => Ok(Value::Number(self.object(sec)?.points.len() as f64)),
            "x3d" | "y3d" | "z3d" | "diam3d" => {
                let axis = match method {
                    "x3d" => 0,
                    "y3d" => 1,
                    "z3d" => 2,
                    _ => 3,
                };
                let point = Self::index_arg(args, 0)
                    .and_then(|i| self.objects.get(&sec).and_then(|o| o.points.get(i)))
                    .copied();
                match point {
                    Some(p) => Ok(Value::Number(p[axis])),
                    None => Err(self.fail("arg out of range")),
                }
            }
            "children" => {
                let children = self
                    .sections()
                    .filter(|s| self.objects.get(s).and_then(|o| o.parent) == Some(sec))
                    .map(Value::Object)
                    .collect();
                Ok(Value::List(children))
            }
            "wholetree" => {
                let root = self.root_of(sec);
                let tree = self
                    .sections()
                    .filter(|s| self.root_of(*s) == root)
                    .map(Value::Object)
                    .collect();
                Ok(Value::List(tree))
            }
            _ => Err(HocFault::UnknownAttribute {
                name: method.to_string(),
            }),
        }
    }

    fn call_vector(
        &mut self,
        vec: HocRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, HocFault> {
        match method {
            "record" | "play" => match args.first() {
                Some(Value::Pointer(_)) | Some(Value::Object(_)) => {
                    self.object_mut(vec)?
                        .attrs
                        .insert(format!("__{}", method), args[0].clone());
                    Ok(Value::Object(vec))
                }
                _ => Err(self.fail(&format!("{}: argument must be a pointer", method))),
            },
            "size" => Ok(Value::Number(self.object(vec)?.data.len() as f64)),
            "resize" => {
                let n = Self::index_arg(args, 0).ok_or_else(|| self.fail("resize expects a size"))?;
                self.object_mut(vec)?.data.resize(n, 0.0);
                Ok(Value::Object(vec))
            }
            "append" => {
                let n = args
                    .first()
                    .and_then(Value::as_number)
                    .ok_or_else(|| self.fail("append expects a number"))?;
                self.object_mut(vec)?.data.push(n);
                Ok(Value::Object(vec))
            }
            _ => Err(HocFault::UnknownAttribute {
                name: method.to_string(),
            }),
        }
    }

    fn call_parallel(&mut self, method: &str, args: &[Value]) -> Result<Value, HocFault> {
        let int_arg = |position: usize| args.get(position).and_then(Value::as_number).map(|n| n as i64);
        match method {
            "id" => Ok(Value::Number(self.rank as f64)),
            "nhost" => Ok(Value::Number(self.nhost as f64)),
            "set_gid2node" => {
                let (gid, node) = int_arg(0).zip(int_arg(1)).ok_or_else(|| {
                    self.fail("set_gid2node expects a gid and a node")
                })?;
                if node == self.rank {
                    self.gids.insert(gid, node);
                }
                Ok(Value::Number(0.0))
            }
            "cell" | "outputcell" => {
                let gid = int_arg(0).ok_or_else(|| self.fail("expects a gid"))?;
                if !self.gids.contains_key(&gid) {
                    return Err(self.fail(&format!("gid={} has not been set on rank {}", gid, self.rank)));
                }
                Ok(Value::Number(0.0))
            }
            "gid_connect" => {
                let target = args.get(1).cloned().unwrap_or_default();
                if int_arg(0).is_none() {
                    return Err(self.fail("interpreter stack type error"));
                }
                self.create_netcon(&[Value::Nil, target]).map(Value::Object)
            }
            "source_var" | "target_var" => match args.first() {
                Some(Value::Pointer(_)) if args.len() >= 2 => Ok(Value::Number(0.0)),
                _ => Err(self.fail(&format!("{}: first argument must be a pointer", method))),
            },
            "setup_transfer" | "barrier" => Ok(Value::Number(0.0)),
            "allreduce" => args
                .first()
                .cloned()
                .ok_or_else(|| self.fail("allreduce expects a value")),
            "broadcast" => {
                let root = int_arg(1).unwrap_or(0);
                match args.first() {
                    Some(Value::Object(vec)) if self.class_of(*vec) == Some(Class::Vector) => {
                        if root == self.rank {
                            Ok(Value::Number(self.object(*vec)?.data.len() as f64))
                        } else {
                            Ok(Value::Number(0.0))
                        }
                    }
                    _ => Err(self.fail("broadcast: arg 1 must be a Vector")),
                }
            }
            _ => Err(HocFault::UnknownAttribute {
                name: method.to_string(),
            }),
        }
    }
}

impl Hoc for MemoryHoc {
    fn create(&mut self, template: &str, args: &[Value]) -> Result<HocRef, HocFault> {
        let class = self
            .classes
            .get(template)
            .copied()
            .ok_or_else(|| HocFault::UnknownAttribute {
                name: template.to_string(),
            })?;

        let id = match class {
            Class::Section => {
                let name = match args.first() {
                    Some(Value::Text(name)) => Some(name.clone()),
                    _ => None,
                };
                self.allocate(template, name)
            }
            Class::SectionRef => {
                let sec = match args.first() {
                    Some(Value::Object(sec)) if self.is_section(*sec) => *sec,
                    None => match self.section_stack.last() {
                        Some(sec) => *sec,
                        None => return Err(self.fail("Section access unspecified")),
                    },
                    Some(_) => return Err(self.fail("SectionRef: argument is not a section")),
                };
                let id = self.allocate(template, None);
                self.object_mut(id)?.section = Some(sec);
                id
            }
            Class::Vector => {
                let data = match args.first() {
                    None => Vec::new(),
                    Some(value) => match Self::numbers(value) {
                        Some(data) => data,
                        None => return Err(self.fail("Vector: argument must be numeric")),
                    },
                };
                let id = self.allocate(template, None);
                self.object_mut(id)?.data = data;
                id
            }
            Class::NetCon => self.create_netcon(args)?,
            Class::ParallelContext => self.allocate(template, None),
            Class::Mechanism(MechanismKind::Density) => {
                return Err(self.fail(&format!("{} is not a template", template)));
            }
            Class::Mechanism(kind) => self.create_point_process(template, kind, args)?,
        };

        let line = format!(
            "{} = new {}({})",
            self.name_of(id),
            template,
            self.render_args(args)
        );
        self.transcript.push(line);
        Ok(id)
    }

    fn get(&self, target: Target, name: &str) -> Result<Value, HocFault> {
        let unknown = || HocFault::UnknownAttribute {
            name: name.to_string(),
        };
        match target {
            Target::Global => self.globals.get(name).cloned().ok_or_else(unknown),
            Target::Segment(sec, x) => {
                let object = self.object(sec)?;
                if let Some(value) = self.segment_attrs.get(&(sec, x.to_bits(), name.to_string())) {
                    return Ok(value.clone());
                }
                match name {
                    "x" => Ok(Value::Number(x)),
                    "v" => Ok(self.globals.get("v_init").cloned().unwrap_or_default()),
                    _ if object.mechanisms.iter().any(|m| m == name) => {
                        Ok(Value::Text(name.to_string()))
                    }
                    _ => Err(unknown()),
                }
            }
            Target::Object(obj) => {
                let object = self.object(obj)?;
                if let Some(value) = object.attrs.get(name).filter(|_| !name.starts_with("__")) {
                    return Ok(value.clone());
                }
                match (self.class_of(obj), name) {
                    (Some(Class::SectionRef), "sec") => Ok(object.section.map(Value::Object).unwrap_or_default()),
                    (Some(Class::SectionRef), "parent") => object
                        .section
                        .and_then(|sec| self.objects.get(&sec))
                        .and_then(|s| s.parent)
                        .map(Value::Object)
                        .ok_or_else(|| HocFault::runtime(HOC_ERROR)),
                    (Some(Class::SectionRef), "nchild") => {
                        let sec = object.section;
                        let count = self
                            .sections()
                            .filter(|s| sec.is_some() && self.objects.get(s).and_then(|o| o.parent) == sec)
                            .count();
                        Ok(Value::Number(count as f64))
                    }
                    (Some(Class::Mechanism(_)), "loc") => Ok(object
                        .location
                        .map(|(sec, x)| Value::Segment(sec, x))
                        .unwrap_or_default()),
                    _ => Err(unknown()),
                }
            }
        }
    }

    fn set(&mut self, target: Target, name: &str, value: Value) -> Result<(), HocFault> {
        let line = format!("{} = {}", self.render_target(target, name), self.render(&value));
        match target {
            Target::Global => match self.globals.get_mut(name) {
                Some(slot) => *slot = value,
                None => {
                    return Err(HocFault::UnknownAttribute {
                        name: name.to_string(),
                    });
                }
            },
            Target::Segment(sec, x) => {
                self.object(sec)?;
                if name == "x" {
                    return Err(self.fail("x is read only"));
                }
                self.segment_attrs.insert((sec, x.to_bits(), name.to_string()), value);
            }
            Target::Object(obj) => {
                let is_section = self.is_section(obj);
                let object = self.object_mut(obj)?;
                match object.attrs.get_mut(name) {
                    Some(slot) if !name.starts_with("__") => *slot = value,
                    _ => {
                        return Err(HocFault::UnknownAttribute {
                            name: name.to_string(),
                        });
                    }
                }
                if is_section && name == "nseg" {
                    let nseg = object.attrs.get("nseg").and_then(Value::as_number).unwrap_or(1.0);
                    if nseg < 1.0 {
                        object.attrs.insert("nseg".to_string(), Value::Number(1.0));
                        return Err(self.fail("nseg must be positive"));
                    }
                }
            }
        }
        self.transcript.push(line);
        Ok(())
    }

    fn get_indexed(&self, target: Target, name: &str, index: usize) -> Result<Value, HocFault> {
        let obj = match target {
            Target::Object(obj) => obj,
            _ => return self.get(target, name),
        };
        let object = self.object(obj)?;
        if let Some(array) = object.arrays.get(name) {
            return array
                .get(index)
                .map(|v| Value::Number(*v))
                .ok_or_else(|| HocFault::runtime(HOC_ERROR));
        }
        match (self.class_of(obj), name) {
            (Some(Class::Vector), "x") => object
                .data
                .get(index)
                .map(|v| Value::Number(*v))
                .ok_or_else(|| HocFault::runtime(HOC_ERROR)),
            (Some(Class::SectionRef), "child") => {
                let sec = object.section;
                self.sections()
                    .filter(|s| sec.is_some() && self.objects.get(s).and_then(|o| o.parent) == sec)
                    .nth(index)
                    .map(Value::Object)
                    .ok_or_else(|| HocFault::runtime(HOC_ERROR))
            }
            _ => Err(HocFault::UnknownAttribute {
                name: name.to_string(),
            }),
        }
    }

    fn set_indexed(
        &mut self,
        target: Target,
        name: &str,
        index: usize,
        value: Value,
    ) -> Result<(), HocFault> {
        let obj = match target {
            Target::Object(obj) => obj,
            _ => return self.set(target, name, value),
        };
        let line = format!("{}[{}] = {}", self.render_target(target, name), index, self.render(&value));
        let number = match value.as_number() {
            Some(n) => n,
            None => return Err(self.fail("interpreter stack type error")),
        };
        let is_vector = self.class_of(obj) == Some(Class::Vector);
        let object = self.object_mut(obj)?;
        let slot = if is_vector && name == "x" {
            object.data.get_mut(index)
        } else {
            match object.arrays.get_mut(name) {
                Some(array) => array.get_mut(index),
                None => {
                    return Err(HocFault::UnknownAttribute {
                        name: name.to_string(),
                    });
                }
            }
        };
        match slot {
            Some(slot) => *slot = number,
            None => return Err(self.fail("subscript out of range")),
        }
        self.transcript.push(line);
        Ok(())
    }

    fn call(&mut self, target: Target, method: &str, args: &[Value]) -> Result<Value, HocFault> {
        let result = match target {
            Target::Global => self.call_global(method, args),
            Target::Segment(..) => Err(HocFault::UnknownAttribute {
                name: method.to_string(),
            }),
            Target::Object(obj) => match self.class_of(obj) {
                None => Err(self.object(obj).err().unwrap_or_else(|| HocFault::UnknownAttribute {
                    name: method.to_string(),
                })),
                Some(Class::Section) => self.call_section(obj, method, args),
                Some(Class::Vector) => self.call_vector(obj, method, args),
                Some(Class::ParallelContext) => self.call_parallel(method, args),
                Some(Class::NetCon) if method == "record" => match args.first() {
                    Some(Value::Object(vec)) if self.class_of(*vec) == Some(Class::Vector) => {
                        self.object_mut(obj)?
                            .attrs
                            .insert("__record".to_string(), args[0].clone());
                        Ok(Value::Number(0.0))
                    }
                    _ => Err(self.fail("NetCon.record: argument must be a Vector")),
                },
                Some(Class::Mechanism(MechanismKind::ArtificialCell)) if method == "play" => {
                    match args.first() {
                        Some(Value::Object(vec)) if self.class_of(*vec) == Some(Class::Vector) => {
                            self.object_mut(obj)?
                                .attrs
                                .insert("__play".to_string(), args[0].clone());
                            Ok(Value::Number(0.0))
                        }
                        _ => Err(self.fail("play: argument must be a Vector")),
                    }
                }
                Some(_) => Err(HocFault::UnknownAttribute {
                    name: method.to_string(),
                }),
            },
        };

        if result.is_ok() {
            let line = match target {
                Target::Global => format!("{}({})", method, self.render_args(args)),
                _ => format!("{}({})", self.render_target(target, method), self.render_args(args)),
            };
            self.transcript.push(line);
        }
        result
    }

    fn templates(&self) -> Vec<String> {
        self.classes
            .iter()
            .filter(|(_, class)| **class != Class::Mechanism(MechanismKind::Density))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn mechanism_kind(&self, name: &str) -> Option<MechanismKind> {
        match self.classes.get(name) {
            Some(Class::Mechanism(kind)) => Some(*kind),
            _ => None,
        }
    }

    fn name_of(&self, obj: HocRef) -> String {
        self.objects
            .get(&obj)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| format!("<released {}>", obj))
    }

    fn template_of(&self, obj: HocRef) -> Option<String> {
        self.objects.get(&obj).map(|o| o.template.clone())
    }

    fn release(&mut self, obj: HocRef) {
        let name = self.name_of(obj);
        if self.objects.remove(&obj).is_none() {
            return;
        }
        for object in self.objects.values_mut() {
            if object.parent == Some(obj) {
                object.parent = None;
            }
        }
        self.section_stack.retain(|sec| *sec != obj);
        self.segment_attrs.retain(|(sec, _, _), _| *sec != obj);
        self.transcript.push(format!("objref {} // released", name));
    }

    fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    fn transcript(&self) -> Vec<String> {
        self.transcript.clone()
    }
}
