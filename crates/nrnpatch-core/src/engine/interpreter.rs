use super::config::InterpreterConfig;
use super::objects::{
    Endpoint, HocObject, NetCon, RecordTarget, Recordable, Section, Vector, Wrapped,
};
use super::parallel::ParallelContext;
use crate::core::errors::rules::{ErrorContext, ErrorRules, Operation};
use crate::core::errors::{HocError, PatchError, Result};
use crate::core::hoc::{Hoc, HocFault, HocRef, MechanismKind, RangeRef, Target, Value};
use crate::core::models::facet::{Facet, NetConFacet, ParallelFacet, SectionFacet, VecStimFacet};
use crate::core::models::ids::ObjectId;
use crate::core::models::kind::ObjectKind;
use crate::core::models::registry::{ObjectEntry, ObjectRegistry};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

const TIME_SECTION_NAME: &str = "this_is_here_to_record_time";

/// The entry point to the wrapped interpreter.
///
/// An `Interpreter` owns the backend, the registry of wrapped objects and the
/// simulation bookkeeping (run time, initialization state, the time vector and the
/// parallel context). It is passed explicitly to every wrapper operation; nothing
/// about it is global.
pub struct Interpreter {
    pub(super) hoc: Box<dyn Hoc>,
    pub(super) config: InterpreterConfig,
    rules: ErrorRules,
    pub(super) registry: ObjectRegistry,
    point_processes: BTreeSet<String>,
    loaded_extensions: Vec<String>,
    locals: HashMap<String, Value>,
    runtime: f64,
    initialized: bool,
    time: Option<Vector>,
    pub(super) parallel: Option<ParallelContext>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("objects", &self.registry.len())
            .field("runtime", &self.runtime)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Wraps a backend, loads the startup file and applies the configured temperature.
    pub fn new(hoc: Box<dyn Hoc>, config: InterpreterConfig) -> Result<Self> {
        let rules = config
            .error_rules()
            .map_err(|e| PatchError::ErrorHandling(e.to_string()))?;
        let mut interp = Self {
            hoc,
            config,
            rules,
            registry: ObjectRegistry::new(),
            point_processes: BTreeSet::new(),
            loaded_extensions: Vec::new(),
            locals: HashMap::new(),
            runtime: 0.0,
            initialized: false,
            time: None,
            parallel: None,
        };
        let startup = interp.config.startup_file.clone();
        interp.load_file(&startup)?;
        let celsius = interp.config.celsius;
        interp.set_celsius(celsius)?;
        interp.refresh_point_processes();
        Ok(interp)
    }

    pub fn with_defaults(hoc: Box<dyn Hoc>) -> Result<Self> {
        Self::new(hoc, InterpreterConfig::default())
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn rules(&self) -> &ErrorRules {
        &self.rules
    }

    pub fn hoc(&self) -> &dyn Hoc {
        self.hoc.as_ref()
    }

    pub fn hoc_mut(&mut self) -> &mut dyn Hoc {
        self.hoc.as_mut()
    }

    // --- Error translation ---

    /// Runs one backend interaction, translating a failure through the rule table.
    pub(crate) fn guarded<T>(
        &mut self,
        operation: Operation,
        context: &ErrorContext,
        f: impl FnOnce(&mut dyn Hoc) -> std::result::Result<T, HocFault>,
    ) -> Result<T> {
        self.hoc.take_output();
        match f(self.hoc.as_mut()) {
            Ok(value) => Ok(value),
            Err(fault) => Err(self.translate(operation, fault, context)),
        }
    }

    fn translate(&mut self, operation: Operation, fault: HocFault, context: &ErrorContext) -> PatchError {
        let captured = self.hoc.take_output();
        match fault {
            HocFault::UnknownAttribute { name } => PatchError::UnknownAttribute {
                object: context.get("object").unwrap_or("h").to_string(),
                name,
            },
            HocFault::Runtime { message } => {
                let err = self.rules.translate(operation, &captured, &message, context);
                debug!(
                    %operation,
                    captured = captured.trim(),
                    error = %err,
                    "Translated interpreter failure"
                );
                err
            }
        }
    }

    /// Translates a failure of a read-only access, which produces no error output.
    pub(crate) fn read_fault(&self, fault: HocFault, object: &str, name: &str) -> PatchError {
        match fault {
            HocFault::UnknownAttribute { .. } => PatchError::UnknownAttribute {
                object: object.to_string(),
                name: name.to_string(),
            },
            HocFault::Runtime { message } if message.contains("hoc error") => {
                HocError::General(format!("reading {}.{} failed", object, name)).into()
            }
            HocFault::Runtime { message } => PatchError::Foreign(message),
        }
    }

    // --- Registry access ---

    pub(crate) fn entry(&self, id: ObjectId) -> Result<&ObjectEntry> {
        self.registry.get(id).ok_or(PatchError::Stale(id))
    }

    pub(crate) fn entry_mut(&mut self, id: ObjectId) -> Result<&mut ObjectEntry> {
        self.registry.get_mut(id).ok_or(PatchError::Stale(id))
    }

    pub(crate) fn handle(&self, id: ObjectId) -> Result<HocRef> {
        self.entry(id).map(|e| e.handle)
    }

    /// Adds a foreign object to the registry as a root. Objects already known
    /// are looked up by handle and rooted again, even after a release.
    pub(crate) fn register(&mut self, handle: HocRef, template: &str) -> ObjectId {
        let kind = ObjectKind::from_template(template, self.is_point_process(template));
        let id = self.registry.wrap(handle, kind, template);
        self.registry.root(id);
        if let Some(entry) = self.registry.get_mut(id) {
            if entry.facet == Facet::None {
                entry.facet = match entry.kind {
                    ObjectKind::Section => Facet::Section(SectionFacet::default()),
                    ObjectKind::NetCon => Facet::NetCon(NetConFacet::default()),
                    ObjectKind::VecStim => Facet::VecStim(VecStimFacet::default()),
                    ObjectKind::ParallelContext => Facet::Parallel(ParallelFacet::default()),
                    _ => Facet::None,
                };
            }
        }
        id
    }

    /// Creates a foreign object and registers it.
    pub(crate) fn instantiate(
        &mut self,
        template: &str,
        args: &[Value],
        operation: Operation,
        context: &ErrorContext,
    ) -> Result<ObjectId> {
        let handle = self.guarded(operation, context, |hoc| hoc.create(template, args))?;
        Ok(self.register(handle, template))
    }

    /// Wraps a foreign object that was obtained from the interpreter.
    pub fn wrap(&mut self, handle: HocRef) -> HocObject {
        let template = self
            .hoc
            .template_of(handle)
            .unwrap_or_else(|| "HocObject".to_string());
        HocObject(self.register(handle, &template))
    }

    pub(crate) fn wrap_section(&mut self, value: Value) -> Result<Section> {
        match value {
            Value::Object(handle) => {
                let id = self.wrap(handle).id();
                match self.kind_of(id) {
                    Some(ObjectKind::Section) => Ok(Section(id)),
                    _ => Err(PatchError::InvalidArgument(format!(
                        "{} is not a section",
                        self.describe(id)
                    ))),
                }
            }
            other => Err(PatchError::InvalidArgument(format!(
                "expected a section, got {}",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn wrap_sections(&mut self, value: Value) -> Result<Vec<Section>> {
        match value {
            Value::List(items) => items.into_iter().map(|v| self.wrap_section(v)).collect(),
            other => Err(PatchError::InvalidArgument(format!(
                "expected a list of sections, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn kind_of(&self, id: ObjectId) -> Option<ObjectKind> {
        self.registry.get(id).map(|e| e.kind)
    }

    pub fn template_of(&self, id: ObjectId) -> Option<&str> {
        self.registry.get(id).map(|e| e.template.as_str())
    }

    // --- Globals ---

    /// Reads a top-level interpreter variable, or a host-side global of that name.
    pub fn global(&self, name: &str) -> Result<Value> {
        match self.hoc.get(Target::Global, name) {
            Ok(value) => Ok(value),
            Err(HocFault::UnknownAttribute { .. }) => {
                self.locals
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PatchError::UnknownAttribute {
                        object: "h".to_string(),
                        name: name.to_string(),
                    })
            }
            Err(fault) => Err(self.read_fault(fault, "h", name)),
        }
    }

    /// Writes a top-level variable. Names the interpreter does not define are kept
    /// on the host side.
    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self.set_on(Target::Global, "h", name, value.clone()) {
            Err(PatchError::UnknownAttribute { .. }) => {
                self.locals.insert(name.to_string(), value);
                Ok(())
            }
            other => other,
        }
    }

    fn global_number(&self, name: &str) -> Result<f64> {
        let value = self.global(name)?;
        value.as_number().ok_or_else(|| {
            PatchError::InvalidArgument(format!("h.{} is a {}, not a number", name, value.type_name()))
        })
    }

    /// The simulation clock.
    pub fn t(&self) -> Result<f64> {
        self.global_number("t")
    }

    pub fn dt(&self) -> Result<f64> {
        self.global_number("dt")
    }

    pub fn set_dt(&mut self, dt: f64) -> Result<()> {
        self.set_global("dt", dt)
    }

    pub fn celsius(&self) -> Result<f64> {
        self.global_number("celsius")
    }

    pub fn set_celsius(&mut self, celsius: f64) -> Result<()> {
        self.set_global("celsius", celsius)
    }

    pub fn tstop(&self) -> Result<f64> {
        self.global_number("tstop")
    }

    pub fn set_tstop(&mut self, tstop: f64) -> Result<()> {
        self.set_global("tstop", tstop)
    }

    /// Simulated time covered by `continuerun` calls since the last initialization.
    pub fn runtime(&self) -> f64 {
        self.runtime
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    // --- Generic objects ---

    /// Instantiates any template the interpreter knows.
    pub fn create(&mut self, template: &str, args: &[Value]) -> Result<HocObject> {
        if !self.hoc.templates().iter().any(|t| t == template) {
            return Err(PatchError::UnknownTemplate(template.to_string()));
        }
        let context = ErrorContext::new().with("object", template);
        self.instantiate(template, args, Operation::Any, &context)
            .map(HocObject)
    }

    pub fn attr(&self, id: ObjectId, name: &str) -> Result<Value> {
        let entry = self.entry(id)?;
        match self.hoc.get(Target::Object(entry.handle), name) {
            Ok(value) => Ok(value),
            Err(HocFault::UnknownAttribute { .. }) => {
                entry
                    .locals
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PatchError::UnknownAttribute {
                        object: self.describe(id),
                        name: name.to_string(),
                    })
            }
            Err(fault) => Err(self.read_fault(fault, &self.describe(id), name)),
        }
    }

    pub(crate) fn number_attr(&self, id: ObjectId, name: &str) -> Result<f64> {
        let value = self.attr(id, name)?;
        value.as_number().ok_or_else(|| {
            PatchError::InvalidArgument(format!(
                "{}.{} is a {}, not a number",
                self.describe(id),
                name,
                value.type_name()
            ))
        })
    }

    pub fn set_attr(&mut self, id: ObjectId, name: &str, value: Value) -> Result<()> {
        let handle = self.handle(id)?;
        let object = self.describe(id);
        match self.set_on(Target::Object(handle), &object, name, value.clone()) {
            Err(PatchError::UnknownAttribute { .. }) => {
                self.entry_mut(id)?.locals.insert(name.to_string(), value);
                Ok(())
            }
            other => other,
        }
    }

    pub(crate) fn set_on(&mut self, target: Target, object: &str, name: &str, value: Value) -> Result<()> {
        let context = ErrorContext::new().with("object", object);
        self.guarded(Operation::Any, &context, |hoc| hoc.set(target, name, value))
    }

    pub fn call(&mut self, id: ObjectId, method: &str, args: &[Value]) -> Result<Value> {
        let handle = self.handle(id)?;
        let object = self.describe(id);
        self.call_on(Target::Object(handle), &object, method, args, Operation::Any)
    }

    /// Calls a top-level interpreter function.
    pub fn call_global(&mut self, function: &str, args: &[Value]) -> Result<Value> {
        self.call_on(Target::Global, "h", function, args, Operation::Any)
    }

    pub(crate) fn call_on(
        &mut self,
        target: Target,
        object: &str,
        method: &str,
        args: &[Value],
        operation: Operation,
    ) -> Result<Value> {
        let context = ErrorContext::new().with("object", object);
        self.guarded(operation, &context, |hoc| hoc.call(target, method, args))
    }

    /// The interpreter's own representation of a wrapped object.
    pub fn describe(&self, id: ObjectId) -> String {
        match self.registry.get(id) {
            Some(entry) => self.hoc.name_of(entry.handle),
            None => format!("<released {:?}>", id),
        }
    }

    /// The interpreter value that stands for a wrapped object.
    pub fn transform(&self, object: &dyn Wrapped) -> Result<Value> {
        Ok(Value::Object(self.handle(object.id())?))
    }

    // --- Lifetimes ---

    /// Keeps `dependent` alive while `owner` is alive. Returns `false` if it already was.
    pub fn reference(&mut self, owner: ObjectId, dependent: ObjectId) -> bool {
        self.registry.reference(owner, dependent)
    }

    pub fn dereference(&mut self, owner: ObjectId, dependent: ObjectId) -> bool {
        self.registry.dereference(owner, dependent)
    }

    pub fn references(&self, owner: ObjectId) -> Vec<HocObject> {
        self.registry
            .references(owner)
            .iter()
            .map(|id| HocObject(*id))
            .collect()
    }

    /// Gives up the caller's handle on an object.
    ///
    /// Every object no longer reachable from a handle held by the caller is
    /// released in the interpreter. Returns how many were released.
    ///
    /// Handles returned by traversals such as [`Interpreter::allsec`],
    /// [`Interpreter::cas`], [`Interpreter::wrap`] or `Section::children` are
    /// new roots, including for objects released earlier. Release those too
    /// before expecting the objects to be collected.
    pub fn release(&mut self, object: &dyn Wrapped) -> usize {
        self.registry.unroot(object.id());
        self.collect()
    }

    pub(crate) fn collect(&mut self) -> usize {
        let swept = self.registry.sweep();
        for (_, entry) in &swept {
            self.hoc.release(entry.handle);
        }
        if !swept.is_empty() {
            debug!(count = swept.len(), "Released unreachable interpreter objects");
        }
        swept.len()
    }

    pub fn live_objects(&self) -> usize {
        self.registry.len()
    }

    // --- Factories ---

    pub fn new_section(&mut self, name: Option<&str>) -> Result<Section> {
        let args: Vec<Value> = name.map(Value::from).into_iter().collect();
        let context = ErrorContext::new().with("object", "Section");
        self.instantiate("Section", &args, Operation::Any, &context)
            .map(Section)
    }

    pub fn vector(&mut self, data: &[f64]) -> Result<Vector> {
        let args = if data.is_empty() {
            Vec::new()
        } else {
            vec![Value::from(data.to_vec())]
        };
        let context = ErrorContext::new().with("object", "Vector");
        self.instantiate("Vector", &args, Operation::Any, &context)
            .map(Vector)
    }

    // --- Simulation control ---

    /// Initializes the simulation, optionally to membrane potential `initial`.
    pub fn finitialize(&mut self, initial: Option<f64>) -> Result<()> {
        self.setup_transfer()?;
        let args: Vec<Value> = initial.map(Value::from).into_iter().collect();
        self.call_global("finitialize", &args)?;
        self.runtime = 0.0;
        self.initialized = true;
        Ok(())
    }

    /// Advances the simulation to `stop`, or by `stop` when `add` is set.
    pub fn continuerun(&mut self, stop: f64, add: bool) -> Result<()> {
        if !self.initialized {
            return Err(PatchError::Uninitialized(
                "Cannot start a simulation without first calling `finitialize`.".to_string(),
            ));
        }
        let target = if add { self.runtime + stop } else { stop };
        self.call_global("continuerun", &[Value::Number(target)])?;
        self.runtime = target;
        Ok(())
    }

    pub fn run(&mut self, tstop: Option<f64>) -> Result<()> {
        if !self.initialized {
            return Err(PatchError::Uninitialized(
                "Cannot start a simulation without first calling `finitialize`.".to_string(),
            ));
        }
        if let Some(tstop) = tstop {
            self.set_tstop(tstop)?;
        }
        self.call_global("run", &[])?;
        Ok(())
    }

    // --- Section stack ---

    /// The currently accessed section, if any section is on the stack.
    pub fn cas(&mut self) -> Result<Option<Section>> {
        match self.call_on(Target::Global, "h", "cas", &[], Operation::SectionAccess) {
            Ok(value) => self.wrap_section(value).map(Some),
            Err(PatchError::Hoc(HocError::SectionAccess(_))) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn pop_section(&mut self) -> Result<()> {
        self.call_on(Target::Global, "h", "pop_section", &[], Operation::SectionAccess)
            .map(|_| ())
    }

    pub fn allsec(&mut self) -> Result<Vec<Section>> {
        let sections = self.call_global("allsec", &[])?;
        self.wrap_sections(sections)
    }

    // --- Recording ---

    /// Creates a vector recording `target`.
    pub fn record(&mut self, target: impl Into<RecordTarget>) -> Result<Vector> {
        let pointer = self.transform_record(&target.into())?;
        let vector = self.vector(&[])?;
        vector.record(self, pointer)?;
        Ok(vector)
    }

    /// A vector recording the simulation clock, created once.
    pub fn time(&mut self) -> Result<Vector> {
        if let Some(time) = self.time.filter(|v| self.registry.contains(v.0)) {
            return Ok(time);
        }
        let sections = self.call_global("allsec", &[])?;
        if sections.as_list().is_some_and(|s| s.is_empty()) {
            // Recording time only works once at least one section exists.
            self.new_section(Some(TIME_SECTION_NAME))?;
        }
        let vector = self.vector(&[])?;
        vector.record(self, RangeRef::time())?;
        self.time = Some(vector);
        Ok(vector)
    }

    // --- Extensions and mechanisms ---

    pub fn load_file(&mut self, path: &str) -> Result<()> {
        self.call_global("load_file", &[Value::from(path)])?;
        Ok(())
    }

    /// Loads `<extension_dir>/<name>.hoc` unless it was loaded before.
    pub fn load_extension(&mut self, name: &str) -> Result<bool> {
        if self.loaded_extensions.iter().any(|e| e == name) {
            return Ok(false);
        }
        let path = self
            .config
            .extension_dir
            .join(format!("{}.hoc", name))
            .to_string_lossy()
            .replace('\\', "/");
        self.load_file(&path)?;
        self.loaded_extensions.push(name.to_string());
        info!(extension = name, path = %path, "Loaded hoc extension");
        Ok(true)
    }

    pub fn loaded_extensions(&self) -> &[String] {
        &self.loaded_extensions
    }

    /// Loads a compiled mechanism library and picks up the point processes it defines.
    pub fn nrn_load_dll(&mut self, path: &str) -> Result<bool> {
        let result = self.call_global("nrn_load_dll", &[Value::from(path)])?;
        self.refresh_point_processes();
        Ok(result.as_number().is_some_and(|n| n != 0.0))
    }

    fn refresh_point_processes(&mut self) {
        let found: BTreeSet<String> = self
            .hoc
            .templates()
            .into_iter()
            .filter(|t| self.hoc.mechanism_kind(t) == Some(MechanismKind::PointProcess))
            .collect();
        let new: Vec<&String> = found.difference(&self.point_processes).collect();
        if !new.is_empty() {
            debug!(?new, "Discovered point processes");
        }
        self.point_processes = found;
    }

    /// Names of every point process template currently known.
    pub fn point_processes(&self) -> impl Iterator<Item = &str> {
        self.point_processes.iter().map(String::as_str)
    }

    pub fn is_point_process(&self, name: &str) -> bool {
        self.point_processes.contains(name)
    }

    pub fn is_artificial_cell(&self, name: &str) -> bool {
        self.hoc.mechanism_kind(name) == Some(MechanismKind::ArtificialCell)
    }

    pub fn is_density_mechanism(&self, name: &str) -> bool {
        self.hoc.mechanism_kind(name) == Some(MechanismKind::Density)
    }

    // --- Transformations ---

    /// The value handed to the NetCon constructor for an endpoint. Sections and
    /// segments become pointers to their membrane potential.
    pub fn transform_netcon(&self, endpoint: &Endpoint) -> Result<Value> {
        match endpoint {
            Endpoint::None => Ok(Value::Nil),
            Endpoint::Object(id) => match self.entry(*id)?.kind {
                ObjectKind::Section => {
                    let section = Section(*id);
                    Ok(Value::Pointer(section.record_ref(self)?))
                }
                _ => Ok(Value::Object(self.handle(*id)?)),
            },
            Endpoint::Segment(segment) => Ok(Value::Pointer(segment.voltage_ref(self)?)),
            Endpoint::Foreign(value) => Ok(value.clone()),
        }
    }

    /// The pointer a vector records from for a target.
    pub fn transform_record(&self, target: &RecordTarget) -> Result<RangeRef> {
        match target {
            RecordTarget::Object(id) => match self.entry(*id)?.kind {
                ObjectKind::Section => Section(*id).record_ref(self),
                _ => Err(HocError::Record(format!(
                    "Cannot record from {}; it is not a section, segment or pointer.",
                    self.describe(*id)
                ))
                .into()),
            },
            RecordTarget::Segment(segment) => segment.record_ref(self),
            RecordTarget::Pointer(pointer) => Ok(pointer.clone()),
            RecordTarget::Foreign(Value::Pointer(pointer)) => Ok(pointer.clone()),
            RecordTarget::Foreign(Value::Segment(section, x)) => {
                Ok(RangeRef::new(Target::Segment(*section, *x), "v"))
            }
            RecordTarget::Foreign(other) => Err(HocError::Record(format!(
                "Cannot record from a value of type {}.",
                other.type_name()
            ))
            .into()),
        }
    }

    /// The value of an endpoint where a location is expected: sections resolve to
    /// their default segment, anything else to its plain transformation.
    pub fn transform_arc(&self, endpoint: &Endpoint) -> Result<Value> {
        match endpoint {
            Endpoint::Object(id) if self.entry(*id)?.kind == ObjectKind::Section => {
                let section = Section(*id);
                section.segment(super::objects::Arced::arc(&section)).transform(self)
            }
            Endpoint::Segment(segment) => segment.transform(self),
            other => self.transform_netcon(other),
        }
    }

    // --- Connections ---

    pub(crate) fn assert_connectable(&self, id: ObjectId, label: &'static str) -> Result<()> {
        if self.entry(id)?.kind.is_connectable() {
            Ok(())
        } else {
            Err(PatchError::NotConnectable {
                label,
                object: self.describe(id),
            })
        }
    }

    /// The NetCon connecting `source` to `target`.
    ///
    /// Unless `strict`, a connection from `target` to `source` is accepted too.
    pub fn connection(&self, source: &dyn Wrapped, target: &dyn Wrapped, strict: bool) -> Result<NetCon> {
        let (from, to) = (source.id(), target.id());
        self.assert_connectable(from, "Source")?;
        self.assert_connectable(to, "Target")?;
        if let Some(netcon) = self.registry.connection(from, to) {
            return Ok(NetCon(netcon));
        }
        if !strict {
            if let Some(netcon) = self.registry.connection(to, from) {
                return Ok(NetCon(netcon));
            }
        }
        Err(PatchError::NotConnected {
            from: self.describe(from),
            to: self.describe(to),
        })
    }

    /// Removes the connection between two objects and releases its NetCon once
    /// nothing else holds it. Returns whether a connection existed.
    pub fn disconnect(&mut self, source: &dyn Wrapped, target: &dyn Wrapped) -> Result<bool> {
        let (from, to) = (source.id(), target.id());
        self.assert_connectable(from, "Source")?;
        self.assert_connectable(to, "Target")?;
        let netcon = match self
            .registry
            .connection(from, to)
            .or_else(|| self.registry.connection(to, from))
        {
            Some(netcon) => netcon,
            None => return Ok(false),
        };
        self.registry.remove_connection(from, to);
        self.registry.remove_connection(to, from);
        self.registry.dereference(from, netcon);
        self.registry.dereference(to, netcon);
        self.registry.unroot(netcon);
        self.collect();
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::hoc::memory::MemoryHoc;
    use crate::engine::objects::{NetConOptions, Wrapped};

    pub(crate) fn interpreter() -> Interpreter {
        Interpreter::with_defaults(Box::new(MemoryHoc::new())).unwrap()
    }

    #[test]
    fn new_loads_startup_file_and_sets_temperature() {
        let p = interpreter();
        assert_eq!(p.celsius().unwrap(), 32.0);
        assert_eq!(p.runtime(), 0.0);
        assert!(p.hoc().transcript().contains(&"load_file(\"stdrun.hoc\")".to_string()));
    }

    #[test]
    fn point_processes_are_discovered() {
        let p = interpreter();
        let names: Vec<&str> = p.point_processes().collect();
        assert_eq!(
            names,
            [
                "APCount",
                "AlphaSynapse",
                "Exp2Syn",
                "ExpSyn",
                "IClamp",
                "OClamp",
                "PointProcessMark",
                "SEClamp",
                "VClamp"
            ]
        );
        assert!(p.is_density_mechanism("pas"));
        assert!(!p.is_point_process("NetStim"));
    }

    #[test]
    fn unknown_globals_are_stored_on_the_host() {
        let mut p = interpreter();
        p.set_global("my_param", 3.0).unwrap();
        assert_eq!(p.global("my_param").unwrap(), Value::Number(3.0));
        p.set_tstop(30.0).unwrap();
        assert_eq!(p.tstop().unwrap(), 30.0);
        assert!(matches!(
            p.global("nothing_here"),
            Err(PatchError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn unknown_object_attributes_fall_back_to_local_store() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        s.set_attr(&mut p, "nseg", Value::Number(5.0)).unwrap();
        s.set_attr(&mut p, "label", Value::from("soma")).unwrap();
        assert_eq!(s.attr(&p, "nseg").unwrap(), Value::Number(5.0));
        assert_eq!(s.attr(&p, "label").unwrap(), Value::from("soma"));
        assert!(matches!(
            s.attr(&p, "missing"),
            Err(PatchError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn unknown_templates_are_rejected() {
        let mut p = interpreter();
        assert!(matches!(
            p.create("Teleporter", &[]),
            Err(PatchError::UnknownTemplate(_))
        ));
        let stim = p.create("NetStim", &[]).unwrap();
        assert_eq!(p.kind_of(stim.id()), Some(ObjectKind::NetStim));
    }

    #[test]
    fn continuerun_requires_initialization_and_tracks_runtime() {
        let mut p = interpreter();
        assert!(matches!(
            p.continuerun(10.0, false),
            Err(PatchError::Uninitialized(_))
        ));
        p.finitialize(Some(-70.0)).unwrap();
        p.continuerun(10.0, false).unwrap();
        p.continuerun(5.0, true).unwrap();
        assert_eq!(p.runtime(), 15.0);
        assert_eq!(p.t().unwrap(), 15.0);
        p.finitialize(None).unwrap();
        assert_eq!(p.runtime(), 0.0);
    }

    #[test]
    fn run_requires_initialization() {
        let mut p = interpreter();
        assert!(matches!(p.run(None), Err(PatchError::Uninitialized(_))));
        p.finitialize(None).unwrap();
        p.run(Some(30.0)).unwrap();
        assert_eq!(p.t().unwrap(), 30.0);
    }

    #[test]
    fn cas_is_none_without_pushed_section() {
        let mut p = interpreter();
        assert_eq!(p.cas().unwrap(), None);
    }

    #[test]
    fn time_vector_is_cached_and_creates_placeholder_section() {
        let mut p = interpreter();
        let t = p.time().unwrap();
        assert_eq!(p.time().unwrap(), t);
        let sections = p.allsec().unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].describe(&p), TIME_SECTION_NAME);
    }

    #[test]
    fn time_vector_does_not_add_a_section_when_one_exists() {
        let mut p = interpreter();
        p.new_section(Some("soma")).unwrap();
        p.time().unwrap();
        assert_eq!(p.allsec().unwrap().len(), 1);
    }

    #[test]
    fn recording_a_section_ref_or_number_is_a_record_error() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        assert!(p.record(s).is_ok());
        let sr = p.section_ref(Some(s)).unwrap();
        assert!(matches!(
            p.record(sr),
            Err(PatchError::Hoc(HocError::Record(_)))
        ));
        assert!(matches!(
            p.record(Value::Number(4.0)),
            Err(PatchError::Hoc(HocError::Record(_)))
        ));
    }

    #[test]
    fn transforms_turn_sections_into_pointers_and_segments() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let handle = p.handle(s.id()).unwrap();

        let netcon_value = p.transform_netcon(&s.into()).unwrap();
        assert!(netcon_value.type_name().contains("pointer to hoc scalar"));
        let seg_value = p.transform_netcon(&s.segment(0.5).into()).unwrap();
        assert!(seg_value.type_name().contains("pointer to hoc scalar"));

        assert_eq!(p.transform_arc(&s.into()).unwrap(), Value::Segment(handle, 0.5));
        assert_eq!(
            p.transform_arc(&Endpoint::Foreign(Value::Number(1.0))).unwrap(),
            Value::Number(1.0)
        );
        assert_eq!(p.transform(&s).unwrap(), Value::Object(handle));
    }

    #[test]
    fn extensions_are_loaded_once() {
        let mut p = interpreter();
        assert!(p.load_extension("vecevent").unwrap());
        assert!(!p.load_extension("vecevent").unwrap());
        assert_eq!(p.loaded_extensions(), ["vecevent".to_string()]);
    }

    #[test]
    fn nrn_load_dll_refreshes_point_processes() {
        let hoc = MemoryHoc::new().with_library("mod/libnrnmech.so", &[
            ("GABAa", MechanismKind::PointProcess),
        ]);
        let mut p = Interpreter::with_defaults(Box::new(hoc)).unwrap();
        assert!(!p.is_point_process("GABAa"));
        assert!(p.nrn_load_dll("mod/libnrnmech.so").unwrap());
        assert!(p.is_point_process("GABAa"));
        assert!(!p.nrn_load_dll("missing.so").unwrap());
    }

    #[test]
    fn connection_helper_finds_netcons_and_rejects_others() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let syn = p.point_process("ExpSyn", s, &[]).unwrap();
        let stim = syn.stimulate(&mut p, &Default::default()).unwrap();

        let nc = p.connection(&stim, &syn, true).unwrap();
        assert_eq!(p.kind_of(nc.id()), Some(ObjectKind::NetCon));
        assert_eq!(p.connection(&syn, &stim, false).unwrap(), nc);
        assert!(matches!(
            p.connection(&s, &s, true),
            Err(PatchError::NotConnected { .. })
        ));
        let v = p.vector(&[]).unwrap();
        assert!(matches!(
            p.connection(&v, &s, true),
            Err(PatchError::NotConnectable { label: "Source", .. })
        ));
        assert!(matches!(
            p.connection(&s, &v, true),
            Err(PatchError::NotConnectable { label: "Target", .. })
        ));
    }

    #[test]
    fn disconnect_releases_an_unheld_netcon() {
        let mut p = interpreter();
        let a = p.net_stim().unwrap();
        let b = p.net_stim().unwrap();
        let nc = p.net_con(a, b, NetConOptions::default()).unwrap();
        let before = p.live_objects();

        assert!(p.disconnect(&a, &b).unwrap());
        assert_eq!(p.live_objects(), before - 1);
        assert!(matches!(nc.delay(&p), Err(PatchError::Stale(_))));
        assert!(!p.disconnect(&a, &b).unwrap());
    }

    #[test]
    fn release_collects_objects_only_held_by_the_caller() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let child = p.new_section(None).unwrap();
        child.connect(&mut p, s).unwrap();

        // The parent keeps the child alive.
        assert_eq!(p.release(&child), 0);
        assert_eq!(p.release(&s), 2);
        assert_eq!(p.live_objects(), 0);
    }

    #[test]
    fn traversals_root_released_sections_again() {
        let mut p = interpreter();
        let soma = p.new_section(None).unwrap();
        let dend = p.new_section(None).unwrap();
        dend.connect(&mut p, soma).unwrap();
        assert_eq!(p.release(&dend), 0);

        let listed = p.allsec().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&dend));

        // The listing handed out a fresh handle on dend.
        assert_eq!(p.release(&soma), 0);
        assert_eq!(p.live_objects(), 2);
        assert_eq!(p.release(&dend), 2);
        assert_eq!(p.live_objects(), 0);
    }

    #[test]
    fn references_are_tracked_per_owner() {
        let mut p = interpreter();
        let s = p.new_section(None).unwrap();
        let s2 = p.new_section(None).unwrap();
        assert!(s.reference(&mut p, &s2));
        assert!(!s.reference(&mut p, &s2));
        assert_eq!(p.references(s.id()).len(), 1);
        assert!(s.dereference(&mut p, &s2));
        assert!(!s.dereference(&mut p, &s2));
    }
}
