//! Helpers for distributed simulations over a `ParallelContext`.
//!
//! Every node owns a subset of the cells, identified by global ids (GIDs).
//! Spikes cross node boundaries through GID connections, and continuous
//! variables through keyed transfer registrations that must be set up
//! collectively before the simulation is initialized.

use super::interpreter::Interpreter;
use super::objects::{Endpoint, NetCon, NetConOptions, Vector, Wrapped, wrapper};
use crate::core::errors::rules::{ErrorContext, Operation};
use crate::core::errors::{PatchError, Result};
use crate::core::hoc::{RangeRef, Target, Value};
use crate::core::models::facet::{Facet, ParallelFacet};
use crate::core::models::kind::ObjectKind;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

wrapper!(
    /// The interpreter's parallel context. There is one per interpreter.
    ParallelContext
);

/// One side of [`Interpreter::parallel_con`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParallelTerminal {
    /// A cell on any node, by global id.
    Gid(i64),
    /// An object on this node.
    Local(Endpoint),
}

impl ParallelTerminal {
    pub fn local(endpoint: impl Into<Endpoint>) -> Self {
        ParallelTerminal::Local(endpoint.into())
    }
}

impl From<i64> for ParallelTerminal {
    fn from(gid: i64) -> Self {
        ParallelTerminal::Gid(gid)
    }
}

/// Options of [`Interpreter::parallel_con`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParallelConOptions {
    /// Whether a local source also sends its spikes to other nodes.
    pub output: bool,
    pub weight: Option<f64>,
    pub delay: Option<f64>,
    pub threshold: Option<f64>,
}

impl Default for ParallelConOptions {
    fn default() -> Self {
        Self {
            output: true,
            weight: None,
            delay: None,
            threshold: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Source,
    Target,
}

impl Transfer {
    fn method(self) -> &'static str {
        match self {
            Transfer::Source => "source_var",
            Transfer::Target => "target_var",
        }
    }
}

impl Interpreter {
    /// The parallel context, created on first use.
    pub fn parallel_context(&mut self) -> Result<ParallelContext> {
        if let Some(pc) = self.parallel.filter(|pc| self.registry.contains(pc.0)) {
            return Ok(pc);
        }
        let context = ErrorContext::new().with("object", "ParallelContext");
        let pc = ParallelContext(self.instantiate("ParallelContext", &[], Operation::Any, &context)?);
        self.parallel = Some(pc);
        let (rank, nhost) = (pc.id(self)?, pc.nhost(self)?);
        info!(rank, nhost, "Initialized parallel context");
        Ok(pc)
    }

    /// Sets up variable transfer if any node registered transfer variables since
    /// the last setup. Every node must call this collectively, so the parallel
    /// context is created here if this node never used it.
    pub(crate) fn setup_transfer(&mut self) -> Result<()> {
        let pc = self.parallel_context()?;
        let pending = pc.transfer_state(self)?.transfer_pending;
        let nodes_pending = pc.allreduce(self, if pending { 1.0 } else { 0.0 })?;
        if nodes_pending > 0.0 {
            debug!(nodes_pending, "Setting up variable transfer");
            pc.setup_transfer(self)?;
        }
        Ok(())
    }

    /// Connects a local object and a global id.
    ///
    /// With a local source the connection is a spike detector whose spikes are
    /// sent out as cell `gid`. With a local target, spikes of cell `gid` on any
    /// node are delivered to the target. Exactly one side must be a GID.
    pub fn parallel_con(
        &mut self,
        a: impl Into<ParallelTerminal>,
        b: impl Into<ParallelTerminal>,
        options: ParallelConOptions,
    ) -> Result<NetCon> {
        match (a.into(), b.into()) {
            (ParallelTerminal::Local(source), ParallelTerminal::Gid(gid)) => {
                let pc = self.parallel_context()?;
                let netcon_options = NetConOptions {
                    weight: options.weight,
                    delay: options.delay,
                    threshold: options.threshold,
                };
                let netcon = self.net_con(source, Endpoint::None, netcon_options)?;
                let rank = pc.id(self)?;
                pc.set_gid2node(self, gid, rank)?;
                pc.cell(self, gid, netcon)?;
                if options.output {
                    pc.outputcell(self, gid)?;
                }
                Ok(netcon)
            }
            (ParallelTerminal::Gid(gid), ParallelTerminal::Local(target)) => {
                let pc = self.parallel_context()?;
                let netcon = pc.gid_connect(self, gid, target)?;
                if let Some(delay) = options.delay {
                    netcon.set_delay(self, delay)?;
                }
                if let Some(weight) = options.weight {
                    netcon.set_weight(self, weight)?;
                }
                let threshold = options.threshold.unwrap_or(self.config.netcon.threshold);
                netcon.set_threshold(self, threshold)?;
                Ok(netcon)
            }
            _ => Err(PatchError::ParallelConnect(
                "Exactly one of the first or second arguments has to be a GID.".to_string(),
            )),
        }
    }
}

impl ParallelContext {
    fn number(self, interp: &mut Interpreter, method: &str, args: &[Value]) -> Result<f64> {
        let value = self.call(interp, method, args)?;
        value.as_number().ok_or_else(|| {
            PatchError::Foreign(format!("{} returned a {}", method, value.type_name()))
        })
    }

    fn transfer_state(self, interp: &Interpreter) -> Result<&ParallelFacet> {
        match &interp.entry(self.0)?.facet {
            Facet::Parallel(facet) => Ok(facet),
            _ => Err(PatchError::InvalidArgument(format!(
                "{} is not a parallel context",
                interp.describe(self.0)
            ))),
        }
    }

    fn transfer_state_mut(self, interp: &mut Interpreter) -> Result<&mut ParallelFacet> {
        let name = interp.describe(self.0);
        match &mut interp.entry_mut(self.0)?.facet {
            Facet::Parallel(facet) => Ok(facet),
            _ => Err(PatchError::InvalidArgument(format!(
                "{} is not a parallel context",
                name
            ))),
        }
    }

    /// The rank of this node.
    pub fn id(self, interp: &mut Interpreter) -> Result<i64> {
        self.number(interp, "id", &[]).map(|n| n as i64)
    }

    pub fn nhost(self, interp: &mut Interpreter) -> Result<i64> {
        self.number(interp, "nhost", &[]).map(|n| n as i64)
    }

    pub fn set_gid2node(self, interp: &mut Interpreter, gid: i64, node: i64) -> Result<()> {
        self.call(interp, "set_gid2node", &[Value::from(gid as f64), Value::from(node as f64)])
            .map(|_| ())
    }

    /// Makes `netcon` the spike source of cell `gid`.
    pub fn cell(self, interp: &mut Interpreter, gid: i64, netcon: NetCon) -> Result<()> {
        let netcon = interp.transform(&netcon)?;
        self.call(interp, "cell", &[Value::from(gid as f64), netcon])
            .map(|_| ())
    }

    pub fn outputcell(self, interp: &mut Interpreter, gid: i64) -> Result<()> {
        self.call(interp, "outputcell", &[Value::from(gid as f64)])
            .map(|_| ())
    }

    /// Connects cell `gid` to a local target. The connection and the target keep
    /// each other alive.
    pub fn gid_connect(
        self,
        interp: &mut Interpreter,
        gid: i64,
        target: impl Into<Endpoint>,
    ) -> Result<NetCon> {
        let target = target.into();
        let target_value = interp.transform_netcon(&target)?;
        let handle = interp.handle(self.0)?;
        let context = ErrorContext::new()
            .with("object", "ParallelContext")
            .with("source", "int")
            .with("target", target_value.type_name());
        let value = interp.guarded(Operation::NetCon, &context, |hoc| {
            hoc.call(
                Target::Object(handle),
                "gid_connect",
                &[Value::from(gid as f64), target_value],
            )
        })?;
        let handle = value.as_object().ok_or_else(|| {
            PatchError::Foreign(format!("gid_connect returned a {}", value.type_name()))
        })?;
        let netcon = NetCon(interp.register(handle, "NetCon"));
        let target_id = match target {
            Endpoint::Object(id) => Some(id),
            Endpoint::Segment(segment) => Some(segment.section.id()),
            _ => None,
        };
        if let Some(target_id) = target_id {
            interp.reference(netcon.0, target_id);
            interp.reference(target_id, netcon.0);
            if let Facet::NetCon(facet) = &mut interp.entry_mut(netcon.0)?.facet {
                facet.target = Some(target_id);
            }
        }
        Ok(netcon)
    }

    fn register_transfer(
        self,
        interp: &mut Interpreter,
        transfer: Transfer,
        pointer: RangeRef,
        key: i64,
    ) -> Result<()> {
        if key < 0 {
            return Err(PatchError::InvalidArgument(
                "Transfer variable keys must be larger than 0.".to_string(),
            ));
        }
        self.call(
            interp,
            transfer.method(),
            &[Value::Pointer(pointer), Value::from(key as f64)],
        )?;
        let state = self.transfer_state_mut(interp)?;
        state.transfer_max = state.transfer_max.max(key);
        state.transfer_pending = true;
        Ok(())
    }

    /// Publishes the variable behind `pointer` under transfer `key`.
    pub fn source_var(self, interp: &mut Interpreter, pointer: RangeRef, key: i64) -> Result<()> {
        self.register_transfer(interp, Transfer::Source, pointer, key)
    }

    /// Receives the variable published under `key` into `pointer`.
    pub fn target_var(self, interp: &mut Interpreter, pointer: RangeRef, key: i64) -> Result<()> {
        self.register_transfer(interp, Transfer::Target, pointer, key)
    }

    /// The highest transfer key registered on this node, if any.
    pub fn transfer_max(self, interp: &Interpreter) -> Result<Option<i64>> {
        let max = self.transfer_state(interp)?.transfer_max;
        Ok((max >= 0).then_some(max))
    }

    pub fn transfer_pending(self, interp: &Interpreter) -> Result<bool> {
        Ok(self.transfer_state(interp)?.transfer_pending)
    }

    pub fn setup_transfer(self, interp: &mut Interpreter) -> Result<()> {
        self.call(interp, "setup_transfer", &[])?;
        self.transfer_state_mut(interp)?.transfer_pending = false;
        Ok(())
    }

    pub fn barrier(self, interp: &mut Interpreter) -> Result<()> {
        self.call(interp, "barrier", &[]).map(|_| ())
    }

    /// Sums `value` over all nodes.
    pub fn allreduce(self, interp: &mut Interpreter, value: f64) -> Result<f64> {
        self.number(interp, "allreduce", &[Value::from(value), Value::from(1.0)])
    }

    /// Fills `vector` on every node with its contents on node `root`.
    pub fn broadcast_vector(self, interp: &mut Interpreter, vector: Vector, root: i64) -> Result<()> {
        let value = interp.transform(&vector)?;
        self.call(interp, "broadcast", &[value, Value::from(root as f64)])
            .map(|_| ())
    }

    /// Broadcasts an interpreter object. Only vectors can be broadcast; for any
    /// other object an empty vector is sent so the other nodes do not hang.
    pub fn broadcast_object(self, interp: &mut Interpreter, object: &dyn Wrapped, root: i64) -> Result<()> {
        if interp.kind_of(object.id()) == Some(ObjectKind::Vector) {
            return self.broadcast_vector(interp, Vector(object.id()), root);
        }
        self.send_empty(interp, root)?;
        Err(PatchError::Broadcast(
            "Interpreter objects cannot be broadcast, they need to be created on their own nodes."
                .to_string(),
        ))
    }

    fn send_empty(self, interp: &mut Interpreter, root: i64) -> Result<()> {
        let empty = interp.vector(&[])?;
        let sent = self.broadcast_vector(interp, empty, root);
        interp.release(&empty);
        sent
    }

    /// Sends serializable data from node `root` to every node.
    ///
    /// Only the root's `data` is used; other nodes may pass `None`. The data
    /// travels as serialized bytes inside a vector.
    pub fn broadcast<T>(self, interp: &mut Interpreter, data: Option<&T>, root: i64) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let buffer = if self.id(interp)? == root {
            let encoded = match data.map(serde_json::to_vec) {
                Some(Ok(bytes)) => bytes,
                Some(Err(err)) => {
                    self.send_empty(interp, root)?;
                    return Err(PatchError::Broadcast(err.to_string()));
                }
                None => {
                    self.send_empty(interp, root)?;
                    return Err(PatchError::Broadcast(
                        "The root node has no data to broadcast".to_string(),
                    ));
                }
            };
            let samples: Vec<f64> = encoded.iter().map(|b| f64::from(*b)).collect();
            interp.vector(&samples)?
        } else {
            interp.vector(&[])?
        };

        let received = self
            .broadcast_vector(interp, buffer, root)
            .and_then(|_| buffer.to_vec(interp));
        interp.release(&buffer);
        let bytes: Vec<u8> = received?.into_iter().map(|b| b as u8).collect();
        if bytes.is_empty() {
            return Err(PatchError::Broadcast(
                "Root node did not transmit. Look for root node error.".to_string(),
            ));
        }
        serde_json::from_slice(&bytes).map_err(|err| PatchError::Broadcast(err.to_string()))
    }
}
