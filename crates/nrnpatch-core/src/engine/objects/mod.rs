//! # Objects Module
//!
//! Typed handles for wrapped interpreter objects.
//!
//! ## Overview
//!
//! Every handle is a small `Copy` value naming an entry of the interpreter's
//! object registry. Handles carry no borrow of the interpreter; each operation
//! takes the [`Interpreter`] explicitly. Two handles are equal exactly when they
//! wrap the same foreign object.
//!
//! The [`Wrapped`] trait provides what every wrapper can do: forward attribute
//! access and method calls to the foreign object, describe itself, and keep other
//! objects alive. Families add typed accessors on top (section geometry, clamp
//! timing, connection weights).
//!
//! ## Key Components
//!
//! - [`section`] / [`segment`] - Cable sections and locations along them
//! - [`netcon`] - Connections between event sources and targets
//! - [`point_process`] / [`clamps`] - Mechanisms located at a point of a section
//! - [`stimulus`] - Spike generators (`NetStim`, `VecStim`)
//! - [`vector`] - Recording and playback buffers
//! - [`section_ref`] - Handles for navigating section trees

pub mod clamps;
pub mod netcon;
pub mod point_process;
pub mod section;
pub mod section_ref;
pub mod segment;
pub mod stimulus;
pub mod vector;

pub use clamps::{Amplitude, IClamp, IClampOptions, SEClamp};
pub use netcon::{NetCon, NetConOptions};
pub use point_process::{PointProcess, SynapseOptions};
pub use section::{Diameters, PushedSection, Section};
pub use section_ref::SectionRef;
pub use segment::Segment;
pub use stimulus::{NetStim, Stimulator, Stimulus, VecStim};
pub use vector::Vector;

use super::interpreter::Interpreter;
use crate::core::errors::Result;
use crate::core::hoc::{RangeRef, Value};
use crate::core::models::ids::ObjectId;

/// Behaviour shared by every wrapped object.
pub trait Wrapped {
    fn id(&self) -> ObjectId;

    /// Reads an attribute of the foreign object, falling back to host-side attributes.
    fn attr(&self, interp: &Interpreter, name: &str) -> Result<Value> {
        interp.attr(self.id(), name)
    }

    /// Writes an attribute; names the foreign object does not know are stored on the host.
    fn set_attr(&self, interp: &mut Interpreter, name: &str, value: Value) -> Result<()> {
        interp.set_attr(self.id(), name, value)
    }

    fn call(&self, interp: &mut Interpreter, method: &str, args: &[Value]) -> Result<Value> {
        interp.call(self.id(), method, args)
    }

    /// The interpreter's representation of the foreign object.
    fn describe(&self, interp: &Interpreter) -> String {
        interp.describe(self.id())
    }

    /// Keeps `other` alive for as long as this object is alive.
    fn reference(&self, interp: &mut Interpreter, other: &dyn Wrapped) -> bool {
        interp.reference(self.id(), other.id())
    }

    fn dereference(&self, interp: &mut Interpreter, other: &dyn Wrapped) -> bool {
        interp.dereference(self.id(), other.id())
    }
}

impl Wrapped for ObjectId {
    fn id(&self) -> ObjectId {
        *self
    }
}

/// Objects that can be an endpoint of a NetCon.
pub trait Connectable: Wrapped {}

/// Objects that have a default location along a section.
pub trait Arced {
    fn arc(&self) -> f64 {
        0.5
    }
}

/// Objects whose state can be recorded into a vector.
pub trait Recordable {
    fn record_ref(&self, interp: &Interpreter) -> Result<RangeRef>;
}

macro_rules! wrapper {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) $crate::core::models::ids::ObjectId);

        impl $crate::engine::objects::Wrapped for $name {
            fn id(&self) -> $crate::core::models::ids::ObjectId {
                self.0
            }
        }

        impl From<$name> for $crate::engine::objects::HocObject {
            fn from(wrapper: $name) -> Self {
                $crate::engine::objects::HocObject(wrapper.0)
            }
        }

        impl From<$name> for $crate::engine::objects::Endpoint {
            fn from(wrapper: $name) -> Self {
                $crate::engine::objects::Endpoint::Object(wrapper.0)
            }
        }

        impl From<$name> for $crate::engine::objects::RecordTarget {
            fn from(wrapper: $name) -> Self {
                $crate::engine::objects::RecordTarget::Object(wrapper.0)
            }
        }
    };
}
pub(crate) use wrapper;

/// A wrapped object of a template without a dedicated wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HocObject(pub(crate) ObjectId);

impl Wrapped for HocObject {
    fn id(&self) -> ObjectId {
        self.0
    }
}

impl From<HocObject> for Endpoint {
    fn from(object: HocObject) -> Self {
        Endpoint::Object(object.0)
    }
}

impl From<HocObject> for RecordTarget {
    fn from(object: HocObject) -> Self {
        RecordTarget::Object(object.0)
    }
}

/// One side of a NetCon.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// No object; a NetCon without a target is a spike detector.
    None,
    Object(ObjectId),
    /// Threshold detection on the membrane potential at a location.
    Segment(Segment),
    /// A raw interpreter value that was never wrapped.
    Foreign(Value),
}

impl From<Segment> for Endpoint {
    fn from(segment: Segment) -> Self {
        Endpoint::Segment(segment)
    }
}

impl From<Value> for Endpoint {
    fn from(value: Value) -> Self {
        Endpoint::Foreign(value)
    }
}

impl<T: Into<Endpoint>> From<Option<T>> for Endpoint {
    fn from(endpoint: Option<T>) -> Self {
        endpoint.map(Into::into).unwrap_or(Endpoint::None)
    }
}

/// Something `Interpreter::record` can record from.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordTarget {
    Object(ObjectId),
    Segment(Segment),
    Pointer(RangeRef),
    Foreign(Value),
}

impl From<Segment> for RecordTarget {
    fn from(segment: Segment) -> Self {
        RecordTarget::Segment(segment)
    }
}

impl From<RangeRef> for RecordTarget {
    fn from(pointer: RangeRef) -> Self {
        RecordTarget::Pointer(pointer)
    }
}

impl From<Value> for RecordTarget {
    fn from(value: Value) -> Self {
        RecordTarget::Foreign(value)
    }
}

/// Where a point process is placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Location {
    /// The section's default location.
    Section(Section),
    Segment(Segment),
}

impl From<Section> for Location {
    fn from(section: Section) -> Self {
        Location::Section(section)
    }
}

impl From<Segment> for Location {
    fn from(segment: Segment) -> Self {
        Location::Segment(segment)
    }
}

impl Location {
    pub fn section(&self) -> Section {
        match self {
            Location::Section(section) => *section,
            Location::Segment(segment) => segment.section,
        }
    }

    /// Resolves the default location of a section to a segment.
    pub fn segment(&self) -> Segment {
        match self {
            Location::Section(section) => section.segment(section.arc()),
            Location::Segment(segment) => *segment,
        }
    }
}
