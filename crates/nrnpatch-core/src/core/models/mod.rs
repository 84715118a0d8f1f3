//! # Core Models Module
//!
//! Host-side identities and bookkeeping for wrapped foreign objects.
//!
//! ## Overview
//!
//! Foreign objects are owned by the interpreter; the library only keeps a record of
//! each one it has wrapped. These records live in an [`registry::ObjectRegistry`]
//! keyed by [`ids::ObjectId`], which is what lets two wrappers of the same foreign
//! object compare equal and what decides when a foreign object may be released.
//!
//! ## Key Components
//!
//! - [`ids`] - Slot map keys identifying wrapped objects
//! - [`kind`] - Classification of templates into wrapper families
//! - [`facet`] - Per-family bookkeeping (recordings, synapses, transfer state)
//! - [`registry`] - The object store with reference tracking and sweeping

pub mod facet;
pub mod ids;
pub mod kind;
pub mod registry;
