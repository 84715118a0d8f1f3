//! # Errors Module
//!
//! The error hierarchy of the library and the table that translates the
//! interpreter's captured error text into it.
//!
//! ## Overview
//!
//! The interpreter reports most failures as an opaque "hoc error" and writes the
//! useful details to its error stream. [`rules::ErrorRules`] inspects that text and
//! picks the most specific [`HocError`] variant; everything else the library can
//! detect on its own is a direct [`PatchError`] variant.

pub mod rules;

use crate::core::models::ids::ObjectId;
use thiserror::Error;

/// Failures raised by the interpreter, narrowed down by the translation table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HocError {
    /// A hoc error no rule recognized. Carries the captured error text.
    #[error("hoc error: {0}")]
    General(String),

    #[error("connection error: {0}")]
    Connect(String),

    #[error("section access error: {0}")]
    SectionAccess(String),

    #[error("recording error: {0}")]
    Record(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatchError {
    #[error("{label} {object} is not connectable. It cannot take part in NetCons")]
    NotConnectable { label: &'static str, object: String },

    #[error("Source {from} is not connected to target {to}")]
    NotConnected { from: String, to: String },

    #[error("Cannot transform {0} into an interpreter value")]
    Transform(String),

    #[error(transparent)]
    Hoc(#[from] HocError),

    #[error("Error handling failed: {0}")]
    ErrorHandling(String),

    #[error("Parallel connection failed: {0}")]
    ParallelConnect(String),

    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Simulation not initialized: {0}")]
    Uninitialized(String),

    #[error("'{object}' has no attribute '{name}'")]
    UnknownAttribute { object: String, name: String },

    #[error("Unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Section stack error: {0}")]
    SectionStack(String),

    #[error("Object {0:?} has been released")]
    Stale(ObjectId),

    #[error("Interpreter failure: {0}")]
    Foreign(String),
}

pub type Result<T> = std::result::Result<T, PatchError>;
