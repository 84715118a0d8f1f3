//! # nrnpatch
//!
//! A typed wrapper layer over the NEURON simulator's hoc interpreter.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** The protocol spoken with the interpreter
//!   ([`core::hoc::Hoc`]), the error hierarchy and its translation table, and the
//!   registry that tracks every wrapped foreign object and the references between them.
//!
//! - **[`engine`]: The Logic Core.** The [`engine::interpreter::Interpreter`] facade,
//!   its configuration, the typed wrappers for sections, segments, connections, point
//!   processes, clamps and vectors, and the parallel-context helpers.
//!
//! - **[`workflows`]: The Public API.** Declarative model descriptions built through
//!   the facade in one call.
//!
//! The interpreter itself is an injected dependency: any type implementing
//! [`core::hoc::Hoc`] can back an [`engine::interpreter::Interpreter`], and
//! [`core::hoc::memory::MemoryHoc`] provides an in-memory one.

pub mod core;
pub mod engine;
pub mod workflows;
