//! # Engine Module
//!
//! The stateful layer: an interpreter facade and the typed wrappers operating on it.
//!
//! ## Overview
//!
//! Everything goes through an [`interpreter::Interpreter`]. It owns the backend and
//! the object registry, runs every backend interaction through the error translation
//! table, and tracks simulation state (run time, initialization, the time vector and
//! the parallel context). Wrappers are plain handles; their operations borrow the
//! interpreter explicitly.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Startup file, temperature and default parameters
//! - **Facade** ([`interpreter`]) - Globals, object creation, lifetimes, simulation control, connections
//! - **Wrappers** ([`objects`]) - Sections, segments, NetCons, point processes, clamps, vectors
//! - **Parallel Simulation** ([`parallel`]) - GID connections, variable transfer and broadcasting

pub mod config;
pub mod interpreter;
pub mod objects;
pub mod parallel;
