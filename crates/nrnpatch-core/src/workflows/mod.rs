//! # Workflows Module
//!
//! High-level entry points that drive the interpreter facade through a complete task.
//!
//! ## Overview
//!
//! Workflows sit on top of the [`engine`](crate::engine) layer. They take a declarative
//! description, validate it, create every object it names through the typed wrappers,
//! and hand back the resulting handles so callers never touch raw interpreter values.
//!
//! ## Architecture
//!
//! - **Build Workflow** ([`build`]) - Loads a TOML model description with sections,
//!   synapses, stimuli, connections, clamps and recordings, builds it and optionally
//!   runs the simulation.
//!
//! ## Key Capabilities
//!
//! - **Name resolution** between model entries, with errors naming the missing entry
//! - **Reference tracking** for every created object through the interpreter registry
//! - **Structured logging** of each build phase through `tracing`

pub mod build;
