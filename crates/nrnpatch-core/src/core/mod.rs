//! # Core Module
//!
//! The foundation the wrapper layer is built on.
//!
//! ## Overview
//!
//! The core module knows nothing about individual object families. It defines how
//! the library talks to the interpreter, how interpreter failures become typed
//! errors, and how wrapped objects are identified and kept alive.
//!
//! ## Architecture
//!
//! - **Interpreter Protocol** ([`hoc`]) - The backend seam, interpreter values and an in-memory backend
//! - **Errors** ([`errors`]) - The error hierarchy and the rule table that translates captured error text
//! - **Object Bookkeeping** ([`models`]) - Identities, wrapper families and the reference-tracking registry

pub mod errors;
pub mod hoc;
pub mod models;
