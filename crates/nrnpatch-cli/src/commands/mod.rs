pub mod build;
pub mod classify;
