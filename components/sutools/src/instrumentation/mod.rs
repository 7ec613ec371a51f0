//! Diagnostics of the crate itself.

pub mod tracing;
