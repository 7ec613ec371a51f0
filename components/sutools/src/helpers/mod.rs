//! Configuration and error types.

pub mod errors;
pub mod load_config;
