//! Optional timing of command calls.

#[allow(clippy::module_inception)]
pub mod bench;
