//! Function descriptors and the registry that stores them.

pub mod models;
#[allow(clippy::module_inception)]
pub mod registry;
pub mod signature;
