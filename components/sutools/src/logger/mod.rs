//! Named loggers, their line format, retention and exit cleanup.

pub mod cleanup;
pub mod format;
pub mod manager;
pub mod retention;
