//! Subcommand parser synthesis and dispatch.

pub mod dispatcher;
pub mod parser;
