//! Command line handling

pub mod args;
pub mod invocation;
pub mod split;

pub use args::{command_for, parse_from, BuildArgs, IncrArgs, ParsedArgs};
pub use invocation::Invocation;
