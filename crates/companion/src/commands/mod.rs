//! Companion subcommands

pub mod status;
pub mod watch;
