//! Subcommand handlers.

pub mod alerts;
pub mod config_cmd;
pub mod fetch;
pub mod watch;
