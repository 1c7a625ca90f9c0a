//! Command-line interface for musicdex.
//!
//! This module provides CLI commands for scanning, listing and watching the
//! library.

mod commands;

pub use commands::{Cli, run_command};
