//! Command-line interface
//!
//! Argument parsing and command handlers for the `retrodrive` binary.

pub mod args;
pub mod commands;
