//! # annodigest
//!
//! Library half of the `annodigest` binary: CLI definitions, configuration
//! loading and report types. Exposed so integration tests can drive the
//! commands without spawning a process.

pub mod cli;
pub mod config;
pub mod output;
