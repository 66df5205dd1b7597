//! # cpqindex
//!
//! Command line front end for `cpqindex-core`.
//!
//! The engine is pure and synchronous; this crate adds everything around
//! it: argument parsing, configuration, logging and output formats.

pub mod cli;
pub mod config;
pub mod output;
pub mod progress;
