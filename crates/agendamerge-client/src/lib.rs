//! agendamerge client library.
//!
//! - CLI argument parsing
//! - Configuration loading and validation
//! - Secret resolution for source locations
//! - Command implementations

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;
