//! Core infrastructure shared by every stage of a recipe run
//!
//! Errors, user-facing output and the configuration file.

pub mod config;
pub mod error;
pub mod output;
