//! Internal utility modules
//!
//! Shared helpers that are not part of the public API.

pub mod fs_utils;
pub mod progress;
