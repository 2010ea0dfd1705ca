//! Turning a downloaded archive into a software directory
//!
//! - **extract**: sandboxed extraction of tar archives (gz, xz, bz2, zst)
//! - **verify**: check that a download is a complete, readable archive

pub mod extract;

pub use extract::{Extraction, extract, verify};
