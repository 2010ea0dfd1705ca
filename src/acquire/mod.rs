//! Getting sources onto local disk
//!
//! - **cache**: decide whether a downloaded archive is still fresh
//! - **download**: HTTP(S) download of the main software archive
//! - **vcs**: version control collaborators (git, Mercurial)
//! - **fetch**: dispatch on the kind of source

pub mod cache;
pub mod download;
pub mod fetch;
pub mod vcs;

pub use cache::CachePolicy;
pub use fetch::{FetchRequest, Fetcher};
pub use vcs::{Vcs, VcsOptions, VcsRegistry};
