//! Source acquisition and version resolution for server installation recipes
//!
//! A recipe instance names the version of the main software it wants and the
//! addon directories to put next to it. This crate turns those declarations
//! into files on disk:
//!
//! - [`spec`] parses the `version` and `addons` options into a source table
//! - [`acquire`] downloads archives (with caching) and drives VCS checkouts
//! - [`build`] extracts downloaded archives safely
//! - [`install`] runs the whole workflow and resolves the addons paths
//! - [`freeze`] pins what was installed into a replayable configuration
//!
//! ## Example configuration
//!
//! ```toml
//! [recipes.openerp]
//! version = "nightly trunk latest"
//! addons = """
//! git https://example.com/addons.git addons-extra main
//! local custom-addons
//! """
//! ```

pub mod acquire;
pub mod build;
pub mod core;
pub mod freeze;
pub mod install;
pub(crate) mod internal;
pub mod spec;

pub use crate::core::config::{Buildout, RecipeConfig, RecipeOptions};
pub use crate::core::error::{Result, SourceError};
pub use crate::core::output;
pub use freeze::{FreezeEngine, FreezeSession};
pub use install::requirements::{ReportOnly, RequirementsInstaller, RequirementsRequest};
pub use install::{Installer, Recipe, ResolvedInstallation};
