//! Install workflow
//!
//! One run per recipe instance:
//!
//! 1. refuse to freeze unless offline, or into a configuration file being read
//! 2. fetch the main software, extracting a downloaded archive
//! 3. fetch every addon source, then resolve the addons paths
//! 4. read the main software's manifest
//! 5. hand derived settings and requirements to the requirements installer
//! 6. freeze, when asked to
//!
//! Any failure aborts the run for that recipe instance.

pub mod manifest;
pub mod requirements;
pub mod resolve;

use crate::acquire::fetch::{FetchRequest, Fetcher};
use crate::acquire::vcs::{Vcs, VcsOptions};
use crate::build;
use crate::core::config::{Buildout, RecipeOptions};
use crate::core::error::{Result, SourceError};
use crate::core::output;
use crate::freeze::{FreezeEngine, FreezeSession};
use crate::internal::fs_utils;
use crate::spec::{
    Nightly, SourceDescriptor, SourceEntry, SourceTable, VersionContext, VersionSpec,
    parse_addons, parse_version,
};
use indexmap::IndexMap;
use requirements::{RequirementsInstaller, RequirementsRequest};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A configured recipe instance, parsed and ready to install
#[derive(Debug, Clone)]
pub struct Recipe {
    pub name: String,
    pub options: RecipeOptions,
    pub version: VersionSpec,
    pub sources: SourceTable,
}

impl Recipe {
    /// Parse the `version`, `addons` and `revisions` options. No I/O.
    pub fn new(
        name: impl Into<String>,
        options: RecipeOptions,
        buildout: &Buildout,
        vcs_kinds: &BTreeSet<String>,
    ) -> Result<Self> {
        let ctx = VersionContext {
            buildout,
            base_url: options.base_url.as_deref(),
            vcs_kinds,
        };
        let mut version = parse_version(options.version()?, &ctx)?;
        let mut addons = parse_addons(&options.addons, vcs_kinds)?;
        if let Some(revisions) = &options.revisions {
            pin_revisions(revisions, &mut version.descriptor, &mut addons);
        }

        let mut sources = SourceTable::new(version.descriptor.clone());
        sources.extend_addons(addons);
        Ok(Self {
            name: name.into(),
            options,
            version,
            sources,
        })
    }

    /// Backend options for `kind`, from the recipe options
    fn vcs_options(&self, kind: &str) -> VcsOptions {
        VcsOptions {
            offline: false,
            clear_locks: self.options.vcs_clear_locks,
            clear_retry: self.options.vcs_clear_retry,
            extra: self.options.vcs_options(kind),
        }
    }
}

fn set_revision(descriptor: &mut SourceDescriptor, pinned: &str) -> bool {
    match descriptor {
        SourceDescriptor::Vcs { revision, .. } => {
            *revision = pinned.to_string();
            true
        }
        _ => false,
    }
}

/// Apply a `revisions` option: `<rev>` pins the main checkout, `<path> <rev>`
/// an addon checkout.
fn pin_revisions(
    revisions: &str,
    main: &mut SourceDescriptor,
    addons: &mut IndexMap<PathBuf, SourceEntry>,
) {
    for line in revisions.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => {}
            [revision] => {
                if !set_revision(main, revision) {
                    output::warning(&format!(
                        "main software is not a checkout, revision {revision} ignored"
                    ));
                }
            }
            [path, revision] => {
                let Some(entry) = addons.get_mut(Path::new(path)) else {
                    output::warning(&format!(
                        "no addons declared at {path}, revision {revision} ignored"
                    ));
                    continue;
                };
                if !set_revision(&mut entry.descriptor, revision) {
                    output::warning(&format!(
                        "addons {path} is not a checkout, revision {revision} ignored"
                    ));
                }
            }
            _ => output::warning(&format!("unrecognized revisions line {line:?}")),
        }
    }
}

/// Nightly version out of a detected version such as `trunk-2013-01-01`
pub fn nightly_latest_version(detected: &str) -> Option<&str> {
    detected.split_once('-').map(|(_, version)| version)
}

/// `(major, minor)` of versions such as `6.0-4` or `7.0`; `None` for `trunk`
pub fn major_version(detected: &str) -> Option<(u32, u32)> {
    let mut parts = detected.split(['.', '-']);
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// What an install run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstallation {
    pub software_dir: PathBuf,
    /// Addon directories in declaration order
    pub addons_paths: Vec<PathBuf>,
    pub detected_version: String,
    /// Set when a `latest` nightly was installed
    pub nightly: Option<Nightly>,
    pub requirements: Vec<String>,
}

impl ResolvedInstallation {
    pub fn major_version(&self) -> Option<(u32, u32)> {
        major_version(&self.detected_version)
    }

    /// Replayable version line for an installed `latest` nightly, such as
    /// `trunk nightly 2013-01-01`
    pub fn dump_nightly_latest_version(&self) -> Option<String> {
        let nightly = self.nightly.as_ref().filter(|n| n.is_latest())?;
        let version = nightly_latest_version(&self.detected_version)?;
        Some(format!("{} nightly {}", nightly.series, version))
    }

    /// Addons shipped with the main software
    pub fn software_addons_dir(&self) -> PathBuf {
        if self.major_version() == Some((6, 0)) {
            self.software_dir.join("bin").join("addons")
        } else {
            self.software_dir.join("openerp").join("addons")
        }
    }

    /// Comma separated addons path, main software addons first. Empty when
    /// no addons are declared, leaving the software's own default.
    pub fn addons_path(&self) -> String {
        if self.addons_paths.is_empty() {
            return String::new();
        }
        std::iter::once(self.software_addons_dir())
            .chain(self.addons_paths.iter().cloned())
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Import paths of the main software
    pub fn extra_paths(&self) -> Vec<PathBuf> {
        match self.major_version() {
            Some(version) if version < (6, 2) => vec![
                self.software_dir.join("bin"),
                self.software_dir.join("bin").join("addons"),
            ],
            _ => vec![self.software_dir.clone(), self.software_dir.join("addons")],
        }
    }
}

/// Runs the install workflow for recipe instances of one buildout
pub struct Installer<'a> {
    buildout: &'a Buildout,
    vcs: &'a dyn Vcs,
    requirements: &'a dyn RequirementsInstaller,
}

impl<'a> Installer<'a> {
    pub fn new(
        buildout: &'a Buildout,
        vcs: &'a dyn Vcs,
        requirements: &'a dyn RequirementsInstaller,
    ) -> Self {
        Self {
            buildout,
            vcs,
            requirements,
        }
    }

    /// Install `recipe`, freezing it when `freeze-to` is set.
    pub fn install(&self, recipe: &Recipe, session: &mut FreezeSession) -> Result<ResolvedInstallation> {
        output::action(&format!("Installing {}", recipe.name));

        let freeze_to = recipe
            .options
            .freeze_to
            .as_ref()
            .map(|p| self.buildout.make_absolute(p));
        if let Some(out) = &freeze_to
            && !self.buildout.offline
        {
            return Err(SourceError::UnsafeFreeze {
                path: out.clone(),
                reason: "freezing is only possible in offline mode (-o)".into(),
            });
        }
        if let Some(out) = &freeze_to
            && self.buildout.reads_config(out)
        {
            return Err(SourceError::UnsafeFreeze {
                path: out.clone(),
                reason: "the configuration being installed is read from this file".into(),
            });
        }

        self.buildout.ensure_dirs()?;
        let fetcher = Fetcher::new(self.vcs, self.buildout.offline);

        output::sub_action("main software");
        let software_dir = self.fetch_main(recipe, &fetcher)?;

        output::sub_action("addons");
        for (dir, entry) in recipe.sources.addons() {
            let request = FetchRequest {
                vcs: recipe.vcs_options(entry.descriptor.kind()),
                ..Default::default()
            };
            fetcher.fetch(&entry.descriptor, &self.buildout.make_absolute(dir), &request)?;
        }
        let addons_paths = resolve::resolve_addons(&recipe.sources, self.buildout)?;

        let manifest = manifest::read_manifest(&software_dir)?;
        tracing::debug!("version {} read from {}", manifest.version, manifest.source.display());

        let mut requirements = recipe.options.eggs.clone();
        requirements.extend(manifest.requirements);

        let installation = ResolvedInstallation {
            software_dir,
            addons_paths,
            detected_version: manifest.version,
            nightly: recipe.version.nightly.clone().filter(|n| n.is_latest()),
            requirements,
        };
        if let Some(pinned) = installation.dump_nightly_latest_version() {
            output::warning(&format!(
                "Detected 'nightly latest version', you may want to fix it in your config file for replayability:\n    version = \"{}\"",
                pinned
            ));
        }

        self.requirements.install(&RequirementsRequest {
            recipe: recipe.name.clone(),
            addons_path: installation.addons_path(),
            extra_paths: installation.extra_paths(),
            requirements: installation.requirements.clone(),
        })?;

        if let Some(out) = &freeze_to {
            FreezeEngine::new(self.vcs, self.buildout).freeze(session, recipe, &installation, out)?;
        }

        output::success(&format!(
            "{} {} installed in {}",
            recipe.name,
            installation.detected_version,
            installation.software_dir.display()
        ));
        Ok(installation)
    }

    fn fetch_main(&self, recipe: &Recipe, fetcher: &Fetcher<'_>) -> Result<PathBuf> {
        let spec = &recipe.version;
        let descriptor = recipe.sources.main();
        let request = FetchRequest {
            caching: spec.caching,
            version: spec.wanted.clone(),
            vcs: recipe.vcs_options(descriptor.kind()),
        };

        match descriptor {
            SourceDescriptor::Downloadable { .. } => {
                let archive = spec.archive.as_ref().ok_or_else(|| {
                    SourceError::InstallationError(format!("no archive for {}", spec.wanted))
                })?;
                fetcher.fetch(descriptor, &archive.path, &request)?;
                match build::extract(&archive.path, &self.buildout.parts_dir) {
                    Ok(extraction) => Ok(extraction.directory),
                    Err(e @ SourceError::CorruptArchive { .. }) => {
                        // Drop it from the download cache.
                        fs_utils::remove_file_if_exists(&archive.path)?;
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            }
            SourceDescriptor::Local | SourceDescriptor::Vcs { .. } => {
                let dir = spec.software_dir.as_ref().ok_or_else(|| {
                    SourceError::InstallationError(format!("no directory for {}", spec.wanted))
                })?;
                let dir = fetcher.fetch(descriptor, dir, &request)?;
                if !dir.is_dir() {
                    return Err(SourceError::InstallationError(format!(
                        "main software directory {} does not exist",
                        dir.display()
                    )));
                }
                Ok(dir)
            }
        }
    }
}
