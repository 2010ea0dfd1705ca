//! Addon resolver
//!
//! Builds the ordered list of addon directories. A directory that is itself
//! one addon (its root holds an addon manifest) is wrapped into a container
//! of the same name, since the server expects directories of addons:
//!
//! 1. rename `dir` aside to `dir_<n>` (first free `n`)
//! 2. create an empty `dir`
//! 3. move `dir_<n>` to `dir/<name of dir>`
//!
//! A marker file travels with the addon during the move. If a run is
//! interrupted, the next one finds the marker and completes or rolls back the
//! move before looking at the directory again.

use crate::core::config::Buildout;
use crate::core::error::{IoContext, Result, SourceError};
use crate::core::output;
use crate::internal::fs_utils;
use crate::spec::SourceTable;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Files marking the root of a single addon
pub const ADDON_MANIFESTS: &[&str] = &["__openerp__.py", "__manifest__.py", "__terp__.py"];

const SHUFFLE_MARKER: &str = ".addon-shuffle";

/// Resolve the addon directories of `table`, in declaration order.
///
/// Every returned path is an existing directory.
pub fn resolve_addons(table: &SourceTable, buildout: &Buildout) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for (dir, entry) in table.addons() {
        let local_dir = buildout.make_absolute(dir);
        let addons_dir = match entry.options.subdir() {
            Some(subdir) => local_dir.join(subdir),
            None => local_dir,
        };

        recover_shuffle(&addons_dir)?;
        if is_single_addon(&addons_dir) {
            wrap_single_addon(&addons_dir)?;
        }
        paths.push(addons_dir);
    }

    for path in &paths {
        if !path.is_dir() {
            return Err(SourceError::InstallationError(format!(
                "addons path {} is not a directory",
                path.display()
            )));
        }
    }
    Ok(paths)
}

/// True if `dir`'s root holds an addon manifest
pub fn is_single_addon(dir: &Path) -> bool {
    ADDON_MANIFESTS.iter().any(|m| dir.join(m).is_file())
}

fn dir_name(addons_dir: &Path) -> Result<&OsStr> {
    addons_dir.file_name().ok_or_else(|| {
        SourceError::InstallationError(format!(
            "addons path {} has no directory name",
            addons_dir.display()
        ))
    })
}

fn aside_path(addons_dir: &Path, n: usize) -> PathBuf {
    let mut name = addons_dir.as_os_str().to_os_string();
    name.push(format!("_{n}"));
    PathBuf::from(name)
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    tracing::debug!("rename {} -> {}", from.display(), to.display());
    std::fs::rename(from, to).at(from)
}

/// Move the single addon at `addons_dir` into a container of the same name.
fn wrap_single_addon(addons_dir: &Path) -> Result<PathBuf> {
    let name = dir_name(addons_dir)?.to_os_string();
    output::detail(&format!(
        "{} is a single addon, moving it into a container of the same name",
        addons_dir.display()
    ));

    let marker = addons_dir.join(SHUFFLE_MARKER);
    std::fs::write(&marker, name.as_encoded_bytes()).at(&marker)?;

    let aside = (0..)
        .map(|n| aside_path(addons_dir, n))
        .find(|p| std::fs::symlink_metadata(p).is_err())
        .ok_or_else(|| SourceError::InstallationError("no free temporary name".into()))?;

    rename(addons_dir, &aside)?;
    std::fs::create_dir(addons_dir).at(addons_dir)?;
    let inner = addons_dir.join(&name);
    rename(&aside, &inner)?;
    fs_utils::remove_file_if_exists(&inner.join(SHUFFLE_MARKER))?;
    Ok(inner)
}

/// Temporary siblings `dir_<n>` left by an interrupted move
fn leftovers(addons_dir: &Path, name: &OsStr) -> Result<Vec<PathBuf>> {
    let Some(parent) = addons_dir.parent() else {
        return Ok(Vec::new());
    };
    let Ok(entries) = std::fs::read_dir(parent) else {
        return Ok(Vec::new());
    };

    let prefix = format!("{}_", name.to_string_lossy());
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            let file_name = e.file_name();
            let file_name = file_name.to_string_lossy();
            file_name.strip_prefix(&prefix).is_some_and(|n| {
                !n.is_empty() && n.chars().all(|c| c.is_ascii_digit())
            })
        })
        .map(|e| e.path())
        .filter(|p| p.join(SHUFFLE_MARKER).is_file())
        .collect();
    found.sort();
    Ok(found)
}

/// Finish or undo a move interrupted by a previous run.
fn recover_shuffle(addons_dir: &Path) -> Result<()> {
    let Ok(name) = dir_name(addons_dir) else {
        return Ok(());
    };

    // Interrupted before the first rename: still flat, redone afterwards.
    fs_utils::remove_file_if_exists(&addons_dir.join(SHUFFLE_MARKER))?;

    for aside in leftovers(addons_dir, name)? {
        if std::fs::symlink_metadata(addons_dir).is_err() {
            output::warning(&format!(
                "rolling back interrupted move of {}",
                addons_dir.display()
            ));
            rename(&aside, addons_dir)?;
            fs_utils::remove_file_if_exists(&addons_dir.join(SHUFFLE_MARKER))?;
        } else if addons_dir.is_dir() && !addons_dir.join(name).exists() {
            output::warning(&format!(
                "completing interrupted move of {}",
                addons_dir.display()
            ));
            let inner = addons_dir.join(name);
            rename(&aside, &inner)?;
            fs_utils::remove_file_if_exists(&inner.join(SHUFFLE_MARKER))?;
        } else {
            output::warning(&format!(
                "leftover {} from an interrupted move, left in place",
                aside.display()
            ));
        }
    }

    // Interrupted after the last rename.
    fs_utils::remove_file_if_exists(&addons_dir.join(name).join(SHUFFLE_MARKER))?;
    Ok(())
}
