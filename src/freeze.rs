//! Freeze engine
//!
//! Captures the exact version or revision of every non-local source into a
//! configuration that extends the invoked one. Feeding the frozen file back
//! with `-c` reproduces the installation.
//!
//! ## Format
//!
//! ```toml
//! # Frozen by recipe-source, do not edit manually
//!
//! [buildout]
//! extends = "buildout.toml"
//!
//! [recipes.openerp]
//! freeze-to = ""
//! revisions = """
//! 0123abcd
//! addons-extra 89ab4567
//! """
//! version = "trunk nightly 2013-01-01"
//! ```
//!
//! The main checkout's revision comes first, unlabeled. The empty
//! `freeze-to` keeps a replay from freezing again into the file it reads.

use crate::acquire::vcs::Vcs;
use crate::core::config::Buildout;
use crate::core::error::{IoContext, Result, SourceError};
use crate::core::output;
use crate::install::{Recipe, ResolvedInstallation};
use crate::internal::fs_utils;
use crate::spec::SourceDescriptor;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const HEADER: &str = "# Frozen by recipe-source, do not edit manually\n\n";

/// Output files already initialized during this run.
///
/// The first recipe instance freezing into a file starts it afresh; the
/// following ones add their section to it.
#[derive(Debug, Default)]
pub struct FreezeSession {
    initialized: HashSet<PathBuf>,
}

impl FreezeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self, out: &Path) -> bool {
        self.initialized.contains(out)
    }
}

/// Pinned revision of one checkout; `path` is `None` for the main software
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenRevision {
    pub path: Option<PathBuf>,
    pub revision: String,
}

/// Frozen state of one recipe instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezeRecord {
    pub name: String,
    pub version: Option<String>,
    pub revisions: Vec<FrozenRevision>,
}

impl FreezeRecord {
    /// The `revisions` option, main checkout first
    pub fn revisions_block(&self) -> Option<String> {
        if self.revisions.is_empty() {
            return None;
        }
        let mut lines: Vec<&FrozenRevision> = self.revisions.iter().collect();
        lines.sort_by_key(|r| r.path.is_some());
        let block: String = lines
            .iter()
            .map(|r| match &r.path {
                Some(path) => format!("{} {}\n", path.display(), r.revision),
                None => format!("{}\n", r.revision),
            })
            .collect();
        Some(block)
    }

    fn to_table(&self) -> toml::Table {
        let mut section = toml::Table::new();
        section.insert("freeze-to".into(), toml::Value::String(String::new()));
        if let Some(version) = &self.version {
            section.insert("version".into(), toml::Value::String(version.clone()));
        }
        if let Some(revisions) = self.revisions_block() {
            section.insert("revisions".into(), toml::Value::String(revisions));
        }
        section
    }
}

/// Captures and writes freeze records
pub struct FreezeEngine<'a> {
    vcs: &'a dyn Vcs,
    buildout: &'a Buildout,
}

impl<'a> FreezeEngine<'a> {
    pub fn new(vcs: &'a dyn Vcs, buildout: &'a Buildout) -> Self {
        Self { vcs, buildout }
    }

    /// Capture the frozen state of an installed recipe.
    ///
    /// Fails with `UnsafeFreeze` if any checkout has local changes or is in
    /// the middle of a merge.
    pub fn capture(&self, recipe: &Recipe, installation: &ResolvedInstallation) -> Result<FreezeRecord> {
        let mut record = FreezeRecord {
            name: recipe.name.clone(),
            version: None,
            revisions: Vec::new(),
        };

        match recipe.sources.main() {
            SourceDescriptor::Local => {}
            SourceDescriptor::Downloadable { .. } => {
                record.version = Some(
                    installation
                        .dump_nightly_latest_version()
                        .unwrap_or_else(|| recipe.version.wanted.clone()),
                );
            }
            SourceDescriptor::Vcs { kind, .. } => {
                let revision = self.single_revision(kind, &installation.software_dir)?;
                record.revisions.push(FrozenRevision {
                    path: None,
                    revision,
                });
            }
        }

        for (dir, entry) in recipe.sources.addons() {
            if let SourceDescriptor::Vcs { kind, .. } = &entry.descriptor {
                let target = self.buildout.make_absolute(dir);
                let revision = self.single_revision(kind, &target)?;
                record.revisions.push(FrozenRevision {
                    path: Some(dir.to_path_buf()),
                    revision,
                });
            }
        }

        Ok(record)
    }

    fn single_revision(&self, kind: &str, target: &Path) -> Result<String> {
        if self.vcs.uncommitted_changes(kind, target)? {
            return Err(SourceError::UnsafeFreeze {
                path: target.to_path_buf(),
                reason: "uncommitted changes".into(),
            });
        }
        let parents = self.vcs.parents(kind, target)?;
        match parents.as_slice() {
            [single] => Ok(single.clone()),
            [] => Err(SourceError::UnsafeFreeze {
                path: target.to_path_buf(),
                reason: "no parent revision".into(),
            }),
            several => Err(SourceError::UnsafeFreeze {
                path: target.to_path_buf(),
                reason: format!("{} parent revisions, uncommitted merge?", several.len()),
            }),
        }
    }

    /// Capture `recipe` and write it to `out`. Nothing is written unless the
    /// whole capture succeeds.
    pub fn freeze(
        &self,
        session: &mut FreezeSession,
        recipe: &Recipe,
        installation: &ResolvedInstallation,
        out: &Path,
    ) -> Result<FreezeRecord> {
        let record = self.capture(recipe, installation)?;
        write_record(session, out, &self.buildout.config_name, &record)?;
        output::info(&format!("froze {} to {}", recipe.name, out.display()));
        Ok(record)
    }
}

/// Write `record` into the frozen configuration at `out`.
///
/// The first write of a session starts the file with an `extends` pointer to
/// `extends`; a section written earlier under the same name is replaced.
pub fn write_record(
    session: &mut FreezeSession,
    out: &Path,
    extends: &str,
    record: &FreezeRecord,
) -> Result<()> {
    let mut table = if session.is_initialized(out) {
        let content = std::fs::read_to_string(out).at(out)?;
        toml::from_str::<toml::Table>(&content).map_err(|e| {
            SourceError::Config(format!("{}: {}", out.display(), e))
        })?
    } else {
        let mut buildout = toml::Table::new();
        buildout.insert("extends".into(), toml::Value::String(extends.to_string()));
        let mut table = toml::Table::new();
        table.insert("buildout".into(), toml::Value::Table(buildout));
        table
    };

    let recipes = table
        .entry("recipes")
        .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    if !recipes.is_table() {
        *recipes = toml::Value::Table(toml::Table::new());
    }
    if let toml::Value::Table(recipes) = recipes {
        recipes.insert(record.name.clone(), toml::Value::Table(record.to_table()));
    }

    let content = toml::to_string_pretty(&table)
        .map_err(|e| SourceError::Config(format!("cannot serialize {}: {}", out.display(), e)))?;
    fs_utils::ensure_parent_dir(out)?;
    std::fs::write(out, format!("{}{}", HEADER, content)).at(out)?;

    session.initialized.insert(out.to_path_buf());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str, version: Option<&str>, revisions: &[(Option<&str>, &str)]) -> FreezeRecord {
        FreezeRecord {
            name: name.into(),
            version: version.map(str::to_string),
            revisions: revisions
                .iter()
                .map(|(path, rev)| FrozenRevision {
                    path: path.map(PathBuf::from),
                    revision: rev.to_string(),
                })
                .collect(),
        }
    }

    fn read(out: &Path) -> toml::Table {
        toml::from_str(&std::fs::read_to_string(out).unwrap()).unwrap()
    }

    #[test]
    fn test_revisions_block_main_first() {
        let r = record("x", None, &[(Some("addons-a"), "aaa"), (None, "main1")]);
        assert_eq!(r.revisions_block().unwrap(), "main1\naddons-a aaa\n");
        assert_eq!(record("x", Some("7.0-1"), &[]).revisions_block(), None);
    }

    #[test]
    fn test_first_write_initializes_extends() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("frozen.toml");
        std::fs::write(&out, "stale content from another run").unwrap();
        let mut session = FreezeSession::new();

        write_record(&mut session, &out, "dev.toml", &record("openerp", Some("7.0-1"), &[])).unwrap();

        let content = std::fs::read_to_string(&out).unwrap();
        assert!(content.starts_with(HEADER));
        let table = read(&out);
        assert_eq!(table["buildout"]["extends"].as_str(), Some("dev.toml"));
        assert_eq!(table["recipes"]["openerp"]["version"].as_str(), Some("7.0-1"));
        assert_eq!(table["recipes"]["openerp"]["freeze-to"].as_str(), Some(""));
        assert!(session.is_initialized(&out));
    }

    #[test]
    fn test_later_writes_accumulate_and_replace() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("frozen.toml");
        let mut session = FreezeSession::new();

        write_record(&mut session, &out, "buildout.toml", &record("one", Some("6.1-1"), &[])).unwrap();
        write_record(&mut session, &out, "ignored.toml", &record("two", None, &[(None, "abc")])).unwrap();
        write_record(&mut session, &out, "ignored.toml", &record("one", Some("7.0-1"), &[])).unwrap();

        let table = read(&out);
        assert_eq!(table["buildout"]["extends"].as_str(), Some("buildout.toml"));
        assert_eq!(table["recipes"]["one"]["version"].as_str(), Some("7.0-1"));
        assert_eq!(table["recipes"]["two"]["revisions"].as_str(), Some("abc\n"));
        assert!(table["recipes"]["two"].get("version").is_none());
    }
}
