//! Source descriptors and the source table
//!
//! A recipe instance knows where its main software and each of its addon
//! directories come from. That knowledge is parsed once, from the `version`
//! and `addons` options, into a [`SourceTable`] that stays read-only for the
//! rest of the run.

pub mod addons;
pub mod version;

use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub use addons::parse_addons;
pub use version::{Nightly, VersionContext, VersionSpec, parse_version};

/// Where one logical source comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// An existing directory, nothing to fetch
    Local,
    /// An archive retrieved over HTTP(S)
    Downloadable { url: String },
    /// A version control checkout; `url` and `revision` are never empty
    Vcs {
        kind: String,
        url: String,
        revision: String,
    },
}

impl SourceDescriptor {
    /// `local`, `downloadable`, or the VCS kind
    pub fn kind(&self) -> &str {
        match self {
            SourceDescriptor::Local => "local",
            SourceDescriptor::Downloadable { .. } => "downloadable",
            SourceDescriptor::Vcs { kind, .. } => kind,
        }
    }

    /// `(url, revision)` for fetchable sources
    pub fn location(&self) -> Option<(&str, Option<&str>)> {
        match self {
            SourceDescriptor::Local => None,
            SourceDescriptor::Downloadable { url } => Some((url, None)),
            SourceDescriptor::Vcs { url, revision, .. } => Some((url, Some(revision))),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, SourceDescriptor::Local)
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Local => write!(f, "local"),
            SourceDescriptor::Downloadable { url } => write!(f, "downloadable {url}"),
            SourceDescriptor::Vcs {
                kind,
                url,
                revision,
            } => write!(f, "{kind} {url} @ {revision}"),
        }
    }
}

/// Key of the source table: the main software, or an addon directory
/// (as written in the configuration, relative to the buildout directory).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalKey {
    Main,
    Addon(PathBuf),
}

/// `key=value` options trailing an addon line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddonOptions(BTreeMap<String, String>);

impl AddonOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The addons live in this sub-directory of the checkout
    pub fn subdir(&self) -> Option<&str> {
        self.get("subdir").filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A descriptor together with its addon options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub descriptor: SourceDescriptor,
    pub options: AddonOptions,
}

impl SourceEntry {
    pub fn new(descriptor: SourceDescriptor) -> Self {
        Self {
            descriptor,
            options: AddonOptions::new(),
        }
    }
}

/// All sources of one recipe instance.
///
/// The main software entry is present exactly once; addon entries keep the
/// order in which they were declared.
#[derive(Debug, Clone)]
pub struct SourceTable {
    entries: IndexMap<LocalKey, SourceEntry>,
}

impl SourceTable {
    pub fn new(main: SourceDescriptor) -> Self {
        let mut entries = IndexMap::new();
        entries.insert(LocalKey::Main, SourceEntry::new(main));
        Self { entries }
    }

    /// Insert an addon, returning the entry it replaced (if any).
    pub fn insert_addon(&mut self, dir: impl Into<PathBuf>, entry: SourceEntry) -> Option<SourceEntry> {
        self.entries.insert(LocalKey::Addon(dir.into()), entry)
    }

    pub fn extend_addons(&mut self, addons: impl IntoIterator<Item = (PathBuf, SourceEntry)>) {
        for (dir, entry) in addons {
            self.insert_addon(dir, entry);
        }
    }

    pub fn main(&self) -> &SourceDescriptor {
        // The constructor guarantees the main entry.
        &self.entries[&LocalKey::Main].descriptor
    }

    /// Addon entries in declaration order
    pub fn addons(&self) -> impl Iterator<Item = (&Path, &SourceEntry)> {
        self.entries.iter().filter_map(|(key, entry)| match key {
            LocalKey::Addon(dir) => Some((dir.as_path(), entry)),
            LocalKey::Main => None,
        })
    }

    pub fn get(&self, key: &LocalKey) -> Option<&SourceEntry> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LocalKey, &SourceEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A downloaded archive and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHandle {
    pub path: PathBuf,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git(url: &str, rev: &str) -> SourceDescriptor {
        SourceDescriptor::Vcs {
            kind: "git".into(),
            url: url.into(),
            revision: rev.into(),
        }
    }

    #[test]
    fn test_table_has_exactly_one_main() {
        let mut table = SourceTable::new(SourceDescriptor::Local);
        table.insert_addon("a", SourceEntry::new(git("u", "r")));
        assert_eq!(table.len(), 2);
        assert_eq!(table.main(), &SourceDescriptor::Local);
        assert_eq!(table.addons().count(), 1);
    }

    #[test]
    fn test_addon_overwrite_keeps_position() {
        let mut table = SourceTable::new(SourceDescriptor::Local);
        table.insert_addon("a", SourceEntry::new(git("u1", "r1")));
        table.insert_addon("b", SourceEntry::new(SourceDescriptor::Local));
        let previous = table.insert_addon("a", SourceEntry::new(git("u2", "r2")));

        assert_eq!(previous.unwrap().descriptor, git("u1", "r1"));
        let dirs: Vec<_> = table.addons().map(|(d, _)| d.to_path_buf()).collect();
        assert_eq!(dirs, [PathBuf::from("a"), PathBuf::from("b")]);
        let a = table.get(&LocalKey::Addon("a".into())).unwrap();
        assert_eq!(a.descriptor, git("u2", "r2"));
    }

    #[test]
    fn test_main_key_orders_first() {
        assert!(LocalKey::Main < LocalKey::Addon(PathBuf::from("")));
    }

    #[test]
    fn test_descriptor_location() {
        assert_eq!(SourceDescriptor::Local.location(), None);
        assert_eq!(git("u", "r").location(), Some(("u", Some("r"))));
        assert_eq!(git("u", "r").kind(), "git");
        assert_eq!(git("u", "r").to_string(), "git u @ r");
    }

    #[test]
    fn test_addon_options_subdir() {
        let mut options = AddonOptions::new();
        assert_eq!(options.subdir(), None);
        options.insert("subdir", "addons");
        assert_eq!(options.subdir(), Some("addons"));
    }
}
