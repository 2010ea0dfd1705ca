//! Version control collaborators
//!
//! The fetcher and the freeze engine talk to version control through the
//! [`Vcs`] trait. [`VcsRegistry`] implements it by dispatching on the kind
//! (`git`, `hg`, ...) to one [`VcsBackend`] per system; tests substitute
//! their own implementation.

pub mod git;
pub mod hg;

use crate::core::error::{Result, SourceError};
use crate::core::output;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Per-call options of a checkout
#[derive(Debug, Clone, Default)]
pub struct VcsOptions {
    /// No network access; an existing checkout is used as is
    pub offline: bool,
    /// Remove stale lock files before operating
    pub clear_locks: bool,
    /// On update failure, delete the checkout and clone again once
    pub clear_retry: bool,
    /// `<kind>-<option>` settings from the recipe, keys included
    pub extra: BTreeMap<String, String>,
}

/// Everything the engine needs from version control.
pub trait Vcs {
    /// Kinds accepted in version and addons specs
    fn supported_kinds(&self) -> BTreeSet<String>;

    /// Make `target` a checkout of `url` at `revision`, creating it on first
    /// use. Offline, an existing checkout must already hold the revision.
    fn get_or_update(
        &self,
        kind: &str,
        target: &Path,
        url: &str,
        revision: &str,
        options: &VcsOptions,
    ) -> Result<()>;

    /// Whether the working copy differs from its recorded revision
    fn uncommitted_changes(&self, kind: &str, target: &Path) -> Result<bool>;

    /// Revision identifiers of the working copy's parents (two during a merge)
    fn parents(&self, kind: &str, target: &Path) -> Result<Vec<String>>;

    /// Where the checkout for `target` actually lives.
    ///
    /// Differs from `target` once a single addon checkout has been moved
    /// into a container directory of the same name.
    fn checkout_dir(&self, _kind: &str, target: &Path) -> PathBuf {
        target.to_path_buf()
    }
}

/// One version control system
pub trait VcsBackend {
    /// Kind as written in specs
    fn kind(&self) -> &'static str;

    /// Metadata directory marking a checkout root (`.git`, `.hg`)
    fn metadata_dir(&self) -> &'static str;

    /// Lock files, relative to the checkout root
    fn lock_files(&self) -> &'static [&'static str];

    fn get_or_update(&self, target: &Path, url: &str, revision: &str, options: &VcsOptions) -> Result<()>;

    fn uncommitted_changes(&self, target: &Path) -> Result<bool>;

    fn parents(&self, target: &Path) -> Result<Vec<String>>;
}

/// Dispatches [`Vcs`] calls to registered backends by kind
#[derive(Default)]
pub struct VcsRegistry {
    backends: BTreeMap<String, Box<dyn VcsBackend>>,
}

impl VcsRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the git and Mercurial command line backends
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(git::Git));
        registry.register(Box::new(hg::Mercurial));
        registry
    }

    pub fn register(&mut self, backend: Box<dyn VcsBackend>) {
        self.backends.insert(backend.kind().to_string(), backend);
    }

    fn backend(&self, kind: &str) -> Result<&dyn VcsBackend> {
        self.backends
            .get(kind)
            .map(|b| b.as_ref())
            .ok_or_else(|| SourceError::UnsupportedVcs(kind.to_string()))
    }
}

impl Vcs for VcsRegistry {
    fn supported_kinds(&self) -> BTreeSet<String> {
        self.backends.keys().cloned().collect()
    }

    fn get_or_update(
        &self,
        kind: &str,
        target: &Path,
        url: &str,
        revision: &str,
        options: &VcsOptions,
    ) -> Result<()> {
        let backend = self.backend(kind)?;
        let target = fix_target(target, backend.metadata_dir());
        if options.clear_locks {
            clear_locks(&target, backend.lock_files())?;
        }
        backend.get_or_update(&target, url, revision, options)
    }

    fn uncommitted_changes(&self, kind: &str, target: &Path) -> Result<bool> {
        let backend = self.backend(kind)?;
        backend.uncommitted_changes(&fix_target(target, backend.metadata_dir()))
    }

    fn parents(&self, kind: &str, target: &Path) -> Result<Vec<String>> {
        let backend = self.backend(kind)?;
        backend.parents(&fix_target(target, backend.metadata_dir()))
    }

    fn checkout_dir(&self, kind: &str, target: &Path) -> PathBuf {
        match self.backend(kind) {
            Ok(backend) => fix_target(target, backend.metadata_dir()),
            Err(_) => target.to_path_buf(),
        }
    }
}

/// Follow a checkout that was moved into a container directory.
///
/// A single addon checked out at `dir` ends up at `dir/<name of dir>` once
/// wrapped. Later updates must happen there.
pub fn fix_target(target: &Path, metadata_dir: &str) -> PathBuf {
    if target.join(metadata_dir).exists() {
        return target.to_path_buf();
    }
    if let Some(name) = target.file_name() {
        let inner = target.join(name);
        if inner.join(metadata_dir).exists() {
            tracing::debug!("checkout {} moved to {}", target.display(), inner.display());
            return inner;
        }
    }
    target.to_path_buf()
}

/// Remove the given lock files below `target`.
pub fn clear_locks(target: &Path, lock_files: &[&str]) -> Result<()> {
    for lock in lock_files {
        let path = target.join(lock);
        if path.exists() {
            output::warning(&format!("removing lock file {}", path.display()));
            crate::internal::fs_utils::remove_file_if_exists(&path)?;
        }
    }
    Ok(())
}

/// Run a version control command, returning its standard output.
///
/// Failures carry the command's stderr.
pub(crate) fn run(kind: &str, target: &Path, cmd: &mut Command) -> Result<String> {
    tracing::debug!("{:?}", cmd);
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| SourceError::vcs(kind, target, format!("failed to run {}: {}", kind, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::vcs(kind, target, stderr.trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Non-negative integer option such as `git-depth`
pub(crate) fn integer_option(
    kind: &str,
    options: &VcsOptions,
    name: &str,
    max: u64,
) -> Result<Option<u64>> {
    let key = format!("{kind}-{name}");
    let Some(raw) = options.extra.get(&key) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n >= 1 && n <= max => Ok(Some(n)),
        _ => Err(SourceError::Config(format!(
            "{key} must be between 1 and {max}, got {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fix_target_plain_checkout() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("addons-x");
        std::fs::create_dir_all(target.join(".git")).unwrap();
        assert_eq!(fix_target(&target, ".git"), target);
    }

    #[test]
    fn test_fix_target_moved_checkout() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("addons-x");
        std::fs::create_dir_all(target.join("addons-x/.hg")).unwrap();
        assert_eq!(fix_target(&target, ".hg"), target.join("addons-x"));
        assert_eq!(fix_target(&target, ".git"), target);
    }

    #[test]
    fn test_fix_target_missing() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("nothing-yet");
        assert_eq!(fix_target(&target, ".git"), target);
    }

    #[test]
    fn test_clear_locks() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join(".hg/store")).unwrap();
        std::fs::write(temp.path().join(".hg/wlock"), "").unwrap();
        std::fs::write(temp.path().join(".hg/store/lock"), "").unwrap();

        clear_locks(temp.path(), hg::Mercurial.lock_files()).unwrap();
        assert!(!temp.path().join(".hg/wlock").exists());
        assert!(!temp.path().join(".hg/store/lock").exists());
        assert!(temp.path().join(".hg/store").is_dir());
    }

    #[test]
    fn test_registry_rejects_unknown_kind() {
        let registry = VcsRegistry::with_defaults();
        assert_eq!(
            registry.supported_kinds().into_iter().collect::<Vec<_>>(),
            ["git", "hg"]
        );
        let err = registry
            .get_or_update("svn", Path::new("/x"), "u", "r", &VcsOptions::default())
            .unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedVcs(k) if k == "svn"));
        assert!(registry.parents("bzr", Path::new("/x")).is_err());
    }

    #[test]
    fn test_integer_option() {
        let mut options = VcsOptions::default();
        assert_eq!(integer_option("git", &options, "depth", 10).unwrap(), None);

        options.extra.insert("git-depth".into(), "3".into());
        assert_eq!(integer_option("git", &options, "depth", 10).unwrap(), Some(3));

        for bad in ["0", "11", "-1", "deep"] {
            options.extra.insert("git-depth".into(), bad.into());
            assert!(integer_option("git", &options, "depth", 10).is_err());
        }
    }
}
