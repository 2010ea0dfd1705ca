//! Recipe configuration file
//!
//! ## Format
//!
//! ```toml
//! [buildout]
//! directory = "."
//! offline = false
//! downloads-directory = "downloads"
//! parts-directory = "parts"
//!
//! [recipes.openerp]
//! version = "7.0-1"
//! addons = """
//! git https://example.com/addons.git addons-extra main subdir=addons
//! local custom-addons
//! """
//! freeze-to = "frozen.cfg"
//! git-depth = "1"
//! ```
//!
//! Options named `<vcs>-<option>` are passed through to the backend of that
//! version control system.
//!
//! A file may start from another one with `[buildout] extends = "base.toml"`;
//! tables are merged key by key and the extending file wins. Frozen
//! configurations use this to pin `version` and `revisions` on top of the
//! configuration they were produced from. An empty `freeze-to = ""` turns
//! off an inherited `freeze-to`.

use crate::core::error::{Result, SourceError};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default name of the top-level configuration file.
pub const DEFAULT_CONFIG_NAME: &str = "buildout.toml";

/// Longest chain of `extends` pointers followed
const MAX_EXTENDS_DEPTH: usize = 8;

/// Whole configuration file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RecipeConfig {
    #[serde(default)]
    pub buildout: BuildoutSection,
    /// Recipe instances, in declaration order
    #[serde(default)]
    pub recipes: IndexMap<String, RecipeOptions>,
    /// Files read to build this configuration, the invoked one first
    #[serde(skip)]
    pub files: Vec<PathBuf>,
}

/// The `[buildout]` section
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct BuildoutSection {
    /// Configuration this one is layered on, relative to this file
    pub extends: Option<PathBuf>,
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub offline: bool,
    pub downloads_directory: Option<PathBuf>,
    pub parts_directory: Option<PathBuf>,
}

/// Options of one recipe instance
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct RecipeOptions {
    pub version: Option<String>,
    #[serde(default)]
    pub addons: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub vcs_clear_locks: bool,
    #[serde(default)]
    pub vcs_clear_retry: bool,
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub freeze_to: Option<PathBuf>,
    /// Pinned revisions: `<revision>` for the main checkout, `<path> <revision>`
    /// for addons
    pub revisions: Option<String>,
    /// Extra requirements for the requirements installer
    #[serde(default)]
    pub eggs: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

fn empty_path_as_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<PathBuf>, D::Error> {
    let path = Option::<PathBuf>::deserialize(deserializer)?;
    Ok(path.filter(|p| !p.as_os_str().is_empty()))
}

impl RecipeOptions {
    /// The wanted version spec; a recipe without one cannot be installed.
    pub fn version(&self) -> Result<&str> {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SourceError::Config("You must specify the version".to_string()))
    }

    /// Options destined to the `kind` backend (`git-depth` for git, ...).
    pub fn vcs_options(&self, kind: &str) -> BTreeMap<String, String> {
        let prefix = format!("{kind}-");
        self.extra
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| {
                let value = match v {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

impl RecipeConfig {
    /// Read a configuration file from path, following `extends`
    pub fn read(path: &Path) -> Result<Self> {
        let mut files = Vec::new();
        let table = load_table(path, 0, &mut files)?;
        let mut config: Self = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| SourceError::Config(format!("{}: {}", path.display(), e)))?;
        config.files = files;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve the `[buildout]` section into absolute directories.
    ///
    /// `config_path` is the invoked top-level file; its directory is the
    /// default buildout directory and its file name becomes the `extends`
    /// pointer of frozen configurations.
    pub fn buildout(&self, config_path: &Path, offline: bool) -> Buildout {
        let config_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let directory = match &self.buildout.directory {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => config_dir.join(dir),
            None => config_dir,
        };
        let config_name = config_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_CONFIG_NAME.to_string());

        let mut buildout = Buildout {
            downloads_dir: PathBuf::new(),
            parts_dir: PathBuf::new(),
            directory,
            offline: offline || self.buildout.offline,
            config_name,
            config_files: self.files.clone(),
        };
        buildout.downloads_dir = buildout.make_absolute(
            self.buildout
                .downloads_directory
                .as_deref()
                .unwrap_or(Path::new("downloads")),
        );
        buildout.parts_dir = buildout.make_absolute(
            self.buildout
                .parts_directory
                .as_deref()
                .unwrap_or(Path::new("parts")),
        );
        buildout
    }
}

fn load_table(path: &Path, depth: usize, files: &mut Vec<PathBuf>) -> Result<toml::Table> {
    if depth > MAX_EXTENDS_DEPTH {
        return Err(SourceError::Config(format!(
            "{}: extends chain longer than {} files",
            path.display(),
            MAX_EXTENDS_DEPTH
        )));
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        SourceError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;
    let table: toml::Table = toml::from_str(&content)
        .map_err(|e| SourceError::Config(format!("{}: {}", path.display(), e)))?;
    files.push(path.to_path_buf());

    let extends = table
        .get("buildout")
        .and_then(|b| b.get("extends"))
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(base) = extends else {
        return Ok(table);
    };

    let base_path = path.parent().unwrap_or(Path::new("")).join(base);
    tracing::debug!("{} extends {}", path.display(), base_path.display());
    let mut merged = load_table(&base_path, depth + 1, files)?;
    merge_tables(&mut merged, table);
    Ok(merged)
}

/// Overlay `overlay` onto `base`, recursing into tables present in both.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(overlay_table) = value {
            if let Some(toml::Value::Table(base_table)) = base.get_mut(&key) {
                merge_tables(base_table, overlay_table);
                continue;
            }
            base.insert(key, toml::Value::Table(overlay_table));
        } else {
            base.insert(key, value);
        }
    }
}

/// Resolved buildout-wide settings shared by every recipe instance
#[derive(Debug, Clone)]
pub struct Buildout {
    pub directory: PathBuf,
    pub offline: bool,
    pub downloads_dir: PathBuf,
    pub parts_dir: PathBuf,
    /// File name of the invoked top-level configuration
    pub config_name: String,
    /// Every configuration file read, following `extends`
    pub config_files: Vec<PathBuf>,
}

impl Buildout {
    /// Settings rooted at `directory` with default sub-directories.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        Self {
            downloads_dir: directory.join("downloads"),
            parts_dir: directory.join("parts"),
            directory,
            offline: false,
            config_name: DEFAULT_CONFIG_NAME.to_string(),
            config_files: Vec::new(),
        }
    }

    /// True if `path` is one of the configuration files this run reads.
    pub fn reads_config(&self, path: &Path) -> bool {
        let Ok(target) = std::fs::canonicalize(path) else {
            return false;
        };
        self.config_files
            .iter()
            .any(|file| std::fs::canonicalize(file).is_ok_and(|f| f == target))
    }

    /// Make a path absolute if needed, relative to the buildout directory.
    pub fn make_absolute(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.directory.join(path)
        }
    }

    /// Create the downloads and parts directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.downloads_dir, &self.parts_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|source| SourceError::Io {
                    path: dir.clone(),
                    source,
                })?;
                tracing::info!("created {}", dir.display());
            }
        }
        Ok(())
    }
}
