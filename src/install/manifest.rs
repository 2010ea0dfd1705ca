//! Static reader of the main software's declared metadata
//!
//! Nothing from the software directory is executed. Metadata comes from, in
//! order:
//! 1. `PKG-INFO` at the root, then `*.egg-info/PKG-INFO`
//! 2. literal `version=` / `install_requires=[...]` in `setup.py`
//! 3. a literal `version = '...'` in `openerp/release.py` or `bin/release.py`

use crate::core::error::{IoContext, Result, SourceError};
use std::path::{Path, PathBuf};

/// What the main software declares about itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub version: String,
    pub requirements: Vec<String>,
    /// File the version was read from
    pub source: PathBuf,
}

/// Read the manifest of the software at `software_dir`.
pub fn read_manifest(software_dir: &Path) -> Result<Manifest> {
    for pkg_info in pkg_info_candidates(software_dir)? {
        if let Some(manifest) = from_pkg_info(&pkg_info)? {
            return Ok(manifest);
        }
    }

    let setup_py = software_dir.join("setup.py");
    if setup_py.is_file() {
        let content = std::fs::read_to_string(&setup_py).at(&setup_py)?;
        if let Some(version) = literal_after(&content, "version") {
            return Ok(Manifest {
                version,
                requirements: literal_list_after(&content, "install_requires"),
                source: setup_py,
            });
        }
    }

    for release in ["openerp/release.py", "bin/release.py"] {
        let path = software_dir.join(release);
        if path.is_file() {
            let content = std::fs::read_to_string(&path).at(&path)?;
            if let Some(version) = literal_after(&content, "version") {
                return Ok(Manifest {
                    version,
                    requirements: Vec::new(),
                    source: path,
                });
            }
        }
    }

    Err(SourceError::InstallationError(format!(
        "could not detect the version of {}",
        software_dir.display()
    )))
}

fn pkg_info_candidates(software_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut candidates = vec![software_dir.join("PKG-INFO")];
    if let Ok(entries) = std::fs::read_dir(software_dir) {
        let mut egg_infos: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "egg-info") && p.is_dir())
            .map(|p| p.join("PKG-INFO"))
            .collect();
        egg_infos.sort();
        candidates.extend(egg_infos);
    }
    Ok(candidates.into_iter().filter(|p| p.is_file()).collect())
}

fn from_pkg_info(path: &Path) -> Result<Option<Manifest>> {
    let content = std::fs::read_to_string(path).at(path)?;
    let mut version = None;
    let mut requirements = Vec::new();

    for line in content.lines() {
        // The description body follows the first blank line.
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Version" if !value.is_empty() => version = Some(value.to_string()),
            "Requires-Dist" | "Requires" if !value.is_empty() => {
                requirements.push(value.to_string())
            }
            _ => {}
        }
    }

    Ok(version.map(|version| Manifest {
        version,
        requirements,
        source: path.to_path_buf(),
    }))
}

/// The quoted string literal assigned to `key` (`key='x'`, `key = "x"`)
fn literal_after(content: &str, key: &str) -> Option<String> {
    let mut rest = content;
    while let Some(pos) = rest.find(key) {
        let preceded_by_ident = rest[..pos]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let after = &rest[pos + key.len()..];
        rest = after;
        if preceded_by_ident {
            continue;
        }

        let Some(after_eq) = after.trim_start().strip_prefix('=') else {
            continue;
        };
        if after_eq.starts_with('=') {
            continue;
        }
        if let Some((literal, _)) = quoted(after_eq.trim_start()) {
            return Some(literal.to_string());
        }
    }
    None
}

/// Quoted literals of the list assigned to `key`
fn literal_list_after(content: &str, key: &str) -> Vec<String> {
    let Some(pos) = content.find(key) else {
        return Vec::new();
    };
    let after = content[pos + key.len()..].trim_start();
    let Some(list) = after
        .strip_prefix('=')
        .map(str::trim_start)
        .and_then(|s| s.strip_prefix('['))
    else {
        return Vec::new();
    };

    let mut items = Vec::new();
    let mut rest = list.trim_start();
    while let Some((literal, tail)) = quoted(rest) {
        items.push(literal.to_string());
        rest = tail.trim_start().trim_start_matches(',').trim_start();
    }
    items
}

/// Split a leading `'...'` or `"..."` literal off `s`
fn quoted(s: &str) -> Option<(&str, &str)> {
    let quote = s.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let body = &s[1..];
    let end = body.find(quote)?;
    Some((&body[..end], &body[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pkg_info() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join("PKG-INFO"),
            "Metadata-Version: 1.1\nName: openerp\nVersion: 7.0-20130101\nRequires-Dist: lxml\nRequires-Dist: psycopg2 (>=2.2)\n\nVersion: not-this-one\n",
        )
        .unwrap();

        let manifest = read_manifest(temp.path()).unwrap();
        assert_eq!(manifest.version, "7.0-20130101");
        assert_eq!(manifest.requirements, ["lxml", "psycopg2 (>=2.2)"]);
        assert_eq!(manifest.source, temp.path().join("PKG-INFO"));
    }

    #[test]
    fn test_egg_info_pkg_info() {
        let temp = tempdir().unwrap();
        let egg_info = temp.path().join("openerp.egg-info");
        std::fs::create_dir_all(&egg_info).unwrap();
        std::fs::write(egg_info.join("PKG-INFO"), "Name: openerp\nVersion: 6.1-1\n").unwrap();

        assert_eq!(read_manifest(temp.path()).unwrap().version, "6.1-1");
    }

    #[test]
    fn test_setup_py_literals() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join("setup.py"),
            r#"
from setuptools import setup
pkg_version = 'wrong'
setup(
    name='openerp',
    version = "trunk-2013-01-01",
    install_requires=[
        'babel',
        "docutils >= 0.5",
    ],
)
"#,
        )
        .unwrap();

        let manifest = read_manifest(temp.path()).unwrap();
        assert_eq!(manifest.version, "trunk-2013-01-01");
        assert_eq!(manifest.requirements, ["babel", "docutils >= 0.5"]);
    }

    #[test]
    fn test_release_py_fallback() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("setup.py"), "setup(version=version)\n").unwrap();
        std::fs::create_dir_all(temp.path().join("openerp")).unwrap();
        std::fs::write(
            temp.path().join("openerp/release.py"),
            "version_info = (7, 0)\nversion = '7.0'\n",
        )
        .unwrap();

        let manifest = read_manifest(temp.path()).unwrap();
        assert_eq!(manifest.version, "7.0");
        assert!(manifest.requirements.is_empty());
    }

    #[test]
    fn test_no_metadata_is_installation_error() {
        let temp = tempdir().unwrap();
        assert!(matches!(
            read_manifest(temp.path()).unwrap_err(),
            SourceError::InstallationError(_)
        ));
    }

    #[test]
    fn test_literal_after_skips_comparisons_and_longer_names() {
        assert_eq!(literal_after("if version == 'x': pass\nversion='y'", "version"), Some("y".into()));
        assert_eq!(literal_after("my_version='a'", "version"), None);
    }
}
