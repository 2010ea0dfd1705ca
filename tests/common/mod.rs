//! Shared fixtures for the install and freeze tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use recipe_source::acquire::{Vcs, VcsOptions};
use recipe_source::install::requirements::{RequirementsInstaller, RequirementsRequest};
use recipe_source::{Buildout, Recipe, RecipeConfig, Result, SourceError};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One `get_or_update` call as seen by [`FakeVcs`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub kind: String,
    pub target: PathBuf,
    pub url: String,
    pub revision: String,
    pub offline: bool,
}

/// Version control stand-in.
///
/// Checkouts write the files registered for their URL. `heads` maps symbolic
/// revisions to the identifier reported as parent.
#[derive(Default)]
pub struct FakeVcs {
    pub files: BTreeMap<String, Vec<(&'static str, &'static str)>>,
    pub heads: BTreeMap<String, String>,
    pub dirty: BTreeSet<PathBuf>,
    pub merging: BTreeSet<PathBuf>,
    pub calls: RefCell<Vec<Checkout>>,
    checked_out: RefCell<BTreeMap<PathBuf, String>>,
}

impl FakeVcs {
    pub fn with_files(mut self, url: &str, files: &[(&'static str, &'static str)]) -> Self {
        self.files.insert(url.to_string(), files.to_vec());
        self
    }

    pub fn with_head(mut self, revision: &str, id: &str) -> Self {
        self.heads.insert(revision.to_string(), id.to_string());
        self
    }

    pub fn revisions(&self) -> Vec<(String, String)> {
        self.calls
            .borrow()
            .iter()
            .map(|c| (c.url.clone(), c.revision.clone()))
            .collect()
    }
}

impl Vcs for FakeVcs {
    fn supported_kinds(&self) -> BTreeSet<String> {
        BTreeSet::from(["git".to_string(), "hg".to_string()])
    }

    fn get_or_update(
        &self,
        kind: &str,
        target: &Path,
        url: &str,
        revision: &str,
        options: &VcsOptions,
    ) -> Result<()> {
        self.calls.borrow_mut().push(Checkout {
            kind: kind.into(),
            target: target.into(),
            url: url.into(),
            revision: revision.into(),
            offline: options.offline,
        });

        // A single addon checkout already wrapped into its container
        let wrapped = target.join(target.file_name().unwrap_or_default());
        let root = if wrapped.is_dir() { wrapped } else { target.to_path_buf() };
        std::fs::create_dir_all(&root).map_err(|source| SourceError::Io {
            path: root.clone(),
            source,
        })?;
        for (name, content) in self.files.get(url).into_iter().flatten() {
            let path = root.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, content).unwrap();
        }

        let id = self.heads.get(revision).cloned().unwrap_or_else(|| revision.to_string());
        self.checked_out.borrow_mut().insert(target.to_path_buf(), id);
        Ok(())
    }

    fn uncommitted_changes(&self, _kind: &str, target: &Path) -> Result<bool> {
        Ok(self.dirty.contains(target))
    }

    fn parents(&self, _kind: &str, target: &Path) -> Result<Vec<String>> {
        let mut parents: Vec<String> = self.checked_out.borrow().get(target).cloned().into_iter().collect();
        if self.merging.contains(target) {
            parents.push("feedface".to_string());
        }
        Ok(parents)
    }
}

/// Requirements installer keeping every request
#[derive(Default)]
pub struct RecordingInstaller {
    pub requests: RefCell<Vec<RequirementsRequest>>,
    pub fail: bool,
}

impl RequirementsInstaller for RecordingInstaller {
    fn install(&self, request: &RequirementsRequest) -> Result<()> {
        self.requests.borrow_mut().push(request.clone());
        if self.fail {
            return Err(SourceError::InstallationError("requirements failed".into()));
        }
        Ok(())
    }
}

pub const SOFTWARE_70: &[(&str, &str)] = &[
    ("PKG-INFO", "Metadata-Version: 1.1\nName: openerp\nVersion: 7.0-1\nRequires-Dist: lxml\n"),
    ("openerp/addons/base/__openerp__.py", "{'name': 'base'}"),
];

pub const SINGLE_ADDON: &[(&str, &str)] = &[
    ("__openerp__.py", "{'name': 'single'}"),
    ("models.py", ""),
];

pub const ADDON_CONTAINER: &[(&str, &str)] = &[
    ("sale_extra/__openerp__.py", "{'name': 'sale_extra'}"),
    ("stock_extra/__openerp__.py", "{'name': 'stock_extra'}"),
];

/// Write `files` under `dir`
pub fn write_tree(dir: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

/// Write a configuration file and load it with its buildout settings
pub fn load_config(dir: &Path, name: &str, content: &str, offline: bool) -> (RecipeConfig, Buildout) {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    read_config(&path, offline)
}

pub fn read_config(path: &Path, offline: bool) -> (RecipeConfig, Buildout) {
    let config = RecipeConfig::read(path).unwrap();
    let buildout = config.buildout(path, offline);
    (config, buildout)
}

pub fn recipe(config: &RecipeConfig, buildout: &Buildout, vcs: &dyn Vcs, name: &str) -> Recipe {
    Recipe::new(name, config.recipes[name].clone(), buildout, &vcs.supported_kinds()).unwrap()
}

/// Gzipped tarball with every file under `top/`
pub fn tar_gz(top: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_mode(0o755);
    dir.set_size(0);
    builder.append_data(&mut dir, format!("{top}/"), std::io::empty()).unwrap();

    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(content.len() as u64);
        builder
            .append_data(&mut header, format!("{top}/{name}"), content.as_bytes())
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// Gzipped tarball under `top/` whose large member is cut off halfway
pub fn cut_off_tar_gz(top: &str) -> Vec<u8> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    let noise: Vec<u8> = (0..200_000)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect();

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_mode(0o755);
    dir.set_size(0);
    builder.append_data(&mut dir, format!("{top}/"), std::io::empty()).unwrap();
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(noise.len() as u64);
    builder
        .append_data(&mut header, format!("{top}/big.bin"), noise.as_slice())
        .unwrap();

    let whole = builder.into_inner().unwrap().finish().unwrap();
    whole[..whole.len() / 2].to_vec()
}

/// Sorted entry names of a directory
pub fn children(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
