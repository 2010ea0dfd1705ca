//! Source fetcher
//!
//! Brings one source to local disk according to its descriptor. Local
//! sources are left alone, downloadable archives go through the cache
//! policy, and VCS checkouts are delegated to the [`Vcs`] collaborator.

use crate::acquire::cache::CachePolicy;
use crate::acquire::download;
use crate::acquire::vcs::{Vcs, VcsOptions};
use crate::build;
use crate::core::error::{Result, SourceError};
use crate::core::output;
use crate::internal::fs_utils;
use crate::spec::SourceDescriptor;
use std::path::{Path, PathBuf};

/// Per-source fetch settings
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    /// Freshness policy of a downloaded archive
    pub caching: CachePolicy,
    /// The version the user asked for, for error messages
    pub version: String,
    /// Settings handed to version control; `offline` is taken from the fetcher
    pub vcs: VcsOptions,
}

/// Fetches sources, honoring offline mode
pub struct Fetcher<'a> {
    vcs: &'a dyn Vcs,
    offline: bool,
}

impl<'a> Fetcher<'a> {
    pub fn new(vcs: &'a dyn Vcs, offline: bool) -> Self {
        Self { vcs, offline }
    }

    /// Fetch `descriptor` into `local_dir`.
    ///
    /// For a downloadable source `local_dir` is the archive path. Returns
    /// where the source actually is: the archive, or the checkout directory
    /// once a moved checkout is followed.
    pub fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        local_dir: &Path,
        request: &FetchRequest,
    ) -> Result<PathBuf> {
        match descriptor {
            SourceDescriptor::Local => Ok(local_dir.to_path_buf()),
            SourceDescriptor::Downloadable { url } => {
                self.fetch_archive(url, local_dir, request)?;
                Ok(local_dir.to_path_buf())
            }
            SourceDescriptor::Vcs {
                kind,
                url,
                revision,
            } => {
                let options = VcsOptions {
                    offline: self.offline,
                    ..request.vcs.clone()
                };
                output::detail(&format!(
                    "{} {} at {} into {}",
                    kind,
                    url,
                    revision,
                    local_dir.display()
                ));
                self.vcs
                    .get_or_update(kind, local_dir, url, revision, &options)?;
                Ok(self.vcs.checkout_dir(kind, local_dir))
            }
        }
    }

    fn fetch_archive(&self, url: &str, archive: &Path, request: &FetchRequest) -> Result<()> {
        if self.offline {
            if archive.exists() {
                output::skip(&format!("offline mode: using {}", archive.display()));
                return Ok(());
            }
            return Err(SourceError::OfflineUnavailable(archive.to_path_buf()));
        }

        if !request.caching.is_stale(archive, url) {
            if request.caching == CachePolicy::Filename {
                output::skip(&format!("{} already downloaded", archive.display()));
            }
            return Ok(());
        }

        download::download(url, archive, &request.version)?;
        if let Err(e) = build::verify(archive) {
            fs_utils::remove_file_if_exists(archive)?;
            return Err(e);
        }
        Ok(())
    }
}
