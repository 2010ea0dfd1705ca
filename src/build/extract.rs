//! Sandboxed archive extraction
//!
//! A software archive is expected to hold one top-level directory. The
//! first member names it; it must be a directory that lands strictly inside
//! the destination root, otherwise nothing is extracted. Members outside of
//! it, and links that could write or point outside of it, are skipped with a
//! warning. When a member cannot be read, the partial top-level directory is
//! removed.

use crate::core::error::{IoContext, Result, SourceError};
use crate::core::output;
use crate::internal::fs_utils::{self, is_safe_path, is_strictly_within, normalize_lexical};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

/// Compression of a tar archive, detected from its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarXz,
    TarBz2,
    TarZst,
    Tar,
}

/// Detect archive format from filename extension
pub fn detect_format(archive: &Path) -> Option<ArchiveFormat> {
    let name = archive.file_name()?.to_string_lossy().to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveFormat::TarGz)
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Some(ArchiveFormat::TarXz)
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        Some(ArchiveFormat::TarBz2)
    } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
        Some(ArchiveFormat::TarZst)
    } else if name.ends_with(".tar") {
        Some(ArchiveFormat::Tar)
    } else {
        None
    }
}

/// Result of a successful extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Name of the archive's top-level directory
    pub top_level: String,
    /// `dest_root/top_level`
    pub directory: PathBuf,
    /// Members ignored as outside of the top-level directory or unsafe links
    pub skipped: Vec<PathBuf>,
}

fn corrupt(archive: &Path, reason: impl std::fmt::Display) -> SourceError {
    SourceError::CorruptArchive {
        path: archive.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn unsafe_archive(archive: &Path, reason: impl Into<String>) -> SourceError {
    SourceError::UnsafeArchive {
        path: archive.to_path_buf(),
        reason: reason.into(),
    }
}

fn open_decoder(archive: &Path) -> Result<Box<dyn Read>> {
    let format = detect_format(archive)
        .ok_or_else(|| corrupt(archive, "unknown archive format"))?;
    let reader = BufReader::new(File::open(archive).at(archive)?);
    Ok(match format {
        ArchiveFormat::TarGz => Box::new(flate2::read::GzDecoder::new(reader)),
        ArchiveFormat::TarXz => Box::new(xz2::read::XzDecoder::new(reader)),
        ArchiveFormat::TarBz2 => Box::new(bzip2::read::BzDecoder::new(reader)),
        ArchiveFormat::TarZst => Box::new(
            zstd::stream::read::Decoder::new(reader)
                .map_err(|e| corrupt(archive, format!("zstd init error: {}", e)))?,
        ),
        ArchiveFormat::Tar => Box::new(reader),
    })
}

/// Check that a freshly downloaded archive can be read to its end.
///
/// Every member is decoded, so a body cut short anywhere is caught.
pub fn verify(archive: &Path) -> Result<()> {
    let mut tar = tar::Archive::new(open_decoder(archive)?);
    let mut members = 0usize;
    for entry in tar.entries().map_err(|e| corrupt(archive, e))? {
        let mut entry = entry.map_err(|e| corrupt(archive, e))?;
        let expected = entry.size();
        let read = io::copy(&mut entry, &mut io::sink()).map_err(|e| corrupt(archive, e))?;
        if read < expected {
            let path = entry.path().map(|p| p.display().to_string()).unwrap_or_default();
            return Err(corrupt(
                archive,
                format!("member {} truncated ({} of {} bytes)", path, read, expected),
            ));
        }
        members += 1;
    }
    if members == 0 {
        return Err(corrupt(archive, "empty archive"));
    }
    Ok(())
}

/// Extract `archive` below `dest_root`, replacing any previous extraction
/// of the same top-level directory.
pub fn extract(archive: &Path, dest_root: &Path) -> Result<Extraction> {
    output::detail(&format!(
        "extracting {} to {}",
        archive.display(),
        dest_root.display()
    ));
    let decoder = open_decoder(archive)?;
    extract_tar(decoder, archive, dest_root)
}

/// The directory named by the first member, as a single path component
fn top_level_of(archive: &Path, first: &Path) -> Result<String> {
    let mut normal = first.components().filter(|c| !matches!(c, Component::CurDir));
    match normal.next() {
        Some(Component::Normal(name)) => Ok(name.to_string_lossy().to_string()),
        _ => Err(unsafe_archive(
            archive,
            format!("first member {} names no directory", first.display()),
        )),
    }
}

/// True if `member` lies in `top_level` (or is the directory itself)
fn is_under(member: &Path, top_level: &str) -> bool {
    let mut normal = member.components().filter(|c| !matches!(c, Component::CurDir));
    matches!(normal.next(), Some(Component::Normal(name)) if name == top_level)
}

fn extract_tar<R: Read>(reader: R, archive: &Path, dest_root: &Path) -> Result<Extraction> {
    let mut tar = tar::Archive::new(reader);
    tar.set_preserve_mtime(true);
    let mut entries = tar.entries().map_err(|e| corrupt(archive, e))?;

    let first = entries
        .next()
        .ok_or_else(|| corrupt(archive, "empty archive"))?
        .map_err(|e| corrupt(archive, e))?;
    let first_path = first
        .path()
        .map_err(|e| corrupt(archive, e))?
        .into_owned();

    if !first.header().entry_type().is_dir() {
        return Err(unsafe_archive(
            archive,
            format!("first member {} is not a directory", first_path.display()),
        ));
    }
    if !is_safe_path(&first_path) {
        return Err(unsafe_archive(
            archive,
            format!("first member {} is not a relative path", first_path.display()),
        ));
    }
    let top_level = top_level_of(archive, &first_path)?;
    let directory = dest_root.join(&top_level);
    if !is_strictly_within(dest_root, &dest_root.join(&first_path)) {
        return Err(unsafe_archive(
            archive,
            format!("first member {} escapes {}", first_path.display(), dest_root.display()),
        ));
    }

    if fs_utils::remove_dir_if_exists(&directory)? {
        output::detail(&format!("removed previous {}", directory.display()));
    }
    std::fs::create_dir_all(dest_root.join(&first_path)).at(&directory)?;

    let mut skipped = Vec::new();
    if let Err(e) = unpack_members(entries, archive, dest_root, &top_level, &mut skipped) {
        fs_utils::remove_dir_if_exists(&directory)?;
        return Err(e);
    }

    Ok(Extraction {
        top_level,
        directory,
        skipped,
    })
}

fn skip_member(skipped: &mut Vec<PathBuf>, path: PathBuf, reason: impl std::fmt::Display) {
    output::warning(&format!("archive member {}: {}, ignored", path.display(), reason));
    skipped.push(path);
}

fn unpack_members<R: Read>(
    entries: tar::Entries<'_, R>,
    archive: &Path,
    dest_root: &Path,
    top_level: &str,
    skipped: &mut Vec<PathBuf>,
) -> Result<()> {
    let directory = dest_root.join(top_level);
    for entry in entries {
        let mut entry = entry.map_err(|e| corrupt(archive, e))?;
        let path = entry
            .path()
            .map_err(|e| corrupt(archive, e))?
            .into_owned();

        if !is_safe_path(&path) || !is_under(&path, top_level) {
            skip_member(skipped, path, format_args!("outside of {}", top_level));
            continue;
        }

        let full_path = dest_root.join(&path);
        if let Some(link) = symlink_component(dest_root, &full_path) {
            skip_member(skipped, path, format_args!("symlink in path {}", link.display()));
            continue;
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let Some(link_name) = entry
                .link_name()
                .map_err(|e| corrupt(archive, e))?
                .map(|l| l.into_owned())
            else {
                skip_member(skipped, path, "link without target");
                continue;
            };
            let link_parent = if entry_type.is_symlink() {
                full_path.parent().unwrap_or(dest_root).to_path_buf()
            } else {
                // Hard link targets are archive paths.
                dest_root.to_path_buf()
            };
            if let Err(reason) = check_link_target(&directory, &link_parent, &link_name) {
                skip_member(skipped, path, reason);
                continue;
            }
        }

        let unpacked = entry
            .unpack_in(dest_root)
            .map_err(|e| corrupt(archive, format!("unpack error for {}: {}", path.display(), e)))?;
        if !unpacked {
            skip_member(skipped, path, "refused");
        }
    }
    Ok(())
}

/// First existing symlink on the way from `dest` to `full_path`.
///
/// Writing through it could land outside `dest`.
fn symlink_component(dest: &Path, full_path: &Path) -> Option<PathBuf> {
    let rel = full_path.strip_prefix(dest).ok()?;
    let mut cur = dest.to_path_buf();
    for comp in rel.components() {
        cur.push(comp);
        if let Ok(md) = std::fs::symlink_metadata(&cur)
            && md.file_type().is_symlink()
        {
            return Some(cur);
        }
    }
    None
}

fn check_link_target(
    top_dir: &Path,
    link_parent: &Path,
    link_name: &Path,
) -> std::result::Result<(), String> {
    if link_name.is_absolute()
        || link_name
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(format!("absolute link target {}", link_name.display()));
    }

    let candidate = normalize_lexical(&link_parent.join(link_name));
    if !candidate.starts_with(normalize_lexical(top_dir)) {
        return Err(format!("link target {} escapes", link_name.display()));
    }
    Ok(())
}
