//! Version spec parsing
//!
//! The `version` option is whitespace-tokenized:
//!
//! - `7.0-1` - a release, downloaded from the default server of its series
//! - `local <dir>` / `path <dir>` - an existing directory below the buildout
//! - `url <url>` - an archive at an arbitrary URL
//! - `nightly <series> <version>` - a nightly build, `latest` allowed
//! - `<vcs> <url> <target> <revision>` - a checkout in the parts directory
//!
//! Parsing performs no I/O.

use crate::acquire::cache::CachePolicy;
use crate::core::config::Buildout;
use crate::core::error::{Result, SourceError};
use crate::spec::{ArchiveHandle, SourceDescriptor};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Release series: (major, default base URL, archive filename pattern)
const RELEASES: &[(&str, &str, &str)] = &[
    ("5.0", "http://v6.openerp.com/download/stable/source/", "openerp-server-{}.tar.gz"),
    ("6.0", "http://www.openerp.com/download/stable/source/", "openerp-server-{}.tar.gz"),
    ("6.1", "http://nightly.openerp.com/6.1/releases/", "openerp-{}.tar.gz"),
    ("7.0", "http://nightly.openerp.com/7.0/releases/", "openerp-{}.tar.gz"),
];

/// Nightly series: (series, base URL, archive filename pattern)
const NIGHTLIES: &[(&str, &str, &str)] = &[
    ("6.1", "http://nightly.openerp.com/6.1/nightly/src/", "openerp-6.1-{}.tgz"),
    ("7.0", "http://nightly.openerp.com/7.0/nightly/src/", "openerp-7.0-{}.tar.gz"),
    ("trunk", "http://nightly.openerp.com/trunk/nightly/src/", "openerp-trunk-{}.tar.gz"),
];

/// The moving nightly version
pub const LATEST: &str = "latest";

/// Everything the parser needs from the recipe's surroundings
#[derive(Debug, Clone, Copy)]
pub struct VersionContext<'a> {
    pub buildout: &'a Buildout,
    /// Overrides the default base URL of releases and nightlies
    pub base_url: Option<&'a str>,
    pub vcs_kinds: &'a BTreeSet<String>,
}

/// A nightly series and version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nightly {
    pub series: String,
    pub version: String,
}

impl Nightly {
    pub fn is_latest(&self) -> bool {
        self.version == LATEST
    }
}

/// Parsed `version` option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    /// The option as written
    pub wanted: String,
    pub descriptor: SourceDescriptor,
    /// Target archive, for downloadable sources
    pub archive: Option<ArchiveHandle>,
    /// Known up front for local and VCS sources; a downloaded archive only
    /// tells its directory once extracted
    pub software_dir: Option<PathBuf>,
    pub caching: CachePolicy,
    pub nightly: Option<Nightly>,
}

impl VersionSpec {
    pub fn archive_filename(&self) -> Option<String> {
        self.archive
            .as_ref()
            .and_then(|a| a.path.file_name())
            .map(|n| n.to_string_lossy().to_string())
    }

    /// Major series such as `7.0`, when the spec names one
    pub fn series(&self) -> Option<&str> {
        match &self.nightly {
            Some(nightly) => Some(&nightly.series),
            None => {
                let single = !self.wanted.contains(char::is_whitespace);
                single.then(|| self.wanted.get(..3)).flatten()
            }
        }
    }
}

/// Default download server of a release series (`7.0`, ...)
pub fn default_base_url(major: &str) -> Option<&'static str> {
    RELEASES
        .iter()
        .find(|(m, _, _)| *m == major)
        .map(|(_, base, _)| *base)
}

/// Archive filename of a release, from the pattern of its series
pub fn release_filename(version: &str) -> Option<String> {
    let major = version.get(..3)?;
    RELEASES
        .iter()
        .find(|(m, _, _)| *m == major)
        .map(|(_, _, pattern)| pattern.replace("{}", version))
}

fn join_url(base: &str, filename: &str) -> String {
    format!("{}/{}", base.trim_matches('/'), filename)
}

fn downloadable(
    spec: &str,
    ctx: &VersionContext<'_>,
    url: String,
    filename: &str,
) -> VersionSpec {
    VersionSpec {
        wanted: spec.to_string(),
        archive: Some(ArchiveHandle {
            path: ctx.buildout.downloads_dir.join(filename),
            url: url.clone(),
        }),
        descriptor: SourceDescriptor::Downloadable { url },
        software_dir: None,
        caching: CachePolicy::Filename,
        nightly: None,
    }
}

/// Parse a `version` option into a main software source.
pub fn parse_version(spec: &str, ctx: &VersionContext<'_>) -> Result<VersionSpec> {
    let tokens: Vec<&str> = spec.split_whitespace().collect();

    match tokens.as_slice() {
        [] => Err(SourceError::malformed(spec, &tokens, "empty version specification")),
        ["local" | "path", dir] => Ok(VersionSpec {
            wanted: spec.to_string(),
            descriptor: SourceDescriptor::Local,
            archive: None,
            software_dir: Some(ctx.buildout.make_absolute(dir)),
            caching: CachePolicy::Filename,
            nightly: None,
        }),
        ["url", url] => {
            let filename = url_filename(url)
                .ok_or_else(|| SourceError::malformed(spec, &tokens, "URL has no file name"))?;
            Ok(downloadable(spec, ctx, url.to_string(), &filename))
        }
        ["nightly", series, version] | [series, "nightly", version] => {
            parse_nightly(spec, series, version, ctx)
        }
        ["local" | "path" | "url", ..] => Err(SourceError::malformed(
            spec,
            &tokens,
            format!("expecting {} <location>", tokens[0]),
        )),
        ["nightly", ..] => Err(SourceError::malformed(
            spec,
            &tokens,
            "expecting nightly <series> <version>",
        )),
        [release] => parse_release(release, ctx).map(|(url, filename)| {
            downloadable(spec, ctx, url, &filename)
        }),
        [kind, url, target, revision] => {
            if !ctx.vcs_kinds.contains(*kind) {
                return Err(SourceError::UnsupportedVcs(kind.to_string()));
            }
            Ok(VersionSpec {
                wanted: spec.to_string(),
                descriptor: SourceDescriptor::Vcs {
                    kind: kind.to_string(),
                    url: url.to_string(),
                    revision: revision.to_string(),
                },
                archive: None,
                software_dir: Some(ctx.buildout.parts_dir.join(target)),
                caching: CachePolicy::Filename,
                nightly: None,
            })
        }
        _ => Err(SourceError::malformed(
            spec,
            &tokens,
            "expecting type, url, target, revision for remote repository or explicit download",
        )),
    }
}

/// (url, archive filename) of a release such as `7.0-1`
fn parse_release(version: &str, ctx: &VersionContext<'_>) -> Result<(String, String)> {
    let major = version.get(..3).unwrap_or(version);
    let filename = release_filename(version)
        .ok_or_else(|| SourceError::UnsupportedVersion(version.to_string()))?;
    let base = match ctx.base_url {
        Some(base) => base,
        None => default_base_url(major)
            .ok_or_else(|| SourceError::UnsupportedVersion(version.to_string()))?,
    };
    Ok((join_url(base, &filename), filename))
}

fn parse_nightly(
    spec: &str,
    series: &str,
    version: &str,
    ctx: &VersionContext<'_>,
) -> Result<VersionSpec> {
    let (_, default_base, pattern) = NIGHTLIES
        .iter()
        .find(|(s, _, _)| *s == series)
        .ok_or_else(|| SourceError::UnsupportedVersion(format!("nightly {series}")))?;

    let filename = pattern.replace("{}", version);
    let base = ctx.base_url.unwrap_or(default_base);
    let mut parsed = downloadable(spec, ctx, join_url(base, &filename), &filename);
    let nightly = Nightly {
        series: series.to_string(),
        version: version.to_string(),
    };
    if nightly.is_latest() {
        // The archive behind "latest" changes; ask the server.
        parsed.caching = CachePolicy::HttpHead;
    }
    parsed.nightly = Some(nightly);
    Ok(parsed)
}

/// Last path segment of a URL, ignoring query and fragment
fn url_filename(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    parsed
        .path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
