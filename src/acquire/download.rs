//! HTTP download of the main software archive
//!
//! Streams the response body to the archive path with a progress bar. A
//! failed or suspicious download never leaves a file behind.

use crate::core::error::{IoContext, Result, SourceError};
use crate::core::output;
use crate::internal::fs_utils;
use crate::internal::progress::Activity;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Default HTTP timeout in seconds
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Get HTTP timeout from `RECIPE_HTTP_TIMEOUT` or use default.
/// Cached, the environment is only read once.
pub(crate) fn http_timeout() -> Duration {
    static TIMEOUT: OnceLock<Duration> = OnceLock::new();
    *TIMEOUT.get_or_init(|| {
        let secs = std::env::var("RECIPE_HTTP_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        Duration::from_secs(secs.clamp(5, 300))
    })
}

/// Parse an RFC 2822 HTTP date into unix seconds
pub(crate) fn http_date_secs(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.timestamp())
}

/// Download `url` to `dest`, returning the number of bytes written.
///
/// `version` is the version the user asked for, used in error messages.
/// When the server sends `Last-Modified`, it becomes the mtime of `dest`.
pub fn download(url: &str, dest: &Path, version: &str) -> Result<u64> {
    fs_utils::ensure_parent_dir(dest)?;

    let filename = dest
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());

    output::detail(&format!("downloading {}", url));

    let response = match ureq::get(url).timeout(http_timeout()).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(404, _)) => {
            fs_utils::remove_file_if_exists(dest)?;
            return Err(SourceError::VersionNotFound {
                version: version.to_string(),
                url: url.to_string(),
            });
        }
        Err(e) => {
            fs_utils::remove_file_if_exists(dest)?;
            return Err(SourceError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            });
        }
    };

    // Some servers answer a missing file with an HTML error page.
    if response.content_type() == "text/html" {
        fs_utils::remove_file_if_exists(dest)?;
        return Err(SourceError::VersionNotFound {
            version: version.to_string(),
            url: url.to_string(),
        });
    }

    let expected_len: Option<u64> = response
        .header("content-length")
        .and_then(|s| s.trim().parse().ok());
    let last_modified = response.header("last-modified").and_then(http_date_secs);

    let written = match stream_to_file(response.into_reader(), dest, &filename, expected_len) {
        Ok(n) => n,
        Err(e) => {
            fs_utils::remove_file_if_exists(dest)?;
            return Err(e);
        }
    };

    if let Some(expected) = expected_len
        && expected != written
    {
        fs_utils::remove_file_if_exists(dest)?;
        return Err(SourceError::CorruptArchive {
            path: dest.to_path_buf(),
            reason: format!("truncated download: got {} of {} bytes", written, expected),
        });
    }

    if let Some(secs) = last_modified {
        filetime::set_file_mtime(dest, filetime::FileTime::from_unix_time(secs, 0)).at(dest)?;
    }

    output::detail(&format!("downloaded {} ({} bytes)", filename, written));
    Ok(written)
}

fn stream_to_file(
    mut reader: impl Read,
    dest: &Path,
    filename: &str,
    expected_len: Option<u64>,
) -> Result<u64> {
    let activity = Activity::start(format!("downloading {}", filename));
    if let Some(len) = expected_len {
        activity.expect_bytes(len);
    }

    let mut file = std::fs::File::create(dest).at(dest)?;
    let mut buffer = [0u8; 8192];
    let mut total_bytes = 0u64;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| SourceError::CorruptArchive {
                path: dest.to_path_buf(),
                reason: format!("read error: {}", e),
            })?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read]).at(dest)?;
        total_bytes += bytes_read as u64;
        activity.transferred(total_bytes);
    }

    file.flush().at(dest)?;
    Ok(total_bytes)
}
