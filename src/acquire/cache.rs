//! Staleness of a previously downloaded archive
//!
//! `filename` trusts any archive already on disk. `http-head` asks the
//! server, the way GNU Wget 1.12 does: it works even if the server does not
//! implement conditional responses such as 304. It assumes the archive's
//! mtime was set from `Last-Modified` when it was downloaded.

use crate::acquire::download::{http_date_secs, http_timeout};
use crate::core::output;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// How to decide whether a cached archive must be downloaded again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Presence of the file means fresh
    #[default]
    Filename,
    /// Compare size and modification time with a HEAD request
    HttpHead,
}

impl CachePolicy {
    /// Tell whether the archive at `archive` is missing or out of date.
    pub fn is_stale(&self, archive: &Path, url: &str) -> bool {
        if !archive.exists() {
            return true;
        }
        match self {
            CachePolicy::Filename => false,
            CachePolicy::HttpHead => is_stale_http_head(archive, url),
        }
    }
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CachePolicy::Filename => write!(f, "filename"),
            CachePolicy::HttpHead => write!(f, "http-head"),
        }
    }
}

/// What a HEAD request told us about the remote archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteHead {
    pub status: u16,
    pub content_length: Option<String>,
    pub last_modified: Option<String>,
}

impl RemoteHead {
    /// Compare with the local archive's size and mtime (unix seconds).
    pub fn is_newer_than(&self, local_len: u64, local_mtime: i64) -> bool {
        if self.status != 200 {
            return true;
        }

        let remote_len = self
            .content_length
            .as_deref()
            .and_then(|s| s.trim().parse::<u64>().ok());
        if remote_len != Some(local_len) {
            return true;
        }

        match self.last_modified.as_deref().and_then(http_date_secs) {
            Some(remote_mtime) => remote_mtime > local_mtime,
            None => true,
        }
    }
}

fn is_stale_http_head(archive: &Path, url: &str) -> bool {
    let Ok(metadata) = std::fs::metadata(archive) else {
        return true;
    };
    let local_mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    output::detail(&format!(
        "checking if {} is fresh wrt {}",
        archive.display(),
        url
    ));

    let response = match ureq::head(url).timeout(http_timeout()).call() {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("HEAD {} failed: {}", url, e);
            return true;
        }
    };

    let head = RemoteHead {
        status: response.status(),
        content_length: response.header("content-length").map(str::to_string),
        last_modified: response.header("last-modified").map(str::to_string),
    };
    tracing::debug!("Last-Modified from HEAD request: {:?}", head.last_modified);

    let stale = head.is_newer_than(metadata.len(), local_mtime);
    if !stale {
        output::skip(&format!("no need to re-download {}", archive.display()));
    }
    stale
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN_2013: &str = "Tue, 01 Jan 2013 00:00:00 GMT";
    const JAN_2013_SECS: i64 = 1_356_998_400;

    fn head(status: u16, len: Option<&str>, modified: Option<&str>) -> RemoteHead {
        RemoteHead {
            status,
            content_length: len.map(str::to_string),
            last_modified: modified.map(str::to_string),
        }
    }

    #[test]
    fn test_head_fresh_when_everything_matches() {
        assert!(!head(200, Some("10"), Some(JAN_2013)).is_newer_than(10, JAN_2013_SECS));
    }

    #[test]
    fn test_head_stale_on_length_mismatch_same_date() {
        assert!(head(200, Some("11"), Some(JAN_2013)).is_newer_than(10, JAN_2013_SECS));
    }

    #[test]
    fn test_head_stale_on_newer_remote() {
        assert!(head(200, Some("10"), Some(JAN_2013)).is_newer_than(10, JAN_2013_SECS - 1));
    }

    #[test]
    fn test_head_stale_on_status_or_missing_headers() {
        assert!(head(404, Some("10"), Some(JAN_2013)).is_newer_than(10, JAN_2013_SECS));
        assert!(head(200, None, Some(JAN_2013)).is_newer_than(10, JAN_2013_SECS));
        assert!(head(200, Some("10"), None).is_newer_than(10, JAN_2013_SECS));
        assert!(head(200, Some("10"), Some("garbage")).is_newer_than(10, JAN_2013_SECS));
    }

    #[test]
    fn test_missing_archive_is_stale_for_every_policy() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("none.tar.gz");
        assert!(CachePolicy::Filename.is_stale(&missing, "http://127.0.0.1:9/x"));
        assert!(CachePolicy::HttpHead.is_stale(&missing, "http://127.0.0.1:9/x"));
    }

    #[test]
    fn test_filename_policy_trusts_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("a.tar.gz");
        std::fs::write(&archive, b"x").unwrap();
        assert!(!CachePolicy::Filename.is_stale(&archive, "http://127.0.0.1:9/x"));
    }

    #[test]
    fn test_http_head_network_failure_is_stale() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("a.tar.gz");
        std::fs::write(&archive, b"x").unwrap();
        assert!(CachePolicy::HttpHead.is_stale(&archive, "http://127.0.0.1:9/a.tar.gz"));
    }

    mod mock_tests {
        use super::*;
        use filetime::FileTime;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn archive_with(dir: &Path, content: &[u8], mtime: i64) -> std::path::PathBuf {
            let archive = dir.join("openerp-trunk-latest.tar.gz");
            std::fs::write(&archive, content).unwrap();
            filetime::set_file_mtime(&archive, FileTime::from_unix_time(mtime, 0)).unwrap();
            archive
        }

        async fn server_with(body_len: usize, modified: &str) -> MockServer {
            let mock_server = MockServer::start().await;
            Mock::given(method("HEAD"))
                .and(path("/openerp-trunk-latest.tar.gz"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("Last-Modified", modified)
                        .set_body_bytes(vec![0u8; body_len]),
                )
                .mount(&mock_server)
                .await;
            mock_server
        }

        #[tokio::test]
        async fn test_http_head_fresh() {
            let mock_server = server_with(10, JAN_2013).await;
            let temp = tempfile::tempdir().unwrap();
            let archive = archive_with(temp.path(), b"0123456789", JAN_2013_SECS);
            let url = format!("{}/openerp-trunk-latest.tar.gz", mock_server.uri());

            assert!(!CachePolicy::HttpHead.is_stale(&archive, &url));
        }

        #[tokio::test]
        async fn test_http_head_length_differs_with_same_date() {
            let mock_server = server_with(12, JAN_2013).await;
            let temp = tempfile::tempdir().unwrap();
            let archive = archive_with(temp.path(), b"0123456789", JAN_2013_SECS);
            let url = format!("{}/openerp-trunk-latest.tar.gz", mock_server.uri());

            assert!(CachePolicy::HttpHead.is_stale(&archive, &url));
        }

        #[tokio::test]
        async fn test_http_head_error_status_is_stale() {
            let mock_server = MockServer::start().await;
            Mock::given(method("HEAD"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&mock_server)
                .await;
            let temp = tempfile::tempdir().unwrap();
            let archive = archive_with(temp.path(), b"0123456789", JAN_2013_SECS);
            let url = format!("{}/openerp-trunk-latest.tar.gz", mock_server.uri());

            assert!(CachePolicy::HttpHead.is_stale(&archive, &url));
        }
    }
}
