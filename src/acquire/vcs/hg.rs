//! Mercurial backend, driving the `hg` command line tool

use super::{VcsBackend, VcsOptions, run};
use crate::core::error::{Result, SourceError};
use crate::core::output;
use crate::internal::fs_utils;
use crate::internal::progress;
use std::path::Path;
use std::process::Command;

const KIND: &str = "hg";

/// Mercurial command line backend
#[derive(Debug, Clone, Copy, Default)]
pub struct Mercurial;

fn hg(target: &Path) -> Command {
    let mut cmd = Command::new("hg");
    cmd.arg("--repository").arg(target);
    cmd
}

impl Mercurial {
    fn clone(&self, target: &Path, url: &str, revision: &str, options: &VcsOptions) -> Result<()> {
        if options.offline {
            return Err(SourceError::vcs(
                KIND,
                target,
                format!("cannot clone {} in offline mode", url),
            ));
        }
        fs_utils::ensure_parent_dir(target)?;
        output::detail(&format!("hg clone {} -r {}", url, revision));

        let mut cmd = Command::new("hg");
        cmd.args(["clone", "--quiet", "--noupdate", "--"]).arg(url).arg(target);
        progress::during(&format!("cloning {}", url), || run(KIND, target, &mut cmd))?;
        self.update(target, revision)
    }

    fn update(&self, target: &Path, revision: &str) -> Result<()> {
        run(KIND, target, hg(target).args(["update", "--quiet", "--rev", revision]))?;
        Ok(())
    }

    fn pull(&self, target: &Path) -> Result<()> {
        output::detail(&format!("hg pull in {}", target.display()));
        progress::during(&format!("pulling {}", target.display()), || {
            run(KIND, target, hg(target).args(["pull", "--quiet"]))
        })?;
        Ok(())
    }
}

impl VcsBackend for Mercurial {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn metadata_dir(&self) -> &'static str {
        ".hg"
    }

    fn lock_files(&self) -> &'static [&'static str] {
        &[".hg/wlock", ".hg/store/lock"]
    }

    fn get_or_update(&self, target: &Path, url: &str, revision: &str, options: &VcsOptions) -> Result<()> {
        if !target.join(".hg").exists() {
            return self.clone(target, url, revision, options);
        }

        if options.offline {
            return self.update(target, revision);
        }

        let updated = self.pull(target).and_then(|()| self.update(target, revision));
        match updated {
            Ok(()) => Ok(()),
            Err(e) if options.clear_retry => {
                output::warning(&format!(
                    "update of {} failed ({}), cloning again",
                    target.display(),
                    e
                ));
                fs_utils::remove_dir_if_exists(target)?;
                self.clone(target, url, revision, options)
            }
            Err(e) => Err(e),
        }
    }

    fn uncommitted_changes(&self, target: &Path) -> Result<bool> {
        let status = run(KIND, target, hg(target).arg("status"))?;
        Ok(!status.trim().is_empty())
    }

    fn parents(&self, target: &Path) -> Result<Vec<String>> {
        let out = run(
            KIND,
            target,
            hg(target).args(["parents", "--template", "{node}\\n"]),
        )?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn hg_available() -> bool {
        Command::new("hg")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn commit_all(repo: &Path, message: &str) -> String {
        run(
            KIND,
            repo,
            hg(repo).args([
                "--config",
                "ui.username=Test <test@example.com>",
                "commit",
                "--addremove",
                "--quiet",
                "-m",
                message,
            ]),
        )
        .unwrap();
        run(KIND, repo, hg(repo).args(["log", "--rev", ".", "--template", "{node}"]))
            .unwrap()
            .trim()
            .to_string()
    }

    #[test]
    fn test_clone_offline_refused() {
        let temp = tempfile::tempdir().unwrap();
        let options = VcsOptions {
            offline: true,
            ..Default::default()
        };
        let err = Mercurial
            .get_or_update(&temp.path().join("t"), "http://example.com/hg", "default", &options)
            .unwrap_err();
        assert!(matches!(err, SourceError::VcsError { kind, .. } if kind == "hg"));
        assert!(!temp.path().join("t").exists());
    }

    #[test]
    fn test_local_repository_lifecycle() {
        if !hg_available() {
            return;
        }
        let temp = tempdir().unwrap();
        let origin = temp.path().join("origin");
        run(KIND, temp.path(), Command::new("hg").arg("init").arg(&origin)).unwrap();
        std::fs::write(origin.join("README"), "one").unwrap();
        let first = commit_all(&origin, "first");
        std::fs::write(origin.join("README"), "two").unwrap();
        let second = commit_all(&origin, "second");

        let target = temp.path().join("parts/checkout");
        let url = origin.to_string_lossy().to_string();
        Mercurial
            .get_or_update(&target, &url, &first, &VcsOptions::default())
            .unwrap();

        assert_eq!(std::fs::read_to_string(target.join("README")).unwrap(), "one");
        assert_eq!(Mercurial.parents(&target).unwrap(), [first.clone()]);
        assert!(!Mercurial.uncommitted_changes(&target).unwrap());

        let offline = VcsOptions {
            offline: true,
            ..Default::default()
        };
        Mercurial.get_or_update(&target, &url, &second, &offline).unwrap();
        assert_eq!(std::fs::read_to_string(target.join("README")).unwrap(), "two");

        std::fs::write(origin.join("README"), "three").unwrap();
        let third = commit_all(&origin, "third");
        Mercurial
            .get_or_update(&target, &url, "default", &VcsOptions::default())
            .unwrap();
        assert_eq!(Mercurial.parents(&target).unwrap(), [third]);

        std::fs::write(target.join("untracked.txt"), "x").unwrap();
        assert!(Mercurial.uncommitted_changes(&target).unwrap());
    }

    #[test]
    fn test_backend_identity() {
        assert_eq!(Mercurial.kind(), "hg");
        assert_eq!(Mercurial.metadata_dir(), ".hg");
    }
}
