//! Git backend, driving the `git` command line tool
//!
//! Options:
//! - `git-depth`: shallow clone depth for new checkouts

use super::{VcsBackend, VcsOptions, integer_option, run};
use crate::core::error::{Result, SourceError};
use crate::core::output;
use crate::internal::fs_utils;
use crate::internal::progress;
use std::path::Path;
use std::process::Command;

const KIND: &str = "git";

/// Git command line backend
#[derive(Debug, Clone, Copy, Default)]
pub struct Git;

fn git(target: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(target);
    cmd
}

impl Git {
    fn clone(&self, target: &Path, url: &str, options: &VcsOptions) -> Result<()> {
        if options.offline {
            return Err(SourceError::vcs(
                KIND,
                target,
                format!("cannot clone {} in offline mode", url),
            ));
        }
        fs_utils::ensure_parent_dir(target)?;

        let depth = integer_option(KIND, options, "depth", 1_000_000)?;
        let mut cmd = Command::new("git");
        cmd.args(["clone", "--quiet"]);
        match depth {
            Some(depth) => {
                output::detail(&format!("git clone --depth {} {}", depth, url));
                cmd.args(["--depth", &depth.to_string(), "--no-single-branch"]);
            }
            None => output::detail(&format!("git clone {}", url)),
        }
        cmd.arg("--").arg(url).arg(target);

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| url.to_string());
        progress::during(&format!("cloning {}", name), || run(KIND, target, &mut cmd))?;
        Ok(())
    }

    fn checkout(&self, target: &Path, revision: &str) -> Result<()> {
        run(KIND, target, git(target).args(["checkout", "--quiet", revision]))?;
        Ok(())
    }

    /// Fetch, check out, and fast-forward when the revision is a branch.
    fn update(&self, target: &Path, revision: &str) -> Result<()> {
        output::detail(&format!("git fetch in {}", target.display()));
        progress::during(&format!("fetching {}", target.display()), || {
            run(KIND, target, git(target).args(["fetch", "--quiet", "--tags", "origin"]))
        })?;
        self.checkout(target, revision)?;

        let remote_branch = format!("refs/remotes/origin/{}", revision);
        let is_branch = run(
            KIND,
            target,
            git(target).args(["rev-parse", "--verify", "--quiet", &remote_branch]),
        )
        .is_ok();
        if is_branch {
            run(
                KIND,
                target,
                git(target).args(["merge", "--ff-only", "--quiet", &format!("origin/{}", revision)]),
            )?;
        }
        Ok(())
    }
}

impl VcsBackend for Git {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn metadata_dir(&self) -> &'static str {
        ".git"
    }

    fn lock_files(&self) -> &'static [&'static str] {
        &[".git/index.lock", ".git/HEAD.lock"]
    }

    fn get_or_update(&self, target: &Path, url: &str, revision: &str, options: &VcsOptions) -> Result<()> {
        if !target.join(".git").exists() {
            self.clone(target, url, options)?;
            return self.checkout(target, revision);
        }

        if options.offline {
            output::detail(&format!(
                "offline mode: checking out {} in {}",
                revision,
                target.display()
            ));
            return self.checkout(target, revision);
        }

        match self.update(target, revision) {
            Ok(()) => Ok(()),
            Err(e) if options.clear_retry => {
                output::warning(&format!(
                    "update of {} failed ({}), cloning again",
                    target.display(),
                    e
                ));
                fs_utils::remove_dir_if_exists(target)?;
                self.clone(target, url, options)?;
                self.checkout(target, revision)
            }
            Err(e) => Err(e),
        }
    }

    fn uncommitted_changes(&self, target: &Path) -> Result<bool> {
        let status = run(KIND, target, git(target).args(["status", "--porcelain"]))?;
        Ok(!status.trim().is_empty())
    }

    fn parents(&self, target: &Path) -> Result<Vec<String>> {
        let head = run(KIND, target, git(target).args(["rev-parse", "HEAD"]))?;
        let mut parents = vec![head.trim().to_string()];

        let merge_head = target.join(".git/MERGE_HEAD");
        if let Ok(content) = std::fs::read_to_string(&merge_head) {
            parents.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
            );
        }
        Ok(parents)
    }
}
