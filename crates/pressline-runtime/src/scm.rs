//! Source-control provider: remote branch listing and revision deploys.

use crate::process::{run_checked, SHORT_TIMEOUT};
use crate::RuntimeError;
use std::path::Path;
use std::process::Command;
use tracing::debug;

pub trait SourceControlProvider: Send + Sync {
    fn name(&self) -> &str;

    fn list_remote_branches(&self, repo_url: &str) -> Result<Vec<String>, RuntimeError>;

    /// Check out `reference` (branch or sha) into `worktree`, returning
    /// the resolved commit sha and its subject line.
    fn deploy_revision(
        &self,
        repo_url: &str,
        reference: &str,
        worktree: &Path,
    ) -> Result<(String, String), RuntimeError>;
}

#[derive(Default)]
pub struct GitProvider;

impl GitProvider {
    pub fn new() -> Self {
        Self
    }
}

impl SourceControlProvider for GitProvider {
    fn name(&self) -> &'static str {
        "git"
    }

    fn list_remote_branches(&self, repo_url: &str) -> Result<Vec<String>, RuntimeError> {
        debug!("listing remote branches of {repo_url}");
        let mut cmd = Command::new("git");
        cmd.args(["ls-remote", "--heads", repo_url]);
        let output = run_checked(cmd, SHORT_TIMEOUT)
            .map_err(|e| RuntimeError::ScmFailed(e.to_string()))?;
        Ok(parse_ls_remote(&String::from_utf8_lossy(&output.stdout)))
    }

    fn deploy_revision(
        &self,
        repo_url: &str,
        reference: &str,
        worktree: &Path,
    ) -> Result<(String, String), RuntimeError> {
        if !worktree.join(".git").exists() {
            let mut clone = Command::new("git");
            clone.args(["clone", repo_url]).arg(worktree);
            run_checked(clone, SHORT_TIMEOUT)
                .map_err(|e| RuntimeError::ScmFailed(e.to_string()))?;
        }

        let mut fetch = Command::new("git");
        fetch.current_dir(worktree).args(["fetch", "origin"]);
        run_checked(fetch, SHORT_TIMEOUT).map_err(|e| RuntimeError::ScmFailed(e.to_string()))?;

        let mut checkout = Command::new("git");
        checkout.current_dir(worktree).args(["checkout", reference]);
        run_checked(checkout, SHORT_TIMEOUT)
            .map_err(|e| RuntimeError::ScmFailed(e.to_string()))?;

        let mut show = Command::new("git");
        show.current_dir(worktree)
            .args(["log", "-1", "--format=%H%x09%s"]);
        let output =
            run_checked(show, SHORT_TIMEOUT).map_err(|e| RuntimeError::ScmFailed(e.to_string()))?;
        let text = String::from_utf8_lossy(&output.stdout);
        let (sha, subject) = text.trim().split_once('\t').unwrap_or((text.trim(), ""));
        Ok((sha.to_owned(), subject.to_owned()))
    }
}

fn parse_ls_remote(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            line.split_whitespace()
                .nth(1)?
                .strip_prefix("refs/heads/")
                .map(str::to_owned)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ls_remote_output() {
        let branches = parse_ls_remote(
            "abc123\trefs/heads/main\n\
             def456\trefs/heads/develop\n\
             789abc\trefs/heads/feature/new-header\n",
        );
        assert_eq!(branches, vec!["main", "develop", "feature/new-header"]);
    }

    #[test]
    fn parse_ls_remote_ignores_tags() {
        let branches = parse_ls_remote("abc123\trefs/tags/v1.0\nxyz\trefs/heads/main\n");
        assert_eq!(branches, vec!["main"]);
    }

    #[test]
    fn parse_ls_remote_empty() {
        assert!(parse_ls_remote("").is_empty());
    }
}
