//! `git` command-line implementation of [`RepositoryBackend`].

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::ports::{PublishOutcome, RepositoryBackend, TransportError};

const COMMITTER_NAME: &str = "fedsync";
const COMMITTER_EMAIL: &str = "fedsync@localhost";

/// Markers git prints when a push is refused because the remote moved.
const REJECTION_MARKERS: [&str; 4] = ["rejected", "non-fast-forward", "fetch first", "stale info"];

/// Drives a local clone of the shared repository with the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCliBackend {
    repository_url: String,
    checkout_path: PathBuf,
    branch: String,
}

impl GitCliBackend {
    /// Create a backend; fails if `branch` is not a safe ref name.
    pub fn new(
        repository_url: impl Into<String>,
        checkout_path: impl Into<PathBuf>,
        branch: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let branch = branch.into();
        validate_branch_name(&branch)?;
        Ok(Self {
            repository_url: repository_url.into(),
            checkout_path: checkout_path.into(),
            branch,
        })
    }

    pub fn checkout_path(&self) -> &Path {
        &self.checkout_path
    }

    async fn git(&self, args: &[&str]) -> Result<Output, TransportError> {
        run_git(args, Some(&self.checkout_path)).await
    }

    /// Run git and fail on a non-zero exit status.
    async fn git_ok(&self, args: &[&str]) -> Result<Output, TransportError> {
        let output = self.git(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(command_failed(args, &output))
        }
    }

    fn remote_ref(&self) -> String {
        format!("refs/remotes/origin/{}", self.branch)
    }
}

async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<Output, TransportError> {
    let mut command = Command::new("git");
    command
        .args(args)
        .env("GIT_AUTHOR_NAME", COMMITTER_NAME)
        .env("GIT_AUTHOR_EMAIL", COMMITTER_EMAIL)
        .env("GIT_COMMITTER_NAME", COMMITTER_NAME)
        .env("GIT_COMMITTER_EMAIL", COMMITTER_EMAIL)
        .env("GIT_TERMINAL_PROMPT", "0")
        .kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    command
        .output()
        .await
        .map_err(|e| TransportError::CommandFailed(format!("Failed to run git: {e}")))
}

fn command_failed(args: &[&str], output: &Output) -> TransportError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    TransportError::CommandFailed(format!("git {} failed: {}", args.join(" "), stderr.trim()))
}

#[async_trait]
impl RepositoryBackend for GitCliBackend {
    async fn ensure_checkout(&self) -> Result<(), TransportError> {
        if tokio::fs::try_exists(self.checkout_path.join(".git")).await? {
            return Ok(());
        }
        if let Some(parent) = self.checkout_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let path = self.checkout_path.to_string_lossy().to_string();
        let args = ["clone", "--quiet", "--", self.repository_url.as_str(), path.as_str()];
        let output = run_git(&args, None).await?;
        if !output.status.success() {
            return Err(command_failed(&args, &output));
        }
        info!(
            repository = %self.repository_url,
            checkout = %self.checkout_path.display(),
            "cloned shared repository"
        );
        Ok(())
    }

    async fn sync_to_remote(&self) -> Result<(), TransportError> {
        self.git_ok(&["fetch", "--quiet", "origin"]).await?;

        let remote_ref = self.remote_ref();
        let has_remote_branch = self
            .git(&["rev-parse", "--verify", "--quiet", remote_ref.as_str()])
            .await?
            .status
            .success();

        if has_remote_branch {
            self.git_ok(&["checkout", "--quiet", "-B", self.branch.as_str(), remote_ref.as_str()])
                .await?;
            self.git_ok(&["reset", "--quiet", "--hard", remote_ref.as_str()])
                .await?;
        } else {
            // Empty remote: start the branch from nothing. A commit left by a
            // declined first push must not be read back as remote state.
            let head = format!("refs/heads/{}", self.branch);
            self.git_ok(&["symbolic-ref", "HEAD", head.as_str()]).await?;
            let discarded = self.git(&["update-ref", "-d", head.as_str()]).await?;
            if !discarded.status.success() {
                debug!(branch = %self.branch, "no local branch to discard");
            }
            self.git_ok(&["read-tree", "--empty"]).await?;
        }
        self.git_ok(&["clean", "--quiet", "-fd"]).await?;
        debug!(branch = %self.branch, has_remote_branch, "checkout synced to remote");
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Option<Vec<u8>>, TransportError> {
        match tokio::fs::read(self.checkout_path.join(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_files(&self, files: &[(String, Vec<u8>)]) -> Result<(), TransportError> {
        for (name, bytes) in files {
            tokio::fs::write(self.checkout_path.join(name), bytes).await?;
        }
        Ok(())
    }

    async fn publish(&self, message: &str) -> Result<PublishOutcome, TransportError> {
        self.git_ok(&["add", "--all"]).await?;
        let status = self.git_ok(&["status", "--porcelain"]).await?;
        if status.stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(PublishOutcome::NothingToCommit);
        }
        self.git_ok(&["commit", "--quiet", "-m", message]).await?;

        let refspec = format!("HEAD:refs/heads/{}", self.branch);
        let args = ["push", "--porcelain", "origin", refspec.as_str()];
        let output = self.git(&args).await?;
        if output.status.success() {
            return Ok(PublishOutcome::Pushed);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
        let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
        if REJECTION_MARKERS
            .iter()
            .any(|marker| stderr.contains(marker) || stdout.contains(marker))
        {
            Err(TransportError::Conflict(format!(
                "push to {} rejected, remote moved",
                self.branch
            )))
        } else {
            Err(command_failed(&args, &output))
        }
    }
}

/// Rejects branch names that git could read as options or that break
/// `git check-ref-format`.
fn validate_branch_name(name: &str) -> Result<(), TransportError> {
    let invalid = |reason: &str| -> Result<(), TransportError> {
        Err(TransportError::CommandFailed(format!(
            "Invalid branch name '{name}': {reason}"
        )))
    };
    if name.is_empty() {
        return invalid("must not be empty");
    }
    if name.starts_with('-') {
        return invalid("must not start with '-'");
    }
    if name.contains("..") {
        return invalid("must not contain '..'");
    }
    if let Some(ch) = name
        .chars()
        .find(|ch| ch.is_ascii_control() || matches!(*ch, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
    {
        return invalid(&format!("contains disallowed character '{ch}'"));
    }
    if name.ends_with(".lock") {
        return invalid("must not end with '.lock'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_branch_name() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("knowledge/shared").is_ok());
        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name("--force").is_err());
        assert!(validate_branch_name("a..b").is_err());
        assert!(validate_branch_name("has space").is_err());
        assert!(validate_branch_name("main.lock").is_err());
    }

    #[test]
    fn test_new_rejects_unsafe_branch() {
        assert!(GitCliBackend::new("file:///tmp/remote.git", "/tmp/checkout", "-x").is_err());
    }
}
