//! `VersionControl` backed by the `git` command line.

use super::{VcsError, VersionControl};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "git".to_string(),
            timeout,
        }
    }

    pub fn from_config() -> Self {
        Self::new(Duration::from_secs(util::config::git_timeout_secs()))
    }

    /// Use a different executable, e.g. an absolute path to `git`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn run(&self, cwd: Option<&Path>, args: &[&str]) -> Result<String, VcsError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(%command, "Running git");

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn()?;
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| VcsError::Timeout {
                command: command.clone(),
                secs: self.timeout.as_secs(),
            })??;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(VcsError::CommandFailed {
                command,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn checkout(&self, repository_uri: &str, target: &Path) -> Result<(), VcsError> {
        if target.join(".git").is_dir() {
            debug!(target = %target.display(), "Reusing existing checkout");
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let target_str = target.to_string_lossy();
        self.run(None, &["clone", "--depth", "1", repository_uri, &target_str])
            .await?;
        info!(repository = repository_uri, target = %target.display(), "Cloned repository");
        Ok(())
    }

    async fn reset_to_clean(&self, dir: &Path) -> Result<(), VcsError> {
        self.run(Some(dir), &["reset", "--hard", "origin/HEAD"]).await?;
        self.run(Some(dir), &["clean", "-fdx"]).await?;
        Ok(())
    }

    async fn delete(&self, dir: &Path) -> Result<(), VcsError> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
