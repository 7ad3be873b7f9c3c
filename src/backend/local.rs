//! Local git execution for access checks that return no backend

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info};

/// Runs `git <service>` against an on-disk repository
#[derive(Debug, Clone)]
pub struct GitExecutor {
    git_bin: String,
    repos_path: PathBuf,
}

impl GitExecutor {
    pub fn new(git_bin: impl Into<String>, repos_path: impl AsRef<Path>) -> Self {
        Self {
            git_bin: git_bin.into(),
            repos_path: repos_path.as_ref().to_path_buf(),
        }
    }

    /// On-disk location of a repository argument
    pub fn repository_path(&self, repository: &str) -> PathBuf {
        self.repos_path.join(repository.trim_start_matches('/'))
    }

    /// Run the service with the operator streams attached
    ///
    /// Returns git's exit status, or 128 + signal when it was killed.
    pub async fn run<I, O, E>(
        &self,
        service: &str,
        repository: &str,
        git_protocol: Option<&str>,
        mut stdin: I,
        mut stdout: O,
        mut stderr: E,
    ) -> std::io::Result<i32>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let subcommand = service.strip_prefix("git-").unwrap_or(service);
        let path = self.repository_path(repository);

        let mut command = Command::new(&self.git_bin);
        command
            .arg(subcommand)
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(protocol) = git_protocol {
            command.env("GIT_PROTOCOL", protocol);
        }

        debug!(git = %self.git_bin, subcommand, path = %path.display(), "Spawning local git");
        let mut child = command.spawn()?;

        let mut child_in = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("child stdin not captured"))?;
        let mut child_out = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout not captured"))?;
        let mut child_err = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("child stderr not captured"))?;

        let feed = async move {
            tokio::io::copy(&mut stdin, &mut child_in).await?;
            child_in.shutdown().await
        };
        let drain = async {
            tokio::try_join!(
                tokio::io::copy(&mut child_out, &mut stdout),
                tokio::io::copy(&mut child_err, &mut stderr),
            )?;
            stdout.flush().await?;
            stderr.flush().await?;
            child.wait().await
        };
        tokio::pin!(feed);
        tokio::pin!(drain);

        let mut feeding = true;
        let status = loop {
            tokio::select! {
                res = &mut feed, if feeding => {
                    feeding = false;
                    if let Err(e) = res {
                        // git may exit before reading all input
                        debug!(error = %e, "Stopped feeding local git stdin");
                    }
                }
                res = &mut drain => break res?,
            }
        };

        let code = status
            .code()
            .or_else(|| status.signal().map(|sig| 128 + sig))
            .unwrap_or(1);
        info!(subcommand, code, "Local git finished");
        Ok(code)
    }
}
