//! Launching the native listing tool and exposing its stdout.
//!
//! stderr is piped too and collected once the child is reaped, so a failing
//! tool can explain itself. It is only drained after stdout ends; listing
//! tools write a line or two there at most.

use crate::error::{QueryError, Result};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::process::{Child, Command};

/// Starts a program and hands back its standard output.
#[async_trait::async_trait]
pub trait Spawner: Send + Sync {
    async fn spawn(&self, program: &str, args: &[String]) -> Result<Spawned>;
}

/// Output of a spawned tool, plus the child to reap once it is drained.
pub struct Spawned {
    pub stdout: Box<dyn AsyncBufRead + Send + Unpin>,
    child: Option<Child>,
    program: String,
}

impl Spawned {
    /// Wraps an arbitrary reader; there is no child to wait on.
    pub fn from_reader<R>(program: &str, reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        Self {
            stdout: Box::new(reader),
            child: None,
            program: program.to_string(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Waits for the child to exit. Readers without a child return `None`.
    pub async fn wait(self) -> Result<Option<Exit>> {
        let Some(child) = self.child else {
            return Ok(None);
        };
        // stdout is dropped first so a child still writing sees EPIPE instead of blocking.
        drop(self.stdout);
        let output = child
            .wait_with_output()
            .await
            .map_err(|source| QueryError::StreamRead {
                program: self.program,
                source,
            })?;

        Ok(Some(Exit {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }))
    }
}

/// How a spawned tool finished.
#[derive(Debug)]
pub struct Exit {
    pub status: ExitStatus,
    /// Everything the tool wrote to stderr, trimmed.
    pub stderr: String,
}

impl Exit {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn into_error(self, program: &str) -> QueryError {
        QueryError::ToolFailed {
            program: program.to_string(),
            status: self.status,
            stderr: self.stderr,
        }
    }
}

/// Spawns real processes through `tokio::process`.
pub struct TokioSpawner;

#[async_trait::async_trait]
impl Spawner for TokioSpawner {
    async fn spawn(&self, program: &str, args: &[String]) -> Result<Spawned> {
        tracing::debug!(program, ?args, "spawning process lister");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| QueryError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| QueryError::MissingStdout {
            program: program.to_string(),
        })?;

        Ok(Spawned {
            stdout: Box::new(BufReader::new(stdout)),
            child: Some(child),
            program: program.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_a_spawn_failure() {
        let err = TokioSpawner
            .spawn("pslist-no-such-binary-on-path", &[])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, QueryError::Spawn { ref program, .. } if program == "pslist-no-such-binary-on-path"));
    }

    #[tokio::test]
    async fn reader_without_child_waits_to_none() {
        let spawned = Spawned::from_reader("fake", &b"header\n"[..]);
        assert_eq!(spawned.program(), "fake");
        assert!(spawned.wait().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_carries_status_and_stderr() {
        let args = vec!["-c".to_string(), "echo listed; echo 'bad option' >&2; exit 3".to_string()];
        let mut spawned = TokioSpawner.spawn("sh", &args).await.unwrap();

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut spawned.stdout, &mut out)
            .await
            .unwrap();
        assert_eq!(out, "listed\n");

        let exit = spawned.wait().await.unwrap().unwrap();
        assert!(!exit.success());
        assert_eq!(exit.status.code(), Some(3));
        assert_eq!(exit.stderr, "bad option");

        let err = exit.into_error("sh");
        assert!(matches!(err, QueryError::ToolFailed { ref stderr, .. } if stderr == "bad option"));
        assert!(err.to_string().contains("bad option"));
    }
}
