use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Captured result of one external process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl RawOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }

    /// Returns true when a failed run printed one of the given substrings.
    pub fn tolerated(&self, tolerate: &[&str]) -> bool {
        if self.success {
            return false;
        }

        let combined = self.combined();
        tolerate.iter().any(|t| combined.contains(t))
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, name: &str, args: &[String]) -> Result<RawOutput>;
}

pub fn command_line(name: &str, args: &[String]) -> String {
    let mut line = name.to_owned();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Runs commands on the host, killing them when the timeout elapses.
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    timeout: Duration,
}

impl SystemExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

#[async_trait]
impl Executor for SystemExecutor {
    async fn run(&self, name: &str, args: &[String]) -> Result<RawOutput> {
        let child = Command::new(name)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                cmd: command_line(name, args),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout {
                cmd: command_line(name, args),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| Error::Spawn {
                cmd: command_line(name, args),
                source,
            })?;

        Ok(RawOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
