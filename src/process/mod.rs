//! Runtime process management (launch command, spawn, exit tracking, kill).

use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::AsyncBufRead;
use tokio::process::Child;
use tracing::warn;

use crate::error::Result;

pub mod lein;

/// Time allowed for a killed process to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// The command line for a headless nREPL launch: `<program> repl :headless [:port N]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub port: Option<u16>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            program: program.into(),
            port,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["repl".to_string(), ":headless".to_string()];
        if let Some(port) = self.port {
            args.push(":port".to_string());
            args.push(port.to_string());
        }
        args
    }

    /// Full command line, for logs and error messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args());
        parts.join(" ")
    }
}

/// A spawned runtime: its process (absent for in-memory doubles) and captured stdout.
pub struct Launched {
    pub process: Option<ProcessHandle>,
    pub stdout: Box<dyn AsyncBufRead + Send + Unpin>,
}

/// Spawns the runtime for a [`LaunchSpec`].
pub trait Launcher {
    fn spawn(&self, spec: &LaunchSpec) -> Result<Launched>;
}

/// Handle to the spawned runtime process.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    child: Child,
}

impl ProcessHandle {
    pub fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// `None` while the process is still running.
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!(pid = ?self.pid, error = %e, "failed to poll runtime process");
                None
            }
        }
    }

    /// Wait up to `limit` for the process to exit on its own.
    pub async fn wait_timeout(&mut self, limit: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(limit, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                warn!(pid = ?self.pid, error = %e, "error waiting for runtime process");
                None
            }
            Err(_) => None,
        }
    }

    /// Kill the process and reap it so it does not linger as a zombie.
    pub async fn kill(&mut self) -> std::io::Result<Option<ExitStatus>> {
        if let Err(e) = self.child.start_kill() {
            // Already exited is fine; anything else is reported if it is still alive.
            if self.is_running() {
                return Err(e);
            }
        }
        match tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => Ok(Some(status)),
            Ok(Err(e)) => {
                warn!(pid = ?self.pid, error = %e, "error reaping runtime process");
                Ok(None)
            }
            Err(_) => {
                warn!(pid = ?self.pid, "timeout waiting for runtime process to exit");
                Ok(None)
            }
        }
    }

    pub fn format_exit_status(status: &ExitStatus) -> String {
        if let Some(code) = status.code() {
            return format!("exited with code {}", code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return match sig {
                    9 => "killed by SIGKILL (signal 9)".to_string(),
                    15 => "killed by SIGTERM (signal 15)".to_string(),
                    other => format!("killed by signal {}", other),
                };
            }
        }
        "exited (unknown status)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_without_port() {
        let spec = LaunchSpec::new("lein", None);
        assert_eq!(spec.args(), vec!["repl", ":headless"]);
        assert_eq!(spec.display(), "lein repl :headless");
    }

    #[test]
    fn test_args_with_port() {
        let spec = LaunchSpec::new("lein", Some(7888));
        assert_eq!(spec.args(), vec!["repl", ":headless", ":port", "7888"]);
    }
}
