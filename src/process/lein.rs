//! Leiningen launcher: spawns `lein repl :headless` with stdout captured.

use std::process::Stdio;

use tokio::io::BufReader;
use tokio::process::Command;
use tracing::info;

use super::{LaunchSpec, Launched, Launcher, ProcessHandle};
use crate::error::{Result, SessionError};

#[derive(Debug, Clone, Copy, Default)]
pub struct LeinLauncher;

impl Launcher for LeinLauncher {
    fn spawn(&self, spec: &LaunchSpec) -> Result<Launched> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            SessionError::startup(format!("failed to spawn `{}`: {}", spec.display(), e), None)
        })?;
        info!(command = %spec.display(), pid = ?child.id(), "spawned runtime");

        let Some(stdout) = child.stdout.take() else {
            return Err(SessionError::startup(
                "runtime stdout was not captured",
                Some(ProcessHandle::new(child)),
            ));
        };

        Ok(Launched {
            process: Some(ProcessHandle::new(child)),
            stdout: Box::new(BufReader::new(stdout)),
        })
    }
}
