//! One headless nREPL runtime: startup, evaluation and shutdown.
//!
//! A [`RuntimeSession`] owns the spawned process for its whole lifetime.
//! Startup blocks until the runtime prints its ready line, unless
//! [`SessionOptions::startup_timeout`] bounds the wait. Every `eval` opens a
//! fresh nREPL connection, so concurrent evals on one session never share a
//! socket.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SessionError};
use crate::nrepl::{self, Connection};
use crate::process::lein::LeinLauncher;
use crate::process::{LaunchSpec, Launched, Launcher, ProcessHandle};

pub mod result;

pub use result::EvalResult;

/// Substring of the stdout line announcing that the server is listening.
pub const READY_MARKER: &str = "server started";

/// Code sent by [`RuntimeSession::exit`] to make the runtime stop itself.
pub const EXIT_CODE: &str = "(System/exit 0)";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PROGRAM: &str = "lein";
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Fixed port to pass as `:port`. Validated at start; `None` lets the runtime pick.
    pub port: Option<i64>,
    pub host: String,
    /// Build tool executable.
    pub program: String,
    /// Upper bound on the ready-line wait. `None` waits forever.
    pub startup_timeout: Option<Duration>,
    /// Upper bound applied to every `eval`. `None` waits forever.
    pub eval_timeout: Option<Duration>,
    /// How long `terminate(false)` waits after the exit request before killing.
    pub exit_grace: Duration,
    /// Reject responses missing `session`, `ns` or `value`.
    pub strict_responses: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            port: None,
            host: DEFAULT_HOST.to_string(),
            program: DEFAULT_PROGRAM.to_string(),
            startup_timeout: None,
            eval_timeout: None,
            exit_grace: DEFAULT_EXIT_GRACE,
            strict_responses: false,
        }
    }
}

impl SessionOptions {
    pub fn with_port(mut self, port: i64) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_startup_timeout(mut self, limit: Duration) -> Self {
        self.startup_timeout = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Port resolved; evals may be issued.
    Ready,
    /// `exit`/`terminate` was called or the process was seen to have died.
    Exited,
}

#[derive(Debug)]
pub struct RuntimeSession {
    host: String,
    port: u16,
    process: Option<ProcessHandle>,
    drain: Option<JoinHandle<()>>,
    state: SessionState,
    options: SessionOptions,
}

impl RuntimeSession {
    /// Launch `lein repl :headless` and wait for it to report its port.
    pub async fn start(options: SessionOptions) -> Result<Self> {
        Self::start_with(&LeinLauncher, options).await
    }

    pub async fn start_with<L>(launcher: &L, options: SessionOptions) -> Result<Self>
    where
        L: Launcher + ?Sized,
    {
        let requested = validate_port(options.port)?;
        let spec = LaunchSpec::new(options.program.clone(), requested);
        let Launched {
            mut process,
            mut stdout,
        } = launcher.spawn(&spec)?;

        let scan = await_ready(&mut stdout);
        let found = match options.startup_timeout {
            Some(limit) => match tokio::time::timeout(limit, scan).await {
                Ok(found) => found,
                Err(_) => Err(format!("no ready line within {:?}", limit)),
            },
            None => scan.await,
        };

        let reported = match found {
            Ok(port) => port,
            Err(mut reason) => {
                if let Some(status) = process.as_mut().and_then(ProcessHandle::exit_status) {
                    reason = format!("{} (runtime {})", reason, ProcessHandle::format_exit_status(&status));
                }
                warn!(command = %spec.display(), %reason, "runtime startup failed");
                return Err(SessionError::startup(reason, process));
            }
        };

        let port = match requested {
            Some(port) if port != reported => {
                return Err(SessionError::startup(
                    format!("requested port {} but runtime reported {}", port, reported),
                    process,
                ));
            }
            Some(port) => port,
            None => reported,
        };
        info!(host = %options.host, port, "nREPL server ready");

        let drain = tokio::spawn(drain_output(stdout));
        Ok(Self {
            host: options.host.clone(),
            port,
            process,
            drain: Some(drain),
            state: SessionState::Ready,
            options,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn uri(&self) -> String {
        nrepl::uri(&self.host, self.port)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(ProcessHandle::pid)
    }

    /// Poll the process; a dead process moves the session to `Exited`.
    pub fn is_running(&mut self) -> bool {
        if self.state == SessionState::Exited {
            return false;
        }
        let running = match self.process.as_mut() {
            Some(process) => process.is_running(),
            None => true,
        };
        if !running {
            debug!(port = self.port, "runtime process has exited");
            self.state = SessionState::Exited;
        }
        running
    }

    /// Evaluate `code` and return the first response message.
    ///
    /// Responses missing `session`, `ns` or `value` are returned as-is unless
    /// `strict_responses` is set.
    pub async fn eval(&self, code: &str) -> Result<EvalResult> {
        match self.options.eval_timeout {
            Some(limit) => self.eval_with_timeout(code, limit).await,
            None => self.eval_once(code).await,
        }
    }

    pub async fn eval_with_timeout(&self, code: &str, limit: Duration) -> Result<EvalResult> {
        tokio::time::timeout(limit, self.eval_once(code))
            .await
            .map_err(|_| SessionError::Timeout(limit))?
    }

    async fn eval_once(&self, code: &str) -> Result<EvalResult> {
        if self.state == SessionState::Exited {
            return Err(SessionError::SessionClosed);
        }
        let uri = self.uri();
        let mut conn = Connection::connect(&uri).await?;
        conn.write(&nrepl::eval_request(code)).await?;
        let result = EvalResult::from_message(conn.read().await?);
        debug!(uri = %conn.uri(), ns = ?result.ns, value = ?result.value, "eval response");

        if self.options.strict_responses {
            return result.require_complete();
        }
        if !result.is_complete() {
            debug!(keys = ?result.extra.keys().collect::<Vec<_>>(), "passing through partial eval response");
        }
        Ok(result)
    }

    /// Ask the runtime to exit. Does not wait for a reply or reap the process.
    pub async fn exit(&mut self) {
        if self.state == SessionState::Exited {
            return;
        }
        self.state = SessionState::Exited;
        let uri = self.uri();
        let sent = async {
            let mut conn = Connection::connect(&uri).await?;
            conn.write(&nrepl::eval_request(EXIT_CODE)).await
        }
        .await;
        match sent {
            Ok(()) => info!(%uri, "exit requested"),
            Err(e) => warn!(%uri, error = %e, "failed to send exit request"),
        }
    }

    /// Shut the runtime down and reap it.
    ///
    /// Without `force` the exit request is sent first and the process gets
    /// `exit_grace` to stop; it is killed after that. With `force` it is
    /// killed straight away. Calling this again returns the recorded status.
    pub async fn terminate(&mut self, force: bool) -> Result<Option<ExitStatus>> {
        if !force {
            self.exit().await;
        }
        self.state = SessionState::Exited;

        let grace = self.options.exit_grace;
        let status = match self.process.as_mut() {
            None => None,
            Some(process) => {
                let mut status = process.exit_status();
                if status.is_none() && !force {
                    status = process.wait_timeout(grace).await;
                }
                if status.is_none() {
                    info!(pid = ?process.pid(), "killing runtime process");
                    status = process.kill().await.map_err(SessionError::Terminate)?;
                }
                status
            }
        };
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
        if let Some(status) = &status {
            info!(port = self.port, status = %ProcessHandle::format_exit_status(status), "runtime stopped");
        }
        Ok(status)
    }
}

impl Drop for RuntimeSession {
    fn drop(&mut self) {
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
    }
}

/// Check a caller-supplied port. `None` passes through.
pub fn validate_port(port: Option<i64>) -> Result<Option<u16>> {
    match port {
        None => Ok(None),
        Some(p) if p < 1 => Err(SessionError::InvalidArgument(format!(
            "port must be greater than zero: {} given",
            p
        ))),
        Some(p) => u16::try_from(p).map(Some).map_err(|_| {
            SessionError::InvalidArgument(format!("port must be at most {}: {} given", u16::MAX, p))
        }),
    }
}

/// Parse a port given as text (config or environment).
pub fn parse_port(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| SessionError::InvalidArgument(format!("port must be an integer: {:?} given", raw)))
}

/// The port announced on a ready line: the field after the first `port` token.
pub fn ready_line_port(line: &str) -> Option<u16> {
    let (_, rest) = line.split_once("port")?;
    rest.split_whitespace().next()?.parse().ok()
}

async fn await_ready<R>(reader: &mut R) -> std::result::Result<u16, String>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| format!("reading runtime output failed: {}", e))?;
        if n == 0 {
            return Err("runtime output ended before the server started".to_string());
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end();
        trace!(%line, "runtime output");
        if line.contains(READY_MARKER) {
            info!(%line, "ready line");
            return ready_line_port(line).ok_or_else(|| format!("no port on ready line: {:?}", line));
        }
    }
}

/// Keep reading stdout after startup so the runtime never blocks on a full pipe.
async fn drain_output(mut reader: Box<dyn AsyncBufRead + Send + Unpin>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                trace!(line = %line.trim_end(), "runtime output");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READY: &str = "nREPL server started on port 57041 on host 127.0.0.1 - nrepl://127.0.0.1:57041";

    #[test]
    fn test_ready_line_port() {
        assert_eq!(ready_line_port(READY), Some(57041));
        assert_eq!(ready_line_port("nREPL server started on port   7888\n"), Some(7888));
        assert_eq!(ready_line_port("nREPL server started"), None);
        assert_eq!(ready_line_port("server started on port abc"), None);
    }

    #[test]
    fn test_default_options() {
        let opts = SessionOptions::default();
        assert_eq!(opts.host, "localhost");
        assert_eq!(opts.program, "lein");
        assert_eq!(opts.port, None);
    }

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port(None).unwrap(), None);
        assert_eq!(validate_port(Some(7888)).unwrap(), Some(7888));
        assert!(matches!(validate_port(Some(0)), Err(SessionError::InvalidArgument(_))));
        assert!(matches!(validate_port(Some(-5)), Err(SessionError::InvalidArgument(_))));
        assert!(matches!(validate_port(Some(70000)), Err(SessionError::InvalidArgument(_))));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(" 7888 ").unwrap(), 7888);
        assert!(matches!(parse_port("78.5"), Err(SessionError::InvalidArgument(_))));
        assert!(matches!(parse_port("abc"), Err(SessionError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_await_ready_skips_noise() {
        let out = format!("Retrieving deps...\n{}\nmore\n", READY);
        let mut reader = out.as_bytes();
        assert_eq!(await_ready(&mut reader).await, Ok(57041));
    }

    #[tokio::test]
    async fn test_await_ready_eof() {
        let mut reader: &[u8] = b"Could not find artifact\n";
        assert!(await_ready(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_await_ready_last_line_without_newline() {
        let mut reader = READY.as_bytes();
        assert_eq!(await_ready(&mut reader).await, Ok(57041));
    }
}
