//! Error taxonomy for session operations.

use std::time::Duration;

use thiserror::Error;

use crate::process::ProcessHandle;

/// Convenience result alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by [`RuntimeSession`](crate::session::RuntimeSession) and the nREPL client.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A caller-supplied argument was rejected before anything was spawned.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The runtime never reported a ready line.
    ///
    /// `process` holds the spawned child (if any) so the caller can inspect or
    /// kill it. Dropping it kills the process.
    #[error("runtime failed to start: {reason}")]
    StartupFailure {
        reason: String,
        process: Option<Box<ProcessHandle>>,
    },

    /// The nREPL endpoint could not be reached or dropped mid-exchange.
    #[error("nREPL connection to {uri} failed: {source}")]
    ConnectionFailure {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    /// A response lacked one of `session`, `ns` or `value` (strict mode only).
    #[error("nREPL response is missing `{0}`")]
    ProtocolShapeMismatch(&'static str),

    /// The wire data could not be decoded.
    #[error("malformed nREPL message: {0}")]
    Protocol(String),

    /// Killing or reaping the runtime process failed.
    #[error("failed to terminate runtime process: {0}")]
    Terminate(#[source] std::io::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The session was shut down or its process died.
    #[error("session is closed")]
    SessionClosed,
}

impl SessionError {
    pub(crate) fn startup(reason: impl Into<String>, process: Option<ProcessHandle>) -> Self {
        SessionError::StartupFailure {
            reason: reason.into(),
            process: process.map(Box::new),
        }
    }

    pub(crate) fn connection(uri: &str, source: std::io::Error) -> Self {
        SessionError::ConnectionFailure {
            uri: uri.to_string(),
            source,
        }
    }

    /// Take ownership of the process carried by a startup failure.
    pub fn into_process(self) -> Option<ProcessHandle> {
        match self {
            SessionError::StartupFailure { process, .. } => process.map(|p| *p),
            _ => None,
        }
    }
}
