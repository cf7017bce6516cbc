//! Launch a headless Leiningen nREPL server and talk to it.
//!
//! ```no_run
//! # async fn demo() -> leinrepl::Result<()> {
//! use leinrepl::{RuntimeSession, SessionOptions};
//!
//! let mut session = RuntimeSession::start(SessionOptions::default()).await?;
//! let result = session.eval("(+ 1 2)").await?;
//! assert_eq!(result.value.as_deref(), Some("3"));
//! session.terminate(false).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod nrepl;
pub mod printer;
pub mod process;
pub mod session;

pub use error::{Result, SessionError};
pub use session::{EvalResult, RuntimeSession, SessionOptions, SessionState};
