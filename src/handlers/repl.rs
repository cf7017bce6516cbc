//! Line-oriented REPL: each stdin line is one evaluation.

use std::io::{self, Write};

use anyhow::Result;
use is_terminal::IsTerminal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use leinrepl::printer::ResultPrinter;
use leinrepl::session::RuntimeSession;

pub struct ReplHandler;

impl ReplHandler {
    /// Read lines until EOF. Failed evaluations are reported and the loop continues.
    pub async fn run(session: &mut RuntimeSession, printer: &ResultPrinter) -> Result<()> {
        let interactive = io::stdin().is_terminal();
        let mut ns = "user".to_string();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            if interactive {
                print!("{}", printer.prompt(&ns));
                io::stdout().flush()?;
            }
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let code = line.trim();
            if code.is_empty() {
                continue;
            }
            match session.eval(code).await {
                Ok(result) => {
                    if let Some(current) = &result.ns {
                        ns = current.clone();
                    }
                    printer.print(&result);
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    if !session.is_running() {
                        debug!("runtime went away, leaving repl");
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
