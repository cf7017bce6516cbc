//! One-shot handler: evaluate the `-e` forms in order.

use anyhow::{Context, Result};

use leinrepl::printer::ResultPrinter;
use leinrepl::session::RuntimeSession;

pub struct EvalHandler;

impl EvalHandler {
    /// Stops at the first failing form.
    pub async fn run(session: &RuntimeSession, forms: &[String], printer: &ResultPrinter) -> Result<()> {
        for code in forms {
            let result = session
                .eval(code)
                .await
                .with_context(|| format!("evaluating {}", code))?;
            printer.print(&result);
        }
        Ok(())
    }
}
