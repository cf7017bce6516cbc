mod cli;
mod handlers;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use is_terminal::IsTerminal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use leinrepl::config::Config;
use leinrepl::printer::ResultPrinter;
use leinrepl::process::ProcessHandle;
use leinrepl::{RuntimeSession, SessionError};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let cfg = Config::load();

    init_tracing(&cfg, args.verbose);

    // CLI overrides config
    let mut opts = cfg
        .session_options()
        .with_context(|| format!("invalid settings in {}", cfg.config_path.display()))?;
    if let Some(port) = args.port {
        opts = opts.with_port(port);
    }
    if let Some(host) = &args.host {
        opts = opts.with_host(host.as_str());
    }
    if let Some(lein) = &args.lein {
        opts.program = lein.clone();
    }
    if let Some(secs) = args.startup_timeout {
        opts.startup_timeout = positive_secs(secs, "--startup-timeout")?;
    }
    if let Some(secs) = args.eval_timeout {
        opts.eval_timeout = positive_secs(secs, "--eval-timeout")?;
    }
    if args.strict {
        opts.strict_responses = true;
    }

    let mut session = match RuntimeSession::start(opts).await {
        Ok(session) => session,
        Err(err @ SessionError::StartupFailure { .. }) => {
            let message = err.to_string();
            if let Some(mut process) = err.into_process() {
                if let Ok(Some(status)) = process.kill().await {
                    info!(status = %ProcessHandle::format_exit_status(&status), "killed runtime after failed startup");
                }
            }
            bail!(message);
        }
        Err(err) => return Err(err.into()),
    };
    eprintln!("nREPL server started on {}", session.uri());

    let printer = ResultPrinter {
        json: args.json,
        color: std::io::stdout().is_terminal() && !args.json,
    };
    let outcome = if args.eval.is_empty() {
        handlers::repl::ReplHandler::run(&mut session, &printer).await
    } else {
        handlers::eval::EvalHandler::run(&session, &args.eval, &printer).await
    };

    let stopped = session.terminate(args.force).await;
    outcome?;
    stopped.context("shutting down the runtime")?;
    Ok(())
}

fn positive_secs(secs: f64, flag: &str) -> Result<Option<Duration>> {
    if !secs.is_finite() || secs < 0.0 {
        bail!("{} must be a non-negative number of seconds", flag);
    }
    Ok((secs > 0.0).then(|| Duration::from_secs_f64(secs)))
}

/// Verbosity flags > RUST_LOG > LOG_LEVEL from config. Logs go to stderr.
fn init_tracing(cfg: &Config, verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(cfg.get("LOG_LEVEL").unwrap_or_else(|| "warn".to_string()))
        }),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .init();
}
