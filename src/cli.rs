use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "leinrepl", about = "Evaluate Clojure in a headless Leiningen nREPL", version)]
pub struct Cli {
    /// Fixed nREPL port (default: let the runtime pick one).
    #[arg(long, allow_negative_numbers = true)]
    pub port: Option<i64>,

    /// Host to connect to once the server is up.
    #[arg(long)]
    pub host: Option<String>,

    /// Leiningen executable.
    #[arg(long = "lein")]
    pub lein: Option<String>,

    /// Give up waiting for the server after this many seconds.
    #[arg(long = "startup-timeout", value_parser = clap::value_parser!(f64))]
    pub startup_timeout: Option<f64>,

    /// Give up on a single evaluation after this many seconds.
    #[arg(long = "eval-timeout", value_parser = clap::value_parser!(f64))]
    pub eval_timeout: Option<f64>,

    /// Fail when a response lacks `session`, `ns` or `value`.
    #[arg(long)]
    pub strict: bool,

    /// Print each response as JSON.
    #[arg(long)]
    pub json: bool,

    /// Evaluate a form and exit. Can be used multiple times: -e '(def x 1)' -e 'x'
    #[arg(short = 'e', long = "eval", value_name = "CODE", action = clap::ArgAction::Append)]
    pub eval: Vec<String>,

    /// Kill the runtime instead of asking it to exit.
    #[arg(long)]
    pub force: bool,

    /// More logging (-v info, -vv debug).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repeated_eval() {
        let cli = Cli::try_parse_from(["leinrepl", "-e", "(def x 1)", "--eval", "x", "--port", "7888"]).unwrap();
        assert_eq!(cli.eval, vec!["(def x 1)", "x"]);
        assert_eq!(cli.port, Some(7888));
        assert!(!cli.json);
    }

    #[test]
    fn test_negative_port_reaches_validation() {
        let cli = Cli::try_parse_from(["leinrepl", "--port", "-1"]).unwrap();
        assert_eq!(cli.port, Some(-1));
    }
}
