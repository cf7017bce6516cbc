use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use directories::BaseDirs;

use crate::error::Result;
use crate::session::{parse_port, SessionOptions, DEFAULT_HOST, DEFAULT_PROGRAM};

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&default_config_path())
    }

    /// Read `KEY=VALUE` lines from `config_path` (if it exists), then overlay the environment.
    pub fn load_from(config_path: &Path) -> Self {
        let mut map = default_map();

        if config_path.exists() {
            if let Ok(file) = fs::File::open(config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(|l| l.ok()) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Environment takes precedence over the file
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self {
            inner: map,
            config_path: config_path.to_path_buf(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Ok(v) = env::var(key) {
            return Some(v);
        }
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Seconds as a duration. Missing, unparsable or non-positive values mean "no limit".
    pub fn get_secs(&self, key: &str) -> Option<Duration> {
        self.get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }

    pub fn session_options(&self) -> Result<SessionOptions> {
        let mut opts = SessionOptions::default();
        if let Some(program) = self.get("LEIN_COMMAND").filter(|v| !v.trim().is_empty()) {
            opts.program = program;
        }
        if let Some(host) = self.get("NREPL_HOST").filter(|v| !v.trim().is_empty()) {
            opts.host = host;
        }
        if let Some(port) = self.get("NREPL_PORT").filter(|v| !v.trim().is_empty()) {
            opts.port = Some(parse_port(&port)?);
        }
        opts.startup_timeout = self.get_secs("STARTUP_TIMEOUT");
        opts.eval_timeout = self.get_secs("EVAL_TIMEOUT");
        if let Some(grace) = self.get_secs("EXIT_GRACE_PERIOD") {
            opts.exit_grace = grace;
        }
        opts.strict_responses = self.get_bool("STRICT_RESPONSES");
        Ok(opts)
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "LEIN_COMMAND",
        "NREPL_HOST",
        "NREPL_PORT",
        "STARTUP_TIMEOUT",
        "EVAL_TIMEOUT",
        "EXIT_GRACE_PERIOD",
        "STRICT_RESPONSES",
        "LOG_LEVEL",
    ];

    KEYS.contains(&k) || k.starts_with("LEINREPL_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("leinrepl").join(".leinreplrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("LEIN_COMMAND".into(), DEFAULT_PROGRAM.into());
    m.insert("NREPL_HOST".into(), DEFAULT_HOST.into());
    m.insert("STARTUP_TIMEOUT".into(), "0".into());
    m.insert("EVAL_TIMEOUT".into(), "0".into());
    m.insert("EXIT_GRACE_PERIOD".into(), "5".into());
    m.insert("STRICT_RESPONSES".into(), "false".into());
    m.insert("LOG_LEVEL".into(), "warn".into());
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use std::io::Write;

    fn write_rc(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load_from(Path::new("/nonexistent/leinrepl/.leinreplrc"));
        let opts = cfg.session_options().unwrap();
        assert_eq!(opts.program, "lein");
        assert_eq!(opts.port, None);
        assert_eq!(opts.startup_timeout, None);
        assert_eq!(opts.exit_grace, Duration::from_secs(5));
        assert!(!opts.strict_responses);
    }

    #[test]
    fn test_file_values() {
        let rc = write_rc(
            "# leinrepl\nSTARTUP_TIMEOUT = 30\nEXIT_GRACE_PERIOD=0.5\nLEINREPL_FLAG=true\n",
        );
        let cfg = Config::load_from(rc.path());
        assert_eq!(cfg.get_secs("STARTUP_TIMEOUT"), Some(Duration::from_secs(30)));
        assert_eq!(cfg.get_secs("EXIT_GRACE_PERIOD"), Some(Duration::from_millis(500)));
        assert!(cfg.get_bool("LEINREPL_FLAG"));
        assert_eq!(cfg.get_secs("EVAL_TIMEOUT"), None);
    }

    #[test]
    fn test_non_integer_port_is_invalid() {
        let rc = write_rc("NREPL_PORT=seven\n");
        let cfg = Config::load_from(rc.path());
        if env::var("NREPL_PORT").is_ok() {
            return;
        }
        assert!(matches!(
            cfg.session_options(),
            Err(SessionError::InvalidArgument(_))
        ));
    }
}
