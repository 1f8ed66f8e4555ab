//! Session option validation and terminator-pattern compilation.

use std::path::PathBuf;
use std::time::Duration;

use regex::bytes::Regex;

use crate::{AppError, Result};

/// Default idle-server timeout in seconds.
pub const DEFAULT_SERVER_TIMEOUT_SECS: f64 = 60.0;

/// Options shared by the `run`, `server`, and `client` subcommands.
///
/// Terminator patterns are kept as strings here because they participate in
/// the command fingerprint byte-for-byte; compiled regexes are derived on
/// demand. The `client` subcommand carries only the framing fields and leaves
/// the timeouts at their defaults.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Input record terminator pattern; empty matches every line.
    pub input_terminator: String,
    /// Output record terminator pattern; empty matches every line.
    pub output_terminator: String,
    /// Number of prelude records the child emits at startup.
    pub prelude_count: usize,
    /// Upper bound on the child's response time per record; `None` is unbounded.
    pub process_timeout: Option<Duration>,
    /// Idle shutdown bound for the server.
    pub server_timeout: Duration,
    /// Server log file; rotated at roughly 1 MiB with 5 backups.
    pub log_path: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            input_terminator: String::new(),
            output_terminator: String::new(),
            prelude_count: 0,
            process_timeout: None,
            server_timeout: Duration::from_secs_f64(DEFAULT_SERVER_TIMEOUT_SECS),
            log_path: None,
        }
    }
}

impl SessionOptions {
    /// Compile both terminator patterns, rejecting invalid ones early.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if either pattern fails to compile.
    pub fn validate(&self) -> Result<()> {
        self.input_pattern()?;
        self.output_pattern()?;
        Ok(())
    }

    /// Compiled input terminator pattern.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the pattern fails to compile.
    pub fn input_pattern(&self) -> Result<Regex> {
        compile(&self.input_terminator)
    }

    /// Compiled output terminator pattern.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the pattern fails to compile.
    pub fn output_pattern(&self) -> Result<Regex> {
        compile(&self.output_terminator)
    }

    /// Process timeout rendered for the fingerprint (`none` when unset).
    #[must_use]
    pub fn process_timeout_field(&self) -> String {
        self.process_timeout
            .map_or_else(|| "none".to_owned(), |d| d.as_secs_f64().to_string())
    }

    /// Server timeout rendered for the fingerprint.
    #[must_use]
    pub fn server_timeout_field(&self) -> String {
        self.server_timeout.as_secs_f64().to_string()
    }

    /// Log path rendered for the fingerprint (empty when unset).
    #[must_use]
    pub fn log_path_field(&self) -> String {
        self.log_path
            .as_ref()
            .map_or_else(String::new, |p| p.display().to_string())
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|err| AppError::Config(format!("invalid terminator pattern '{pattern}': {err}")))
}
