//! Command-line interface definitions shared by the three subcommands.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{SessionOptions, DEFAULT_SERVER_TIMEOUT_SECS};
use crate::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "viasock",
    about = "Keep slow-starting filter programs resident behind a Unix-domain socket",
    version,
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a command through its resident server, spawning one on demand.
    Run {
        #[command(flatten)]
        framing: FramingArgs,

        #[command(flatten)]
        daemon: DaemonArgs,

        /// Program to keep resident.
        program: String,

        /// Arguments passed to the program.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Serve one command behind a socket (normally spawned by `run`).
    Server {
        #[command(flatten)]
        framing: FramingArgs,

        #[command(flatten)]
        daemon: DaemonArgs,

        /// Socket path to bind.
        socket: PathBuf,

        /// Command fingerprint this server was spawned for.
        hash: String,

        /// Program to keep resident.
        program: String,

        /// Arguments passed to the program.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Connect this process's stdio to an existing server socket.
    Client {
        #[command(flatten)]
        framing: FramingArgs,

        /// Socket path to connect to.
        socket: PathBuf,
    },
}

/// Record framing flags, shared by all three subcommands.
#[derive(Debug, Clone, Args)]
pub struct FramingArgs {
    /// Input record terminator pattern (empty matches every line).
    #[arg(
        short = 't',
        long = "input-terminator",
        value_name = "PATTERN",
        default_value = ""
    )]
    pub input_terminator: String,

    /// Output record terminator pattern (empty matches every line).
    #[arg(
        short = 'T',
        long = "output-terminator",
        value_name = "PATTERN",
        default_value = ""
    )]
    pub output_terminator: String,

    /// Number of prelude records the child emits at startup.
    #[arg(short = 'P', long = "prelude", value_name = "INT", default_value_t = 0)]
    pub prelude: usize,
}

/// Timeout and log flags, shared by `run` and `server`.
#[derive(Debug, Clone, Args)]
pub struct DaemonArgs {
    /// Per-record child response timeout in seconds (unbounded when absent).
    #[arg(
        short = 'w',
        long = "process-timeout",
        value_name = "SECONDS",
        allow_negative_numbers = true
    )]
    pub process_timeout: Option<f64>,

    /// Idle-server timeout in seconds.
    #[arg(
        short = 'W',
        long = "server-timeout",
        value_name = "SECONDS",
        default_value_t = DEFAULT_SERVER_TIMEOUT_SECS,
        allow_negative_numbers = true
    )]
    pub server_timeout: f64,

    /// Server log path (rotating file, ~1 MiB with 5 backups).
    #[arg(short = 'l', long = "log", value_name = "PATH")]
    pub log: Option<PathBuf>,
}

/// Build validated [`SessionOptions`] from parsed flags.
///
/// The `client` subcommand carries no [`DaemonArgs`]; its timeouts stay at
/// their defaults, which keeps the fingerprint fields deterministic.
///
/// # Errors
///
/// Returns [`AppError::Config`] for non-finite or negative timeout values or
/// an invalid terminator pattern.
pub fn session_options(
    framing: &FramingArgs,
    daemon: Option<&DaemonArgs>,
) -> Result<SessionOptions> {
    let mut options = SessionOptions {
        input_terminator: framing.input_terminator.clone(),
        output_terminator: framing.output_terminator.clone(),
        prelude_count: framing.prelude,
        ..SessionOptions::default()
    };

    if let Some(daemon) = daemon {
        options.process_timeout = daemon
            .process_timeout
            .map(|secs| seconds("-w", secs))
            .transpose()?;
        options.server_timeout = seconds("-W", daemon.server_timeout)?;
        options.log_path = daemon.log.clone();
    }

    options.validate()?;
    Ok(options)
}

fn seconds(flag: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Config(format!(
            "{flag} must be a non-negative number of seconds, got {value}"
        )));
    }
    Ok(Duration::from_secs_f64(value))
}
