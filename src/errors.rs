//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Flag validation or terminator-pattern compilation failure.
    Config(String),
    /// Listening socket could not be bound (path already in use).
    Bind(String),
    /// Socket file does not exist at the expected path.
    SocketAbsent(String),
    /// Socket file exists but no server accepted the connection.
    Refused(String),
    /// Stream ended in the middle of a record.
    IncompleteRecord(String),
    /// Child response or child exit exceeded its deadline.
    Timeout(String),
    /// Child violated the one-output-record-per-input contract.
    Protocol(String),
    /// Child process spawn, write, or exit-status failure.
    Child(String),
    /// File-system or transport I/O failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Bind(msg) => write!(f, "bind: {msg}"),
            Self::SocketAbsent(msg) => write!(f, "socket absent: {msg}"),
            Self::Refused(msg) => write!(f, "connection refused: {msg}"),
            Self::IncompleteRecord(msg) => write!(f, "incomplete record: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Child(msg) => write!(f, "child: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
