//! Tracing setup with an optional size-rotating log file.
//!
//! Diagnostics go to stderr by default. With a log path (the `-l` flag) they
//! go to a rotating file instead: when a write would push the current file
//! past [`MAX_LOG_BYTES`], the file is renamed to `<path>.1` (existing
//! backups shift up, the oldest of [`LOG_BACKUPS`] is dropped) and a fresh
//! file is opened. Detached servers have null stderr, so the file is their
//! only diagnostic surface.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use crate::{AppError, Result};

/// Rotation threshold per log file.
pub const MAX_LOG_BYTES: u64 = 1024 * 1024;

/// Number of rotated backup files kept.
pub const LOG_BACKUPS: u32 = 5;

/// Initialise the global tracing subscriber.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`.
///
/// # Errors
///
/// Returns [`AppError::Config`] if a subscriber is already installed or the
/// log directory cannot be created.
pub fn init(log_path: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter);

    match log_path {
        None => subscriber
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        AppError::Config(format!(
                            "failed to create log directory {}: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }
            let handle = RotatingWriter::new(path.to_owned()).into_handle();
            subscriber
                .with_ansi(false)
                .with_writer(move || handle.clone())
                .try_init()
                .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?;
        }
    }

    Ok(())
}

/// Internal state protected by a mutex.
struct WriterState {
    file: File,
    written: u64,
}

/// A size-rotating log file writer.
///
/// The file is opened lazily on first write and reopened after each
/// rotation. Rotation is decided per write, so a single oversized line can
/// exceed the threshold by its own length but never splits.
pub struct RotatingWriter {
    path: PathBuf,
    max_bytes: u64,
    backups: u32,
    state: Mutex<Option<WriterState>>,
}

impl RotatingWriter {
    /// Construct a writer with the default limits.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self::with_limits(path, MAX_LOG_BYTES, LOG_BACKUPS)
    }

    /// Construct a writer with explicit limits.
    #[must_use]
    pub fn with_limits(path: PathBuf, max_bytes: u64, backups: u32) -> Self {
        Self {
            path,
            max_bytes,
            backups,
            state: Mutex::new(None),
        }
    }

    /// Wrap in the cloneable handle `tracing_subscriber` hands out per write.
    #[must_use]
    pub fn into_handle(self) -> RotatingHandle {
        RotatingHandle(Arc::new(self))
    }

    fn append(&self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| std::io::Error::other("log writer mutex poisoned"))?;

        if guard.is_none() {
            *guard = Some(self.open()?);
        }

        let needs_rotation = guard
            .as_ref()
            .is_some_and(|s| s.written > 0 && s.written + buf.len() as u64 > self.max_bytes);
        if needs_rotation {
            *guard = None;
            self.rotate()?;
            *guard = Some(self.open()?);
        }

        if let Some(state) = guard.as_mut() {
            state.file.write_all(buf)?;
            state.written += buf.len() as u64;
        }
        Ok(buf.len())
    }

    fn sync(&self) -> std::io::Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| std::io::Error::other("log writer mutex poisoned"))?;
        if let Some(state) = guard.as_mut() {
            state.file.flush()?;
        }
        Ok(())
    }

    fn open(&self) -> std::io::Result<WriterState> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(WriterState { file, written })
    }

    /// Shift the backup chain up by one and move the live file to `.1`.
    fn rotate(&self) -> std::io::Result<()> {
        for index in (1..self.backups).rev() {
            // Gaps in the chain are normal early on.
            let _ = std::fs::rename(self.numbered(index), self.numbered(index + 1));
        }
        match std::fs::rename(&self.path, self.numbered(1)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn numbered(&self, index: u32) -> PathBuf {
        PathBuf::from(format!("{}.{index}", self.path.display()))
    }
}

/// Cloneable [`Write`] handle over a shared [`RotatingWriter`].
#[derive(Clone)]
pub struct RotatingHandle(Arc<RotatingWriter>);

impl Write for RotatingHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.append(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.sync()
    }
}
