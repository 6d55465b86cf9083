use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Every way an ffcmd operation can fail.
///
/// The enum is closed on purpose: builder contract violations surface as
/// [`Error::Argument`] at build time, everything that can happen to a running
/// process maps onto exactly one of the remaining kinds. I/O sources are
/// wrapped in [`Arc`] so a terminal result can be handed out of a shared
/// [`ExecutionHandle`](crate::ExecutionHandle) more than once.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("ffmpeg executable not found in system PATH. Searched paths: {searched_paths:?}")]
    ExecutableNotFound { searched_paths: Vec<PathBuf> },

    #[error("Invalid ffmpeg executable at '{path}': {reason}")]
    InvalidExecutable { path: PathBuf, reason: String },

    /// Invalid builder state: conflicting flags, missing required fields,
    /// zero inputs or outputs. Raised synchronously by `build()`, never from
    /// the asynchronous execution path.
    #[error("{0}")]
    Argument(String),

    /// The external binary could not be started.
    #[error("Failed to spawn process '{program}': {source}")]
    Spawn {
        program: String,
        source: Arc<io::Error>,
    },

    /// I/O failure while relaying a child stream into a sink.
    #[error("Failed to relay process output: {source}")]
    Relay { source: Arc<io::Error> },

    /// The process exited with a non-zero status, classified by
    /// [`classify_exit`](crate::classify::classify_exit).
    #[error("{message}")]
    NonZeroExit {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("timed out waiting for the process to finish")]
    Timeout,

    /// The handle was cancelled. A distinct terminal kind, never produced by
    /// the process itself.
    #[error("the execution was cancelled")]
    Cancelled,

    /// A control operation (interrupt) on a running process failed.
    #[error("Failed to {action} the process: {source}")]
    Control {
        action: &'static str,
        source: Arc<io::Error>,
    },
}

impl Error {
    pub(crate) fn spawn(program: impl Into<String>, source: io::Error) -> Self {
        Error::Spawn {
            program: program.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn relay(source: io::Error) -> Self {
        Error::Relay {
            source: Arc::new(source),
        }
    }

    pub(crate) fn control(action: &'static str, source: io::Error) -> Self {
        Error::Control {
            action,
            source: Arc::new(source),
        }
    }
}
