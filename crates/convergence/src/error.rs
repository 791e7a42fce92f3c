//! Item-level error types.
//!
//! Errors here never abort a run. The engine records them on the item
//! outcome and moves on to the next item.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading, backing up or writing a single item.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The action needs privileges the process does not have
    #[error("permission denied: {message}")]
    Permission {
        /// What was being attempted
        message: String,
    },

    /// The command or file the item depends on does not exist
    #[error("not found: {what}")]
    NotFound {
        /// Name of the missing command or path
        what: String,
    },

    /// An external command ran but exited unsuccessfully
    #[error("`{command}` failed ({status}): {stderr}")]
    Command {
        /// The command line that was run
        command: String,
        /// Exit code, or "signal" when killed
        status: String,
        /// Trimmed stderr of the command
        stderr: String,
    },

    /// The writer rejected the desired value
    #[error("{message}")]
    Apply {
        /// Why the value could not be applied
        message: String,
    },

    /// Any other filesystem failure
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ItemError {
    /// Classify an `io::Error` raised while touching `path`.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::Permission {
                message: format!("cannot access {}", path.display()),
            },
            io::ErrorKind::NotFound => Self::NotFound {
                what: path.display().to_string(),
            },
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Build an `Apply` error from a message.
    pub fn apply(message: impl Into<String>) -> Self {
        Self::Apply {
            message: message.into(),
        }
    }

    /// Taxonomy name recorded in results.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Permission { .. } => "PrivilegeError",
            Self::NotFound { .. } | Self::Command { .. } => "ExternalToolError",
            Self::Apply { .. } => "ApplyError",
            Self::Io { .. } => "IoError",
        }
    }
}

/// Result alias for item operations
pub type Result<T, E = ItemError> = std::result::Result<T, E>;
