//! Runtime error taxonomy for device sessions

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a single device session.
///
/// None of these are fatal to the process: the caller logs them and keeps
/// the other sessions running.
#[derive(Debug, Error)]
pub enum RemapError {
    /// No input device matched the configured selectors
    #[error("input device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to open input device {path:?}: {source}")]
    OpenDevice {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another process already holds the grab (or we lack permission)
    #[error("failed to grab input device {path:?}: {source}")]
    ExclusiveAccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create virtual device: {0}")]
    VirtualDevice(#[source] io::Error),

    /// The virtual device was removed or closed under us
    #[error("failed to write to virtual device: {0}")]
    OutputWrite(#[source] io::Error),

    #[error("failed to read input events: {0}")]
    InputRead(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, RemapError>;
