use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the capture engine.
///
/// Only the start-time variants reach the caller of `start_record`. Failures
/// inside the capture loop end the session and are reported to the frame sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("i/o failure: {0}")]
    Io(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Errors surfaced by the playback engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("i/o failure: {0}")]
    Io(String),
}

/// Transient failure reported by a single device read.
///
/// The capture loop skips the frame and keeps polling its flag.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceReadError {
    #[error("invalid operation")]
    InvalidOperation,

    #[error("bad value")]
    BadValue,

    #[error("dead object")]
    DeadObject,

    #[error("read timed out")]
    Timeout,

    #[error("device read failed: {0}")]
    Error(String),
}
