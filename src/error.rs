//! Error types for virtual-mic.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`VirtualMicError`]): Prevent a session from starting, reject a background
//!   track, or end a running session
//! - **Recoverable I/O errors** ([`StreamIoError`]): A single chunk failed to reach a device.
//!   Surfaced via [`EventCallback`](crate::EventCallback) and [`SessionStats`](crate::SessionStats)

use std::path::PathBuf;
use std::time::Duration;

/// Fatal errors returned synchronously to the caller.
///
/// These come from [`DeviceSession::start()`], the background track loaders and
/// session construction. Per-chunk write problems are handled inside the loop instead.
///
/// [`DeviceSession::start()`]: crate::DeviceSession::start
#[derive(Debug, thiserror::Error)]
pub enum VirtualMicError {
    /// No device exists at the requested index.
    #[error("{role} device not found at index {index}")]
    DeviceNotFound {
        /// Which stream was being opened ("capture", "output 1", ...).
        role: String,
        /// The index that was requested.
        index: usize,
    },

    /// The device exists but could not be opened.
    #[error("{role} device {index} unavailable: {reason}")]
    DeviceUnavailable {
        /// Which stream was being opened.
        role: String,
        /// The index that was requested.
        index: usize,
        /// Reason the device is unavailable.
        reason: String,
    },

    /// The device offers no sample format the pipeline can drive.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// The requested sample rate is not supported by the device.
    #[error("sample rate {requested}Hz not supported (available up to: {available:?})")]
    UnsupportedSampleRate {
        /// The requested sample rate.
        requested: u32,
        /// Maximum rates of the configurations the device does offer.
        available: Vec<u32>,
    },

    /// An error from the underlying audio library.
    #[error("audio backend error: {0}")]
    BackendError(String),

    /// The session configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The background source decoded to zero samples.
    #[error("background track is empty")]
    EmptyTrack,

    /// The background track is shorter than one chunk.
    #[error("background track has {samples} samples, need at least one chunk ({chunk_size})")]
    DegenerateTrack {
        /// Number of samples that were supplied.
        samples: usize,
        /// The session's chunk size.
        chunk_size: usize,
    },

    /// The background file could not be decoded.
    #[error("cannot decode {path}: {reason}")]
    Decode {
        /// Path to the file.
        path: PathBuf,
        /// What the decoder reported.
        reason: String,
    },

    /// File I/O error.
    #[error("file error: {path}: {source}")]
    FileError {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// `start()` was called while the session is not idle.
    #[error("session is already running")]
    AlreadyRunning,

    /// The worker thread could not be created.
    #[error("failed to spawn audio worker: {0}")]
    WorkerSpawn(String),

    /// The worker thread panicked.
    #[error("audio worker panicked")]
    WorkerPanicked,

    /// The capture device kept failing and the session was torn down.
    #[error("capture failed after {attempts} attempts: {source}")]
    CaptureFailed {
        /// Number of reads attempted for the failing chunk.
        attempts: u32,
        /// The last read error.
        #[source]
        source: StreamIoError,
    },
}

impl VirtualMicError {
    /// Creates a backend error from anything printable.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::BackendError(err.to_string())
    }

    /// Creates a file error for the given path.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileError {
            path: path.into(),
            source,
        }
    }

    /// Creates a decode error for the given path.
    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from a single blocking read or write on an open stream.
///
/// Write errors are recoverable: the loop drops that chunk for that output and keeps going.
/// Read errors are retried with backoff and become [`VirtualMicError::CaptureFailed`] when
/// the retries run out.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamIoError {
    /// The device did not accept or deliver a full chunk in time.
    #[error("timed out after {waited:?} ({transferred}/{expected} samples)")]
    Timeout {
        /// How long the call waited.
        waited: Duration,
        /// Samples moved before the deadline.
        transferred: usize,
        /// Samples the call needed to move.
        expected: usize,
    },

    /// The other end of the stream is gone.
    #[error("stream disconnected")]
    Disconnected,

    /// The audio library reported an error.
    #[error("backend error: {0}")]
    Backend(String),

    /// Custom error for user-implemented streams.
    #[error("{0}")]
    Custom(String),
}

impl StreamIoError {
    /// Creates a custom stream error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}
