//! Audio device abstraction.
//!
//! An [`AudioBackend`] opens streams by device index. The session opens one capture stream and
//! one or two playback streams through it, drives them from its worker thread and closes them
//! in reverse opening order.
//!
//! - [`CpalBackend`]: real hardware via CPAL (feature `cpal-backend`)
//! - [`MockBackend`]: scripted capture and recorded playback for tests
//!
//! Streams are opened, used and closed on the worker thread, so they need not be `Send`. The
//! backend itself is shared with the session handle and must be `Send + Sync`.

#[cfg(feature = "cpal-backend")]
mod cpal_backend;
mod mock;

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::CpalBackend;
pub use mock::{MockBackend, MockSource, StreamLogEntry};

use std::fmt;
use std::time::Duration;

use crate::params::OutputPath;
use crate::{AudioChunk, StreamIoError, VirtualMicError};

/// Which stream a device is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRole {
    /// The microphone input.
    Capture,
    /// One of the playback outputs.
    Output(OutputPath),
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => f.write_str("capture"),
            Self::Output(path) => write!(f, "{path}"),
        }
    }
}

/// Format and timing every stream of a session is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Samples moved by one read or write.
    pub chunk_size: usize,
    /// Upper bound for one blocking read or write.
    pub io_timeout: Duration,
    /// Ring buffer capacity, in chunks, for callback-driven backends.
    pub ring_buffer_chunks: usize,
}

impl StreamFormat {
    /// Ring buffer capacity in samples.
    pub fn ring_capacity(&self) -> usize {
        self.chunk_size * self.ring_buffer_chunks.max(1)
    }
}

/// Opens device streams by index.
///
/// # Example
///
/// ```
/// use virtual_mic::device::{AudioBackend, MockBackend, MockSource, StreamFormat};
/// use std::time::Duration;
///
/// let backend = MockBackend::new(MockSource::new(100).constant(1000, 1000));
/// let format = StreamFormat {
///     sample_rate: 100,
///     chunk_size: 100,
///     io_timeout: Duration::from_secs(1),
///     ring_buffer_chunks: 2,
/// };
///
/// let mut capture = backend.open_capture(0, &format).unwrap();
/// let mut chunk = vec![0i16; 100];
/// capture.read(&mut chunk).unwrap();
/// assert!(chunk.iter().all(|&s| s == 1000));
/// capture.close();
/// ```
pub trait AudioBackend: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Opens the capture device at `index` as a mono stream.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualMicError::DeviceNotFound`] for an index with no device, and an
    /// unavailable, format or backend error when the device cannot be driven at `format`.
    fn open_capture(
        &self,
        index: usize,
        format: &StreamFormat,
    ) -> Result<Box<dyn CaptureStream>, VirtualMicError>;

    /// Opens the playback device at `index` for the given output path.
    ///
    /// # Errors
    ///
    /// Same as [`open_capture`](AudioBackend::open_capture).
    fn open_playback(
        &self,
        path: OutputPath,
        index: usize,
        format: &StreamFormat,
    ) -> Result<Box<dyn PlaybackStream>, VirtualMicError>;
}

/// An open capture stream.
pub trait CaptureStream {
    /// Fills `buf` with the next mono samples, blocking at most the stream's I/O timeout.
    fn read(&mut self, buf: &mut [i16]) -> Result<(), StreamIoError>;

    /// Stops and releases the device.
    fn close(self: Box<Self>);
}

/// An open playback stream.
pub trait PlaybackStream {
    /// Queues one chunk for playback, blocking at most the stream's I/O timeout.
    fn write(&mut self, chunk: &AudioChunk) -> Result<(), StreamIoError>;

    /// Stops and releases the device.
    fn close(self: Box<Self>);
}
