//! Runtime events for monitoring a running session.
//!
//! Apart from [`SessionEvent::Stopped`], events are non-fatal notifications. The loop keeps
//! running after emitting them; they're for logging and UI feedback, not error handling.

use std::fmt;
use std::sync::Arc;

use crate::params::OutputPath;

/// Why the worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called or the session was dropped.
    Requested,
    /// The capture device kept failing. The message is the final error.
    CaptureFailed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("stop requested"),
            Self::CaptureFailed(reason) => write!(f, "capture failed: {reason}"),
        }
    }
}

/// Runtime events emitted by a [`DeviceSession`](crate::DeviceSession).
///
/// Events are delivered on the worker thread, so the callback should return quickly.
///
/// # Example
///
/// ```
/// use virtual_mic::SessionEvent;
///
/// fn handle_event(event: SessionEvent) {
///     match event {
///         SessionEvent::Started => eprintln!("routing audio"),
///         SessionEvent::OutputWriteFailed { path, chunk_index, error } => {
///             eprintln!("{path} dropped chunk {chunk_index}: {error}");
///         }
///         SessionEvent::CaptureReadFailed { attempt, error } => {
///             eprintln!("capture read {attempt} failed: {error}");
///         }
///         SessionEvent::SecondOutputUnavailable => {
///             eprintln!("restart the session to use output 2");
///         }
///         SessionEvent::Stopped { reason } => eprintln!("stopped: {reason}"),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// All streams are open and the loop is running.
    Started,

    /// A processed chunk could not be written to an output.
    ///
    /// The chunk is lost for that output only; the other output and the loop are unaffected.
    OutputWriteFailed {
        /// The output that failed.
        path: OutputPath,
        /// Index of the dropped chunk.
        chunk_index: u64,
        /// Description of the error.
        error: String,
    },

    /// A capture read failed and will be retried unless attempts are exhausted.
    CaptureReadFailed {
        /// Attempt number for the current chunk, starting at 1.
        attempt: u32,
        /// Description of the error.
        error: String,
    },

    /// The second output was enabled while running but was not opened at start.
    ///
    /// Emitted once per run. Output 2 stays silent until the session is restarted.
    SecondOutputUnavailable,

    /// The loop ended and every stream is closed.
    Stopped {
        /// Why the loop ended.
        reason: StopReason,
    },
}

/// Callback type for receiving runtime events.
///
/// Register one via [`DeviceSessionBuilder::on_event()`].
///
/// [`DeviceSessionBuilder::on_event()`]: crate::DeviceSessionBuilder::on_event
pub type EventCallback = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use virtual_mic::{event_callback, SessionEvent};
///
/// let callback = event_callback(|event: SessionEvent| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(SessionEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
