//! Configuration types for device sessions.

use std::time::Duration;

use crate::VirtualMicError;

/// Sample rate used when none is configured.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Devices and format a session opens.
///
/// The indices are only the initial values: the control surface can change them later through
/// [`DeviceSession`](crate::DeviceSession) setters, and each `start()` uses the indices current
/// at that moment. The sample rate is fixed for the lifetime of the session.
///
/// # Example
///
/// ```
/// use virtual_mic::DeviceConfig;
///
/// let config = DeviceConfig {
///     capture_index: 1,
///     output_1_index: 6,
///     ..Default::default()
/// };
/// assert_eq!(config.chunk_size(), 44_100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Index of the capture (microphone) device.
    pub capture_index: usize,
    /// Index of the first playback device.
    pub output_1_index: usize,
    /// Index of the second playback device, used when the second output is enabled.
    pub output_2_index: usize,
    /// Sample rate in Hz for every stream.
    pub sample_rate: u32,
}

impl DeviceConfig {
    /// Samples per chunk. One chunk holds one second of mono audio.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.sample_rate as usize
    }

    /// Duration of one chunk.
    #[must_use]
    pub fn chunk_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.chunk_size() as f64 / f64::from(self.sample_rate))
    }

    /// Checks the invariants the loop depends on.
    pub fn validate(&self) -> Result<(), VirtualMicError> {
        if self.chunk_size() == 0 {
            return Err(VirtualMicError::InvalidConfig(
                "sample rate must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            capture_index: 0,
            output_1_index: 0,
            output_2_index: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// Configuration for loop behavior.
///
/// Use [`SessionConfig::default()`] for sensible defaults, or customize as needed.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for one blocking read or write on a device stream.
    ///
    /// Bounds how long `stop()` can wait on an unresponsive device.
    /// Default: 2 seconds (two chunks)
    pub io_timeout: Duration,

    /// Number of read attempts for one capture chunk before the session is torn down.
    ///
    /// Default: 3
    pub capture_read_attempts: u32,

    /// Initial delay between capture read attempts.
    ///
    /// Uses exponential backoff (delay doubles each attempt).
    /// Default: 100ms
    pub capture_retry_delay: Duration,

    /// Capacity of each device ring buffer, in chunks.
    ///
    /// Default: 2
    pub ring_buffer_chunks: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(2),
            capture_read_attempts: 3,
            capture_retry_delay: Duration::from_millis(100),
            ring_buffer_chunks: 2,
        }
    }
}
