//! Mock backend for testing without hardware.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::device::{AudioBackend, CaptureStream, PlaybackStream, StreamFormat, StreamRole};
use crate::params::OutputPath;
use crate::{AudioChunk, StreamIoError, VirtualMicError};

/// Number of devices of each direction a [`MockBackend`] pretends to have.
const DEFAULT_DEVICE_COUNT: usize = 4;

/// Synthetic mono microphone signal.
///
/// The samples are played in a loop by the capture stream of a [`MockBackend`].
///
/// # Example
///
/// ```
/// use virtual_mic::device::MockSource;
///
/// let source = MockSource::new(16000)
///     .silence(100)
///     .sine(440.0, 0.5, 100);
///
/// assert_eq!(source.as_slice().len(), 3200);
/// ```
#[derive(Debug, Clone)]
pub struct MockSource {
    sample_rate: u32,
    samples: Vec<i16>,
}

impl MockSource {
    /// Creates an empty source at the given rate. An empty source captures silence.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples: Vec::new(),
        }
    }

    /// Sample rate the source was generated for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Appends `duration_ms` of a constant value.
    #[must_use]
    pub fn constant(mut self, value: i16, duration_ms: u64) -> Self {
        let count = self.samples_for(duration_ms);
        self.samples.extend(std::iter::repeat(value).take(count));
        self
    }

    /// Appends `duration_ms` of silence.
    #[must_use]
    pub fn silence(self, duration_ms: u64) -> Self {
        self.constant(0, duration_ms)
    }

    /// Appends a sine wave with peak `amplitude` (1.0 = full scale).
    #[must_use]
    pub fn sine(mut self, frequency: f64, amplitude: f64, duration_ms: u64) -> Self {
        let count = self.samples_for(duration_ms);
        let rate = f64::from(self.sample_rate);
        self.samples.extend((0..count).map(|i| {
            let phase = 2.0 * std::f64::consts::PI * frequency * i as f64 / rate;
            (phase.sin() * amplitude * 32767.0) as i16
        }));
        self
    }

    /// Appends deterministic white noise with peak `amplitude` (1.0 = full scale).
    #[must_use]
    pub fn noise(mut self, amplitude: f64, duration_ms: u64) -> Self {
        let count = self.samples_for(duration_ms);
        let peak = amplitude * 32767.0;

        // Simple LCG so runs are reproducible
        let mut seed: u32 = 12345;
        self.samples.extend((0..count).map(|_| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let unit = f64::from(seed >> 16) / 32768.0 - 1.0;
            (unit * peak) as i16
        }));
        self
    }

    /// Appends raw samples.
    #[must_use]
    pub fn with_samples(mut self, samples: &[i16]) -> Self {
        self.samples.extend_from_slice(samples);
        self
    }

    /// The generated samples.
    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }

    /// Length of the generated signal.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate.max(1)))
    }

    fn samples_for(&self, duration_ms: u64) -> usize {
        (u64::from(self.sample_rate) * duration_ms / 1000) as usize
    }
}

/// A stream being opened or closed, in the order the backend saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLogEntry {
    /// A stream was opened.
    Opened(StreamRole),
    /// A stream was closed.
    Closed(StreamRole),
}

#[derive(Debug)]
struct MockState {
    pacing: Duration,
    input_devices: usize,
    output_devices: usize,
    outputs: [Option<mpsc::UnboundedSender<AudioChunk>>; 2],
    failing_opens: Vec<StreamRole>,
    pending_write_failures: [u32; 2],
    pending_read_failures: u32,
    capture_fails_after: Option<u64>,
    reads: u64,
    log: Vec<StreamLogEntry>,
}

#[derive(Debug)]
struct MockShared {
    source: MockSource,
    state: Mutex<MockState>,
}

/// Backend that captures from a [`MockSource`] and hands written chunks to channels.
///
/// Clones share state, so a test can keep one clone for inspection and fault injection while
/// the session owns another.
///
/// Capture reads sleep for a short pacing interval so a running session does not spin, but
/// are otherwise much faster than real time.
///
/// # Example
///
/// ```
/// use virtual_mic::device::{MockBackend, MockSource};
/// use virtual_mic::OutputPath;
///
/// let backend = MockBackend::new(MockSource::new(100).constant(500, 1000));
/// let output_1 = backend.output_receiver(OutputPath::First);
///
/// // Hand `backend.clone()` to a session, then:
/// // let chunk = output_1.blocking_recv();
/// # drop(output_1);
/// ```
#[derive(Debug, Clone)]
pub struct MockBackend {
    shared: Arc<MockShared>,
}

impl MockBackend {
    /// Creates a backend capturing `source` in a loop.
    pub fn new(source: MockSource) -> Self {
        Self {
            shared: Arc::new(MockShared {
                source,
                state: Mutex::new(MockState {
                    pacing: Duration::from_millis(1),
                    input_devices: DEFAULT_DEVICE_COUNT,
                    output_devices: DEFAULT_DEVICE_COUNT,
                    outputs: [None, None],
                    failing_opens: Vec::new(),
                    pending_write_failures: [0; 2],
                    pending_read_failures: 0,
                    capture_fails_after: None,
                    reads: 0,
                    log: Vec::new(),
                }),
            }),
        }
    }

    /// Sets the delay before each capture read.
    #[must_use]
    pub fn with_pacing(self, pacing: Duration) -> Self {
        self.shared.state.lock().pacing = pacing;
        self
    }

    /// Sets how many input and output devices exist.
    #[must_use]
    pub fn with_device_counts(self, inputs: usize, outputs: usize) -> Self {
        {
            let mut state = self.shared.state.lock();
            state.input_devices = inputs;
            state.output_devices = outputs;
        }
        self
    }

    /// Returns a receiver for every chunk written to `path` from now on.
    ///
    /// Replaces any earlier receiver for the same path.
    pub fn output_receiver(&self, path: OutputPath) -> mpsc::UnboundedReceiver<AudioChunk> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.state.lock().outputs[path.index()] = Some(tx);
        rx
    }

    /// Makes every subsequent open of `role` fail as unavailable.
    pub fn fail_open(&self, role: StreamRole) {
        self.shared.state.lock().failing_opens.push(role);
    }

    /// Makes the next `count` writes on `path` fail.
    pub fn fail_next_writes(&self, path: OutputPath, count: u32) {
        self.shared.state.lock().pending_write_failures[path.index()] += count;
    }

    /// Makes the next `count` capture reads fail.
    pub fn fail_next_reads(&self, count: u32) {
        self.shared.state.lock().pending_read_failures += count;
    }

    /// Disconnects the capture device once `reads` reads have succeeded.
    pub fn fail_capture_after(&self, reads: u64) {
        self.shared.state.lock().capture_fails_after = Some(reads);
    }

    /// Number of successful capture reads so far.
    pub fn capture_reads(&self) -> u64 {
        self.shared.state.lock().reads
    }

    /// Every open and close, oldest first.
    pub fn stream_log(&self) -> Vec<StreamLogEntry> {
        self.shared.state.lock().log.clone()
    }

    fn check_open(
        &self,
        role: StreamRole,
        index: usize,
        format: &StreamFormat,
    ) -> Result<(), VirtualMicError> {
        let mut state = self.shared.state.lock();
        let device_count = match role {
            StreamRole::Capture => state.input_devices,
            StreamRole::Output(_) => state.output_devices,
        };
        if index >= device_count {
            return Err(VirtualMicError::DeviceNotFound {
                role: role.to_string(),
                index,
            });
        }
        if state.failing_opens.contains(&role) {
            return Err(VirtualMicError::DeviceUnavailable {
                role: role.to_string(),
                index,
                reason: "injected open failure".to_string(),
            });
        }
        if format.sample_rate != self.shared.source.sample_rate() {
            return Err(VirtualMicError::UnsupportedSampleRate {
                requested: format.sample_rate,
                available: vec![self.shared.source.sample_rate()],
            });
        }
        state.log.push(StreamLogEntry::Opened(role));
        Ok(())
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn open_capture(
        &self,
        index: usize,
        format: &StreamFormat,
    ) -> Result<Box<dyn CaptureStream>, VirtualMicError> {
        self.check_open(StreamRole::Capture, index, format)?;
        Ok(Box::new(MockCapture {
            shared: Arc::clone(&self.shared),
            position: 0,
        }))
    }

    fn open_playback(
        &self,
        path: OutputPath,
        index: usize,
        format: &StreamFormat,
    ) -> Result<Box<dyn PlaybackStream>, VirtualMicError> {
        self.check_open(StreamRole::Output(path), index, format)?;
        Ok(Box::new(MockPlayback {
            shared: Arc::clone(&self.shared),
            path,
        }))
    }
}

struct MockCapture {
    shared: Arc<MockShared>,
    position: usize,
}

impl CaptureStream for MockCapture {
    fn read(&mut self, buf: &mut [i16]) -> Result<(), StreamIoError> {
        let pacing = self.shared.state.lock().pacing;
        thread::sleep(pacing);

        {
            let mut state = self.shared.state.lock();
            if state.pending_read_failures > 0 {
                state.pending_read_failures -= 1;
                return Err(StreamIoError::custom("injected capture failure"));
            }
            if state.capture_fails_after.is_some_and(|limit| state.reads >= limit) {
                return Err(StreamIoError::Disconnected);
            }
            state.reads += 1;
        }

        let samples = self.shared.source.as_slice();
        if samples.is_empty() {
            buf.fill(0);
            return Ok(());
        }
        for sample in buf.iter_mut() {
            *sample = samples[self.position];
            self.position = (self.position + 1) % samples.len();
        }
        Ok(())
    }

    fn close(self: Box<Self>) {
        self.shared
            .state
            .lock()
            .log
            .push(StreamLogEntry::Closed(StreamRole::Capture));
    }
}

struct MockPlayback {
    shared: Arc<MockShared>,
    path: OutputPath,
}

impl PlaybackStream for MockPlayback {
    fn write(&mut self, chunk: &AudioChunk) -> Result<(), StreamIoError> {
        let mut state = self.shared.state.lock();
        let pending = &mut state.pending_write_failures[self.path.index()];
        if *pending > 0 {
            *pending -= 1;
            return Err(StreamIoError::custom("injected write failure"));
        }

        match &state.outputs[self.path.index()] {
            Some(tx) => tx
                .send(chunk.clone())
                .map_err(|_| StreamIoError::Disconnected),
            None => Ok(()),
        }
    }

    fn close(self: Box<Self>) {
        self.shared
            .state
            .lock()
            .log
            .push(StreamLogEntry::Closed(StreamRole::Output(self.path)));
    }
}
