//! Device session: parameter control surface and worker lifecycle.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::background::{decode_mono, BackgroundTrackMixer};
use crate::builder::DeviceSessionBuilder;
use crate::device::{AudioBackend, StreamFormat};
use crate::event::EventCallback;
use crate::params::{OutputPath, ParameterStore, Parameters};
use crate::pipeline::run_worker;
use crate::{DeviceConfig, SessionConfig, SessionEvent, VirtualMicError};

/// Name of the thread that runs the audio loop.
pub const WORKER_THREAD_NAME: &str = "virtual-mic-worker";

/// Lifecycle state of a [`DeviceSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No streams are open.
    Idle = 0,
    /// `start()` is opening streams.
    Starting = 1,
    /// The loop is running.
    Running = 2,
    /// `stop()` is waiting for the loop to close its streams.
    Stopping = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

/// Counters for the current (or last) run of a session.
///
/// Reset by every successful `start()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Chunks read from capture and sent to the outputs.
    pub chunks_processed: u64,
    /// Failed writes, indexed by [`OutputPath::index`].
    pub output_write_failures: [u64; 2],
    /// Failed capture reads, including ones that succeeded on retry.
    pub capture_read_failures: u64,
}

impl SessionStats {
    /// Failed writes for one output.
    pub fn write_failures(&self, path: OutputPath) -> u64 {
        self.output_write_failures[path.index()]
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub chunks_processed: AtomicU64,
    pub output_write_failures: [AtomicU64; 2],
    pub capture_read_failures: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            output_write_failures: [
                self.output_write_failures[0].load(Ordering::Relaxed),
                self.output_write_failures[1].load(Ordering::Relaxed),
            ],
            capture_read_failures: self.capture_read_failures.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.chunks_processed.store(0, Ordering::Relaxed);
        for counter in &self.output_write_failures {
            counter.store(0, Ordering::Relaxed);
        }
        self.capture_read_failures.store(0, Ordering::Relaxed);
    }
}

/// State shared between the session handle and its worker thread.
pub(crate) struct SessionShared {
    pub device_config: DeviceConfig,
    pub config: SessionConfig,
    pub params: ParameterStore,
    pub mixer: BackgroundTrackMixer,
    pub stop_requested: AtomicBool,
    pub stats: StatsCounters,
    pub last_error: Mutex<Option<VirtualMicError>>,
    state: AtomicU8,
    event_callback: Option<EventCallback>,
}

impl SessionShared {
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Moves from `from` to `to`, returning `false` if the state was something else.
    pub fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }

    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.device_config.sample_rate,
            chunk_size: self.device_config.chunk_size(),
            io_timeout: self.config.io_timeout,
            ring_buffer_chunks: self.config.ring_buffer_chunks,
        }
    }
}

/// A capture device routed to one or two playback devices.
///
/// The session owns the runtime parameters and the background track. Both can be changed
/// from any thread at any time; the audio loop picks changes up at the next chunk boundary.
///
/// # Lifecycle
///
/// 1. Created by [`DeviceSessionBuilder::build()`], in [`SessionState::Idle`]
/// 2. [`start()`](DeviceSession::start) opens the devices and runs the loop on a worker thread
/// 3. [`stop()`](DeviceSession::stop) ends the loop and waits until every stream is closed
/// 4. The session can be started again; dropping it stops it
///
/// # Example
///
/// ```
/// use virtual_mic::device::{MockBackend, MockSource};
/// use virtual_mic::{DeviceConfig, DeviceSession, OutputPath};
///
/// let backend = MockBackend::new(MockSource::new(100).sine(5.0, 0.5, 1000));
/// let session = DeviceSession::builder()
///     .device_config(DeviceConfig { sample_rate: 100, ..Default::default() })
///     .backend(backend)
///     .build()?;
///
/// session.set_noise_threshold(500.0);
/// session.set_reverb_enabled(true);
///
/// session.start()?;
/// assert!(session.is_running());
/// session.stop()?;
/// # Ok::<(), virtual_mic::VirtualMicError>(())
/// ```
///
/// [`DeviceSessionBuilder::build()`]: crate::DeviceSessionBuilder::build
pub struct DeviceSession {
    shared: Arc<SessionShared>,
    backend: Arc<dyn AudioBackend>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceSession {
    /// Creates a new builder.
    pub fn builder() -> DeviceSessionBuilder {
        DeviceSessionBuilder::new()
    }

    pub(crate) fn new(
        device_config: DeviceConfig,
        config: SessionConfig,
        initial: Parameters,
        backend: Arc<dyn AudioBackend>,
        event_callback: Option<EventCallback>,
    ) -> Self {
        let chunk_size = device_config.chunk_size();
        Self {
            shared: Arc::new(SessionShared {
                device_config,
                config,
                params: ParameterStore::new(initial),
                mixer: BackgroundTrackMixer::new(chunk_size),
                stop_requested: AtomicBool::new(false),
                stats: StatsCounters::default(),
                last_error: Mutex::new(None),
                state: AtomicU8::new(SessionState::Idle as u8),
                event_callback,
            }),
            backend,
            worker: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    /// Device configuration the session was built with.
    pub fn device_config(&self) -> &DeviceConfig {
        &self.shared.device_config
    }

    /// Loop configuration the session was built with.
    pub fn session_config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Name of the backend devices are opened through.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Returns `true` while the loop is running.
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Counters for the current or last run.
    pub fn stats(&self) -> SessionStats {
        self.shared.stats.snapshot()
    }

    /// Takes the error that ended the last run, if the loop stopped on its own.
    pub fn take_last_error(&self) -> Option<VirtualMicError> {
        self.shared.last_error.lock().take()
    }

    /// Copy of every runtime parameter.
    pub fn parameters(&self) -> Parameters {
        self.shared.params.snapshot()
    }

    /// Sets the capture device used by the next `start()`.
    pub fn set_capture_device_index(&self, index: usize) {
        self.shared.params.set_capture_device_index(index);
    }

    /// Sets the playback device for `path` used by the next `start()`.
    pub fn set_output_device_index(&self, path: OutputPath, index: usize) {
        self.shared.params.set_output_device_index(path, index);
    }

    /// Enables or disables output 2.
    ///
    /// Output 2 is only opened by `start()`. Enabling it while running without having opened it
    /// emits [`SessionEvent::SecondOutputUnavailable`] once and has no audible effect.
    pub fn set_second_output_enabled(&self, enabled: bool) {
        self.shared.params.set_second_output_enabled(enabled);
    }

    /// Routes the live signal to `path` or silences it.
    pub fn set_pass_through_enabled(&self, path: OutputPath, enabled: bool) {
        self.shared.params.set_pass_through_enabled(path, enabled);
    }

    /// Mixes the background track into `path` or not.
    pub fn set_background_playback_enabled(&self, path: OutputPath, enabled: bool) {
        self.shared
            .params
            .set_background_playback_enabled(path, enabled);
    }

    /// Sets the noise gate threshold in int16 units, clamped to [0, 3000].
    pub fn set_noise_threshold(&self, threshold: f32) -> f32 {
        self.shared.params.set_noise_threshold(threshold)
    }

    /// Enables reverb on the live signal.
    pub fn set_reverb_enabled(&self, enabled: bool) {
        self.shared.params.set_reverb_enabled(enabled);
    }

    /// Enables reverb on the background contribution.
    pub fn set_reverb_applies_to_background(&self, enabled: bool) {
        self.shared.params.set_reverb_applies_to_background(enabled);
    }

    /// Sets the reverb room size, clamped to [0, 1].
    ///
    /// Reverb state is rebuilt at the next chunk, dropping any tail.
    pub fn set_reverb_room_size(&self, room_size: f32) -> f32 {
        self.shared.params.set_reverb_room_size(room_size)
    }

    /// Sets the background volume, clamped to [0, 3].
    pub fn set_background_volume(&self, volume: f32) -> f32 {
        self.shared.params.set_background_volume(volume)
    }

    /// Moves the background loop to a percentage of the track, clamped to [0, 100].
    pub fn set_background_position(&self, percent: f32) -> f32 {
        self.shared.mixer.set_position_percent(percent)
    }

    /// Background loop position in percent, 0 when no track is loaded.
    pub fn background_position_percent(&self) -> f32 {
        self.shared.mixer.position_percent()
    }

    /// Returns `true` if a background track is loaded.
    pub fn has_background_track(&self) -> bool {
        self.shared.mixer.is_loaded()
    }

    /// Decodes an audio file and makes it the background track.
    ///
    /// The file is downmixed to mono and resampled to the session rate. Returns the number of
    /// whole chunks in the track. On error the previous track stays loaded.
    pub fn load_background_track(&self, path: impl AsRef<Path>) -> Result<usize, VirtualMicError> {
        let path = path.as_ref();
        let samples = decode_mono(path, self.shared.device_config.sample_rate)?;
        let total_chunks = self.shared.mixer.load(samples)?;
        tracing::info!(path = %path.display(), total_chunks, "background track file loaded");
        Ok(total_chunks)
    }

    /// Makes already-decoded mono samples at the session rate the background track.
    pub fn load_background_samples(&self, samples: Vec<f32>) -> Result<usize, VirtualMicError> {
        self.shared.mixer.load(samples)
    }

    /// Unloads the background track.
    pub fn clear_background_track(&self) {
        self.shared.mixer.clear();
    }

    /// Opens the devices and starts the loop.
    ///
    /// Blocks until every stream is open. Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualMicError::AlreadyRunning`] unless the session is idle, and the open
    /// error if a device fails to open. The session is idle again after any error.
    pub fn start(&self) -> Result<(), VirtualMicError> {
        let mut worker = self.worker.lock();
        if !self
            .shared
            .transition(SessionState::Idle, SessionState::Starting)
        {
            return Err(VirtualMicError::AlreadyRunning);
        }

        // Reap a worker that ended on its own
        if let Some(handle) = worker.take() {
            let _ = handle.join();
        }

        self.shared.stop_requested.store(false, Ordering::Release);
        self.shared.stats.reset();
        self.shared.last_error.lock().take();

        let (ready_tx, ready_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let backend = Arc::clone(&self.backend);
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(shared, backend, ready_tx));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.set_state(SessionState::Idle);
                return Err(VirtualMicError::WorkerSpawn(e.to_string()));
            }
        };

        match ready_rx.blocking_recv() {
            Ok(Ok(())) => {
                *worker = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // The worker dropped the handshake without answering, it panicked while opening
                let _ = handle.join();
                self.shared.set_state(SessionState::Idle);
                Err(VirtualMicError::WorkerPanicked)
            }
        }
    }

    /// Stops the loop and waits until every stream is closed.
    ///
    /// A no-op on an idle session. Waits at most about one chunk plus the I/O timeout.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualMicError::WorkerPanicked`] if the worker thread panicked.
    pub fn stop(&self) -> Result<(), VirtualMicError> {
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return Ok(());
        };

        self.shared
            .transition(SessionState::Running, SessionState::Stopping);
        self.shared.stop_requested.store(true, Ordering::Release);

        let joined = handle.join();
        self.shared.set_state(SessionState::Idle);
        joined.map_err(|_| VirtualMicError::WorkerPanicked)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("failed to stop session on drop: {}", e);
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .field("device_config", &self.shared.device_config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockBackend, MockSource};

    fn session() -> DeviceSession {
        DeviceSession::builder()
            .device_config(DeviceConfig {
                sample_rate: 10,
                ..Default::default()
            })
            .backend(MockBackend::new(MockSource::new(10)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_session_state_round_trip() {
        for state in [
            SessionState::Idle,
            SessionState::Starting,
            SessionState::Running,
            SessionState::Stopping,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_session_stats_default() {
        let stats = SessionStats::default();
        assert_eq!(stats.chunks_processed, 0);
        assert_eq!(stats.write_failures(OutputPath::Second), 0);
        assert_eq!(stats.capture_read_failures, 0);
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = session();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_running());
        assert!(session.take_last_error().is_none());
    }

    #[test]
    fn test_session_keeps_build_configuration() {
        let session = DeviceSession::builder()
            .device_config(DeviceConfig {
                sample_rate: 10,
                output_1_index: 2,
                ..Default::default()
            })
            .with_config(SessionConfig {
                capture_read_attempts: 5,
                ..Default::default()
            })
            .backend(MockBackend::new(MockSource::new(10)))
            .build()
            .unwrap();

        assert_eq!(session.device_config().output_1_index, 2);
        assert_eq!(session.device_config().chunk_size(), 10);
        assert_eq!(session.session_config().capture_read_attempts, 5);
    }

    #[test]
    fn test_stop_on_idle_is_noop() {
        let session = session();
        session.stop().unwrap();
        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_setters_clamp_and_store() {
        let session = session();
        assert_eq!(session.set_noise_threshold(5000.0), 3000.0);
        assert_eq!(session.set_reverb_room_size(-1.0), 0.0);
        assert_eq!(session.set_background_volume(f32::NAN), 0.0);
        session.set_output_device_index(OutputPath::Second, 3);
        session.set_background_playback_enabled(OutputPath::Second, true);

        let params = session.parameters();
        assert_eq!(params.effects.noise_threshold, 3000.0);
        assert_eq!(params.devices.output_2, 3);
        assert!(params.routing(OutputPath::Second).background_playback_enabled);
    }

    #[test]
    fn test_background_position_without_track() {
        let session = session();
        assert_eq!(session.set_background_position(120.0), 100.0);
        assert_eq!(session.background_position_percent(), 0.0);
    }

    #[test]
    fn test_load_background_samples() {
        let session = session();
        assert_eq!(session.load_background_samples(vec![0.5; 35]).unwrap(), 3);
        assert!(session.has_background_track());
        session.clear_background_track();
        assert!(!session.has_background_track());
    }

    #[test]
    fn test_load_background_track_missing_file() {
        let session = session();
        let err = session
            .load_background_track("/no/such/background.wav")
            .unwrap_err();
        assert!(matches!(err, VirtualMicError::FileError { .. }));
    }
}
