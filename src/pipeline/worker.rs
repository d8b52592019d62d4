//! The real-time loop: capture, per-path processing, playback.
//!
//! Runs on the session's worker thread. Each iteration:
//! 1. Reads one chunk from capture, retrying with backoff
//! 2. Copies one [`Parameters`] snapshot and one mixer snapshot
//! 3. Processes and writes output 1, then output 2 when enabled
//! 4. Advances the background cursor if any path played the background

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use tokio::sync::oneshot;

use crate::device::{AudioBackend, CaptureStream, PlaybackStream, StreamFormat, StreamRole};
use crate::effects::EffectChain;
use crate::format::i16_slice_to_f32;
use crate::params::{OutputPath, Parameters};
use crate::session::{SessionShared, SessionState};
use crate::{AudioChunk, SessionEvent, StopReason, VirtualMicError};

/// Streams opened for one run, closed in reverse opening order.
struct OpenStreams {
    capture: Box<dyn CaptureStream>,
    outputs: [Option<Box<dyn PlaybackStream>>; 2],
}

impl OpenStreams {
    /// Opens capture, output 1 and, if enabled, output 2.
    ///
    /// Anything already opened is closed again when a later open fails.
    fn open(
        backend: &dyn AudioBackend,
        params: &Parameters,
        format: &StreamFormat,
    ) -> Result<Self, VirtualMicError> {
        let capture = backend.open_capture(params.devices.capture, format)?;

        let output_1 =
            match backend.open_playback(OutputPath::First, params.devices.output_1, format) {
                Ok(stream) => stream,
                Err(e) => {
                    capture.close();
                    return Err(e);
                }
            };

        let output_2 = if params.second_output_enabled {
            match backend.open_playback(OutputPath::Second, params.devices.output_2, format) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    output_1.close();
                    capture.close();
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            capture,
            outputs: [Some(output_1), output_2],
        })
    }

    fn close(self) {
        let [output_1, output_2] = self.outputs;
        if let Some(stream) = output_2 {
            stream.close();
            tracing::debug!(role = %StreamRole::Output(OutputPath::Second), "stream closed");
        }
        if let Some(stream) = output_1 {
            stream.close();
            tracing::debug!(role = %StreamRole::Output(OutputPath::First), "stream closed");
        }
        self.capture.close();
        tracing::debug!(role = %StreamRole::Capture, "stream closed");
    }
}

/// Entry point of the worker thread.
///
/// Opens the streams, answers the startup handshake, runs the loop until stop is requested or
/// capture fails for good, then closes the streams and returns the session to idle.
pub(crate) fn run_worker(
    shared: Arc<SessionShared>,
    backend: Arc<dyn AudioBackend>,
    ready: oneshot::Sender<Result<(), VirtualMicError>>,
) {
    let params = shared.params.snapshot();
    let format = shared.stream_format();

    let mut streams = match OpenStreams::open(backend.as_ref(), &params, &format) {
        Ok(streams) => streams,
        Err(e) => {
            tracing::error!(backend = backend.name(), "failed to open devices: {}", e);
            shared.set_state(SessionState::Idle);
            let _ = ready.send(Err(e));
            return;
        }
    };

    shared.set_state(SessionState::Running);
    let _ = ready.send(Ok(()));
    tracing::info!(
        backend = backend.name(),
        sample_rate = format.sample_rate,
        second_output = streams.outputs[1].is_some(),
        "session started"
    );
    shared.emit(SessionEvent::Started);

    let outcome = AudioLoop::new(&shared, &format).run(&mut streams);
    streams.close();

    let reason = match outcome {
        Ok(()) => StopReason::Requested,
        Err(e) => {
            tracing::error!("session stopped: {}", e);
            let reason = StopReason::CaptureFailed(e.to_string());
            *shared.last_error.lock() = Some(e);
            reason
        }
    };

    shared.set_state(SessionState::Idle);
    tracing::info!(
        chunks = shared.stats.chunks_processed.load(Ordering::Relaxed),
        %reason,
        "session stopped"
    );
    shared.emit(SessionEvent::Stopped { reason });
}

/// Per-run loop state: effect chains and scratch buffers.
struct AudioLoop<'a> {
    shared: &'a SessionShared,
    sample_rate: u32,
    chains: [EffectChain; 2],
    input: Vec<i16>,
    direct: Vec<f32>,
    background: Vec<f32>,
    chunk_index: u64,
    second_output_reported: bool,
}

impl<'a> AudioLoop<'a> {
    fn new(shared: &'a SessionShared, format: &StreamFormat) -> Self {
        let room_size = shared.params.snapshot().effects.room_size;
        Self {
            shared,
            sample_rate: format.sample_rate,
            chains: [
                EffectChain::new(room_size, format.sample_rate),
                EffectChain::new(room_size, format.sample_rate),
            ],
            input: vec![0; format.chunk_size],
            direct: vec![0.0; format.chunk_size],
            background: vec![0.0; format.chunk_size],
            chunk_index: 0,
            second_output_reported: false,
        }
    }

    fn stop_requested(&self) -> bool {
        self.shared.stop_requested.load(Ordering::Acquire)
    }

    fn run(&mut self, streams: &mut OpenStreams) -> Result<(), VirtualMicError> {
        while !self.stop_requested() {
            if !self.read_capture(streams.capture.as_mut())? {
                break;
            }
            self.process_chunk(&mut streams.outputs);
        }
        Ok(())
    }

    /// Reads the next chunk into `self.input`.
    ///
    /// Returns `Ok(false)` if stop was requested while backing off.
    fn read_capture(&mut self, capture: &mut dyn CaptureStream) -> Result<bool, VirtualMicError> {
        let attempts = self.shared.config.capture_read_attempts.max(1);
        let mut delay = self.shared.config.capture_retry_delay;
        let mut attempt = 1;

        loop {
            let error = match capture.read(&mut self.input) {
                Ok(()) => return Ok(true),
                Err(error) => error,
            };

            self.shared
                .stats
                .capture_read_failures
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!(attempt, attempts, "capture read failed: {}", error);
            self.shared.emit(SessionEvent::CaptureReadFailed {
                attempt,
                error: error.to_string(),
            });

            if attempt >= attempts {
                if self.stop_requested() {
                    return Ok(false);
                }
                return Err(VirtualMicError::CaptureFailed {
                    attempts,
                    source: error,
                });
            }

            thread::sleep(delay);
            if self.stop_requested() {
                return Ok(false);
            }
            delay = delay.saturating_mul(2);
            attempt += 1;
        }
    }

    fn process_chunk(&mut self, outputs: &mut [Option<Box<dyn PlaybackStream>>; 2]) {
        let params = self.shared.params.snapshot();
        let mixer = &self.shared.mixer;
        let track = mixer.snapshot();
        let mut background_played = false;

        for path in OutputPath::ALL {
            if !params.path_enabled(path) {
                continue;
            }
            let Some(stream) = outputs[path.index()].as_mut() else {
                if !self.second_output_reported {
                    self.second_output_reported = true;
                    tracing::warn!(
                        %path,
                        "enabled while running but not opened at start, restart to use it"
                    );
                    self.shared.emit(SessionEvent::SecondOutputUnavailable);
                }
                continue;
            };

            let routing = params.routing(path);
            let chain = &mut self.chains[path.index()];

            i16_slice_to_f32(&self.input, &mut self.direct);
            chain.process_direct(&mut self.direct, &params.effects, routing);

            if routing.background_playback_enabled {
                if let Some(track) = &track {
                    mixer.render(track, params.background_volume, &mut self.background);
                    chain.process_background(&mut self.background, &params.effects);
                    for (out, bg) in self.direct.iter_mut().zip(&self.background) {
                        *out += bg;
                    }
                    background_played = true;
                }
            }

            let chunk = AudioChunk::from_f32(&self.direct, self.chunk_index, self.sample_rate);
            if let Err(error) = stream.write(&chunk) {
                self.shared.stats.output_write_failures[path.index()]
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%path, chunk = self.chunk_index, "write failed: {}", error);
                self.shared.emit(SessionEvent::OutputWriteFailed {
                    path,
                    chunk_index: self.chunk_index,
                    error: error.to_string(),
                });
            }
        }

        if background_played {
            if let Some(track) = &track {
                mixer.advance(track);
            }
        }

        self.shared
            .stats
            .chunks_processed
            .fetch_add(1, Ordering::Relaxed);
        self.chunk_index += 1;
    }
}
