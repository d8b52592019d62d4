//! Integration tests for virtual-mic.
//!
//! Every session here runs on `MockBackend`, so no audio hardware is needed. Sessions run at
//! 100 Hz, giving 100-sample chunks.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use virtual_mic::device::{MockBackend, MockSource, StreamLogEntry, StreamRole};
use virtual_mic::{
    AudioChunk, DeviceConfig, DeviceSession, OutputPath, SessionConfig, SessionEvent,
    SessionState, StopReason, VirtualMicError,
};

const RATE: u32 = 100;
const CHUNK: usize = RATE as usize;
const WAIT: Duration = Duration::from_secs(5);

fn backend(level: i16) -> MockBackend {
    MockBackend::new(MockSource::new(RATE).constant(level, 1000))
}

fn fast_retries(attempts: u32) -> SessionConfig {
    SessionConfig {
        io_timeout: Duration::from_millis(200),
        capture_read_attempts: attempts,
        capture_retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

fn session_with(
    backend: &MockBackend,
    config: SessionConfig,
) -> (DeviceSession, Arc<Mutex<Vec<SessionEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let session = DeviceSession::builder()
        .device_config(DeviceConfig {
            sample_rate: RATE,
            ..Default::default()
        })
        .with_config(config)
        .backend(backend.clone())
        .on_event(move |event| sink.lock().push(event))
        .build()
        .unwrap();
    (session, events)
}

fn session(backend: &MockBackend) -> DeviceSession {
    session_with(backend, SessionConfig::default()).0
}

fn recv(rx: &mut UnboundedReceiver<AudioChunk>) -> AudioChunk {
    let deadline = Instant::now() + WAIT;
    loop {
        match rx.try_recv() {
            Ok(chunk) => return chunk,
            Err(TryRecvError::Empty) => {
                assert!(Instant::now() < deadline, "no chunk within {WAIT:?}");
                thread::sleep(Duration::from_millis(1));
            }
            Err(TryRecvError::Disconnected) => panic!("output channel closed"),
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {WAIT:?}");
        thread::sleep(Duration::from_millis(1));
    }
}

fn uniform(chunk: &AudioChunk) -> Option<i16> {
    let first = *chunk.samples.first()?;
    chunk.samples.iter().all(|&s| s == first).then_some(first)
}

#[test]
fn test_pass_through_reaches_output_1() {
    let backend = backend(1000);
    let mut out = backend.output_receiver(OutputPath::First);
    let session = session(&backend);

    session.start().unwrap();
    for expected_index in 0..3 {
        let chunk = recv(&mut out);
        assert_eq!(chunk.len(), CHUNK);
        assert_eq!(chunk.index, expected_index);
        assert_eq!(uniform(&chunk), Some(1000));
    }
    session.stop().unwrap();
}

#[test]
fn test_background_only_emits_headroom_level() {
    let backend = backend(1234);
    let mut out = backend.output_receiver(OutputPath::First);
    let session = session(&backend);

    session.set_pass_through_enabled(OutputPath::First, false);
    session.set_background_playback_enabled(OutputPath::First, true);
    session.set_background_volume(1.0);
    session.load_background_samples(vec![1.0; CHUNK]).unwrap();

    session.start().unwrap();
    for _ in 0..5 {
        assert_eq!(uniform(&recv(&mut out)), Some(8000));
    }
    session.stop().unwrap();
}

#[test]
fn test_background_from_wav_file() {
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let path = dir.path().join("loop.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..CHUNK * 2 {
        writer.write_sample(-12000i16).unwrap();
        writer.write_sample(-12000i16).unwrap();
    }
    writer.finalize().unwrap();

    let backend = backend(0);
    let mut out = backend.output_receiver(OutputPath::First);
    let session = session(&backend);
    assert_eq!(session.load_background_track(&path).unwrap(), 2);
    session.set_background_playback_enabled(OutputPath::First, true);
    session.set_background_volume(0.5);

    session.start().unwrap();
    // Normalized to -1.0, scaled by 8000 * 0.5
    assert_eq!(uniform(&recv(&mut out)), Some(-4000));
    session.stop().unwrap();
}

#[test]
fn test_noise_gate_change_applies_between_chunks() {
    let backend = backend(1000);
    let mut out = backend.output_receiver(OutputPath::First);
    let session = session(&backend);

    session.start().unwrap();
    assert_eq!(uniform(&recv(&mut out)), Some(1000));

    assert_eq!(session.set_noise_threshold(1000.0), 1000.0);
    loop {
        let chunk = recv(&mut out);
        // A chunk is processed with either the old or the new threshold, never a mix
        match uniform(&chunk) {
            Some(0) => break,
            Some(1000) => continue,
            other => panic!("torn chunk: {other:?}"),
        }
    }
    session.stop().unwrap();
}

#[test]
fn test_concurrent_mutation_never_tears_chunks() {
    let backend = backend(1000);
    let mut out = backend.output_receiver(OutputPath::First);
    let session = Arc::new(session(&backend));
    session.load_background_samples(vec![1.0; CHUNK * 3]).unwrap();
    session.set_background_playback_enabled(OutputPath::First, true);

    session.start().unwrap();

    let control = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            for i in 0..500 {
                session.set_background_volume(if i % 2 == 0 { 0.5 } else { 1.0 });
                session.set_pass_through_enabled(OutputPath::First, i % 3 != 0);
                session.set_background_position((i % 100) as f32);
                if i % 50 == 0 {
                    session
                        .load_background_samples(vec![1.0; CHUNK * (1 + i % 4)])
                        .unwrap();
                }
            }
        })
    };

    let allowed = [4000, 8000, 5000, 9000];
    for _ in 0..50 {
        let chunk = recv(&mut out);
        let level = uniform(&chunk).expect("chunk mixes two parameter sets");
        assert!(allowed.contains(&level), "unexpected level {level}");
    }

    control.join().unwrap();
    session.stop().unwrap();
}

#[test]
fn test_second_output_gets_its_own_mix() {
    let backend = backend(1000);
    let mut out_1 = backend.output_receiver(OutputPath::First);
    let mut out_2 = backend.output_receiver(OutputPath::Second);
    let session = session(&backend);

    session.load_background_samples(vec![0.5; CHUNK]).unwrap();
    session.set_background_volume(1.0);
    session.set_second_output_enabled(true);
    session.set_pass_through_enabled(OutputPath::Second, false);
    session.set_background_playback_enabled(OutputPath::Second, true);

    session.start().unwrap();
    for _ in 0..3 {
        assert_eq!(uniform(&recv(&mut out_1)), Some(1000));
        assert_eq!(uniform(&recv(&mut out_2)), Some(8000));
    }
    session.stop().unwrap();
}

#[test]
fn test_cursor_advances_once_per_chunk() {
    let backend = backend(0);
    let mut out_1 = backend.output_receiver(OutputPath::First);
    let mut out_2 = backend.output_receiver(OutputPath::Second);
    let session = session(&backend);

    let mut track = vec![0.25f32; CHUNK];
    track.extend(vec![0.5f32; CHUNK]);
    track.extend(vec![1.0f32; CHUNK]);
    session.load_background_samples(track).unwrap();
    session.set_background_volume(1.0);
    session.set_second_output_enabled(true);
    for path in OutputPath::ALL {
        session.set_pass_through_enabled(path, false);
        session.set_background_playback_enabled(path, true);
    }

    session.start().unwrap();
    // Both paths play the same slice, and the loop wraps after the third chunk
    for expected in [2000, 4000, 8000, 2000, 4000] {
        assert_eq!(uniform(&recv(&mut out_1)), Some(expected));
        assert_eq!(uniform(&recv(&mut out_2)), Some(expected));
    }
    session.stop().unwrap();
}

#[test]
fn test_cursor_holds_without_background_playback() {
    let backend = backend(0);
    let mut out = backend.output_receiver(OutputPath::First);
    let session = session(&backend);
    session.load_background_samples(vec![1.0; CHUNK * 4]).unwrap();
    session.set_background_position(50.0);

    session.start().unwrap();
    for _ in 0..5 {
        recv(&mut out);
    }
    session.stop().unwrap();

    assert_eq!(session.background_position_percent(), 50.0);
}

#[test]
fn test_write_failures_are_counted_and_skipped() {
    let backend = backend(1000);
    let mut out = backend.output_receiver(OutputPath::First);
    backend.fail_next_writes(OutputPath::First, 2);
    let (session, events) = session_with(&backend, SessionConfig::default());

    session.start().unwrap();
    let chunk = recv(&mut out);
    assert_eq!(chunk.index, 2);
    assert!(session.is_running());
    assert_eq!(session.stats().write_failures(OutputPath::First), 2);
    session.stop().unwrap();

    let failed: Vec<u64> = events
        .lock()
        .iter()
        .filter_map(|event| match event {
            SessionEvent::OutputWriteFailed {
                path: OutputPath::First,
                chunk_index,
                ..
            } => Some(*chunk_index),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![0, 1]);
}

#[test]
fn test_capture_retry_recovers() {
    let backend = backend(1000);
    let mut out = backend.output_receiver(OutputPath::First);
    backend.fail_next_reads(2);
    let (session, events) = session_with(&backend, fast_retries(3));

    session.start().unwrap();
    assert_eq!(recv(&mut out).index, 0);
    assert!(session.is_running());
    assert_eq!(session.stats().capture_read_failures, 2);
    session.stop().unwrap();

    let attempts: Vec<u32> = events
        .lock()
        .iter()
        .filter_map(|event| match event {
            SessionEvent::CaptureReadFailed { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2]);
}

#[test]
fn test_capture_failure_stops_session() {
    let backend = backend(1000);
    backend.fail_capture_after(2);
    let (session, events) = session_with(&backend, fast_retries(2));

    session.start().unwrap();
    wait_until(|| session.state() == SessionState::Idle);
    wait_until(|| {
        events
            .lock()
            .iter()
            .any(|e| matches!(e, SessionEvent::Stopped { .. }))
    });

    let err = session.take_last_error().unwrap();
    assert!(matches!(
        err,
        VirtualMicError::CaptureFailed { attempts: 2, .. }
    ));
    assert_eq!(session.stats().chunks_processed, 2);
    assert_eq!(session.stats().capture_read_failures, 2);

    let last = events.lock().last().cloned().unwrap();
    assert!(matches!(
        last,
        SessionEvent::Stopped {
            reason: StopReason::CaptureFailed(_)
        }
    ));

    // Every stream was released and stop still succeeds
    session.stop().unwrap();
    let log = backend.stream_log();
    assert_eq!(log.last(), Some(&StreamLogEntry::Closed(StreamRole::Capture)));
}

#[test]
fn test_streams_close_in_reverse_order() {
    let backend = backend(0);
    let session = session(&backend);
    session.set_second_output_enabled(true);

    session.start().unwrap();
    session.stop().unwrap();

    assert_eq!(
        backend.stream_log(),
        vec![
            StreamLogEntry::Opened(StreamRole::Capture),
            StreamLogEntry::Opened(StreamRole::Output(OutputPath::First)),
            StreamLogEntry::Opened(StreamRole::Output(OutputPath::Second)),
            StreamLogEntry::Closed(StreamRole::Output(OutputPath::Second)),
            StreamLogEntry::Closed(StreamRole::Output(OutputPath::First)),
            StreamLogEntry::Closed(StreamRole::Capture),
        ]
    );
}

#[test]
fn test_stop_is_idempotent_and_session_restarts() {
    let backend = backend(1000);
    let mut out = backend.output_receiver(OutputPath::First);
    let (session, events) = session_with(&backend, SessionConfig::default());

    session.stop().unwrap();
    session.start().unwrap();
    recv(&mut out);
    session.stop().unwrap();
    session.stop().unwrap();
    assert_eq!(session.state(), SessionState::Idle);

    session.start().unwrap();
    // Chunk numbering restarts with the run
    let chunk = loop {
        let chunk = recv(&mut out);
        if chunk.index == 0 {
            break chunk;
        }
    };
    assert_eq!(uniform(&chunk), Some(1000));
    session.stop().unwrap();

    let stopped = events
        .lock()
        .iter()
        .filter(|e| {
            matches!(
                e,
                SessionEvent::Stopped {
                    reason: StopReason::Requested
                }
            )
        })
        .count();
    assert_eq!(stopped, 2);
}

#[test]
fn test_start_while_running_is_rejected() {
    let backend = backend(0);
    let session = session(&backend);

    session.start().unwrap();
    assert!(matches!(
        session.start(),
        Err(VirtualMicError::AlreadyRunning)
    ));
    assert!(session.is_running());
    session.stop().unwrap();
}

#[test]
fn test_open_failure_leaves_session_idle() {
    let backend = backend(0);
    backend.fail_open(StreamRole::Output(OutputPath::First));
    let session = session(&backend);

    let err = session.start().unwrap_err();
    assert!(matches!(err, VirtualMicError::DeviceUnavailable { .. }));
    assert_eq!(session.state(), SessionState::Idle);

    // The capture stream opened first was released again
    assert_eq!(
        backend.stream_log(),
        vec![
            StreamLogEntry::Opened(StreamRole::Capture),
            StreamLogEntry::Closed(StreamRole::Capture),
        ]
    );
}

#[test]
fn test_unknown_device_index() {
    let backend = backend(0).with_device_counts(2, 2);
    let session = session(&backend);
    session.set_capture_device_index(5);

    let err = session.start().unwrap_err();
    assert!(matches!(
        err,
        VirtualMicError::DeviceNotFound { index: 5, .. }
    ));
    assert!(!session.is_running());

    session.set_capture_device_index(1);
    session.start().unwrap();
    session.stop().unwrap();
}

#[test]
fn test_second_output_enabled_late_is_reported_once() {
    let backend = backend(0);
    let mut out = backend.output_receiver(OutputPath::First);
    let (session, events) = session_with(&backend, SessionConfig::default());

    session.start().unwrap();
    session.set_second_output_enabled(true);
    recv(&mut out);
    wait_until(|| {
        events
            .lock()
            .iter()
            .any(|e| *e == SessionEvent::SecondOutputUnavailable)
    });
    for _ in 0..5 {
        recv(&mut out);
    }
    session.stop().unwrap();

    let reported = events
        .lock()
        .iter()
        .filter(|e| **e == SessionEvent::SecondOutputUnavailable)
        .count();
    assert_eq!(reported, 1);
}

#[test]
fn test_drop_stops_session() {
    let backend = backend(0);
    {
        let session = session(&backend);
        session.start().unwrap();
    }
    assert_eq!(
        backend.stream_log().last(),
        Some(&StreamLogEntry::Closed(StreamRole::Capture))
    );
}

#[test]
fn test_degenerate_track_keeps_previous() {
    let backend = backend(0);
    let session = session(&backend);
    session.load_background_samples(vec![1.0; CHUNK * 2]).unwrap();

    assert!(matches!(
        session.load_background_samples(vec![1.0; CHUNK - 1]),
        Err(VirtualMicError::DegenerateTrack { .. })
    ));
    assert!(matches!(
        session.load_background_samples(Vec::new()),
        Err(VirtualMicError::EmptyTrack)
    ));
    assert!(session.has_background_track());
}

#[test]
#[ignore = "requires audio hardware"]
fn test_cpal_session_starts() {
    let session = DeviceSession::builder().build().unwrap();
    session.start().unwrap();
    thread::sleep(Duration::from_secs(2));
    session.stop().unwrap();
}
