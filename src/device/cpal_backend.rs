//! CPAL backend: real devices bridged to blocking streams through ring buffers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, Host, HostId, SampleFormat, SampleRate, Stream, StreamConfig as CpalStreamConfig,
    StreamError, SupportedStreamConfig, SupportedStreamConfigRange,
};
use ringbuf::traits::{Consumer, Producer};
use ringbuf::{HeapCons, HeapProd};

use crate::device::{AudioBackend, CaptureStream, PlaybackStream, StreamFormat, StreamRole};
use crate::format::{f32_to_i16, i16_to_f32};
use crate::params::OutputPath;
use crate::pipeline::{capture_ring, playback_ring, BlockingReader, BlockingWriter};
use crate::{AudioChunk, StreamIoError, VirtualMicError};

/// Backend for the devices of a CPAL host.
///
/// Device indices are positions in the host's input or output device list, in the order CPAL
/// enumerates them. Capture is downmixed to mono in the callback; playback duplicates the mono
/// signal to every channel of the device.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    host_id: Option<HostId>,
}

impl CpalBackend {
    /// Uses the platform's default host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific host (e.g. JACK or ASIO where available).
    pub fn with_host(host_id: HostId) -> Self {
        Self {
            host_id: Some(host_id),
        }
    }

    fn host(&self) -> Result<Host, VirtualMicError> {
        match self.host_id {
            Some(id) => cpal::host_from_id(id).map_err(VirtualMicError::backend),
            None => Ok(cpal::default_host()),
        }
    }

    fn device(&self, role: StreamRole, index: usize) -> Result<Device, VirtualMicError> {
        let host = self.host()?;
        let device = match role {
            StreamRole::Capture => host
                .input_devices()
                .map_err(VirtualMicError::backend)?
                .nth(index),
            StreamRole::Output(_) => host
                .output_devices()
                .map_err(VirtualMicError::backend)?
                .nth(index),
        };
        device.ok_or_else(|| VirtualMicError::DeviceNotFound {
            role: role.to_string(),
            index,
        })
    }
}

/// Picks the configuration with the fewest channels that runs at `sample_rate` in a sample
/// format the callbacks handle.
fn select_config(
    ranges: impl Iterator<Item = SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Result<SupportedStreamConfig, VirtualMicError> {
    let rate = SampleRate(sample_rate);
    let mut available = Vec::new();
    let mut formats_at_rate = Vec::new();
    let mut best: Option<SupportedStreamConfigRange> = None;

    for range in ranges {
        available.push(range.max_sample_rate().0);
        if range.min_sample_rate() > rate || range.max_sample_rate() < rate {
            continue;
        }
        if !matches!(range.sample_format(), SampleFormat::I16 | SampleFormat::F32) {
            formats_at_rate.push(format!("{:?}", range.sample_format()));
            continue;
        }
        if best
            .as_ref()
            .map_or(true, |current| range.channels() < current.channels())
        {
            best = Some(range);
        }
    }

    if let Some(range) = best {
        return Ok(range.with_sample_rate(rate));
    }
    if let Some(format) = formats_at_rate.into_iter().next() {
        return Err(VirtualMicError::UnsupportedFormat { format });
    }
    available.sort_unstable();
    available.dedup();
    Err(VirtualMicError::UnsupportedSampleRate {
        requested: sample_rate,
        available,
    })
}

fn error_callback(
    role: StreamRole,
    disconnected: Arc<AtomicBool>,
) -> impl FnMut(StreamError) + Send + 'static {
    move |err| {
        tracing::error!(%role, "audio stream error: {}", err);
        if matches!(err, StreamError::DeviceNotAvailable) {
            disconnected.store(true, Ordering::Release);
        }
    }
}

fn unavailable(role: StreamRole, index: usize, err: impl std::fmt::Display) -> VirtualMicError {
    VirtualMicError::DeviceUnavailable {
        role: role.to_string(),
        index,
        reason: err.to_string(),
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open_capture(
        &self,
        index: usize,
        format: &StreamFormat,
    ) -> Result<Box<dyn CaptureStream>, VirtualMicError> {
        let role = StreamRole::Capture;
        let device = self.device(role, index)?;
        let ranges = device
            .supported_input_configs()
            .map_err(|e| unavailable(role, index, e))?;
        let supported = select_config(ranges, format.sample_rate)?;
        let sample_format = supported.sample_format();
        let config: CpalStreamConfig = supported.into();

        let (producer, reader) = capture_ring(format.ring_capacity(), format.io_timeout);
        let disconnected = Arc::new(AtomicBool::new(false));
        let on_error = error_callback(role, Arc::clone(&disconnected));

        let stream = match sample_format {
            SampleFormat::I16 => build_i16_input(&device, &config, producer, on_error),
            SampleFormat::F32 => build_f32_input(&device, &config, producer, on_error),
            other => {
                return Err(VirtualMicError::UnsupportedFormat {
                    format: format!("{other:?}"),
                })
            }
        }
        .map_err(|e| unavailable(role, index, e))?;

        stream.play().map_err(|e| unavailable(role, index, e))?;

        tracing::info!(
            device = device.name().unwrap_or_else(|_| "unknown".to_string()),
            index,
            channels = config.channels,
            sample_rate = format.sample_rate,
            "capture stream opened"
        );

        Ok(Box::new(CpalCaptureStream {
            stream,
            reader,
            disconnected,
        }))
    }

    fn open_playback(
        &self,
        path: OutputPath,
        index: usize,
        format: &StreamFormat,
    ) -> Result<Box<dyn PlaybackStream>, VirtualMicError> {
        let role = StreamRole::Output(path);
        let device = self.device(role, index)?;
        let ranges = device
            .supported_output_configs()
            .map_err(|e| unavailable(role, index, e))?;
        let supported = select_config(ranges, format.sample_rate)?;
        let sample_format = supported.sample_format();
        let config: CpalStreamConfig = supported.into();

        let (writer, consumer) = playback_ring(format.ring_capacity(), format.io_timeout);
        let disconnected = Arc::new(AtomicBool::new(false));
        let on_error = error_callback(role, Arc::clone(&disconnected));

        let stream = match sample_format {
            SampleFormat::I16 => build_i16_output(&device, &config, consumer, on_error),
            SampleFormat::F32 => build_f32_output(&device, &config, consumer, on_error),
            other => {
                return Err(VirtualMicError::UnsupportedFormat {
                    format: format!("{other:?}"),
                })
            }
        }
        .map_err(|e| unavailable(role, index, e))?;

        stream.play().map_err(|e| unavailable(role, index, e))?;

        tracing::info!(
            device = device.name().unwrap_or_else(|_| "unknown".to_string()),
            %path,
            index,
            channels = config.channels,
            sample_rate = format.sample_rate,
            "playback stream opened"
        );

        Ok(Box::new(CpalPlaybackStream {
            stream,
            writer,
            disconnected,
            path,
        }))
    }
}

fn build_i16_input(
    device: &Device,
    config: &CpalStreamConfig,
    mut producer: HeapProd<i16>,
    on_error: impl FnMut(StreamError) + Send + 'static,
) -> Result<Stream, cpal::BuildStreamError> {
    let channels = usize::from(config.channels.max(1));
    device.build_input_stream(
        config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            // Non-blocking push, samples are dropped if the loop falls behind
            for frame in data.chunks(channels) {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                let _ = producer.try_push((sum / frame.len() as i32) as i16);
            }
        },
        on_error,
        None,
    )
}

fn build_f32_input(
    device: &Device,
    config: &CpalStreamConfig,
    mut producer: HeapProd<i16>,
    on_error: impl FnMut(StreamError) + Send + 'static,
) -> Result<Stream, cpal::BuildStreamError> {
    let channels = usize::from(config.channels.max(1));
    device.build_input_stream(
        config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for frame in data.chunks(channels) {
                let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                let _ = producer.try_push(f32_to_i16(mono));
            }
        },
        on_error,
        None,
    )
}

fn build_i16_output(
    device: &Device,
    config: &CpalStreamConfig,
    mut consumer: HeapCons<i16>,
    on_error: impl FnMut(StreamError) + Send + 'static,
) -> Result<Stream, cpal::BuildStreamError> {
    let channels = usize::from(config.channels.max(1));
    device.build_output_stream(
        config,
        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
            // Underruns play silence
            for frame in data.chunks_mut(channels) {
                frame.fill(consumer.try_pop().unwrap_or(0));
            }
        },
        on_error,
        None,
    )
}

fn build_f32_output(
    device: &Device,
    config: &CpalStreamConfig,
    mut consumer: HeapCons<i16>,
    on_error: impl FnMut(StreamError) + Send + 'static,
) -> Result<Stream, cpal::BuildStreamError> {
    let channels = usize::from(config.channels.max(1));
    device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                frame.fill(i16_to_f32(consumer.try_pop().unwrap_or(0)));
            }
        },
        on_error,
        None,
    )
}

/// A running CPAL input stream. Dropping the inner stream stops the device.
struct CpalCaptureStream {
    stream: Stream,
    reader: BlockingReader,
    disconnected: Arc<AtomicBool>,
}

impl CaptureStream for CpalCaptureStream {
    fn read(&mut self, buf: &mut [i16]) -> Result<(), StreamIoError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(StreamIoError::Disconnected);
        }
        self.reader.read_exact(buf)
    }

    fn close(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!("failed to pause capture stream: {}", e);
        }
        tracing::debug!(unread = self.reader.available(), "capture stream closed");
    }
}

/// A running CPAL output stream fed from the loop through a ring buffer.
struct CpalPlaybackStream {
    stream: Stream,
    writer: BlockingWriter,
    disconnected: Arc<AtomicBool>,
    path: OutputPath,
}

impl PlaybackStream for CpalPlaybackStream {
    fn write(&mut self, chunk: &AudioChunk) -> Result<(), StreamIoError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(StreamIoError::Disconnected);
        }
        self.writer.write_all(&chunk.samples)
    }

    fn close(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!(path = %self.path, "failed to pause playback stream: {}", e);
        }
        tracing::debug!(
            path = %self.path,
            queued_free = self.writer.vacant(),
            "playback stream closed"
        );
    }
}
