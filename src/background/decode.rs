//! Background file decoding via Symphonia.
//!
//! Produces mono `f32` samples at the session sample rate. Any container and codec Symphonia
//! recognizes is accepted; multi-channel audio is averaged down to mono.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::format::{downmix_to_mono, resample};
use crate::VirtualMicError;

/// Decodes `path` to mono samples at `target_rate`.
///
/// # Errors
///
/// Returns [`VirtualMicError::FileError`] if the file cannot be opened,
/// [`VirtualMicError::Decode`] if it is not decodable audio, and
/// [`VirtualMicError::EmptyTrack`] if it decodes to nothing.
pub fn decode_mono(path: &Path, target_rate: u32) -> Result<Vec<f32>, VirtualMicError> {
    let file = File::open(path).map_err(|e| VirtualMicError::file_error(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VirtualMicError::decode(path, format!("unrecognized format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| VirtualMicError::decode(path, "no audio tracks found"))?;
    let track_id = track.id;
    let mut source_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VirtualMicError::decode(path, format!("unsupported codec: {e}")))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(VirtualMicError::decode(path, e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                // A corrupt packet loses a few milliseconds, the rest is still usable
                tracing::debug!(path = %path.display(), reason, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(VirtualMicError::decode(path, e.to_string())),
        };

        let spec = *decoded.spec();
        source_rate.get_or_insert(spec.rate);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        mono.extend(downmix_to_mono(buffer.samples(), spec.channels.count()));
    }

    if mono.is_empty() {
        return Err(VirtualMicError::EmptyTrack);
    }

    let source_rate = source_rate.unwrap_or(target_rate);
    tracing::debug!(
        path = %path.display(),
        samples = mono.len(),
        source_rate,
        target_rate,
        "decoded background file"
    );
    Ok(resample(&mono, source_rate, target_rate))
}
