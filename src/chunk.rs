//! Audio data chunk with metadata.

use std::sync::Arc;
use std::time::Duration;

use crate::format::{f32_slice_to_i16, i16_slice_to_f32};

/// One loop iteration's worth of mono audio.
///
/// `AudioChunk` is the unit passed to and from device streams. It holds PCM samples in
/// the devices' native 16-bit format along with its position in the session.
///
/// Samples are stored in an `Arc<Vec<i16>>` so recorded chunks can be shared cheaply.
///
/// # Example
///
/// ```
/// use virtual_mic::AudioChunk;
/// use std::time::Duration;
///
/// let chunk = AudioChunk::new(vec![0i16; 44100], 3, 44100);
/// assert_eq!(chunk.duration(), Duration::from_secs(1));
/// assert_eq!(chunk.timestamp(), Duration::from_secs(3));
/// ```
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono PCM samples in 16-bit signed integer format.
    pub samples: Arc<Vec<i16>>,

    /// Sequence number of this chunk within the session, starting at 0.
    pub index: u64,

    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Creates a new `AudioChunk`.
    pub fn new(samples: Vec<i16>, index: u64, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            index,
            sample_rate,
        }
    }

    /// Creates a chunk from processed float samples, saturating at the int16 limits.
    pub fn from_f32(samples: &[f32], index: u64, sample_rate: u32) -> Self {
        Self::new(f32_slice_to_i16(samples), index, sample_rate)
    }

    /// Writes the samples as floats into `output`, where 1.0 is int16 full scale.
    pub fn copy_to_f32(&self, output: &mut [f32]) {
        i16_slice_to_f32(&self.samples, output);
    }

    /// Returns the duration of this chunk.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Returns the offset of this chunk from the start of the session.
    pub fn timestamp(&self) -> Duration {
        self.duration() * self.index as u32
    }

    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if this chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_one_second() {
        let chunk = AudioChunk::new(vec![0i16; 16000], 0, 16000);
        assert_eq!(chunk.duration(), Duration::from_secs(1));
        assert_eq!(chunk.len(), 16000);
    }

    #[test]
    fn test_timestamp_follows_index() {
        let chunk = AudioChunk::new(vec![0i16; 100], 5, 100);
        assert_eq!(chunk.timestamp(), Duration::from_secs(5));
    }

    #[test]
    fn test_empty_chunk() {
        let chunk = AudioChunk::new(vec![], 0, 16000);
        assert!(chunk.is_empty());
        assert_eq!(chunk.duration(), Duration::ZERO);
    }

    #[test]
    fn test_zero_sample_rate() {
        let chunk = AudioChunk::new(vec![0i16; 100], 0, 0);
        assert_eq!(chunk.duration(), Duration::ZERO);
    }

    #[test]
    fn test_from_f32_saturates() {
        let chunk = AudioChunk::from_f32(&[0.5, 2.0, -2.0], 0, 100);
        assert_eq!(*chunk.samples, vec![16384, i16::MAX, i16::MIN]);

        let mut floats = [0.0f32; 3];
        chunk.copy_to_f32(&mut floats);
        assert_eq!(floats[0], 0.5);
    }
}
