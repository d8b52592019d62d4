//! Decoded background track.

use crate::VirtualMicError;

/// A loaded background track, normalized to its own peak.
///
/// The peak is taken once over the whole track at load time. A track whose samples are all
/// zero stays silent instead of dividing by zero.
#[derive(Debug, Clone)]
pub struct BackgroundTrack {
    normalized: Vec<f32>,
    peak: f32,
    total_chunks: usize,
}

impl BackgroundTrack {
    /// Builds a track from mono samples at the session rate.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualMicError::EmptyTrack`] for an empty input and
    /// [`VirtualMicError::DegenerateTrack`] when the input is shorter than one chunk.
    pub fn from_samples(samples: Vec<f32>, chunk_size: usize) -> Result<Self, VirtualMicError> {
        if samples.is_empty() {
            return Err(VirtualMicError::EmptyTrack);
        }
        if chunk_size == 0 || samples.len() < chunk_size {
            return Err(VirtualMicError::DegenerateTrack {
                samples: samples.len(),
                chunk_size,
            });
        }

        let peak = samples
            .iter()
            .filter(|s| s.is_finite())
            .fold(0.0f32, |peak, s| peak.max(s.abs()));

        let mut normalized = samples;
        for sample in &mut normalized {
            *sample = if peak > 0.0 && sample.is_finite() {
                *sample / peak
            } else {
                0.0
            };
        }

        let total_chunks = normalized.len() / chunk_size;
        Ok(Self {
            normalized,
            peak,
            total_chunks,
        })
    }

    /// Samples scaled so the loudest one has magnitude 1.0.
    pub fn normalized(&self) -> &[f32] {
        &self.normalized
    }

    /// Peak magnitude of the samples as loaded.
    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Number of samples.
    pub fn sample_count(&self) -> usize {
        self.normalized.len()
    }

    /// Number of whole chunks in the track. Always at least 1.
    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    /// `true` if the track has no audible content.
    pub fn is_silent(&self) -> bool {
        self.peak == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            BackgroundTrack::from_samples(vec![], 100),
            Err(VirtualMicError::EmptyTrack)
        ));
    }

    #[test]
    fn test_rejects_shorter_than_chunk() {
        let result = BackgroundTrack::from_samples(vec![0.5; 99], 100);
        assert!(matches!(
            result,
            Err(VirtualMicError::DegenerateTrack {
                samples: 99,
                chunk_size: 100
            })
        ));
    }

    #[test]
    fn test_total_chunks_floors() {
        let track = BackgroundTrack::from_samples(vec![0.1; 350], 100).unwrap();
        assert_eq!(track.total_chunks(), 3);
        assert_eq!(track.sample_count(), 350);
    }

    #[test]
    fn test_normalizes_to_peak() {
        let track = BackgroundTrack::from_samples(vec![0.25, -0.5, 0.125, 0.0], 2).unwrap();
        assert_eq!(track.peak(), 0.5);
        assert_eq!(track.normalized(), &[0.5, -1.0, 0.25, 0.0]);
    }

    #[test]
    fn test_all_zero_track_is_silent() {
        let track = BackgroundTrack::from_samples(vec![0.0; 10], 5).unwrap();
        assert!(track.is_silent());
        assert!(track.normalized().iter().all(|&s| s == 0.0));
    }
}
