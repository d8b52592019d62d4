//! Sample rate conversion for decoded background tracks.
//!
//! Linear interpolation is enough here: the track is resampled once at load time and is mixed
//! under the live signal.

/// Resamples mono audio from one sample rate to another.
///
/// Returns the input unchanged when the rates match. A zero rate on either side yields an
/// empty output.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    if from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let last = samples[samples.len() - 1];

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let src_idx = src_pos.floor() as usize;
            let frac = (src_pos - src_idx as f64) as f32;

            match (samples.get(src_idx), samples.get(src_idx + 1)) {
                (Some(&s1), Some(&s2)) => s1 + (s2 - s1) * frac,
                (Some(&s1), None) => s1,
                _ => last,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample(&samples, 44100, 44100), samples);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample(&[], 48000, 44100).is_empty());
    }

    #[test]
    fn test_resample_zero_rates() {
        assert!(resample(&[0.5], 16000, 0).is_empty());
        assert!(resample(&[0.5], 0, 16000).is_empty());
    }

    #[test]
    fn test_resample_downsample_length() {
        // 48kHz to 16kHz = 3:1 ratio
        let samples: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        assert_eq!(resample(&samples, 48000, 16000).len(), 160);
    }

    #[test]
    fn test_resample_interpolates() {
        let samples = vec![0.0f32, 0.4, 0.8, 1.0];
        let result = resample(&samples, 1, 2);

        assert_eq!(result.len(), 8);
        // Original samples land on even positions
        assert_eq!(result[0], 0.0);
        assert_eq!(result[2], 0.4);
        assert_eq!(result[4], 0.8);
        assert!((result[1] - 0.2).abs() < 1e-6);
        // Past the last sample the value holds
        assert_eq!(result[7], 1.0);
    }
}
