//! Per-sample noise gate.

/// Silences every sample whose magnitude is at or below `threshold`.
///
/// `threshold` is in the same units as `samples`. A threshold of zero only touches samples
/// that are already zero, so it leaves the signal unchanged.
pub fn apply_noise_gate(samples: &mut [f32], threshold: f32) {
    for sample in samples.iter_mut() {
        if sample.abs() <= threshold {
            *sample = 0.0;
        }
    }
}
