//! Sample format conversion.
//!
//! Processing happens on `f32` where `1.0` is int16 full scale (32768). Going back to int16
//! rounds to nearest and saturates, so loud mixes clip instead of wrapping around.

/// Float value of int16 full scale.
pub const I16_FULL_SCALE: f32 = 32768.0;

/// Converts an i16 sample to f32.
///
/// Output will be in the range [-1.0, 1.0).
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / I16_FULL_SCALE
}

/// Converts an f32 sample to i16, saturating at the int16 limits.
///
/// NaN maps to 0.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    // `as` saturates float-to-int casts and maps NaN to 0
    (sample * I16_FULL_SCALE).round() as i16
}

/// Converts a value in int16 units (e.g. a threshold of 3000) to the float domain.
#[inline]
pub fn i16_units_to_f32(value: f32) -> f32 {
    value / I16_FULL_SCALE
}

/// Batch converts i16 samples into an existing f32 buffer.
///
/// Converts `min(input.len(), output.len())` samples.
pub fn i16_slice_to_f32(input: &[i16], output: &mut [f32]) {
    for (out, &sample) in output.iter_mut().zip(input) {
        *out = i16_to_f32(sample);
    }
}

/// Batch converts f32 samples to i16.
pub fn f32_slice_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| f32_to_i16(s)).collect()
}

/// Averages interleaved frames of `channels` samples down to mono.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
