//! Audio format conversion utilities.
//!
//! This module provides utilities for converting between audio formats:
//! - Sample format conversion (f32 ↔ i16, saturating)
//! - Channel conversion (interleaved → mono)
//! - Sample rate conversion (resampling)

mod convert;
mod resample;

pub use convert::{
    downmix_to_mono, f32_slice_to_i16, f32_to_i16, i16_slice_to_f32, i16_to_f32,
    i16_units_to_f32, I16_FULL_SCALE,
};
pub use resample::resample;
