//! Signal processing applied to each output path.
//!
//! - [`apply_noise_gate`]: stateless per-sample gate
//! - [`Reverb`]: comb/all-pass reverb whose delay lines persist across chunks
//! - [`EffectChain`]: the per-path combination of both, plus pass-through gating

mod chain;
mod noise_gate;
mod reverb;

pub use chain::EffectChain;
pub use noise_gate::apply_noise_gate;
pub use reverb::{Reverb, DEFAULT_DAMPING, DEFAULT_DRY_LEVEL, DEFAULT_WET_LEVEL};
