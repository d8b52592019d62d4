//! Effect processing for one output path.

use crate::effects::{apply_noise_gate, Reverb};
use crate::format::i16_units_to_f32;
use crate::params::{EffectParameters, PathRouting};

/// Gate and reverb state owned by a single output path.
///
/// The live signal and the background contribution each get their own [`Reverb`], so tails
/// never bleed between the two signals or between paths. Both reverbs are rebuilt when the
/// room size in the parameters changes.
#[derive(Debug)]
pub struct EffectChain {
    sample_rate: u32,
    room_size: f32,
    direct_reverb: Reverb,
    background_reverb: Reverb,
}

impl EffectChain {
    /// Creates a chain for the given room size and sample rate.
    pub fn new(room_size: f32, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            room_size,
            direct_reverb: Reverb::new(room_size, sample_rate),
            background_reverb: Reverb::new(room_size, sample_rate),
        }
    }

    /// The room size the reverbs are currently built for.
    pub fn room_size(&self) -> f32 {
        self.room_size
    }

    /// Rebuilds the reverbs if the room size changed since the last chunk.
    #[allow(clippy::float_cmp)]
    fn sync_room_size(&mut self, effects: &EffectParameters) {
        if effects.room_size != self.room_size {
            tracing::debug!(
                from = self.room_size,
                to = effects.room_size,
                "rebuilding reverb for new room size"
            );
            *self = Self::new(effects.room_size, self.sample_rate);
        }
    }

    /// Processes the live signal in place.
    ///
    /// With pass-through disabled the result is silence regardless of the effect settings.
    /// Otherwise the noise gate runs first, then the reverb when enabled.
    pub fn process_direct(
        &mut self,
        samples: &mut [f32],
        effects: &EffectParameters,
        routing: PathRouting,
    ) {
        self.sync_room_size(effects);

        if !routing.pass_through_enabled {
            samples.fill(0.0);
            return;
        }

        apply_noise_gate(samples, i16_units_to_f32(effects.noise_threshold));

        if effects.reverb_enabled {
            self.direct_reverb.process(samples);
        }
    }

    /// Applies the background reverb in place when reverb-on-background is enabled.
    pub fn process_background(&mut self, samples: &mut [f32], effects: &EffectParameters) {
        self.sync_room_size(effects);

        if effects.reverb_applies_to_background {
            self.background_reverb.process(samples);
        }
    }
}
