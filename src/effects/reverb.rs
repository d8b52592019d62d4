//! Freeverb-style reverb with state that persists across chunks.
//!
//! Eight damped comb filters run in parallel and feed four all-pass filters in series.
//! Delay lengths are the classic Freeverb tunings at 44.1 kHz, scaled to the session rate.

/// Comb filter delay lengths at [`TUNING_SAMPLE_RATE`].
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// All-pass filter delay lengths at [`TUNING_SAMPLE_RATE`].
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];

/// Sample rate the tunings were designed for.
const TUNING_SAMPLE_RATE: f64 = 44_100.0;

/// Input attenuation before the comb bank.
const FIXED_GAIN: f32 = 0.015;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;
const WET_SCALE: f32 = 3.0;
const DRY_SCALE: f32 = 2.0;
const ALLPASS_FEEDBACK: f32 = 0.5;

/// Default damping.
pub const DEFAULT_DAMPING: f32 = 0.5;
/// Default wet level.
pub const DEFAULT_WET_LEVEL: f32 = 0.33;
/// Default dry level.
pub const DEFAULT_DRY_LEVEL: f32 = 0.4;

struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    last: f32,
}

impl CombFilter {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
            last: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.index];
        self.last = output * (1.0 - damp) + self.last * damp;
        self.buffer[self.index] = input + self.last * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

struct AllPassFilter {
    buffer: Vec<f32>,
    index: usize,
}

impl AllPassFilter {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * ALLPASS_FEEDBACK;
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }
}

/// A mono reverb whose delay lines carry over from one `process` call to the next.
///
/// The room size is fixed at construction; build a new `Reverb` to change it.
pub struct Reverb {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllPassFilter>,
    room_size: f32,
    feedback: f32,
    damp: f32,
    wet: f32,
    dry: f32,
}

impl Reverb {
    /// Creates a reverb for `room_size` in [0, 1] at the given sample rate.
    pub fn new(room_size: f32, sample_rate: u32) -> Self {
        let room_size = room_size.clamp(0.0, 1.0);
        let scale = f64::from(sample_rate) / TUNING_SAMPLE_RATE;
        let scaled = |len: usize| (len as f64 * scale).round() as usize;

        Self {
            combs: COMB_TUNINGS
                .iter()
                .map(|&len| CombFilter::new(scaled(len)))
                .collect(),
            allpasses: ALLPASS_TUNINGS
                .iter()
                .map(|&len| AllPassFilter::new(scaled(len)))
                .collect(),
            room_size,
            feedback: room_size * ROOM_SCALE + ROOM_OFFSET,
            damp: DEFAULT_DAMPING * DAMP_SCALE,
            wet: DEFAULT_WET_LEVEL * WET_SCALE,
            dry: DEFAULT_DRY_LEVEL * DRY_SCALE,
        }
    }

    /// The room size this reverb was built with.
    pub fn room_size(&self) -> f32 {
        self.room_size
    }

    /// Processes samples in place, continuing from the state left by the previous call.
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let input = *sample * FIXED_GAIN;

            let mut out = 0.0;
            for comb in &mut self.combs {
                out += comb.process(input, self.feedback, self.damp);
            }
            for allpass in &mut self.allpasses {
                out = allpass.process(out);
            }

            *sample = out * self.wet + *sample * self.dry;
        }
    }
}

impl std::fmt::Debug for Reverb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reverb")
            .field("room_size", &self.room_size)
            .field("feedback", &self.feedback)
            .finish_non_exhaustive()
    }
}
