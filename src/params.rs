//! Runtime parameters shared between the control surface and the audio loop.
//!
//! Every setter clamps its input and returns the value that took effect. The loop never reads
//! fields one by one; it copies a whole [`Parameters`] snapshot at the top of each chunk, so a
//! chunk is always processed with one coherent configuration.

use std::fmt;

use parking_lot::RwLock;

/// Upper bound for the noise gate threshold, in int16 sample units.
pub const MAX_NOISE_THRESHOLD: f32 = 3000.0;
/// Upper bound for the background track volume.
pub const MAX_BACKGROUND_VOLUME: f32 = 3.0;
/// Upper bound for the background position, in percent.
pub const MAX_POSITION_PERCENT: f32 = 100.0;

/// One of the two playback destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputPath {
    /// The first output, always opened.
    First,
    /// The second output, opened when enabled at start.
    Second,
}

impl OutputPath {
    /// Both paths in processing order.
    pub const ALL: [OutputPath; 2] = [OutputPath::First, OutputPath::Second];

    /// Zero-based position of the path.
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

impl fmt::Display for OutputPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("output 1"),
            Self::Second => f.write_str("output 2"),
        }
    }
}

/// Per-path routing flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathRouting {
    /// Route the live (gated, reverberated) capture signal to this path.
    pub pass_through_enabled: bool,
    /// Mix the background track into this path.
    pub background_playback_enabled: bool,
}

/// Device indices used by the next `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceIndices {
    /// Capture device.
    pub capture: usize,
    /// First playback device.
    pub output_1: usize,
    /// Second playback device.
    pub output_2: usize,
}

impl DeviceIndices {
    /// Device index for the given output path.
    pub fn output(&self, path: OutputPath) -> usize {
        match path {
            OutputPath::First => self.output_1,
            OutputPath::Second => self.output_2,
        }
    }
}

/// Effect settings shared by both paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParameters {
    /// Samples with magnitude at or below this (int16 units) are silenced.
    pub noise_threshold: f32,
    /// Apply reverb to the live signal.
    pub reverb_enabled: bool,
    /// Apply reverb to the background contribution.
    pub reverb_applies_to_background: bool,
    /// Reverb room size in [0, 1].
    pub room_size: f32,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            noise_threshold: 0.0,
            reverb_enabled: false,
            reverb_applies_to_background: false,
            room_size: 0.25,
        }
    }
}

/// A coherent copy of every runtime parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    /// Device indices for the next start.
    pub devices: DeviceIndices,
    /// Whether output path 2 exists.
    pub second_output_enabled: bool,
    /// Routing flags, indexed by [`OutputPath::index`].
    pub routing: [PathRouting; 2],
    /// Effect settings.
    pub effects: EffectParameters,
    /// Background track volume in [0, 3].
    pub background_volume: f32,
}

impl Parameters {
    /// Routing flags for one path.
    pub fn routing(&self, path: OutputPath) -> PathRouting {
        self.routing[path.index()]
    }

    /// Whether the loop should process this path at all.
    pub fn path_enabled(&self, path: OutputPath) -> bool {
        match path {
            OutputPath::First => true,
            OutputPath::Second => self.second_output_enabled,
        }
    }

    /// Returns a copy with every ranged field clamped the way the setters clamp it.
    pub fn clamped(mut self) -> Self {
        self.effects.noise_threshold =
            clamp_to(self.effects.noise_threshold, 0.0, MAX_NOISE_THRESHOLD);
        self.effects.room_size = clamp_to(self.effects.room_size, 0.0, 1.0);
        self.background_volume = clamp_to(self.background_volume, 0.0, MAX_BACKGROUND_VOLUME);
        self
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            devices: DeviceIndices::default(),
            second_output_enabled: false,
            routing: [
                PathRouting {
                    pass_through_enabled: true,
                    background_playback_enabled: false,
                },
                PathRouting::default(),
            ],
            effects: EffectParameters::default(),
            background_volume: 0.7,
        }
    }
}

/// Clamps `value` into `[min, max]`. NaN maps to `min`.
pub(crate) fn clamp_to(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

/// Thread-safe holder of the current [`Parameters`].
///
/// Writers and the audio loop only hold the lock for a struct copy, so a setter can never stall
/// the loop for longer than that.
#[derive(Debug, Default)]
pub struct ParameterStore {
    inner: RwLock<Parameters>,
}

impl ParameterStore {
    /// Creates a store holding the given parameters, clamped into range.
    pub fn new(initial: Parameters) -> Self {
        Self {
            inner: RwLock::new(initial.clamped()),
        }
    }

    /// Returns a copy of the current parameters.
    pub fn snapshot(&self) -> Parameters {
        *self.inner.read()
    }

    fn update<R>(&self, f: impl FnOnce(&mut Parameters) -> R) -> R {
        let mut guard = self.inner.write();
        f(&mut *guard)
    }

    /// Sets the capture device index.
    pub fn set_capture_device_index(&self, index: usize) {
        self.update(|p| p.devices.capture = index);
    }

    /// Sets the device index of an output path.
    pub fn set_output_device_index(&self, path: OutputPath, index: usize) {
        self.update(|p| match path {
            OutputPath::First => p.devices.output_1 = index,
            OutputPath::Second => p.devices.output_2 = index,
        });
    }

    /// Enables or disables output path 2.
    pub fn set_second_output_enabled(&self, enabled: bool) {
        self.update(|p| p.second_output_enabled = enabled);
    }

    /// Enables or disables routing the live signal to a path.
    pub fn set_pass_through_enabled(&self, path: OutputPath, enabled: bool) {
        self.update(|p| p.routing[path.index()].pass_through_enabled = enabled);
    }

    /// Enables or disables background playback on a path.
    pub fn set_background_playback_enabled(&self, path: OutputPath, enabled: bool) {
        self.update(|p| p.routing[path.index()].background_playback_enabled = enabled);
    }

    /// Sets the noise gate threshold, clamped to [0, 3000]. Returns the effective value.
    pub fn set_noise_threshold(&self, threshold: f32) -> f32 {
        let threshold = clamp_to(threshold, 0.0, MAX_NOISE_THRESHOLD);
        self.update(|p| p.effects.noise_threshold = threshold);
        threshold
    }

    /// Enables or disables reverb on the live signal.
    pub fn set_reverb_enabled(&self, enabled: bool) {
        self.update(|p| p.effects.reverb_enabled = enabled);
    }

    /// Enables or disables reverb on the background contribution.
    pub fn set_reverb_applies_to_background(&self, enabled: bool) {
        self.update(|p| p.effects.reverb_applies_to_background = enabled);
    }

    /// Sets the reverb room size, clamped to [0, 1]. Returns the effective value.
    ///
    /// The loop rebuilds its reverbs when it sees the new size at the next chunk.
    pub fn set_reverb_room_size(&self, room_size: f32) -> f32 {
        let room_size = clamp_to(room_size, 0.0, 1.0);
        self.update(|p| p.effects.room_size = room_size);
        room_size
    }

    /// Sets the background volume, clamped to [0, 3]. Returns the effective value.
    pub fn set_background_volume(&self, volume: f32) -> f32 {
        let volume = clamp_to(volume, 0.0, MAX_BACKGROUND_VOLUME);
        self.update(|p| p.background_volume = volume);
        volume
    }
}
