//! Background track mixer with a chunk-granular loop cursor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::background::BackgroundTrack;
use crate::format::i16_units_to_f32;
use crate::params::{clamp_to, MAX_POSITION_PERCENT};
use crate::VirtualMicError;

/// Level of a full-scale background sample at volume 1.0, in int16 units.
pub const BACKGROUND_HEADROOM: f32 = 8000.0;

/// The track and cursor a chunk is rendered from.
///
/// Taken once per chunk so both output paths play the same slice of the track.
#[derive(Debug, Clone)]
pub struct MixerSnapshot {
    track: Arc<BackgroundTrack>,
    cursor: usize,
}

impl MixerSnapshot {
    /// Loop cursor at the time of the snapshot.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Owns the background track and its loop cursor.
///
/// Rendering never moves the cursor. The session advances it explicitly, once per processed
/// chunk, after all output paths have been rendered.
///
/// The track slot and the cursor are updated together under the slot's write lock, so a reader
/// never pairs a new track with a stale cursor.
#[derive(Debug)]
pub struct BackgroundTrackMixer {
    chunk_size: usize,
    track: RwLock<Option<Arc<BackgroundTrack>>>,
    cursor: AtomicUsize,
}

impl BackgroundTrackMixer {
    /// Creates a mixer with no track loaded.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            track: RwLock::new(None),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Replaces the track with `samples` and rewinds the cursor.
    ///
    /// # Errors
    ///
    /// Fails if the samples are empty or shorter than one chunk. The previous track stays
    /// loaded in that case.
    pub fn load(&self, samples: Vec<f32>) -> Result<usize, VirtualMicError> {
        let track = BackgroundTrack::from_samples(samples, self.chunk_size)?;
        let total_chunks = track.total_chunks();
        if track.is_silent() {
            tracing::warn!("background track is all zeros, it will play as silence");
        }

        let mut slot = self.track.write();
        *slot = Some(Arc::new(track));
        self.cursor.store(0, Ordering::Release);
        drop(slot);

        tracing::info!(total_chunks, "background track loaded");
        Ok(total_chunks)
    }

    /// Unloads the track.
    pub fn clear(&self) {
        let mut slot = self.track.write();
        *slot = None;
        self.cursor.store(0, Ordering::Release);
    }

    /// Returns `true` if a track is loaded.
    pub fn is_loaded(&self) -> bool {
        self.track.read().is_some()
    }

    /// Number of chunks in the loaded track, if any.
    pub fn total_chunks(&self) -> Option<usize> {
        self.track.read().as_ref().map(|t| t.total_chunks())
    }

    /// Current loop cursor.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Captures the current track and cursor, or `None` when nothing is loaded.
    pub fn snapshot(&self) -> Option<MixerSnapshot> {
        let slot = self.track.read();
        slot.as_ref().map(|track| MixerSnapshot {
            track: Arc::clone(track),
            cursor: self.cursor.load(Ordering::Acquire),
        })
    }

    /// Fills `out` with the background contribution for the snapshot's cursor.
    ///
    /// Reads start at `chunk_size * cursor` (modulo the track length) and wrap around the end
    /// of the track. Output is in the float domain: normalized track × headroom × `volume`.
    pub fn render(&self, snapshot: &MixerSnapshot, volume: f32, out: &mut [f32]) {
        let samples = snapshot.track.normalized();
        let len = samples.len();
        let gain = i16_units_to_f32(BACKGROUND_HEADROOM) * volume;

        let mut pos = (self.chunk_size * snapshot.cursor) % len;
        for sample in out.iter_mut() {
            *sample = samples[pos] * gain;
            pos += 1;
            if pos == len {
                pos = 0;
            }
        }
    }

    /// Moves the cursor one chunk forward, wrapping at the end of the track.
    ///
    /// Only applies if the track and cursor are still the ones in `snapshot`; a scrub or a
    /// track load that happened while the chunk was processed wins. Returns the new cursor if
    /// it moved.
    pub fn advance(&self, snapshot: &MixerSnapshot) -> Option<usize> {
        let slot = self.track.read();
        let current = slot.as_ref()?;
        if !Arc::ptr_eq(current, &snapshot.track) {
            return None;
        }

        let next = (snapshot.cursor + 1) % current.total_chunks();
        self.cursor
            .compare_exchange(snapshot.cursor, next, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| next)
    }

    /// Sets the cursor from a percentage of the track, clamped to [0, 100].
    ///
    /// Returns the effective percentage. The cursor is `floor(total_chunks * percent / 100)`,
    /// kept inside the track, so 100% selects the last chunk. Without a track the call only
    /// clamps.
    pub fn set_position_percent(&self, percent: f32) -> f32 {
        let percent = clamp_to(percent, 0.0, MAX_POSITION_PERCENT);

        let slot = self.track.read();
        if let Some(track) = slot.as_ref() {
            let total = track.total_chunks();
            let cursor = ((total as f64 * f64::from(percent) / 100.0) as usize).min(total - 1);
            self.cursor.store(cursor, Ordering::Release);
        }
        percent
    }

    /// Current position as a percentage of the track, 0 when nothing is loaded.
    pub fn position_percent(&self) -> f32 {
        let slot = self.track.read();
        match slot.as_ref() {
            Some(track) => {
                let cursor = self.cursor.load(Ordering::Acquire);
                (cursor as f64 / track.total_chunks() as f64 * 100.0) as f32
            }
            None => 0.0,
        }
    }
}
