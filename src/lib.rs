//! # virtual-mic
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time microphone routing with a noise gate, reverb and a looping background track.
//!
//! `virtual-mic` reads one capture device and writes the processed signal to one or two
//! playback devices (typically a virtual cable that other applications use as their
//! microphone, plus headphones for monitoring). Each output path can carry the live signal,
//! a background track, or both.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use virtual_mic::{DeviceConfig, DeviceSession, OutputPath};
//!
//! let session = DeviceSession::builder()
//!     .device_config(DeviceConfig {
//!         capture_index: 1,
//!         output_1_index: 4,      // virtual cable
//!         output_2_index: 0,      // headphones
//!         ..Default::default()
//!     })
//!     .on_event(|e| tracing::warn!(?e, "session event"))
//!     .build()?;
//!
//! session.set_second_output_enabled(true);
//! session.set_noise_threshold(400.0);
//! session.load_background_track("rain.ogg")?;
//! session.set_background_playback_enabled(OutputPath::First, true);
//!
//! session.start()?;
//! // Parameters can be changed from any thread while running
//! session.set_reverb_enabled(true);
//! session.set_background_position(50.0);
//!
//! session.stop()?;
//! ```
//!
//! ## Architecture
//!
//! - **Device callbacks**: CPAL threads that only push to or pop from lock-free rings
//! - **Worker thread**: reads one chunk (one second) at a time, runs each output path's
//!   [`EffectChain`](effects::EffectChain), mixes the background and writes the result
//! - **Control surface**: any thread; setters update a [`ParameterStore`] that the worker
//!   copies once per chunk
//!
//! Per-chunk write failures never stop the loop; they are counted in [`SessionStats`] and
//! reported through [`SessionEvent`]. A capture device that keeps failing ends the session.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod background;
mod builder;
mod chunk;
mod config;
pub mod device;
pub mod effects;
mod error;
mod event;
pub mod format;
mod params;
mod pipeline;
mod session;

pub use builder::DeviceSessionBuilder;
pub use chunk::AudioChunk;
pub use config::{DeviceConfig, SessionConfig, DEFAULT_SAMPLE_RATE};
pub use error::{StreamIoError, VirtualMicError};
pub use event::{event_callback, EventCallback, SessionEvent, StopReason};
pub use params::{
    DeviceIndices, EffectParameters, OutputPath, ParameterStore, Parameters, PathRouting,
    MAX_BACKGROUND_VOLUME, MAX_NOISE_THRESHOLD, MAX_POSITION_PERCENT,
};
pub use session::{DeviceSession, SessionState, SessionStats, WORKER_THREAD_NAME};
