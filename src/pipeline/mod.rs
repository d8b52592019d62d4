//! Audio pipeline components.
//!
//! ```text
//! capture callback → ring → worker loop → ring → playback callback (output 1)
//!                                      └→ ring → playback callback (output 2)
//! ```
//!
//! - **Ring buffers**: lock-free SPSC queues so device callbacks never block; the worker waits
//!   on them with a deadline
//! - **Worker**: the sequential capture → process → write loop on its own thread

#[cfg_attr(not(feature = "cpal-backend"), allow(dead_code))]
mod ring_buffer;
mod worker;

#[cfg_attr(not(feature = "cpal-backend"), allow(unused_imports))]
pub(crate) use ring_buffer::{capture_ring, playback_ring, BlockingReader, BlockingWriter};
pub(crate) use worker::run_worker;
