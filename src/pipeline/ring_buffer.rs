//! Blocking, timeout-bounded access to the ring buffers behind callback-driven streams.
//!
//! Device callbacks run on the audio library's thread and must never block, so they only push
//! to or pop from a lock-free SPSC ring. The loop thread sits on the other end and waits, with
//! a deadline, until a whole chunk has moved.

use std::thread;
use std::time::{Duration, Instant};

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::StreamIoError;

/// How often a blocked reader or writer re-checks the ring.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Loop-side end of a capture ring.
pub struct BlockingReader {
    consumer: HeapCons<i16>,
    timeout: Duration,
}

impl BlockingReader {
    /// Wraps a ring consumer.
    pub fn new(consumer: HeapCons<i16>, timeout: Duration) -> Self {
        Self { consumer, timeout }
    }

    /// Fills `out` completely, waiting at most the configured timeout.
    ///
    /// On timeout the samples already popped are lost; the next call starts a fresh chunk.
    pub fn read_exact(&mut self, out: &mut [i16]) -> Result<(), StreamIoError> {
        let started = Instant::now();
        let mut filled = 0;

        loop {
            filled += self.consumer.pop_slice(&mut out[filled..]);
            if filled == out.len() {
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(StreamIoError::Timeout {
                    waited,
                    transferred: filled,
                    expected: out.len(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Number of samples waiting in the ring.
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }
}

/// Loop-side end of a playback ring.
pub struct BlockingWriter {
    producer: HeapProd<i16>,
    timeout: Duration,
}

impl BlockingWriter {
    /// Wraps a ring producer.
    pub fn new(producer: HeapProd<i16>, timeout: Duration) -> Self {
        Self { producer, timeout }
    }

    /// Pushes every sample, waiting at most the configured timeout for room.
    ///
    /// On timeout the samples already pushed stay queued and will still play.
    pub fn write_all(&mut self, samples: &[i16]) -> Result<(), StreamIoError> {
        let started = Instant::now();
        let mut written = 0;

        loop {
            written += self.producer.push_slice(&samples[written..]);
            if written == samples.len() {
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(StreamIoError::Timeout {
                    waited,
                    transferred: written,
                    expected: samples.len(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Free space in the ring, in samples.
    pub fn vacant(&self) -> usize {
        self.producer.vacant_len()
    }
}

/// Creates a capture ring: the producer goes to the device callback, the reader to the loop.
pub fn capture_ring(capacity: usize, timeout: Duration) -> (HeapProd<i16>, BlockingReader) {
    let (producer, consumer) = HeapRb::<i16>::new(capacity.max(1)).split();
    (producer, BlockingReader::new(consumer, timeout))
}

/// Creates a playback ring: the writer goes to the loop, the consumer to the device callback.
pub fn playback_ring(capacity: usize, timeout: Duration) -> (BlockingWriter, HeapCons<i16>) {
    let (producer, consumer) = HeapRb::<i16>::new(capacity.max(1)).split();
    (BlockingWriter::new(producer, timeout), consumer)
}
