//! Back-pressured delivery of resampled playback samples into the
//! output device ring buffer.
//!
//! The ring holds a bounded slice of audio, but a synthesized reply
//! arrives as one multi-second buffer. The feeder keeps the
//! undelivered tail and moves it into the ring as the device callback
//! drains it, so long utterances are never truncated.

use std::collections::VecDeque;

use ringbuf::traits::Producer;

pub struct OutputFeeder<P: Producer<Item = f32>> {
    producer: P,
    pending: VecDeque<f32>,
}

impl<P: Producer<Item = f32>> OutputFeeder<P> {
    pub fn new(producer: P) -> Self {
        Self {
            producer,
            pending: VecDeque::new(),
        }
    }

    /// Queues samples for delivery, moving as many as the ring will
    /// accept right away.
    pub fn enqueue(&mut self, samples: &[f32]) {
        self.pending.extend(samples.iter().copied());
        self.pump();
        if !self.pending.is_empty() {
            tracing::debug!(
                "{} playback samples awaiting ring space",
                self.pending.len()
            );
        }
    }

    /// Moves pending samples into the ring until it refuses one.
    pub fn pump(&mut self) {
        while let Some(&sample) = self.pending.front() {
            if self.producer.try_push(sample).is_err() {
                break;
            }
            self.pending.pop_front();
        }
    }

    /// Drops the undelivered tail. Used on interrupt, together with
    /// draining the ring itself.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
