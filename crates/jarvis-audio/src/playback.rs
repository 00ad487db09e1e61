use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::pcm::AudioBuffer;

/// Monotonic time source for the scheduler. The service binds this to
/// the output device clock; tests drive it by hand.
pub trait Clock: Send + Sync {
    /// Seconds since an arbitrary epoch. Must never go backwards.
    fn now(&self) -> f64;
}

/// Wall-clock backed [`Clock`] anchored at creation time.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Identifier for an in-flight playback instance.
pub type HandleId = u64;

/// A chunk admitted to playback, bound to its start slot.
#[derive(Debug, Clone)]
pub struct Scheduled {
    pub id: HandleId,
    pub start_at: f64,
    pub buffer: AudioBuffer,
}

impl Scheduled {
    pub fn end_at(&self) -> f64 {
        self.start_at + self.buffer.duration_secs()
    }
}

/// Keeps sequential audio chunks playing back-to-back and tracks the
/// live set of playback handles.
///
/// Each new chunk starts no earlier than the end of the previous one,
/// so chunks play in arrival order and never overlap. The aggregate
/// "is speaking" signal is true exactly while the active set is
/// non-empty.
pub struct PlaybackScheduler {
    clock: Arc<dyn Clock>,
    next_start_time: f64,
    next_id: HandleId,
    active: HashMap<HandleId, Scheduled>,
}

impl PlaybackScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_start_time: 0.0,
            next_id: 0,
            active: HashMap::new(),
        }
    }

    /// Admits a buffer for playback. The start slot is clamped to be no
    /// earlier than the current device clock, and the cursor advances
    /// past the buffer's end.
    pub fn schedule(&mut self, buffer: AudioBuffer) -> Scheduled {
        let start_at = self.next_start_time.max(self.clock.now());
        self.next_start_time = start_at + buffer.duration_secs();
        let id = self.next_id;
        self.next_id += 1;
        let scheduled = Scheduled {
            id,
            start_at,
            buffer,
        };
        self.active.insert(id, scheduled.clone());
        tracing::debug!(
            "scheduled playback handle {} at {:.3}s ({} active)",
            id,
            start_at,
            self.active.len()
        );
        scheduled
    }

    /// Marks a handle's natural completion, removing it from the active
    /// set. Returns true if the handle was still live.
    pub fn complete(&mut self, id: HandleId) -> bool {
        let removed = self.active.remove(&id).is_some();
        if removed && self.active.is_empty() {
            tracing::debug!("last playback handle finished");
        }
        removed
    }

    /// Stops every in-flight handle, clears the active set and resets
    /// the cursor to the current clock. Used on barge-in and whenever a
    /// session starts or ends.
    pub fn interrupt_all(&mut self) -> Vec<HandleId> {
        let mut stopped: Vec<HandleId> = self.active.drain().map(|(id, _)| id).collect();
        stopped.sort_unstable();
        self.next_start_time = self.clock.now();
        if !stopped.is_empty() {
            tracing::debug!("interrupted {} playback handles", stopped.len());
        }
        stopped
    }

    /// True iff at least one playback handle is live.
    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ManualClock {
        now: Mutex<f64>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(0.0),
            })
        }

        fn advance(&self, secs: f64) {
            *self.now.lock().unwrap() += secs;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> f64 {
            *self.now.lock().unwrap()
        }
    }

    fn one_second_buffer() -> AudioBuffer {
        AudioBuffer::new(vec![0.0; 24000], 24000, 1)
    }

    #[test]
    fn chunks_never_overlap() {
        let clock = ManualClock::new();
        let mut scheduler = PlaybackScheduler::new(clock.clone());

        let first = scheduler.schedule(one_second_buffer());
        let second = scheduler.schedule(one_second_buffer());
        let third = scheduler.schedule(one_second_buffer());

        assert!(second.start_at >= first.end_at());
        assert!(third.start_at >= second.end_at());
    }

    #[test]
    fn start_clamped_to_device_clock() {
        let clock = ManualClock::new();
        let mut scheduler = PlaybackScheduler::new(clock.clone());

        let first = scheduler.schedule(one_second_buffer());
        assert_eq!(first.start_at, 0.0);

        // Clock runs past the cursor while no audio arrives.
        clock.advance(5.0);
        let late = scheduler.schedule(one_second_buffer());
        assert_eq!(late.start_at, 5.0);
        assert_eq!(scheduler.next_start_time(), 6.0);
    }

    #[test]
    fn speaking_signal_tracks_active_set() {
        let clock = ManualClock::new();
        let mut scheduler = PlaybackScheduler::new(clock.clone());
        assert!(!scheduler.is_speaking());

        let a = scheduler.schedule(one_second_buffer());
        let b = scheduler.schedule(one_second_buffer());
        assert!(scheduler.is_speaking());

        assert!(scheduler.complete(a.id));
        assert!(scheduler.is_speaking());

        assert!(scheduler.complete(b.id));
        assert!(!scheduler.is_speaking());

        // Completing a dead handle is a no-op.
        assert!(!scheduler.complete(b.id));
    }

    #[test]
    fn interrupt_stops_everything_and_resets_cursor() {
        let clock = ManualClock::new();
        let mut scheduler = PlaybackScheduler::new(clock.clone());

        scheduler.schedule(one_second_buffer());
        scheduler.schedule(one_second_buffer());
        assert!(scheduler.is_speaking());
        assert_eq!(scheduler.next_start_time(), 2.0);

        clock.advance(0.5);
        let stopped = scheduler.interrupt_all();
        assert_eq!(stopped.len(), 2);
        assert!(!scheduler.is_speaking());
        assert_eq!(scheduler.next_start_time(), 0.5);
    }
}
