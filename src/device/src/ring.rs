//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! A circular transient allocator reclaimed by fence checkpoints.
//!
//! `Ring` hands out contiguous regions of a fixed-capacity circular space —
//! bytes of an upload buffer, or slots of a shader-visible descriptor heap
//! (the unit does not matter to the arithmetic). Reclamation is automatic:
//! whenever the owning device requests a queue signal, the ring records a
//! checkpoint `{tail, fence_value}`; once the fence retires past a
//! checkpoint, everything allocated before it becomes free again.
//!
//! The ring itself is pure bookkeeping and never blocks. The device drives
//! the blocking policy (flush-and-wait once when a reservation cannot be
//! placed, proactive flush when utilization passes a threshold) on top of
//! [`Ring::try_reserve`], [`Ring::should_flush`] and
//! [`Ring::oldest_pending_fence`].
use std::collections::VecDeque;
use std::ops::Range;

use zandraw_base::FenceValue;
use zandraw_common::round_up;

#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    /// Where `tail` was when the signal was requested.
    tail: u64,
    fence_value: FenceValue,
}

/// A circular transient allocator. See the module-level documentation.
#[derive(Debug)]
pub struct Ring {
    size: u64,
    /// Offset of the oldest live unit.
    head: u64,
    /// Offset at which the next allocation is attempted. May equal `size`
    /// transiently (the next allocation wraps).
    tail: u64,
    /// Units currently live, including padding and wrap-around waste.
    used: u64,
    /// Units allocated since the last checkpoint.
    uncommitted: u64,
    checkpoints: VecDeque<Checkpoint>,
}

impl Ring {
    pub fn new(size: u64) -> Self {
        assert!(size > 0);
        Self {
            size,
            head: 0,
            tail: 0,
            used: 0,
            uncommitted: 0,
            checkpoints: VecDeque::new(),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn uncommitted(&self) -> u64 {
        self.uncommitted
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Try to place a contiguous allocation, without blocking.
    ///
    /// Returns the allocated range on success. Failure means the request
    /// overlaps still-in-flight data; the caller is expected to flush, wait
    /// for [`Ring::oldest_pending_fence`], and retry once.
    ///
    /// # Panics
    ///
    /// `align` must be a power of two — anything else is a usage error.
    pub fn try_reserve(&mut self, size: u64, align: u64) -> Option<Range<u64>> {
        assert!(size > 0);
        assert!(
            align.is_power_of_two(),
            "alignment must be a power of two"
        );
        let padded = round_up(size, align);
        if padded > self.size {
            return None;
        }

        if self.used == 0 {
            // Fully drained; restart from the origin.
            debug_assert!(self.checkpoints.is_empty());
            debug_assert_eq!(self.uncommitted, 0);
            self.head = 0;
            self.tail = padded;
            self.used = padded;
            self.uncommitted = padded;
            return Some(0..size);
        }

        let (start, new_tail, consumed) = if self.tail > self.head {
            // Not wrapped: [head, tail) is live.
            let aligned = round_up(self.tail, align);
            if aligned + padded <= self.size {
                (aligned, aligned + padded, aligned + padded - self.tail)
            } else if padded < self.head {
                // Loop back to the origin, wasting [tail, size).
                (0, padded, (self.size - self.tail) + padded)
            } else {
                return None;
            }
        } else {
            // Wrapped: [head, size) and [0, tail) are live. The allocation
            // must fit strictly before `head`.
            let aligned = round_up(self.tail, align);
            if aligned + padded < self.head {
                (aligned, aligned + padded, aligned + padded - self.tail)
            } else {
                return None;
            }
        };

        debug_assert!(self.used + consumed <= self.size);
        self.tail = new_tail;
        self.used += consumed;
        self.uncommitted += consumed;
        Some(start..start + size)
    }

    /// Whether utilization has passed `threshold` and the owner should
    /// proactively flush, keeping the ring from ever reaching 100%
    /// utilization under steady load.
    pub fn should_flush(&self, threshold: u64) -> bool {
        self.used > threshold
    }

    /// The fence value of the oldest outstanding checkpoint, if any.
    pub fn oldest_pending_fence(&self) -> Option<FenceValue> {
        self.checkpoints.front().map(|cp| cp.fence_value)
    }

    /// Record a checkpoint for a queue signal of `value`. No-op if nothing
    /// was allocated since the previous checkpoint.
    pub fn on_queue_signal(&mut self, value: FenceValue) {
        if self.uncommitted > 0 {
            self.checkpoints.push_back(Checkpoint {
                tail: self.tail,
                fence_value: value,
            });
            self.uncommitted = 0;
        }
    }

    /// Reclaim every checkpoint whose fence value has retired, advancing
    /// `head` and returning the reclaimed units to the pool.
    pub fn on_fence_signaled(&mut self, value: FenceValue) {
        while let Some(cp) = self.checkpoints.front().cloned() {
            if cp.fence_value > value {
                break;
            }
            self.checkpoints.pop_front();

            let reclaimed = if cp.tail > self.head {
                cp.tail - self.head
            } else {
                // The region covered by this checkpoint wrapped around.
                (self.size - self.head) + cp.tail
            };
            debug_assert!(reclaimed <= self.used);
            self.head = cp.tail;
            self.used -= reclaimed;
        }
        if self.used == self.uncommitted {
            debug_assert!(self.checkpoints.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn reserve_aligned() {
        // A 256-unit ring with a flush threshold of 128: a padded 112-unit
        // allocation fits without crossing the threshold.
        let mut ring = Ring::new(256);
        let range = ring.try_reserve(100, 16).unwrap();
        assert_eq!(range.start % 16, 0);
        assert_eq!(range.start, 0);
        assert_eq!(ring.used(), 112);
        assert!(!ring.should_flush(128));
    }

    #[test]
    fn reserve_crossing_threshold() {
        let mut ring = Ring::new(256);
        ring.try_reserve(100, 16).unwrap();
        assert_eq!(ring.used(), 112);
        ring.try_reserve(32, 16).unwrap();
        // 144 > 128: the owner is now expected to flush.
        assert!(ring.should_flush(128));
    }

    #[test]
    fn exhaustion_then_retirement() {
        // A reservation that cannot be placed succeeds after the oldest
        // checkpoint retires — the non-blocking half of the
        // flush-and-retry-once policy.
        let mut ring = Ring::new(256);
        ring.try_reserve(100, 16).unwrap();
        assert!(ring.try_reserve(200, 16).is_none());

        ring.on_queue_signal(5);
        assert_eq!(ring.oldest_pending_fence(), Some(5));
        ring.on_fence_signaled(5);
        assert!(ring.is_empty());
        let range = ring.try_reserve(200, 16).unwrap();
        assert_eq!(range.start, 0);
    }

    #[test]
    fn wraparound_placement() {
        let mut ring = Ring::new(256);
        ring.try_reserve(96, 16).unwrap(); // [0, 96)
        ring.on_queue_signal(1);
        ring.try_reserve(96, 16).unwrap(); // [96, 192)
        ring.on_queue_signal(2);

        // Reclaim the first region; the next allocation does not fit at the
        // end and must loop back to the origin.
        ring.on_fence_signaled(1);
        let range = ring.try_reserve(80, 16).unwrap();
        assert_eq!(range.start, 0);
        // Live: [96, 192) plus the wrapped [0, 80) plus the wasted tail.
        assert!(ring.used() <= ring.size());
    }

    #[test]
    fn wrapped_allocation_stops_at_head() {
        let mut ring = Ring::new(256);
        ring.try_reserve(96, 16).unwrap(); // [0, 96)
        ring.on_queue_signal(1);
        ring.try_reserve(96, 16).unwrap(); // [96, 192)
        ring.on_queue_signal(2);
        ring.on_fence_signaled(1); // head = 96
        ring.try_reserve(64, 16).unwrap(); // fills the end: [192, 256)
        let range = ring.try_reserve(80, 16).unwrap(); // wraps: [0, 80)
        assert_eq!(range.start, 0);

        // head is at 96; a wrapped allocation must end strictly before it.
        assert!(ring.try_reserve(16, 16).is_none()); // would end exactly at 96
        assert_eq!(ring.try_reserve(8, 8).unwrap().start, 80); // ends at 88
    }

    #[test]
    fn checkpoint_without_allocations_is_elided() {
        let mut ring = Ring::new(64);
        ring.try_reserve(16, 16).unwrap();
        ring.on_queue_signal(1);
        ring.on_queue_signal(2); // nothing new allocated
        assert_eq!(ring.oldest_pending_fence(), Some(1));
        ring.on_fence_signaled(1);
        assert!(ring.is_empty());
        assert_eq!(ring.oldest_pending_fence(), None);
    }

    /// Simulate interleaved reserve/signal/retire traffic and check the two
    /// safety properties: `used <= size` at every step, and no region is
    /// handed out while an earlier, unretired region overlaps it.
    #[test]
    fn random_traffic_never_overlaps() {
        let mut rng = SmallRng::seed_from_u64(0x5a17);

        for _ in 0..32 {
            let mut ring = Ring::new(1024);
            let mut next_fence: FenceValue = 0;
            // (range, fence_value or 0 when uncommitted)
            let mut live: Vec<(Range<u64>, FenceValue)> = Vec::new();

            for _ in 0..2048 {
                match rng.gen_range(0, 10) {
                    0..=6 => {
                        let size = rng.gen_range(1, 128u64);
                        let align = 1u64 << rng.gen_range(0, 7);
                        if let Some(range) = ring.try_reserve(size, align) {
                            assert_eq!(range.start % align, 0);
                            assert!(range.end <= ring.size());
                            for (other, _) in &live {
                                assert!(
                                    range.end <= other.start || range.start >= other.end,
                                    "{:?} overlaps live {:?}",
                                    range,
                                    other
                                );
                            }
                            live.push((range, 0));
                        }
                    }
                    7..=8 => {
                        next_fence += 1;
                        ring.on_queue_signal(next_fence);
                        for entry in live.iter_mut().filter(|e| e.1 == 0) {
                            entry.1 = next_fence;
                        }
                    }
                    _ => {
                        if next_fence > 0 {
                            let value = rng.gen_range(1, next_fence + 1);
                            ring.on_fence_signaled(value);
                            live.retain(|e| e.1 == 0 || e.1 > value);
                        }
                    }
                }
                assert!(ring.used() <= ring.size());
            }
        }
    }

    #[test]
    #[should_panic]
    fn non_power_of_two_alignment_is_a_usage_error() {
        let mut ring = Ring::new(64);
        ring.try_reserve(8, 3);
    }
}
