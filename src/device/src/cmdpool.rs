//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! A fixed set of command lists recycled across frames.
//!
//! Every slot is in one of three states:
//!
//! - `Available` — the list can be reset and recorded into.
//! - `Active` — the list is currently being recorded into. At most one slot
//!   is active at any time.
//! - `Closed` — the list was submitted and may still be executing. The slot
//!   becomes available again once the fence value of the signal issued at
//!   submission time retires.
//!
//! Activating a slot that is still `Closed` reports the fence value the
//! caller must block on first. This is the primary back-pressure mechanism
//! bounding how far the CPU can run ahead of the GPU: with `N` slots, at
//! most `N - 1` submissions can be in flight while a new one is recorded.
use zandraw_base as base;
use zandraw_base::{FenceValue, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Available,
    Active,
    Closed,
}

#[derive(Debug)]
struct Slot {
    list: Box<dyn base::DriverCmdList>,
    state: SlotState,
    /// The fence value of the signal that followed this slot's submission.
    /// `0` while the slot is not `Closed`, or closed but not yet stamped.
    closed_fence: FenceValue,
}

/// A fixed-population command list pool. See the module-level documentation.
#[derive(Debug)]
pub struct CmdListPool {
    slots: Vec<Slot>,
    active: Option<usize>,
    /// The slot the next activation will use. Slots are used round-robin so
    /// a slot is always the oldest submission when its turn comes again.
    next: usize,
}

impl CmdListPool {
    pub fn new(lists: Vec<Box<dyn base::DriverCmdList>>) -> Self {
        assert!(lists.len() >= 2, "the pool needs at least 2 command lists");
        Self {
            slots: lists
                .into_iter()
                .map(|list| Slot {
                    list,
                    state: SlotState::Available,
                    closed_fence: 0,
                })
                .collect(),
            active: None,
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn slot_state(&self, index: usize) -> SlotState {
        self.slots[index].state
    }

    /// Ensure some slot is `Active`, resetting the next available list.
    ///
    /// Returns `Some(fence_value)` when the next slot is still in flight —
    /// the caller must wait for that value to retire, deliver it through
    /// [`CmdListPool::on_fence_signaled`], and call this again.
    pub fn try_activate(&mut self) -> Result<Option<FenceValue>> {
        if self.active.is_some() {
            return Ok(None);
        }
        let index = self.next;
        let slot = &mut self.slots[index];
        match slot.state {
            SlotState::Available => {
                slot.list.reset()?;
                slot.state = SlotState::Active;
                self.active = Some(index);
                Ok(None)
            }
            SlotState::Closed => {
                assert!(
                    slot.closed_fence != 0,
                    "command list was submitted without a following signal"
                );
                Ok(Some(slot.closed_fence))
            }
            SlotState::Active => unreachable!(),
        }
    }

    /// The list of the active slot.
    ///
    /// # Panics
    ///
    /// Panics if no slot is active.
    pub fn active_list(&mut self) -> &mut dyn base::DriverCmdList {
        let index = self.active.expect("no active command list");
        &mut *self.slots[index].list
    }

    /// Close the active list and mark its slot `Closed`, advancing the
    /// round-robin cursor. Returns the slot index so the caller can submit
    /// the list. The caller must follow the submission with a queue signal.
    pub fn close_active(&mut self) -> Result<usize> {
        let index = self.active.take().expect("no active command list");
        let slot = &mut self.slots[index];
        slot.list.close()?;
        slot.state = SlotState::Closed;
        slot.closed_fence = 0;
        self.next = (index + 1) % self.slots.len();
        Ok(index)
    }

    pub fn list_mut(&mut self, index: usize) -> &mut dyn base::DriverCmdList {
        &mut *self.slots[index].list
    }

    /// Stamp every just-submitted slot with the fence value of the signal.
    pub fn on_queue_signal(&mut self, value: FenceValue) {
        for slot in &mut self.slots {
            if slot.state == SlotState::Closed && slot.closed_fence == 0 {
                slot.closed_fence = value;
            }
        }
    }

    /// Recycle every closed slot whose fence value has retired.
    pub fn on_fence_signaled(&mut self, value: FenceValue) {
        for slot in &mut self.slots {
            if slot.state == SlotState::Closed
                && slot.closed_fence != 0
                && slot.closed_fence <= value
            {
                slot.state = SlotState::Available;
                slot.closed_fence = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zandraw_base::DriverDevice;
    use zandraw_soft::{SoftDevice, SoftDeviceParams};

    fn new_pool(len: usize) -> CmdListPool {
        let device = SoftDevice::new(SoftDeviceParams::default());
        CmdListPool::new(
            (0..len)
                .map(|_| device.new_cmd_list().unwrap())
                .collect(),
        )
    }

    #[test]
    fn round_robin_acquire_and_blocking() {
        // Pool of two: the first two activations succeed without blocking;
        // the third reports the fence of the oldest submission, and retiring
        // that fence recycles slot 0.
        let mut pool = new_pool(2);

        assert_eq!(pool.try_activate().unwrap(), None);
        assert_eq!(pool.active_index(), Some(0));
        let index = pool.close_active().unwrap();
        assert_eq!(index, 0);
        pool.on_queue_signal(5);

        assert_eq!(pool.try_activate().unwrap(), None);
        assert_eq!(pool.active_index(), Some(1));
        pool.close_active().unwrap();
        pool.on_queue_signal(6);

        // Both slots closed; the next activation must wait for fence 5.
        assert_eq!(pool.try_activate().unwrap(), Some(5));
        assert_eq!(pool.try_activate().unwrap(), Some(5));

        pool.on_fence_signaled(5);
        assert_eq!(pool.try_activate().unwrap(), None);
        assert_eq!(pool.active_index(), Some(0));
        assert_eq!(pool.slot_state(1), SlotState::Closed);
    }

    #[test]
    fn at_most_one_active() {
        let mut pool = new_pool(3);
        pool.try_activate().unwrap();
        pool.try_activate().unwrap();
        let active = (0..pool.len())
            .filter(|&i| pool.slot_state(i) == SlotState::Active)
            .count();
        assert_eq!(active, 1);
    }

    #[test]
    fn slot_stays_closed_until_its_own_fence() {
        let mut pool = new_pool(2);
        pool.try_activate().unwrap();
        pool.close_active().unwrap();
        pool.on_queue_signal(3);

        // An older value must not recycle it.
        pool.on_fence_signaled(2);
        assert_eq!(pool.slot_state(0), SlotState::Closed);
        pool.on_fence_signaled(3);
        assert_eq!(pool.slot_state(0), SlotState::Available);
    }

    #[test]
    #[should_panic]
    fn close_without_active_is_a_usage_error() {
        let mut pool = new_pool(2);
        pool.close_active().unwrap();
    }
}
