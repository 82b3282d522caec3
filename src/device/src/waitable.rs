//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Blocking on a point of the GPU timeline.
//!
//! A `Waitable` is created by every device signal: it bundles the fence, the
//! value that signal will reach, and an optional completion callback. It is
//! consumed exactly once — a second `wait` on an already-waited value
//! returns immediately without re-blocking and without re-running the
//! callback.
use std::fmt;

use zandraw_base as base;
use zandraw_base::{FenceValue, Result};

/// A consumable handle to a fence value. See the module-level documentation.
pub struct Waitable {
    fence: base::DriverFenceRef,
    value: FenceValue,
    consumed: bool,
    on_completed: Option<Box<dyn FnOnce()>>,
}

impl fmt::Debug for Waitable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waitable")
            .field("value", &self.value)
            .field("consumed", &self.consumed)
            .finish()
    }
}

impl Waitable {
    pub(crate) fn new(fence: base::DriverFenceRef, value: FenceValue) -> Self {
        Self {
            fence,
            value,
            consumed: false,
            on_completed: None,
        }
    }

    /// Attach a callback invoked exactly once when the wait completes.
    pub fn on_completed(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.on_completed = Some(Box::new(callback));
        self
    }

    pub fn value(&self) -> FenceValue {
        self.value
    }

    /// Whether the GPU has already passed this point of the timeline.
    pub fn is_completed(&self) -> bool {
        self.fence.completed_value() >= self.value
    }

    /// Block the calling thread until the fence reaches the bound value.
    ///
    /// A wait failure is not retried; the error surfaces to the caller,
    /// which treats it as fatal to the operation at hand.
    pub fn wait(&mut self) -> Result<()> {
        if self.consumed {
            return Ok(());
        }
        self.fence.wait(self.value)?;
        self.consumed = true;
        if let Some(callback) = self.on_completed.take() {
            callback();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use zandraw_base::{DriverDevice, DriverQueue};
    use zandraw_soft::{SoftDevice, SoftDeviceParams};

    #[test]
    fn wait_is_idempotent_and_runs_callback_once() {
        let device = SoftDevice::new(SoftDeviceParams::default());
        let mut queue = device.new_queue().unwrap();
        let fence = device.new_fence().unwrap();
        queue.signal(&fence, 1).unwrap();

        let count = Rc::new(Cell::new(0));
        let count2 = Rc::clone(&count);
        let mut waitable =
            Waitable::new(fence.clone(), 1).on_completed(move || count2.set(count2.get() + 1));

        waitable.wait().unwrap();
        waitable.wait().unwrap();
        assert_eq!(count.get(), 1);
        assert!(waitable.is_completed());
    }

    #[test]
    fn completion_tracks_the_fence() {
        let device = SoftDevice::new(SoftDeviceParams {
            auto_retire: false,
            ..Default::default()
        });
        let mut queue = device.new_queue().unwrap();
        let fence = device.new_fence().unwrap();
        queue.signal(&fence, 1).unwrap();

        let waitable = Waitable::new(fence.clone(), 1);
        // The signal is gated; give the worker a moment and check nothing
        // retired on its own.
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(!waitable.is_completed());

        device.retire_up_to(1);
        let mut waitable = waitable;
        waitable.wait().unwrap();
    }
}
