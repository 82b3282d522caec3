//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Implementation of `DriverFence` for the software backend.
use parking_lot::{Condvar, Mutex};
use std::any::Any;

use zandraw_base as base;
use zandraw_base::{FenceValue, Result};

/// Implementation of `DriverFence` for the software backend.
///
/// The worker thread advances the completed value; waiters block on the
/// condition variable.
#[derive(Debug)]
pub struct SoftFence {
    completed: Mutex<FenceValue>,
    condvar: Condvar,
}

impl SoftFence {
    pub(crate) fn new() -> Self {
        Self {
            completed: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn signal_to(&self, value: FenceValue) {
        let mut completed = self.completed.lock();
        if value > *completed {
            *completed = value;
            self.condvar.notify_all();
        }
    }
}

impl base::DriverFence for SoftFence {
    fn completed_value(&self) -> FenceValue {
        *self.completed.lock()
    }

    fn wait(&self, value: FenceValue) -> Result<()> {
        let mut completed = self.completed.lock();
        while *completed < value {
            self.condvar.wait(&mut completed);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
