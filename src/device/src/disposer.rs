//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Deferred release of GPU resources.
//!
//! A resource marked disposed joins the *pending* set. The next queue signal
//! stamps the accumulated set with its fence value; once that fence retires,
//! the set is released. Disposal therefore always happens no earlier than
//! the next signal after the disposing call, and release never happens
//! before that signal's fence retires — which is exactly the guarantee
//! needed for a resource a submitted command list might still reference.
use std::collections::VecDeque;
use std::mem::replace;

use zandraw_base::FenceValue;

/// A deferred-free queue keyed to fence checkpoints.
///
/// Generic over the resource type so the device can feed it its own garbage
/// enum and tests can feed it drop trackers.
#[derive(Debug)]
pub struct Disposer<T> {
    /// Resources disposed since the last queue signal. Not yet guarded by
    /// any fence value.
    pending: Vec<T>,
    checkpoints: VecDeque<(FenceValue, Vec<T>)>,
}

impl<T> Disposer<T> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            checkpoints: VecDeque::new(),
        }
    }

    pub fn mark_disposed(&mut self, resource: T) {
        self.pending.push(resource);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.checkpoints.is_empty()
    }

    /// Stamp the accumulated pending set with `value`. At most one
    /// checkpoint is created per signal — it picks up whatever accumulated
    /// since the prior signal.
    pub fn on_queue_signal(&mut self, value: FenceValue) {
        if !self.pending.is_empty() {
            let resources = replace(&mut self.pending, Vec::new());
            self.checkpoints.push_back((value, resources));
        }
    }

    /// Release every checkpoint whose stamped fence value has retired,
    /// returning the released resources to the caller (dropping them is
    /// usually release enough, but the device also returns view slots to
    /// their free lists).
    pub fn on_fence_signaled(&mut self, value: FenceValue) -> Vec<T> {
        let mut released = Vec::new();
        while let Some(&(stamped, _)) = self.checkpoints.front() {
            if stamped > value {
                break;
            }
            let (_, mut resources) = self.checkpoints.pop_front().unwrap();
            released.append(&mut resources);
        }
        released
    }

    /// Take everything regardless of fence state. Only valid after the
    /// device has fully drained the GPU.
    pub fn drain_all(&mut self) -> Vec<T> {
        let mut all = replace(&mut self.pending, Vec::new());
        for (_, mut resources) in self.checkpoints.drain(..) {
            all.append(&mut resources);
        }
        all
    }
}
