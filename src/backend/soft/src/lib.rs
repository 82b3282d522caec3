//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Software backend for ZanDraw.
//!
//! Implements the [`zandraw_base::driver`] traits entirely on the CPU. A
//! worker thread plays the role of the GPU timeline: submitted command lists
//! are executed in order (copy commands actually move bytes between
//! in-memory resources) and fence values retire asynchronously, so the
//! synchronization machinery built on top of this backend is exercised for
//! real.
//!
//! Besides serving as the reference backend, the crate offers two test
//! affordances: `SoftDeviceParams::auto_retire = false` defers fence
//! completion until [`SoftDevice::retire_up_to`] is called (making
//! back-pressure deterministic), and recorded command logs plus draw /
//! submission counters are inspectable.
#![warn(rust_2018_idioms)]

mod buffer;
mod cmd;
mod device;
mod heap;
mod swapchain;
mod texture;

pub use self::buffer::SoftBuffer;
pub use self::cmd::{Cmd, SoftCmdList, SoftFence, SoftQueue};
pub use self::device::{SoftDevice, SoftDeviceParams, SoftPipeline, Stats};
pub use self::heap::SoftDescriptorHeap;
pub use self::swapchain::SoftSwapchain;
pub use self::texture::SoftTexture;
