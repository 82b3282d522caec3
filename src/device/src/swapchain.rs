//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Presentation: the swap chain and its frame pacing.
//!
//! `present` signals the queue after queuing the presentation and keeps the
//! resulting waitable in a per-swapchain deque. Before submitting a new
//! frame, the oldest of `buffer_count` prior frames is waited on — this is
//! what bounds how many frames the CPU may queue ahead of the GPU.
use std::collections::VecDeque;
use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;

use zandraw_base as base;
use zandraw_base::{Error, ErrorKind, Result};
use zandraw_common::Rect2D;

use crate::device::Device;
use crate::resources::{RenderTarget, Texture, TextureInner};
use crate::waitable::Waitable;

/// A presentable surface bound to a native window. See the module-level
/// documentation.
#[derive(Debug)]
pub struct Swapchain {
    driver: Box<dyn base::DriverSwapchain>,
    buffer_count: u32,
    format: base::ImageFormat,
    /// Waitables of frames queued for presentation, oldest first.
    frames: VecDeque<Waitable>,
    /// The back buffer bound by `prepare`, consumed by `present`.
    current: Option<RenderTarget>,
}

impl Swapchain {
    pub(crate) fn new(
        driver: Box<dyn base::DriverSwapchain>,
        buffer_count: u32,
        format: base::ImageFormat,
    ) -> Self {
        Self {
            driver,
            buffer_count,
            format,
            frames: VecDeque::new(),
            current: None,
        }
    }

    pub fn extent(&self) -> (u32, u32) {
        self.driver.extent()
    }

    /// Bind the current back buffer as the device's render target and
    /// restrict rendering to `dirty_region` (`None` repaints everything).
    ///
    /// Back buffers rest in the `Present` state between frames; this
    /// records the transition into the render-target state.
    pub fn prepare(
        &mut self,
        device: &mut Device,
        dirty_region: Option<Rect2D<u32>>,
    ) -> Result<RenderTarget> {
        let (width, height) = self.driver.extent();
        let texture = Texture {
            inner: Arc::new(TextureInner {
                driver: self.driver.back_buffer(),
                desc: base::TextureDesc {
                    width,
                    height,
                    format: self.format,
                    usage: base::TextureUsageFlags::RENDER_TARGET
                        | base::TextureUsageFlags::COPY_READ,
                    mip_levels: 1,
                    sample_count: 1,
                },
                state: Mutex::new(base::ResourceState::Present),
                srv_slot: None,
            }),
        };
        let target = RenderTarget { texture };
        device.set_render_target(&target)?;
        device.set_scissor(dirty_region);
        self.current = Some(target.clone());
        Ok(target)
    }

    /// Queue the prepared frame for presentation.
    ///
    /// Waits for the oldest of `buffer_count` prior frames first, bounding
    /// CPU run-ahead; then transitions the back buffer to `Present`,
    /// flushes, signals, and presents.
    pub fn present(&mut self, device: &mut Device) -> Result<()> {
        while self.frames.len() >= self.buffer_count as usize {
            let value = self.frames.pop_front().unwrap().value();
            device.wait_value(value)?;
        }

        let target = match self.current.take() {
            Some(target) => target,
            None => {
                warn!("present called without a prepared frame");
                return Err(Error::new(ErrorKind::Other));
            }
        };

        device.ensure_active_list()?;
        target
            .texture
            .transition(device.record_list(), base::ResourceState::Present);
        device.flush()?;
        let waitable = device.frame_waitable();

        self.driver.present()?;
        self.frames.push_back(waitable);
        Ok(())
    }

    /// Recreate the back buffers at a new extent. Drains all in-flight GPU
    /// work first — nothing may reference the old buffers afterwards.
    pub fn resize(&mut self, device: &mut Device, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            warn!("resize to an empty extent ({}x{})", width, height);
            return Err(Error::new(ErrorKind::Other));
        }
        device.release_internals()?;
        self.frames.clear();
        self.current = None;
        self.driver.resize(width, height)
    }
}
