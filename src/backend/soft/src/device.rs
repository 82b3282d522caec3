//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Implementation of `DriverDevice` for the software backend.
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

use zandraw_base as base;
use zandraw_base::{DeviceLimits, FenceValue, Result};

use crate::buffer::SoftBuffer;
use crate::cmd::queue::RetireGate;
use crate::cmd::{SoftCmdList, SoftFence, SoftQueue};
use crate::heap::SoftDescriptorHeap;
use crate::swapchain::SoftSwapchain;
use crate::texture::SoftTexture;

pub use crate::cmd::queue::Stats;

/// Parameters for `SoftDevice`.
#[derive(Debug, Clone)]
pub struct SoftDeviceParams {
    pub limits: DeviceLimits,

    /// When `false`, fence values do not retire until
    /// [`SoftDevice::retire_up_to`] is called. Defaults to `true`.
    pub auto_retire: bool,
}

impl Default for SoftDeviceParams {
    fn default() -> Self {
        Self {
            limits: DeviceLimits::default(),
            auto_retire: true,
        }
    }
}

/// Implementation of `DriverDevice` for the software backend.
#[derive(Debug)]
pub struct SoftDevice {
    limits: DeviceLimits,
    stats: Arc<Stats>,
    gate: Arc<RetireGate>,
}

impl SoftDevice {
    pub fn new(params: SoftDeviceParams) -> Arc<Self> {
        Arc::new(Self {
            limits: params.limits,
            stats: Arc::new(Stats::default()),
            gate: Arc::new(RetireGate {
                auto: params.auto_retire,
                pending: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Execution counters maintained by the worker thread.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Release deferred fence signals up to and including `value`.
    ///
    /// Only meaningful when the device was created with
    /// `auto_retire = false`.
    pub fn retire_up_to(&self, value: FenceValue) {
        let mut pending = self.gate.pending.lock();
        let mut i = 0;
        while i < pending.len() {
            if pending[i].1 <= value {
                let (fence, value) = pending.swap_remove(i);
                crate::cmd::queue::signal_fence(&fence, value);
            } else {
                i += 1;
            }
        }
    }
}

impl base::DriverDevice for SoftDevice {
    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn new_queue(&self) -> Result<Box<dyn base::DriverQueue>> {
        Ok(Box::new(SoftQueue::new(
            Arc::clone(&self.stats),
            Arc::clone(&self.gate),
        )))
    }

    fn new_fence(&self) -> Result<base::DriverFenceRef> {
        Ok(Arc::new(SoftFence::new()))
    }

    fn new_cmd_list(&self) -> Result<Box<dyn base::DriverCmdList>> {
        Ok(Box::new(SoftCmdList::new()))
    }

    fn new_buffer(&self, desc: &base::BufferDesc) -> Result<base::DriverBufferRef> {
        assert!(desc.size > 0, "zero-sized buffer");
        Ok(Arc::new(SoftBuffer::new(desc)))
    }

    fn new_texture(&self, desc: &base::TextureDesc) -> Result<base::DriverTextureRef> {
        assert!(desc.width > 0 && desc.height > 0, "zero-sized texture");
        assert!(desc.format.is_storable(), "non-storable texture format");
        Ok(Arc::new(SoftTexture::new(desc)))
    }

    fn new_descriptor_heap(
        &self,
        desc: &base::DescriptorHeapDesc,
    ) -> Result<base::DriverDescriptorHeapRef> {
        assert!(desc.capacity > 0, "zero-capacity descriptor heap");
        Ok(Arc::new(SoftDescriptorHeap::new(desc)))
    }

    fn new_pipeline(&self, desc: &base::PipelineDesc<'_>) -> Result<base::DriverPipelineRef> {
        Ok(Arc::new(SoftPipeline {
            composite_mode: desc.composite_mode,
            rt_format: desc.rt_format,
            vertex_stride: desc.vertex_layout.stride,
        }))
    }

    fn new_swapchain(&self, desc: &base::SwapchainDesc) -> Result<Box<dyn base::DriverSwapchain>> {
        Ok(Box::new(SoftSwapchain::new(desc)))
    }
}

/// Implementation of `DriverPipeline` for the software backend. A plain
/// record — the software timeline does not rasterize.
#[derive(Debug)]
pub struct SoftPipeline {
    pub composite_mode: base::CompositeMode,
    pub rt_format: base::ImageFormat,
    pub vertex_stride: u32,
}

impl base::DriverPipeline for SoftPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
