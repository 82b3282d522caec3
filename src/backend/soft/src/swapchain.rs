//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Implementation of `DriverSwapchain` for the software backend.
use std::sync::Arc;

use zandraw_base as base;
use zandraw_base::Result;

use crate::texture::SoftTexture;

/// Implementation of `DriverSwapchain` for the software backend. The back
/// buffers are ordinary render-target textures rotated by `present`.
#[derive(Debug)]
pub struct SoftSwapchain {
    buffers: Vec<base::DriverTextureRef>,
    index: usize,
    extent: (u32, u32),
    format: base::ImageFormat,
    presents: usize,
}

impl SoftSwapchain {
    pub(crate) fn new(desc: &base::SwapchainDesc) -> Self {
        assert!(desc.buffer_count >= 2, "swap chain needs at least 2 buffers");
        let mut sc = Self {
            buffers: Vec::new(),
            index: 0,
            extent: (desc.width, desc.height),
            format: desc.format,
            presents: 0,
        };
        sc.create_buffers(desc.buffer_count);
        sc
    }

    fn create_buffers(&mut self, count: u32) {
        let desc = base::TextureDesc {
            width: self.extent.0,
            height: self.extent.1,
            format: self.format,
            usage: base::TextureUsageFlags::RENDER_TARGET | base::TextureUsageFlags::COPY_READ,
            mip_levels: 1,
            sample_count: 1,
        };
        self.buffers = (0..count)
            .map(|_| Arc::new(SoftTexture::new(&desc)) as base::DriverTextureRef)
            .collect();
        self.index = 0;
    }

    /// The number of frames presented so far.
    pub fn presents(&self) -> usize {
        self.presents
    }
}

impl base::DriverSwapchain for SoftSwapchain {
    fn back_buffer(&self) -> base::DriverTextureRef {
        self.buffers[self.index].clone()
    }

    fn present(&mut self) -> Result<()> {
        self.presents += 1;
        self.index = (self.index + 1) % self.buffers.len();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        assert!(width > 0 && height > 0, "zero-sized swap chain");
        self.extent = (width, height);
        let count = self.buffers.len() as u32;
        self.create_buffers(count);
        Ok(())
    }

    fn extent(&self) -> (u32, u32) {
        self.extent
    }
}
