//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Public resource handles.
//!
//! Handles behave like `Arc`s: cloning shares the underlying GPU resource.
//! Dropping a handle does not release anything by itself — the scene graph
//! hands resources it no longer needs back to the device
//! (`Device::dispose_texture` and friends), which defers the actual release
//! until the GPU provably finished referencing them.
use parking_lot::Mutex;
use std::sync::Arc;

use cgmath::Matrix4;
use zandraw_base as base;
use zandraw_base::{DescriptorIndex, DeviceSize};

#[derive(Debug)]
pub(crate) struct TextureInner {
    pub driver: base::DriverTextureRef,
    pub desc: base::TextureDesc,
    /// Last known resource state, updated as transitions are recorded.
    pub state: Mutex<base::ResourceState>,
    /// Persistent shader-resource view slot, when the texture is sampleable.
    pub srv_slot: Option<DescriptorIndex>,
}

/// A 2D texture.
#[derive(Debug, Clone)]
pub struct Texture {
    pub(crate) inner: Arc<TextureInner>,
}

impl Texture {
    pub fn width(&self) -> u32 {
        self.inner.desc.width
    }

    pub fn height(&self) -> u32 {
        self.inner.desc.height
    }

    pub fn format(&self) -> base::ImageFormat {
        self.inner.desc.format
    }

    /// Record a transition to `to` if the texture is not already in that
    /// state, and remember the new state.
    pub(crate) fn transition(&self, list: &mut dyn base::DriverCmdList, to: base::ResourceState) {
        let mut state = self.inner.state.lock();
        if *state != to {
            list.barrier(&self.inner.driver, *state, to);
            *state = to;
        }
    }

    pub(crate) fn current_state(&self) -> base::ResourceState {
        *self.inner.state.lock()
    }
}

/// A render target view over a texture created with
/// `TextureUsageFlags::RENDER_TARGET`.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub(crate) texture: Texture,
}

impl RenderTarget {
    pub fn texture(&self) -> &Texture {
        &self.texture
    }
}

#[derive(Debug)]
pub(crate) struct BufferInner {
    pub driver: base::DriverBufferRef,
    pub size: DeviceSize,
    pub usage: base::BufferUsageFlags,
}

/// A linear GPU buffer.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub(crate) inner: Arc<BufferInner>,
}

impl Buffer {
    pub fn size(&self) -> DeviceSize {
        self.inner.size
    }
}

/// The vertex format of a 2D quad batch: position, packed color, texture
/// coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub color: [u8; 4],
    pub uv: [f32; 2],
}

/// The vertex format of a 3D mesh: position, normal, texture coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

#[derive(Debug)]
pub(crate) struct MeshInner {
    pub vertex_buffer: base::DriverBufferRef,
    pub index_buffer: base::DriverBufferRef,
    pub vertex_count: u32,
    pub index_count: u32,
    pub index_format: base::IndexFormat,
}

/// An indexed triangle mesh.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub(crate) inner: Arc<MeshInner>,
}

impl Mesh {
    pub fn vertex_count(&self) -> u32 {
        self.inner.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.inner.index_count
    }
}

/// Phong material parameters of a mesh view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhongMaterial {
    pub diffuse_color: [f32; 4],
    pub specular_color: [f32; 4],
    pub specular_power: f32,
}

impl Default for PhongMaterial {
    fn default() -> Self {
        Self {
            diffuse_color: [1.0, 1.0, 1.0, 1.0],
            specular_color: [1.0, 1.0, 1.0, 1.0],
            specular_power: 32.0,
        }
    }
}

/// A mesh instance as the scene graph renders it: geometry, world
/// transform, material, and an optional diffuse texture.
#[derive(Debug, Clone)]
pub struct MeshView {
    pub mesh: Mesh,
    pub world: Matrix4<f32>,
    pub material: PhongMaterial,
    pub diffuse_map: Option<Texture>,
}

/// View a typed slice as raw bytes for staging into GPU memory.
///
/// Sound for the `#[repr(C)]` vertex types used here; the staging copies
/// never read the bytes back as a different type.
pub(crate) fn as_byte_slice<T: Copy>(slice: &[T]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            slice.as_ptr() as *const u8,
            slice.len() * std::mem::size_of::<T>(),
        )
    }
}
