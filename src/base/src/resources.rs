//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Resource descriptions and the resource-state (barrier) vocabulary.
use bitflags::bitflags;

use crate::formats::{ImageFormat, VertexFormat};
use crate::DeviceSize;

/// The usage a GPU resource is currently declared for.
///
/// Modern explicit APIs require resources to be transitioned between states
/// before certain operations ("barriers"). The backend tracks the last known
/// state of every texture and emits only the transitions that are actually
/// needed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceState {
    Common,
    RenderTarget,
    ShaderResource,
    CopySource,
    CopyDest,
    Present,
}

/// The memory class backing a buffer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MemoryKind {
    /// Device-local memory; not CPU-accessible.
    Device,
    /// CPU-writable memory used to stage data toward the device.
    Upload,
    /// CPU-readable memory used to read data back from the device.
    Readback,
}

bitflags! {
    /// A set of usages a buffer is created for.
    pub struct BufferUsageFlags: u8 {
        const VERTEX = 0b00001;
        const INDEX = 0b00010;
        const CONSTANT = 0b00100;
        /// The buffer is a source of copy commands.
        const COPY_READ = 0b01000;
        /// The buffer is a destination of copy commands.
        const COPY_WRITE = 0b10000;
    }
}

bitflags! {
    /// A set of usages a texture is created for.
    pub struct TextureUsageFlags: u8 {
        const SHADER_RESOURCE = 0b0001;
        const RENDER_TARGET = 0b0010;
        const COPY_READ = 0b0100;
        const COPY_WRITE = 0b1000;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferDesc {
    pub size: DeviceSize,
    pub usage: BufferUsageFlags,
    pub memory: MemoryKind,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub usage: TextureUsageFlags,
    /// The number of mipmap levels. `1` means no mipmapping.
    pub mip_levels: u32,
    pub sample_count: u32,
}

impl TextureDesc {
    /// The unpadded size of one row of the top mip level, in bytes.
    pub fn row_size(&self) -> DeviceSize {
        self.width as DeviceSize * self.format.size_of_pixel() as DeviceSize
    }
}

/// A rectangular region of a 2D texture (top mip level).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn num_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Filter {
    Point,
    Linear,
}

/// Texture coordinate addressing.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AddressMode {
    Wrap,
    Clamp,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address: AddressMode,
}

/// Primitive topology of a draw call.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Topology {
    TriangleList,
    LineList,
}

/// The Porter-Duff style blend mode the scene graph composites with.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum CompositeMode {
    Clear,
    Src,
    SrcOver,
    Add,
}

/// A single vertex attribute within a vertex layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexAttr {
    pub format: VertexFormat,
    pub offset: u32,
}

/// The layout of a vertex buffer consumed by a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexLayout {
    pub stride: u32,
    pub attrs: Vec<VertexAttr>,
}

/// The kind of descriptors a descriptor heap holds.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DescriptorHeapKind {
    /// Texture and buffer views.
    Resource,
    Sampler,
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorHeapDesc {
    pub kind: DescriptorHeapKind,
    pub capacity: u32,
    /// Whether shaders can read descriptors from this heap directly. Heaps
    /// that are not shader visible serve as CPU-side staging for persistent
    /// views.
    pub shader_visible: bool,
}

/// Everything a backend needs to construct a pipeline state object.
#[derive(Debug)]
pub struct PipelineDesc<'a> {
    pub vertex_bytecode: &'a [u8],
    pub fragment_bytecode: &'a [u8],
    pub vertex_layout: &'a VertexLayout,
    pub composite_mode: CompositeMode,
    pub rt_format: ImageFormat,
}

/// An opaque handle to a native window, handed over by the windowing layer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct WindowHandle(pub usize);

#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub window: WindowHandle,
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub format: ImageFormat,
}
