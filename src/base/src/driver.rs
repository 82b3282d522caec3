//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! The driver seam: object-safe traits abstracting the native explicit GPU
//! API the backend runs against.
//!
//! The device core records commands through [`DriverCmdList`], submits them
//! through [`DriverQueue`], and observes completion through [`DriverFence`].
//! Nothing above this seam names a concrete graphics API; the soft backend
//! implements it purely on the CPU, and a production backend would implement
//! it against Vulkan, D3D12 or Metal.
//!
//! The driver gives **no automatic synchronization**: callers own the fence
//! discipline and must not release or reuse a resource while a submitted
//! command list may still reference it.
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::limits::DeviceLimits;
use crate::resources::*;
use crate::{DescriptorIndex, DeviceSize, FenceValue, Viewport};
use zandraw_common::Rect2D;

pub type DriverDeviceRef = Arc<dyn DriverDevice>;
pub type DriverBufferRef = Arc<dyn DriverBuffer>;
pub type DriverTextureRef = Arc<dyn DriverTexture>;
pub type DriverPipelineRef = Arc<dyn DriverPipeline>;
pub type DriverDescriptorHeapRef = Arc<dyn DriverDescriptorHeap>;
pub type DriverFenceRef = Arc<dyn DriverFence>;

/// A GPU adapter opened for use.
///
/// Creation methods fail only for environmental reasons (out of device
/// memory, device loss); invalid descriptions are a usage error.
pub trait DriverDevice: fmt::Debug + Send + Sync {
    fn limits(&self) -> &DeviceLimits;

    fn new_queue(&self) -> Result<Box<dyn DriverQueue>>;

    fn new_fence(&self) -> Result<DriverFenceRef>;

    /// Create a command list in the *closed* state. Call
    /// [`DriverCmdList::reset`] before recording into it.
    fn new_cmd_list(&self) -> Result<Box<dyn DriverCmdList>>;

    fn new_buffer(&self, desc: &BufferDesc) -> Result<DriverBufferRef>;

    fn new_texture(&self, desc: &TextureDesc) -> Result<DriverTextureRef>;

    fn new_descriptor_heap(&self, desc: &DescriptorHeapDesc)
        -> Result<DriverDescriptorHeapRef>;

    fn new_pipeline(&self, desc: &PipelineDesc<'_>) -> Result<DriverPipelineRef>;

    fn new_swapchain(&self, desc: &SwapchainDesc) -> Result<Box<dyn DriverSwapchain>>;
}

/// The ordered submission channel to the GPU.
pub trait DriverQueue: fmt::Debug {
    /// Submit a closed command list for execution.
    fn execute(&mut self, list: &mut dyn DriverCmdList) -> Result<()>;

    /// Enqueue a fence signal operation. The fence reaches `value` once all
    /// previously executed command lists have retired.
    fn signal(&mut self, fence: &DriverFenceRef, value: FenceValue) -> Result<()>;
}

/// A monotonically increasing GPU timeline counter.
pub trait DriverFence: fmt::Debug + Send + Sync {
    /// The highest value the GPU has signaled so far.
    fn completed_value(&self) -> FenceValue;

    /// Block the calling thread until the fence reaches `value`.
    ///
    /// Fails only if the underlying OS wait primitive fails; such a failure
    /// is not retried by callers.
    fn wait(&self, value: FenceValue) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// A recorded sequence of GPU commands.
///
/// Within one list, commands execute in recording order. A list alternates
/// between a *recording* and a *closed* state; recording into a closed list
/// or closing twice is a usage error.
pub trait DriverCmdList: fmt::Debug {
    /// Re-open the list for recording, discarding previously recorded
    /// commands whose execution has completed.
    fn reset(&mut self) -> Result<()>;

    /// End recording, making the list submittable.
    fn close(&mut self) -> Result<()>;

    /// Declare a texture state transition.
    fn barrier(&mut self, texture: &DriverTextureRef, from: ResourceState, to: ResourceState);

    fn set_pipeline(&mut self, pipeline: &DriverPipelineRef);

    fn set_render_target(&mut self, texture: &DriverTextureRef);

    fn clear_render_target(&mut self, color: [f32; 4]);

    fn set_viewport(&mut self, viewport: &Viewport);

    fn set_scissor(&mut self, rect: &Rect2D<u32>);

    /// Bind `values` to the root constant slot at `root_index`.
    fn set_root_constants(&mut self, root_index: u32, values: &[u32]);

    /// Bind a constant buffer region to the root slot at `root_index`.
    fn set_root_constant_buffer(
        &mut self,
        root_index: u32,
        buffer: &DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
    );

    /// Bind a run of descriptors starting at `first_slot` of a
    /// shader-visible heap to the table slot at `root_index`.
    fn set_descriptor_table(
        &mut self,
        root_index: u32,
        heap: &DriverDescriptorHeapRef,
        first_slot: DescriptorIndex,
    );

    fn set_vertex_buffer(
        &mut self,
        buffer: &DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
        stride: u32,
    );

    fn set_index_buffer(
        &mut self,
        buffer: &DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
        format: crate::formats::IndexFormat,
    );

    fn set_topology(&mut self, topology: Topology);

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32);

    fn copy_buffer(
        &mut self,
        src: &DriverBufferRef,
        src_offset: DeviceSize,
        dst: &DriverBufferRef,
        dst_offset: DeviceSize,
        size: DeviceSize,
    );

    /// Copy pixel rows laid out at `src_offset` with `src_row_pitch` into a
    /// region of a texture's top mip level.
    fn copy_buffer_to_texture(
        &mut self,
        src: &DriverBufferRef,
        src_offset: DeviceSize,
        src_row_pitch: DeviceSize,
        dst: &DriverTextureRef,
        region: &Region,
    );

    fn copy_texture_to_buffer(
        &mut self,
        src: &DriverTextureRef,
        region: &Region,
        dst: &DriverBufferRef,
        dst_offset: DeviceSize,
        dst_row_pitch: DeviceSize,
    );

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A linear range of GPU memory.
pub trait DriverBuffer: fmt::Debug + Send + Sync {
    /// Get the address of the buffer contents.
    ///
    /// Valid only for `MemoryKind::Upload` and `MemoryKind::Readback`
    /// buffers, which are persistently mapped for their entire lifetime.
    fn as_ptr(&self) -> *mut u8;

    fn len(&self) -> DeviceSize;

    fn as_any(&self) -> &dyn Any;
}

/// A 2D image resource.
pub trait DriverTexture: fmt::Debug + Send + Sync {
    fn desc(&self) -> &TextureDesc;

    fn as_any(&self) -> &dyn Any;
}

/// An opaque pipeline state object.
pub trait DriverPipeline: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// A fixed-capacity array of descriptors.
pub trait DriverDescriptorHeap: fmt::Debug + Send + Sync {
    fn capacity(&self) -> DescriptorIndex;

    /// Write a shader-resource view of `texture` into `slot`.
    fn write_texture_view(&self, slot: DescriptorIndex, texture: &DriverTextureRef);

    /// Write a constant-buffer view into `slot`.
    fn write_buffer_view(
        &self,
        slot: DescriptorIndex,
        buffer: &DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
    );

    fn write_sampler(&self, slot: DescriptorIndex, desc: &SamplerDesc);

    /// Copy `count` descriptors from `src` starting at `src_first` into this
    /// heap starting at `dst_first`.
    fn copy_from(
        &self,
        dst_first: DescriptorIndex,
        src: &DriverDescriptorHeapRef,
        src_first: DescriptorIndex,
        count: DescriptorIndex,
    );

    fn as_any(&self) -> &dyn Any;
}

/// A set of presentable back buffers bound to a native window.
pub trait DriverSwapchain: fmt::Debug {
    /// The back buffer that will be presented by the next `present` call.
    fn back_buffer(&self) -> DriverTextureRef;

    /// Queue the current back buffer for presentation and advance to the
    /// next one.
    fn present(&mut self) -> Result<()>;

    /// Recreate the back buffers at a new extent. The caller must drain all
    /// GPU work referencing the old buffers first.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    fn extent(&self) -> (u32, u32);
}
