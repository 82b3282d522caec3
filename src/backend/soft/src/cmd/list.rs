//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Implementation of `DriverCmdList` for the software backend.
use std::any::Any;

use zandraw_base as base;
use zandraw_base::{DescriptorIndex, DeviceSize, Result, Viewport};
use zandraw_common::Rect2D;

/// A recorded command. Commands hold strong references to the resources
/// they touch so execution on the worker thread cannot outlive them.
#[derive(Debug, Clone)]
pub enum Cmd {
    Barrier {
        texture: base::DriverTextureRef,
        from: base::ResourceState,
        to: base::ResourceState,
    },
    SetPipeline(base::DriverPipelineRef),
    SetRenderTarget(base::DriverTextureRef),
    ClearRenderTarget([f32; 4]),
    SetViewport(Viewport),
    SetScissor(Rect2D<u32>),
    SetRootConstants {
        root_index: u32,
        values: Vec<u32>,
    },
    SetRootConstantBuffer {
        root_index: u32,
        buffer: base::DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
    },
    SetDescriptorTable {
        root_index: u32,
        heap: base::DriverDescriptorHeapRef,
        first_slot: DescriptorIndex,
    },
    SetVertexBuffer {
        buffer: base::DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
        stride: u32,
    },
    SetIndexBuffer {
        buffer: base::DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
        format: base::IndexFormat,
    },
    SetTopology(base::Topology),
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
    },
    CopyBuffer {
        src: base::DriverBufferRef,
        src_offset: DeviceSize,
        dst: base::DriverBufferRef,
        dst_offset: DeviceSize,
        size: DeviceSize,
    },
    CopyBufferToTexture {
        src: base::DriverBufferRef,
        src_offset: DeviceSize,
        src_row_pitch: DeviceSize,
        dst: base::DriverTextureRef,
        region: base::Region,
    },
    CopyTextureToBuffer {
        src: base::DriverTextureRef,
        region: base::Region,
        dst: base::DriverBufferRef,
        dst_offset: DeviceSize,
        dst_row_pitch: DeviceSize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Closed,
    Recording,
}

/// Implementation of `DriverCmdList` for the software backend.
#[derive(Debug)]
pub struct SoftCmdList {
    state: RecordState,
    cmds: Vec<Cmd>,
}

impl SoftCmdList {
    pub(crate) fn new() -> Self {
        Self {
            state: RecordState::Closed,
            cmds: Vec::new(),
        }
    }

    /// The commands recorded since the last `reset`. Empty once the list has
    /// been submitted (submission drains the log).
    pub fn recorded(&self) -> &[Cmd] {
        &self.cmds
    }

    pub(crate) fn drain_cmds(&mut self) -> Vec<Cmd> {
        std::mem::replace(&mut self.cmds, Vec::new())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state == RecordState::Closed
    }

    fn record(&mut self, cmd: Cmd) {
        assert_eq!(
            self.state,
            RecordState::Recording,
            "recording into a closed command list"
        );
        self.cmds.push(cmd);
    }
}

impl base::DriverCmdList for SoftCmdList {
    fn reset(&mut self) -> Result<()> {
        self.cmds.clear();
        self.state = RecordState::Recording;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        assert_eq!(
            self.state,
            RecordState::Recording,
            "closing a command list that is not recording"
        );
        self.state = RecordState::Closed;
        Ok(())
    }

    fn barrier(
        &mut self,
        texture: &base::DriverTextureRef,
        from: base::ResourceState,
        to: base::ResourceState,
    ) {
        self.record(Cmd::Barrier {
            texture: texture.clone(),
            from,
            to,
        });
    }

    fn set_pipeline(&mut self, pipeline: &base::DriverPipelineRef) {
        self.record(Cmd::SetPipeline(pipeline.clone()));
    }

    fn set_render_target(&mut self, texture: &base::DriverTextureRef) {
        self.record(Cmd::SetRenderTarget(texture.clone()));
    }

    fn clear_render_target(&mut self, color: [f32; 4]) {
        self.record(Cmd::ClearRenderTarget(color));
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.record(Cmd::SetViewport(*viewport));
    }

    fn set_scissor(&mut self, rect: &Rect2D<u32>) {
        self.record(Cmd::SetScissor(*rect));
    }

    fn set_root_constants(&mut self, root_index: u32, values: &[u32]) {
        self.record(Cmd::SetRootConstants {
            root_index,
            values: values.to_vec(),
        });
    }

    fn set_root_constant_buffer(
        &mut self,
        root_index: u32,
        buffer: &base::DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
    ) {
        self.record(Cmd::SetRootConstantBuffer {
            root_index,
            buffer: buffer.clone(),
            offset,
            size,
        });
    }

    fn set_descriptor_table(
        &mut self,
        root_index: u32,
        heap: &base::DriverDescriptorHeapRef,
        first_slot: DescriptorIndex,
    ) {
        self.record(Cmd::SetDescriptorTable {
            root_index,
            heap: heap.clone(),
            first_slot,
        });
    }

    fn set_vertex_buffer(
        &mut self,
        buffer: &base::DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
        stride: u32,
    ) {
        self.record(Cmd::SetVertexBuffer {
            buffer: buffer.clone(),
            offset,
            size,
            stride,
        });
    }

    fn set_index_buffer(
        &mut self,
        buffer: &base::DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
        format: base::IndexFormat,
    ) {
        self.record(Cmd::SetIndexBuffer {
            buffer: buffer.clone(),
            offset,
            size,
            format,
        });
    }

    fn set_topology(&mut self, topology: base::Topology) {
        self.record(Cmd::SetTopology(topology));
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        self.record(Cmd::DrawIndexed {
            index_count,
            first_index,
            base_vertex,
        });
    }

    fn copy_buffer(
        &mut self,
        src: &base::DriverBufferRef,
        src_offset: DeviceSize,
        dst: &base::DriverBufferRef,
        dst_offset: DeviceSize,
        size: DeviceSize,
    ) {
        self.record(Cmd::CopyBuffer {
            src: src.clone(),
            src_offset,
            dst: dst.clone(),
            dst_offset,
            size,
        });
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: &base::DriverBufferRef,
        src_offset: DeviceSize,
        src_row_pitch: DeviceSize,
        dst: &base::DriverTextureRef,
        region: &base::Region,
    ) {
        self.record(Cmd::CopyBufferToTexture {
            src: src.clone(),
            src_offset,
            src_row_pitch,
            dst: dst.clone(),
            region: *region,
        });
    }

    fn copy_texture_to_buffer(
        &mut self,
        src: &base::DriverTextureRef,
        region: &base::Region,
        dst: &base::DriverBufferRef,
        dst_offset: DeviceSize,
        dst_row_pitch: DeviceSize,
    ) {
        self.record(Cmd::CopyTextureToBuffer {
            src: src.clone(),
            region: *region,
            dst: dst.clone(),
            dst_offset,
            dst_row_pitch,
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
