//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! The rendering context: a state-diff machine.
//!
//! Every piece of pipeline state the backend can bind lives in a [`Cell`]
//! tracking the last requested value and whether it has been applied to the
//! current command list. `set` is a no-op when the value compares equal to
//! what is already there; `apply` walks the cells in a fixed dependency
//! order and records only the unapplied ones. Together these make redundant
//! state changes between consecutive draws free — a draw that differs from
//! the previous one only by its bound texture records exactly one command.
//!
//! GPU state dies with a command list, so the device calls
//! [`RenderingContext::on_flush`] whenever a list is closed: every cell
//! becomes unapplied again, and bindings that point into transient ring
//! space (the per-draw descriptor table and the constant spill buffer) are
//! dropped outright so the next draw re-reserves them.
//!
//! Allocation-heavy preparation (ring reservations, constant copies) is the
//! device's job and happens strictly *before* `apply` touches the list,
//! because a reservation can itself force a flush of the list about to be
//! recorded into.
use smallvec::SmallVec;
use std::sync::Arc;

use cgmath::Point2;
use zandraw_base as base;
use zandraw_base::{DescriptorIndex, DeviceSize, Viewport};
use zandraw_common::Rect2D;

/// The number of texture units the scene graph can bind.
pub const MAX_TEXTURE_UNITS: usize = 4;

/// One tracked rendering parameter.
#[derive(Debug)]
pub struct Cell<T> {
    value: Option<T>,
    applied: bool,
}

impl<T> Default for Cell<T> {
    fn default() -> Self {
        Self {
            value: None,
            applied: false,
        }
    }
}

impl<T: PartialEq> Cell<T> {
    /// Record a new value, clearing the applied flag. Setting the value the
    /// cell already holds is a no-op — this is where redundant state changes
    /// are elided.
    pub fn set(&mut self, value: T) {
        if self.value.as_ref() != Some(&value) {
            self.value = Some(value);
            self.applied = false;
        }
    }
}

impl<T> Cell<T> {
    /// Record a new value unconditionally. Used for bindings whose backing
    /// storage changes even when the logical value does not (ring-allocated
    /// tables and constants).
    pub fn set_forced(&mut self, value: T) {
        self.value = Some(value);
        self.applied = false;
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub fn needs_apply(&self) -> bool {
        self.value.is_some() && !self.applied
    }

    pub fn mark_applied(&mut self) {
        self.applied = true;
    }

    pub fn clear_applied(&mut self) {
        self.applied = false;
    }

    /// Drop the value entirely.
    pub fn reset(&mut self) {
        self.value = None;
        self.applied = false;
    }
}

#[derive(Debug, Clone)]
pub struct PipelineBinding {
    /// (shader id, composite mode, render target format) — the pipeline
    /// cache key.
    pub key: (u64, base::CompositeMode, base::ImageFormat),
    pub pipeline: base::DriverPipelineRef,
}

impl PartialEq for PipelineBinding {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

#[derive(Debug, Clone)]
pub struct RenderTargetBinding {
    pub texture: base::DriverTextureRef,
    pub width: u32,
    pub height: u32,
    pub format: base::ImageFormat,
}

impl PartialEq for RenderTargetBinding {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.texture, &other.texture)
    }
}

#[derive(Debug, Clone)]
pub struct TextureUnitBinding {
    pub texture: base::DriverTextureRef,
    pub srv_slot: DescriptorIndex,
}

impl PartialEq for TextureUnitBinding {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.texture, &other.texture) && self.srv_slot == other.srv_slot
    }
}

/// A descriptor table binding. Always `set_forced`: the slots come from the
/// ring heap and differ draw to draw even for identical logical content.
#[derive(Debug, Clone)]
pub struct TableBinding {
    pub root_index: u32,
    pub heap: base::DriverDescriptorHeapRef,
    pub first_slot: DescriptorIndex,
}

/// The root-constant writes and optional spill buffer binding of one draw.
#[derive(Debug, Clone, Default)]
pub struct ConstantsBinding {
    pub root_writes: SmallVec<[(u32, SmallVec<[u32; 16]>); 2]>,
    pub cbv: Option<(u32, base::DriverBufferRef, DeviceSize, DeviceSize)>,
}

#[derive(Debug, Clone)]
pub struct VertexBinding {
    pub buffer: base::DriverBufferRef,
    pub offset: DeviceSize,
    pub size: DeviceSize,
    pub stride: u32,
}

impl PartialEq for VertexBinding {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
            && self.offset == other.offset
            && self.size == other.size
            && self.stride == other.stride
    }
}

#[derive(Debug, Clone)]
pub struct IndexBinding {
    pub buffer: base::DriverBufferRef,
    pub offset: DeviceSize,
    pub size: DeviceSize,
    pub format: base::IndexFormat,
}

impl PartialEq for IndexBinding {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
            && self.offset == other.offset
            && self.size == other.size
            && self.format == other.format
    }
}

/// The set of tracked rendering parameters. See the module-level
/// documentation.
#[derive(Debug, Default)]
pub struct RenderingContext {
    pub render_target: Cell<RenderTargetBinding>,
    pub viewport: Cell<Viewport>,
    /// `Some(None)` means "no scissor": the full render target rect is
    /// recorded at apply time.
    pub scissor: Cell<Option<Rect2D<u32>>>,
    pub pipeline: Cell<PipelineBinding>,
    /// Inputs to the per-draw texture table. Not applied to the list
    /// directly; the device folds them into `texture_table` during
    /// preparation, and the applied flag marks "included in the current
    /// table".
    pub texture_units: [Cell<TextureUnitBinding>; MAX_TEXTURE_UNITS],
    pub texture_table: Cell<TableBinding>,
    pub sampler_table: Cell<TableBinding>,
    pub constants: Cell<ConstantsBinding>,
    pub vertex_buffer: Cell<VertexBinding>,
    pub index_buffer: Cell<IndexBinding>,
    pub topology: Cell<base::Topology>,
    /// (shader id, transforms version) last folded into shader constants.
    pub pushed_transforms: Option<(u64, u64)>,
}

impl RenderingContext {
    pub fn new() -> Self {
        Default::default()
    }

    /// Record every unapplied parameter onto `list`, in dependency order:
    /// render target and its derived viewport/scissor first, then pipeline
    /// state, then the resource tables and constants (which require a
    /// pipeline), then geometry buffers and topology. Calling this twice
    /// with no intervening `set` records nothing the second time.
    pub fn apply(&mut self, list: &mut dyn base::DriverCmdList) {
        if self.render_target.needs_apply() {
            {
                let binding = self.render_target.value().unwrap();
                list.set_render_target(&binding.texture);
            }
            self.render_target.mark_applied();
        }

        if self.viewport.needs_apply() {
            list.set_viewport(self.viewport.value().unwrap());
            self.viewport.mark_applied();
        }

        // The scissor defaults to the full render target, so it cannot be
        // applied until a render target is known.
        if self.scissor.needs_apply() && self.render_target.is_set() {
            {
                let rect = match *self.scissor.value().unwrap() {
                    Some(rect) => rect,
                    None => {
                        let rt = self.render_target.value().unwrap();
                        Rect2D::new(Point2::new(0, 0), Point2::new(rt.width, rt.height))
                    }
                };
                list.set_scissor(&rect);
            }
            self.scissor.mark_applied();
        }

        if self.pipeline.needs_apply() {
            {
                let binding = self.pipeline.value().unwrap();
                list.set_pipeline(&binding.pipeline);
            }
            self.pipeline.mark_applied();
        }

        // Tables and constants bind into the root layout of the pipeline and
        // may not be applied before one is set.
        if self.pipeline.is_set() {
            if self.texture_table.needs_apply() {
                {
                    let table = self.texture_table.value().unwrap();
                    list.set_descriptor_table(table.root_index, &table.heap, table.first_slot);
                }
                self.texture_table.mark_applied();
            }

            if self.sampler_table.needs_apply() {
                {
                    let table = self.sampler_table.value().unwrap();
                    list.set_descriptor_table(table.root_index, &table.heap, table.first_slot);
                }
                self.sampler_table.mark_applied();
            }

            if self.constants.needs_apply() {
                {
                    let constants = self.constants.value().unwrap();
                    for (root_index, values) in &constants.root_writes {
                        list.set_root_constants(*root_index, values);
                    }
                    if let Some((root_index, ref buffer, offset, size)) = constants.cbv {
                        list.set_root_constant_buffer(root_index, buffer, offset, size);
                    }
                }
                self.constants.mark_applied();
            }
        }

        if self.vertex_buffer.needs_apply() {
            {
                let vb = self.vertex_buffer.value().unwrap();
                list.set_vertex_buffer(&vb.buffer, vb.offset, vb.size, vb.stride);
            }
            self.vertex_buffer.mark_applied();
        }

        if self.index_buffer.needs_apply() {
            {
                let ib = self.index_buffer.value().unwrap();
                list.set_index_buffer(&ib.buffer, ib.offset, ib.size, ib.format);
            }
            self.index_buffer.mark_applied();
        }

        if self.topology.needs_apply() {
            list.set_topology(*self.topology.value().unwrap());
            self.topology.mark_applied();
        }
    }

    /// Forget the applied status of every cell. Called once per command
    /// list flush, since GPU state is lost when a list closes.
    pub fn clear_applied(&mut self) {
        self.render_target.clear_applied();
        self.viewport.clear_applied();
        self.scissor.clear_applied();
        self.pipeline.clear_applied();
        for unit in &mut self.texture_units {
            unit.clear_applied();
        }
        self.texture_table.clear_applied();
        self.sampler_table.clear_applied();
        self.constants.clear_applied();
        self.vertex_buffer.clear_applied();
        self.index_buffer.clear_applied();
        self.topology.clear_applied();
    }

    /// Command list flushed: clear applied flags and drop bindings whose
    /// backing storage is transient ring space. Those must be re-reserved,
    /// not merely re-recorded — the ring may reclaim them once the flush's
    /// fence retires.
    pub fn on_flush(&mut self) {
        self.clear_applied();
        self.texture_table.reset();
        self.constants.reset();
        for unit in &mut self.texture_units {
            unit.clear_applied();
        }
    }
}
