//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! The device: the public API the retained scene graph renders through.
//!
//! A `Device` owns one driver queue, one fence with a monotonically
//! increasing counter, the command list pool, the transient rings, the
//! persistent view heap, and the resource disposer. Draw calls funnel
//! through the rendering context (state diffing), per-draw resources come
//! from the rings, and every queue signal checkpoints every subsystem that
//! holds transient or disposed memory.
//!
//! All recording happens on the calling thread. The blocking points are:
//! acquiring a command list when the whole pool is in flight, reserving
//! transient space that overlaps in-flight data (one forced flush-and-wait,
//! then the reservation fails), texture readback (a full flush-and-wait by
//! design), and teardown (drains everything).
use arrayvec::ArrayVec;
use itertools::Itertools;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::mem::size_of;
use std::ops::Range;
use std::sync::Arc;

use cgmath::{Matrix4, Point3, SquareMatrix};
use log::{debug, error, warn};
use parking_lot::Mutex;
use smallvec::SmallVec;

use zandraw_base as base;
use zandraw_base::{
    DescriptorIndex, DeviceSize, Error, ErrorKind, FenceValue, Result, Viewport,
};
use zandraw_common::{round_up, Rect2D};

use crate::cmdpool::CmdListPool;
use crate::config::DeviceParams;
use crate::context::{
    ConstantsBinding, IndexBinding, PipelineBinding, RenderTargetBinding, RenderingContext,
    TableBinding, TextureUnitBinding, VertexBinding, MAX_TEXTURE_UNITS,
};
use crate::descheap::ViewHeap;
use crate::disposer::Disposer;
use crate::resources::{
    as_byte_slice, Buffer, BufferInner, Mesh, MeshInner, MeshVertex, MeshView, QuadVertex,
    RenderTarget, Texture, TextureInner,
};
use crate::ring::Ring;
use crate::shader::{Shader, ShaderDesc, ShaderResourceDecl};
use crate::swapchain::Swapchain;
use crate::waitable::Waitable;

/// The hard cap on quads per `render_quads` batch. Batches beyond this are
/// dropped with a warning.
pub const MAX_BATCH_QUADS: usize = 4096;

/// The static sampler set every pipeline sees: the sampler table of a
/// shader indexes into these.
const SAMPLERS: [base::SamplerDesc; 4] = [
    base::SamplerDesc {
        filter: base::Filter::Linear,
        address: base::AddressMode::Clamp,
    },
    base::SamplerDesc {
        filter: base::Filter::Linear,
        address: base::AddressMode::Wrap,
    },
    base::SamplerDesc {
        filter: base::Filter::Point,
        address: base::AddressMode::Clamp,
    },
    base::SamplerDesc {
        filter: base::Filter::Point,
        address: base::AddressMode::Wrap,
    },
];

lazy_static! {
    static ref QUAD_SHADER_RESOURCES: Vec<ShaderResourceDecl> = vec![
        ShaderResourceDecl::constants("world_view_proj", 16),
        ShaderResourceDecl::texture("tex0"),
        ShaderResourceDecl::texture("tex1"),
        ShaderResourceDecl::sampler("samp0"),
    ];
    static ref MESH_SHADER_RESOURCES: Vec<ShaderResourceDecl> = vec![
        ShaderResourceDecl::constants("world_view_proj", 16),
        ShaderResourceDecl::constants("world", 16),
        ShaderResourceDecl::constants("camera_pos", 4),
        ShaderResourceDecl::constants("diffuse_color", 4),
        ShaderResourceDecl::constants("specular_color", 4),
        ShaderResourceDecl::constants("specular_power", 1),
        ShaderResourceDecl::texture("diffuse_map"),
        ShaderResourceDecl::sampler("samp0"),
    ];
}

/// Resources whose release is deferred until their guarding fence retires.
#[derive(Debug)]
enum Garbage {
    Buffer(base::DriverBufferRef),
    Texture(base::DriverTextureRef),
    ViewSlot(DescriptorIndex),
}

#[derive(Debug, Clone, Copy)]
enum RingKind {
    Upload,
    Descriptor,
}

/// Geometry input of one draw.
enum Geometry<'a> {
    /// Vertex data staged through the transient ring for this draw only.
    Transient {
        data: &'a [u8],
        stride: u32,
        index: IndexBinding,
    },
    /// Persistent vertex/index buffers (meshes).
    Buffers {
        vertex: VertexBinding,
        index: IndexBinding,
    },
}

/// The rendering device. See the module-level documentation.
#[derive(Debug)]
pub struct Device {
    driver: base::DriverDeviceRef,
    limits: base::DeviceLimits,
    params: DeviceParams,

    queue: Box<dyn base::DriverQueue>,
    fence: base::DriverFenceRef,
    last_signaled: FenceValue,
    last_retired: FenceValue,
    /// The fence value of a proactive mid-frame flush, if one is
    /// outstanding. Cleared when it retires or the frame ends.
    mid_frame_signal: Option<FenceValue>,
    /// Bumped on every flush; draw preparation restarts when it observes a
    /// flush happened under it.
    flush_epoch: u64,

    pool: CmdListPool,
    ring: Ring,
    ring_buffer: base::DriverBufferRef,
    desc_ring: Ring,
    desc_ring_heap: base::DriverDescriptorHeapRef,
    view_heap: ViewHeap,
    sampler_heap: base::DriverDescriptorHeapRef,
    disposer: Disposer<Garbage>,

    context: RenderingContext,
    /// The shader whose root layout the transient context bindings were
    /// built for.
    context_shader_id: Option<u64>,
    pipelines: HashMap<(u64, base::CompositeMode, base::ImageFormat), base::DriverPipelineRef>,

    quad_index_buffer: base::DriverBufferRef,
    quad_shader: Shader,
    mesh_shader: Shader,
    default_texture: Option<Texture>,

    bound_textures: [Option<Texture>; MAX_TEXTURE_UNITS],
    composite_mode: base::CompositeMode,
    world: Matrix4<f32>,
    view_proj: Matrix4<f32>,
    camera_pos: Point3<f32>,
    transforms_version: u64,
}

impl Device {
    /// Open a device on `driver`. Any creation failure aborts the whole
    /// initialization — there is no partial-device fallback.
    pub fn new(driver: base::DriverDeviceRef, params: DeviceParams) -> Result<Self> {
        let limits = *driver.limits();
        let queue = driver.new_queue()?;
        let fence = driver.new_fence()?;

        let lists = (0..params.cmd_list_count)
            .map(|_| driver.new_cmd_list())
            .collect::<Result<Vec<_>>>()?;
        let pool = CmdListPool::new(lists);

        let ring_buffer = driver.new_buffer(&base::BufferDesc {
            size: params.ring_size,
            usage: base::BufferUsageFlags::VERTEX
                | base::BufferUsageFlags::CONSTANT
                | base::BufferUsageFlags::COPY_READ,
            memory: base::MemoryKind::Upload,
        })?;
        let ring = Ring::new(params.ring_size);

        let desc_ring_heap = driver.new_descriptor_heap(&base::DescriptorHeapDesc {
            kind: base::DescriptorHeapKind::Resource,
            capacity: params.descriptor_ring_size,
            shader_visible: true,
        })?;
        let desc_ring = Ring::new(params.descriptor_ring_size as u64);

        let view_heap = ViewHeap::new(&*driver, params.view_heap_capacity)?;

        let sampler_heap = driver.new_descriptor_heap(&base::DescriptorHeapDesc {
            kind: base::DescriptorHeapKind::Sampler,
            capacity: SAMPLERS.len() as u32,
            shader_visible: true,
        })?;
        for (slot, desc) in SAMPLERS.iter().enumerate() {
            sampler_heap.write_sampler(slot as DescriptorIndex, desc);
        }

        // The fixed index buffer shared by every quad batch: 6 indices per
        // quad, 4 vertices per quad, u16 throughout (4 * 4096 fits).
        let quad_indices: Vec<u16> = (0..MAX_BATCH_QUADS as u16)
            .flat_map(|quad| {
                let first = quad * 4;
                ArrayVec::from([first, first + 1, first + 2, first, first + 2, first + 3])
            })
            .collect();
        let quad_index_buffer = driver.new_buffer(&base::BufferDesc {
            size: (quad_indices.len() * 2) as DeviceSize,
            usage: base::BufferUsageFlags::INDEX,
            memory: base::MemoryKind::Upload,
        })?;
        write_driver_buffer(&quad_index_buffer, 0, as_byte_slice(&quad_indices));

        let quad_shader = Shader::new(
            ShaderDesc {
                name: "builtin.quad".to_owned(),
                vertex_bytecode: b"zandraw/builtin/quad.vs".to_vec(),
                fragment_bytecode: b"zandraw/builtin/quad.fs".to_vec(),
                vertex_layout: base::VertexLayout {
                    stride: size_of::<QuadVertex>() as u32,
                    attrs: vec![
                        base::VertexAttr {
                            format: base::VertexFormat::F32(2),
                            offset: 0,
                        },
                        base::VertexAttr {
                            format: base::VertexFormat::U8Norm4,
                            offset: 8,
                        },
                        base::VertexAttr {
                            format: base::VertexFormat::F32(2),
                            offset: 12,
                        },
                    ],
                },
                resources: QUAD_SHADER_RESOURCES.clone(),
            },
            limits.max_root_constant_dwords,
        );
        let mesh_shader = Shader::new(
            ShaderDesc {
                name: "builtin.phong".to_owned(),
                vertex_bytecode: b"zandraw/builtin/phong.vs".to_vec(),
                fragment_bytecode: b"zandraw/builtin/phong.fs".to_vec(),
                vertex_layout: base::VertexLayout {
                    stride: size_of::<MeshVertex>() as u32,
                    attrs: vec![
                        base::VertexAttr {
                            format: base::VertexFormat::F32(3),
                            offset: 0,
                        },
                        base::VertexAttr {
                            format: base::VertexFormat::F32(3),
                            offset: 12,
                        },
                        base::VertexAttr {
                            format: base::VertexFormat::F32(2),
                            offset: 24,
                        },
                    ],
                },
                resources: MESH_SHADER_RESOURCES.clone(),
            },
            limits.max_root_constant_dwords,
        );

        let mut device = Self {
            driver,
            limits,
            params,
            queue,
            fence,
            last_signaled: 0,
            last_retired: 0,
            mid_frame_signal: None,
            flush_epoch: 0,
            pool,
            ring,
            ring_buffer,
            desc_ring,
            desc_ring_heap,
            view_heap,
            sampler_heap,
            disposer: Disposer::new(),
            context: RenderingContext::new(),
            context_shader_id: None,
            pipelines: HashMap::new(),
            quad_index_buffer,
            quad_shader,
            mesh_shader,
            default_texture: None,
            bound_textures: Default::default(),
            composite_mode: base::CompositeMode::SrcOver,
            world: Matrix4::identity(),
            view_proj: Matrix4::identity(),
            camera_pos: Point3::new(0.0, 0.0, 0.0),
            transforms_version: 0,
        };

        // A 1x1 white texture stands in for every unbound texture unit.
        let white = device.create_texture(
            1,
            1,
            base::ImageFormat::Rgba8,
            base::TextureUsageFlags::SHADER_RESOURCE | base::TextureUsageFlags::COPY_WRITE,
            1,
            1,
        )?;
        device.update_texture(
            &white,
            &[0xff, 0xff, 0xff, 0xff],
            base::ImageFormat::Rgba8,
            &base::Region::new(0, 0, 1, 1),
        )?;
        device.default_texture = Some(white);

        debug!(
            "device initialized: ring {} B, {} descriptors, {} command lists",
            device.params.ring_size, device.params.descriptor_ring_size, device.params.cmd_list_count
        );
        Ok(device)
    }

    pub fn limits(&self) -> &base::DeviceLimits {
        &self.limits
    }

    // ---------------------------------------------------------------------
    // Fence plumbing

    fn next_fence_value(&self) -> FenceValue {
        // 0 means "no value"; the counter wraps 0 → 1.
        self.last_signaled.checked_add(1).unwrap_or(1)
    }

    /// Register a fence checkpoint with every subsystem holding transient or
    /// disposed resources, then enqueue the GPU-side signal.
    fn signal_internal(&mut self) -> Result<FenceValue> {
        let value = self.next_fence_value();
        self.ring.on_queue_signal(value);
        self.desc_ring.on_queue_signal(value);
        self.pool.on_queue_signal(value);
        self.disposer.on_queue_signal(value);
        self.queue.signal(&self.fence, value)?;
        self.last_signaled = value;
        Ok(value)
    }

    /// Issue a signal covering all work recorded so far and return a
    /// waitable bound to it. Submits the current command list first — a
    /// checkpoint must never cover transient allocations whose consuming
    /// commands have not been submitted yet.
    pub fn signal(&mut self) -> Result<Waitable> {
        if self.pool.active_index().is_some() {
            self.flush()?;
        } else {
            self.signal_internal()?;
        }
        Ok(self.frame_waitable())
    }

    /// Deliver a retirement notification to every subsystem.
    fn retire(&mut self, value: FenceValue) {
        if value <= self.last_retired {
            return;
        }
        self.ring.on_fence_signaled(value);
        self.desc_ring.on_fence_signaled(value);
        self.pool.on_fence_signaled(value);
        let released = self.disposer.on_fence_signaled(value);
        for garbage in released {
            self.release_garbage(garbage);
        }
        self.last_retired = value;
        if let Some(v) = self.mid_frame_signal {
            if v <= value {
                self.mid_frame_signal = None;
            }
        }
    }

    fn release_garbage(&mut self, garbage: Garbage) {
        match garbage {
            Garbage::ViewSlot(slot) => self.view_heap.free(slot),
            // Dropping the last strong reference releases the resource.
            Garbage::Buffer(_) | Garbage::Texture(_) => {}
        }
    }

    /// Check the GPU's progress and reclaim whatever retired. Called once
    /// per frame and after every blocking wait.
    pub fn recycle(&mut self) {
        let completed = self.fence.completed_value();
        self.retire(completed);
    }

    /// Block until the fence reaches `value`, then reclaim.
    pub(crate) fn wait_value(&mut self, value: FenceValue) -> Result<()> {
        if value == 0 {
            return Ok(());
        }
        if let Err(err) = self.fence.wait(value) {
            // A wait failure is fatal to the operation at hand; no retry.
            error!("fence wait for {} failed: {}", value, err);
            return Err(err);
        }
        let completed = self.fence.completed_value().max(value);
        self.retire(completed);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Command list plumbing

    /// Make sure a command list is open for recording, blocking on the pool
    /// when every slot is still in flight.
    pub(crate) fn ensure_active_list(&mut self) -> Result<()> {
        loop {
            match self.pool.try_activate()? {
                None => return Ok(()),
                Some(fence_value) => self.wait_value(fence_value)?,
            }
        }
    }

    pub(crate) fn record_list(&mut self) -> &mut dyn base::DriverCmdList {
        self.pool.active_list()
    }

    /// Close and submit the current command list, follow it with a signal,
    /// and invalidate recorded GPU state. No-op when nothing is recording.
    pub(crate) fn flush(&mut self) -> Result<()> {
        if self.pool.active_index().is_none() {
            return Ok(());
        }
        let index = self.pool.close_active()?;
        self.queue.execute(self.pool.list_mut(index))?;
        self.signal_internal()?;
        self.context.on_flush();
        self.flush_epoch += 1;
        Ok(())
    }

    /// A waitable for the most recent signal.
    pub(crate) fn frame_waitable(&self) -> Waitable {
        Waitable::new(self.fence.clone(), self.last_signaled)
    }

    // ---------------------------------------------------------------------
    // Transient allocation

    /// Reserve transient space, applying the blocking policy: if the
    /// request cannot be placed, flush and wait for the ring's oldest
    /// checkpoint, then retry exactly once. When utilization has passed the
    /// configured threshold and no mid-frame signal is outstanding, a
    /// proactive flush fires first — *before* the new reservation, so its
    /// checkpoint only ever covers allocations whose consuming commands
    /// were just submitted.
    fn reserve_ring(&mut self, kind: RingKind, size: u64, align: u64) -> Result<Range<u64>> {
        let mut retried = false;
        loop {
            let over_threshold = match kind {
                RingKind::Upload => self.ring.should_flush(self.params.ring_flush_threshold),
                RingKind::Descriptor => self
                    .desc_ring
                    .should_flush(self.params.descriptor_ring_flush_threshold as u64),
            };
            if over_threshold
                && self.mid_frame_signal.is_none()
                && self.pool.active_index().is_some()
            {
                self.flush()?;
                self.mid_frame_signal = Some(self.last_signaled);
            }

            let reserved = match kind {
                RingKind::Upload => self.ring.try_reserve(size, align),
                RingKind::Descriptor => self.desc_ring.try_reserve(size, align),
            };
            if let Some(range) = reserved {
                return Ok(range);
            }

            if retried {
                warn!(
                    "transient {:?} ring exhausted ({} units, align {})",
                    kind, size, align
                );
                return Err(Error::new(ErrorKind::OutOfDeviceMemory));
            }

            // Force a checkpoint flush and block until the oldest one
            // retires, then retry once.
            self.flush()?;
            let oldest = match kind {
                RingKind::Upload => self.ring.oldest_pending_fence(),
                RingKind::Descriptor => self.desc_ring.oldest_pending_fence(),
            };
            match oldest {
                Some(value) => self.wait_value(value)?,
                None => {
                    warn!(
                        "transient {:?} ring cannot satisfy {} units (capacity exceeded)",
                        kind, size
                    );
                    return Err(Error::new(ErrorKind::OutOfDeviceMemory));
                }
            }
            retried = true;
        }
    }

    fn stage_transient(&mut self, data: &[u8], align: u64) -> Result<Range<u64>> {
        let range = self.reserve_ring(RingKind::Upload, data.len() as u64, align)?;
        write_driver_buffer(&self.ring_buffer, range.start, data);
        Ok(range)
    }

    // ---------------------------------------------------------------------
    // Resource creation

    pub fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: base::ImageFormat,
        usage: base::TextureUsageFlags,
        mip_levels: u32,
        sample_count: u32,
    ) -> Result<Texture> {
        let max = self.limits.max_image_extent_2d;
        if width == 0 || height == 0 || width > max || height > max {
            warn!("create_texture: invalid extent {}x{}", width, height);
            return Err(Error::new(ErrorKind::Other));
        }
        if !format.is_storable() {
            warn!("create_texture: {:?} is an upload source format only", format);
            return Err(Error::new(ErrorKind::Other));
        }
        if mip_levels == 0 || sample_count == 0 {
            warn!("create_texture: zero mip or sample count");
            return Err(Error::new(ErrorKind::Other));
        }

        let desc = base::TextureDesc {
            width,
            height,
            format,
            usage,
            mip_levels,
            sample_count,
        };
        let driver = self.driver.new_texture(&desc)?;

        let srv_slot = if usage.contains(base::TextureUsageFlags::SHADER_RESOURCE) {
            match self.view_heap.allocate_texture_view(&driver) {
                Some(slot) => Some(slot),
                None => {
                    warn!("create_texture: persistent view heap is full");
                    return Err(Error::new(ErrorKind::OutOfDeviceMemory));
                }
            }
        } else {
            None
        };

        Ok(Texture {
            inner: Arc::new(TextureInner {
                driver,
                desc,
                state: Mutex::new(base::ResourceState::Common),
                srv_slot,
            }),
        })
    }

    pub fn create_buffer(
        &mut self,
        size: DeviceSize,
        usage: base::BufferUsageFlags,
    ) -> Result<Buffer> {
        if size == 0 {
            warn!("create_buffer: zero size");
            return Err(Error::new(ErrorKind::Other));
        }
        let driver = self.driver.new_buffer(&base::BufferDesc {
            size,
            usage,
            memory: base::MemoryKind::Upload,
        })?;
        Ok(Buffer {
            inner: Arc::new(BufferInner {
                driver,
                size,
                usage,
            }),
        })
    }

    /// Overwrite a region of a buffer created by `create_buffer`. The
    /// caller must not overwrite data a submitted draw still reads.
    pub fn write_buffer(&mut self, buffer: &Buffer, offset: DeviceSize, data: &[u8]) -> Result<()> {
        if offset + data.len() as DeviceSize > buffer.inner.size {
            warn!("write_buffer: write past the end of the buffer");
            return Err(Error::new(ErrorKind::Other));
        }
        write_driver_buffer(&buffer.inner.driver, offset, data);
        Ok(())
    }

    pub fn create_mesh(&mut self, vertices: &[MeshVertex], indices: &[u32]) -> Result<Mesh> {
        if vertices.is_empty() || indices.is_empty() || indices.len() % 3 != 0 {
            warn!(
                "create_mesh: bad geometry ({} vertices, {} indices)",
                vertices.len(),
                indices.len()
            );
            return Err(Error::new(ErrorKind::Other));
        }
        if indices.iter().any(|&i| i as usize >= vertices.len()) {
            warn!("create_mesh: index out of range");
            return Err(Error::new(ErrorKind::Other));
        }

        let vertex_buffer = self.driver.new_buffer(&base::BufferDesc {
            size: (vertices.len() * size_of::<MeshVertex>()) as DeviceSize,
            usage: base::BufferUsageFlags::VERTEX,
            memory: base::MemoryKind::Upload,
        })?;
        write_driver_buffer(&vertex_buffer, 0, as_byte_slice(vertices));

        // Small meshes get 16-bit indices.
        let (index_buffer, index_format) = if vertices.len() <= 1 << 16 {
            let narrowed: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
            let buffer = self.driver.new_buffer(&base::BufferDesc {
                size: (narrowed.len() * 2) as DeviceSize,
                usage: base::BufferUsageFlags::INDEX,
                memory: base::MemoryKind::Upload,
            })?;
            write_driver_buffer(&buffer, 0, as_byte_slice(&narrowed));
            (buffer, base::IndexFormat::U16)
        } else {
            let buffer = self.driver.new_buffer(&base::BufferDesc {
                size: (indices.len() * 4) as DeviceSize,
                usage: base::BufferUsageFlags::INDEX,
                memory: base::MemoryKind::Upload,
            })?;
            write_driver_buffer(&buffer, 0, as_byte_slice(indices));
            (buffer, base::IndexFormat::U32)
        };

        Ok(Mesh {
            inner: Arc::new(MeshInner {
                vertex_buffer,
                index_buffer,
                vertex_count: vertices.len() as u32,
                index_count: indices.len() as u32,
                index_format,
            }),
        })
    }

    pub fn create_shader(&mut self, desc: ShaderDesc) -> Result<Shader> {
        if desc.name.is_empty() {
            warn!("create_shader: empty name");
            return Err(Error::new(ErrorKind::Other));
        }
        Ok(Shader::new(desc, self.limits.max_root_constant_dwords))
    }

    pub fn create_render_target(&mut self, texture: &Texture) -> Result<RenderTarget> {
        if !texture
            .inner
            .desc
            .usage
            .contains(base::TextureUsageFlags::RENDER_TARGET)
        {
            warn!("create_render_target: texture lacks RENDER_TARGET usage");
            return Err(Error::new(ErrorKind::Other));
        }
        Ok(RenderTarget {
            texture: texture.clone(),
        })
    }

    pub fn new_swapchain(
        &mut self,
        window: base::WindowHandle,
        width: u32,
        height: u32,
        buffer_count: u32,
    ) -> Result<Swapchain> {
        let max = self.limits.max_render_target_extent;
        if width == 0 || height == 0 || width > max || height > max || buffer_count < 2 {
            warn!(
                "new_swapchain: invalid parameters {}x{} x{}",
                width, height, buffer_count
            );
            return Err(Error::new(ErrorKind::Other));
        }
        let driver = self.driver.new_swapchain(&base::SwapchainDesc {
            window,
            width,
            height,
            buffer_count,
            format: base::ImageFormat::Bgra8,
        })?;
        Ok(Swapchain::new(driver, buffer_count, base::ImageFormat::Bgra8))
    }

    // ---------------------------------------------------------------------
    // Per-frame draw surface

    pub fn set_render_target(&mut self, target: &RenderTarget) -> Result<()> {
        self.ensure_active_list()?;
        target
            .texture
            .transition(self.pool.active_list(), base::ResourceState::RenderTarget);

        let texture = &target.texture;
        self.context.render_target.set(RenderTargetBinding {
            texture: texture.inner.driver.clone(),
            width: texture.width(),
            height: texture.height(),
            format: texture.format(),
        });
        self.context.viewport.set(Viewport {
            x: 0.0,
            y: 0.0,
            width: texture.width() as f32,
            height: texture.height() as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        // The target always carries a scissor; "no scissor" is the full
        // target rect.
        if !self.context.scissor.is_set() {
            self.context.scissor.set(None);
        }
        Ok(())
    }

    /// `None` means "no scissor" (the full render target).
    pub fn set_scissor(&mut self, rect: Option<Rect2D<u32>>) {
        self.context.scissor.set(rect);
    }

    /// Bind a texture to a texture unit. Fails fast (logged) on an invalid
    /// unit or a texture that is not sampleable.
    pub fn set_texture(&mut self, unit: usize, texture: &Texture) -> bool {
        if unit >= MAX_TEXTURE_UNITS {
            warn!("set_texture: unit {} out of range", unit);
            return false;
        }
        let srv_slot = match texture.inner.srv_slot {
            Some(slot) => slot,
            None => {
                warn!("set_texture: texture lacks SHADER_RESOURCE usage");
                return false;
            }
        };
        self.context.texture_units[unit].set(TextureUnitBinding {
            texture: texture.inner.driver.clone(),
            srv_slot,
        });
        self.bound_textures[unit] = Some(texture.clone());
        true
    }

    pub fn set_composite_mode(&mut self, mode: base::CompositeMode) {
        self.composite_mode = mode;
    }

    pub fn set_world_transform(&mut self, world: Matrix4<f32>) {
        if self.world != world {
            self.world = world;
            self.transforms_version += 1;
        }
    }

    pub fn set_view_proj_transform(&mut self, view_proj: Matrix4<f32>) {
        if self.view_proj != view_proj {
            self.view_proj = view_proj;
            self.transforms_version += 1;
        }
    }

    pub fn set_camera_pos(&mut self, pos: Point3<f32>) {
        if self.camera_pos != pos {
            self.camera_pos = pos;
            self.transforms_version += 1;
        }
    }

    /// Draw a batch of textured quads. `vertices` holds 4 vertices per
    /// quad; the fixed quad index buffer supplies the triangulation.
    ///
    /// Batches over [`MAX_BATCH_QUADS`] are dropped with a warning rather
    /// than failing the frame — the scene graph does not guarantee
    /// pre-clamped batches, and losing one oversized batch is the
    /// documented policy.
    pub fn render_quads(&mut self, vertices: &[QuadVertex]) -> Result<()> {
        if vertices.is_empty() {
            return Ok(());
        }
        assert!(
            vertices.len() % 4 == 0,
            "quad batches are groups of 4 vertices"
        );
        let quad_count = vertices.len() / 4;
        if quad_count > MAX_BATCH_QUADS {
            warn!(
                "render_quads: dropping oversized batch ({} quads > {})",
                quad_count, MAX_BATCH_QUADS
            );
            return Ok(());
        }

        let shader = self.quad_shader.clone();
        let index = IndexBinding {
            buffer: self.quad_index_buffer.clone(),
            offset: 0,
            size: self.quad_index_buffer.len(),
            format: base::IndexFormat::U16,
        };
        self.record_draw(
            &shader,
            &Geometry::Transient {
                data: as_byte_slice(vertices),
                stride: size_of::<QuadVertex>() as u32,
                index,
            },
            (quad_count * 6) as u32,
        )
    }

    /// Draw a mesh instance with the builtin Phong shader.
    pub fn render_mesh_view(&mut self, view: &MeshView) -> Result<()> {
        let shader = self.mesh_shader.clone();

        let wvp = self.view_proj * view.world;
        shader.set_constants("world_view_proj", &matrix_bytes(&wvp));
        shader.set_constants("world", &matrix_bytes(&view.world));
        shader.set_constants(
            "camera_pos",
            &vec4_bytes([self.camera_pos.x, self.camera_pos.y, self.camera_pos.z, 1.0]),
        );
        shader.set_constants("diffuse_color", &vec4_bytes(view.material.diffuse_color));
        shader.set_constants("specular_color", &vec4_bytes(view.material.specular_color));
        shader.set_constants("specular_power", &view.material.specular_power.to_ne_bytes());
        // The view supplied its own transforms; keep preparation from
        // overwriting them with the context transforms.
        self.context.pushed_transforms = Some((shader.id(), self.transforms_version));

        let diffuse = view
            .diffuse_map
            .clone()
            .unwrap_or_else(|| self.default_texture.clone().unwrap());
        if !self.set_texture(0, &diffuse) {
            return Err(Error::new(ErrorKind::Other));
        }

        let mesh = &view.mesh.inner;
        let vertex = VertexBinding {
            buffer: mesh.vertex_buffer.clone(),
            offset: 0,
            size: mesh.vertex_buffer.len(),
            stride: size_of::<MeshVertex>() as u32,
        };
        let index = IndexBinding {
            buffer: mesh.index_buffer.clone(),
            offset: 0,
            size: mesh.index_buffer.len(),
            format: mesh.index_format,
        };
        let index_count = mesh.index_count;
        self.record_draw(&shader, &Geometry::Buffers { vertex, index }, index_count)
    }

    /// Submit the current command list and draw the frame boundary: the
    /// mid-frame wait state is cleared and retired resources reclaimed.
    pub fn finish_frame(&mut self) -> Result<()> {
        self.flush()?;
        self.mid_frame_signal = None;
        self.recycle();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Texture transfer

    /// Write `data` (rows of `src_format` pixels, tightly packed) into a
    /// region of `texture`. The write is staged through the shared ring for
    /// small transfers or a dedicated one-shot buffer for large ones; the
    /// GPU-side copy is deferred but logically complete once this returns.
    pub fn update_texture(
        &mut self,
        texture: &Texture,
        data: &[u8],
        src_format: base::ImageFormat,
        region: &base::Region,
    ) -> Result<()> {
        self.validate_region(texture, region)?;
        let dst_format = texture.format();
        if !formats_compatible(src_format, dst_format) {
            warn!(
                "update_texture: cannot upload {:?} into {:?}",
                src_format, dst_format
            );
            return Err(Error::new(ErrorKind::Other));
        }
        let src_row_bytes = region.width as usize * src_format.size_of_pixel();
        if data.len() != src_row_bytes * region.height as usize {
            warn!(
                "update_texture: {} bytes for a {}x{} region of {:?}",
                data.len(),
                region.width,
                region.height,
                src_format
            );
            return Err(Error::new(ErrorKind::Other));
        }

        let row_bytes = region.width as u64 * dst_format.size_of_pixel() as u64;
        let row_pitch = round_up(row_bytes, self.limits.upload_row_pitch_align);
        let total = row_pitch * region.height as u64;

        let (staging, offset, one_shot) = if total <= self.params.staging_threshold {
            let range = self.reserve_ring(
                RingKind::Upload,
                total,
                self.limits.upload_placement_align,
            )?;
            (self.ring_buffer.clone(), range.start, false)
        } else {
            let buffer = self.driver.new_buffer(&base::BufferDesc {
                size: total,
                usage: base::BufferUsageFlags::COPY_READ,
                memory: base::MemoryKind::Upload,
            })?;
            (buffer, 0, true)
        };

        {
            let staging_rows = unsafe {
                std::slice::from_raw_parts_mut(
                    staging.as_ptr().add(offset as usize),
                    total as usize,
                )
            };
            for (src_row, dst_row) in data
                .chunks(src_row_bytes)
                .zip_eq(staging_rows.chunks_mut(row_pitch as usize))
            {
                convert_row(src_row, &mut dst_row[..row_bytes as usize], src_format, dst_format);
            }
        }

        self.ensure_active_list()?;
        let list = self.pool.active_list();
        let prev = texture.current_state();
        texture.transition(list, base::ResourceState::CopyDest);
        list.copy_buffer_to_texture(&staging, offset, row_pitch, &texture.inner.driver, region);
        let restored = if texture
            .inner
            .desc
            .usage
            .contains(base::TextureUsageFlags::SHADER_RESOURCE)
        {
            base::ResourceState::ShaderResource
        } else {
            prev
        };
        if restored != base::ResourceState::CopyDest {
            texture.transition(list, restored);
        }

        if one_shot {
            // The staging buffer lives until the copy's fence retires.
            self.disposer.mark_disposed(Garbage::Buffer(staging));
        }
        Ok(())
    }

    /// Read a region of `texture` back into `out`. GPU-to-CPU transfer
    /// cannot be pipelined without additional design, so this is a full
    /// flush-and-wait stall point by design.
    pub fn read_texture(
        &mut self,
        texture: &Texture,
        out: &mut [u8],
        region: &base::Region,
    ) -> Result<()> {
        self.validate_region(texture, region)?;
        let format = texture.format();
        let row_bytes = region.width as usize * format.size_of_pixel();
        let expected = row_bytes * region.height as usize;
        if out.len() < expected {
            warn!(
                "read_texture: output buffer holds {} bytes, {} needed",
                out.len(),
                expected
            );
            return Err(Error::new(ErrorKind::Other));
        }

        let row_pitch = round_up(row_bytes as u64, self.limits.upload_row_pitch_align);
        let total = row_pitch * region.height as u64;
        let readback = self.driver.new_buffer(&base::BufferDesc {
            size: total,
            usage: base::BufferUsageFlags::COPY_WRITE,
            memory: base::MemoryKind::Readback,
        })?;

        self.ensure_active_list()?;
        let list = self.pool.active_list();
        let prev = texture.current_state();
        texture.transition(list, base::ResourceState::CopySource);
        list.copy_texture_to_buffer(&texture.inner.driver, region, &readback, 0, row_pitch);
        if prev != base::ResourceState::CopySource {
            texture.transition(list, prev);
        }

        self.flush()?;
        let value = self.last_signaled;
        self.wait_value(value)?;

        let readback_rows =
            unsafe { std::slice::from_raw_parts(readback.as_ptr(), total as usize) };
        for (dst_row, src_row) in out[..expected]
            .chunks_mut(row_bytes)
            .zip_eq(readback_rows.chunks(row_pitch as usize))
        {
            dst_row.copy_from_slice(&src_row[..row_bytes]);
        }
        Ok(())
    }

    fn validate_region(&self, texture: &Texture, region: &base::Region) -> Result<()> {
        if region.width == 0
            || region.height == 0
            || region.x + region.width > texture.width()
            || region.y + region.height > texture.height()
        {
            warn!(
                "region {:?} exceeds the {}x{} texture",
                region,
                texture.width(),
                texture.height()
            );
            return Err(Error::new(ErrorKind::Other));
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Disposal and teardown

    /// Hand a texture back for deferred release once the GPU is provably
    /// done with it.
    pub fn dispose_texture(&mut self, texture: Texture) {
        if let Some(slot) = texture.inner.srv_slot {
            self.disposer.mark_disposed(Garbage::ViewSlot(slot));
        }
        self.disposer
            .mark_disposed(Garbage::Texture(texture.inner.driver.clone()));
    }

    pub fn dispose_buffer(&mut self, buffer: Buffer) {
        self.disposer
            .mark_disposed(Garbage::Buffer(buffer.inner.driver.clone()));
    }

    pub fn dispose_mesh(&mut self, mesh: Mesh) {
        self.disposer
            .mark_disposed(Garbage::Buffer(mesh.inner.vertex_buffer.clone()));
        self.disposer
            .mark_disposed(Garbage::Buffer(mesh.inner.index_buffer.clone()));
    }

    /// Drain all in-flight GPU work and release deferred resources. Called
    /// before teardown; a drop runs it implicitly.
    pub fn release_internals(&mut self) -> Result<()> {
        self.flush()?;
        let value = self.signal_internal()?;
        self.wait_value(value)?;
        for garbage in self.disposer.drain_all() {
            self.release_garbage(garbage);
        }
        self.mid_frame_signal = None;
        debug_assert!(self.ring.is_empty());
        debug_assert!(self.desc_ring.is_empty());
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Draw recording

    fn record_draw(
        &mut self,
        shader: &Shader,
        geometry: &Geometry<'_>,
        index_count: u32,
    ) -> Result<()> {
        if !self.context.render_target.is_set() {
            warn!("draw issued with no render target bound");
            return Err(Error::new(ErrorKind::Other));
        }
        self.ensure_active_list()?;

        // Preparation performs every allocation-heavy step before anything
        // is recorded; a reservation can flush the command list, which
        // invalidates transient bindings prepared earlier in the same pass,
        // so repeat until a pass completes without a flush.
        let mut attempts = 0;
        loop {
            let epoch = self.flush_epoch;
            self.prepare_draw(shader, geometry)?;
            if epoch == self.flush_epoch {
                break;
            }
            attempts += 1;
            if attempts >= 4 {
                warn!("draw preparation kept flushing; giving up on this draw");
                return Err(Error::new(ErrorKind::OutOfDeviceMemory));
            }
            self.ensure_active_list()?;
        }

        // Sampled textures must be readable before the draw executes.
        {
            let list = self.pool.active_list();
            for texture in Iterator::flatten(self.bound_textures.iter()) {
                texture.transition(list, base::ResourceState::ShaderResource);
            }
        }

        let list = self.pool.active_list();
        self.context.apply(list);
        list.draw_indexed(index_count, 0, 0);
        Ok(())
    }

    /// One preparation pass: pipeline selection, transform and constant
    /// upload, descriptor table assembly, geometry staging. May flush.
    fn prepare_draw(&mut self, shader: &Shader, geometry: &Geometry<'_>) -> Result<()> {
        let layout = shader.layout();

        // Pipeline state for (shader, composite mode, target format).
        let rt_format = self.context.render_target.value().unwrap().format;
        let key = (shader.id(), self.composite_mode, rt_format);
        if self.context.pipeline.value().map(|b| b.key) != Some(key) {
            let pipeline = self.lookup_pipeline(shader, key)?;
            self.context.pipeline.set(PipelineBinding { key, pipeline });
        }

        // Switching shaders invalidates everything bound into the previous
        // root layout.
        if self.context_shader_id != Some(shader.id()) {
            self.context_shader_id = Some(shader.id());
            self.context.texture_table.reset();
            self.context.sampler_table.reset();
            self.context.constants.reset();
        }

        // Fold the context transforms into the shader's constants.
        let transforms = (shader.id(), self.transforms_version);
        if self.context.pushed_transforms != Some(transforms) {
            if layout.find("world_view_proj").is_some() {
                let wvp = self.view_proj * self.world;
                shader.set_constants("world_view_proj", &matrix_bytes(&wvp));
            }
            if layout.find("world").is_some() {
                let world = self.world;
                shader.set_constants("world", &matrix_bytes(&world));
            }
            if layout.find("camera_pos").is_some() {
                let pos = self.camera_pos;
                shader.set_constants("camera_pos", &vec4_bytes([pos.x, pos.y, pos.z, 1.0]));
            }
            self.context.pushed_transforms = Some(transforms);
        }

        // Constants: root writes rebuilt from the image, spill region
        // re-reserved and re-copied.
        let dirty = shader.inner.state.lock().dirty;
        if dirty || !self.context.constants.is_set() {
            let binding = self.build_constants_binding(shader)?;
            self.context.constants.set_forced(binding);
            shader.inner.state.lock().dirty = false;
        }

        // The per-draw texture table: fresh ring slots filled by copying
        // the persistent views of the bound textures.
        if let Some(table_root) = layout.table_root_index {
            let slots = layout.num_texture_slots;
            let units_dirty = self.context.texture_units[..slots as usize]
                .iter()
                .any(|unit| unit.needs_apply());
            if units_dirty || !self.context.texture_table.is_set() {
                let default_srv = self
                    .default_texture
                    .as_ref()
                    .and_then(|texture| texture.inner.srv_slot)
                    .expect("default texture not initialized");
                let range = self.reserve_ring(RingKind::Descriptor, slots as u64, 1)?;
                let first = range.start as DescriptorIndex;
                for slot in 0..slots {
                    let srv = self.context.texture_units[slot as usize]
                        .value()
                        .map(|unit| unit.srv_slot)
                        .unwrap_or(default_srv);
                    self.desc_ring_heap
                        .copy_from(first + slot, self.view_heap.driver(), srv, 1);
                }
                self.context.texture_table.set_forced(TableBinding {
                    root_index: table_root,
                    heap: self.desc_ring_heap.clone(),
                    first_slot: first,
                });
                for unit in &mut self.context.texture_units[..slots as usize] {
                    unit.mark_applied();
                }
            }
        }

        if let Some(sampler_root) = layout.sampler_root_index {
            if !self.context.sampler_table.is_set() {
                self.context.sampler_table.set_forced(TableBinding {
                    root_index: sampler_root,
                    heap: self.sampler_heap.clone(),
                    first_slot: 0,
                });
            }
        }

        // Geometry.
        match *geometry {
            Geometry::Transient {
                data,
                stride,
                ref index,
            } => {
                let range = self.stage_transient(data, 16)?;
                self.context.vertex_buffer.set_forced(VertexBinding {
                    buffer: self.ring_buffer.clone(),
                    offset: range.start,
                    size: data.len() as DeviceSize,
                    stride,
                });
                self.context.index_buffer.set(index.clone());
            }
            Geometry::Buffers {
                ref vertex,
                ref index,
            } => {
                self.context.vertex_buffer.set(vertex.clone());
                self.context.index_buffer.set(index.clone());
            }
        }
        self.context.topology.set(base::Topology::TriangleList);

        Ok(())
    }

    fn build_constants_binding(&mut self, shader: &Shader) -> Result<ConstantsBinding> {
        let layout = shader.layout();

        let mut root_writes: SmallVec<[(u32, SmallVec<[u32; 16]>); 2]> = SmallVec::new();
        let spill: Option<Vec<u8>>;
        {
            let state = shader.inner.state.lock();
            for (_, binding) in layout.assignments() {
                if let crate::shader::Binding::RootConstants {
                    root_index,
                    dword_offset,
                    dword_count,
                } = *binding
                {
                    let offset = dword_offset as usize * 4;
                    let dwords: SmallVec<[u32; 16]> = state.image
                        [offset..offset + dword_count as usize * 4]
                        .chunks_exact(4)
                        .map(|bytes| u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                        .collect();
                    root_writes.push((root_index, dwords));
                }
            }
            spill = if layout.spill_bytes > 0 {
                Some(state.image[layout.root_bytes as usize..].to_vec())
            } else {
                None
            };
        }

        let cbv = if let Some(spill_bytes) = spill {
            let align = self.limits.constant_buffer_align;
            let size = round_up(spill_bytes.len() as u64, align);
            let range = self.reserve_ring(RingKind::Upload, size, align)?;
            write_driver_buffer(&self.ring_buffer, range.start, &spill_bytes);
            Some((
                layout.spill_root_index.unwrap(),
                self.ring_buffer.clone(),
                range.start,
                size,
            ))
        } else {
            None
        };

        Ok(ConstantsBinding { root_writes, cbv })
    }

    fn lookup_pipeline(
        &mut self,
        shader: &Shader,
        key: (u64, base::CompositeMode, base::ImageFormat),
    ) -> Result<base::DriverPipelineRef> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline.clone());
        }
        let pipeline = self.driver.new_pipeline(&base::PipelineDesc {
            vertex_bytecode: &shader.inner.vertex_bytecode,
            fragment_bytecode: &shader.inner.fragment_bytecode,
            vertex_layout: &shader.inner.vertex_layout,
            composite_mode: key.1,
            rt_format: key.2,
        })?;
        self.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(err) = self.release_internals() {
            error!("device teardown failed: {}", err);
        }
    }
}

fn write_driver_buffer(buffer: &base::DriverBufferRef, offset: DeviceSize, data: &[u8]) {
    debug_assert!(offset + data.len() as DeviceSize <= buffer.len());
    unsafe {
        std::ptr::copy_nonoverlapping(
            data.as_ptr(),
            buffer.as_ptr().add(offset as usize),
            data.len(),
        );
    }
}

fn formats_compatible(src: base::ImageFormat, dst: base::ImageFormat) -> bool {
    use zandraw_base::ImageFormat::*;
    match (src, dst) {
        (src, dst) if src == dst => true,
        (Rgb8, Rgba8) | (Rgb8, Bgra8) => true,
        _ => false,
    }
}

/// Convert one row of pixels into the destination format. `src` and `dst`
/// were validated with `formats_compatible`.
fn convert_row(
    src: &[u8],
    dst: &mut [u8],
    src_format: base::ImageFormat,
    dst_format: base::ImageFormat,
) {
    use zandraw_base::ImageFormat::*;
    match (src_format, dst_format) {
        (s, d) if s == d => dst.copy_from_slice(src),
        (Rgb8, Rgba8) => {
            for (rgb, rgba) in src.chunks_exact(3).zip_eq(dst.chunks_exact_mut(4)) {
                rgba[0] = rgb[0];
                rgba[1] = rgb[1];
                rgba[2] = rgb[2];
                rgba[3] = 0xff;
            }
        }
        (Rgb8, Bgra8) => {
            for (rgb, bgra) in src.chunks_exact(3).zip_eq(dst.chunks_exact_mut(4)) {
                bgra[0] = rgb[2];
                bgra[1] = rgb[1];
                bgra[2] = rgb[0];
                bgra[3] = 0xff;
            }
        }
        _ => unreachable!(),
    }
}

fn matrix_bytes(matrix: &Matrix4<f32>) -> [u8; 64] {
    let columns: [[f32; 4]; 4] = (*matrix).into();
    let mut out = [0u8; 64];
    for (i, column) in columns.iter().enumerate() {
        for (j, &value) in column.iter().enumerate() {
            let at = (i * 4 + j) * 4;
            out[at..at + 4].copy_from_slice(&value.to_ne_bytes());
        }
    }
    out
}

fn vec4_bytes(values: [f32; 4]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (i, &value) in values.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&value.to_ne_bytes());
    }
    out
}
