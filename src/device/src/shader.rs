//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Shaders and the named-resource → binding-slot assignment model.
//!
//! A shader is created from bytecode plus a static table declaring every
//! named resource it consumes (`cbuffer`-style constants, textures,
//! samplers). At creation time each resource is assigned a slot of the
//! pipeline's root layout:
//!
//! - Constants are packed into root constant slots, greedily in declaration
//!   order, until the root dword budget is exhausted; the remainder spills
//!   into a single ring-allocated constant buffer region bound through one
//!   root slot.
//! - Textures always land in the shader-visible descriptor table (root
//!   slots cannot hold resource views), samplers in the sampler table.
//!
//! `set_constants` copies bytes into the shader's CPU-side constant image at
//! the precomputed offset and marks the constants dirty; the device
//! re-reserves ring space and re-uploads before the next draw.
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::warn;
use zandraw_base::VertexLayout;

/// The kind of a declared shader resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderResourceKind {
    /// A constant block of `dwords` 32-bit values.
    Constants { dwords: u32 },
    /// A sampled texture.
    Texture,
    Sampler,
}

/// One entry of a shader's static resource declaration table.
#[derive(Debug, Clone)]
pub struct ShaderResourceDecl {
    pub name: String,
    pub kind: ShaderResourceKind,
}

impl ShaderResourceDecl {
    pub fn constants(name: &str, dwords: u32) -> Self {
        Self {
            name: name.to_owned(),
            kind: ShaderResourceKind::Constants { dwords },
        }
    }

    pub fn texture(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: ShaderResourceKind::Texture,
        }
    }

    pub fn sampler(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: ShaderResourceKind::Sampler,
        }
    }
}

/// Everything needed to create a shader.
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    pub name: String,
    pub vertex_bytecode: Vec<u8>,
    pub fragment_bytecode: Vec<u8>,
    pub vertex_layout: VertexLayout,
    pub resources: Vec<ShaderResourceDecl>,
}

/// Where a named resource ended up in the root layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    RootConstants {
        root_index: u32,
        /// Offset into the root-constant region of the constant image,
        /// in dwords.
        dword_offset: u32,
        dword_count: u32,
    },
    SpillConstants {
        /// Offset into the spill region of the constant image, in bytes.
        byte_offset: u32,
        byte_size: u32,
    },
    TextureTable {
        table_slot: u32,
    },
    SamplerTable {
        table_slot: u32,
    },
}

/// The computed root layout of a shader.
#[derive(Debug)]
pub struct ShaderLayout {
    assignments: SmallVec<[(String, Binding); 8]>,
    /// Size of the root-constant region of the constant image, in bytes.
    pub root_bytes: u32,
    /// Size of the spill region of the constant image, in bytes.
    pub spill_bytes: u32,
    pub spill_root_index: Option<u32>,
    pub table_root_index: Option<u32>,
    pub sampler_root_index: Option<u32>,
    pub num_texture_slots: u32,
    pub num_sampler_slots: u32,
}

impl ShaderLayout {
    /// Assign root layout slots to a declaration table. See the module-level
    /// documentation for the policy.
    pub fn assign(decls: &[ShaderResourceDecl], max_root_dwords: u32) -> Self {
        let mut assignments = SmallVec::new();
        let mut next_root = 0u32;
        let mut root_dwords = 0u32;
        let mut spill_bytes = 0u32;
        let mut num_texture_slots = 0u32;
        let mut num_sampler_slots = 0u32;

        for decl in decls {
            let binding = match decl.kind {
                ShaderResourceKind::Constants { dwords } => {
                    if root_dwords + dwords <= max_root_dwords {
                        let binding = Binding::RootConstants {
                            root_index: next_root,
                            dword_offset: root_dwords,
                            dword_count: dwords,
                        };
                        next_root += 1;
                        root_dwords += dwords;
                        binding
                    } else {
                        let binding = Binding::SpillConstants {
                            byte_offset: spill_bytes,
                            byte_size: dwords * 4,
                        };
                        spill_bytes += dwords * 4;
                        binding
                    }
                }
                ShaderResourceKind::Texture => {
                    let binding = Binding::TextureTable {
                        table_slot: num_texture_slots,
                    };
                    num_texture_slots += 1;
                    binding
                }
                ShaderResourceKind::Sampler => {
                    let binding = Binding::SamplerTable {
                        table_slot: num_sampler_slots,
                    };
                    num_sampler_slots += 1;
                    binding
                }
            };
            assignments.push((decl.name.clone(), binding));
        }

        let spill_root_index = if spill_bytes > 0 {
            let index = next_root;
            next_root += 1;
            Some(index)
        } else {
            None
        };
        let table_root_index = if num_texture_slots > 0 {
            let index = next_root;
            next_root += 1;
            Some(index)
        } else {
            None
        };
        let sampler_root_index = if num_sampler_slots > 0 {
            Some(next_root)
        } else {
            None
        };

        Self {
            assignments,
            root_bytes: root_dwords * 4,
            spill_bytes,
            spill_root_index,
            table_root_index,
            sampler_root_index,
            num_texture_slots,
            num_sampler_slots,
        }
    }

    pub fn find(&self, name: &str) -> Option<&Binding> {
        self.assignments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
    }

    pub fn assignments(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.assignments.iter().map(|(n, b)| (n.as_str(), b))
    }

    /// Total size of the CPU-side constant image.
    pub fn constant_image_size(&self) -> usize {
        (self.root_bytes + self.spill_bytes) as usize
    }

    /// The (offset, declared size) of a constants binding within the
    /// constant image.
    fn image_range(&self, binding: &Binding) -> Option<(usize, usize)> {
        match *binding {
            Binding::RootConstants {
                dword_offset,
                dword_count,
                ..
            } => Some((dword_offset as usize * 4, dword_count as usize * 4)),
            Binding::SpillConstants {
                byte_offset,
                byte_size,
            } => Some((
                self.root_bytes as usize + byte_offset as usize,
                byte_size as usize,
            )),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ConstantState {
    pub image: Vec<u8>,
    pub dirty: bool,
}

#[derive(Debug)]
pub(crate) struct ShaderInner {
    pub id: u64,
    pub name: String,
    pub vertex_bytecode: Vec<u8>,
    pub fragment_bytecode: Vec<u8>,
    pub vertex_layout: VertexLayout,
    pub layout: ShaderLayout,
    pub state: Mutex<ConstantState>,
}

/// A loaded shader. Behaves like an `Arc`; clones share the constant image.
#[derive(Debug, Clone)]
pub struct Shader {
    pub(crate) inner: Arc<ShaderInner>,
}

static NEXT_SHADER_ID: AtomicU64 = AtomicU64::new(1);

impl Shader {
    pub(crate) fn new(desc: ShaderDesc, max_root_dwords: u32) -> Self {
        let layout = ShaderLayout::assign(&desc.resources, max_root_dwords);
        let image = vec![0u8; layout.constant_image_size()];
        Self {
            inner: Arc::new(ShaderInner {
                id: NEXT_SHADER_ID.fetch_add(1, Ordering::Relaxed),
                name: desc.name,
                vertex_bytecode: desc.vertex_bytecode,
                fragment_bytecode: desc.fragment_bytecode,
                vertex_layout: desc.vertex_layout,
                layout,
                state: Mutex::new(ConstantState {
                    image,
                    dirty: true,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn layout(&self) -> &ShaderLayout {
        &self.inner.layout
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// Copy `data` into the named constant resource.
    ///
    /// Fails (returning `false`, with a logged warning) if `name` is not a
    /// declared constant resource of this shader or `data` exceeds its
    /// declared size. On success the shader's constants become dirty and are
    /// re-uploaded before the next draw.
    pub fn set_constants(&self, name: &str, data: &[u8]) -> bool {
        let layout = &self.inner.layout;
        let binding = match layout.find(name) {
            Some(binding) => binding,
            None => {
                warn!("set_constants: {:?} declares no resource {:?}", self.inner.name, name);
                return false;
            }
        };
        let (offset, size) = match layout.image_range(binding) {
            Some(range) => range,
            None => {
                warn!(
                    "set_constants: resource {:?} of {:?} is not a constant block",
                    name, self.inner.name
                );
                return false;
            }
        };
        if data.len() > size {
            warn!(
                "set_constants: {} bytes exceed the declared size {} of {:?}",
                data.len(),
                size,
                name
            );
            return false;
        }

        let mut state = self.inner.state.lock();
        state.image[offset..offset + data.len()].copy_from_slice(data);
        state.dirty = true;
        true
    }
}
