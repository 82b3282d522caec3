//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Implementation of `DriverDescriptorHeap` for the software backend.
use parking_lot::Mutex;
use std::any::Any;

use zandraw_base as base;
use zandraw_base::{DescriptorIndex, DeviceSize};

/// A single descriptor slot.
#[derive(Debug, Clone)]
pub(crate) enum Descriptor {
    Empty,
    Texture(base::DriverTextureRef),
    Buffer {
        buffer: base::DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
    },
    Sampler(base::SamplerDesc),
}

/// Implementation of `DriverDescriptorHeap` for the software backend.
#[derive(Debug)]
pub struct SoftDescriptorHeap {
    desc: base::DescriptorHeapDesc,
    pub(crate) slots: Mutex<Vec<Descriptor>>,
}

impl SoftDescriptorHeap {
    pub(crate) fn new(desc: &base::DescriptorHeapDesc) -> Self {
        Self {
            desc: *desc,
            slots: Mutex::new(vec![Descriptor::Empty; desc.capacity as usize]),
        }
    }

    /// Return whether `slot` currently holds a view of `texture`.
    pub fn slot_is_texture(&self, slot: DescriptorIndex, texture: &base::DriverTextureRef) -> bool {
        match &self.slots.lock()[slot as usize] {
            Descriptor::Texture(t) => std::sync::Arc::ptr_eq(t, texture),
            _ => false,
        }
    }
}

impl base::DriverDescriptorHeap for SoftDescriptorHeap {
    fn capacity(&self) -> DescriptorIndex {
        self.desc.capacity
    }

    fn write_texture_view(&self, slot: DescriptorIndex, texture: &base::DriverTextureRef) {
        assert_eq!(self.desc.kind, base::DescriptorHeapKind::Resource);
        self.slots.lock()[slot as usize] = Descriptor::Texture(texture.clone());
    }

    fn write_buffer_view(
        &self,
        slot: DescriptorIndex,
        buffer: &base::DriverBufferRef,
        offset: DeviceSize,
        size: DeviceSize,
    ) {
        assert_eq!(self.desc.kind, base::DescriptorHeapKind::Resource);
        self.slots.lock()[slot as usize] = Descriptor::Buffer {
            buffer: buffer.clone(),
            offset,
            size,
        };
    }

    fn write_sampler(&self, slot: DescriptorIndex, desc: &base::SamplerDesc) {
        assert_eq!(self.desc.kind, base::DescriptorHeapKind::Sampler);
        self.slots.lock()[slot as usize] = Descriptor::Sampler(*desc);
    }

    fn copy_from(
        &self,
        dst_first: DescriptorIndex,
        src: &base::DriverDescriptorHeapRef,
        src_first: DescriptorIndex,
        count: DescriptorIndex,
    ) {
        let src: &SoftDescriptorHeap = src
            .as_any()
            .downcast_ref()
            .expect("foreign descriptor heap");
        // The two heaps are distinct objects whenever this is called (ring
        // heap vs. persistent heap), so the two locks never alias.
        let copied: Vec<Descriptor> = {
            let src_slots = src.slots.lock();
            src_slots[src_first as usize..(src_first + count) as usize].to_vec()
        };
        let mut dst_slots = self.slots.lock();
        dst_slots[dst_first as usize..(dst_first + count) as usize].clone_from_slice(&copied);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
