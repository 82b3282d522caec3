//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Free-list allocation of persistent descriptor slots.
//!
//! Unlike the ring-style heap used for per-draw tables, persistent views
//! (the shader-resource view a texture keeps for its whole lifetime) come
//! from a fixed-size heap with explicit allocate/free discipline: a slot
//! availability array plus a rolling first-free pointer, with first-fit
//! contiguous-run search and wraparound probing.
use zandraw_base as base;
use zandraw_base::{DescriptorIndex, Result};

/// First-fit contiguous-run slot allocator.
#[derive(Debug)]
pub struct SlotAllocator {
    /// `true` means free.
    free: Vec<bool>,
    /// Rolling probe start; the slot after the most recent allocation.
    next: DescriptorIndex,
}

impl SlotAllocator {
    pub fn new(capacity: DescriptorIndex) -> Self {
        assert!(capacity > 0);
        Self {
            free: vec![true; capacity as usize],
            next: 0,
        }
    }

    pub fn capacity(&self) -> DescriptorIndex {
        self.free.len() as DescriptorIndex
    }

    /// Find the first run of `count` contiguous free slots, probing linearly
    /// from the rolling pointer with wraparound. Runs do not straddle the
    /// end of the heap.
    pub fn allocate(&mut self, count: DescriptorIndex) -> Option<DescriptorIndex> {
        assert!(count > 0);
        let capacity = self.capacity();
        if count > capacity {
            return None;
        }

        for probe in 0..capacity {
            let start = (self.next + probe) % capacity;
            if start + count > capacity {
                continue;
            }
            let range = start as usize..(start + count) as usize;
            if self.free[range.clone()].iter().all(|&f| f) {
                for slot in &mut self.free[range] {
                    *slot = false;
                }
                self.next = (start + count) % capacity;
                return Some(start);
            }
        }
        None
    }

    /// Release a previously allocated run.
    ///
    /// # Panics
    ///
    /// Freeing a slot that is not allocated is a usage error.
    pub fn free(&mut self, first: DescriptorIndex, count: DescriptorIndex) {
        for slot in &mut self.free[first as usize..(first + count) as usize] {
            assert!(!*slot, "double free of a descriptor slot");
            *slot = true;
        }
    }
}

/// A persistent view heap: a driver descriptor heap fronted by a
/// `SlotAllocator`. Texture shader-resource views are written once at
/// creation and copied into the shader-visible ring heap per draw.
#[derive(Debug)]
pub struct ViewHeap {
    driver: base::DriverDescriptorHeapRef,
    allocator: SlotAllocator,
}

impl ViewHeap {
    pub fn new(driver_device: &dyn base::DriverDevice, capacity: DescriptorIndex) -> Result<Self> {
        let driver = driver_device.new_descriptor_heap(&base::DescriptorHeapDesc {
            kind: base::DescriptorHeapKind::Resource,
            capacity,
            shader_visible: false,
        })?;
        Ok(Self {
            driver,
            allocator: SlotAllocator::new(capacity),
        })
    }

    pub fn driver(&self) -> &base::DriverDescriptorHeapRef {
        &self.driver
    }

    /// Allocate a slot and write a shader-resource view of `texture` into
    /// it. Returns `None` when the heap is full.
    pub fn allocate_texture_view(
        &mut self,
        texture: &base::DriverTextureRef,
    ) -> Option<DescriptorIndex> {
        let slot = self.allocator.allocate(1)?;
        self.driver.write_texture_view(slot, texture);
        Some(slot)
    }

    pub fn free(&mut self, slot: DescriptorIndex) {
        self.allocator.free(slot, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_run_allocation() {
        let mut alloc = SlotAllocator::new(8);
        assert_eq!(alloc.allocate(3), Some(0));
        assert_eq!(alloc.allocate(3), Some(3));
        assert_eq!(alloc.allocate(3), None); // only [6, 8) left
        assert_eq!(alloc.allocate(2), Some(6));
    }

    #[test]
    fn free_reopens_runs() {
        let mut alloc = SlotAllocator::new(8);
        alloc.allocate(4).unwrap();
        let b = alloc.allocate(4).unwrap();
        alloc.free(b, 4);
        // The rolling pointer wrapped; the freed run is found again.
        assert_eq!(alloc.allocate(4), Some(4));
    }

    #[test]
    fn probe_wraps_around() {
        let mut alloc = SlotAllocator::new(8);
        let a = alloc.allocate(6).unwrap();
        assert_eq!(a, 0);
        alloc.free(0, 6);
        // next == 6; a 4-slot run cannot start there, the probe must wrap.
        assert_eq!(alloc.allocate(4), Some(0));
    }

    #[test]
    fn runs_do_not_straddle_the_end() {
        let mut alloc = SlotAllocator::new(8);
        alloc.allocate(6).unwrap(); // [0, 6)
        // [6, 8) is free but a run of 3 cannot wrap through the boundary.
        assert_eq!(alloc.allocate(3), None);
    }

    #[test]
    #[should_panic]
    fn double_free_is_a_usage_error() {
        let mut alloc = SlotAllocator::new(4);
        let a = alloc.allocate(2).unwrap();
        alloc.free(a, 2);
        alloc.free(a, 2);
    }
}
