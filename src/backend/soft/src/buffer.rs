//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Implementation of `DriverBuffer` for the software backend.
use std::any::Any;
use std::cell::UnsafeCell;
use std::fmt;
use std::ptr;

use zandraw_base as base;
use zandraw_base::DeviceSize;

/// Raw byte storage with interior mutability.
///
/// The recording thread writes through `as_ptr` while the worker thread
/// copies in and out during command execution. The fence discipline of the
/// device core guarantees the accessed ranges are disjoint in time; this
/// type merely provides the storage.
pub(crate) struct Storage {
    bytes: Box<[UnsafeCell<u8>]>,
}

unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage").field("len", &self.bytes.len()).finish()
    }
}

impl Storage {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            bytes: (0..len).map(|_| UnsafeCell::new(0)).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.bytes.as_ptr() as *mut u8
    }

    /// Copy `out.len()` bytes starting at `offset` out of the storage.
    pub(crate) fn read(&self, offset: usize, out: &mut [u8]) {
        assert!(offset + out.len() <= self.bytes.len());
        unsafe {
            ptr::copy_nonoverlapping(self.as_ptr().add(offset), out.as_mut_ptr(), out.len());
        }
    }

    /// Copy `data` into the storage starting at `offset`.
    pub(crate) fn write(&self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.bytes.len());
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.as_ptr().add(offset), data.len());
        }
    }
}

/// Implementation of `DriverBuffer` for the software backend.
#[derive(Debug)]
pub struct SoftBuffer {
    desc: base::BufferDesc,
    pub(crate) storage: Storage,
}

impl SoftBuffer {
    pub(crate) fn new(desc: &base::BufferDesc) -> Self {
        Self {
            desc: *desc,
            storage: Storage::new(desc.size as usize),
        }
    }

    pub fn desc(&self) -> &base::BufferDesc {
        &self.desc
    }
}

impl base::DriverBuffer for SoftBuffer {
    fn as_ptr(&self) -> *mut u8 {
        debug_assert!(
            self.desc.memory != base::MemoryKind::Device,
            "device-local buffers are not mapped"
        );
        self.storage.as_ptr()
    }

    fn len(&self) -> DeviceSize {
        self.desc.size
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
