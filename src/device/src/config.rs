//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Construction-time parameters for `Device`.
//!
//! Everything the backend used to read from ambient globals is passed in
//! here explicitly, so a device can be built against injected fakes and
//! tests can shrink the rings until the interesting policies actually
//! trigger.
use zandraw_base::DeviceSize;

/// Parameters for `Device`. The defaults suit a real scene graph; tests use
/// much smaller rings.
#[derive(Debug, Clone)]
pub struct DeviceParams {
    /// Capacity of the shared transient upload ring, in bytes.
    pub ring_size: DeviceSize,

    /// Utilization threshold past which the device proactively flushes and
    /// signals mid-frame, keeping the ring from ever filling up under
    /// steady load. Trades an occasional latency spike for a bounded
    /// footprint.
    pub ring_flush_threshold: DeviceSize,

    /// Capacity of the shader-visible descriptor ring, in slots.
    pub descriptor_ring_size: u32,

    pub descriptor_ring_flush_threshold: u32,

    /// Number of command lists in the pool. Bounds how many submissions can
    /// be in flight while a new one is recorded.
    pub cmd_list_count: usize,

    /// Capacity of the persistent view heap, in slots — one per sampleable
    /// texture alive at a time.
    pub view_heap_capacity: u32,

    /// Texture updates no larger than this stage through the shared ring;
    /// larger ones get a dedicated one-shot staging buffer.
    pub staging_threshold: DeviceSize,
}

impl Default for DeviceParams {
    fn default() -> Self {
        Self {
            ring_size: 1 << 20,
            ring_flush_threshold: (1 << 20) / 4 * 3,
            descriptor_ring_size: 1024,
            descriptor_ring_flush_threshold: 768,
            cmd_list_count: 3,
            view_heap_capacity: 256,
            staging_threshold: 64 << 10,
        }
    }
}
