//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Helpers shared by the backend tests.
use zandraw_device::{DeviceParams, QuadVertex};

/// Initialize logging once; repeated calls are fine.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// Parameters with rings small enough that the interesting policies
/// (threshold flushes, blocking reservations) actually trigger in tests.
pub fn small_params() -> DeviceParams {
    DeviceParams {
        ring_size: 4096,
        ring_flush_threshold: 3072,
        descriptor_ring_size: 64,
        descriptor_ring_flush_threshold: 48,
        cmd_list_count: 2,
        view_heap_capacity: 32,
        staging_threshold: 1024,
    }
}

/// Build the 4 vertices of an axis-aligned quad.
pub fn quad(x: f32, y: f32, w: f32, h: f32, color: [u8; 4]) -> [QuadVertex; 4] {
    let v = |px, py, u, vv| QuadVertex {
        position: [px, py],
        color,
        uv: [u, vv],
    };
    [
        v(x, y, 0.0, 0.0),
        v(x + w, y, 1.0, 0.0),
        v(x + w, y + h, 1.0, 1.0),
        v(x, y + h, 0.0, 1.0),
    ]
}

/// A batch of `count` quads laid out in a row.
pub fn quad_batch(count: usize) -> Vec<QuadVertex> {
    let mut vertices = Vec::with_capacity(count * 4);
    for i in 0..count {
        vertices.extend_from_slice(&quad(i as f32, 0.0, 1.0, 1.0, [255, 0, 0, 255]));
    }
    vertices
}
