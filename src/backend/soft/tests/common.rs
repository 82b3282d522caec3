//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Runs the backend-agnostic suite against the software backend, plus a few
//! tests that peek at the software timeline (execution counters and the
//! manual retire gate) to pin down behavior the agnostic suite can only
//! observe indirectly.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use zandraw_base as base;
use zandraw_device::{Device, DeviceParams};
use zandraw_soft::{SoftDevice, SoftDeviceParams};
use zandraw_test::utils;
use zandraw_test::zandraw_generate_backend_tests;

struct TestDriver;

impl zandraw_test::backend_tests::TestDriver for TestDriver {
    fn for_each_device(&self, runner: &mut dyn FnMut(&base::DriverDeviceRef)) {
        let device: base::DriverDeviceRef = SoftDevice::new(SoftDeviceParams::default());
        runner(&device);
    }
}

zandraw_generate_backend_tests!(TestDriver);

fn render_target(device: &mut Device) -> zandraw_device::RenderTarget {
    let texture = device
        .create_texture(
            32,
            32,
            base::ImageFormat::Bgra8,
            base::TextureUsageFlags::RENDER_TARGET,
            1,
            1,
        )
        .unwrap();
    device.create_render_target(&texture).unwrap()
}

/// An oversized quad batch is dropped before any draw command is recorded.
#[test]
fn oversized_quad_batch_issues_no_draw() {
    utils::init_logging();
    let soft = SoftDevice::new(SoftDeviceParams::default());
    let mut device = Device::new(soft.clone(), utils::small_params()).unwrap();

    let target = render_target(&mut device);
    device.set_render_target(&target).unwrap();
    device
        .render_quads(&utils::quad_batch(zandraw_device::MAX_BATCH_QUADS + 1))
        .unwrap();
    device.finish_frame().unwrap();
    device.signal().unwrap().wait().unwrap();

    assert_eq!(soft.stats().draws(), 0);

    // An in-range batch on the same device does draw.
    device.set_render_target(&target).unwrap();
    device.render_quads(&utils::quad_batch(2)).unwrap();
    device.finish_frame().unwrap();
    device.signal().unwrap().wait().unwrap();
    assert_eq!(soft.stats().draws(), 1);
}

/// Crossing the ring's flush threshold triggers a mid-frame submission
/// before the reservation returns — the frame boundary is not the only
/// flush point.
#[test]
fn ring_pressure_flushes_mid_frame() {
    utils::init_logging();
    let soft = SoftDevice::new(SoftDeviceParams::default());
    let mut device = Device::new(soft.clone(), utils::small_params()).unwrap();

    let texture = device
        .create_texture(
            2,
            2,
            base::ImageFormat::Rgba8,
            base::TextureUsageFlags::SHADER_RESOURCE | base::TextureUsageFlags::COPY_WRITE,
            1,
            1,
        )
        .unwrap();

    assert_eq!(soft.stats().submissions(), 0);
    // Each update stages 512 aligned bytes of the 4096-byte ring. The
    // threshold (3072) is crossed by the sixth update, so the seventh
    // reservation flushes mid-frame before placing itself.
    for i in 0..7u8 {
        device
            .update_texture(
                &texture,
                &[i; 16],
                base::ImageFormat::Rgba8,
                &base::Region::new(0, 0, 2, 2),
            )
            .unwrap();
    }
    assert!(
        soft.stats().submissions() >= 1,
        "no mid-frame flush happened"
    );
    device.finish_frame().unwrap();
    device.signal().unwrap().wait().unwrap();
}

/// With every command list in flight, the next frame blocks until the
/// oldest submission's fence retires. The retire gate of the software
/// backend holds the timeline still so the blocking is observable.
#[test]
fn pool_exhaustion_blocks_until_retirement() {
    utils::init_logging();
    let soft = SoftDevice::new(SoftDeviceParams {
        auto_retire: false,
        ..Default::default()
    });
    let mut device = Device::new(
        soft.clone(),
        DeviceParams {
            cmd_list_count: 2,
            ..Default::default()
        },
    )
    .unwrap();

    let target = render_target(&mut device);

    // Two frames fill both pool slots (fence values 1 and 2).
    for _ in 0..2 {
        device.set_render_target(&target).unwrap();
        device.render_quads(&utils::quad_batch(1)).unwrap();
        device.finish_frame().unwrap();
    }

    // Release fence 1 after a delay; the third frame cannot start earlier.
    let hold = Duration::from_millis(50);
    let soft2 = soft.clone();
    let releaser = thread::spawn(move || {
        thread::sleep(hold);
        soft2.retire_up_to(1);
    });

    let start = Instant::now();
    device.set_render_target(&target).unwrap();
    device.render_quads(&utils::quad_batch(1)).unwrap();
    device.finish_frame().unwrap();
    assert!(
        start.elapsed() >= hold,
        "the third frame did not block on the pool"
    );
    releaser.join().unwrap();

    // Keep retiring so teardown's drain cannot deadlock on the gate.
    let stop = Arc::new(AtomicBool::new(false));
    let stop2 = Arc::clone(&stop);
    let soft2 = soft.clone();
    let pump = thread::spawn(move || {
        while !stop2.load(Ordering::Relaxed) {
            soft2.retire_up_to(u64::max_value());
            thread::sleep(Duration::from_millis(1));
        }
    });
    device.release_internals().unwrap();
    drop(device);
    stop.store(true, Ordering::Relaxed);
    pump.join().unwrap();
}
