//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Swap chain presentation tests.
use super::TestDriver;
use crate::utils;
use zandraw_base as base;
use zandraw_device::Device;

pub fn swapchain_present_loop<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        utils::init_logging();
        let mut device = Device::new(driver_device.clone(), utils::small_params()).unwrap();
        let mut swapchain = device
            .new_swapchain(base::WindowHandle(0), 32, 32, 2)
            .unwrap();

        // More frames than back buffers: `present` must pace itself by
        // waiting on the oldest in-flight frame instead of queuing ahead
        // without bound.
        for frame in 0..8 {
            println!("- Frame {}", frame);
            swapchain.prepare(&mut device, None).unwrap();
            device.render_quads(&utils::quad_batch(1)).unwrap();
            swapchain.present(&mut device).unwrap();
        }
        device.finish_frame().unwrap();
        device.signal().unwrap().wait().unwrap();
    });
}

pub fn swapchain_resize<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        utils::init_logging();
        let mut device = Device::new(driver_device.clone(), utils::small_params()).unwrap();
        let mut swapchain = device
            .new_swapchain(base::WindowHandle(0), 32, 32, 2)
            .unwrap();

        swapchain.prepare(&mut device, None).unwrap();
        device.render_quads(&utils::quad_batch(1)).unwrap();
        swapchain.present(&mut device).unwrap();

        println!("- Resizing with a frame in flight");
        swapchain.resize(&mut device, 64, 48).unwrap();
        assert_eq!(swapchain.extent(), (64, 48));

        // Rendering continues at the new extent.
        swapchain.prepare(&mut device, None).unwrap();
        device.render_quads(&utils::quad_batch(1)).unwrap();
        swapchain.present(&mut device).unwrap();
        device.release_internals().unwrap();
    });
}
