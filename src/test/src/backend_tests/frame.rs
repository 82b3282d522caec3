//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Frame-boundary and resource-lifetime tests.
use super::TestDriver;
use crate::utils;
use zandraw_base as base;
use zandraw_device::Device;

pub fn dispose_while_in_flight<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        utils::init_logging();
        let mut device = Device::new(driver_device.clone(), utils::small_params()).unwrap();

        println!("- Creating and updating a texture");
        let texture = device
            .create_texture(
                4,
                4,
                base::ImageFormat::Rgba8,
                base::TextureUsageFlags::SHADER_RESOURCE | base::TextureUsageFlags::COPY_WRITE,
                1,
                1,
            )
            .unwrap();
        device
            .update_texture(
                &texture,
                &[3u8; 64],
                base::ImageFormat::Rgba8,
                &base::Region::new(0, 0, 4, 4),
            )
            .unwrap();

        println!("- Disposing it while the copy may still be in flight");
        device.dispose_texture(texture);

        // The disposal is stamped by the frame's signal and released once
        // that fence retires; later frames proceed normally.
        device.finish_frame().unwrap();
        device.signal().unwrap().wait().unwrap();
        device.recycle();

        // The view slot was returned to the free list: filling the heap up
        // again succeeds.
        for _ in 0..4 {
            let texture = device
                .create_texture(
                    2,
                    2,
                    base::ImageFormat::Rgba8,
                    base::TextureUsageFlags::SHADER_RESOURCE,
                    1,
                    1,
                )
                .unwrap();
            device.dispose_texture(texture);
            device.finish_frame().unwrap();
        }
        device.release_internals().unwrap();
    });
}
