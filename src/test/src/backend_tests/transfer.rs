//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Texture upload/readback round trips.
use super::TestDriver;
use crate::utils;
use zandraw_base as base;
use zandraw_device::Device;

fn new_device(driver: &base::DriverDeviceRef) -> Device {
    utils::init_logging();
    Device::new(driver.clone(), utils::small_params()).unwrap()
}

fn sampled_texture(device: &mut Device, w: u32, h: u32, format: base::ImageFormat)
    -> zandraw_device::Texture
{
    device
        .create_texture(
            w,
            h,
            format,
            base::TextureUsageFlags::SHADER_RESOURCE
                | base::TextureUsageFlags::COPY_READ
                | base::TextureUsageFlags::COPY_WRITE,
            1,
            1,
        )
        .unwrap()
}

pub fn upload_readback_small<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        let mut device = new_device(driver_device);
        println!("- Creating a 4x4 texture");
        let texture = sampled_texture(&mut device, 4, 4, base::ImageFormat::Rgba8);

        let data: Vec<u8> = (0..4 * 4 * 4).map(|i| i as u8).collect();
        println!("- Uploading through the shared ring");
        device
            .update_texture(
                &texture,
                &data,
                base::ImageFormat::Rgba8,
                &base::Region::new(0, 0, 4, 4),
            )
            .unwrap();

        println!("- Reading back");
        let mut out = vec![0u8; data.len()];
        device
            .read_texture(&texture, &mut out, &base::Region::new(0, 0, 4, 4))
            .unwrap();
        assert_eq!(out, data);
    });
}

pub fn upload_readback_large<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        let mut device = new_device(driver_device);
        // 32x32 RGBA = 4096 B > the 1024 B staging threshold: this goes
        // through a dedicated one-shot staging buffer and the disposer.
        println!("- Creating a 32x32 texture");
        let texture = sampled_texture(&mut device, 32, 32, base::ImageFormat::Rgba8);

        let data: Vec<u8> = (0..32 * 32 * 4).map(|i| (i * 7) as u8).collect();
        println!("- Uploading through a one-shot staging buffer");
        device
            .update_texture(
                &texture,
                &data,
                base::ImageFormat::Rgba8,
                &base::Region::new(0, 0, 32, 32),
            )
            .unwrap();

        let mut out = vec![0u8; data.len()];
        device
            .read_texture(&texture, &mut out, &base::Region::new(0, 0, 32, 32))
            .unwrap();
        assert_eq!(out, data);

        device.finish_frame().unwrap();
    });
}

pub fn upload_rgb_expands<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        let mut device = new_device(driver_device);
        let texture = sampled_texture(&mut device, 2, 1, base::ImageFormat::Rgba8);

        println!("- Uploading RGB8 rows into an RGBA8 texture");
        device
            .update_texture(
                &texture,
                &[1, 2, 3, 4, 5, 6],
                base::ImageFormat::Rgb8,
                &base::Region::new(0, 0, 2, 1),
            )
            .unwrap();

        let mut out = vec![0u8; 8];
        device
            .read_texture(&texture, &mut out, &base::Region::new(0, 0, 2, 1))
            .unwrap();
        assert_eq!(out, [1, 2, 3, 0xff, 4, 5, 6, 0xff]);
    });
}

pub fn upload_subregion<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        let mut device = new_device(driver_device);
        let texture = sampled_texture(&mut device, 4, 4, base::ImageFormat::R8);

        device
            .update_texture(
                &texture,
                &[9u8; 16],
                base::ImageFormat::R8,
                &base::Region::new(0, 0, 4, 4),
            )
            .unwrap();
        println!("- Overwriting the middle 2x2");
        device
            .update_texture(
                &texture,
                &[1, 2, 3, 4],
                base::ImageFormat::R8,
                &base::Region::new(1, 1, 2, 2),
            )
            .unwrap();

        let mut out = vec![0u8; 16];
        device
            .read_texture(&texture, &mut out, &base::Region::new(0, 0, 4, 4))
            .unwrap();
        #[rustfmt::skip]
        assert_eq!(
            out,
            [
                9, 9, 9, 9,
                9, 1, 2, 9,
                9, 3, 4, 9,
                9, 9, 9, 9,
            ]
        );
    });
}

pub fn upload_pressure_reuses_ring<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        let mut device = new_device(driver_device);
        let texture = sampled_texture(&mut device, 2, 2, base::ImageFormat::Rgba8);

        // Far more bytes than the 4 KiB ring holds: every placement
        // alignment pad counts, so the blocking flush-and-wait policy has
        // to reclaim checkpoints over and over. The last write must win.
        println!("- Hammering the ring with updates");
        for i in 0..64u32 {
            let byte = i as u8;
            device
                .update_texture(
                    &texture,
                    &[byte; 2 * 2 * 4],
                    base::ImageFormat::Rgba8,
                    &base::Region::new(0, 0, 2, 2),
                )
                .unwrap();
        }

        let mut out = vec![0u8; 16];
        device
            .read_texture(&texture, &mut out, &base::Region::new(0, 0, 2, 2))
            .unwrap();
        assert_eq!(out, [63u8; 16]);
    });
}

pub fn readback_rejects_bad_region<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        let mut device = new_device(driver_device);
        let texture = sampled_texture(&mut device, 4, 4, base::ImageFormat::Rgba8);

        let mut out = vec![0u8; 1024];
        // Out of bounds region fails fast without corrupting anything.
        assert!(device
            .read_texture(&texture, &mut out, &base::Region::new(2, 2, 4, 4))
            .is_err());
        // Undersized output buffer, same.
        let mut tiny = [0u8; 4];
        assert!(device
            .read_texture(&texture, &mut tiny, &base::Region::new(0, 0, 4, 4))
            .is_err());

        // The device is still usable afterwards.
        device
            .update_texture(
                &texture,
                &[5u8; 64],
                base::ImageFormat::Rgba8,
                &base::Region::new(0, 0, 4, 4),
            )
            .unwrap();
        let mut out = vec![0u8; 64];
        device
            .read_texture(&texture, &mut out, &base::Region::new(0, 0, 4, 4))
            .unwrap();
        assert_eq!(out, [5u8; 64]);
    });
}
