//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Tests for ZanDraw backends.
use zandraw_base as base;

pub trait TestDriver {
    fn for_each_device(&self, runner: &mut dyn FnMut(&base::DriverDeviceRef));
}

/// Generates test cases given a test driver.
#[macro_export]
macro_rules! zandraw_generate_backend_tests {
    ($driver:expr) => {
        $crate::zandraw_test_single! { create_device, $driver }
        $crate::zandraw_test_single! { device_teardown_drains, $driver }

        $crate::zandraw_test_single! { upload_readback_small, $driver }
        $crate::zandraw_test_single! { upload_readback_large, $driver }
        $crate::zandraw_test_single! { upload_rgb_expands, $driver }
        $crate::zandraw_test_single! { upload_subregion, $driver }
        $crate::zandraw_test_single! { upload_pressure_reuses_ring, $driver }
        $crate::zandraw_test_single! { readback_rejects_bad_region, $driver }

        $crate::zandraw_test_single! { quads_render, $driver }
        $crate::zandraw_test_single! { quads_oversized_batch_is_dropped, $driver }
        $crate::zandraw_test_single! { quads_many_frames, $driver }
        $crate::zandraw_test_single! { mesh_view_render, $driver }
        $crate::zandraw_test_single! { shader_set_constants_validation, $driver }

        $crate::zandraw_test_single! { dispose_while_in_flight, $driver }

        $crate::zandraw_test_single! { swapchain_present_loop, $driver }
        $crate::zandraw_test_single! { swapchain_resize, $driver }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! zandraw_test_single {
    ($(#[$m:meta])* $name:ident, $driver:expr) => {
        $(#[$m])*
        #[test]
        fn $name() {
            $crate::backend_tests::$name($driver);
        }
    }
}

pub fn create_device<T: TestDriver>(driver: T) {
    crate::utils::init_logging();
    driver.for_each_device(&mut |device| {
        let device =
            zandraw_device::Device::new(device.clone(), zandraw_device::DeviceParams::default())
                .unwrap();
        drop(device);
    });
}

pub fn device_teardown_drains<T: TestDriver>(driver: T) {
    crate::utils::init_logging();
    driver.for_each_device(&mut |device| {
        let mut device =
            zandraw_device::Device::new(device.clone(), crate::utils::small_params()).unwrap();
        let texture = device
            .create_texture(
                8,
                8,
                base::ImageFormat::Rgba8,
                base::TextureUsageFlags::SHADER_RESOURCE | base::TextureUsageFlags::COPY_WRITE,
                1,
                1,
            )
            .unwrap();
        device
            .update_texture(
                &texture,
                &[0x7fu8; 8 * 8 * 4],
                base::ImageFormat::Rgba8,
                &base::Region::new(0, 0, 8, 8),
            )
            .unwrap();
        // Teardown with a copy still in flight must drain, not crash.
        device.release_internals().unwrap();
    });
}

mod frame;
pub use self::frame::*;

mod render;
pub use self::render::*;

mod swapchain;
pub use self::swapchain::*;

mod transfer;
pub use self::transfer::*;
