//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Provides an information regarding a device's capabilities and limits.
use crate::DeviceSize;

#[derive(Debug, Clone, Copy)]
pub struct DeviceLimits {
    /// The maximum width/height of a 2D image.
    pub max_image_extent_2d: u32,

    /// The maximum width/height of a render target.
    pub max_render_target_extent: u32,

    /// The placement alignment requirement for buffer regions used as a
    /// texture-copy source or destination, measured in bytes.
    pub upload_placement_align: DeviceSize,

    /// The row pitch alignment requirement for texture-copy buffer regions,
    /// measured in bytes.
    pub upload_row_pitch_align: DeviceSize,

    /// The minimum alignment requirement for constant buffer regions,
    /// measured in bytes.
    ///
    /// Must be equal to or less than 256 bytes.
    pub constant_buffer_align: DeviceSize,

    /// The number of 32-bit values that can be bound directly through root
    /// constant slots before constant data spills to a constant buffer.
    pub max_root_constant_dwords: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_image_extent_2d: 16384,
            max_render_target_extent: 16384,
            upload_placement_align: 512,
            upload_row_pitch_align: 256,
            constant_buffer_align: 256,
            max_root_constant_dwords: 32,
        }
    }
}
