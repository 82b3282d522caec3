//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! This crate is a part of ZanDraw and provides the base interface shared by
//! the device core and its backends: the error model, resource formats and
//! descriptions, device limits, and the *driver* traits — the abstraction of
//! a native explicit GPU API (command list, queue, fence, descriptor heap)
//! that backends implement.
#![warn(rust_2018_idioms)]

pub use zandraw_common as common;

pub mod driver;
pub mod error;
pub mod formats;
pub mod limits;
pub mod resources;

/// Represents a device memory size and offset value.
pub type DeviceSize = u64;

/// Represents an index into a descriptor heap.
pub type DescriptorIndex = u32;

/// Represents a value of a GPU timeline fence.
///
/// `0` is reserved to mean "no value"; the device's fence counter starts at
/// `1` and wraps `0 → 1`.
pub type FenceValue = u64;

/// A viewport covering a region of a render target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// The X coordinate of the viewport's upper left corner.
    pub x: f32,
    /// The Y coordinate of the viewport's upper left corner.
    pub y: f32,
    /// The width of the viewport (measured in pixels).
    pub width: f32,
    /// The height of the viewport (measured in pixels).
    pub height: f32,
    /// The lower bound of the viewport's depth range.
    pub min_depth: f32,
    /// The upper bound of the viewport's depth range.
    pub max_depth: f32,
}

#[doc(no_inline)]
pub use crate::{driver::*, error::*, formats::*, limits::*, resources::*};

#[doc(no_inline)]
pub use zandraw_common::Rect2D;
