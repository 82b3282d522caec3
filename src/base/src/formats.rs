//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Defines various format types.
//!
//! Only the formats the retained scene graph actually feeds the backend are
//! listed here. `Rgb8` exists solely as a *source* format for texture
//! uploads — it is expanded to `Rgba8` on the way in and is never a valid
//! storage format.

/// Image format.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ImageFormat {
    /// 8-bit red channel, unsigned normalized.
    R8,

    /// 8-bit alpha channel, unsigned normalized.
    A8,

    /// 8-bit red/green/blue/alpha channels, unsigned normalized.
    Rgba8,

    /// 8-bit blue/green/red/alpha channels, unsigned normalized. The usual
    /// swap-chain format.
    Bgra8,

    /// 8-bit red/green/blue channels, unsigned normalized. Upload source
    /// only.
    Rgb8,

    /// 32-bit floating point red/green/blue/alpha channels.
    RgbaF32,
}

impl ImageFormat {
    /// The size of a single pixel, measured in bytes.
    pub fn size_of_pixel(&self) -> usize {
        match *self {
            ImageFormat::R8 | ImageFormat::A8 => 1,
            ImageFormat::Rgba8 | ImageFormat::Bgra8 => 4,
            ImageFormat::Rgb8 => 3,
            ImageFormat::RgbaF32 => 16,
        }
    }

    /// Return whether a texture can be created with this format (as opposed
    /// to it being an upload source format only).
    pub fn is_storable(&self) -> bool {
        match *self {
            ImageFormat::Rgb8 => false,
            _ => true,
        }
    }
}

/// Index buffer element format.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn size_of_index(&self) -> usize {
        match *self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// Scalar format of a vertex attribute.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum VertexFormat {
    F32(u8),
    /// Four 8-bit unsigned normalized values (e.g., a packed color).
    U8Norm4,
}

impl VertexFormat {
    pub fn size(&self) -> usize {
        match *self {
            VertexFormat::F32(n) => 4 * n as usize,
            VertexFormat::U8Norm4 => 4,
        }
    }
}
