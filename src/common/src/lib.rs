//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! # ZanDraw Common: Utilities
#![warn(rust_2018_idioms)]
pub use cgmath;
pub use num_integer;
pub use num_traits;

mod geom;
mod int;
pub use self::geom::*;
pub use self::int::*;
