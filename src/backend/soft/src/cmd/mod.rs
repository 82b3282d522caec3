//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Command list, queue, and fence implementations for the software backend.
mod fence;
mod list;
pub(crate) mod queue;

pub use self::fence::SoftFence;
pub use self::list::{Cmd, SoftCmdList};
pub use self::queue::SoftQueue;
