//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! The ZanDraw device core.
//!
//! This crate turns the draw calls of a retained-mode scene graph (2D quads,
//! textured meshes, Phong-lit meshes) into correctly synchronized command
//! list submissions against an abstract explicit GPU API (the
//! [`zandraw_base::driver`] seam). The driver gives no automatic
//! synchronization whatsoever — everything here exists to uphold one rule:
//! *no piece of memory is reused or released while a command list that might
//! reference it could still be executing*.
//!
//! The moving parts, bottom up:
//!
//! - [`waitable`] — a fence value bundled with the means to block on it.
//! - [`ring`] — transient memory and transient descriptors, reclaimed
//!   automatically as fence checkpoints retire.
//! - [`disposer`] — deferred release of whole resources, keyed to the same
//!   checkpoints.
//! - [`cmdpool`] — a fixed set of command lists recycled across frames; the
//!   primary back-pressure bounding how far the CPU runs ahead of the GPU.
//! - [`descheap`] — free-list allocation of persistent resource views.
//! - [`shader`] — the named-resource → binding-slot assignment model.
//! - [`context`] — the state-diff machine that elides redundant GPU state
//!   changes between draws.
//! - [`device`] — the public API tying it all together.
//!
//! All command recording happens on a single thread; the only concurrency is
//! between that thread and the GPU timeline, mediated exclusively through
//! fence values.
#![warn(rust_2018_idioms)]

pub mod cmdpool;
pub mod config;
pub mod context;
pub mod descheap;
pub mod device;
pub mod disposer;
pub mod resources;
pub mod ring;
pub mod shader;
pub mod swapchain;
pub mod waitable;

pub use self::config::DeviceParams;
pub use self::context::MAX_TEXTURE_UNITS;
pub use self::device::{Device, MAX_BATCH_QUADS};
pub use self::resources::{
    Buffer, Mesh, MeshVertex, MeshView, PhongMaterial, QuadVertex, RenderTarget, Texture,
};
pub use self::shader::{Shader, ShaderDesc, ShaderResourceDecl, ShaderResourceKind};
pub use self::swapchain::Swapchain;
pub use self::waitable::Waitable;
