//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Implementation of `DriverQueue` for the software backend.
//!
//! A worker thread stands in for the GPU: it drains submitted command lists
//! in order, performs their copy commands on the in-memory resources, and
//! retires fence values. Dropping the queue hangs up the channel and joins
//! the worker, so no job outlives the queue.
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use zandraw_base as base;
use zandraw_base::{FenceValue, Result};

use super::fence::SoftFence;
use super::list::{Cmd, SoftCmdList};
use crate::buffer::SoftBuffer;
use crate::texture::SoftTexture;

/// Submission and execution counters, inspectable by tests.
#[derive(Debug, Default)]
pub struct Stats {
    submissions: AtomicUsize,
    draws: AtomicUsize,
}

impl Stats {
    /// The number of command lists executed so far.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// The number of draw commands executed so far.
    pub fn draws(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }
}

/// Controls when fence values retire.
///
/// With `auto` set, the worker signals fences as soon as it reaches the
/// signal job (the normal mode). Otherwise signals accumulate in `pending`
/// until `SoftDevice::retire_up_to` releases them, which lets tests hold the
/// simulated GPU at a precise point of the timeline.
#[derive(Debug)]
pub(crate) struct RetireGate {
    pub(crate) auto: bool,
    pub(crate) pending: Mutex<Vec<(base::DriverFenceRef, FenceValue)>>,
}

enum Job {
    Execute(Vec<Cmd>),
    Signal(base::DriverFenceRef, FenceValue),
}

/// Implementation of `DriverQueue` for the software backend.
#[derive(Debug)]
pub struct SoftQueue {
    job_sender: Option<Sender<Job>>,
    join_handle: Option<thread::JoinHandle<()>>,
    stats: Arc<Stats>,
}

impl SoftQueue {
    pub(crate) fn new(stats: Arc<Stats>, gate: Arc<RetireGate>) -> Self {
        let (job_sender, job_receiver) = channel();

        let join_handle = {
            let stats = Arc::clone(&stats);
            thread::Builder::new()
                .name("zandraw-soft-queue".to_owned())
                .spawn(move || Self::worker(job_receiver, stats, gate))
                .unwrap()
        };

        Self {
            job_sender: Some(job_sender),
            join_handle: Some(join_handle),
            stats,
        }
    }

    fn worker(job_receiver: Receiver<Job>, stats: Arc<Stats>, gate: Arc<RetireGate>) {
        for job in job_receiver.iter() {
            match job {
                Job::Execute(cmds) => {
                    let mut render_target = None;
                    for cmd in &cmds {
                        exec_cmd(cmd, &stats, &mut render_target);
                    }
                }
                Job::Signal(fence, value) => {
                    if gate.auto {
                        signal_fence(&fence, value);
                    } else {
                        gate.pending.lock().push((fence, value));
                    }
                }
            }
        }
    }
}

impl Drop for SoftQueue {
    fn drop(&mut self) {
        // Hang up the channel (which causes the worker thread to quit)
        self.job_sender = None;

        let join_handle = self.join_handle.take().unwrap();
        if thread::current().id() != join_handle.thread().id() {
            join_handle.join().unwrap();
        }
    }
}

impl base::DriverQueue for SoftQueue {
    fn execute(&mut self, list: &mut dyn base::DriverCmdList) -> Result<()> {
        let list: &mut SoftCmdList = list
            .as_any_mut()
            .downcast_mut()
            .expect("foreign command list");
        assert!(list.is_closed(), "executing an open command list");

        let cmds = list.drain_cmds();
        self.stats.submissions.fetch_add(1, Ordering::SeqCst);
        self.job_sender
            .as_ref()
            .unwrap()
            .send(Job::Execute(cmds))
            .unwrap();
        Ok(())
    }

    fn signal(&mut self, fence: &base::DriverFenceRef, value: FenceValue) -> Result<()> {
        self.job_sender
            .as_ref()
            .unwrap()
            .send(Job::Signal(fence.clone(), value))
            .unwrap();
        Ok(())
    }
}

pub(crate) fn signal_fence(fence: &base::DriverFenceRef, value: FenceValue) {
    let fence: &SoftFence = fence.as_any().downcast_ref().expect("foreign fence");
    fence.signal_to(value);
}

fn exec_cmd(cmd: &Cmd, stats: &Stats, render_target: &mut Option<base::DriverTextureRef>) {
    match cmd {
        Cmd::SetRenderTarget(texture) => {
            *render_target = Some(texture.clone());
        }
        Cmd::ClearRenderTarget(color) => {
            if let Some(ref rt) = *render_target {
                clear_texture(rt, *color);
            }
        }
        Cmd::DrawIndexed { .. } => {
            stats.draws.fetch_add(1, Ordering::SeqCst);
        }
        Cmd::CopyBuffer {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        } => {
            let src: &SoftBuffer = src.as_any().downcast_ref().expect("foreign buffer");
            let dst: &SoftBuffer = dst.as_any().downcast_ref().expect("foreign buffer");
            let mut tmp = vec![0u8; *size as usize];
            src.storage.read(*src_offset as usize, &mut tmp);
            dst.storage.write(*dst_offset as usize, &tmp);
        }
        Cmd::CopyBufferToTexture {
            src,
            src_offset,
            src_row_pitch,
            dst,
            region,
        } => {
            let src: &SoftBuffer = src.as_any().downcast_ref().expect("foreign buffer");
            let dst: &SoftTexture = dst.as_any().downcast_ref().expect("foreign texture");
            let bpp = dst.desc.format.size_of_pixel();
            let width = dst.desc.width as usize;
            let row_len = region.width as usize * bpp;
            let mut data = dst.data.lock();
            for row in 0..region.height as usize {
                let src_off = *src_offset as usize + row * *src_row_pitch as usize;
                let dst_off = ((region.y as usize + row) * width + region.x as usize) * bpp;
                src.storage.read(src_off, &mut data[dst_off..dst_off + row_len]);
            }
        }
        Cmd::CopyTextureToBuffer {
            src,
            region,
            dst,
            dst_offset,
            dst_row_pitch,
        } => {
            let src: &SoftTexture = src.as_any().downcast_ref().expect("foreign texture");
            let dst: &SoftBuffer = dst.as_any().downcast_ref().expect("foreign buffer");
            let bpp = src.desc.format.size_of_pixel();
            let width = src.desc.width as usize;
            let row_len = region.width as usize * bpp;
            let data = src.data.lock();
            for row in 0..region.height as usize {
                let src_off = ((region.y as usize + row) * width + region.x as usize) * bpp;
                let dst_off = *dst_offset as usize + row * *dst_row_pitch as usize;
                dst.storage.write(dst_off, &data[src_off..src_off + row_len]);
            }
        }
        // State-setting commands have no observable effect on the software
        // timeline.
        _ => {}
    }
}

fn clear_texture(texture: &base::DriverTextureRef, color: [f32; 4]) {
    let texture: &SoftTexture = texture.as_any().downcast_ref().expect("foreign texture");
    let format = texture.desc.format;
    let mut data = texture.data.lock();
    match format {
        base::ImageFormat::Rgba8 | base::ImageFormat::Bgra8 => {
            let to_u8 = |x: f32| (x.max(0.0).min(1.0) * 255.0 + 0.5) as u8;
            let px = match format {
                base::ImageFormat::Bgra8 => {
                    [to_u8(color[2]), to_u8(color[1]), to_u8(color[0]), to_u8(color[3])]
                }
                _ => [to_u8(color[0]), to_u8(color[1]), to_u8(color[2]), to_u8(color[3])],
            };
            for chunk in data.chunks_mut(4) {
                chunk.copy_from_slice(&px);
            }
        }
        _ => {
            for byte in data.iter_mut() {
                *byte = 0;
            }
        }
    }
}
