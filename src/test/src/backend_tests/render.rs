//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Draw-path tests: quad batches, mesh views, shader constants.
use cgmath::{Matrix4, Point3, SquareMatrix};

use super::TestDriver;
use crate::utils;
use zandraw_base as base;
use zandraw_device::{
    Device, MeshVertex, MeshView, PhongMaterial, RenderTarget, ShaderDesc, Texture, MAX_BATCH_QUADS,
};

struct Scene {
    device: Device,
    target: RenderTarget,
    texture: Texture,
}

fn scene(driver_device: &base::DriverDeviceRef) -> Scene {
    utils::init_logging();
    let mut device = Device::new(driver_device.clone(), utils::small_params()).unwrap();

    let rt_texture = device
        .create_texture(
            64,
            64,
            base::ImageFormat::Bgra8,
            base::TextureUsageFlags::RENDER_TARGET | base::TextureUsageFlags::COPY_READ,
            1,
            1,
        )
        .unwrap();
    let target = device.create_render_target(&rt_texture).unwrap();

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
            &[0xffu8; 8 * 8 * 4],
            base::ImageFormat::Rgba8,
            &base::Region::new(0, 0, 8, 8),
        )
        .unwrap();

    Scene {
        device,
        target,
        texture,
    }
}

pub fn quads_render<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        let Scene {
            mut device,
            target,
            texture,
        } = scene(driver_device);

        println!("- Drawing two quad batches");
        device.set_render_target(&target).unwrap();
        assert!(device.set_texture(0, &texture));
        device.render_quads(&utils::quad_batch(2)).unwrap();
        // The second batch differs only by its vertex data; the state diff
        // machine elides everything else.
        device.render_quads(&utils::quad_batch(3)).unwrap();
        device.finish_frame().unwrap();

        println!("- Waiting for the frame");
        device.signal().unwrap().wait().unwrap();
    });
}

pub fn quads_oversized_batch_is_dropped<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        let Scene {
            mut device, target, ..
        } = scene(driver_device);

        device.set_render_target(&target).unwrap();
        // One past the cap: the batch is dropped with a warning, the call
        // succeeds, and the frame goes on.
        let vertices = utils::quad_batch(MAX_BATCH_QUADS + 1);
        device.render_quads(&vertices).unwrap();
        device.render_quads(&utils::quad_batch(1)).unwrap();
        device.finish_frame().unwrap();
        device.signal().unwrap().wait().unwrap();
    });
}

pub fn quads_many_frames<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        let Scene {
            mut device,
            target,
            texture,
        } = scene(driver_device);

        // Enough frames to cycle the command list pool several times over;
        // the pool's back-pressure and the ring checkpoints have to agree.
        for frame in 0..16 {
            device.set_render_target(&target).unwrap();
            assert!(device.set_texture(0, &texture));
            device.set_world_transform(Matrix4::from_translation(
                [frame as f32, 0.0, 0.0].into(),
            ));
            device.render_quads(&utils::quad_batch(4)).unwrap();
            device.finish_frame().unwrap();
        }
        device.signal().unwrap().wait().unwrap();
    });
}

pub fn mesh_view_render<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        let Scene {
            mut device,
            target,
            texture,
        } = scene(driver_device);

        println!("- Creating a unit triangle mesh");
        let vertices = [
            MeshVertex {
                position: [0.0, 0.0, 0.0],
                normal: [0.0, 0.0, 1.0],
                uv: [0.0, 0.0],
            },
            MeshVertex {
                position: [1.0, 0.0, 0.0],
                normal: [0.0, 0.0, 1.0],
                uv: [1.0, 0.0],
            },
            MeshVertex {
                position: [0.0, 1.0, 0.0],
                normal: [0.0, 0.0, 1.0],
                uv: [0.0, 1.0],
            },
        ];
        let mesh = device.create_mesh(&vertices, &[0, 1, 2]).unwrap();

        device.set_render_target(&target).unwrap();
        device.set_view_proj_transform(Matrix4::identity());
        device.set_camera_pos(Point3::new(0.0, 0.0, -5.0));

        println!("- Rendering a textured view and an untextured one");
        device
            .render_mesh_view(&MeshView {
                mesh: mesh.clone(),
                world: Matrix4::identity(),
                material: PhongMaterial::default(),
                diffuse_map: Some(texture),
            })
            .unwrap();
        device
            .render_mesh_view(&MeshView {
                mesh,
                world: Matrix4::from_scale(2.0),
                material: PhongMaterial {
                    diffuse_color: [1.0, 0.0, 0.0, 1.0],
                    ..PhongMaterial::default()
                },
                diffuse_map: None,
            })
            .unwrap();
        device.finish_frame().unwrap();
        device.signal().unwrap().wait().unwrap();
    });
}

pub fn shader_set_constants_validation<T: TestDriver>(driver: T) {
    driver.for_each_device(&mut |driver_device| {
        utils::init_logging();
        let mut device =
            Device::new(driver_device.clone(), utils::small_params()).unwrap();

        let shader = device
            .create_shader(ShaderDesc {
                name: "test.custom".to_owned(),
                vertex_bytecode: b"vs".to_vec(),
                fragment_bytecode: b"fs".to_vec(),
                vertex_layout: base::VertexLayout {
                    stride: 16,
                    attrs: vec![base::VertexAttr {
                        format: base::VertexFormat::F32(4),
                        offset: 0,
                    }],
                },
                resources: vec![
                    zandraw_device::ShaderResourceDecl::constants("tint", 4),
                    zandraw_device::ShaderResourceDecl::texture("tex"),
                ],
            })
            .unwrap();

        assert!(shader.set_constants("tint", &[0u8; 16]));
        // Undeclared names and non-constant resources fail fast.
        assert!(!shader.set_constants("nope", &[0u8; 4]));
        assert!(!shader.set_constants("tex", &[0u8; 4]));
    });
}
