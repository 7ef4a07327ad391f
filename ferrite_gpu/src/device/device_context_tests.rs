//! Unit tests for device_context.rs

use crate::backend::MemoryUsage;
use crate::cache::WorkerToken;
use crate::config::DeviceConfig;
use crate::pipeline::*;
use crate::resource::*;
use crate::sync::{FenceStatus, ImageLayout, Timeout};
use crate::test_support::{graphics_pipeline, mock_device};
use crate::Error;
use std::sync::Arc;
use std::thread;

fn color_desc() -> TextureDesc {
    TextureDesc::new_2d(
        64,
        64,
        TextureFormat::B8G8R8A8_SRGB,
        TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED,
    )
}

fn uniform_layout() -> PipelineLayoutDesc {
    let bindings = BindingLayoutDesc::new([BindingDecl::new(
        0,
        DescriptorType::UniformBuffer,
        ShaderStages::VERTEX,
    )])
    .unwrap();
    PipelineLayoutDesc::new(bindings, [])
}

// ============================================================================
// RESOURCE CREATION TESTS
// ============================================================================

#[test]
fn test_texture_starts_in_default_layout() {
    let (mock, _allocator, device) = mock_device(DeviceConfig::default());

    let target = device.create_texture(color_desc()).unwrap();
    let sampled = device
        .create_texture(TextureDesc::new_2d(8, 8, TextureFormat::R8G8B8A8_UNORM, TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST))
        .unwrap();
    let storage = device
        .create_texture(TextureDesc::new_2d(8, 8, TextureFormat::R32_SFLOAT, TextureUsage::STORAGE | TextureUsage::SAMPLED))
        .unwrap();

    assert_eq!(mock.initial_layout(target.handle()), Some(ImageLayout::ColorAttachment));
    assert_eq!(mock.initial_layout(sampled.handle()), Some(ImageLayout::ShaderReadOnly));
    assert_eq!(mock.initial_layout(storage.handle()), Some(ImageLayout::General));
    assert_eq!(target.default_layout(), ImageLayout::ColorAttachment);
}

#[test]
fn test_zero_extent_texture_is_invalid() {
    let (mock, _allocator, device) = mock_device(DeviceConfig::default());
    let result = device.create_texture(TextureDesc::new_2d(0, 16, TextureFormat::R8_UNORM, TextureUsage::SAMPLED));

    assert!(matches!(result, Err(Error::InvalidUsage(_))));
    assert_eq!(mock.created("texture"), 0);
}

#[test]
fn test_exhausted_memory_destroys_new_texture() {
    let (mock, allocator, device) = mock_device(DeviceConfig::default());
    allocator.set_exhausted(true);

    let result = device.create_texture(color_desc());

    assert!(matches!(result, Err(Error::ResourceExhausted(_))));
    assert_eq!(mock.created("texture"), 1);
    assert_eq!(mock.destroyed("texture"), 1);
}

#[test]
fn test_dropping_resources_frees_memory() {
    let (mock, allocator, device) = mock_device(DeviceConfig::default());
    let buffer = device
        .create_buffer(BufferDesc { size: 256, usage: BufferUsage::UNIFORM, memory: MemoryUsage::CpuToGpu })
        .unwrap();
    let texture = device.create_texture(color_desc()).unwrap();
    assert_eq!(allocator.live_allocations(), 2);

    buffer.update(16, &[1, 2, 3, 4]).unwrap();
    assert_eq!(allocator.writes()[0].1, 16);
    assert!(matches!(buffer.update(254, &[0; 4]), Err(Error::InvalidUsage(_))));

    let mut readback = [0u8; 6];
    buffer.read(15, &mut readback).unwrap();
    assert_eq!(readback, [0, 1, 2, 3, 4, 0]);
    assert!(matches!(buffer.read(250, &mut [0; 8]), Err(Error::InvalidUsage(_))));

    drop(buffer);
    drop(texture);
    assert_eq!(allocator.live_allocations(), 0);
    assert_eq!(mock.destroyed("buffer"), 1);
    assert_eq!(mock.destroyed("texture"), 1);
}

#[test]
fn test_shader_module_from_code() {
    let (mock, _allocator, device) = mock_device(DeviceConfig::default());
    let module = device.create_shader(ShaderStage::Vertex, &[0x0723_0203, 0, 0]).unwrap();
    assert_eq!(module.entry("main").stage, ShaderStage::Vertex);

    assert!(matches!(device.create_shader(ShaderStage::Vertex, &[]), Err(Error::InvalidUsage(_))));
    drop(module);
    assert_eq!(mock.destroyed("shader_module"), 1);
}

// ============================================================================
// CACHED OBJECT TESTS
// ============================================================================

#[test]
fn test_resolve_helpers_share_cached_objects() {
    let (mock, _allocator, device) = mock_device(DeviceConfig::default());
    let layout_desc = uniform_layout();

    let pipeline_layout = device.pipeline_layout(&layout_desc).unwrap();
    let set_layout = device.set_layout(layout_desc.bindings()).unwrap();
    let sampler_a = device.sampler(&SamplerDesc::default()).unwrap();
    let sampler_b = device.sampler(&SamplerDesc::default()).unwrap();

    assert!(Arc::ptr_eq(&pipeline_layout.set_layout, &set_layout));
    assert!(Arc::ptr_eq(&sampler_a, &sampler_b));
    assert_eq!(mock.created("set_layout"), 1);
    assert_eq!(mock.created("sampler"), 1);
}

// ============================================================================
// RECORDER / SUBMISSION TESTS
// ============================================================================

#[test]
fn test_create_recorder_from_another_thread_is_invalid() {
    let (_mock, _allocator, device) = mock_device(DeviceConfig::default());
    let token = WorkerToken::current();

    let rejected = thread::scope(|scope| {
        scope
            .spawn(|| matches!(device.create_recorder(&token), Err(Error::InvalidUsage(_))))
            .join()
            .unwrap()
    });

    assert!(rejected);
    assert!(device.create_recorder(&token).is_ok());
}

#[test]
fn test_submit_requires_ended_recording() {
    let (mock, _allocator, device) = mock_device(DeviceConfig::default());
    let token = WorkerToken::current();
    let mut recorder = device.create_recorder(&token).unwrap();

    assert!(matches!(device.submit(&recorder), Err(Error::InvalidUsage(_))));
    recorder.begin().unwrap();
    assert!(matches!(device.submit(&recorder), Err(Error::InvalidUsage(_))));
    recorder.end().unwrap();

    let fence = device.submit(&recorder).unwrap();
    assert_eq!(mock.count_calls("submit"), 1);
    assert_eq!(fence.wait(Timeout::Nanos(1_000)).unwrap(), FenceStatus::Signaled);

    mock.time_out_fences(true);
    assert_eq!(fence.wait_default().unwrap(), FenceStatus::TimedOut);

    drop(fence);
    assert_eq!(mock.destroyed("fence"), 1);
}

#[test]
fn test_teardown_destroys_in_dependency_order() {
    let (mock, _allocator, device) = mock_device(DeviceConfig::default());
    let token = WorkerToken::current();
    let target = device.create_texture(color_desc()).unwrap();
    let pass = RenderPassDesc {
        color_attachments: vec![AttachmentDesc::cleared(TextureFormat::B8G8R8A8_SRGB)],
        depth_stencil_attachment: None,
    };
    let buffer = device
        .create_buffer(BufferDesc { size: 64, usage: BufferUsage::UNIFORM, memory: MemoryUsage::CpuToGpu })
        .unwrap();
    device.sampler(&SamplerDesc::nearest_clamp()).unwrap();

    let mut recorder = device.create_recorder(&token).unwrap();
    recorder.begin().unwrap();
    recorder.begin_render_pass(&pass, &[Arc::clone(&target)], None, &[]).unwrap();
    recorder.bind_pipeline(&graphics_pipeline(uniform_layout())).unwrap();
    recorder
        .bind_buffer(crate::descriptor::BufferBindingUsage::Uniform, buffer.whole(), 0)
        .unwrap();
    recorder.draw(3, 1, 0, 0).unwrap();
    recorder.end_render_pass().unwrap();
    recorder.end().unwrap();
    recorder.reset().unwrap();
    drop(recorder);
    drop(buffer);

    drop(device);
    drop(target);

    let order: Vec<&str> = mock
        .destruction_order()
        .into_iter()
        .filter(|kind| !matches!(*kind, "texture" | "buffer"))
        .collect();
    assert_eq!(
        order,
        vec![
            "command_pool",
            "descriptor_pool",
            "pipeline_layout",
            "set_layout",
            "pipeline",
            "framebuffer",
            "render_pass",
            "sampler",
        ]
    );
}

#[test]
fn test_dropping_attachment_destroys_its_framebuffers() {
    let (mock, _allocator, device) = mock_device(DeviceConfig::default());
    let token = WorkerToken::current();
    let pass = RenderPassDesc {
        color_attachments: vec![AttachmentDesc::cleared(TextureFormat::B8G8R8A8_SRGB)],
        depth_stencil_attachment: None,
    };
    let mut recorder = device.create_recorder(&token).unwrap();

    for round in 1..=5 {
        let target = device.create_texture(color_desc()).unwrap();
        recorder.begin().unwrap();
        recorder.begin_render_pass(&pass, &[Arc::clone(&target)], None, &[]).unwrap();
        recorder.end_render_pass().unwrap();
        recorder.end().unwrap();
        recorder.reset().unwrap();
        assert_eq!(device.shared().framebuffers.len(), 1);

        drop(target);
        assert_eq!(mock.destroyed("framebuffer"), round);
        assert!(device.shared().framebuffers.is_empty());
    }
    assert_eq!(mock.created("framebuffer"), 5);
}

#[test]
fn test_dropping_unrelated_texture_keeps_framebuffer() {
    let (mock, _allocator, device) = mock_device(DeviceConfig::default());
    let token = WorkerToken::current();
    let target = device.create_texture(color_desc()).unwrap();
    let other = device.create_texture(color_desc()).unwrap();
    let pass = RenderPassDesc {
        color_attachments: vec![AttachmentDesc::cleared(TextureFormat::B8G8R8A8_SRGB)],
        depth_stencil_attachment: None,
    };

    let mut recorder = device.create_recorder(&token).unwrap();
    recorder.begin().unwrap();
    recorder.begin_render_pass(&pass, &[Arc::clone(&target)], None, &[]).unwrap();
    recorder.end_render_pass().unwrap();
    recorder.end().unwrap();
    recorder.reset().unwrap();

    drop(other);
    assert_eq!(mock.destroyed("framebuffer"), 0);
    assert_eq!(device.shared().framebuffers.len(), 1);
}

#[test]
fn test_recorder_keeps_device_state_alive() {
    let (mock, _allocator, device) = mock_device(DeviceConfig::default());
    let token = WorkerToken::current();
    let recorder = device.create_recorder(&token).unwrap();

    drop(device);
    assert_eq!(mock.destroyed("command_pool"), 0);

    drop(recorder);
    assert_eq!(mock.destroyed("command_pool"), 1);
}
