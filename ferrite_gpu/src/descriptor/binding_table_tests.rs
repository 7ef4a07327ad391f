//! Unit tests for binding_table.rs

use crate::backend::{DescriptorResource, DescriptorSetHandle};
use crate::descriptor::binding_table::*;
use crate::pipeline::{BindingDecl, DescriptorType};
use crate::resource::{BufferSpan, ShaderStages, TextureDesc, TextureFormat, TextureUsage};
use crate::sync::ImageLayout;
use crate::test_support::{mock_buffer, mock_sampler, mock_texture};

fn sampled_texture() -> std::sync::Arc<crate::resource::Texture> {
    mock_texture(TextureDesc::new_2d(8, 8, TextureFormat::R8G8B8A8_UNORM, TextureUsage::SAMPLED))
}

// ============================================================================
// CHANGE DETECTION TESTS
// ============================================================================

#[test]
fn test_new_table_is_dirty_and_empty() {
    let table = ResourceBindingTable::new();
    assert!(table.is_dirty());
    assert_eq!(table.bound_count(), 0);
}

#[test]
fn test_rebinding_same_span_keeps_table_clean() {
    let buffer = mock_buffer(256);
    let mut table = ResourceBindingTable::new();

    assert!(table.bind_buffer(BufferBindingUsage::Uniform, BufferSpan::new(buffer.clone(), 0, 64), 0));
    assert_eq!(table.drain().len(), 1);
    assert!(!table.is_dirty());

    assert!(!table.bind_buffer(BufferBindingUsage::Uniform, BufferSpan::new(buffer.clone(), 0, 64), 0));
    assert!(!table.is_dirty());
}

#[test]
fn test_changed_offset_dirties_once() {
    let buffer = mock_buffer(256);
    let mut table = ResourceBindingTable::new();
    table.bind_buffer(BufferBindingUsage::Uniform, BufferSpan::new(buffer.clone(), 0, 64), 0);
    table.drain();

    assert!(table.bind_buffer(BufferBindingUsage::Uniform, BufferSpan::new(buffer.clone(), 64, 64), 0));
    assert!(table.is_dirty());
    table.drain();

    assert!(!table.bind_buffer(BufferBindingUsage::Uniform, BufferSpan::new(buffer, 64, 64), 0));
    assert!(!table.is_dirty());
    assert_eq!(table.bound_count(), 1);
}

#[test]
fn test_texture_identity_and_sampler_participate() {
    let texture = sampled_texture();
    let other = sampled_texture();
    let sampler = mock_sampler(1);
    let other_sampler = mock_sampler(2);
    let mut table = ResourceBindingTable::new();

    table.bind_texture(&texture, Some(&sampler), 1);
    table.drain();

    assert!(!table.bind_texture(&texture, Some(&mock_sampler(1)), 1));
    assert!(table.bind_texture(&texture, Some(&other_sampler), 1));
    assert!(table.bind_texture(&other, Some(&other_sampler), 1));
    assert_eq!(table.bound_count(), 1);
}

#[test]
fn test_slot_switches_kind() {
    let mut table = ResourceBindingTable::new();
    table.bind_texture(&sampled_texture(), Some(&mock_sampler(1)), 0);
    table.drain();

    assert!(table.bind_buffer(BufferBindingUsage::Storage, mock_buffer(64).whole(), 0));
    assert!(matches!(table.get(0), Some(BoundResource::Buffer(_))));
    assert_eq!(table.textures().count(), 0);
}

#[test]
fn test_reset_clears_and_redirties() {
    let mut table = ResourceBindingTable::new();
    table.bind_buffer(BufferBindingUsage::Uniform, mock_buffer(64).whole(), 3);
    table.bind_texture(&sampled_texture(), None, 4);
    table.drain();

    table.reset();
    assert!(table.is_dirty());
    assert_eq!(table.bound_count(), 0);
    assert!(table.get(3).is_none());
    assert!(table.drain().is_empty());
}

#[test]
fn test_drain_in_slot_order() {
    let mut table = ResourceBindingTable::new();
    table.bind_buffer(BufferBindingUsage::Uniform, mock_buffer(64).whole(), 5);
    table.bind_buffer(BufferBindingUsage::Uniform, mock_buffer(64).whole(), 1);
    let slots: Vec<u32> = table.drain().iter().map(|(slot, _)| *slot).collect();
    assert_eq!(slots, vec![1, 5]);
}

// ============================================================================
// WRITE TRANSLATION TESTS
// ============================================================================

#[test]
fn test_uniform_buffer_write() {
    let buffer = mock_buffer(256);
    let bound = BoundResource::Buffer(BufferBinding {
        usage: BufferBindingUsage::Uniform,
        span: BufferSpan::new(buffer.clone(), 16, 32),
    });
    let decl = BindingDecl::new(2, DescriptorType::UniformBuffer, ShaderStages::VERTEX);

    let write = bound.to_write(DescriptorSetHandle(9), &decl).unwrap();
    assert_eq!(write.binding, 2);
    assert_eq!(write.set, DescriptorSetHandle(9));
    assert_eq!(
        write.resource,
        DescriptorResource::Buffer { buffer: buffer.handle(), offset: 16, size: 32 }
    );
}

#[test]
fn test_sampled_texture_write_uses_read_layout() {
    let texture = sampled_texture();
    let sampler = mock_sampler(3);
    let bound = BoundResource::Texture(TextureBinding {
        texture: texture.clone(),
        sampler: Some(sampler.clone()),
    });
    let decl = BindingDecl::new(0, DescriptorType::SampledTexture, ShaderStages::FRAGMENT);

    let write = bound.to_write(DescriptorSetHandle(1), &decl).unwrap();
    assert_eq!(
        write.resource,
        DescriptorResource::Texture {
            texture: texture.handle(),
            sampler: Some(sampler.handle),
            layout: ImageLayout::ShaderReadOnly,
        }
    );
}

#[test]
fn test_mismatched_kinds_are_rejected() {
    let buffer = BoundResource::Buffer(BufferBinding {
        usage: BufferBindingUsage::Storage,
        span: mock_buffer(64).whole(),
    });
    let ubo = BindingDecl::new(0, DescriptorType::UniformBuffer, ShaderStages::VERTEX);
    let tex = BindingDecl::new(0, DescriptorType::SampledTexture, ShaderStages::FRAGMENT);
    assert!(buffer.to_write(DescriptorSetHandle(1), &ubo).is_err());
    assert!(buffer.to_write(DescriptorSetHandle(1), &tex).is_err());

    let no_sampler = BoundResource::Texture(TextureBinding { texture: sampled_texture(), sampler: None });
    assert!(no_sampler.to_write(DescriptorSetHandle(1), &tex).is_err());
}

#[test]
fn test_required_layouts() {
    let color = sampled_texture();
    let depth = mock_texture(TextureDesc::new_2d(
        8,
        8,
        TextureFormat::D32_SFLOAT,
        TextureUsage::DEPTH_STENCIL_ATTACHMENT | TextureUsage::SAMPLED,
    ));
    assert_eq!(required_layout(&color, DescriptorType::SampledTexture), Some(ImageLayout::ShaderReadOnly));
    assert_eq!(required_layout(&color, DescriptorType::StorageTexture), Some(ImageLayout::General));
    assert_eq!(required_layout(&depth, DescriptorType::SampledTexture), Some(ImageLayout::DepthStencilReadOnly));
    assert_eq!(required_layout(&color, DescriptorType::UniformBuffer), None);
}
