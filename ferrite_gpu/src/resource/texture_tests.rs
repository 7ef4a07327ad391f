//! Unit tests for texture.rs

use crate::resource::texture::*;
use crate::sync::ImageLayout;

fn desc_with(usage: TextureUsage) -> TextureDesc {
    TextureDesc::new_2d(64, 64, TextureFormat::R8G8B8A8_UNORM, usage)
}

// ============================================================================
// DEFAULT LAYOUT TESTS
// ============================================================================

#[test]
fn test_default_layout_precedence() {
    let all = TextureUsage::all();
    assert_eq!(desc_with(all).default_layout(), ImageLayout::ColorAttachment);

    let no_color = all - TextureUsage::COLOR_ATTACHMENT;
    assert_eq!(desc_with(no_color).default_layout(), ImageLayout::DepthStencilAttachment);

    let no_depth = no_color - TextureUsage::DEPTH_STENCIL_ATTACHMENT;
    assert_eq!(desc_with(no_depth).default_layout(), ImageLayout::General);

    let no_storage = no_depth - TextureUsage::STORAGE;
    assert_eq!(desc_with(no_storage).default_layout(), ImageLayout::ShaderReadOnly);

    let no_sampled = no_storage - TextureUsage::SAMPLED;
    assert_eq!(desc_with(no_sampled).default_layout(), ImageLayout::TransferDst);

    let no_dst = no_sampled - TextureUsage::TRANSFER_DST;
    assert_eq!(desc_with(no_dst).default_layout(), ImageLayout::TransferSrc);

    assert_eq!(desc_with(TextureUsage::empty()).default_layout(), ImageLayout::Undefined);
}

#[test]
fn test_sampled_upload_texture_rests_in_shader_read() {
    let desc = desc_with(TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST);
    assert_eq!(desc.default_layout(), ImageLayout::ShaderReadOnly);
}

// ============================================================================
// SUBRESOURCE TESTS
// ============================================================================

#[test]
fn test_tracked_layers_extend_by_depth_for_3d() {
    let flat = desc_with(TextureUsage::SAMPLED).with_array_layers(6);
    assert_eq!(flat.tracked_layers(), 6);

    let volume = TextureDesc::new_3d(16, 16, 8, TextureFormat::R8_UNORM, TextureUsage::SAMPLED);
    assert_eq!(volume.tracked_layers(), 8);
    assert_eq!(volume.full_range(), SubresourceRange::new(0, 1, 0, 8));
}

#[test]
fn test_range_iterates_mip_major() {
    let pairs: Vec<(u32, u32)> = SubresourceRange::new(1, 2, 3, 2).iter().collect();
    assert_eq!(pairs, vec![(1, 3), (1, 4), (2, 3), (2, 4)]);
}

#[test]
fn test_empty_range() {
    assert!(SubresourceRange::new(0, 0, 0, 4).is_empty());
    assert!(SubresourceRange::new(0, 1, 0, 0).is_empty());
    assert_eq!(SubresourceRange::new(0, 0, 0, 4).iter().count(), 0);
    assert!(!SubresourceRange::single(0, 0).is_empty());
}

// ============================================================================
// FORMAT TESTS
// ============================================================================

#[test]
fn test_format_aspects() {
    assert_eq!(TextureFormat::R8G8B8A8_SRGB.aspect(), ImageAspect::COLOR);
    assert_eq!(TextureFormat::D32_SFLOAT.aspect(), ImageAspect::DEPTH);
    assert_eq!(
        TextureFormat::D24_UNORM_S8_UINT.aspect(),
        ImageAspect::DEPTH | ImageAspect::STENCIL
    );
    assert!(!TextureFormat::R32_SFLOAT.is_depth());
}

#[test]
fn test_mip_and_layer_builders_clamp_to_one() {
    let desc = desc_with(TextureUsage::SAMPLED).with_mip_levels(0).with_array_layers(0);
    assert_eq!(desc.mip_levels, 1);
    assert_eq!(desc.array_layers, 1);
}
