/// Binding slot table with change detection
///
/// Maps binding indices to the resource currently bound there. A bind that
/// changes a slot's value sets the table-wide dirty flag; draining the table for
/// a set build clears it, so draws that change nothing reuse the bound set.

use std::collections::BTreeMap;
use std::sync::Arc;
use crate::backend::{DescriptorResource, DescriptorSetHandle, DescriptorWrite};
use crate::pipeline::{BindingDecl, DescriptorType};
use crate::resource::{BufferSpan, Sampler, Texture};
use crate::sync::ImageLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferBindingUsage {
    Uniform,
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferBinding {
    pub usage: BufferBindingUsage,
    pub span: BufferSpan,
}

/// Texture with an optional sampler; equal when both identities match
#[derive(Debug, Clone)]
pub struct TextureBinding {
    pub texture: Arc<Texture>,
    pub sampler: Option<Arc<Sampler>>,
}

impl PartialEq for TextureBinding {
    fn eq(&self, other: &Self) -> bool {
        self.texture.handle() == other.texture.handle()
            && self.sampler.as_ref().map(|s| s.handle) == other.sampler.as_ref().map(|s| s.handle)
    }
}

impl Eq for TextureBinding {}

/// Content of one populated slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundResource {
    Buffer(BufferBinding),
    Texture(TextureBinding),
}

/// Layout a texture must be in to be accessed through a `declared` binding
pub fn required_layout(texture: &Texture, declared: DescriptorType) -> Option<ImageLayout> {
    match declared {
        DescriptorType::SampledTexture if texture.desc().format.is_depth() => {
            Some(ImageLayout::DepthStencilReadOnly)
        }
        DescriptorType::SampledTexture => Some(ImageLayout::ShaderReadOnly),
        DescriptorType::StorageTexture => Some(ImageLayout::General),
        DescriptorType::UniformBuffer | DescriptorType::StorageBuffer => None,
    }
}

impl BoundResource {
    /// Descriptor write for this slot against its declaration
    ///
    /// `Err` carries the reason the slot cannot be written.
    pub fn to_write(
        &self,
        set: DescriptorSetHandle,
        declared: &BindingDecl,
    ) -> std::result::Result<DescriptorWrite, String> {
        let resource = match (self, declared.descriptor_type) {
            (BoundResource::Buffer(b), DescriptorType::UniformBuffer)
                if b.usage == BufferBindingUsage::Uniform =>
            {
                buffer_resource(&b.span)
            }
            (BoundResource::Buffer(b), DescriptorType::StorageBuffer)
                if b.usage == BufferBindingUsage::Storage =>
            {
                buffer_resource(&b.span)
            }
            (BoundResource::Texture(t), DescriptorType::SampledTexture) => {
                let Some(sampler) = &t.sampler else {
                    return Err("sampled texture bound without a sampler".to_string());
                };
                DescriptorResource::Texture {
                    texture: t.texture.handle(),
                    sampler: Some(sampler.handle),
                    layout: required_layout(&t.texture, DescriptorType::SampledTexture)
                        .unwrap_or(ImageLayout::ShaderReadOnly),
                }
            }
            (BoundResource::Texture(t), DescriptorType::StorageTexture) => {
                DescriptorResource::Texture {
                    texture: t.texture.handle(),
                    sampler: None,
                    layout: ImageLayout::General,
                }
            }
            (bound, declared_type) => {
                return Err(format!(
                    "{} bound but layout declares {:?}",
                    bound.kind(),
                    declared_type
                ));
            }
        };

        Ok(DescriptorWrite {
            set,
            binding: declared.binding,
            descriptor_type: declared.descriptor_type,
            resource,
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            BoundResource::Buffer(b) if b.usage == BufferBindingUsage::Uniform => "uniform buffer",
            BoundResource::Buffer(_) => "storage buffer",
            BoundResource::Texture(_) => "texture",
        }
    }
}

fn buffer_resource(span: &BufferSpan) -> DescriptorResource {
    DescriptorResource::Buffer {
        buffer: span.handle(),
        offset: span.offset,
        size: span.size,
    }
}

/// Per-recording binding slots
#[derive(Debug)]
pub struct ResourceBindingTable {
    slots: BTreeMap<u32, BoundResource>,
    dirty: bool,
    bound: u32,
}

impl Default for ResourceBindingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceBindingTable {
    /// Empty table, dirty so the first draw builds a set
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            dirty: true,
            bound: 0,
        }
    }

    fn bind(&mut self, slot: u32, resource: BoundResource) -> bool {
        match self.slots.get_mut(&slot) {
            Some(current) if *current == resource => false,
            Some(current) => {
                *current = resource;
                self.dirty = true;
                true
            }
            None => {
                self.slots.insert(slot, resource);
                self.bound += 1;
                self.dirty = true;
                true
            }
        }
    }

    /// Bind a buffer range to `slot`; returns true if the slot changed
    pub fn bind_buffer(&mut self, usage: BufferBindingUsage, span: BufferSpan, slot: u32) -> bool {
        self.bind(slot, BoundResource::Buffer(BufferBinding { usage, span }))
    }

    /// Bind a texture (and sampler) to `slot`; returns true if the slot changed
    pub fn bind_texture(&mut self, texture: &Arc<Texture>, sampler: Option<&Arc<Sampler>>, slot: u32) -> bool {
        self.bind(
            slot,
            BoundResource::Texture(TextureBinding {
                texture: Arc::clone(texture),
                sampler: sampler.cloned(),
            }),
        )
    }

    pub fn get(&self, slot: u32) -> Option<&BoundResource> {
        self.slots.get(&slot)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Force a set rebuild before the next draw (pipeline layout changed)
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Number of populated slots
    pub fn bound_count(&self) -> u32 {
        self.bound
    }

    /// Populated textures, in slot order
    pub fn textures(&self) -> impl Iterator<Item = (u32, &TextureBinding)> {
        self.slots.iter().filter_map(|(slot, resource)| match resource {
            BoundResource::Texture(t) => Some((*slot, t)),
            BoundResource::Buffer(_) => None,
        })
    }

    /// Snapshot of every populated slot for a set build; clears the dirty flag
    pub fn drain(&mut self) -> Vec<(u32, BoundResource)> {
        self.dirty = false;
        self.slots.iter().map(|(slot, resource)| (*slot, resource.clone())).collect()
    }

    /// Clear every slot; the table is dirty again
    pub fn reset(&mut self) {
        self.slots.clear();
        self.bound = 0;
        self.dirty = true;
    }
}

#[cfg(test)]
#[path = "binding_table_tests.rs"]
mod tests;
