/// Binding layout descriptors
///
/// A `BindingLayoutDesc` is the canonical, order-insensitive description of one
/// descriptor set: declarations are sorted by binding index on construction, so
/// permutations of the same declarations hash and compare equal.

use crate::error::Result;
use crate::resource::ShaderStages;

/// Kind of resource a binding slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    /// Texture and sampler pair
    SampledTexture,
    StorageTexture,
}

/// Declaration of one binding slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingDecl {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    /// Array size of the slot (1 for a single resource)
    pub count: u32,
    pub stages: ShaderStages,
}

impl BindingDecl {
    pub fn new(binding: u32, descriptor_type: DescriptorType, stages: ShaderStages) -> Self {
        Self { binding, descriptor_type, count: 1, stages }
    }
}

/// Descriptor count of one type, used to size descriptor pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorPoolSize {
    pub descriptor_type: DescriptorType,
    pub count: u32,
}

/// Canonical layout of a descriptor set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BindingLayoutDesc {
    entries: Vec<BindingDecl>,
}

impl BindingLayoutDesc {
    /// Build a canonical layout from declarations in any order
    ///
    /// Two declarations for the same binding index are rejected.
    pub fn new(decls: impl IntoIterator<Item = BindingDecl>) -> Result<Self> {
        let mut entries: Vec<BindingDecl> = decls.into_iter().collect();
        entries.sort_by_key(|decl| decl.binding);

        if let Some(pair) = entries.windows(2).find(|w| w[0].binding == w[1].binding) {
            crate::ferrite_invalid!(
                "ferrite::pipeline",
                "Binding {} declared twice in the same layout",
                pair[0].binding
            );
        }

        Ok(Self { entries })
    }

    /// Layout with no bindings
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declarations sorted by binding index
    pub fn entries(&self) -> &[BindingDecl] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declaration of `binding`, if the layout has one
    pub fn find(&self, binding: u32) -> Option<&BindingDecl> {
        self.entries
            .binary_search_by_key(&binding, |decl| decl.binding)
            .ok()
            .map(|index| &self.entries[index])
    }

    /// Aggregated per-type descriptor counts of one set of this layout
    pub fn descriptor_counts(&self) -> Vec<DescriptorPoolSize> {
        let mut sizes: Vec<DescriptorPoolSize> = Vec::new();
        for decl in &self.entries {
            match sizes.iter_mut().find(|s| s.descriptor_type == decl.descriptor_type) {
                Some(size) => size.count += decl.count,
                None => sizes.push(DescriptorPoolSize {
                    descriptor_type: decl.descriptor_type,
                    count: decl.count,
                }),
            }
        }
        sizes.sort_by_key(|s| s.descriptor_type);
        sizes
    }
}

/// Push constant range visible to a set of stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PushConstantRange {
    pub stages: ShaderStages,
    pub offset: u32,
    pub size: u32,
}

/// Pipeline layout: one descriptor set plus push constant ranges
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PipelineLayoutDesc {
    bindings: BindingLayoutDesc,
    push_constants: Vec<PushConstantRange>,
}

impl PipelineLayoutDesc {
    pub fn new(bindings: BindingLayoutDesc, push_constants: impl IntoIterator<Item = PushConstantRange>) -> Self {
        let mut push_constants: Vec<PushConstantRange> = push_constants.into_iter().collect();
        push_constants.sort_by_key(|range| (range.offset, range.size, range.stages));
        push_constants.dedup();
        Self { bindings, push_constants }
    }

    pub fn bindings(&self) -> &BindingLayoutDesc {
        &self.bindings
    }

    pub fn push_constants(&self) -> &[PushConstantRange] {
        &self.push_constants
    }
}

#[cfg(test)]
#[path = "binding_layout_tests.rs"]
mod tests;
