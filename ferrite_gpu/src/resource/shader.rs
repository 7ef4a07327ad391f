/// Shader modules and shader stages
///
/// Modules are created from already compiled SPIR-V words.

use std::sync::Arc;
use bitflags::bitflags;
use crate::backend::{Backend, ShaderModuleHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

bitflags! {
    /// Set of shader stages (binding visibility, push constant ranges)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

impl From<ShaderStage> for ShaderStages {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => ShaderStages::VERTEX,
            ShaderStage::Fragment => ShaderStages::FRAGMENT,
            ShaderStage::Compute => ShaderStages::COMPUTE,
        }
    }
}

/// Compiled shader module, destroyed when dropped
pub struct ShaderModule {
    handle: ShaderModuleHandle,
    stage: ShaderStage,
    backend: Arc<dyn Backend>,
}

impl ShaderModule {
    pub(crate) fn new(handle: ShaderModuleHandle, stage: ShaderStage, backend: Arc<dyn Backend>) -> Self {
        Self { handle, stage, backend }
    }

    pub fn handle(&self) -> ShaderModuleHandle {
        self.handle
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage description for a pipeline descriptor
    pub fn entry(&self, entry_point: &str) -> ShaderStageDesc {
        ShaderStageDesc {
            stage: self.stage,
            module: self.handle,
            entry_point: entry_point.to_string(),
        }
    }
}

impl std::fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderModule")
            .field("handle", &self.handle)
            .field("stage", &self.stage)
            .finish()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        self.backend.destroy_shader_module(self.handle);
    }
}

/// One programmable stage of a pipeline
///
/// The module must outlive every pipeline built from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderStageDesc {
    pub stage: ShaderStage,
    pub module: ShaderModuleHandle,
    pub entry_point: String,
}
