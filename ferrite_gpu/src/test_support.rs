//! Shared helpers for unit tests (no GPU required)

use crate::backend::mock_backend::{MockAllocator, MockBackend};
use crate::backend::{
    Backend, BufferHandle, MemoryAllocation, MemoryAllocator, MemoryHandle, MemoryUsage,
    SamplerHandle, ShaderModuleHandle, TextureHandle,
};
use crate::config::DeviceConfig;
use crate::device::DeviceContext;
use crate::log::{Log, LogEntry, LogSeverity, Logger};
use crate::pipeline::{
    BlendState, ColorBlendAttachment, ComputePipelineDesc, DepthStencilState, GraphicsPipelineDesc,
    InputAssemblyState, MultisampleState, PipelineLayoutDesc, RasterizationState,
};
use crate::resource::{
    Buffer, BufferDesc, BufferUsage, Sampler, SamplerDesc, ShaderStage, ShaderStageDesc, Texture,
    TextureDesc,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Logger that keeps every entry in memory
///
/// Installing it replaces the global sink; tests using it must be `#[serial]`.
#[derive(Clone, Default)]
pub struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

struct CaptureSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureSink {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

impl CaptureLogger {
    /// Install a fresh capture logger as the global sink
    pub fn install() -> Self {
        let capture = Self::default();
        Log::set_logger(CaptureSink {
            entries: Arc::clone(&capture.entries),
        });
        capture
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn messages_at(&self, severity: LogSeverity) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.severity == severity)
            .map(|e| e.message.clone())
            .collect()
    }
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1_000);

/// Standalone texture backed by a throwaway mock backend
pub fn mock_texture(desc: TextureDesc) -> Arc<Texture> {
    let backend: Arc<dyn Backend> = Arc::new(MockBackend::new());
    let allocator: Arc<dyn MemoryAllocator> = Arc::new(MockAllocator::new());
    let memory = MemoryAllocation { handle: MemoryHandle(1), offset: 0, size: 0 };
    Arc::new(Texture::new(
        TextureHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)),
        desc,
        memory,
        backend,
        allocator,
    ))
}

/// Standalone host-visible uniform buffer backed by a throwaway mock backend
pub fn mock_buffer(size: u64) -> Arc<Buffer> {
    let backend: Arc<dyn Backend> = Arc::new(MockBackend::new());
    let allocator: Arc<dyn MemoryAllocator> = Arc::new(MockAllocator::new());
    let memory = MemoryAllocation { handle: MemoryHandle(1), offset: 0, size };
    let desc = BufferDesc {
        size,
        usage: BufferUsage::UNIFORM | BufferUsage::STORAGE,
        memory: MemoryUsage::CpuToGpu,
    };
    Arc::new(Buffer::new(
        BufferHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)),
        desc,
        memory,
        backend,
        allocator,
    ))
}

pub fn mock_sampler(handle: u64) -> Arc<Sampler> {
    Arc::new(Sampler {
        handle: SamplerHandle(handle),
        desc: SamplerDesc::default(),
    })
}

/// Device context over a fresh mock backend and allocator
pub fn mock_device(config: DeviceConfig) -> (Arc<MockBackend>, Arc<MockAllocator>, DeviceContext) {
    let backend = Arc::new(MockBackend::new());
    let allocator = Arc::new(MockAllocator::new());
    let device = DeviceContext::new(backend.clone(), allocator.clone(), config);
    (backend, allocator, device)
}

fn stage(stage: ShaderStage, module: u64) -> ShaderStageDesc {
    ShaderStageDesc {
        stage,
        module: ShaderModuleHandle(module),
        entry_point: "main".to_string(),
    }
}

/// Opaque single-target graphics pipeline with the given layout
pub fn graphics_pipeline(layout: PipelineLayoutDesc) -> GraphicsPipelineDesc {
    GraphicsPipelineDesc {
        shader_stages: vec![stage(ShaderStage::Vertex, 1), stage(ShaderStage::Fragment, 2)],
        vertex_layouts: Vec::new(),
        input_assembly: InputAssemblyState::default(),
        rasterization: RasterizationState::default(),
        multisample: MultisampleState::default(),
        depth_stencil: DepthStencilState::default(),
        blend: BlendState { attachments: vec![ColorBlendAttachment::opaque()] },
        layout,
    }
}

pub fn compute_pipeline(layout: PipelineLayoutDesc) -> ComputePipelineDesc {
    ComputePipelineDesc {
        shader: stage(ShaderStage::Compute, 3),
        layout,
    }
}
