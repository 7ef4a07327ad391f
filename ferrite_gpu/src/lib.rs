/*!
# Ferrite GPU

Mid-level GPU command abstraction over an explicit graphics backend.

Applications describe pipelines, layouts and render passes as plain values;
the core turns them into backend objects through structural caches and records
draws with automatic descriptor set management and image layout tracking.

## Architecture

- **Backend**: trait implemented by graphics APIs (Vulkan in `ferrite_gpu_backend_vulkan`)
- **DeviceContext**: owner of every per-device cache, creates resources and recorders
- **StructuralCache**: memoizing map from descriptors to backend objects
- **PooledSetAllocator**: descriptor set allocation from growable pools
- **ImageLayoutTracker**: per-subresource layout state of one recording
- **ResourceBindingTable**: bound resources with change detection
- **CommandRecorder**: thread-affine recording state machine
*/

pub mod backend;
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod device;
mod error;
pub mod log;
pub mod pipeline;
pub mod recorder;
pub mod resource;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};

// Main ferrite namespace module
pub mod ferrite {
    pub use crate::error::{Error, Result};
    pub use crate::config::{DeviceConfig, PoolReusePolicy};
    pub use crate::device::{DeviceContext, Fence};
    pub use crate::recorder::{CommandRecorder, CopyCommand, RecorderState};
    pub use crate::cache::WorkerToken;

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{DefaultLogger, Log, LogEntry, LogSeverity, Logger};
    }

    // Backend contract sub-module
    pub mod backend {
        pub use crate::backend::*;
    }

    pub mod cache {
        pub use crate::cache::*;
    }

    pub mod descriptor {
        pub use crate::descriptor::*;
    }

    pub mod pipeline {
        pub use crate::pipeline::*;
    }

    pub mod resource {
        pub use crate::resource::*;
    }

    pub mod sync {
        pub use crate::sync::*;
    }
}
