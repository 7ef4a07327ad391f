/*!
# Ferrite GPU - Vulkan Backend

Vulkan implementation of the `ferrite_gpu` backend contract.

Uses ash for the Vulkan bindings and gpu-allocator for device memory. The
backend is headless: it owns one device and one graphics + compute queue and
records into offscreen render targets.

```no_run
use ferrite_gpu::ferrite::DeviceConfig;
use ferrite_gpu_backend_vulkan::{create_device_context, VulkanContextDesc};

let device = create_device_context(&VulkanContextDesc::default(), DeviceConfig::default())?;
# Ok::<(), ferrite_gpu::ferrite::Error>(())
```
*/

mod vulkan_backend;
mod vulkan_context;
pub mod vulkan_conversions;
#[cfg(feature = "vulkan-validation")]
mod vulkan_debug;
mod vulkan_memory;

pub use vulkan_backend::VulkanBackend;
pub use vulkan_context::{VulkanContext, VulkanContextDesc};
pub use vulkan_memory::VulkanMemory;

use std::sync::Arc;
use ferrite_gpu::ferrite::{DeviceConfig, DeviceContext, Result};

/// Create a Vulkan context, its backend and allocator, and wrap them in a device context
pub fn create_device_context(desc: &VulkanContextDesc, config: DeviceConfig) -> Result<DeviceContext> {
    let ctx = Arc::new(VulkanContext::new(desc)?);
    let memory = Arc::new(VulkanMemory::new(Arc::clone(&ctx))?);
    let backend = Arc::new(VulkanBackend::new(ctx)?);
    Ok(DeviceContext::new(backend, memory, config))
}
