/// Device context and fences

pub mod device_context;

pub use device_context::{DeviceContext, Fence};
pub(crate) use device_context::DeviceShared;
