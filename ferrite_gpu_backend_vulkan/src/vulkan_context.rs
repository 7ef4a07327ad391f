/// VulkanContext - instance, device and queue shared by the backend and the allocator
///
/// Headless: no surface or swapchain extension is requested. One queue family
/// supporting both graphics and compute is selected and a single queue is used
/// for every submission.

use ash::vk;
use std::sync::{Mutex, MutexGuard};
use ferrite_gpu::ferrite::{Error, Result};
use ferrite_gpu::{ferrite_err, ferrite_error, ferrite_info};

/// Creation options of a [`VulkanContext`]
#[derive(Debug, Clone)]
pub struct VulkanContextDesc {
    pub application_name: String,
    /// Enable VK_LAYER_KHRONOS_validation and route its messages to the ferrite logger
    /// (only honored with the `vulkan-validation` feature)
    pub enable_validation: bool,
}

impl Default for VulkanContextDesc {
    fn default() -> Self {
        Self {
            application_name: "Ferrite Application".to_string(),
            enable_validation: cfg!(feature = "vulkan-validation"),
        }
    }
}

/// Shared Vulkan context
///
/// Owns the device and the instance: both are destroyed when the last `Arc`
/// holder (backend or memory allocator) is dropped.
pub struct VulkanContext {
    /// Kept alive for the lifetime of the instance
    _entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,
    pub(crate) queue_family: u32,
    /// Optional features enabled on the device (anisotropy, multi-viewport)
    pub(crate) features: vk::PhysicalDeviceFeatures,
    queue: Mutex<vk::Queue>,
    #[cfg(feature = "vulkan-validation")]
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanContext {
    pub fn new(desc: &VulkanContextDesc) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to load Vulkan library: {:?}", e))?;

            let app_name = std::ffi::CString::new(desc.application_name.as_str())
                .map_err(|_| Error::InvalidUsage("Application name contains a NUL byte".to_string()))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Ferrite")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            let validation = cfg!(feature = "vulkan-validation") && desc.enable_validation;
            let mut extension_names = Vec::new();
            let mut layer_names = Vec::new();
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create Vulkan instance: {:?}", e))?;

            #[cfg(feature = "vulkan-validation")]
            let debug = if validation {
                match crate::vulkan_debug::create_messenger(&entry, &instance) {
                    Ok(debug) => Some(debug),
                    Err(err) => {
                        instance.destroy_instance(None);
                        return Err(err);
                    }
                }
            } else {
                None
            };

            let (physical_device, queue_family, supported) = match Self::pick_physical_device(&instance) {
                Ok(picked) => picked,
                Err(err) => {
                    instance.destroy_instance(None);
                    return Err(err);
                }
            };

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];
            let device_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE)
                .multi_viewport(supported.multi_viewport == vk::TRUE);
            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_features(&device_features);

            let device = match instance.create_device(physical_device, &device_create_info, None) {
                Ok(device) => device,
                Err(e) => {
                    instance.destroy_instance(None);
                    return Err(ferrite_err!("ferrite::vulkan", "Failed to create logical device: {:?}", e));
                }
            };
            let queue = device.get_device_queue(queue_family, 0);

            let properties = instance.get_physical_device_properties(physical_device);
            ferrite_info!(
                "ferrite::vulkan",
                "Vulkan device ready: {} (queue family {})",
                properties.device_name_as_c_str().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
                queue_family
            );

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                queue_family,
                features: device_features,
                queue: Mutex::new(queue),
                #[cfg(feature = "vulkan-validation")]
                debug,
            })
        }
    }

    /// First device exposing a graphics + compute queue, discrete GPUs first
    unsafe fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32, vk::PhysicalDeviceFeatures)> {
        let mut devices = instance
            .enumerate_physical_devices()
            .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to enumerate physical devices: {:?}", e))?;
        devices.sort_by_key(|&device| {
            let kind = instance.get_physical_device_properties(device).device_type;
            (kind != vk::PhysicalDeviceType::DISCRETE_GPU) as u8
        });

        for device in devices {
            let family = instance
                .get_physical_device_queue_family_properties(device)
                .iter()
                .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE));
            if let Some(family) = family {
                let features = instance.get_physical_device_features(device);
                return Ok((device, family as u32, features));
            }
        }

        ferrite_error!("ferrite::vulkan", "No Vulkan device with a graphics + compute queue found");
        Err(Error::BackendFailure("No Vulkan device with a graphics + compute queue found".to_string()))
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Exclusive access to the queue (vkQueueSubmit requires external synchronization)
    pub(crate) fn queue(&self) -> Result<MutexGuard<'_, vk::Queue>> {
        self.queue
            .lock()
            .map_err(|_| Error::BackendFailure("queue lock poisoned".to_string()))
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);

            #[cfg(feature = "vulkan-validation")]
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}
