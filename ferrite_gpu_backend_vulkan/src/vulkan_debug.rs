/// Validation layer messages routed to the ferrite logger

use ash::vk;
use std::ffi::CStr;
use ferrite_gpu::ferrite::Result;
use ferrite_gpu::{ferrite_debug, ferrite_err, ferrite_error, ferrite_warn};

/// Create a debug messenger reporting warnings and errors
pub(crate) unsafe fn create_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
    let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback));

    let messenger = debug_utils
        .create_debug_utils_messenger(&info, None)
        .map_err(|e| ferrite_err!("ferrite::vulkan", "Failed to create debug messenger: {:?}", e))?;
    Ok((debug_utils, messenger))
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let message = if callback_data.p_message.is_null() {
        "No message".into()
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        ferrite_error!("ferrite::vulkan::validation", "{}", message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        ferrite_warn!("ferrite::vulkan::validation", "{}", message);
    } else {
        ferrite_debug!("ferrite::vulkan::validation", "{}", message);
    }
    vk::FALSE
}
