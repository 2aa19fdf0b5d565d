use vulkanalia::vk;

pub const VALIDATION_ENABLED: bool = cfg!(debug_assertions);
pub const VALIDATION_LAYER: vk::ExtensionName =
    vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");

pub const DEVICE_EXTENSIONS: &[vk::ExtensionName] = &[vk::KHR_SWAPCHAIN_EXTENSION.name];

pub const APPLICATION_NAME: &[u8] = b"Textured Quad\0";
pub const ENGINE_NAME: &[u8] = b"No Engine\0";
