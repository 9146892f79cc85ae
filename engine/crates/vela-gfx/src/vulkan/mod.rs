pub mod vulkan_backend;

pub use vulkan_backend::{VulkanBackend, VulkanBackendCreateInfo};
