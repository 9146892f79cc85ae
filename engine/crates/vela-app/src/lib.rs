pub mod headless_app;
pub mod vulkan_context;
pub mod window_app;
