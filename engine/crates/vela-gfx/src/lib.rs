//! 帧执行核心使用的 GPU 边界
//!
//! - [`backend::GfxBackend`]：显式 GPU 接口的抽象（device queue、command buffer、fence/semaphore、render pass）
//! - [`vulkan::VulkanBackend`]：基于 ash 的实现
//! - [`headless::HeadlessBackend`]：不需要 GPU 的录制实现，用于测试和 headless 运行
//! - [`swapchain::presentable_surface::PresentableSurface`]：可呈现图像链

pub mod backend;
pub mod error;
pub mod format;
pub mod headless;
pub mod swapchain;
pub mod vulkan;
