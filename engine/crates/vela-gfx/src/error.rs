use ash::vk;
use thiserror::Error;

/// GPU 边界上的错误
#[derive(Error, Debug)]
pub enum GfxError {
    /// 驱动返回的错误码
    #[error("vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// 显存分配失败
    #[error("allocation failed: {0}")]
    Allocation(vk::Result),

    /// descriptor pool 已经耗尽，调用者应当换一个新的 pool
    #[error("descriptor pool is out of memory")]
    OutOfPoolMemory,

    /// fence 在给定时间内没有 signal，视为致命错误
    #[error("fence wait timed out after {timeout_ns} ns")]
    FenceTimeout { timeout_ns: u64 },

    /// 驱动没有真正产出 pipeline 对象
    #[error("graphics pipeline `{name}` was not produced by the driver")]
    PipelineNotProduced { name: String },

    #[error("surface error: {0}")]
    Surface(String),

    #[error("headless backend: {0}")]
    Headless(String),
}

pub type GfxResult<T> = Result<T, GfxError>;
