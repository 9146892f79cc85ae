//! 帧调度
//!
//! [`frame_scheduler::FrameScheduler`] 驱动 acquire -> record -> submit -> present，
//! 每个 in-flight slot 的同步对象由 [`frame_sync::FrameSyncSet`] 持有

pub mod frame_scheduler;
pub mod frame_sync;
pub mod renderer;
pub mod window_surface;
