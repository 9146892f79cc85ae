//! 帧执行核心中与 graph 相关的部分
//!
//! - [`target_cache::TargetCache`]：具名 target 到具体 image 的解析
//! - [`pass_cache::RenderPassCache`]：graph 编译出的 render pass 与 framebuffer
//! - [`pipeline_cache::PipelineCache`]：pipeline 模板与按 (name, render pass, subpass) 编译的 pipeline
//! - [`descriptor_cache::DescriptorCache`]：tagged/untagged 的 descriptor set
//! - [`command_recorder::CommandRecorder`]：暴露给渲染器 pass 函数的录制接口
//! - [`pipeline_slot::PipelineSlot`]：首次使用时绑定 subpass 的 pipeline 句柄
//! - [`render_core::RenderCore`]：surface 与上述缓存的所有者，负责 invalidate
//! - [`render_context::RendererContext`]：`execute_graph` 入口

pub mod command_recorder;
pub mod descriptor_cache;
pub mod pass_cache;
pub mod pipeline_cache;
pub mod pipeline_slot;
pub mod render_context;
pub mod render_core;
pub mod target_cache;

#[cfg(test)]
pub(crate) mod test_utils;
