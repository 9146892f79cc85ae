//! 显式 GPU 接口的边界
//!
//! 帧执行核心的所有 GPU 操作都经过 [`GfxBackend`]，各个 cache 以 `Rc<dyn GfxBackend>` 的形式共享同一个后端。
//! 所有的 handle、枚举与 flags 都直接使用 `ash::vk` 的类型。

pub mod desc;

use ash::vk;

use crate::error::GfxResult;
pub use desc::*;

/// GPU 后端
///
/// 只在渲染线程上使用，不要求 `Send`/`Sync`
pub trait GfxBackend {
    // ---------- surface & swapchain ----------

    /// 实时获取 surface capabilities
    fn surface_capabilities(&self) -> GfxResult<vk::SurfaceCapabilitiesKHR>;

    fn create_swapchain(&self, desc: &GfxSwapchainDesc) -> GfxResult<GfxSwapchainImages>;

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// out of date 不视为错误，通过 [`AcquireOutcome::OutOfDate`] 返回
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome>;

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> GfxResult<PresentOutcome>;

    // ---------- image ----------

    fn create_image(&self, desc: &GfxImageDesc) -> GfxResult<vk::Image>;

    fn destroy_image(&self, image: vk::Image);

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        debug_name: &str,
    ) -> GfxResult<vk::ImageView>;

    fn destroy_image_view(&self, view: vk::ImageView);

    // ---------- sync ----------

    /// # param
    /// * signaled - 是否创建时就 signaled
    fn create_fence(&self, signaled: bool, debug_name: &str) -> GfxResult<vk::Fence>;

    /// 阻塞等待 fence，超时返回 [`crate::error::GfxError::FenceTimeout`]
    fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()>;

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()>;

    fn destroy_fence(&self, fence: vk::Fence);

    fn create_semaphore(&self, debug_name: &str) -> GfxResult<vk::Semaphore>;

    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn device_wait_idle(&self) -> GfxResult<()>;

    // ---------- command ----------

    fn create_command_pool(&self, debug_name: &str) -> GfxResult<vk::CommandPool>;

    fn destroy_command_pool(&self, pool: vk::CommandPool);

    fn allocate_command_buffer(&self, pool: vk::CommandPool, debug_name: &str) -> GfxResult<vk::CommandBuffer>;

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;

    fn queue_submit(&self, submit: &GfxSubmitDesc) -> GfxResult<()>;

    // ---------- render pass ----------

    fn create_render_pass(&self, desc: &GfxRenderPassDesc, debug_name: &str) -> GfxResult<vk::RenderPass>;

    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_framebuffer(&self, desc: &GfxFramebufferDesc) -> GfxResult<vk::Framebuffer>;

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // ---------- pipeline ----------

    fn create_descriptor_set_layout(&self, bindings: &[GfxDescriptorBinding]) -> GfxResult<vk::DescriptorSetLayout>;

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> GfxResult<vk::PipelineLayout>;

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    /// fixed-function 状态对所有 pipeline 都是同一套模板，由后端负责填充
    fn create_graphics_pipeline(&self, desc: &GfxGraphicsPipelineDesc<'_>) -> GfxResult<vk::Pipeline>;

    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_pipeline_cache(&self, initial_data: &[u8]) -> GfxResult<vk::PipelineCache>;

    fn pipeline_cache_data(&self, cache: vk::PipelineCache) -> GfxResult<Vec<u8>>;

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache);

    // ---------- descriptor ----------

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> GfxResult<vk::DescriptorPool>;

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> GfxResult<()>;

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// pool 耗尽时返回 [`crate::error::GfxError::OutOfPoolMemory`]
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet>;

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[GfxDescriptorWrite]);

    // ---------- recording ----------

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &GfxRenderPassBegin);

    fn cmd_next_subpass(&self, cmd: vk::CommandBuffer);

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );

    fn cmd_bind_descriptor_set(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, set: vk::DescriptorSet);

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
}
