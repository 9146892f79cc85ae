use ash::vk;

/// [`super::HeadlessBackend`] 记录的调用
///
/// 只记录对帧执行顺序有意义的调用；fence/semaphore/view 等对象的创建只计数，不记录
#[derive(Clone, Debug)]
pub enum HeadlessCall {
    CreateSwapchain {
        swapchain: vk::SwapchainKHR,
        old_swapchain: vk::SwapchainKHR,
        extent: vk::Extent2D,
        image_count: u32,
    },
    DestroySwapchain(vk::SwapchainKHR),
    AcquireNextImage {
        semaphore: vk::Semaphore,
        /// None 表示 out of date
        image_index: Option<u32>,
    },
    QueuePresent {
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    },

    WaitFence {
        fence: vk::Fence,
        /// 等待时 fence 是否已经 signaled
        was_signaled: bool,
    },
    ResetFence(vk::Fence),
    DeviceWaitIdle,

    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    QueueSubmit {
        command_buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
    },

    CreateRenderPass(vk::RenderPass),
    DestroyRenderPass(vk::RenderPass),
    CreateFramebuffer {
        framebuffer: vk::Framebuffer,
        render_pass: vk::RenderPass,
        attachments: Vec<vk::ImageView>,
    },
    DestroyFramebuffer(vk::Framebuffer),
    CreateGraphicsPipeline {
        pipeline: vk::Pipeline,
        render_pass: vk::RenderPass,
        subpass: u32,
    },
    DestroyPipeline(vk::Pipeline),

    AllocateDescriptorSet {
        pool: vk::DescriptorPool,
        set: vk::DescriptorSet,
    },
    ResetDescriptorPool(vk::DescriptorPool),
    UpdateDescriptorSet {
        set: vk::DescriptorSet,
        write_count: usize,
    },

    BeginRenderPass {
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    },
    NextSubpass(vk::CommandBuffer),
    EndRenderPass(vk::CommandBuffer),
    SetViewport(vk::CommandBuffer, vk::Viewport),
    SetScissor(vk::CommandBuffer, vk::Rect2D),
    BindPipeline(vk::CommandBuffer, vk::Pipeline),
    PushConstants {
        cmd: vk::CommandBuffer,
        size: usize,
    },
    BindDescriptorSet(vk::CommandBuffer, vk::DescriptorSet),
    BindVertexBuffers {
        cmd: vk::CommandBuffer,
        buffers: Vec<vk::Buffer>,
    },
    BindIndexBuffer(vk::CommandBuffer, vk::Buffer),
    Draw {
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
    },
}
