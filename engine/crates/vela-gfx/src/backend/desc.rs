use std::ffi::CString;

use ash::vk;

/// swapchain 的创建参数
#[derive(Clone, Copy, Debug)]
pub struct GfxSwapchainDesc {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// 重建时传入旧的 swapchain 作为 hint；首次创建时为 null
    pub old_swapchain: vk::SwapchainKHR,
}

pub struct GfxSwapchainImages {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// surface 已经过时，需要 invalidation
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// 非 Optimal 的结果都需要重建 swapchain
    #[inline]
    pub fn needs_recreate(&self) -> bool {
        !matches!(self, PresentOutcome::Optimal)
    }
}

/// 2D 离屏 image，单 mip、单 layer
#[derive(Clone, Debug)]
pub struct GfxImageDesc {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub debug_name: String,
}

#[derive(Clone, Copy, Debug)]
pub struct GfxSubmitDesc {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

#[derive(Clone, Debug, Default)]
pub struct GfxSubpassDesc {
    pub input_attachments: Vec<vk::AttachmentReference>,
    pub color_attachments: Vec<vk::AttachmentReference>,
    pub depth_stencil_attachment: Option<vk::AttachmentReference>,
}

#[derive(Clone, Debug, Default)]
pub struct GfxRenderPassDesc {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpasses: Vec<GfxSubpassDesc>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

#[derive(Clone, Debug)]
pub struct GfxFramebufferDesc {
    pub render_pass: vk::RenderPass,
    pub attachments: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
}

#[derive(Clone, Copy, Debug)]
pub struct GfxDescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

#[derive(Clone, Debug)]
pub struct GfxShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
    pub entry_point: CString,
}

pub struct GfxGraphicsPipelineDesc<'a> {
    pub name: &'a str,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    /// 决定 color blend attachment 的数量
    pub color_attachment_count: u32,
    pub has_depth_stencil: bool,
    pub stages: &'a [GfxShaderStage],
    pub vertex_bindings: &'a [vk::VertexInputBindingDescription],
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    pub pipeline_cache: vk::PipelineCache,
}

#[derive(Clone, Debug)]
pub enum GfxDescriptorWriteKind {
    Images(Vec<vk::DescriptorImageInfo>),
    Buffers(Vec<vk::DescriptorBufferInfo>),
}

#[derive(Clone, Debug)]
pub struct GfxDescriptorWrite {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub kind: GfxDescriptorWriteKind,
}

/// vk::ClearValue 是 union，没有 Debug
#[derive(Clone)]
pub struct GfxRenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_values: Vec<vk::ClearValue>,
}
