use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;

use ash::vk;
use itertools::Itertools;
use vk_mem::Alloc;

use crate::backend::{
    AcquireOutcome, GfxBackend, GfxDescriptorBinding, GfxDescriptorWrite, GfxDescriptorWriteKind, GfxFramebufferDesc,
    GfxGraphicsPipelineDesc, GfxImageDesc, GfxRenderPassBegin, GfxRenderPassDesc, GfxSubmitDesc, GfxSwapchainDesc,
    GfxSwapchainImages, PresentOutcome,
};
use crate::error::{GfxError, GfxResult};

/// 创建 [`VulkanBackend`] 所需的外部对象
///
/// instance、device、surface 由窗口侧的协作者负责创建与销毁，
/// 后端只持有 device 的函数表，不负责销毁 device
pub struct VulkanBackendCreateInfo<'a> {
    pub instance: &'a ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_family_index: u32,
    pub queue: vk::Queue,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    /// 需要 instance 开启 VK_EXT_debug_utils
    pub enable_debug_names: bool,
}

/// 基于 ash 的 [`GfxBackend`] 实现
pub struct VulkanBackend {
    /// 需要在 device 之前释放
    allocator: vk_mem::Allocator,
    /// 离屏 image 的显存
    image_allocations: RefCell<HashMap<vk::Image, vk_mem::Allocation>>,

    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
    queue: vk::Queue,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,
}

// new & init
impl VulkanBackend {
    pub fn new(ci: VulkanBackendCreateInfo<'_>) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanBackend::new");

        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(ci.instance, &ci.device, ci.physical_device);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let allocator = unsafe { vk_mem::Allocator::new(vma_ci).map_err(GfxError::Allocation)? };

        let swapchain_loader = ash::khr::swapchain::Device::new(ci.instance, &ci.device);
        let debug_utils = ci.enable_debug_names.then(|| ash::ext::debug_utils::Device::new(ci.instance, &ci.device));

        log::info!("vulkan backend created, queue family: {}", ci.queue_family_index);

        Ok(Self {
            allocator,
            image_allocations: RefCell::new(HashMap::new()),
            device: ci.device,
            physical_device: ci.physical_device,
            queue_family_index: ci.queue_family_index,
            queue: ci.queue,
            surface: ci.surface,
            surface_loader: ci.surface_loader,
            swapchain_loader,
            debug_utils,
        })
    }
}

// getters
impl VulkanBackend {
    #[inline]
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }
}

// tools
impl VulkanBackend {
    fn set_debug_name<T: vk::Handle + Copy>(&self, handle: T, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let result = unsafe {
            debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            )
        };
        if let Err(e) = result {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    /// 所有 pipeline 共用的 fixed-function 模板
    ///
    /// triangle list，viewport 与 scissor 为 dynamic，CCW 为 front face
    fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            // 按照 OpenGL 的传统，将 CCW 视为 front face
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false)
    }

    fn depth_stencil_state(enable: bool) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(enable)
            .depth_write_enable(enable)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
    }
}

impl GfxBackend for VulkanBackend {
    fn surface_capabilities(&self) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        let caps = unsafe {
            self.surface_loader.get_physical_device_surface_capabilities(self.physical_device, self.surface)?
        };
        Ok(caps)
    }

    fn create_swapchain(&self, desc: &GfxSwapchainDesc) -> GfxResult<GfxSwapchainImages> {
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于 Nsight 分析
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(desc.old_swapchain);

        unsafe {
            let swapchain = self.swapchain_loader.create_swapchain(&create_info, None)?;
            self.set_debug_name(swapchain, "main");
            let images = self.swapchain_loader.get_swapchain_images(swapchain)?;
            Ok(GfxSwapchainImages { swapchain, images })
        }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome> {
        let result =
            unsafe { self.swapchain_loader.acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null()) };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> GfxResult<PresentOutcome> {
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(std::slice::from_ref(&wait_semaphore))
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&swapchain));

        match unsafe { self.swapchain_loader.queue_present(self.queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Optimal),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn create_image(&self, desc: &GfxImageDesc) -> GfxResult<vk::Image> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (image, allocation) =
            unsafe { self.allocator.create_image(&image_info, &alloc_info).map_err(GfxError::Allocation)? };
        self.set_debug_name(image, &desc.debug_name);
        self.image_allocations.borrow_mut().insert(image, allocation);
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        match self.image_allocations.borrow_mut().remove(&image) {
            Some(mut allocation) => unsafe { self.allocator.destroy_image(image, &mut allocation) },
            None => log::warn!("destroy image {:?} which is not allocated by this backend", image),
        }
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        debug_name: &str,
    ) -> GfxResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let view = unsafe { self.device.create_image_view(&info, None)? };
        self.set_debug_name(view, debug_name);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_fence(&self, signaled: bool, debug_name: &str) -> GfxResult<vk::Fence> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { self.device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None)? };
        self.set_debug_name(fence, debug_name);
        Ok(fence)
    }

    fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()> {
        match unsafe { self.device.wait_for_fences(std::slice::from_ref(&fence), true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(GfxError::FenceTimeout { timeout_ns }),
            Err(e) => Err(e.into()),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        unsafe { self.device.reset_fences(std::slice::from_ref(&fence))? };
        Ok(())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn create_semaphore(&self, debug_name: &str) -> GfxResult<vk::Semaphore> {
        let semaphore = unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)? };
        self.set_debug_name(semaphore, debug_name);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn device_wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn create_command_pool(&self, debug_name: &str) -> GfxResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { self.device.create_command_pool(&info, None)? };
        self.set_debug_name(pool, debug_name);
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool, debug_name: &str) -> GfxResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = unsafe { self.device.allocate_command_buffers(&info)? }
            .into_iter()
            .next()
            .ok_or(GfxError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY))?;
        self.set_debug_name(cmd, debug_name);
        Ok(cmd)
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::RELEASE_RESOURCES)? };
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        let info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cmd, &info)? };
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.device.end_command_buffer(cmd)? };
        Ok(())
    }

    fn queue_submit(&self, submit: &GfxSubmitDesc) -> GfxResult<()> {
        let wait_semaphores = [submit.wait_semaphore];
        let wait_stages = [submit.wait_stage];
        let signal_semaphores = [submit.signal_semaphore];
        let command_buffers = [submit.command_buffer];

        let mut submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        if submit.wait_semaphore != vk::Semaphore::null() {
            submit_info = submit_info.wait_semaphores(&wait_semaphores).wait_dst_stage_mask(&wait_stages);
        }
        if submit.signal_semaphore != vk::Semaphore::null() {
            submit_info = submit_info.signal_semaphores(&signal_semaphores);
        }

        unsafe { self.device.queue_submit(self.queue, std::slice::from_ref(&submit_info), submit.fence)? };
        Ok(())
    }

    fn create_render_pass(&self, desc: &GfxRenderPassDesc, debug_name: &str) -> GfxResult<vk::RenderPass> {
        let subpasses = desc
            .subpasses
            .iter()
            .map(|subpass| {
                let mut info = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(&subpass.input_attachments)
                    .color_attachments(&subpass.color_attachments);
                if let Some(depth) = subpass.depth_stencil_attachment.as_ref() {
                    info = info.depth_stencil_attachment(depth);
                }
                info
            })
            .collect_vec();

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&desc.attachments)
            .subpasses(&subpasses)
            .dependencies(&desc.dependencies);
        let render_pass = unsafe { self.device.create_render_pass(&info, None)? };
        self.set_debug_name(render_pass, debug_name);
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(&self, desc: &GfxFramebufferDesc) -> GfxResult<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(desc.render_pass)
            .attachments(&desc.attachments)
            .width(desc.extent.width)
            .height(desc.extent.height)
            .layers(1);
        Ok(unsafe { self.device.create_framebuffer(&info, None)? })
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_descriptor_set_layout(&self, bindings: &[GfxDescriptorBinding]) -> GfxResult<vk::DescriptorSetLayout> {
        let bindings = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect_vec();
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        Ok(unsafe { self.device.create_descriptor_set_layout(&info, None)? })
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> GfxResult<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        Ok(unsafe { self.device.create_pipeline_layout(&info, None)? })
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, desc: &GfxGraphicsPipelineDesc<'_>) -> GfxResult<vk::Pipeline> {
        let _span = tracy_client::span!("VulkanBackend::create_graphics_pipeline");

        let shader_stages = desc
            .stages
            .iter()
            .map(|stage| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(stage.entry_point.as_c_str())
            })
            .collect_vec();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(desc.vertex_bindings)
            .vertex_attribute_descriptions(desc.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        let rasterization_state = Self::rasterization_state();
        let msaa_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil_state = Self::depth_stencil_state(desc.has_depth_stencil);

        // 混合设置：需要为每个 color attachment 分别指定
        let blend_states = (0..desc.color_attachment_count)
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect_vec();
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .blend_constants([0.0, 0.0, 0.0, 0.0])
            .attachments(&blend_states);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&msaa_state)
            .color_blend_state(&color_blend_state)
            .depth_stencil_state(&depth_stencil_state)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(desc.subpass);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(desc.pipeline_cache, std::slice::from_ref(&pipeline_info), None)
                .map_err(|(_, e)| GfxError::Vulkan(e))?
        };

        let pipeline = pipelines
            .first()
            .copied()
            .filter(|pipeline| *pipeline != vk::Pipeline::null())
            .ok_or_else(|| GfxError::PipelineNotProduced {
                name: desc.name.to_string(),
            })?;
        self.set_debug_name(pipeline, desc.name);
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_pipeline_cache(&self, initial_data: &[u8]) -> GfxResult<vk::PipelineCache> {
        let info = vk::PipelineCacheCreateInfo::default().initial_data(initial_data);
        Ok(unsafe { self.device.create_pipeline_cache(&info, None)? })
    }

    fn pipeline_cache_data(&self, cache: vk::PipelineCache) -> GfxResult<Vec<u8>> {
        Ok(unsafe { self.device.get_pipeline_cache_data(cache)? })
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        unsafe { self.device.destroy_pipeline_cache(cache, None) }
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> GfxResult<vk::DescriptorPool> {
        let info = vk::DescriptorPoolCreateInfo::default().max_sets(max_sets).pool_sizes(pool_sizes);
        Ok(unsafe { self.device.create_descriptor_pool(&info, None)? })
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> GfxResult<()> {
        unsafe { self.device.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())? };
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet> {
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(std::slice::from_ref(&layout));
        match unsafe { self.device.allocate_descriptor_sets(&info) } {
            Ok(sets) => sets.into_iter().next().ok_or(GfxError::OutOfPoolMemory),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                Err(GfxError::OutOfPoolMemory)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[GfxDescriptorWrite]) {
        let writes = writes
            .iter()
            .map(|write| {
                let info = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .dst_array_element(0)
                    .descriptor_type(write.descriptor_type);
                match &write.kind {
                    GfxDescriptorWriteKind::Images(images) => info.image_info(images),
                    GfxDescriptorWriteKind::Buffers(buffers) => info.buffer_info(buffers),
                }
            })
            .collect_vec();
        unsafe { self.device.update_descriptor_sets(&writes, &[]) }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &GfxRenderPassBegin) {
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: begin.extent,
            })
            .clear_values(&begin.clear_values);
        unsafe { self.device.cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE) }
    }

    fn cmd_next_subpass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_next_subpass(cmd, vk::SubpassContents::INLINE) }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport)) }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor)) }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline) }
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe { self.device.cmd_push_constants(cmd, layout, stages, offset, data) }
    }

    fn cmd_bind_descriptor_set(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                std::slice::from_ref(&set),
                &[],
            )
        }
    }

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe { self.device.cmd_bind_vertex_buffers(cmd, first_binding, buffers, offsets) }
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe { self.device.cmd_bind_index_buffer(cmd, buffer, offset, index_type) }
    }

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe { self.device.cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance) }
    }

    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(cmd, index_count, instance_count, first_index, vertex_offset, first_instance)
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let leaked = self.image_allocations.get_mut();
        if !leaked.is_empty() {
            log::warn!("vulkan backend dropped with {} live images", leaked.len());
            for (image, mut allocation) in leaked.drain() {
                unsafe { self.allocator.destroy_image(image, &mut allocation) };
            }
        }
        log::info!("destroying vulkan backend");
    }
}
