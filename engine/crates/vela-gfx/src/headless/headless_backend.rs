use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use ash::vk;
use ash::vk::Handle;

use super::call::HeadlessCall;
use crate::backend::{
    AcquireOutcome, GfxBackend, GfxDescriptorBinding, GfxDescriptorWrite, GfxFramebufferDesc, GfxGraphicsPipelineDesc,
    GfxImageDesc, GfxRenderPassBegin, GfxRenderPassDesc, GfxSubmitDesc, GfxSwapchainDesc, GfxSwapchainImages,
    PresentOutcome,
};
use crate::error::{GfxError, GfxResult};

struct SwapchainState {
    image_count: u32,
    next_image: u32,
}

struct PoolState {
    max_sets: u32,
    allocated: u32,
}

/// 注入的异常情况，每个计数表示接下来的多少次调用会触发
#[derive(Default)]
struct Script {
    out_of_date_acquires: u32,
    out_of_date_presents: u32,
    suboptimal_presents: u32,
    pipeline_failures: u32,
    fence_timeouts: u32,
    begin_command_buffer_failures: u32,
    /// 覆盖所有 descriptor pool 的容量
    pool_capacity: Option<u32>,
}

#[derive(Default)]
struct HeadlessState {
    next_raw: u64,
    calls: Vec<HeadlessCall>,

    /// 尚未销毁的对象（raw handle）
    live_objects: HashSet<u64>,
    fences: HashMap<vk::Fence, bool>,
    swapchains: HashMap<vk::SwapchainKHR, SwapchainState>,
    pools: HashMap<vk::DescriptorPool, PoolState>,
    render_passes: HashMap<vk::RenderPass, GfxRenderPassDesc>,
    pipeline_caches: HashMap<vk::PipelineCache, Vec<u8>>,

    descriptor_write_count: usize,
    descriptor_update_count: usize,

    script: Script,
}

impl HeadlessState {
    /// 分配一个新的 handle，handle 单调递增
    fn new_handle<T: Handle>(&mut self) -> T {
        self.next_raw += 1;
        T::from_raw(self.next_raw)
    }

    fn new_object<T: Handle + Copy>(&mut self) -> T {
        let handle: T = self.new_handle();
        self.live_objects.insert(handle.as_raw());
        handle
    }

    fn release<T: Handle + Copy + std::fmt::Debug>(&mut self, handle: T) {
        if !self.live_objects.remove(&handle.as_raw()) {
            log::warn!("headless: destroy unknown or already destroyed object {:?}", handle);
        }
    }
}

/// 录制用的 GPU 后端
pub struct HeadlessBackend {
    state: RefCell<HeadlessState>,
    surface_capabilities: RefCell<vk::SurfaceCapabilitiesKHR>,
}

// new & init
impl HeadlessBackend {
    pub fn new(surface_extent: vk::Extent2D) -> Self {
        let surface_capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: surface_extent,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 16384,
                height: 16384,
            },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            ..Default::default()
        };

        Self {
            state: RefCell::new(HeadlessState::default()),
            surface_capabilities: RefCell::new(surface_capabilities),
        }
    }
}

// script
impl HeadlessBackend {
    /// 模拟窗口尺寸变化
    pub fn set_surface_extent(&self, extent: vk::Extent2D) {
        self.surface_capabilities.borrow_mut().current_extent = extent;
    }

    pub fn script_out_of_date_on_acquire(&self, times: u32) {
        self.state.borrow_mut().script.out_of_date_acquires = times;
    }

    pub fn script_out_of_date_on_present(&self, times: u32) {
        self.state.borrow_mut().script.out_of_date_presents = times;
    }

    pub fn script_suboptimal_on_present(&self, times: u32) {
        self.state.borrow_mut().script.suboptimal_presents = times;
    }

    pub fn script_pipeline_failures(&self, times: u32) {
        self.state.borrow_mut().script.pipeline_failures = times;
    }

    pub fn script_fence_timeouts(&self, times: u32) {
        self.state.borrow_mut().script.fence_timeouts = times;
    }

    /// begin command buffer 返回 out of host memory
    pub fn script_begin_command_buffer_failures(&self, times: u32) {
        self.state.borrow_mut().script.begin_command_buffer_failures = times;
    }

    /// 每个 descriptor pool 最多能分配多少个 set
    pub fn script_descriptor_pool_capacity(&self, capacity: Option<u32>) {
        self.state.borrow_mut().script.pool_capacity = capacity;
    }
}

// getters
impl HeadlessBackend {
    #[inline]
    pub fn calls(&self) -> Vec<HeadlessCall> {
        self.state.borrow().calls.clone()
    }

    /// 取出并清空 call log
    #[inline]
    pub fn take_calls(&self) -> Vec<HeadlessCall> {
        std::mem::take(&mut self.state.borrow_mut().calls)
    }

    pub fn count_calls(&self, pred: impl Fn(&HeadlessCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|call| pred(call)).count()
    }

    /// 写入的 binding 总数
    #[inline]
    pub fn descriptor_write_count(&self) -> usize {
        self.state.borrow().descriptor_write_count
    }

    /// update descriptor set 的调用次数
    #[inline]
    pub fn descriptor_update_count(&self) -> usize {
        self.state.borrow().descriptor_update_count
    }

    /// 创建之后还没有销毁的对象数量
    #[inline]
    pub fn live_object_count(&self) -> usize {
        self.state.borrow().live_objects.len()
    }

    pub fn render_pass_desc(&self, render_pass: vk::RenderPass) -> Option<GfxRenderPassDesc> {
        self.state.borrow().render_passes.get(&render_pass).cloned()
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> Option<bool> {
        self.state.borrow().fences.get(&fence).copied()
    }
}

impl GfxBackend for HeadlessBackend {
    fn surface_capabilities(&self) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        Ok(*self.surface_capabilities.borrow())
    }

    fn create_swapchain(&self, desc: &GfxSwapchainDesc) -> GfxResult<GfxSwapchainImages> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(GfxError::Surface(format!(
                "swapchain extent {}x{} is empty",
                desc.extent.width, desc.extent.height
            )));
        }

        let mut state = self.state.borrow_mut();
        let swapchain: vk::SwapchainKHR = state.new_object();
        let images: Vec<vk::Image> = (0..desc.min_image_count).map(|_| state.new_handle()).collect();
        state.swapchains.insert(
            swapchain,
            SwapchainState {
                image_count: desc.min_image_count,
                next_image: 0,
            },
        );
        state.calls.push(HeadlessCall::CreateSwapchain {
            swapchain,
            old_swapchain: desc.old_swapchain,
            extent: desc.extent,
            image_count: desc.min_image_count,
        });
        Ok(GfxSwapchainImages { swapchain, images })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.borrow_mut();
        state.swapchains.remove(&swapchain);
        state.release(swapchain);
        state.calls.push(HeadlessCall::DestroySwapchain(swapchain));
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        _timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome> {
        let mut state = self.state.borrow_mut();
        if state.script.out_of_date_acquires > 0 {
            state.script.out_of_date_acquires -= 1;
            state.calls.push(HeadlessCall::AcquireNextImage {
                semaphore,
                image_index: None,
            });
            return Ok(AcquireOutcome::OutOfDate);
        }

        let chain = state
            .swapchains
            .get_mut(&swapchain)
            .ok_or_else(|| GfxError::Headless(format!("acquire from unknown swapchain {:?}", swapchain)))?;
        let image_index = chain.next_image;
        chain.next_image = (chain.next_image + 1) % chain.image_count;

        state.calls.push(HeadlessCall::AcquireNextImage {
            semaphore,
            image_index: Some(image_index),
        });
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn queue_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> GfxResult<PresentOutcome> {
        let mut state = self.state.borrow_mut();
        state.calls.push(HeadlessCall::QueuePresent {
            image_index,
            wait_semaphore,
        });

        let script = &mut state.script;
        if script.out_of_date_presents > 0 {
            script.out_of_date_presents -= 1;
            Ok(PresentOutcome::OutOfDate)
        } else if script.suboptimal_presents > 0 {
            script.suboptimal_presents -= 1;
            Ok(PresentOutcome::Suboptimal)
        } else {
            Ok(PresentOutcome::Optimal)
        }
    }

    fn create_image(&self, _desc: &GfxImageDesc) -> GfxResult<vk::Image> {
        Ok(self.state.borrow_mut().new_object())
    }

    fn destroy_image(&self, image: vk::Image) {
        self.state.borrow_mut().release(image);
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
        _debug_name: &str,
    ) -> GfxResult<vk::ImageView> {
        Ok(self.state.borrow_mut().new_object())
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.borrow_mut().release(view);
    }

    fn create_fence(&self, signaled: bool, _debug_name: &str) -> GfxResult<vk::Fence> {
        let mut state = self.state.borrow_mut();
        let fence = state.new_object();
        state.fences.insert(fence, signaled);
        Ok(fence)
    }

    fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        let was_signaled = state.fences.get(&fence).copied().unwrap_or(false);
        state.calls.push(HeadlessCall::WaitFence { fence, was_signaled });

        if state.script.fence_timeouts > 0 {
            state.script.fence_timeouts -= 1;
            return Err(GfxError::FenceTimeout { timeout_ns });
        }
        // 没有被提交过的 fence 永远不会 signal
        if !was_signaled {
            return Err(GfxError::FenceTimeout { timeout_ns });
        }
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        match state.fences.get_mut(&fence) {
            Some(signaled) => *signaled = false,
            None => return Err(GfxError::Headless(format!("reset unknown fence {:?}", fence))),
        }
        state.calls.push(HeadlessCall::ResetFence(fence));
        Ok(())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.borrow_mut();
        state.fences.remove(&fence);
        state.release(fence);
    }

    fn create_semaphore(&self, _debug_name: &str) -> GfxResult<vk::Semaphore> {
        Ok(self.state.borrow_mut().new_object())
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.borrow_mut().release(semaphore);
    }

    fn device_wait_idle(&self) -> GfxResult<()> {
        self.state.borrow_mut().calls.push(HeadlessCall::DeviceWaitIdle);
        Ok(())
    }

    fn create_command_pool(&self, _debug_name: &str) -> GfxResult<vk::CommandPool> {
        Ok(self.state.borrow_mut().new_object())
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state.borrow_mut().release(pool);
    }

    fn allocate_command_buffer(&self, _pool: vk::CommandPool, _debug_name: &str) -> GfxResult<vk::CommandBuffer> {
        // command buffer 随 pool 一起释放，不计入 live objects
        Ok(self.state.borrow_mut().new_handle())
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        self.state.borrow_mut().calls.push(HeadlessCall::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        if state.script.begin_command_buffer_failures > 0 {
            state.script.begin_command_buffer_failures -= 1;
            return Err(GfxError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
        }
        state.calls.push(HeadlessCall::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        self.state.borrow_mut().calls.push(HeadlessCall::EndCommandBuffer(cmd));
        Ok(())
    }

    fn queue_submit(&self, submit: &GfxSubmitDesc) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        // 提交的工作立即完成
        if submit.fence != vk::Fence::null() {
            match state.fences.get_mut(&submit.fence) {
                Some(signaled) => *signaled = true,
                None => return Err(GfxError::Headless(format!("submit with unknown fence {:?}", submit.fence))),
            }
        }
        state.calls.push(HeadlessCall::QueueSubmit {
            command_buffer: submit.command_buffer,
            wait_semaphore: submit.wait_semaphore,
            signal_semaphore: submit.signal_semaphore,
            fence: submit.fence,
        });
        Ok(())
    }

    fn create_render_pass(&self, desc: &GfxRenderPassDesc, _debug_name: &str) -> GfxResult<vk::RenderPass> {
        let mut state = self.state.borrow_mut();
        let render_pass = state.new_object();
        state.render_passes.insert(render_pass, desc.clone());
        state.calls.push(HeadlessCall::CreateRenderPass(render_pass));
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        let mut state = self.state.borrow_mut();
        state.render_passes.remove(&render_pass);
        state.release(render_pass);
        state.calls.push(HeadlessCall::DestroyRenderPass(render_pass));
    }

    fn create_framebuffer(&self, desc: &GfxFramebufferDesc) -> GfxResult<vk::Framebuffer> {
        let mut state = self.state.borrow_mut();
        let framebuffer = state.new_object();
        state.calls.push(HeadlessCall::CreateFramebuffer {
            framebuffer,
            render_pass: desc.render_pass,
            attachments: desc.attachments.clone(),
        });
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut state = self.state.borrow_mut();
        state.release(framebuffer);
        state.calls.push(HeadlessCall::DestroyFramebuffer(framebuffer));
    }

    fn create_descriptor_set_layout(&self, _bindings: &[GfxDescriptorBinding]) -> GfxResult<vk::DescriptorSetLayout> {
        Ok(self.state.borrow_mut().new_object())
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state.borrow_mut().release(layout);
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
        _push_constant_ranges: &[vk::PushConstantRange],
    ) -> GfxResult<vk::PipelineLayout> {
        Ok(self.state.borrow_mut().new_object())
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state.borrow_mut().release(layout);
    }

    fn create_graphics_pipeline(&self, desc: &GfxGraphicsPipelineDesc<'_>) -> GfxResult<vk::Pipeline> {
        let mut state = self.state.borrow_mut();
        if state.script.pipeline_failures > 0 {
            state.script.pipeline_failures -= 1;
            return Err(GfxError::PipelineNotProduced {
                name: desc.name.to_string(),
            });
        }

        let pipeline = state.new_object();
        state.calls.push(HeadlessCall::CreateGraphicsPipeline {
            pipeline,
            render_pass: desc.render_pass,
            subpass: desc.subpass,
        });
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let mut state = self.state.borrow_mut();
        state.release(pipeline);
        state.calls.push(HeadlessCall::DestroyPipeline(pipeline));
    }

    fn create_pipeline_cache(&self, initial_data: &[u8]) -> GfxResult<vk::PipelineCache> {
        let mut state = self.state.borrow_mut();
        let cache = state.new_object();
        state.pipeline_caches.insert(cache, initial_data.to_vec());
        Ok(cache)
    }

    fn pipeline_cache_data(&self, cache: vk::PipelineCache) -> GfxResult<Vec<u8>> {
        self.state
            .borrow()
            .pipeline_caches
            .get(&cache)
            .cloned()
            .ok_or_else(|| GfxError::Headless(format!("unknown pipeline cache {:?}", cache)))
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        let mut state = self.state.borrow_mut();
        state.pipeline_caches.remove(&cache);
        state.release(cache);
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        _pool_sizes: &[vk::DescriptorPoolSize],
    ) -> GfxResult<vk::DescriptorPool> {
        let mut state = self.state.borrow_mut();
        let pool = state.new_object();
        state.pools.insert(pool, PoolState { max_sets, allocated: 0 });
        Ok(pool)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        match state.pools.get_mut(&pool) {
            Some(pool_state) => pool_state.allocated = 0,
            None => return Err(GfxError::Headless(format!("reset unknown descriptor pool {:?}", pool))),
        }
        state.calls.push(HeadlessCall::ResetDescriptorPool(pool));
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.borrow_mut();
        state.pools.remove(&pool);
        state.release(pool);
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet> {
        let mut state = self.state.borrow_mut();
        let capacity_override = state.script.pool_capacity;
        let pool_state = state
            .pools
            .get_mut(&pool)
            .ok_or_else(|| GfxError::Headless(format!("allocate from unknown descriptor pool {:?}", pool)))?;

        let capacity = capacity_override.unwrap_or(pool_state.max_sets);
        if pool_state.allocated >= capacity {
            return Err(GfxError::OutOfPoolMemory);
        }
        pool_state.allocated += 1;

        let set = state.new_handle();
        state.calls.push(HeadlessCall::AllocateDescriptorSet { pool, set });
        Ok(set)
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[GfxDescriptorWrite]) {
        let mut state = self.state.borrow_mut();
        state.descriptor_write_count += writes.len();
        state.descriptor_update_count += 1;
        state.calls.push(HeadlessCall::UpdateDescriptorSet {
            set,
            write_count: writes.len(),
        });
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &GfxRenderPassBegin) {
        self.state.borrow_mut().calls.push(HeadlessCall::BeginRenderPass {
            cmd,
            render_pass: begin.render_pass,
            framebuffer: begin.framebuffer,
            extent: begin.extent,
        });
    }

    fn cmd_next_subpass(&self, cmd: vk::CommandBuffer) {
        self.state.borrow_mut().calls.push(HeadlessCall::NextSubpass(cmd));
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.state.borrow_mut().calls.push(HeadlessCall::EndRenderPass(cmd));
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state.borrow_mut().calls.push(HeadlessCall::SetViewport(cmd, viewport));
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state.borrow_mut().calls.push(HeadlessCall::SetScissor(cmd, scissor));
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state.borrow_mut().calls.push(HeadlessCall::BindPipeline(cmd, pipeline));
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _stages: vk::ShaderStageFlags,
        _offset: u32,
        data: &[u8],
    ) {
        self.state.borrow_mut().calls.push(HeadlessCall::PushConstants { cmd, size: data.len() });
    }

    fn cmd_bind_descriptor_set(&self, cmd: vk::CommandBuffer, _layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        self.state.borrow_mut().calls.push(HeadlessCall::BindDescriptorSet(cmd, set));
    }

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        _first_binding: u32,
        buffers: &[vk::Buffer],
        _offsets: &[vk::DeviceSize],
    ) {
        self.state.borrow_mut().calls.push(HeadlessCall::BindVertexBuffers {
            cmd,
            buffers: buffers.to_vec(),
        });
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        _offset: vk::DeviceSize,
        _index_type: vk::IndexType,
    ) {
        self.state.borrow_mut().calls.push(HeadlessCall::BindIndexBuffer(cmd, buffer));
    }

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.state.borrow_mut().calls.push(HeadlessCall::Draw {
            cmd,
            vertex_count,
            instance_count,
        });
    }

    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.state.borrow_mut().calls.push(HeadlessCall::DrawIndexed {
            cmd,
            index_count,
            instance_count,
        });
    }
}
