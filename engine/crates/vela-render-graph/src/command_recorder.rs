use ash::vk;
use vela_gfx::backend::GfxBackend;
use vela_render_interface::binding::PipelineBindingInfo;
use vela_render_interface::error::{RenderError, RenderResult};

use crate::descriptor_cache::{DescriptorCache, TransientDescriptorPool};
use crate::pass_cache::SubpassInfo;
use crate::pipeline_cache::{CompiledPipeline, PipelineCache};
use crate::pipeline_slot::PipelineSlot;

#[derive(Clone, Copy, Debug)]
pub struct IndexBufferBinding {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub index_type: vk::IndexType,
}
impl IndexBufferBinding {
    #[inline]
    pub fn u32(buffer: vk::Buffer) -> Self {
        Self {
            buffer,
            offset: 0,
            index_type: vk::IndexType::UINT32,
        }
    }
}

/// 某个 subpass 中 pass function 使用的录制接口
///
/// 只在该 pass function 执行期间存在
pub struct CommandRecorder<'a> {
    device: &'a dyn GfxBackend,
    cmd: vk::CommandBuffer,

    pipelines: &'a mut PipelineCache,
    descriptors: &'a mut DescriptorCache,
    transient: &'a mut TransientDescriptorPool,

    subpass: SubpassInfo,
    /// 当前 render pass 的渲染区域
    extent: vk::Extent2D,
    frame_slot: usize,

    bound: Option<CompiledPipeline>,
}
// new & init
impl<'a> CommandRecorder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &'a dyn GfxBackend,
        cmd: vk::CommandBuffer,
        pipelines: &'a mut PipelineCache,
        descriptors: &'a mut DescriptorCache,
        transient: &'a mut TransientDescriptorPool,
        subpass: SubpassInfo,
        extent: vk::Extent2D,
        frame_slot: usize,
    ) -> Self {
        Self {
            device,
            cmd,
            pipelines,
            descriptors,
            transient,
            subpass,
            extent,
            frame_slot,
            bound: None,
        }
    }
}
// getters
impl CommandRecorder<'_> {
    #[inline]
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    #[inline]
    pub fn subpass(&self) -> &SubpassInfo {
        &self.subpass
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn frame_slot(&self) -> usize {
        self.frame_slot
    }

    #[inline]
    pub fn bound_pipeline(&self) -> Option<&CompiledPipeline> {
        self.bound.as_ref()
    }
}
// commands
impl CommandRecorder<'_> {
    /// 参数为 [0, 1] 范围内相对于渲染区域的坐标，y 轴翻转
    pub fn set_viewport(&self, x: f32, y: f32, width: f32, height: f32) {
        let w = self.extent.width as f32;
        let h = self.extent.height as f32;
        self.device.cmd_set_viewport(
            self.cmd,
            vk::Viewport {
                x: x * w,
                y: (y + height) * h,
                width: width * w,
                height: -(height * h),
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );
    }

    /// 参数为 [0, 1] 范围内相对于渲染区域的坐标
    pub fn set_scissor(&self, x: f32, y: f32, width: f32, height: f32) {
        let w = self.extent.width as f32;
        let h = self.extent.height as f32;
        self.device.cmd_set_scissor(
            self.cmd,
            vk::Rect2D {
                offset: vk::Offset2D {
                    x: (x * w).round() as i32,
                    y: (y * h).round() as i32,
                },
                extent: vk::Extent2D {
                    width: (width * w).round() as u32,
                    height: (height * h).round() as u32,
                },
            },
        );
    }

    /// 绑定当前 subpass 对应的 pipeline，并写入 push constant 与 descriptor set
    ///
    /// 重复绑定同一个 pipeline 时跳过 bind 命令，push constant 与 descriptor 仍然会重新处理
    pub fn bind_pipeline(&mut self, name: &str, info: &PipelineBindingInfo) -> RenderResult<()> {
        let pipeline = self.pipelines.get_pipeline(name, &self.subpass)?;
        self.bind_compiled(pipeline, info)
    }

    /// 通过 renderer 持有的 [`PipelineSlot`] 绑定
    ///
    /// slot 绑定的 pipeline 已经随 render pass 一起销毁时先回到 Unbound
    pub fn bind_pipeline_slot(&mut self, slot: &mut PipelineSlot, info: &PipelineBindingInfo) -> RenderResult<()> {
        if slot.pipeline().is_some_and(|pipeline| !self.pipelines.is_live(&pipeline)) {
            slot.reset();
        }

        let pipelines = &mut *self.pipelines;
        let pipeline = slot.bind(&self.subpass, |name, subpass| pipelines.get_pipeline(name, subpass))?;
        self.bind_compiled(pipeline, info)
    }

    fn bind_compiled(&mut self, pipeline: CompiledPipeline, info: &PipelineBindingInfo) -> RenderResult<()> {
        let template = self.pipelines.template(pipeline.template).ok_or_else(|| RenderError::MissingPipeline {
            pipeline: format!("{:?}", pipeline.template),
        })?;

        // descriptor 的校验先于任何命令
        let set = self.descriptors.resolve(pipeline.template, template, info, self.frame_slot, self.transient)?;

        if self.bound != Some(pipeline) {
            self.device.cmd_bind_pipeline(self.cmd, pipeline.pipeline);
            self.bound = Some(pipeline);
        }

        if !info.push_constants.is_empty() {
            let ranges = &template.desc().push_constants;
            if ranges.is_empty() {
                log::warn!(
                    "pipeline `{}` declares no push constant range, {} bytes dropped",
                    template.name(),
                    info.push_constants.len()
                );
            }
            for range in ranges {
                let begin = range.offset as usize;
                let end = (range.offset + range.size) as usize;
                let Some(bytes) = info.push_constants.get(begin..end.min(info.push_constants.len())) else {
                    continue;
                };
                if !bytes.is_empty() {
                    self.device.cmd_push_constants(self.cmd, pipeline.layout, range.stages, range.offset, bytes);
                }
            }
        }

        if let Some(set) = set {
            self.device.cmd_bind_descriptor_set(self.cmd, pipeline.layout, set);
        }
        Ok(())
    }

    /// 绘制；有 index buffer 时 `count` 为 index 数量，否则为顶点数量
    pub fn draw(
        &self,
        vertex_buffers: &[(vk::Buffer, vk::DeviceSize)],
        index_buffer: Option<IndexBufferBinding>,
        count: u32,
        instance_count: u32,
    ) -> RenderResult<()> {
        if self.bound.is_none() {
            return Err(RenderError::NoPipelineBound);
        }

        if !vertex_buffers.is_empty() {
            let (buffers, offsets): (Vec<_>, Vec<_>) = vertex_buffers.iter().copied().unzip();
            self.device.cmd_bind_vertex_buffers(self.cmd, 0, &buffers, &offsets);
        }

        match index_buffer {
            Some(index) => {
                self.device.cmd_bind_index_buffer(self.cmd, index.buffer, index.offset, index.index_type);
                self.device.cmd_draw_indexed(self.cmd, count, instance_count, 0, 0, 0);
            }
            None => self.device.cmd_draw(self.cmd, count, instance_count, 0, 0),
        }
        Ok(())
    }
}
