use ash::vk;
use bytemuck::{Pod, Zeroable};
use vela_render_graph::command_recorder::CommandRecorder;
use vela_render_graph::render_context::{PassFunctions, RendererContext};
use vela_render_graph::render_core::RenderCore;
use vela_render_interface::binding::PipelineBindingInfo;
use vela_render_interface::error::RenderResult;
use vela_render_interface::graph_desc::{AttachmentDesc, ClearValue, GraphDescription, PassDesc};
use vela_render_interface::params::RenderParams;
use vela_render_interface::pipeline_desc::{PipelineDescription, VertexAttribute};
use vela_render_interface::target_desc::{RenderTargets, TargetDescription, TargetUsage};
use vela_renderer::renderer::GraphRenderer;

const PIPELINE_NAME: &str = "hello-triangle";

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct TrianglePushConstant {
    tint: glam::Vec4,
    rotation: f32,
    _padding: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct TriangleVertex {
    pos: glam::Vec3,
    color: glam::Vec4,
}

pub struct TriangleRenderer {
    targets: RenderTargets,
    frames_drawn: u64,
}
impl Default for TriangleRenderer {
    fn default() -> Self {
        Self {
            targets: RenderTargets::new()
                .with_surface("backbuffer")
                .with("depth", TargetDescription::image(TargetUsage::DEPTH_STENCIL)),
            frames_drawn: 0,
        }
    }
}
impl TriangleRenderer {
    fn pipeline_desc() -> PipelineDescription {
        let stride = size_of::<TriangleVertex>() as u32;
        PipelineDescription::new(PIPELINE_NAME)
            // headless 后端不需要真正的 shader module
            .stage(vk::ShaderStageFlags::VERTEX, vk::ShaderModule::null(), "vsmain")
            .stage(vk::ShaderStageFlags::FRAGMENT, vk::ShaderModule::null(), "psmain")
            .vertex_binding(0, stride, vk::VertexInputRate::VERTEX)
            .vertex_attribute(VertexAttribute::new(0, 0, vk::Format::R32G32B32_SFLOAT, 0))
            .vertex_attribute(VertexAttribute::new(1, 0, vk::Format::R32G32B32A32_SFLOAT, 12))
            .push_constant(
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                size_of::<TrianglePushConstant>() as u32,
            )
    }
}
impl GraphRenderer for TriangleRenderer {
    fn name(&self) -> &str {
        "hello-triangle"
    }

    fn init(&mut self, core: &mut RenderCore) -> RenderResult<()> {
        log::info!("hello triangle init.");
        core.add_pipeline(Self::pipeline_desc())?;
        Ok(())
    }

    fn destroy(&mut self, _core: &mut RenderCore) {
        log::info!("hello triangle destroyed after {} frames.", self.frames_drawn);
    }

    fn render_graph(&self) -> GraphDescription {
        GraphDescription::new("hello-triangle")
            .attachment(
                AttachmentDesc::color("backbuffer")
                    .with_clear(Some(ClearValue::Color([0.1, 0.1, 0.12, 1.0])))
                    .with_layouts(vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR),
            )
            .attachment(AttachmentDesc::depth_stencil("depth"))
            .pass(PassDesc::new().color(&[0]).depth_stencil(1).function("triangle"))
    }

    fn execute(&mut self, ctx: &mut RendererContext<'_>, params: &RenderParams) -> RenderResult<()> {
        let time = params.parse_or("time", 0.0f32);
        let push_constant = TrianglePushConstant {
            tint: glam::Vec4::new(1.0, 0.8, 0.6, 1.0),
            rotation: time,
            _padding: [0.0; 3],
        };
        let binding = PipelineBindingInfo::new().push_constants(bytemuck::bytes_of(&push_constant));

        let mut functions = PassFunctions::new().add("triangle", |recorder: &mut CommandRecorder<'_>| {
            recorder.set_viewport(0.0, 0.0, 1.0, 1.0);
            recorder.set_scissor(0.0, 0.0, 1.0, 1.0);
            recorder.bind_pipeline(PIPELINE_NAME, &binding)?;
            recorder.draw(&[(vk::Buffer::null(), 0)], None, 3, 1)
        });

        let graph = self.render_graph();
        let report = ctx.execute_graph(&self.targets, &graph, &mut functions)?;
        log::debug!(
            "[{}] graph `{}`: {} passes executed, {} failed",
            ctx.frame_label(),
            graph.name,
            report.passes_executed,
            report.passes_failed
        );

        self.frames_drawn += 1;
        Ok(())
    }
}
