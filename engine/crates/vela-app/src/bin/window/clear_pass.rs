use ash::vk;
use vela_render_graph::render_context::{PassFunctions, RendererContext};
use vela_render_graph::render_core::RenderCore;
use vela_render_interface::error::RenderResult;
use vela_render_interface::graph_desc::{AttachmentDesc, ClearValue, GraphDescription, PassDesc};
use vela_render_interface::params::RenderParams;
use vela_render_interface::target_desc::RenderTargets;
use vela_renderer::renderer::GraphRenderer;

/// 只清屏的图：一个 pass，没有 pipeline，不需要 shader
pub struct ClearRenderer {
    targets: RenderTargets,
    frames_drawn: u64,
}
impl Default for ClearRenderer {
    fn default() -> Self {
        Self {
            targets: RenderTargets::new().with_surface("backbuffer"),
            frames_drawn: 0,
        }
    }
}
impl GraphRenderer for ClearRenderer {
    fn name(&self) -> &str {
        "clear"
    }

    fn init(&mut self, _core: &mut RenderCore) -> RenderResult<()> {
        log::info!("clear renderer init.");
        Ok(())
    }

    fn destroy(&mut self, _core: &mut RenderCore) {
        log::info!("clear renderer destroyed after {} frames.", self.frames_drawn);
    }

    fn render_graph(&self) -> GraphDescription {
        GraphDescription::new("clear")
            .attachment(
                AttachmentDesc::color("backbuffer")
                    .with_clear(Some(ClearValue::Color([0.1, 0.1, 0.12, 1.0])))
                    .with_layouts(vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR),
            )
            .pass(PassDesc::new().color(&[0]))
    }

    fn execute(&mut self, ctx: &mut RendererContext<'_>, _params: &RenderParams) -> RenderResult<()> {
        let graph = self.render_graph();
        ctx.execute_graph(&self.targets, &graph, &mut PassFunctions::new())?;

        self.frames_drawn += 1;
        Ok(())
    }
}
