use vela_render_graph::render_context::RendererContext;
use vela_render_graph::render_core::RenderCore;
use vela_render_interface::error::RenderResult;
use vela_render_interface::graph_desc::GraphDescription;
use vela_render_interface::params::RenderParams;

/// 由帧调度器驱动的渲染器
///
/// 每帧调用一次 [`GraphRenderer::execute`]，渲染器在其中调用
/// [`RendererContext::execute_graph`] 提交自己的 graph 与 pass 函数
pub trait GraphRenderer {
    fn name(&self) -> &str;

    /// 注册 pipeline 等只需要创建一次的对象
    fn init(&mut self, core: &mut RenderCore) -> RenderResult<()>;

    fn destroy(&mut self, core: &mut RenderCore);

    fn render_graph(&self) -> GraphDescription;

    fn execute(&mut self, ctx: &mut RendererContext<'_>, params: &RenderParams) -> RenderResult<()>;
}
