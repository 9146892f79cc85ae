#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ash::vk;
use vela_gfx::headless::{HeadlessBackend, HeadlessCall};
use vela_render_graph::command_recorder::CommandRecorder;
use vela_render_graph::render_context::{GraphExecutionReport, PassFunctions, RendererContext};
use vela_render_graph::render_core::RenderCore;
use vela_render_interface::binding::PipelineBindingInfo;
use vela_render_interface::error::RenderResult;
use vela_render_interface::graph_desc::{AttachmentDesc, GraphDescription, PassDesc};
use vela_render_interface::params::RenderParams;
use vela_render_interface::pipeline_desc::PipelineDescription;
use vela_render_interface::renderer_settings::RendererSettings;
use vela_render_interface::target_desc::RenderTargets;
use vela_renderer::frame_scheduler::FrameScheduler;
use vela_renderer::renderer::GraphRenderer;
use vela_renderer::window_surface::HeadlessWindow;

pub const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 640,
    height: 480,
};

/// 一个 color attachment、一个 pass 的渲染器
pub struct TestRenderer {
    pub pipeline: PipelineDescription,
    pub binding: PipelineBindingInfo,
    pub graph: GraphDescription,
    pub targets: RenderTargets,

    pub reports: Rc<RefCell<Vec<GraphExecutionReport>>>,
    pub destroyed: Rc<Cell<bool>>,
}
impl TestRenderer {
    pub fn new() -> Self {
        Self {
            pipeline: PipelineDescription::new("triangle")
                .stage(vk::ShaderStageFlags::VERTEX, vk::ShaderModule::null(), "main")
                .stage(vk::ShaderStageFlags::FRAGMENT, vk::ShaderModule::null(), "main"),
            binding: PipelineBindingInfo::new(),
            graph: GraphDescription::new("forward")
                .attachment(AttachmentDesc::color("backbuffer"))
                .pass(PassDesc::new().color(&[0]).function("draw")),
            targets: RenderTargets::new().with_surface("backbuffer"),
            reports: Rc::new(RefCell::new(vec![])),
            destroyed: Rc::new(Cell::new(false)),
        }
    }

    pub fn with_pipeline(mut self, pipeline: PipelineDescription) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_binding(mut self, binding: PipelineBindingInfo) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_graph(mut self, graph: GraphDescription) -> Self {
        self.graph = graph;
        self
    }
}
impl GraphRenderer for TestRenderer {
    fn name(&self) -> &str {
        "test-renderer"
    }

    fn init(&mut self, core: &mut RenderCore) -> RenderResult<()> {
        core.add_pipeline(self.pipeline.clone())?;
        Ok(())
    }

    fn destroy(&mut self, _core: &mut RenderCore) {
        self.destroyed.set(true);
    }

    fn render_graph(&self) -> GraphDescription {
        self.graph.clone()
    }

    fn execute(&mut self, ctx: &mut RendererContext<'_>, params: &RenderParams) -> RenderResult<()> {
        let pipeline = self.pipeline.name.clone();
        let binding = self.binding.clone();
        let instances = params.parse_or("instances", 1u32);

        let mut functions = PassFunctions::new().add("draw", move |recorder: &mut CommandRecorder<'_>| {
            recorder.set_viewport(0.0, 0.0, 1.0, 1.0);
            recorder.set_scissor(0.0, 0.0, 1.0, 1.0);
            recorder.bind_pipeline(&pipeline, &binding)?;
            recorder.draw(&[], None, 3, instances)
        });
        let report = ctx.execute_graph(&self.targets, &self.render_graph(), &mut functions)?;
        self.reports.borrow_mut().push(report);
        Ok(())
    }
}

pub struct Harness {
    pub backend: Rc<HeadlessBackend>,
    pub window: HeadlessWindow,
    pub scheduler: FrameScheduler,
    pub reports: Rc<RefCell<Vec<GraphExecutionReport>>>,
    pub renderer_destroyed: Rc<Cell<bool>>,
}
impl Harness {
    pub fn new(renderer: TestRenderer) -> Self {
        Self::with_settings(renderer, &RendererSettings::default())
    }

    pub fn with_settings(renderer: TestRenderer, settings: &RendererSettings) -> Self {
        let backend = Rc::new(HeadlessBackend::new(EXTENT));
        let window = HeadlessWindow::new(EXTENT);
        let reports = renderer.reports.clone();
        let renderer_destroyed = renderer.destroyed.clone();
        let scheduler = FrameScheduler::new(backend.clone(), settings, &window, Box::new(renderer)).unwrap();
        Self {
            backend,
            window,
            scheduler,
            reports,
            renderer_destroyed,
        }
    }

    pub fn resize(&mut self, extent: vk::Extent2D) {
        self.backend.set_surface_extent(extent);
        self.window.resize(extent);
        self.scheduler.notify_resized(extent);
    }

    pub fn destroy(self) {
        self.scheduler.destroy();
        assert!(self.renderer_destroyed.get());
        assert_eq!(self.backend.live_object_count(), 0);
    }
}

pub fn count(calls: &[HeadlessCall], pred: impl Fn(&HeadlessCall) -> bool) -> usize {
    calls.iter().filter(|c| pred(c)).count()
}

pub fn begin_render_passes(calls: &[HeadlessCall]) -> Vec<(vk::Framebuffer, vk::Extent2D)> {
    calls
        .iter()
        .filter_map(|c| match c {
            HeadlessCall::BeginRenderPass { framebuffer, extent, .. } => Some((*framebuffer, *extent)),
            _ => None,
        })
        .collect()
}
