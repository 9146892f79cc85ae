use std::collections::HashMap;

use ash::vk;
use itertools::Itertools;
use vela_gfx::backend::GfxRenderPassBegin;
use vela_render_interface::error::{RenderError, RenderResult};
use vela_render_interface::frame_counter::FrameLabel;
use vela_render_interface::graph_desc::GraphDescription;
use vela_render_interface::target_desc::RenderTargets;

use crate::command_recorder::CommandRecorder;
use crate::descriptor_cache::TransientDescriptorPool;
use crate::render_core::RenderCore;

pub type PassFunction<'f> = Box<dyn FnMut(&mut CommandRecorder<'_>) -> RenderResult<()> + 'f>;

/// graph 中 pass 引用的具名函数
#[derive(Default)]
pub struct PassFunctions<'f> {
    functions: HashMap<String, PassFunction<'f>>,
}
impl<'f> PassFunctions<'f> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        mut self,
        name: impl Into<String>,
        function: impl FnMut(&mut CommandRecorder<'_>) -> RenderResult<()> + 'f,
    ) -> Self {
        self.insert(name, function);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        function: impl FnMut(&mut CommandRecorder<'_>) -> RenderResult<()> + 'f,
    ) {
        let name = name.into();
        if self.functions.insert(name.clone(), Box::new(function)).is_some() {
            log::warn!("pass function `{}` registered twice, keep the latest", name);
        }
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    #[inline]
    fn get_mut(&mut self, name: &str) -> Option<&mut PassFunction<'f>> {
        self.functions.get_mut(name)
    }
}

/// 一次 graph 执行的结果
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphExecutionReport {
    /// 函数执行成功的 pass 数量
    pub passes_executed: usize,
    /// 函数缺失或者返回错误、被跳过的 pass 数量
    pub passes_failed: usize,
}

/// renderer 在一帧中看到的上下文
///
/// 命令录制到当前 frame slot 的 command buffer 中
pub struct RendererContext<'a> {
    core: &'a mut RenderCore,
    transient: &'a mut TransientDescriptorPool,

    cmd: vk::CommandBuffer,
    image_index: u32,
    frame_label: FrameLabel,
}
// new & init
impl<'a> RendererContext<'a> {
    pub fn new(
        core: &'a mut RenderCore,
        transient: &'a mut TransientDescriptorPool,
        cmd: vk::CommandBuffer,
        image_index: u32,
        frame_label: FrameLabel,
    ) -> Self {
        Self {
            core,
            transient,
            cmd,
            image_index,
            frame_label,
        }
    }
}
// getters
impl RendererContext<'_> {
    #[inline]
    pub fn core(&self) -> &RenderCore {
        self.core
    }

    #[inline]
    pub fn core_mut(&mut self) -> &mut RenderCore {
        self.core
    }

    #[inline]
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    #[inline]
    pub fn frame_label(&self) -> FrameLabel {
        self.frame_label
    }

    #[inline]
    pub fn surface_extent(&self) -> vk::Extent2D {
        self.core.surface.extent()
    }
}
// update
impl RendererContext<'_> {
    /// 执行一个 graph：编译（或复用）render pass 与 framebuffer，依次执行每个 pass 的函数
    ///
    /// pass 函数的失败只影响该 pass：记录错误后跳过，其余 pass 与本帧照常完成。
    /// render pass 与 framebuffer 的失败会直接返回
    pub fn execute_graph(
        &mut self,
        targets: &RenderTargets,
        graph: &GraphDescription,
        functions: &mut PassFunctions<'_>,
    ) -> RenderResult<GraphExecutionReport> {
        let _span = tracy_client::span!("RendererContext::execute_graph");
        let core = &mut *self.core;

        let render_pass = core.passes.get_or_compile(graph, targets, &mut core.targets, &core.surface)?;
        let (framebuffer, extent) =
            core.passes.framebuffer(&graph.name, self.image_index, &core.targets, &core.surface)?;

        // graph 内容以编译时缓存的为准
        let compiled = core.passes.compiled(&graph.name).ok_or_else(|| RenderError::MissingGraph {
            graph: graph.name.clone(),
        })?;
        let clear_values = compiled.graph().clear_values();
        let subpasses = (0..compiled.graph().passes.len())
            .filter_map(|index| {
                let function = compiled.graph().passes[index].function.clone();
                compiled.subpass_info(index).map(|info| (info, function))
            })
            .collect_vec();

        core.device.cmd_begin_render_pass(
            self.cmd,
            &GfxRenderPassBegin {
                render_pass,
                framebuffer,
                extent,
                clear_values,
            },
        );

        let mut report = GraphExecutionReport::default();
        for (index, (subpass, function_name)) in subpasses.into_iter().enumerate() {
            if index > 0 {
                core.device.cmd_next_subpass(self.cmd);
            }

            // 没有函数的 pass 只执行 load/store
            let Some(function_name) = function_name else {
                continue;
            };
            let Some(function) = functions.get_mut(&function_name) else {
                log::error!(
                    "graph `{}` pass {}: function `{}` is not registered, pass skipped",
                    graph.name,
                    index,
                    function_name
                );
                report.passes_failed += 1;
                continue;
            };

            let mut recorder = CommandRecorder::new(
                core.device.as_ref(),
                self.cmd,
                &mut core.pipelines,
                &mut core.descriptors,
                self.transient,
                subpass,
                extent,
                *self.frame_label,
            );
            match function(&mut recorder) {
                Ok(()) => report.passes_executed += 1,
                Err(e) => {
                    log::error!(
                        "graph `{}` pass {}: function `{}` failed, pass skipped: {}",
                        graph.name,
                        index,
                        function_name,
                        e
                    );
                    report.passes_failed += 1;
                }
            }
        }

        core.device.cmd_end_render_pass(self.cmd);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_EXTENT;
    use std::rc::Rc;
    use vela_gfx::backend::GfxBackend;
    use vela_gfx::headless::{HeadlessBackend, HeadlessCall};
    use vela_render_interface::graph_desc::{AttachmentDesc, PassDesc};
    use vela_render_interface::pipeline_desc::PipelineDescription;
    use vela_render_interface::renderer_settings::RendererSettings;
    use vela_render_interface::target_desc::{TargetDescription, TargetUsage};

    struct Fixture {
        backend: Rc<HeadlessBackend>,
        core: RenderCore,
        transient: TransientDescriptorPool,
        cmd: vk::CommandBuffer,
    }
    impl Fixture {
        fn new() -> Self {
            let backend = Rc::new(HeadlessBackend::new(TEST_EXTENT));
            let mut core = RenderCore::new(backend.clone(), &RendererSettings::default(), TEST_EXTENT).unwrap();
            core.add_pipeline(PipelineDescription::new("flat")).unwrap();
            let pool = backend.create_command_pool("test").unwrap();
            let cmd = backend.allocate_command_buffer(pool, "test").unwrap();
            backend.destroy_command_pool(pool);

            Self {
                transient: TransientDescriptorPool::new(backend.clone(), 8),
                core,
                cmd,
                backend,
            }
        }

        fn context(&mut self, image_index: u32) -> RendererContext<'_> {
            RendererContext::new(
                &mut self.core,
                &mut self.transient,
                self.cmd,
                image_index,
                FrameLabel::from_usize(0),
            )
        }

        fn destroy(self) {
            self.transient.destroy();
            self.core.destroy();
            assert_eq!(self.backend.live_object_count(), 0);
        }
    }

    fn targets() -> RenderTargets {
        RenderTargets::new()
            .with_surface("backbuffer")
            .with("gbuffer", TargetDescription::image(TargetUsage::COLOR | TargetUsage::INPUT))
    }

    fn two_pass_graph() -> GraphDescription {
        GraphDescription::new("deferred")
            .attachment(AttachmentDesc::color("gbuffer"))
            .attachment(AttachmentDesc::color("backbuffer"))
            .pass(PassDesc::new().color(&[0]).function("geometry"))
            .pass(PassDesc::new().input(&[0]).color(&[1]).depends_on(&[0]).function("lighting"))
    }

    #[test]
    fn test_passes_run_in_order() {
        let mut f = Fixture::new();
        f.backend.take_calls();
        let order = std::cell::RefCell::new(vec![]);

        let mut functions = PassFunctions::new()
            .add("geometry", |recorder: &mut CommandRecorder<'_>| {
                order.borrow_mut().push(("geometry", recorder.subpass().subpass));
                recorder.bind_pipeline("flat", &Default::default())?;
                recorder.draw(&[], None, 3, 1)
            })
            .add("lighting", |recorder: &mut CommandRecorder<'_>| {
                order.borrow_mut().push(("lighting", recorder.subpass().subpass));
                Ok(())
            });

        let report = f.context(0).execute_graph(&targets(), &two_pass_graph(), &mut functions).unwrap();
        assert_eq!(report, GraphExecutionReport {
            passes_executed: 2,
            passes_failed: 0
        });
        drop(functions);
        assert_eq!(order.into_inner(), vec![("geometry", 0), ("lighting", 1)]);

        let calls = f.backend.take_calls();
        let begin = calls.iter().position(|c| matches!(c, HeadlessCall::BeginRenderPass { .. })).unwrap();
        let next = calls.iter().position(|c| matches!(c, HeadlessCall::NextSubpass(_))).unwrap();
        let end = calls.iter().position(|c| matches!(c, HeadlessCall::EndRenderPass(_))).unwrap();
        let draw = calls.iter().position(|c| matches!(c, HeadlessCall::Draw { .. })).unwrap();
        assert!(begin < draw && draw < next && next < end);

        f.destroy();
    }

    #[test]
    fn test_failed_pass_is_skipped() {
        let mut f = Fixture::new();
        f.backend.take_calls();

        let mut functions = PassFunctions::new().add("lighting", |recorder: &mut CommandRecorder<'_>| {
            // 没有绑定 pipeline 就绘制
            recorder.draw(&[], None, 3, 1)
        });

        // geometry 未注册，lighting 失败，帧仍然完整
        let report = f.context(0).execute_graph(&targets(), &two_pass_graph(), &mut functions).unwrap();
        assert_eq!(report.passes_executed, 0);
        assert_eq!(report.passes_failed, 2);

        let calls = f.backend.take_calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, HeadlessCall::BeginRenderPass { .. })).count(), 1);
        assert_eq!(calls.iter().filter(|c| matches!(c, HeadlessCall::EndRenderPass(_))).count(), 1);

        f.destroy();
    }

    #[test]
    fn test_framebuffer_per_image() {
        let mut f = Fixture::new();
        let graph = two_pass_graph();
        let image_count = f.core.surface().image_count() as u32;

        for image_index in 0..image_count {
            f.context(image_index).execute_graph(&targets(), &graph, &mut PassFunctions::new()).unwrap();
        }
        // 再来一轮不会创建新的对象
        for image_index in 0..image_count {
            f.context(image_index).execute_graph(&targets(), &graph, &mut PassFunctions::new()).unwrap();
        }
        assert_eq!(f.core.passes().compiled("deferred").unwrap().framebuffer_count(), image_count as usize);
        assert_eq!(f.backend.count_calls(|c| matches!(c, HeadlessCall::CreateRenderPass(_))), 1);

        f.destroy();
    }

    #[test]
    fn test_invalidation_rebuilds_framebuffer() {
        let mut f = Fixture::new();
        let graph = two_pass_graph();
        let mut functions = PassFunctions::new().add("geometry", |recorder: &mut CommandRecorder<'_>| {
            recorder.bind_pipeline("flat", &Default::default())
        });

        f.context(0).execute_graph(&targets(), &graph, &mut functions).unwrap();
        let before = f.backend.take_calls();
        let old_framebuffer = before
            .iter()
            .find_map(|c| match c {
                HeadlessCall::BeginRenderPass { framebuffer, .. } => Some(*framebuffer),
                _ => None,
            })
            .unwrap();

        let new_extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        f.backend.set_surface_extent(new_extent);
        f.core.invalidate(new_extent).unwrap();
        assert!(f.core.passes().is_empty());
        assert_eq!(f.core.pipelines().pipeline_count(), 0);

        f.context(0).execute_graph(&targets(), &graph, &mut functions).unwrap();
        let after = f.backend.take_calls();
        let (new_framebuffer, extent) = after
            .iter()
            .find_map(|c| match c {
                HeadlessCall::BeginRenderPass { framebuffer, extent, .. } => Some((*framebuffer, *extent)),
                _ => None,
            })
            .unwrap();
        assert_ne!(old_framebuffer, new_framebuffer);
        assert_eq!((extent.width, extent.height), (1024, 768));

        drop(functions);
        f.destroy();
    }
}
