use std::collections::HashMap;
use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use vela_gfx::backend::{GfxBackend, GfxFramebufferDesc, GfxRenderPassDesc, GfxSubpassDesc};
use vela_gfx::format::{has_stencil, is_depth_format};
use vela_gfx::swapchain::presentable_surface::PresentableSurface;
use vela_render_interface::error::{RenderError, RenderResult};
use vela_render_interface::graph_desc::GraphDescription;
use vela_render_interface::target_desc::RenderTargets;

use crate::target_cache::{TargetCache, TargetHandle};

/// pipeline 编译所需的 subpass 信息
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubpassInfo {
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub color_attachment_count: u32,
    pub has_depth_stencil: bool,
}

/// 一个 graph 编译后的结果
pub struct CompiledPass {
    render_pass: vk::RenderPass,
    /// 编译时使用的 graph，用于检测之后的描述是否发生变化
    graph: GraphDescription,
    /// 每个 attachment 解析得到的 target
    attachment_targets: Vec<TargetHandle>,
    /// 扁平化的 image view 列表 -> framebuffer
    framebuffers: HashMap<Vec<vk::ImageView>, vk::Framebuffer>,
    drift_warned: bool,
}
// getters
impl CompiledPass {
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn graph(&self) -> &GraphDescription {
        &self.graph
    }

    #[inline]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn subpass_info(&self, subpass: usize) -> Option<SubpassInfo> {
        self.graph.passes.get(subpass).map(|pass| SubpassInfo {
            render_pass: self.render_pass,
            subpass: subpass as u32,
            color_attachment_count: pass.color.len() as u32,
            has_depth_stencil: pass.depth_stencil.is_some(),
        })
    }
}

/// graph 名字 -> render pass + framebuffers
///
/// graph 在引擎的生命周期内被认为是稳定的：内容变化不会触发重新编译，只给出一次警告。
/// surface 重建时整体失效
pub struct RenderPassCache {
    device: Rc<dyn GfxBackend>,
    passes: HashMap<String, CompiledPass>,
    destroyed: bool,
}

// new & init
impl RenderPassCache {
    pub fn new(device: Rc<dyn GfxBackend>) -> Self {
        Self {
            device,
            passes: HashMap::new(),
            destroyed: false,
        }
    }
}

// getters
impl RenderPassCache {
    #[inline]
    pub fn compiled(&self, graph_name: &str) -> Option<&CompiledPass> {
        self.passes.get(graph_name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

// update
impl RenderPassCache {
    /// 获取 graph 对应的 render pass，不存在时编译
    pub fn get_or_compile(
        &mut self,
        graph: &GraphDescription,
        targets: &RenderTargets,
        target_cache: &mut TargetCache,
        surface: &PresentableSurface,
    ) -> RenderResult<vk::RenderPass> {
        if let Some(compiled) = self.passes.get_mut(&graph.name) {
            if !compiled.drift_warned && compiled.graph != *graph {
                log::warn!(
                    "graph `{}` differs from the compiled one, keep using the compiled render pass until invalidation",
                    graph.name
                );
                compiled.drift_warned = true;
            }
            return Ok(compiled.render_pass);
        }

        let _span = tracy_client::span!("RenderPassCache::compile");
        graph.validate()?;

        let attachment_targets = graph
            .attachments
            .iter()
            .map(|attachment| {
                let desc = targets.get(&attachment.target).ok_or_else(|| RenderError::MissingTarget {
                    target: attachment.target.clone(),
                })?;
                target_cache.resolve(&attachment.target, desc, surface)
            })
            .collect::<RenderResult<Vec<_>>>()?;

        // 显式指定的 format 优先，否则使用 target 的 format
        let formats = graph
            .attachments
            .iter()
            .zip(attachment_targets.iter())
            .map(|(attachment, handle)| {
                attachment.format.or_else(|| target_cache.get(*handle).map(|t| t.format())).ok_or_else(|| {
                    RenderError::MissingTarget {
                        target: attachment.target.clone(),
                    }
                })
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let desc = build_render_pass_desc(graph, &formats);
        let render_pass = self.device.create_render_pass(&desc, &graph.name)?;
        log::info!(
            "graph `{}` compiled: {} attachments, {} subpasses, {} dependencies",
            graph.name,
            desc.attachments.len(),
            desc.subpasses.len(),
            desc.dependencies.len()
        );

        self.passes.insert(
            graph.name.clone(),
            CompiledPass {
                render_pass,
                graph: graph.clone(),
                attachment_targets,
                framebuffers: HashMap::new(),
                drift_warned: false,
            },
        );
        Ok(render_pass)
    }

    /// 获取 image_index 对应的 framebuffer，不存在时创建
    ///
    /// 返回 framebuffer 及其尺寸
    pub fn framebuffer(
        &mut self,
        graph_name: &str,
        image_index: u32,
        target_cache: &TargetCache,
        surface: &PresentableSurface,
    ) -> RenderResult<(vk::Framebuffer, vk::Extent2D)> {
        if image_index as usize >= surface.image_count() {
            return Err(RenderError::InvalidImageIndex {
                image_index,
                image_count: surface.image_count(),
            });
        }
        let compiled = self.passes.get_mut(graph_name).ok_or_else(|| RenderError::MissingGraph {
            graph: graph_name.to_string(),
        })?;

        let views = compiled
            .attachment_targets
            .iter()
            .map(|handle| target_cache.view(*handle, image_index as usize, surface))
            .collect::<RenderResult<Vec<_>>>()?;

        // framebuffer 的尺寸不能超过任何一个 attachment
        let extent = compiled
            .attachment_targets
            .iter()
            .filter_map(|handle| target_cache.get(*handle))
            .map(|target| target.extent())
            .reduce(|a, b| vk::Extent2D {
                width: a.width.min(b.width),
                height: a.height.min(b.height),
            })
            .unwrap_or(surface.extent());

        if let Some(framebuffer) = compiled.framebuffers.get(&views) {
            return Ok((*framebuffer, extent));
        }

        let framebuffer = self.device.create_framebuffer(&GfxFramebufferDesc {
            render_pass: compiled.render_pass,
            attachments: views.clone(),
            extent,
        })?;
        log::debug!("graph `{}`: framebuffer for image {} created", graph_name, image_index);
        compiled.framebuffers.insert(views, framebuffer);
        Ok((framebuffer, extent))
    }

    /// 销毁所有的 framebuffer 与 render pass，返回被销毁的 render pass
    pub fn invalidate(&mut self) -> Vec<vk::RenderPass> {
        let passes = std::mem::take(&mut self.passes);
        passes.into_values().map(|compiled| self.destroy_compiled(compiled)).collect_vec()
    }

    fn destroy_compiled(&self, compiled: CompiledPass) -> vk::RenderPass {
        compiled.framebuffers.into_values().for_each(|fb| self.device.destroy_framebuffer(fb));
        self.device.destroy_render_pass(compiled.render_pass);
        compiled.render_pass
    }
}

// destroy
impl RenderPassCache {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    pub fn destroy_mut(&mut self) {
        self.invalidate();
        self.destroyed = true;
    }
}
impl Drop for RenderPassCache {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "RenderPassCache dropped without destroy");
    }
}

/// 将 graph 编译为 render pass 的描述，每个 pass 对应一个 subpass
///
/// - 有依赖的 pass，每条依赖边生成一个 subpass dependency
/// - 没有依赖的 pass，生成一个来自 EXTERNAL 的 dependency，保证与之前帧的内容有序
pub fn build_render_pass_desc(graph: &GraphDescription, formats: &[vk::Format]) -> GfxRenderPassDesc {
    let attachments = graph
        .attachments
        .iter()
        .zip(formats.iter())
        .map(|(attachment, &format)| {
            let (stencil_load_op, stencil_store_op) = if has_stencil(format) {
                (attachment.load_op, attachment.store_op)
            } else {
                (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE)
            };
            vk::AttachmentDescription::default()
                .format(format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(attachment.load_op)
                .store_op(attachment.store_op)
                .stencil_load_op(stencil_load_op)
                .stencil_store_op(stencil_store_op)
                .initial_layout(attachment.initial_layout)
                .final_layout(attachment.final_layout)
        })
        .collect_vec();

    let reference = |attachment: usize, layout: vk::ImageLayout| vk::AttachmentReference {
        attachment: attachment as u32,
        layout,
    };

    let subpasses = graph
        .passes
        .iter()
        .map(|pass| GfxSubpassDesc {
            input_attachments: pass
                .input
                .iter()
                .map(|&a| {
                    let layout = if formats.get(a).copied().is_some_and(is_depth_format) {
                        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
                    } else {
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                    };
                    reference(a, layout)
                })
                .collect(),
            color_attachments: pass
                .color
                .iter()
                .map(|&a| reference(a, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
                .collect(),
            depth_stencil_attachment: pass
                .depth_stencil
                .map(|a| reference(a, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)),
        })
        .collect_vec();

    let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let attachment_writes =
        vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;

    let mut dependencies = vec![];
    for (index, pass) in graph.passes.iter().enumerate() {
        if pass.dependencies.is_empty() {
            dependencies.push(
                vk::SubpassDependency::default()
                    .src_subpass(vk::SUBPASS_EXTERNAL)
                    .dst_subpass(index as u32)
                    .src_stage_mask(attachment_stages)
                    .dst_stage_mask(attachment_stages)
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(attachment_writes),
            );
            continue;
        }
        for &dependency in &pass.dependencies {
            dependencies.push(
                vk::SubpassDependency::default()
                    .src_subpass(dependency as u32)
                    .dst_subpass(index as u32)
                    .src_stage_mask(attachment_stages)
                    .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER | attachment_stages)
                    .src_access_mask(attachment_writes)
                    .dst_access_mask(
                        vk::AccessFlags::INPUT_ATTACHMENT_READ
                            | vk::AccessFlags::SHADER_READ
                            | vk::AccessFlags::COLOR_ATTACHMENT_READ
                            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                            | attachment_writes,
                    )
                    .dependency_flags(vk::DependencyFlags::BY_REGION),
            );
        }
    }

    GfxRenderPassDesc {
        attachments,
        subpasses,
        dependencies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;
    use vela_gfx::headless::HeadlessCall;
    use vela_render_interface::graph_desc::{AttachmentDesc, PassDesc};
    use vela_render_interface::target_desc::{TargetDescription, TargetUsage};

    fn forward_graph() -> GraphDescription {
        GraphDescription::new("forward")
            .attachment(
                AttachmentDesc::color("surface")
                    .with_layouts(vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR),
            )
            .pass(PassDesc::new().color(&[0]).function("draw"))
    }

    fn deferred_graph() -> GraphDescription {
        GraphDescription::new("deferred")
            .attachment(AttachmentDesc::color("surface"))
            .attachment(AttachmentDesc::color("albedo"))
            .attachment(AttachmentDesc::depth_stencil("depth").with_format(vk::Format::D24_UNORM_S8_UINT))
            .pass(PassDesc::new().color(&[1]).depth_stencil(2).function("gbuffer"))
            .pass(PassDesc::new().color(&[0]).input(&[1]).depends_on(&[0]).function("lighting"))
    }

    fn deferred_targets() -> RenderTargets {
        RenderTargets::new()
            .with_surface("surface")
            .with("albedo", TargetDescription::image(TargetUsage::COLOR | TargetUsage::INPUT))
            .with("depth", TargetDescription::image(TargetUsage::DEPTH_STENCIL))
    }

    #[test]
    fn test_implicit_external_dependency() {
        let desc = build_render_pass_desc(&forward_graph(), &[vk::Format::R8G8B8A8_SRGB]);
        assert_eq!(desc.subpasses.len(), 1);
        assert_eq!(desc.dependencies.len(), 1);
        assert_eq!(desc.dependencies[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(desc.dependencies[0].dst_subpass, 0);
        assert_eq!(desc.attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(desc.attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_dependency_per_edge() {
        let graph = deferred_graph();
        let formats = [vk::Format::R8G8B8A8_SRGB, vk::Format::R8G8B8A8_SRGB, vk::Format::D24_UNORM_S8_UINT];
        let desc = build_render_pass_desc(&graph, &formats);

        assert_eq!(desc.subpasses.len(), 2);
        assert_eq!(desc.dependencies.len(), 2);
        assert_eq!(desc.dependencies[1].src_subpass, 0);
        assert_eq!(desc.dependencies[1].dst_subpass, 1);

        let lighting = &desc.subpasses[1];
        assert_eq!(lighting.input_attachments[0].attachment, 1);
        assert_eq!(lighting.input_attachments[0].layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(desc.subpasses[0].depth_stencil_attachment.map(|r| r.attachment), Some(2));
        // 带 stencil 的格式沿用 load/store op
        assert_eq!(desc.attachments[2].stencil_load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(desc.attachments[0].stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn test_compile_once_and_framebuffer_per_image() {
        let env = TestEnv::new();
        let mut targets = TargetCache::new(env.device());
        let mut cache = RenderPassCache::new(env.device());
        let graph = deferred_graph();

        let rp0 = cache.get_or_compile(&graph, &deferred_targets(), &mut targets, &env.surface).unwrap();
        let rp1 = cache.get_or_compile(&graph, &deferred_targets(), &mut targets, &env.surface).unwrap();
        assert_eq!(rp0, rp1);
        assert_eq!(env.backend.count_calls(|c| matches!(c, HeadlessCall::CreateRenderPass(_))), 1);

        // attachment 的格式：显式指定 > target 的格式
        let desc = env.backend.render_pass_desc(rp0).unwrap();
        assert_eq!(desc.attachments[0].format, env.surface.format());
        assert_eq!(desc.attachments[2].format, vk::Format::D24_UNORM_S8_UINT);

        let (fb0, extent) = cache.framebuffer("deferred", 0, &targets, &env.surface).unwrap();
        let (fb0_again, _) = cache.framebuffer("deferred", 0, &targets, &env.surface).unwrap();
        let (fb1, _) = cache.framebuffer("deferred", 1, &targets, &env.surface).unwrap();
        assert_eq!(fb0, fb0_again);
        assert_ne!(fb0, fb1);
        assert_eq!(extent, env.surface.extent());
        assert_eq!(cache.compiled("deferred").unwrap().framebuffer_count(), 2);

        let backend = env.backend.clone();
        cache.destroy();
        targets.destroy();
        env.destroy();
        assert_eq!(backend.live_object_count(), 0);
    }

    #[test]
    fn test_image_index_out_of_range() {
        let env = TestEnv::new();
        let mut targets = TargetCache::new(env.device());
        let mut cache = RenderPassCache::new(env.device());
        let graph = forward_graph();
        let render_targets = RenderTargets::new().with_surface("surface");

        cache.get_or_compile(&graph, &render_targets, &mut targets, &env.surface).unwrap();
        let image_count = env.surface.image_count() as u32;
        assert!(matches!(
            cache.framebuffer("forward", image_count, &targets, &env.surface),
            Err(RenderError::InvalidImageIndex { .. })
        ));

        cache.destroy();
        targets.destroy();
        env.destroy();
    }

    #[test]
    fn test_missing_target() {
        let env = TestEnv::new();
        let mut targets = TargetCache::new(env.device());
        let mut cache = RenderPassCache::new(env.device());

        let render_targets = RenderTargets::new().with_surface("surface");
        let result = cache.get_or_compile(&deferred_graph(), &render_targets, &mut targets, &env.surface);
        assert!(matches!(result, Err(RenderError::MissingTarget { target }) if target == "albedo"));
        assert!(cache.is_empty());

        cache.destroy();
        targets.destroy();
        env.destroy();
    }

    #[test]
    fn test_drift_keeps_compiled_pass() {
        let env = TestEnv::new();
        let mut targets = TargetCache::new(env.device());
        let mut cache = RenderPassCache::new(env.device());
        let render_targets = RenderTargets::new().with_surface("surface");

        let graph = forward_graph();
        let rp = cache.get_or_compile(&graph, &render_targets, &mut targets, &env.surface).unwrap();

        let mut drifted = graph.clone();
        drifted.attachments[0].load_op = vk::AttachmentLoadOp::LOAD;
        let rp_drifted = cache.get_or_compile(&drifted, &render_targets, &mut targets, &env.surface).unwrap();
        assert_eq!(rp, rp_drifted);
        assert_eq!(cache.compiled("forward").unwrap().graph(), &graph);

        cache.destroy();
        targets.destroy();
        env.destroy();
    }

    #[test]
    fn test_invalidate_destroys_everything() {
        let env = TestEnv::new();
        let mut targets = TargetCache::new(env.device());
        let mut cache = RenderPassCache::new(env.device());
        let render_targets = RenderTargets::new().with_surface("surface");

        let rp = cache.get_or_compile(&forward_graph(), &render_targets, &mut targets, &env.surface).unwrap();
        let (fb, _) = cache.framebuffer("forward", 0, &targets, &env.surface).unwrap();

        let destroyed = cache.invalidate();
        assert_eq!(destroyed, vec![rp]);
        assert!(cache.compiled("forward").is_none());
        let calls = env.backend.calls();
        assert!(calls.iter().any(|c| matches!(c, HeadlessCall::DestroyFramebuffer(f) if *f == fb)));
        assert!(calls.iter().any(|c| matches!(c, HeadlessCall::DestroyRenderPass(r) if *r == rp)));

        cache.destroy();
        targets.destroy();
        env.destroy();
    }
}
