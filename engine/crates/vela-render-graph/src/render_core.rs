use std::rc::Rc;

use ash::vk;
use vela_gfx::backend::GfxBackend;
use vela_gfx::swapchain::presentable_surface::PresentableSurface;
use vela_render_interface::error::RenderResult;
use vela_render_interface::pipeline_desc::PipelineDescription;
use vela_render_interface::renderer_settings::RendererSettings;

use crate::descriptor_cache::DescriptorCache;
use crate::pass_cache::RenderPassCache;
use crate::pipeline_cache::{PipelineCache, PipelineTemplateHandle};
use crate::target_cache::TargetCache;

/// 帧执行核心持有的对象：presentable surface 与所有跨帧的缓存
///
/// 只在渲染线程上使用；renderer 通过 [`crate::render_context::RendererContext`] 间接访问
pub struct RenderCore {
    pub(crate) device: Rc<dyn GfxBackend>,
    pub(crate) surface: PresentableSurface,

    pub(crate) targets: TargetCache,
    pub(crate) passes: RenderPassCache,
    pub(crate) pipelines: PipelineCache,
    pub(crate) descriptors: DescriptorCache,

    fif_count: usize,
}

// new & init
impl RenderCore {
    pub fn new(
        device: Rc<dyn GfxBackend>,
        settings: &RendererSettings,
        window_extent: vk::Extent2D,
    ) -> RenderResult<Self> {
        let surface = PresentableSurface::new(
            device.as_ref(),
            settings.surface_format.to_vk(),
            settings.present_mode.to_vk(),
            window_extent,
        )?;
        let pipelines = match PipelineCache::new(device.clone(), settings.pipeline_cache_path.clone()) {
            Ok(pipelines) => pipelines,
            Err(e) => {
                surface.destroy(device.as_ref());
                return Err(e);
            }
        };

        Ok(Self {
            targets: TargetCache::new(device.clone()),
            passes: RenderPassCache::new(device.clone()),
            descriptors: DescriptorCache::new(
                device.clone(),
                settings.frames_in_flight,
                settings.persistent_descriptor_sets_per_pool,
            ),
            pipelines,
            surface,
            fif_count: settings.frames_in_flight,
            device,
        })
    }
}

// getters
impl RenderCore {
    #[inline]
    pub fn device(&self) -> &Rc<dyn GfxBackend> {
        &self.device
    }

    #[inline]
    pub fn surface(&self) -> &PresentableSurface {
        &self.surface
    }

    #[inline]
    pub fn surface_mut(&mut self) -> &mut PresentableSurface {
        &mut self.surface
    }

    #[inline]
    pub fn targets(&self) -> &TargetCache {
        &self.targets
    }

    #[inline]
    pub fn passes(&self) -> &RenderPassCache {
        &self.passes
    }

    #[inline]
    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    #[inline]
    pub fn descriptors(&self) -> &DescriptorCache {
        &self.descriptors
    }

    #[inline]
    pub fn fif_count(&self) -> usize {
        self.fif_count
    }
}

// update
impl RenderCore {
    /// 注册 pipeline 模板，通常在 renderer 的 init 中调用
    pub fn add_pipeline(&mut self, desc: PipelineDescription) -> RenderResult<PipelineTemplateHandle> {
        self.pipelines.add_pipeline(desc)
    }

    /// surface 失效后的恢复流程
    ///
    /// 等待设备空闲，销毁 render pass、framebuffer 以及依赖它们的 pipeline，
    /// 销毁跟随 surface 的 target，最后以旧的 swapchain 为提示重建 surface。
    /// 所有对象在下一次使用时重新创建
    pub fn invalidate(&mut self, window_extent: vk::Extent2D) -> RenderResult<()> {
        let _span = tracy_client::span!("RenderCore::invalidate");
        log::info!(
            "invalidate surface, generation {}, window extent {}x{}",
            self.surface.generation(),
            window_extent.width,
            window_extent.height
        );

        self.device.device_wait_idle()?;

        let render_passes = self.passes.invalidate();
        self.pipelines.evict_render_passes(&render_passes);
        self.targets.invalidate();
        self.surface.recreate(self.device.as_ref(), window_extent)?;
        Ok(())
    }
}

// destroy
impl RenderCore {
    /// 调用前需要保证设备空闲
    pub fn destroy(mut self) {
        let _span = tracy_client::span!("RenderCore::destroy");
        self.pipelines.persist();

        self.descriptors.destroy_mut();
        self.passes.destroy_mut();
        self.pipelines.destroy_mut();
        self.targets.destroy_mut();
        self.surface.destroy(self.device.as_ref());
    }
}
