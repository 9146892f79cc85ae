use std::path::PathBuf;
use std::rc::Rc;

use ash::vk;
use vela_crate_tools::init_log::init_log;
use vela_gfx::headless::HeadlessBackend;
use vela_render_interface::params::RenderParams;
use vela_render_interface::renderer_settings::RendererSettings;
use vela_renderer::frame_scheduler::{FrameOutcome, FrameScheduler};
use vela_renderer::renderer::GraphRenderer;
use vela_renderer::window_surface::HeadlessWindow;

/// 不依赖窗口与 GPU 的 app：用 [`HeadlessBackend`] 驱动帧调度器跑固定帧数
pub struct HeadlessApp {
    backend: Rc<HeadlessBackend>,
    window: HeadlessWindow,
    scheduler: FrameScheduler,
}
// new & init
impl HeadlessApp {
    pub const DEFAULT_EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1200,
        height: 800,
    };

    /// 命令行参数：`[settings.toml] [frame count]`
    pub fn run(renderer: Box<dyn GraphRenderer>) -> anyhow::Result<()> {
        init_log();
        tracy_client::Client::start();

        let mut args = std::env::args().skip(1);
        let settings = match args.next().map(PathBuf::from) {
            Some(path) => {
                log::info!("load renderer settings from {}", path.display());
                RendererSettings::load(&path)?
            }
            None => RendererSettings::default(),
        };
        let frame_count = match args.next() {
            Some(count) => count.parse::<u64>()?,
            None => 8,
        };

        let app = Self::new(&settings, renderer)?;
        app.run_frames(frame_count)
    }

    pub fn new(settings: &RendererSettings, renderer: Box<dyn GraphRenderer>) -> anyhow::Result<Self> {
        let backend = Rc::new(HeadlessBackend::new(Self::DEFAULT_EXTENT));
        let window = HeadlessWindow::new(Self::DEFAULT_EXTENT);
        let scheduler = FrameScheduler::new(backend.clone(), settings, &window, renderer)?;

        Ok(Self {
            backend,
            window,
            scheduler,
        })
    }
}
// update
impl HeadlessApp {
    /// 运行 `frame_count` 帧，中途模拟一次窗口 resize
    pub fn run_frames(mut self, frame_count: u64) -> anyhow::Result<()> {
        let resize_at = frame_count / 2;
        let result = (0..frame_count).try_for_each(|frame| {
            if frame == resize_at {
                self.resize(vk::Extent2D {
                    width: Self::DEFAULT_EXTENT.width / 2,
                    height: Self::DEFAULT_EXTENT.height / 2,
                });
            }
            self.tick(frame)
        });

        self.destroy();
        result
    }

    fn tick(&mut self, frame: u64) -> anyhow::Result<()> {
        let _span = tracy_client::span!("HeadlessApp::tick");

        let params = RenderParams::new().with("time", frame as f32 / 60.0);
        match self.scheduler.render_frame(&self.window, &params)? {
            FrameOutcome::Presented {
                image_index,
                frame_label,
            } => log::info!("frame {}: presented image {} on slot {}", frame, image_index, frame_label),
            FrameOutcome::NeedsInvalidation => log::info!("frame {}: surface out of date", frame),
            FrameOutcome::Skipped => log::info!("frame {}: skipped", frame),
        }
        Ok(())
    }

    fn resize(&mut self, extent: vk::Extent2D) {
        log::info!("simulate resize to {}x{}", extent.width, extent.height);
        self.backend.set_surface_extent(extent);
        self.window.resize(extent);
        self.scheduler.notify_resized(extent);
    }
}
// destroy
impl HeadlessApp {
    fn destroy(self) {
        let Self { backend, scheduler, .. } = self;
        scheduler.destroy();

        let leaked = backend.live_object_count();
        if leaked != 0 {
            log::warn!("{} gpu objects still alive after shutdown", leaked);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use vela_render_graph::render_context::{PassFunctions, RendererContext};
    use vela_render_graph::render_core::RenderCore;
    use vela_render_interface::error::RenderResult;
    use vela_render_interface::graph_desc::{AttachmentDesc, GraphDescription, PassDesc};
    use vela_render_interface::target_desc::RenderTargets;

    use super::*;

    struct ClearRenderer {
        executed: Rc<Cell<u32>>,
    }
    impl GraphRenderer for ClearRenderer {
        fn name(&self) -> &str {
            "clear"
        }

        fn init(&mut self, _core: &mut RenderCore) -> RenderResult<()> {
            Ok(())
        }

        fn destroy(&mut self, _core: &mut RenderCore) {}

        fn render_graph(&self) -> GraphDescription {
            GraphDescription::new("clear")
                .attachment(AttachmentDesc::color("backbuffer"))
                .pass(PassDesc::new().color(&[0]))
        }

        fn execute(&mut self, ctx: &mut RendererContext<'_>, _params: &RenderParams) -> RenderResult<()> {
            let targets = RenderTargets::new().with_surface("backbuffer");
            ctx.execute_graph(&targets, &self.render_graph(), &mut PassFunctions::new())?;
            self.executed.set(self.executed.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_run_frames_with_resize() {
        let executed = Rc::new(Cell::new(0));
        let app = HeadlessApp::new(
            &RendererSettings::default(),
            Box::new(ClearRenderer {
                executed: executed.clone(),
            }),
        )
        .unwrap();
        let backend = app.backend.clone();

        app.run_frames(6).unwrap();
        assert_eq!(executed.get(), 6);
        assert_eq!(backend.live_object_count(), 0);
    }
}
