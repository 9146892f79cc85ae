use std::path::PathBuf;
use std::time::Instant;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use vela_crate_tools::init_log::init_log;
use vela_render_interface::params::RenderParams;
use vela_render_interface::renderer_settings::RendererSettings;
use vela_renderer::frame_scheduler::{FrameOutcome, FrameScheduler};
use vela_renderer::renderer::GraphRenderer;
use vela_renderer::window_surface::WindowSurface;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use crate::vulkan_context::VulkanContext;

/// winit 窗口
pub struct AppWindow {
    window: Window,
}
impl WindowSurface for AppWindow {
    fn physical_extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }
}

/// window 创建之后才存在的对象，销毁顺序：scheduler -> vulkan -> window
struct WindowState {
    scheduler: FrameScheduler,
    vulkan: VulkanContext,
    window: AppWindow,
}
impl WindowState {
    fn destroy(self) {
        self.scheduler.destroy();
        self.vulkan.destroy();
        drop(self.window);
    }
}

/// 基于 winit + [`vela_gfx::vulkan::VulkanBackend`] 的 app
pub struct WindowApp {
    settings: RendererSettings,
    /// 在 `resumed` 中交给 [`FrameScheduler`]
    renderer: Option<Box<dyn GraphRenderer>>,
    state: Option<WindowState>,

    start: Instant,
    frame: u64,
    /// 事件循环中出现的错误，退出循环之后返回
    error: Option<anyhow::Error>,
}
// 总的 main 函数
impl WindowApp {
    pub const TITLE: &'static str = "vela";
    pub const DEFAULT_EXTENT: [f64; 2] = [1200.0, 800.0];

    /// 命令行参数：`[settings.toml]`
    pub fn run(renderer: Box<dyn GraphRenderer>) -> anyhow::Result<()> {
        init_log();
        tracy_client::Client::start();

        let settings = match std::env::args().nth(1).map(PathBuf::from) {
            Some(path) => {
                log::info!("load renderer settings from {}", path.display());
                RendererSettings::load(&path)?
            }
            None => RendererSettings::default(),
        };

        let event_loop = EventLoop::new()?;
        let mut app = Self {
            settings,
            renderer: Some(renderer),
            state: None,
            start: Instant::now(),
            frame: 0,
            error: None,
        };
        event_loop.run_app(&mut app)?;

        log::info!("end run after {} frames.", app.frame);
        app.destroy()
    }
}
// new & init
impl WindowApp {
    /// 在 window 创建之后调用，初始化 vulkan 和帧调度器
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let _span = tracy_client::span!("WindowApp::init_after_window");

        let Some(renderer) = self.renderer.take() else {
            anyhow::bail!("renderer already consumed");
        };

        let window_attr = Window::default_attributes()
            .with_title(Self::TITLE)
            .with_inner_size(winit::dpi::LogicalSize::new(Self::DEFAULT_EXTENT[0], Self::DEFAULT_EXTENT[1]));
        let window = AppWindow {
            window: event_loop.create_window(window_attr)?,
        };

        let vulkan = VulkanContext::new(
            Self::TITLE,
            window.window.display_handle()?.as_raw(),
            window.window.window_handle()?.as_raw(),
        )?;
        let scheduler = match FrameScheduler::new(vulkan.backend().clone(), &self.settings, &window, renderer) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                vulkan.destroy();
                return Err(e.into());
            }
        };

        self.state = Some(WindowState {
            scheduler,
            vulkan,
            window,
        });
        Ok(())
    }
}
// update
impl WindowApp {
    fn tick(&mut self) -> anyhow::Result<()> {
        let _span = tracy_client::span!("WindowApp::tick");

        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };

        let params = RenderParams::new().with("time", self.start.elapsed().as_secs_f32());
        match state.scheduler.render_frame(&state.window, &params)? {
            FrameOutcome::Presented { .. } => self.frame += 1,
            FrameOutcome::NeedsInvalidation => log::info!("frame {}: surface out of date", self.frame),
            FrameOutcome::Skipped => {}
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.error.get_or_insert(error);
        event_loop.exit();
    }
}
// destroy
impl WindowApp {
    fn destroy(mut self) -> anyhow::Result<()> {
        if let Some(state) = self.state.take() {
            state.destroy();
        }
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for WindowApp {
    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        log::info!("winit event: resumed");

        if let Err(e) = self.init_after_window(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = self.state.as_mut() {
                    state.scheduler.notify_resized(vk::Extent2D {
                        width: size.width,
                        height: size.height,
                    });
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.tick() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}
