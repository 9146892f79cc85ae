use std::rc::Rc;

use ash::vk;
use vela_gfx::backend::{AcquireOutcome, GfxBackend, GfxSubmitDesc};
use vela_render_graph::render_context::RendererContext;
use vela_render_graph::render_core::RenderCore;
use vela_render_interface::error::RenderResult;
use vela_render_interface::frame_counter::{FrameCounter, FrameLabel};
use vela_render_interface::params::RenderParams;
use vela_render_interface::renderer_settings::RendererSettings;

use crate::frame_sync::FrameSyncSet;
use crate::renderer::GraphRenderer;
use crate::window_surface::WindowSurface;

/// 一次 [`FrameScheduler::render_frame`] 的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// 帧已提交并 present，slot 前进
    Presented { image_index: u32, frame_label: FrameLabel },
    /// acquire 时 surface 已经过期，本帧放弃，slot 不前进；下一帧开始前会重建 surface
    NeedsInvalidation,
    /// 窗口尺寸为 0（最小化），什么都不做
    Skipped,
}

/// 帧调度器
///
/// 持有帧执行核心、每个 in-flight slot 的同步对象以及渲染器，
/// 每次调用驱动一帧完成 acquire -> wait -> reset -> record -> submit -> present
pub struct FrameScheduler {
    core: RenderCore,
    frames: FrameSyncSet,
    frame_counter: FrameCounter,
    renderer: Box<dyn GraphRenderer>,

    fence_timeout_ns: u64,
    /// surface 需要在下一帧开始前重建
    invalid: bool,
}

// new & init
impl FrameScheduler {
    pub fn new(
        device: Rc<dyn GfxBackend>,
        settings: &RendererSettings,
        window: &dyn WindowSurface,
        mut renderer: Box<dyn GraphRenderer>,
    ) -> RenderResult<Self> {
        let _span = tracy_client::span!("FrameScheduler::new");

        let mut core = RenderCore::new(device.clone(), settings, window.physical_extent())?;
        let frames = match FrameSyncSet::new(
            device,
            settings.frames_in_flight,
            settings.transient_descriptor_sets_per_pool,
        ) {
            Ok(frames) => frames,
            Err(e) => {
                core.destroy();
                return Err(e.into());
            }
        };

        if let Err(e) = renderer.init(&mut core) {
            log::error!("renderer `{}` failed to init: {}", renderer.name(), e);
            frames.destroy();
            core.destroy();
            return Err(e);
        }
        log::info!(
            "frame scheduler ready: renderer `{}`, {} frames in flight, {} surface images",
            renderer.name(),
            settings.frames_in_flight,
            core.surface().image_count()
        );

        Ok(Self {
            core,
            frames,
            frame_counter: FrameCounter::new(0, settings.frames_in_flight),
            renderer,
            fence_timeout_ns: settings.fence_timeout_ns(),
            invalid: false,
        })
    }
}

// getters
impl FrameScheduler {
    #[inline]
    pub fn core(&self) -> &RenderCore {
        &self.core
    }

    #[inline]
    pub fn core_mut(&mut self) -> &mut RenderCore {
        &mut self.core
    }

    #[inline]
    pub fn frames(&self) -> &FrameSyncSet {
        &self.frames
    }

    #[inline]
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    #[inline]
    pub fn renderer(&self) -> &dyn GraphRenderer {
        self.renderer.as_ref()
    }

    #[inline]
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }
}

// update
impl FrameScheduler {
    /// 窗口尺寸变化的通知，下一帧开始前重建 surface
    pub fn notify_resized(&mut self, extent: vk::Extent2D) {
        log::info!("window resized to {}x{}", extent.width, extent.height);
        self.invalid = true;
    }

    /// 等待设备空闲，丢弃依赖旧 surface 的对象并重建 surface
    pub fn invalidate(&mut self, window_extent: vk::Extent2D) -> RenderResult<()> {
        self.core.invalidate(window_extent)?;
        self.invalid = false;
        Ok(())
    }

    /// 驱动一帧
    ///
    /// 渲染器 `execute` 返回的错误在本帧提交并 present 之后返回，保证同步对象的状态完整
    ///
    /// 录制命令本身失败时本帧被放弃：fence 保持 signaled，slot 不前进，下一帧先重建 surface
    pub fn render_frame(&mut self, window: &dyn WindowSurface, params: &RenderParams) -> RenderResult<FrameOutcome> {
        let _span = tracy_client::span!("FrameScheduler::render_frame");

        let window_extent = window.physical_extent();
        if window_extent.width == 0 || window_extent.height == 0 {
            return Ok(FrameOutcome::Skipped);
        }
        if self.invalid {
            self.invalidate(window_extent)?;
        }

        let device = self.core.device().clone();
        let frame_label = self.frame_counter.frame_label();
        let frame = self.frames.frame(frame_label);
        let (fence, cmd, image_ready, render_finished) =
            (frame.fence(), frame.command_buffer(), frame.image_ready(), frame.render_finished());

        // acquire
        let image_index = match self.core.surface_mut().acquire_next_image(
            device.as_ref(),
            image_ready,
            self.fence_timeout_ns,
        )? {
            AcquireOutcome::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    self.invalid = true;
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                self.invalid = true;
                return Ok(FrameOutcome::NeedsInvalidation);
            }
        };

        // 等待该 slot 上一次提交的工作完成，超时是致命错误
        {
            let _span = tracy_client::span!("wait frame fence");
            device.wait_fence(fence, self.fence_timeout_ns)?;
        }

        // record；录制失败时 fence 还没有 reset，slot 仍然可用
        let executed = match self.record_frame(frame_label, cmd, image_index, params) {
            Ok(executed) => executed,
            Err(e) => {
                self.abandon_frame(frame_label);
                return Err(e);
            }
        };

        // submit
        device.reset_fence(fence)?;
        device.queue_submit(&GfxSubmitDesc {
            command_buffer: cmd,
            wait_semaphore: image_ready,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: render_finished,
            fence,
        })?;

        // present
        let outcome = self.core.surface().present_image(device.as_ref(), image_index, render_finished)?;
        if outcome.needs_recreate() {
            self.invalid = true;
        }

        self.frame_counter.next_frame();
        tracy_client::frame_mark();

        executed?;
        Ok(FrameOutcome::Presented {
            image_index,
            frame_label,
        })
    }
}

// tools
impl FrameScheduler {
    /// 外层错误是录制本身的失败；内层是渲染器 `execute` 的结果，不影响提交
    fn record_frame(
        &mut self,
        frame_label: FrameLabel,
        cmd: vk::CommandBuffer,
        image_index: u32,
        params: &RenderParams,
    ) -> RenderResult<RenderResult<()>> {
        let device = self.core.device().clone();
        device.reset_command_buffer(cmd)?;
        self.frames.frame_mut(frame_label).transient_mut().reset()?;

        device.begin_command_buffer(cmd)?;
        let executed = {
            let _span = tracy_client::span!("GraphRenderer::execute");
            let mut ctx = RendererContext::new(
                &mut self.core,
                self.frames.frame_mut(frame_label).transient_mut(),
                cmd,
                image_index,
                frame_label,
            );
            self.renderer.execute(&mut ctx, params)
        };
        if let Err(e) = &executed {
            log::error!(
                "{} renderer `{}` failed: {}",
                self.frame_counter.frame_name(),
                self.renderer.name(),
                e
            );
        }
        device.end_command_buffer(cmd)?;

        Ok(executed)
    }

    /// 已经 acquire 但没有提交的帧：替换被 signal 的 image-ready，并在下一帧重建 surface 以归还 image
    fn abandon_frame(&mut self, frame_label: FrameLabel) {
        log::error!("{} recording failed, frame abandoned", self.frame_counter.frame_name());
        if let Err(e) = self.core.device().device_wait_idle() {
            log::warn!("device wait idle failed while abandoning a frame: {}", e);
        }
        if let Err(e) = self.frames.replace_image_ready(frame_label) {
            log::warn!("failed to replace image-ready semaphore of slot {}: {}", frame_label, e);
        }
        self.invalid = true;
    }
}

// destroy
impl FrameScheduler {
    /// 等待设备空闲后按照创建的逆序销毁
    pub fn destroy(mut self) {
        let _span = tracy_client::span!("FrameScheduler::destroy");
        if let Err(e) = self.core.device().device_wait_idle() {
            log::warn!("device wait idle failed during shutdown: {}", e);
        }

        self.renderer.destroy(&mut self.core);
        self.frames.destroy();
        self.core.destroy();
    }
}
