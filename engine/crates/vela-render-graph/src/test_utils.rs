use std::rc::Rc;

use ash::vk;
use vela_gfx::backend::GfxBackend;
use vela_gfx::headless::HeadlessBackend;
use vela_gfx::swapchain::presentable_surface::PresentableSurface;
use vela_render_interface::renderer_settings::DefaultRendererSettings;

pub const TEST_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

/// headless 后端 + 一条 surface
pub struct TestEnv {
    pub backend: Rc<HeadlessBackend>,
    pub surface: PresentableSurface,
}
impl TestEnv {
    pub fn new() -> Self {
        let backend = Rc::new(HeadlessBackend::new(TEST_EXTENT));
        let surface = PresentableSurface::new(
            backend.as_ref(),
            DefaultRendererSettings::DEFAULT_SURFACE_FORMAT,
            DefaultRendererSettings::DEFAULT_PRESENT_MODE,
            TEST_EXTENT,
        )
        .unwrap();
        Self { backend, surface }
    }

    pub fn device(&self) -> Rc<dyn GfxBackend> {
        self.backend.clone()
    }

    pub fn destroy(self) {
        self.surface.destroy(self.backend.as_ref());
    }
}
