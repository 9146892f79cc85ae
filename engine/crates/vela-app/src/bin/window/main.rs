mod clear_pass;

use clear_pass::ClearRenderer;
use vela_app::window_app::WindowApp;

fn main() -> anyhow::Result<()> {
    WindowApp::run(Box::new(ClearRenderer::default()))
}
