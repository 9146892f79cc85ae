mod triangle_pass;

use triangle_pass::TriangleRenderer;
use vela_app::headless_app::HeadlessApp;

fn main() -> anyhow::Result<()> {
    HeadlessApp::run(Box::new(TriangleRenderer::default()))
}
