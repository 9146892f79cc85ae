use std::cell::Cell;

use ash::vk;

/// 窗口系统提供的 surface 信息
pub trait WindowSurface {
    /// 窗口当前的像素尺寸，最小化时宽或高为 0
    fn physical_extent(&self) -> vk::Extent2D;
}

/// 没有真实窗口时使用的固定尺寸窗口，尺寸可以在运行中修改以模拟 resize
#[derive(Debug)]
pub struct HeadlessWindow {
    extent: Cell<vk::Extent2D>,
}
impl HeadlessWindow {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            extent: Cell::new(extent),
        }
    }

    pub fn resize(&self, extent: vk::Extent2D) {
        self.extent.set(extent);
    }
}
impl WindowSurface for HeadlessWindow {
    #[inline]
    fn physical_extent(&self) -> vk::Extent2D {
        self.extent.get()
    }
}
