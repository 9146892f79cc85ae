use std::rc::Rc;

use ash::vk;
use vela_gfx::backend::GfxBackend;
use vela_gfx::error::GfxResult;
use vela_render_graph::descriptor_cache::TransientDescriptorPool;
use vela_render_interface::frame_counter::FrameLabel;

/// 一个 in-flight slot 独占的对象
pub struct FrameData {
    label: FrameLabel,

    /// 创建时即为 signaled，第一次使用该 slot 时不需要等待
    fence: vk::Fence,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,

    image_ready: vk::Semaphore,
    render_finished: vk::Semaphore,

    transient: TransientDescriptorPool,
}
// new & init
impl FrameData {
    fn new(device: &Rc<dyn GfxBackend>, label: FrameLabel, transient_sets_per_pool: u32) -> GfxResult<Self> {
        let fence = device.create_fence(true, &format!("frame-fence-{}", label))?;
        let command_pool = device.create_command_pool(&format!("frame-cmd-pool-{}", label))?;
        let command_buffer = device.allocate_command_buffer(command_pool, &format!("frame-cmd-{}", label))?;
        let image_ready = device.create_semaphore(&format!("image-ready-{}", label))?;
        let render_finished = device.create_semaphore(&format!("render-finished-{}", label))?;

        Ok(Self {
            label,
            fence,
            command_pool,
            command_buffer,
            image_ready,
            render_finished,
            transient: TransientDescriptorPool::new(device.clone(), transient_sets_per_pool),
        })
    }
}
// getters
impl FrameData {
    #[inline]
    pub fn label(&self) -> FrameLabel {
        self.label
    }

    #[inline]
    pub fn fence(&self) -> vk::Fence {
        self.fence
    }

    #[inline]
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    #[inline]
    pub fn image_ready(&self) -> vk::Semaphore {
        self.image_ready
    }

    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished
    }

    #[inline]
    pub fn transient(&self) -> &TransientDescriptorPool {
        &self.transient
    }

    #[inline]
    pub fn transient_mut(&mut self) -> &mut TransientDescriptorPool {
        &mut self.transient
    }
}

// update
impl FrameData {
    /// 已经被 acquire signal 但没有被提交等待的 semaphore 不能再用于 acquire，只能替换
    ///
    /// 调用前需要保证设备空闲
    fn replace_image_ready(&mut self, device: &dyn GfxBackend) -> GfxResult<()> {
        let image_ready = device.create_semaphore(&format!("image-ready-{}", self.label))?;
        device.destroy_semaphore(std::mem::replace(&mut self.image_ready, image_ready));
        Ok(())
    }
}
// destroy
impl FrameData {
    fn destroy(self, device: &dyn GfxBackend) {
        self.transient.destroy();
        device.destroy_semaphore(self.render_finished);
        device.destroy_semaphore(self.image_ready);
        device.destroy_command_pool(self.command_pool);
        device.destroy_fence(self.fence);
    }
}

/// 所有 in-flight slot 的同步对象
pub struct FrameSyncSet {
    device: Rc<dyn GfxBackend>,
    frames: Vec<FrameData>,
}
// new & init
impl FrameSyncSet {
    pub fn new(device: Rc<dyn GfxBackend>, fif_count: usize, transient_sets_per_pool: u32) -> GfxResult<Self> {
        let frames = (0..fif_count)
            .map(|index| FrameData::new(&device, FrameLabel::from_usize(index), transient_sets_per_pool))
            .collect::<GfxResult<Vec<_>>>()?;
        Ok(Self { device, frames })
    }
}
// getters
impl FrameSyncSet {
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn frame(&self, label: FrameLabel) -> &FrameData {
        &self.frames[*label]
    }

    #[inline]
    pub fn frame_mut(&mut self, label: FrameLabel) -> &mut FrameData {
        &mut self.frames[*label]
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &FrameData> {
        self.frames.iter()
    }
}

// update
impl FrameSyncSet {
    /// 放弃一个已经 acquire 但没有提交的 slot 之后调用，调用前需要保证设备空闲
    pub fn replace_image_ready(&mut self, label: FrameLabel) -> GfxResult<()> {
        let device = self.device.clone();
        self.frames[*label].replace_image_ready(device.as_ref())
    }
}
// destroy
impl FrameSyncSet {
    /// 调用前需要保证设备空闲
    pub fn destroy(self) {
        for frame in self.frames {
            frame.destroy(self.device.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_gfx::headless::HeadlessBackend;

    #[test]
    fn test_fences_start_signaled() {
        let backend = Rc::new(HeadlessBackend::new(vk::Extent2D {
            width: 64,
            height: 64,
        }));
        let frames = FrameSyncSet::new(backend.clone(), 3, 4).unwrap();
        assert_eq!(frames.len(), 3);
        for frame in frames.iter() {
            assert_eq!(backend.fence_signaled(frame.fence()), Some(true));
            assert_ne!(frame.image_ready(), frame.render_finished());
        }
        assert_eq!(*frames.frame(FrameLabel::from_usize(2)).label(), 2);

        frames.destroy();
        assert_eq!(backend.live_object_count(), 0);
    }

    #[test]
    fn test_replace_image_ready() {
        let backend = Rc::new(HeadlessBackend::new(vk::Extent2D {
            width: 64,
            height: 64,
        }));
        let mut frames = FrameSyncSet::new(backend.clone(), 2, 4).unwrap();
        let label = FrameLabel::from_usize(1);
        let old = frames.frame(label).image_ready();
        let untouched = frames.frame(FrameLabel::from_usize(0)).image_ready();
        let live = backend.live_object_count();

        frames.replace_image_ready(label).unwrap();
        assert_ne!(frames.frame(label).image_ready(), old);
        assert_eq!(frames.frame(FrameLabel::from_usize(0)).image_ready(), untouched);
        assert_eq!(backend.live_object_count(), live);

        frames.destroy();
        assert_eq!(backend.live_object_count(), 0);
    }
}
