use std::collections::HashMap;
use std::rc::Rc;

use ash::vk;
use vela_gfx::backend::{GfxBackend, GfxDescriptorWrite, GfxDescriptorWriteKind};
use vela_gfx::error::{GfxError, GfxResult};
use vela_render_interface::binding::{BindingObject, PipelineBindingInfo};
use vela_render_interface::error::{RenderError, RenderResult};

use crate::pipeline_cache::{PipelineTemplate, PipelineTemplateHandle};

/// 一组 descriptor pool，当前 pool 耗尽时追加新的 pool
struct PoolChain {
    pools: Vec<vk::DescriptorPool>,
    /// 下一次分配使用的 pool
    current: usize,
    sets_per_pool: u32,
}
impl PoolChain {
    fn new(sets_per_pool: u32) -> Self {
        Self {
            pools: vec![],
            current: 0,
            sets_per_pool: sets_per_pool.max(1),
        }
    }

    fn pool_sizes(&self) -> [vk::DescriptorPoolSize; 3] {
        let n = self.sets_per_pool;
        [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: n * 4,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: n * 4,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::INPUT_ATTACHMENT,
                descriptor_count: n * 2,
            },
        ]
    }

    fn allocate(&mut self, device: &dyn GfxBackend, layout: vk::DescriptorSetLayout) -> GfxResult<vk::DescriptorSet> {
        loop {
            let fresh = self.current == self.pools.len();
            if fresh {
                let pool = device.create_descriptor_pool(self.sets_per_pool, &self.pool_sizes())?;
                self.pools.push(pool);
                log::debug!("descriptor pool chain grows to {} pools", self.pools.len());
            }

            match device.allocate_descriptor_set(self.pools[self.current], layout) {
                // 新建的 pool 也分配失败，继续追加没有意义
                Err(GfxError::OutOfPoolMemory) if !fresh => self.current += 1,
                result => return result,
            }
        }
    }

    fn reset(&mut self, device: &dyn GfxBackend) -> GfxResult<()> {
        for pool in &self.pools[..self.pools.len().min(self.current + 1)] {
            device.reset_descriptor_pool(*pool)?;
        }
        self.current = 0;
        Ok(())
    }

    fn destroy(&mut self, device: &dyn GfxBackend) {
        for pool in self.pools.drain(..) {
            device.destroy_descriptor_pool(pool);
        }
        self.current = 0;
    }
}

/// 某个 frame slot 独占的 descriptor pool
///
/// 未带 tag 的 descriptor set 从这里分配，在 slot 下一次使用前整体 reset
pub struct TransientDescriptorPool {
    device: Rc<dyn GfxBackend>,
    chain: PoolChain,
    destroyed: bool,
}
// new & init
impl TransientDescriptorPool {
    pub fn new(device: Rc<dyn GfxBackend>, sets_per_pool: u32) -> Self {
        Self {
            device,
            chain: PoolChain::new(sets_per_pool),
            destroyed: false,
        }
    }
}
// getters
impl TransientDescriptorPool {
    #[inline]
    pub fn pool_count(&self) -> usize {
        self.chain.pools.len()
    }
}
// update
impl TransientDescriptorPool {
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> GfxResult<vk::DescriptorSet> {
        self.chain.allocate(self.device.as_ref(), layout)
    }

    /// 释放上一次使用该 slot 时分配的所有 descriptor set
    pub fn reset(&mut self) -> GfxResult<()> {
        self.chain.reset(self.device.as_ref())
    }
}
// destroy
impl TransientDescriptorPool {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    pub fn destroy_mut(&mut self) {
        self.chain.destroy(self.device.as_ref());
        self.destroyed = true;
    }
}
impl Drop for TransientDescriptorPool {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "TransientDescriptorPool dropped without destroy");
    }
}

/// 带 tag 的持久 descriptor set：每个 frame slot 一个
struct TaggedEntry {
    sets: Vec<vk::DescriptorSet>,
    /// 每个 slot 最近一次写入的对象列表
    written: Vec<Vec<BindingObject>>,
}

/// descriptor 绑定缓存
pub struct DescriptorCache {
    device: Rc<dyn GfxBackend>,
    fif_count: usize,

    persistent: PoolChain,
    tagged: HashMap<(PipelineTemplateHandle, String), TaggedEntry>,

    destroyed: bool,
}
// new & init
impl DescriptorCache {
    pub fn new(device: Rc<dyn GfxBackend>, fif_count: usize, sets_per_pool: u32) -> Self {
        Self {
            device,
            fif_count,
            persistent: PoolChain::new(sets_per_pool),
            tagged: HashMap::new(),
            destroyed: false,
        }
    }
}
// getters
impl DescriptorCache {
    #[inline]
    pub fn tagged_count(&self) -> usize {
        self.tagged.len()
    }

    #[inline]
    pub fn persistent_pool_count(&self) -> usize {
        self.persistent.pools.len()
    }
}
// update
impl DescriptorCache {
    /// 为 pipeline 的一次绑定准备 descriptor set
    ///
    /// pipeline 没有声明任何 object slot 时返回 None。
    /// 校验在分配和写入之前完成，校验失败时不会产生任何 GPU 写入
    pub fn resolve(
        &mut self,
        handle: PipelineTemplateHandle,
        template: &PipelineTemplate,
        info: &PipelineBindingInfo,
        frame_slot: usize,
        transient: &mut TransientDescriptorPool,
    ) -> RenderResult<Option<vk::DescriptorSet>> {
        Self::validate(template, &info.objects)?;
        if !template.has_objects() {
            return Ok(None);
        }

        let Some(tag) = &info.tag else {
            let set = transient.allocate(template.set_layout())?;
            self.write(set, &info.objects);
            return Ok(Some(set));
        };

        debug_assert!(frame_slot < self.fif_count);
        let key = (handle, tag.clone());
        if let Some(entry) = self.tagged.get_mut(&key) {
            let set = entry.sets[frame_slot];
            if entry.written[frame_slot] != info.objects {
                Self::write_set(self.device.as_ref(), set, &info.objects);
                entry.written[frame_slot] = info.objects.clone();
            }
            return Ok(Some(set));
        }

        let sets: Vec<vk::DescriptorSet> = (0..self.fif_count)
            .map(|_| self.persistent.allocate(self.device.as_ref(), template.set_layout()))
            .collect::<GfxResult<_>>()?;
        for set in &sets {
            self.write(*set, &info.objects);
        }
        log::debug!("persistent descriptor sets created for `{}` tag `{}`", template.name(), tag);

        let set = sets[frame_slot];
        self.tagged.insert(
            key,
            TaggedEntry {
                sets,
                written: vec![info.objects.clone(); self.fif_count],
            },
        );
        Ok(Some(set))
    }

    fn write(&self, set: vk::DescriptorSet, objects: &[BindingObject]) {
        Self::write_set(self.device.as_ref(), set, objects);
    }

    fn write_set(device: &dyn GfxBackend, set: vk::DescriptorSet, objects: &[BindingObject]) {
        let writes = Self::build_writes(objects);
        if !writes.is_empty() {
            device.update_descriptor_set(set, &writes);
        }
    }
}
// tools
impl DescriptorCache {
    /// 对象数量、种类、数组长度必须与 pipeline 的 object slot 一致，image 与 sampler 一一对应
    pub fn validate(template: &PipelineTemplate, objects: &[BindingObject]) -> RenderResult<()> {
        let slots = &template.desc().object_slots;
        if slots.len() != objects.len() {
            return Err(RenderError::BindingCountMismatch {
                pipeline: template.name().to_string(),
                expected: slots.len(),
                actual: objects.len(),
            });
        }

        for (index, (slot, object)) in slots.iter().zip(objects).enumerate() {
            if slot.kind != object.kind() {
                return Err(RenderError::BindingKindMismatch {
                    pipeline: template.name().to_string(),
                    slot: index,
                    expected: slot.kind,
                    actual: object.kind(),
                });
            }
            if let BindingObject::SampledImages { images, samplers } = object {
                if images.len() != samplers.len() {
                    return Err(RenderError::SamplerImageLengthMismatch {
                        pipeline: template.name().to_string(),
                        slot: index,
                        images: images.len(),
                        samplers: samplers.len(),
                    });
                }
            }

            let array_len = match object {
                BindingObject::InputAttachment => None,
                BindingObject::SampledImages { images, .. } => Some(images.len()),
                BindingObject::UniformBuffers(buffers) => Some(buffers.len()),
            };
            if let Some(actual) = array_len {
                if actual != slot.count as usize {
                    return Err(RenderError::BindingArrayLengthMismatch {
                        pipeline: template.name().to_string(),
                        slot: index,
                        expected: slot.count,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    /// binding 号等于 slot 的下标；input attachment 由 render pass 隐式绑定，不产生写入
    fn build_writes(objects: &[BindingObject]) -> Vec<GfxDescriptorWrite> {
        objects
            .iter()
            .enumerate()
            .filter_map(|(binding, object)| {
                let kind = match object {
                    BindingObject::InputAttachment => return None,
                    BindingObject::SampledImages { images, samplers } => GfxDescriptorWriteKind::Images(
                        images
                            .iter()
                            .zip(samplers)
                            .map(|(image, sampler)| vk::DescriptorImageInfo {
                                sampler: *sampler,
                                image_view: *image,
                                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                            })
                            .collect(),
                    ),
                    BindingObject::UniformBuffers(buffers) => GfxDescriptorWriteKind::Buffers(
                        buffers
                            .iter()
                            .map(|range| vk::DescriptorBufferInfo {
                                buffer: range.buffer,
                                offset: range.offset,
                                range: range.range,
                            })
                            .collect(),
                    ),
                };
                Some(GfxDescriptorWrite {
                    binding: binding as u32,
                    descriptor_type: object.kind().descriptor_type(),
                    kind,
                })
            })
            .collect()
    }
}
// destroy
impl DescriptorCache {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    pub fn destroy_mut(&mut self) {
        self.tagged.clear();
        self.persistent.destroy(self.device.as_ref());
        self.destroyed = true;
    }
}
impl Drop for DescriptorCache {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "DescriptorCache dropped without destroy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline_cache::PipelineCache;
    use crate::test_utils::TEST_EXTENT;
    use vela_gfx::headless::{HeadlessBackend, HeadlessCall};
    use vela_render_interface::binding::BufferRange;
    use vela_render_interface::pipeline_desc::{ObjectSlot, ObjectSlotKind, PipelineDescription};

    const FIF: usize = 2;

    struct Fixture {
        backend: Rc<HeadlessBackend>,
        pipelines: PipelineCache,
        descriptors: DescriptorCache,
        transient: TransientDescriptorPool,
    }
    impl Fixture {
        fn new() -> Self {
            let backend = Rc::new(HeadlessBackend::new(TEST_EXTENT));
            let mut pipelines = PipelineCache::new(backend.clone(), None).unwrap();
            pipelines
                .add_pipeline(
                    PipelineDescription::new("lit")
                        .object_slot(ObjectSlot::new(ObjectSlotKind::UniformBuffer, vk::ShaderStageFlags::VERTEX))
                        .object_slot(ObjectSlot::new(ObjectSlotKind::Sampler, vk::ShaderStageFlags::FRAGMENT)),
                )
                .unwrap();
            pipelines
                .add_pipeline(
                    PipelineDescription::new("resolve")
                        .object_slot(ObjectSlot::new(ObjectSlotKind::InputAttachment, vk::ShaderStageFlags::FRAGMENT)),
                )
                .unwrap();
            pipelines.add_pipeline(PipelineDescription::new("bare")).unwrap();

            Self {
                descriptors: DescriptorCache::new(backend.clone(), FIF, 8),
                transient: TransientDescriptorPool::new(backend.clone(), 8),
                pipelines,
                backend,
            }
        }

        fn resolve(
            &mut self,
            pipeline: &str,
            info: &PipelineBindingInfo,
            slot: usize,
        ) -> RenderResult<Option<vk::DescriptorSet>> {
            let handle = self.pipelines.find(pipeline).unwrap();
            let template = self.pipelines.template(handle).unwrap();
            self.descriptors.resolve(handle, template, info, slot, &mut self.transient)
        }

        fn destroy(self) {
            self.transient.destroy();
            self.descriptors.destroy();
            self.pipelines.destroy();
            assert_eq!(self.backend.live_object_count(), 0);
        }
    }

    fn buffer(raw: u64) -> vk::Buffer {
        use ash::vk::Handle;
        vk::Buffer::from_raw(raw)
    }

    fn lit_objects(ubo: u64) -> Vec<BindingObject> {
        use ash::vk::Handle;
        vec![
            BindingObject::uniform_buffer(BufferRange::whole(buffer(ubo))),
            BindingObject::sampled_image(vk::ImageView::from_raw(0x100), vk::Sampler::from_raw(0x200)),
        ]
    }

    fn lit_info(ubo: u64, tag: Option<&str>) -> PipelineBindingInfo {
        let mut info = PipelineBindingInfo::new();
        info.objects = lit_objects(ubo);
        info.tag = tag.map(str::to_string);
        info
    }

    #[test]
    fn test_untagged_allocates_every_call() {
        let mut f = Fixture::new();

        let a = f.resolve("lit", &lit_info(1, None), 0).unwrap().unwrap();
        let b = f.resolve("lit", &lit_info(1, None), 0).unwrap().unwrap();
        assert_ne!(a, b);
        assert_eq!(f.backend.descriptor_update_count(), 2);
        assert_eq!(f.backend.descriptor_write_count(), 4);
        assert_eq!(f.descriptors.tagged_count(), 0);

        f.destroy();
    }

    #[test]
    fn test_tagged_identical_objects_skip_write() {
        let mut f = Fixture::new();

        let first = f.resolve("lit", &lit_info(1, Some("hero")), 0).unwrap().unwrap();
        // 第一次使用时写入全部 FIF 个 set
        assert_eq!(f.backend.descriptor_update_count(), FIF);

        let second = f.resolve("lit", &lit_info(1, Some("hero")), 0).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(f.backend.descriptor_update_count(), FIF);

        // 另一个 slot 得到不同的 set，内容相同也不重写
        let other = f.resolve("lit", &lit_info(1, Some("hero")), 1).unwrap().unwrap();
        assert_ne!(first, other);
        assert_eq!(f.backend.descriptor_update_count(), FIF);

        f.destroy();
    }

    #[test]
    fn test_tagged_changed_objects_rewrite_current_slot() {
        let mut f = Fixture::new();

        f.resolve("lit", &lit_info(1, Some("hero")), 0).unwrap();
        let updates = f.backend.descriptor_update_count();

        let set = f.resolve("lit", &lit_info(2, Some("hero")), 1).unwrap().unwrap();
        assert_eq!(f.backend.descriptor_update_count(), updates + 1);
        assert!(matches!(
            f.backend.calls().last(),
            Some(HeadlessCall::UpdateDescriptorSet { set: s, write_count: 2 }) if *s == set
        ));

        // slot 0 仍然持有旧内容，用新内容访问时需要重写
        f.resolve("lit", &lit_info(2, Some("hero")), 0).unwrap();
        assert_eq!(f.backend.descriptor_update_count(), updates + 2);
        f.resolve("lit", &lit_info(2, Some("hero")), 0).unwrap();
        assert_eq!(f.backend.descriptor_update_count(), updates + 2);

        f.destroy();
    }

    #[test]
    fn test_tags_are_scoped_by_pipeline() {
        let mut f = Fixture::new();

        f.resolve("lit", &lit_info(1, Some("shared")), 0).unwrap();
        let info = PipelineBindingInfo::new().object(BindingObject::InputAttachment).tag("shared");
        f.resolve("resolve", &info, 0).unwrap();
        assert_eq!(f.descriptors.tagged_count(), 2);

        f.destroy();
    }

    #[test]
    fn test_count_mismatch_issues_no_writes() {
        let mut f = Fixture::new();

        let info = PipelineBindingInfo::new().object(BindingObject::uniform_buffer(BufferRange::whole(buffer(1))));
        let err = f.resolve("lit", &info, 0).unwrap_err();
        assert!(matches!(err, RenderError::BindingCountMismatch { expected: 2, actual: 1, .. }));
        assert!(err.is_configuration());
        assert_eq!(f.backend.descriptor_write_count(), 0);
        assert_eq!(f.backend.count_calls(|c| matches!(c, HeadlessCall::AllocateDescriptorSet { .. })), 0);

        f.destroy();
    }

    #[test]
    fn test_sampler_image_length_mismatch() {
        use ash::vk::Handle;
        let mut f = Fixture::new();

        let info = PipelineBindingInfo::new()
            .object(BindingObject::uniform_buffer(BufferRange::whole(buffer(1))))
            .object(BindingObject::SampledImages {
                images: vec![vk::ImageView::from_raw(1), vk::ImageView::from_raw(2)],
                samplers: vec![vk::Sampler::from_raw(3)],
            });
        assert!(matches!(
            f.resolve("lit", &info, 0),
            Err(RenderError::SamplerImageLengthMismatch { slot: 1, images: 2, samplers: 1, .. })
        ));
        assert_eq!(f.backend.descriptor_write_count(), 0);

        f.destroy();
    }

    #[test]
    fn test_array_length_must_match_slot_count() {
        use ash::vk::Handle;
        let mut f = Fixture::new();

        let mut empty = lit_info(1, None);
        empty.objects[0] = BindingObject::UniformBuffers(vec![]);
        assert!(matches!(
            f.resolve("lit", &empty, 0),
            Err(RenderError::BindingArrayLengthMismatch {
                slot: 0,
                expected: 1,
                actual: 0,
                ..
            })
        ));

        let mut oversized = lit_info(1, Some("hero"));
        oversized.objects[1] = BindingObject::SampledImages {
            images: vec![vk::ImageView::from_raw(1), vk::ImageView::from_raw(2)],
            samplers: vec![vk::Sampler::from_raw(3), vk::Sampler::from_raw(4)],
        };
        assert!(matches!(
            f.resolve("lit", &oversized, 0),
            Err(RenderError::BindingArrayLengthMismatch {
                slot: 1,
                expected: 1,
                actual: 2,
                ..
            })
        ));

        assert_eq!(f.backend.descriptor_write_count(), 0);
        assert_eq!(f.backend.count_calls(|c| matches!(c, HeadlessCall::AllocateDescriptorSet { .. })), 0);
        assert_eq!(f.descriptors.tagged_count(), 0);

        f.destroy();
    }

    #[test]
    fn test_kind_mismatch() {
        let mut f = Fixture::new();

        let mut objects = lit_objects(1);
        objects.swap(0, 1);
        let mut info = PipelineBindingInfo::new();
        info.objects = objects;
        assert!(matches!(
            f.resolve("lit", &info, 0),
            Err(RenderError::BindingKindMismatch {
                slot: 0,
                expected: ObjectSlotKind::UniformBuffer,
                actual: ObjectSlotKind::Sampler,
                ..
            })
        ));

        f.destroy();
    }

    #[test]
    fn test_input_attachment_needs_no_write() {
        let mut f = Fixture::new();

        let info = PipelineBindingInfo::new().object(BindingObject::InputAttachment);
        assert!(f.resolve("resolve", &info, 0).unwrap().is_some());
        assert_eq!(f.backend.descriptor_update_count(), 0);

        f.destroy();
    }

    #[test]
    fn test_no_slots_no_set() {
        let mut f = Fixture::new();

        assert!(f.resolve("bare", &PipelineBindingInfo::new(), 0).unwrap().is_none());
        assert_eq!(f.transient.pool_count(), 0);

        f.destroy();
    }

    #[test]
    fn test_transient_pool_chains_and_resets() {
        let mut f = Fixture::new();
        f.backend.script_descriptor_pool_capacity(Some(1));

        for _ in 0..3 {
            f.resolve("lit", &lit_info(1, None), 0).unwrap();
        }
        assert_eq!(f.transient.pool_count(), 3);

        f.transient.reset().unwrap();
        assert_eq!(f.backend.count_calls(|c| matches!(c, HeadlessCall::ResetDescriptorPool(_))), 3);

        // reset 之后复用已有的 pool
        f.resolve("lit", &lit_info(1, None), 0).unwrap();
        assert_eq!(f.transient.pool_count(), 3);

        f.destroy();
    }

    #[test]
    fn test_fresh_pool_failure_is_reported() {
        let mut f = Fixture::new();
        f.backend.script_descriptor_pool_capacity(Some(0));

        let err = f.resolve("lit", &lit_info(1, None), 0).unwrap_err();
        assert!(matches!(err, RenderError::Gfx(GfxError::OutOfPoolMemory)));
        assert_eq!(f.transient.pool_count(), 1);

        f.destroy();
    }
}
