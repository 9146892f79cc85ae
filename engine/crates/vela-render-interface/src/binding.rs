use ash::vk;

use crate::pipeline_desc::ObjectSlotKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferRange {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub range: vk::DeviceSize,
}
impl BufferRange {
    #[inline]
    pub fn whole(buffer: vk::Buffer) -> Self {
        Self {
            buffer,
            offset: 0,
            range: vk::WHOLE_SIZE,
        }
    }
}

/// 绑定到 pipeline 槽位上的对象
///
/// 按值比较，用于判断 tagged descriptor set 是否需要重写
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingObject {
    /// 由 render pass 隐式绑定，不需要写 descriptor
    InputAttachment,
    /// images 与 samplers 一一对应，长度必须相同
    SampledImages {
        images: Vec<vk::ImageView>,
        samplers: Vec<vk::Sampler>,
    },
    UniformBuffers(Vec<BufferRange>),
}
impl BindingObject {
    #[inline]
    pub fn sampled_image(image: vk::ImageView, sampler: vk::Sampler) -> Self {
        Self::SampledImages {
            images: vec![image],
            samplers: vec![sampler],
        }
    }

    #[inline]
    pub fn uniform_buffer(range: BufferRange) -> Self {
        Self::UniformBuffers(vec![range])
    }

    #[inline]
    pub fn kind(&self) -> ObjectSlotKind {
        match self {
            Self::InputAttachment => ObjectSlotKind::InputAttachment,
            Self::SampledImages { .. } => ObjectSlotKind::Sampler,
            Self::UniformBuffers(_) => ObjectSlotKind::UniformBuffer,
        }
    }
}

/// 一次 pipeline 绑定需要的数据：push constant 与绑定对象
#[derive(Clone, Debug, Default)]
pub struct PipelineBindingInfo {
    pub push_constants: Vec<u8>,
    pub objects: Vec<BindingObject>,
    /// 有 tag 时 descriptor set 在帧之间持久保存，只在对象变化时重写
    pub tag: Option<String>,
}
impl PipelineBindingInfo {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push_constants(mut self, bytes: &[u8]) -> Self {
        self.push_constants = bytes.to_vec();
        self
    }

    #[inline]
    pub fn object(mut self, object: BindingObject) -> Self {
        self.objects.push(object);
        self
    }

    #[inline]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}
