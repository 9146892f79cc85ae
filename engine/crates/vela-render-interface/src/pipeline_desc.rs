use ash::vk;
use vela_gfx::format::vertex_format_size;

use crate::error::{RenderError, RenderResult};

#[derive(Clone, Debug)]
pub struct ShaderStageDesc {
    pub stage: vk::ShaderStageFlags,
    /// 由资源侧加载好的 shader module
    pub module: vk::ShaderModule,
    pub entry_point: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

/// 顶点属性
///
/// `slots > 1` 表示占用多个连续的 location，例如 mat4 占用 4 个 vec4
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    /// 单个 slot 的格式
    pub format: vk::Format,
    pub offset: u32,
    pub slots: u32,
}
impl VertexAttribute {
    #[inline]
    pub fn new(location: u32, binding: u32, format: vk::Format, offset: u32) -> Self {
        Self {
            location,
            binding,
            format,
            offset,
            slots: 1,
        }
    }

    /// 4x4 float 矩阵，展开为 4 个 vec4
    #[inline]
    pub fn mat4(location: u32, binding: u32, offset: u32) -> Self {
        Self {
            location,
            binding,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset,
            slots: 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stages: vk::ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

/// 绑定对象的种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectSlotKind {
    Sampler,
    UniformBuffer,
    InputAttachment,
}
impl ObjectSlotKind {
    #[inline]
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::Sampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            Self::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        }
    }
}

/// pipeline 声明的绑定对象槽位，binding 号等于其在列表中的下标
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectSlot {
    pub kind: ObjectSlotKind,
    pub stages: vk::ShaderStageFlags,
    pub count: u32,
}
impl ObjectSlot {
    #[inline]
    pub fn new(kind: ObjectSlotKind, stages: vk::ShaderStageFlags) -> Self {
        Self { kind, stages, count: 1 }
    }

    /// 数组槽位，绑定时对象的数组长度必须等于 `count`
    #[inline]
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

/// 具名的 pipeline 模板，提交给 cache 之后不可修改
#[derive(Clone, Debug)]
pub struct PipelineDescription {
    pub name: String,
    pub stages: Vec<ShaderStageDesc>,
    pub vertex_bindings: Vec<VertexBinding>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub push_constants: Vec<PushConstantRange>,
    pub object_slots: Vec<ObjectSlot>,
}

// new & init
impl PipelineDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: vec![],
            vertex_bindings: vec![],
            vertex_attributes: vec![],
            push_constants: vec![],
            object_slots: vec![],
        }
    }
}

// builder
impl PipelineDescription {
    pub fn stage(mut self, stage: vk::ShaderStageFlags, module: vk::ShaderModule, entry_point: &str) -> Self {
        self.stages.push(ShaderStageDesc {
            stage,
            module,
            entry_point: entry_point.to_string(),
        });
        self
    }

    pub fn vertex_binding(mut self, binding: u32, stride: u32, input_rate: vk::VertexInputRate) -> Self {
        self.vertex_bindings.push(VertexBinding {
            binding,
            stride,
            input_rate,
        });
        self
    }

    pub fn vertex_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.vertex_attributes.push(attribute);
        self
    }

    pub fn push_constant(mut self, stages: vk::ShaderStageFlags, offset: u32, size: u32) -> Self {
        self.push_constants.push(PushConstantRange { stages, offset, size });
        self
    }

    pub fn object_slot(mut self, slot: ObjectSlot) -> Self {
        self.object_slots.push(slot);
        self
    }
}

// tools
impl PipelineDescription {
    /// 将占用多个 slot 的属性展开为连续的单 slot 属性
    ///
    /// 第 i 个 slot 的 location 为 `location + i`，offset 为 `offset + i * size(format)`
    pub fn expand_vertex_attributes(&self) -> RenderResult<Vec<vk::VertexInputAttributeDescription>> {
        let mut expanded = Vec::with_capacity(self.vertex_attributes.len());
        for attribute in &self.vertex_attributes {
            let slot_size = vertex_format_size(attribute.format).ok_or_else(|| RenderError::UnsupportedFormat {
                pipeline: self.name.clone(),
                location: attribute.location,
                format: attribute.format,
            })?;
            expanded.extend((0..attribute.slots.max(1)).map(|slot| vk::VertexInputAttributeDescription {
                location: attribute.location + slot,
                binding: attribute.binding,
                format: attribute.format,
                offset: attribute.offset + slot * slot_size,
            }));
        }
        Ok(expanded)
    }

    pub fn vk_vertex_bindings(&self) -> Vec<vk::VertexInputBindingDescription> {
        self.vertex_bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: b.input_rate,
            })
            .collect()
    }

    pub fn vk_push_constant_ranges(&self) -> Vec<vk::PushConstantRange> {
        self.push_constants
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: range.stages,
                offset: range.offset,
                size: range.size,
            })
            .collect()
    }

    /// 所有 push constant range 覆盖的 stage
    pub fn push_constant_stages(&self) -> vk::ShaderStageFlags {
        self.push_constants.iter().fold(vk::ShaderStageFlags::empty(), |acc, range| acc | range.stages)
    }
}
