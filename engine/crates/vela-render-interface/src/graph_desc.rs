//! 渲染器输出的声明式描述
//!
//! 每帧由渲染器重新提供，按值比较来判断是否与缓存的版本不一致

use ash::vk;

use crate::error::{RenderError, RenderResult};

/// attachment 的清除值
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}
impl ClearValue {
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            Self::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttachmentDesc {
    /// 对应 [`crate::target_desc::RenderTargets`] 中的名字
    pub target: String,
    /// 为 None 时使用 target 的格式
    pub format: Option<vk::Format>,
    pub clear: Option<ClearValue>,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}
// new & init
impl AttachmentDesc {
    pub fn color(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            format: None,
            clear: Some(ClearValue::Color([0.0, 0.0, 0.0, 1.0])),
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }

    pub fn depth_stencil(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            format: None,
            clear: Some(ClearValue::DepthStencil { depth: 1.0, stencil: 0 }),
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }
}
// builder
impl AttachmentDesc {
    #[inline]
    pub fn with_format(mut self, format: vk::Format) -> Self {
        self.format = Some(format);
        self
    }

    #[inline]
    pub fn with_clear(mut self, clear: Option<ClearValue>) -> Self {
        self.clear = clear;
        self
    }

    #[inline]
    pub fn with_ops(mut self, load_op: vk::AttachmentLoadOp, store_op: vk::AttachmentStoreOp) -> Self {
        self.load_op = load_op;
        self.store_op = store_op;
        self
    }

    #[inline]
    pub fn with_layouts(mut self, initial_layout: vk::ImageLayout, final_layout: vk::ImageLayout) -> Self {
        self.initial_layout = initial_layout;
        self.final_layout = final_layout;
        self
    }
}

/// graph 中的一个 pass，编译为 render pass 中的一个 subpass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassDesc {
    /// 依赖的 pass，只能指向之前的 pass
    pub dependencies: Vec<usize>,
    pub color: Vec<usize>,
    pub input: Vec<usize>,
    pub depth_stencil: Option<usize>,
    /// 执行时调用的具名函数
    pub function: Option<String>,
}
// builder
impl PassDesc {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn color(mut self, attachments: &[usize]) -> Self {
        self.color = attachments.to_vec();
        self
    }

    #[inline]
    pub fn input(mut self, attachments: &[usize]) -> Self {
        self.input = attachments.to_vec();
        self
    }

    #[inline]
    pub fn depth_stencil(mut self, attachment: usize) -> Self {
        self.depth_stencil = Some(attachment);
        self
    }

    #[inline]
    pub fn depends_on(mut self, passes: &[usize]) -> Self {
        self.dependencies = passes.to_vec();
        self
    }

    #[inline]
    pub fn function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }
}

/// 一个渲染器的完整输出描述
#[derive(Clone, Debug, PartialEq)]
pub struct GraphDescription {
    pub name: String,
    pub attachments: Vec<AttachmentDesc>,
    pub passes: Vec<PassDesc>,
}
impl GraphDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attachments: vec![],
            passes: vec![],
        }
    }

    #[inline]
    pub fn attachment(mut self, attachment: AttachmentDesc) -> Self {
        self.attachments.push(attachment);
        self
    }

    #[inline]
    pub fn pass(mut self, pass: PassDesc) -> Self {
        self.passes.push(pass);
        self
    }

    /// 至少有一个 pass；检查所有的索引：attachment 在范围内，依赖只能指向之前的 pass
    pub fn validate(&self) -> RenderResult<()> {
        if self.passes.is_empty() {
            return Err(RenderError::EmptyGraph {
                graph: self.name.clone(),
            });
        }
        let attachment_count = self.attachments.len();
        for (pass_index, pass) in self.passes.iter().enumerate() {
            let mut attachments = pass.color.iter().chain(pass.input.iter()).chain(pass.depth_stencil.iter());
            if let Some(&attachment) = attachments.find(|&&a| a >= attachment_count) {
                return Err(RenderError::InvalidAttachmentIndex {
                    graph: self.name.clone(),
                    pass: pass_index,
                    attachment,
                });
            }
            if let Some(&dependency) = pass.dependencies.iter().find(|&&d| d >= pass_index) {
                return Err(RenderError::InvalidPassIndex {
                    graph: self.name.clone(),
                    pass: pass_index,
                    dependency,
                });
            }
        }
        Ok(())
    }

    /// 按 attachment 顺序排列的清除值，未指定的为 0
    #[inline]
    pub fn clear_values(&self) -> Vec<vk::ClearValue> {
        self.attachments
            .iter()
            .map(|a| a.clear.unwrap_or(ClearValue::Color([0.0; 4])).to_vk())
            .collect()
    }
}
