use ash::vk;
use vela_render_interface::error::{RenderError, RenderResult};

use crate::pass_cache::SubpassInfo;
use crate::pipeline_cache::CompiledPipeline;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineSlotState {
    Unbound,
    Bound {
        render_pass: vk::RenderPass,
        subpass: u32,
        pipeline: CompiledPipeline,
    },
}

/// renderer 持有的 pipeline 句柄
///
/// 第一次使用时绑定到 (render pass, subpass)，之后只能在同一个 subpass 中使用。
/// 所属的 render pass 被 invalidate 后回到 Unbound
#[derive(Debug)]
pub struct PipelineSlot {
    name: String,
    state: PipelineSlotState,
}
// new & init
impl PipelineSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: PipelineSlotState::Unbound,
        }
    }
}
// getters
impl PipelineSlot {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn state(&self) -> PipelineSlotState {
        self.state
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        matches!(self.state, PipelineSlotState::Bound { .. })
    }

    #[inline]
    pub fn pipeline(&self) -> Option<CompiledPipeline> {
        match self.state {
            PipelineSlotState::Unbound => None,
            PipelineSlotState::Bound { pipeline, .. } => Some(pipeline),
        }
    }
}
// update
impl PipelineSlot {
    /// Unbound 时通过 `compile` 得到 pipeline 并绑定；
    /// 已绑定到同一个 subpass 时直接返回；绑定到其他 subpass 时报错
    pub fn bind(
        &mut self,
        subpass: &SubpassInfo,
        compile: impl FnOnce(&str, &SubpassInfo) -> RenderResult<CompiledPipeline>,
    ) -> RenderResult<CompiledPipeline> {
        match self.state {
            PipelineSlotState::Bound {
                render_pass,
                subpass: bound_subpass,
                pipeline,
            } => {
                if render_pass == subpass.render_pass && bound_subpass == subpass.subpass {
                    Ok(pipeline)
                } else {
                    Err(RenderError::PipelineAlreadyBound {
                        pipeline: self.name.clone(),
                        bound_render_pass: render_pass,
                        bound_subpass,
                        render_pass: subpass.render_pass,
                        subpass: subpass.subpass,
                    })
                }
            }
            PipelineSlotState::Unbound => {
                let pipeline = compile(&self.name, subpass)?;
                self.state = PipelineSlotState::Bound {
                    render_pass: subpass.render_pass,
                    subpass: subpass.subpass,
                    pipeline,
                };
                Ok(pipeline)
            }
        }
    }

    pub fn reset(&mut self) {
        if self.is_bound() {
            log::debug!("pipeline slot `{}` unbound", self.name);
        }
        self.state = PipelineSlotState::Unbound;
    }
}
