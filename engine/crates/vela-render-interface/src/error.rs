use std::path::PathBuf;

use ash::vk;
use thiserror::Error;
use vela_gfx::error::GfxError;

use crate::pipeline_desc::ObjectSlotKind;

/// 帧执行核心的错误
///
/// 除了 [`RenderError::Gfx`] 以外都是配置错误：携带足够定位问题的名字/索引，不会被重试
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("target `{target}` is not declared")]
    MissingTarget { target: String },

    #[error("pipeline `{pipeline}` is not registered")]
    MissingPipeline { pipeline: String },

    #[error("graph `{graph}` has no compiled render pass")]
    MissingGraph { graph: String },

    #[error("pipeline `{pipeline}` declares {expected} object slots but {actual} objects were bound")]
    BindingCountMismatch {
        pipeline: String,
        expected: usize,
        actual: usize,
    },

    #[error("pipeline `{pipeline}` slot {slot}: {images} images but {samplers} samplers")]
    SamplerImageLengthMismatch {
        pipeline: String,
        slot: usize,
        images: usize,
        samplers: usize,
    },

    #[error("pipeline `{pipeline}` slot {slot}: declares {expected} descriptors but {actual} were bound")]
    BindingArrayLengthMismatch {
        pipeline: String,
        slot: usize,
        expected: u32,
        actual: usize,
    },

    #[error("pipeline `{pipeline}` slot {slot}: expects {expected:?}, got {actual:?}")]
    BindingKindMismatch {
        pipeline: String,
        slot: usize,
        expected: ObjectSlotKind,
        actual: ObjectSlotKind,
    },

    #[error("pipeline `{pipeline}`: unsupported vertex format {format:?} at location {location}")]
    UnsupportedFormat {
        pipeline: String,
        location: u32,
        format: vk::Format,
    },

    #[error("draw issued without a bound pipeline")]
    NoPipelineBound,

    #[error(
        "pipeline `{pipeline}` is bound to {bound_render_pass:?}/{bound_subpass}, \
         cannot rebind to {render_pass:?}/{subpass}"
    )]
    PipelineAlreadyBound {
        pipeline: String,
        bound_render_pass: vk::RenderPass,
        bound_subpass: u32,
        render_pass: vk::RenderPass,
        subpass: u32,
    },

    #[error("image index {image_index} is out of range, the surface has {image_count} images")]
    InvalidImageIndex { image_index: u32, image_count: usize },

    #[error("graph `{graph}` pass {pass}: dependency {dependency} is not a prior pass")]
    InvalidPassIndex {
        graph: String,
        pass: usize,
        dependency: usize,
    },

    #[error("graph `{graph}` pass {pass}: attachment {attachment} is out of range")]
    InvalidAttachmentIndex {
        graph: String,
        pass: usize,
        attachment: usize,
    },

    #[error("graph `{graph}` has no pass")]
    EmptyGraph { graph: String },

    /// 设备侧的失败，包括 fence 超时
    #[error(transparent)]
    Gfx(#[from] GfxError),
}

impl RenderError {
    #[inline]
    pub fn is_configuration(&self) -> bool {
        !matches!(self, RenderError::Gfx(_))
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// 配置文件的错误
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}
