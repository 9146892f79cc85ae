use std::path::{Path, PathBuf};

use ash::vk;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// 渲染器默认配置
pub struct DefaultRendererSettings;
impl DefaultRendererSettings {
    pub const DEFAULT_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        // shader 输出会被自动改变： liner -> sRGB
        format: vk::Format::R8G8B8A8_SRGB,
        // 通知 OS，将数值按照 sRGB 空间进行处理和显示
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    pub const DEFAULT_PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::FIFO;
    pub const FRAMES_IN_FLIGHT: usize = 2;
    /// 足够大，实际等价于无限等待；真正超时视为致命错误
    pub const FENCE_TIMEOUT_MS: u64 = 60_000;
    pub const TRANSIENT_DESCRIPTOR_SETS_PER_POOL: u32 = 64;
    pub const PERSISTENT_DESCRIPTOR_SETS_PER_POOL: u32 = 256;
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresentModeSetting {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}
impl PresentModeSetting {
    #[inline]
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// color space 固定为 SRGB_NONLINEAR
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceFormatSetting {
    #[default]
    Rgba8Srgb,
    Bgra8Srgb,
    Rgba8Unorm,
    Bgra8Unorm,
}
impl SurfaceFormatSetting {
    pub fn to_vk(self) -> vk::SurfaceFormatKHR {
        let format = match self {
            Self::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            Self::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            Self::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            Self::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        };
        vk::SurfaceFormatKHR {
            format,
            color_space: DefaultRendererSettings::DEFAULT_SURFACE_FORMAT.color_space,
        }
    }
}

/// 帧执行核心的配置，从 toml 加载
///
/// ```toml
/// frames_in_flight = 3
/// present_mode = "mailbox"
/// pipeline_cache_path = "target/pipeline.cache"
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RendererSettings {
    /// 至少为 2
    pub frames_in_flight: usize,
    pub present_mode: PresentModeSetting,
    pub surface_format: SurfaceFormatSetting,
    pub fence_timeout_ms: u64,
    /// pipeline cache 的磁盘文件，启动时读取，关闭时写回
    pub pipeline_cache_path: Option<PathBuf>,
    pub transient_descriptor_sets_per_pool: u32,
    pub persistent_descriptor_sets_per_pool: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: DefaultRendererSettings::FRAMES_IN_FLIGHT,
            present_mode: PresentModeSetting::default(),
            surface_format: SurfaceFormatSetting::default(),
            fence_timeout_ms: DefaultRendererSettings::FENCE_TIMEOUT_MS,
            pipeline_cache_path: None,
            transient_descriptor_sets_per_pool: DefaultRendererSettings::TRANSIENT_DESCRIPTOR_SETS_PER_POOL,
            persistent_descriptor_sets_per_pool: DefaultRendererSettings::PERSISTENT_DESCRIPTOR_SETS_PER_POOL,
        }
    }
}

// new & init
impl RendererSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&text)?;
        log::info!("renderer settings loaded from {:?}", path);
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.frames_in_flight < 2 {
            return Err(SettingsError::Invalid(format!(
                "frames_in_flight must be at least 2, got {}",
                self.frames_in_flight
            )));
        }
        if self.fence_timeout_ms == 0 {
            return Err(SettingsError::Invalid("fence_timeout_ms must be positive".to_string()));
        }
        if self.transient_descriptor_sets_per_pool == 0 || self.persistent_descriptor_sets_per_pool == 0 {
            return Err(SettingsError::Invalid("descriptor pools must hold at least one set".to_string()));
        }
        Ok(())
    }
}

// getters
impl RendererSettings {
    #[inline]
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms.saturating_mul(1_000_000)
    }
}
