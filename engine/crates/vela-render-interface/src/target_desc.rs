use std::collections::HashMap;

use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// 离屏 target 的用途
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TargetUsage: u32 {
        const COLOR = 1 << 0;
        const INPUT = 1 << 1;
        const DEPTH_STENCIL = 1 << 2;
    }
}
impl TargetUsage {
    pub fn to_vk(self) -> vk::ImageUsageFlags {
        let mut usage = vk::ImageUsageFlags::empty();
        if self.contains(Self::COLOR) {
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED;
        }
        if self.contains(Self::INPUT) {
            usage |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
        }
        if self.contains(Self::DEPTH_STENCIL) {
            usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        usage
    }
}

/// 具名的逻辑渲染目标
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetDescription {
    /// 可呈现的 surface，每个 image index 对应一个 image view
    Surface,
    /// 离屏 image；没有指定 format/size 时使用 surface 当前的 format/size
    Image {
        usage: TargetUsage,
        format: Option<vk::Format>,
        size: Option<(u32, u32)>,
    },
}
impl TargetDescription {
    #[inline]
    pub fn image(usage: TargetUsage) -> Self {
        Self::Image {
            usage,
            format: None,
            size: None,
        }
    }

    /// 大小是否随 surface 变化
    #[inline]
    pub fn follows_surface(&self) -> bool {
        match self {
            Self::Surface => true,
            Self::Image { size, .. } => size.is_none(),
        }
    }
}

/// 一次 graph 执行所用到的 target 集合
#[derive(Clone, Debug, Default)]
pub struct RenderTargets {
    targets: HashMap<String, TargetDescription>,
}
impl RenderTargets {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with(mut self, name: impl Into<String>, desc: TargetDescription) -> Self {
        self.targets.insert(name.into(), desc);
        self
    }

    #[inline]
    pub fn with_surface(self, name: impl Into<String>) -> Self {
        self.with(name, TargetDescription::Surface)
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&TargetDescription> {
        self.targets.get(name)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TargetDescription)> {
        self.targets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_to_vk() {
        let usage = (TargetUsage::COLOR | TargetUsage::INPUT).to_vk();
        assert!(usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(usage.contains(vk::ImageUsageFlags::INPUT_ATTACHMENT));
        assert!(!usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
    }

    #[test]
    fn test_follows_surface() {
        assert!(TargetDescription::Surface.follows_surface());
        assert!(TargetDescription::image(TargetUsage::COLOR).follows_surface());
        let fixed = TargetDescription::Image {
            usage: TargetUsage::COLOR,
            format: None,
            size: Some((256, 256)),
        };
        assert!(!fixed.follows_surface());
    }
}
