use std::collections::HashMap;
use std::rc::Rc;

use ash::vk;
use slotmap::{SlotMap, new_key_type};
use vela_gfx::backend::{GfxBackend, GfxImageDesc};
use vela_gfx::format::{infer_image_aspect, is_depth_format};
use vela_gfx::swapchain::presentable_surface::PresentableSurface;
use vela_render_interface::error::{RenderError, RenderResult};
use vela_render_interface::target_desc::{TargetDescription, TargetUsage};

new_key_type! {
    pub struct TargetHandle;
}

/// 没有显式指定 format 的 depth-stencil target 使用的格式
pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

pub enum TargetBacking {
    /// 每个 image index 使用 surface 对应的 image view
    Surface,
    Offscreen { image: vk::Image, view: vk::ImageView },
}

pub struct CachedTarget {
    name: String,
    desc: TargetDescription,
    format: vk::Format,
    extent: vk::Extent2D,
    backing: TargetBacking,
}
// getters
impl CachedTarget {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn desc(&self) -> &TargetDescription {
        &self.desc
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn backing(&self) -> &TargetBacking {
        &self.backing
    }
}

/// 具名 target 的缓存
///
/// target 在第一次使用时创建，之后按名字复用。
/// 已经存在的 target 如果收到了不同的描述，保留旧的并给出警告
pub struct TargetCache {
    device: Rc<dyn GfxBackend>,

    targets: SlotMap<TargetHandle, CachedTarget>,
    lookup: HashMap<String, TargetHandle>,

    destroyed: bool,
}

// new & init
impl TargetCache {
    pub fn new(device: Rc<dyn GfxBackend>) -> Self {
        Self {
            device,
            targets: SlotMap::with_key(),
            lookup: HashMap::new(),
            destroyed: false,
        }
    }
}

// getters
impl TargetCache {
    #[inline]
    pub fn get(&self, handle: TargetHandle) -> Option<&CachedTarget> {
        self.targets.get(handle)
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<TargetHandle> {
        self.lookup.get(name).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// target 在 image_index 下对应的 image view
    pub fn view(
        &self,
        handle: TargetHandle,
        image_index: usize,
        surface: &PresentableSurface,
    ) -> RenderResult<vk::ImageView> {
        let target = self.targets.get(handle).ok_or_else(|| RenderError::MissingTarget {
            target: format!("{:?}", handle),
        })?;
        match &target.backing {
            TargetBacking::Surface => surface.image_view(image_index).ok_or(RenderError::InvalidImageIndex {
                image_index: image_index as u32,
                image_count: surface.image_count(),
            }),
            TargetBacking::Offscreen { view, .. } => Ok(*view),
        }
    }
}

// update
impl TargetCache {
    /// 按名字解析 target，不存在时创建
    pub fn resolve(
        &mut self,
        name: &str,
        desc: &TargetDescription,
        surface: &PresentableSurface,
    ) -> RenderResult<TargetHandle> {
        if let Some(&handle) = self.lookup.get(name) {
            if let Some(existing) = self.targets.get(handle) {
                if existing.desc != *desc {
                    log::warn!(
                        "target `{}` is already created as {:?}, requested {:?}; keep the existing one",
                        name,
                        existing.desc,
                        desc
                    );
                }
                return Ok(handle);
            }
        }

        let target = self.create_target(name, desc, surface)?;
        let handle = self.targets.insert(target);
        self.lookup.insert(name.to_string(), handle);
        Ok(handle)
    }

    fn create_target(
        &self,
        name: &str,
        desc: &TargetDescription,
        surface: &PresentableSurface,
    ) -> RenderResult<CachedTarget> {
        match desc {
            TargetDescription::Surface => Ok(CachedTarget {
                name: name.to_string(),
                desc: desc.clone(),
                format: surface.format(),
                extent: surface.extent(),
                backing: TargetBacking::Surface,
            }),
            TargetDescription::Image { usage, format, size } => {
                let format = format.unwrap_or(if usage.contains(TargetUsage::DEPTH_STENCIL) {
                    DEFAULT_DEPTH_FORMAT
                } else {
                    surface.format()
                });
                let extent = size.map_or(surface.extent(), |(width, height)| vk::Extent2D { width, height });

                let image = self.device.create_image(&GfxImageDesc {
                    format,
                    extent,
                    usage: usage.to_vk(),
                    debug_name: name.to_string(),
                })?;
                let view = match self.device.create_image_view(image, format, infer_image_aspect(format), name) {
                    Ok(view) => view,
                    Err(e) => {
                        self.device.destroy_image(image);
                        return Err(e.into());
                    }
                };
                log::debug!(
                    "target `{}` created: {:?} {}x{}, depth: {}",
                    name,
                    format,
                    extent.width,
                    extent.height,
                    is_depth_format(format)
                );

                Ok(CachedTarget {
                    name: name.to_string(),
                    desc: desc.clone(),
                    format,
                    extent,
                    backing: TargetBacking::Offscreen { image, view },
                })
            }
        }
    }

    /// surface 重建时调用：移除所有随 surface 变化的 target，之后按需重建
    pub fn invalidate(&mut self) {
        let stale = self.targets.iter().filter(|(_, t)| t.desc.follows_surface()).map(|(h, _)| h).collect::<Vec<_>>();
        for handle in stale {
            if let Some(target) = self.targets.remove(handle) {
                self.lookup.remove(&target.name);
                self.destroy_target(target);
            }
        }
    }

    fn destroy_target(&self, target: CachedTarget) {
        if let TargetBacking::Offscreen { image, view } = target.backing {
            self.device.destroy_image_view(view);
            self.device.destroy_image(image);
        }
    }
}

// destroy
impl TargetCache {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    pub fn destroy_mut(&mut self) {
        let _span = tracy_client::span!("TargetCache::destroy");
        let targets = std::mem::take(&mut self.targets);
        for (_, target) in targets {
            self.destroy_target(target);
        }
        self.lookup.clear();
        self.destroyed = true;
    }
}
impl Drop for TargetCache {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "TargetCache dropped without destroy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    #[test]
    fn test_resolve_is_cached_by_name() {
        let env = TestEnv::new();
        let mut cache = TargetCache::new(env.device());

        let desc = TargetDescription::image(TargetUsage::COLOR);
        let a = cache.resolve("albedo", &desc, &env.surface).unwrap();
        let b = cache.resolve("albedo", &desc, &env.surface).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(a).unwrap().format(), env.surface.format());

        cache.destroy();
        env.destroy();
    }

    #[test]
    fn test_mismatch_keeps_existing() {
        let env = TestEnv::new();
        let mut cache = TargetCache::new(env.device());

        let a = cache.resolve("albedo", &TargetDescription::image(TargetUsage::COLOR), &env.surface).unwrap();
        let b = cache
            .resolve(
                "albedo",
                &TargetDescription::Image {
                    usage: TargetUsage::COLOR,
                    format: Some(vk::Format::R16G16B16A16_SFLOAT),
                    size: None,
                },
                &env.surface,
            )
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.get(b).unwrap().format(), env.surface.format());

        cache.destroy();
        env.destroy();
    }

    #[test]
    fn test_depth_target_default_format() {
        let env = TestEnv::new();
        let mut cache = TargetCache::new(env.device());

        let depth = cache.resolve("depth", &TargetDescription::image(TargetUsage::DEPTH_STENCIL), &env.surface).unwrap();
        assert_eq!(cache.get(depth).unwrap().format(), DEFAULT_DEPTH_FORMAT);

        cache.destroy();
        env.destroy();
    }

    #[test]
    fn test_surface_target_view_per_image() {
        let env = TestEnv::new();
        let mut cache = TargetCache::new(env.device());

        let surface = cache.resolve("surface", &TargetDescription::Surface, &env.surface).unwrap();
        assert_eq!(cache.view(surface, 1, &env.surface).unwrap(), env.surface.image_views()[1]);
        assert!(matches!(
            cache.view(surface, 9, &env.surface),
            Err(RenderError::InvalidImageIndex { image_index: 9, .. })
        ));

        cache.destroy();
        env.destroy();
    }

    #[test]
    fn test_invalidate_keeps_fixed_size_targets() {
        let env = TestEnv::new();
        let mut cache = TargetCache::new(env.device());

        let fixed = TargetDescription::Image {
            usage: TargetUsage::COLOR,
            format: None,
            size: Some((128, 128)),
        };
        let shadow = cache.resolve("shadow", &fixed, &env.surface).unwrap();
        cache.resolve("albedo", &TargetDescription::image(TargetUsage::COLOR), &env.surface).unwrap();

        let live_before = env.backend.live_object_count();
        cache.invalidate();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.find("shadow"), Some(shadow));
        assert_eq!(cache.find("albedo"), None);
        // albedo 的 image 与 view 被销毁
        assert_eq!(env.backend.live_object_count(), live_before - 2);

        cache.destroy();
        env.destroy();
    }
}
