use ash::vk;

use crate::backend::{AcquireOutcome, GfxBackend, GfxSwapchainDesc, PresentOutcome};
use crate::error::GfxResult;
use crate::format::infer_image_aspect;

/// 可呈现的 image 链：swapchain + images + image views
///
/// 在窗口尺寸变化或驱动报告 out of date 时通过 [`PresentableSurface::recreate`] 重建，
/// 每次重建 `generation` 加一
pub struct PresentableSurface {
    swapchain: vk::SwapchainKHR,

    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    /// 最近一次 acquire 得到的 index
    current_image_index: Option<u32>,

    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,

    generation: u64,
}

struct ImageChain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    extent: vk::Extent2D,
}

// new & init
impl PresentableSurface {
    pub fn new(
        device: &dyn GfxBackend,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        window_physical_extent: vk::Extent2D,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("PresentableSurface::new");

        let chain = Self::create_chain(
            device,
            surface_format,
            present_mode,
            window_physical_extent,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Self {
            swapchain: chain.swapchain,
            images: chain.images,
            image_views: chain.image_views,
            current_image_index: None,
            surface_format,
            present_mode,
            extent: chain.extent,
            generation: 0,
        })
    }

    fn create_chain(
        device: &dyn GfxBackend,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        window_physical_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> GfxResult<ImageChain> {
        let surface_capabilities = device.surface_capabilities()?;

        // 确定 window 的 extent 尺寸
        // 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
        let extent = Self::calculate_swapchain_extent(&surface_capabilities, window_physical_extent);
        log::info!(
            "create swapchain:
            surface current extent: {}x{}, min extent: {}x{}, max extent: {}x{}
            window physical extent: {}x{}
            final swapchain extent: {}x{}",
            surface_capabilities.current_extent.width,
            surface_capabilities.current_extent.height,
            surface_capabilities.min_image_extent.width,
            surface_capabilities.min_image_extent.height,
            surface_capabilities.max_image_extent.width,
            surface_capabilities.max_image_extent.height,
            window_physical_extent.width,
            window_physical_extent.height,
            extent.width,
            extent.height
        );

        let created = device.create_swapchain(&GfxSwapchainDesc {
            surface_format,
            present_mode,
            extent,
            min_image_count: Self::calculate_image_count(&surface_capabilities),
            pre_transform: surface_capabilities.current_transform,
            old_swapchain,
        })?;

        let aspect = infer_image_aspect(surface_format.format);
        let mut image_views = Vec::with_capacity(created.images.len());
        for (index, image) in created.images.iter().enumerate() {
            match device.create_image_view(*image, surface_format.format, aspect, &format!("swapchain-{}", index)) {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    image_views.iter().for_each(|view| device.destroy_image_view(*view));
                    device.destroy_swapchain(created.swapchain);
                    return Err(e);
                }
            }
        }

        Ok(ImageChain {
            swapchain: created.swapchain,
            images: created.images,
            image_views,
            extent,
        })
    }
}

// getters
impl PresentableSurface {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    #[inline]
    pub fn image_view(&self, image_index: usize) -> Option<vk::ImageView> {
        self.image_views.get(image_index).copied()
    }

    #[inline]
    pub fn current_image_index(&self) -> Option<u32> {
        self.current_image_index
    }

    /// 每次重建加一，用于判断 image view 是否过期
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// update
impl PresentableSurface {
    /// 使用当前的 swapchain 作为 hint 重建 image 链，然后销毁旧的 image 链
    ///
    /// 调用者需要保证 device 已经 idle
    pub fn recreate(&mut self, device: &dyn GfxBackend, window_physical_extent: vk::Extent2D) -> GfxResult<()> {
        let _span = tracy_client::span!("PresentableSurface::recreate");

        let chain = Self::create_chain(
            device,
            self.surface_format,
            self.present_mode,
            window_physical_extent,
            self.swapchain,
        )?;

        let old_views = std::mem::replace(&mut self.image_views, chain.image_views);
        old_views.into_iter().for_each(|view| device.destroy_image_view(view));
        let old_swapchain = std::mem::replace(&mut self.swapchain, chain.swapchain);
        device.destroy_swapchain(old_swapchain);

        self.images = chain.images;
        self.extent = chain.extent;
        self.current_image_index = None;
        self.generation += 1;

        log::info!(
            "swapchain recreated, generation: {}, extent: {}x{}, images: {}",
            self.generation,
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
        Ok(())
    }

    /// timeout: nano seconds
    #[inline]
    pub fn acquire_next_image(
        &mut self,
        device: &dyn GfxBackend,
        semaphore: vk::Semaphore,
        timeout: u64,
    ) -> GfxResult<AcquireOutcome> {
        let outcome = device.acquire_next_image(self.swapchain, semaphore, timeout)?;
        match outcome {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                }
                self.current_image_index = Some(image_index);
            }
            AcquireOutcome::OutOfDate => {
                log::warn!("swapchain is out of date when acquire next image");
                self.current_image_index = None;
            }
        }
        Ok(outcome)
    }

    #[inline]
    pub fn present_image(
        &self,
        device: &dyn GfxBackend,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> GfxResult<PresentOutcome> {
        let outcome = device.queue_present(self.swapchain, image_index, wait_semaphore)?;
        match outcome {
            PresentOutcome::Optimal => {}
            PresentOutcome::Suboptimal => {
                log::warn!("swapchain present image index {} is not optimal", image_index);
            }
            PresentOutcome::OutOfDate => {
                log::warn!("swapchain is out of date when present image");
            }
        }
        Ok(outcome)
    }
}

// tools
impl PresentableSurface {
    /// 确定 window 的 extent 尺寸
    ///
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == 0xFFFFFFFF || surface_extent.height == 0xFFFFFFFF {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }

    /// max_image_count == 0，表示不限制 image 数量
    pub fn calculate_image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
        if surface_capabilities.max_image_count == 0 {
            surface_capabilities.min_image_count + 1
        } else {
            u32::min(surface_capabilities.max_image_count, surface_capabilities.min_image_count + 1)
        }
    }
}

// destroy
impl PresentableSurface {
    pub fn destroy(mut self, device: &dyn GfxBackend) {
        self.image_views.drain(..).for_each(|view| device.destroy_image_view(view));
        device.destroy_swapchain(self.swapchain);
        self.swapchain = vk::SwapchainKHR::null();
    }
}
