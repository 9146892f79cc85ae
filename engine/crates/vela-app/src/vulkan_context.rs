use std::ffi::{CStr, CString, c_char};
use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use vela_gfx::vulkan::{VulkanBackend, VulkanBackendCreateInfo};

/// [`VulkanBackend`] 之外的 Vulkan 对象：instance、device、surface
///
/// 销毁顺序：backend（内部的 allocator）-> device -> surface -> instance
pub struct VulkanContext {
    backend: Rc<VulkanBackend>,

    /// 仅仅是函数指针，需要保持 loader 存活
    _entry: ash::Entry,
    instance: ash::Instance,
    device: ash::Device,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

// new & init
impl VulkanContext {
    pub fn new(
        app_name: &str,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("VulkanContext::new");

        let entry = unsafe { ash::Entry::load()? };

        // 追加 window system 需要的 extension
        let mut instance_exts: Vec<&'static CStr> = ash_window::enumerate_required_extensions(raw_display_handle)?
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(*ext) })
            .collect();
        let enable_debug_names =
            cfg!(debug_assertions) && Self::instance_ext_supported(&entry, ash::ext::debug_utils::NAME)?;
        if enable_debug_names {
            instance_exts.push(ash::ext::debug_utils::NAME);
        }
        let instance = Self::create_instance(&entry, app_name, &instance_exts)?;

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let surface =
            unsafe { ash_window::create_surface(&entry, &instance, raw_display_handle, raw_window_handle, None)? };

        let (physical_device, queue_family_index) = Self::pick_physical_device(&instance, &surface_loader, surface)?;
        let device = Self::create_device(&instance, physical_device, queue_family_index)?;
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let backend = VulkanBackend::new(VulkanBackendCreateInfo {
            instance: &instance,
            physical_device,
            device: device.clone(),
            queue_family_index,
            queue,
            surface,
            surface_loader: surface_loader.clone(),
            enable_debug_names,
        })?;

        Ok(Self {
            backend: Rc::new(backend),
            _entry: entry,
            instance,
            device,
            surface,
            surface_loader,
        })
    }

    fn instance_ext_supported(entry: &ash::Entry, ext: &CStr) -> anyhow::Result<bool> {
        let all_ext_props = unsafe { entry.enumerate_instance_extension_properties(None)? };
        Ok(all_ext_props
            .iter()
            .any(|supported_ext| ext == unsafe { CStr::from_ptr(supported_ext.extension_name.as_ptr()) }))
    }

    fn create_instance(entry: &ash::Entry, app_name: &str, exts: &[&'static CStr]) -> anyhow::Result<ash::Instance> {
        let app_name = CString::new(app_name)?;
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 版本过低时，有些函数无法正确加载
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"vela")
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let mut exts_str = String::new();
        for ext in exts {
            exts_str.push_str(&format!("\n\t{:?}", ext));
        }
        log::info!("instance extensions: {}", exts_str);

        // validation layer 由 vulkan configurator 控制
        let ext_ptrs: Vec<*const c_char> = exts.iter().map(|ext| ext.as_ptr()).collect();
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&ext_ptrs);

        Ok(unsafe { entry.create_instance(&instance_ci, None)? })
    }

    /// 选择支持 graphics 且可以 present 到 surface 的 queue family，优先独显
    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> anyhow::Result<(vk::PhysicalDevice, u32)> {
        let mut candidates = Vec::new();
        for physical_device in unsafe { instance.enumerate_physical_devices()? } {
            let queue_families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
            for (index, family) in queue_families.iter().enumerate() {
                let index = index as u32;
                if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                    continue;
                }
                let present = unsafe {
                    surface_loader.get_physical_device_surface_support(physical_device, index, surface)?
                };
                if present {
                    candidates.push((physical_device, index));
                    break;
                }
            }
        }

        let discrete = candidates.iter().copied().find(|(physical_device, _)| {
            let props = unsafe { instance.get_physical_device_properties(*physical_device) };
            props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
        });
        let (physical_device, queue_family_index) =
            discrete.or(candidates.first().copied()).context("no gpu can present to the window surface")?;

        let props = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) };
        log::info!("pick gpu {:?}, queue family: {}", device_name, queue_family_index);

        Ok((physical_device, queue_family_index))
    }

    fn create_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> anyhow::Result<ash::Device> {
        let _span = tracy_client::span!("VulkanContext::create_device");

        let priorities = [1.0];
        let queue_ci = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&priorities);
        let device_exts = [ash::khr::swapchain::NAME.as_ptr()];
        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_ci))
            .enabled_extension_names(&device_exts);

        Ok(unsafe { instance.create_device(physical_device, &device_ci, None)? })
    }
}

// getters
impl VulkanContext {
    #[inline]
    pub fn backend(&self) -> &Rc<VulkanBackend> {
        &self.backend
    }
}

// destroy
impl VulkanContext {
    /// 调用前需要销毁所有持有 backend 的对象（例如 `FrameScheduler`）
    pub fn destroy(self) {
        let _span = tracy_client::span!("VulkanContext::destroy");

        let Self {
            backend,
            _entry,
            instance,
            device,
            surface,
            surface_loader,
        } = self;

        // allocator 必须先于 device 释放；backend 仍被共享时只能泄漏 device
        if let Err(backend) = Rc::try_unwrap(backend).map(drop) {
            log::error!(
                "vulkan backend still shared by {} owners, device leaked",
                Rc::strong_count(&backend) - 1
            );
            return;
        }

        log::info!("destroying device");
        unsafe {
            device.destroy_device(None);
            surface_loader.destroy_surface(surface, None);
            instance.destroy_instance(None);
        }
    }
}
