use std::collections::HashMap;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use slotmap::{SlotMap, new_key_type};
use vela_gfx::backend::{GfxBackend, GfxDescriptorBinding, GfxGraphicsPipelineDesc, GfxShaderStage};
use vela_render_interface::error::{RenderError, RenderResult};
use vela_render_interface::pipeline_desc::PipelineDescription;

use crate::pass_cache::SubpassInfo;

new_key_type! {
    pub struct PipelineTemplateHandle;
}

/// 注册到 cache 中的 pipeline 模板
///
/// descriptor set layout 与 pipeline layout 在注册时创建一次
pub struct PipelineTemplate {
    desc: PipelineDescription,

    set_layout: vk::DescriptorSetLayout,
    layout: vk::PipelineLayout,

    stages: Vec<GfxShaderStage>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    push_constant_stages: vk::ShaderStageFlags,
}
// getters
impl PipelineTemplate {
    #[inline]
    pub fn desc(&self) -> &PipelineDescription {
        &self.desc
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.desc.name
    }

    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    #[inline]
    pub fn vertex_attributes(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.vertex_attributes
    }

    #[inline]
    pub fn push_constant_stages(&self) -> vk::ShaderStageFlags {
        self.push_constant_stages
    }

    #[inline]
    pub fn has_objects(&self) -> bool {
        !self.desc.object_slots.is_empty()
    }
}

/// 编译完成的 pipeline，绑定到特定的 render pass 与 subpass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompiledPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub template: PipelineTemplateHandle,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    name: String,
    render_pass: vk::RenderPass,
    subpass: u32,
}

/// pipeline 缓存
///
/// 同一个模板在不同的 (render pass, subpass) 下会编译出不同的 pipeline
pub struct PipelineCache {
    device: Rc<dyn GfxBackend>,

    /// 驱动侧的 pipeline cache，可以持久化到磁盘
    vk_cache: vk::PipelineCache,
    blob_path: Option<PathBuf>,

    templates: SlotMap<PipelineTemplateHandle, PipelineTemplate>,
    names: HashMap<String, PipelineTemplateHandle>,

    pipelines: HashMap<PipelineKey, CompiledPipeline>,

    destroyed: bool,
}

// new & init
impl PipelineCache {
    /// blob_path 指向的文件不存在时从空的 cache 开始；读取失败只给出警告
    pub fn new(device: Rc<dyn GfxBackend>, blob_path: Option<PathBuf>) -> RenderResult<Self> {
        let initial_data = blob_path.as_deref().map(Self::read_blob).unwrap_or_default();

        let vk_cache = match device.create_pipeline_cache(&initial_data) {
            Ok(cache) => cache,
            Err(e) if !initial_data.is_empty() => {
                log::warn!("pipeline cache blob rejected by the driver ({}), start from an empty cache", e);
                device.create_pipeline_cache(&[])?
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            device,
            vk_cache,
            blob_path,
            templates: SlotMap::with_key(),
            names: HashMap::new(),
            pipelines: HashMap::new(),
            destroyed: false,
        })
    }

    fn read_blob(path: &Path) -> Vec<u8> {
        match std::fs::read(path) {
            Ok(data) => {
                log::info!("pipeline cache blob loaded from {:?}, {} bytes", path, data.len());
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no pipeline cache blob at {:?}", path);
                vec![]
            }
            Err(e) => {
                log::warn!("failed to read pipeline cache blob {:?}: {}", path, e);
                vec![]
            }
        }
    }
}

// getters
impl PipelineCache {
    #[inline]
    pub fn find(&self, name: &str) -> Option<PipelineTemplateHandle> {
        self.names.get(name).copied()
    }

    #[inline]
    pub fn template(&self, handle: PipelineTemplateHandle) -> Option<&PipelineTemplate> {
        self.templates.get(handle)
    }

    #[inline]
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    #[inline]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// pipeline 是否仍然在 cache 中（其 render pass 没有被销毁）
    #[inline]
    pub fn is_live(&self, pipeline: &CompiledPipeline) -> bool {
        self.pipelines.values().any(|p| p == pipeline)
    }
}

// update
impl PipelineCache {
    /// 注册 pipeline 模板，创建 descriptor set layout 与 pipeline layout
    ///
    /// 模板不可修改：同名的模板已经存在时保留旧的
    pub fn add_pipeline(&mut self, desc: PipelineDescription) -> RenderResult<PipelineTemplateHandle> {
        if let Some(&handle) = self.names.get(&desc.name) {
            log::warn!("pipeline `{}` is already registered, keep the existing template", desc.name);
            return Ok(handle);
        }

        // 先做所有可能失败的检查，再创建 GPU 对象
        let vertex_attributes = desc.expand_vertex_attributes()?;
        let vertex_bindings = desc.vk_vertex_bindings();
        let stages = desc
            .stages
            .iter()
            .map(|stage| {
                let entry_point = CString::new(stage.entry_point.as_str()).unwrap_or_else(|_| {
                    log::warn!("pipeline `{}`: invalid entry point {:?}, use `main`", desc.name, stage.entry_point);
                    c"main".to_owned()
                });
                GfxShaderStage {
                    stage: stage.stage,
                    module: stage.module,
                    entry_point,
                }
            })
            .collect_vec();

        let bindings = desc
            .object_slots
            .iter()
            .enumerate()
            .map(|(binding, slot)| GfxDescriptorBinding {
                binding: binding as u32,
                descriptor_type: slot.kind.descriptor_type(),
                count: slot.count,
                stages: slot.stages,
            })
            .collect_vec();
        let set_layout = self.device.create_descriptor_set_layout(&bindings)?;
        let layout = match self
            .device
            .create_pipeline_layout(std::slice::from_ref(&set_layout), &desc.vk_push_constant_ranges())
        {
            Ok(layout) => layout,
            Err(e) => {
                self.device.destroy_descriptor_set_layout(set_layout);
                return Err(e.into());
            }
        };

        let name = desc.name.clone();
        let handle = self.templates.insert(PipelineTemplate {
            push_constant_stages: desc.push_constant_stages(),
            desc,
            set_layout,
            layout,
            stages,
            vertex_bindings,
            vertex_attributes,
        });
        self.names.insert(name, handle);
        Ok(handle)
    }

    /// 获取 (name, render pass, subpass) 对应的 pipeline，不存在时编译
    pub fn get_pipeline(&mut self, name: &str, subpass: &SubpassInfo) -> RenderResult<CompiledPipeline> {
        let key = PipelineKey {
            name: name.to_string(),
            render_pass: subpass.render_pass,
            subpass: subpass.subpass,
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(*pipeline);
        }

        let handle = self.find(name).ok_or_else(|| RenderError::MissingPipeline {
            pipeline: name.to_string(),
        })?;
        let template = self.templates.get(handle).ok_or_else(|| RenderError::MissingPipeline {
            pipeline: name.to_string(),
        })?;

        let _span = tracy_client::span!("PipelineCache::compile");
        let pipeline = self.device.create_graphics_pipeline(&GfxGraphicsPipelineDesc {
            name,
            layout: template.layout,
            render_pass: subpass.render_pass,
            subpass: subpass.subpass,
            color_attachment_count: subpass.color_attachment_count,
            has_depth_stencil: subpass.has_depth_stencil,
            stages: &template.stages,
            vertex_bindings: &template.vertex_bindings,
            vertex_attributes: &template.vertex_attributes,
            pipeline_cache: self.vk_cache,
        })?;
        log::debug!("pipeline `{}` compiled for {:?}/{}", name, subpass.render_pass, subpass.subpass);

        let compiled = CompiledPipeline {
            pipeline,
            layout: template.layout,
            template: handle,
            render_pass: subpass.render_pass,
            subpass: subpass.subpass,
        };
        self.pipelines.insert(key, compiled);
        Ok(compiled)
    }

    /// 销毁所有绑定到这些 render pass 的 pipeline，layout 保留
    pub fn evict_render_passes(&mut self, render_passes: &[vk::RenderPass]) {
        let device = &self.device;
        self.pipelines.retain(|_, compiled| {
            if render_passes.contains(&compiled.render_pass) {
                device.destroy_pipeline(compiled.pipeline);
                false
            } else {
                true
            }
        });
    }

    /// 将驱动的 pipeline cache 写回磁盘，失败只给出警告
    pub fn persist(&self) {
        let Some(path) = &self.blob_path else {
            return;
        };
        let data = match self.device.pipeline_cache_data(self.vk_cache) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("failed to read pipeline cache data: {}", e);
                return;
            }
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("failed to create directory for pipeline cache blob {:?}: {}", parent, e);
                return;
            }
        }
        match std::fs::write(path, &data) {
            Ok(()) => log::info!("pipeline cache blob written to {:?}, {} bytes", path, data.len()),
            Err(e) => log::warn!("failed to write pipeline cache blob {:?}: {}", path, e),
        }
    }
}

// destroy
impl PipelineCache {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    pub fn destroy_mut(&mut self) {
        let _span = tracy_client::span!("PipelineCache::destroy");
        for (_, compiled) in self.pipelines.drain() {
            self.device.destroy_pipeline(compiled.pipeline);
        }
        for (_, template) in self.templates.drain() {
            self.device.destroy_pipeline_layout(template.layout);
            self.device.destroy_descriptor_set_layout(template.set_layout);
        }
        self.names.clear();
        self.device.destroy_pipeline_cache(self.vk_cache);
        self.vk_cache = vk::PipelineCache::null();
        self.destroyed = true;
    }
}
impl Drop for PipelineCache {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "PipelineCache dropped without destroy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_EXTENT;
    use vela_gfx::headless::{HeadlessBackend, HeadlessCall};
    use vela_render_interface::pipeline_desc::{ObjectSlot, ObjectSlotKind, VertexAttribute};

    fn subpass(render_pass: vk::RenderPass, subpass: u32) -> SubpassInfo {
        SubpassInfo {
            render_pass,
            subpass,
            color_attachment_count: 1,
            has_depth_stencil: false,
        }
    }

    fn mesh_pipeline() -> PipelineDescription {
        PipelineDescription::new("mesh")
            .stage(vk::ShaderStageFlags::VERTEX, vk::ShaderModule::null(), "main")
            .stage(vk::ShaderStageFlags::FRAGMENT, vk::ShaderModule::null(), "main")
            .vertex_binding(0, 24, vk::VertexInputRate::VERTEX)
            .vertex_attribute(VertexAttribute::new(0, 0, vk::Format::R32G32B32_SFLOAT, 0))
            .vertex_attribute(VertexAttribute::new(1, 0, vk::Format::R32G32B32_SFLOAT, 12))
            .push_constant(vk::ShaderStageFlags::VERTEX, 0, 64)
            .object_slot(ObjectSlot::new(ObjectSlotKind::UniformBuffer, vk::ShaderStageFlags::VERTEX))
    }

    fn render_passes(backend: &HeadlessBackend) -> (vk::RenderPass, vk::RenderPass) {
        let a = backend.create_render_pass(&Default::default(), "a").unwrap();
        let b = backend.create_render_pass(&Default::default(), "b").unwrap();
        (a, b)
    }

    #[test]
    fn test_key_includes_render_pass() {
        let backend = Rc::new(HeadlessBackend::new(TEST_EXTENT));
        let mut cache = PipelineCache::new(backend.clone(), None).unwrap();
        cache.add_pipeline(mesh_pipeline()).unwrap();
        let (pass_a, pass_b) = render_passes(&backend);

        let pa = cache.get_pipeline("mesh", &subpass(pass_a, 0)).unwrap();
        let pb = cache.get_pipeline("mesh", &subpass(pass_b, 0)).unwrap();
        let pa_again = cache.get_pipeline("mesh", &subpass(pass_a, 0)).unwrap();

        assert_ne!(pa.pipeline, pb.pipeline);
        assert_eq!(pa, pa_again);
        assert_eq!(pa.template, pb.template);
        assert_eq!(pa.layout, pb.layout);
        assert_eq!(cache.pipeline_count(), 2);
        assert_eq!(backend.count_calls(|c| matches!(c, HeadlessCall::CreateGraphicsPipeline { .. })), 2);

        cache.destroy();
        backend.destroy_render_pass(pass_a);
        backend.destroy_render_pass(pass_b);
        assert_eq!(backend.live_object_count(), 0);
    }

    #[test]
    fn test_subpass_index_is_part_of_key() {
        let backend = Rc::new(HeadlessBackend::new(TEST_EXTENT));
        let mut cache = PipelineCache::new(backend.clone(), None).unwrap();
        cache.add_pipeline(mesh_pipeline()).unwrap();
        let (pass_a, pass_b) = render_passes(&backend);

        let p0 = cache.get_pipeline("mesh", &subpass(pass_a, 0)).unwrap();
        let p1 = cache.get_pipeline("mesh", &subpass(pass_a, 1)).unwrap();
        assert_ne!(p0.pipeline, p1.pipeline);

        cache.destroy();
        backend.destroy_render_pass(pass_a);
        backend.destroy_render_pass(pass_b);
    }

    #[test]
    fn test_template_is_immutable() {
        let backend = Rc::new(HeadlessBackend::new(TEST_EXTENT));
        let mut cache = PipelineCache::new(backend.clone(), None).unwrap();

        let first = cache.add_pipeline(mesh_pipeline()).unwrap();
        let second = cache.add_pipeline(PipelineDescription::new("mesh")).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.template_count(), 1);
        assert_eq!(cache.template(first).unwrap().desc().stages.len(), 2);

        cache.destroy();
    }

    #[test]
    fn test_missing_pipeline() {
        let backend = Rc::new(HeadlessBackend::new(TEST_EXTENT));
        let mut cache = PipelineCache::new(backend.clone(), None).unwrap();
        let (pass_a, pass_b) = render_passes(&backend);

        assert!(matches!(
            cache.get_pipeline("nope", &subpass(pass_a, 0)),
            Err(RenderError::MissingPipeline { pipeline }) if pipeline == "nope"
        ));

        cache.destroy();
        backend.destroy_render_pass(pass_a);
        backend.destroy_render_pass(pass_b);
    }

    #[test]
    fn test_unsupported_format_creates_nothing() {
        let backend = Rc::new(HeadlessBackend::new(TEST_EXTENT));
        let mut cache = PipelineCache::new(backend.clone(), None).unwrap();
        let live = backend.live_object_count();

        let desc = PipelineDescription::new("bad").vertex_attribute(VertexAttribute::new(
            0,
            0,
            vk::Format::UNDEFINED,
            0,
        ));
        assert!(matches!(cache.add_pipeline(desc), Err(RenderError::UnsupportedFormat { .. })));
        assert_eq!(backend.live_object_count(), live);
        assert!(cache.find("bad").is_none());

        cache.destroy();
    }

    #[test]
    fn test_pipeline_failure_is_an_error() {
        let backend = Rc::new(HeadlessBackend::new(TEST_EXTENT));
        let mut cache = PipelineCache::new(backend.clone(), None).unwrap();
        cache.add_pipeline(mesh_pipeline()).unwrap();
        let (pass_a, pass_b) = render_passes(&backend);

        backend.script_pipeline_failures(1);
        let err = cache.get_pipeline("mesh", &subpass(pass_a, 0)).unwrap_err();
        assert!(!err.is_configuration());
        assert_eq!(cache.pipeline_count(), 0);

        // 下一次请求重新编译
        cache.get_pipeline("mesh", &subpass(pass_a, 0)).unwrap();
        assert_eq!(cache.pipeline_count(), 1);

        cache.destroy();
        backend.destroy_render_pass(pass_a);
        backend.destroy_render_pass(pass_b);
    }

    #[test]
    fn test_evict_render_pass() {
        let backend = Rc::new(HeadlessBackend::new(TEST_EXTENT));
        let mut cache = PipelineCache::new(backend.clone(), None).unwrap();
        cache.add_pipeline(mesh_pipeline()).unwrap();
        let (pass_a, pass_b) = render_passes(&backend);

        let pa = cache.get_pipeline("mesh", &subpass(pass_a, 0)).unwrap();
        let pb = cache.get_pipeline("mesh", &subpass(pass_b, 0)).unwrap();

        cache.evict_render_passes(&[pass_a]);
        assert!(!cache.is_live(&pa));
        assert!(cache.is_live(&pb));
        assert_eq!(cache.pipeline_count(), 1);
        // layout 保留
        assert!(cache.find("mesh").is_some());

        cache.destroy();
        backend.destroy_render_pass(pass_a);
        backend.destroy_render_pass(pass_b);
    }

    #[test]
    fn test_blob_round_trip_through_disk() {
        let dir = std::env::temp_dir().join(format!("vela-pipeline-cache-{}", std::process::id()));
        let path = dir.join("pipeline.bin");
        let _ = std::fs::remove_file(&path);

        let backend = Rc::new(HeadlessBackend::new(TEST_EXTENT));
        // 文件不存在时从空的 cache 开始
        let cache = PipelineCache::new(backend.clone(), Some(path.clone())).unwrap();
        cache.persist();
        cache.destroy();
        assert!(path.exists());

        std::fs::write(&path, b"blob").unwrap();
        let cache = PipelineCache::new(backend.clone(), Some(path.clone())).unwrap();
        assert_eq!(backend.pipeline_cache_data(cache.vk_cache).unwrap(), b"blob".to_vec());
        cache.destroy();

        let _ = std::fs::remove_dir_all(&dir);
    }
}
