mod common;

use ash::vk;
use ash::vk::Handle;
use common::{Harness, TestRenderer, count};
use vela_gfx::headless::HeadlessCall;
use vela_render_interface::binding::{BindingObject, BufferRange, PipelineBindingInfo};
use vela_render_interface::params::RenderParams;
use vela_render_interface::pipeline_desc::{ObjectSlot, ObjectSlotKind, PipelineDescription, VertexAttribute};

fn uniform_pipeline() -> PipelineDescription {
    PipelineDescription::new("triangle")
        .stage(vk::ShaderStageFlags::VERTEX, vk::ShaderModule::null(), "main")
        .object_slot(ObjectSlot::new(ObjectSlotKind::UniformBuffer, vk::ShaderStageFlags::VERTEX))
}

fn ubo(raw: u64) -> BindingObject {
    BindingObject::uniform_buffer(BufferRange::whole(vk::Buffer::from_raw(raw)))
}

#[test]
fn test_render_pass_compiled_once() {
    let mut h = Harness::new(TestRenderer::new());
    h.backend.take_calls();

    for _ in 0..6 {
        h.scheduler.render_frame(&h.window, &RenderParams::new()).unwrap();
    }
    let calls = h.backend.take_calls();
    assert_eq!(count(&calls, |c| matches!(c, HeadlessCall::CreateRenderPass(_))), 1);
    assert_eq!(count(&calls, |c| matches!(c, HeadlessCall::CreateGraphicsPipeline { .. })), 1);
    assert_eq!(
        count(&calls, |c| matches!(c, HeadlessCall::CreateFramebuffer { .. })),
        h.scheduler.core().surface().image_count()
    );

    h.destroy();
}

#[test]
fn test_tagged_binding_written_once_across_frames() {
    let renderer = TestRenderer::new()
        .with_pipeline(uniform_pipeline())
        .with_binding(PipelineBindingInfo::new().object(ubo(0x10)).tag("camera"));
    let mut h = Harness::new(renderer);
    let fif = h.scheduler.frames().len();

    for _ in 0..5 {
        h.scheduler.render_frame(&h.window, &RenderParams::new()).unwrap();
    }
    // 第一次使用时每个 slot 写一次，之后内容不变不再写入
    assert_eq!(h.backend.descriptor_update_count(), fif);
    assert_eq!(h.scheduler.core().descriptors().tagged_count(), 1);

    h.destroy();
}

#[test]
fn test_untagged_binding_written_every_frame() {
    let renderer = TestRenderer::new()
        .with_pipeline(uniform_pipeline())
        .with_binding(PipelineBindingInfo::new().object(ubo(0x10)));
    let mut h = Harness::new(renderer);
    h.backend.take_calls();

    for _ in 0..4 {
        h.scheduler.render_frame(&h.window, &RenderParams::new()).unwrap();
    }
    assert_eq!(h.backend.descriptor_update_count(), 4);
    // 每个 slot 的 transient pool 在再次使用前 reset
    let calls = h.backend.take_calls();
    assert!(count(&calls, |c| matches!(c, HeadlessCall::ResetDescriptorPool(_))) >= 2);

    h.destroy();
}

#[test]
fn test_binding_count_mismatch_skips_pass_without_writes() {
    let renderer = TestRenderer::new()
        .with_pipeline(uniform_pipeline())
        .with_binding(PipelineBindingInfo::new());
    let mut h = Harness::new(renderer);
    h.backend.take_calls();

    // pass 的错误在 pass 边界被捕获，帧照常完成
    h.scheduler.render_frame(&h.window, &RenderParams::new()).unwrap();
    assert_eq!(h.backend.descriptor_write_count(), 0);
    assert_eq!(h.reports.borrow()[0].passes_failed, 1);

    let calls = h.backend.take_calls();
    assert_eq!(count(&calls, |c| matches!(c, HeadlessCall::Draw { .. })), 0);
    assert_eq!(count(&calls, |c| matches!(c, HeadlessCall::QueuePresent { .. })), 1);

    h.destroy();
}

fn assert_pass_rejected(binding: PipelineBindingInfo, pipeline: PipelineDescription) {
    let mut h = Harness::new(TestRenderer::new().with_pipeline(pipeline).with_binding(binding));
    h.backend.take_calls();

    h.scheduler.render_frame(&h.window, &RenderParams::new()).unwrap();
    assert_eq!(h.backend.descriptor_write_count(), 0);
    assert_eq!(h.backend.descriptor_update_count(), 0);
    assert_eq!(h.reports.borrow()[0].passes_failed, 1);
    assert_eq!(h.reports.borrow()[0].passes_executed, 0);

    let calls = h.backend.take_calls();
    assert_eq!(count(&calls, |c| matches!(c, HeadlessCall::Draw { .. })), 0);
    assert_eq!(count(&calls, |c| matches!(c, HeadlessCall::QueuePresent { .. })), 1);

    h.destroy();
}

#[test]
fn test_empty_uniform_array_rejected() {
    assert_pass_rejected(
        PipelineBindingInfo::new().object(BindingObject::UniformBuffers(vec![])),
        uniform_pipeline(),
    );
}

#[test]
fn test_oversized_uniform_array_rejected() {
    let buffers = vec![
        BufferRange::whole(vk::Buffer::from_raw(0x10)),
        BufferRange::whole(vk::Buffer::from_raw(0x11)),
    ];
    assert_pass_rejected(
        PipelineBindingInfo::new().object(BindingObject::UniformBuffers(buffers)),
        uniform_pipeline(),
    );
}

#[test]
fn test_sampler_image_length_mismatch_rejected() {
    let pipeline = PipelineDescription::new("triangle")
        .stage(vk::ShaderStageFlags::FRAGMENT, vk::ShaderModule::null(), "main")
        .object_slot(ObjectSlot::new(ObjectSlotKind::Sampler, vk::ShaderStageFlags::FRAGMENT).with_count(2));
    let object = BindingObject::SampledImages {
        images: vec![vk::ImageView::from_raw(0x20), vk::ImageView::from_raw(0x21)],
        samplers: vec![vk::Sampler::from_raw(0x30)],
    };
    assert_pass_rejected(PipelineBindingInfo::new().object(object).tag("material"), pipeline);
}

#[test]
fn test_uniform_array_matching_count_written() {
    let pipeline = PipelineDescription::new("triangle")
        .stage(vk::ShaderStageFlags::VERTEX, vk::ShaderModule::null(), "main")
        .object_slot(ObjectSlot::new(ObjectSlotKind::UniformBuffer, vk::ShaderStageFlags::VERTEX).with_count(2));
    let buffers = vec![
        BufferRange::whole(vk::Buffer::from_raw(0x10)),
        BufferRange::whole(vk::Buffer::from_raw(0x11)),
    ];
    let renderer = TestRenderer::new()
        .with_pipeline(pipeline)
        .with_binding(PipelineBindingInfo::new().object(BindingObject::UniformBuffers(buffers)));
    let mut h = Harness::new(renderer);

    h.scheduler.render_frame(&h.window, &RenderParams::new()).unwrap();
    assert_eq!(h.backend.descriptor_update_count(), 1);
    assert_eq!(h.reports.borrow()[0].passes_executed, 1);

    h.destroy();
}

#[test]
fn test_mat4_attribute_expansion() {
    let mut h = Harness::new(TestRenderer::new());
    let handle = h
        .scheduler
        .core_mut()
        .add_pipeline(
            PipelineDescription::new("instanced")
                .vertex_binding(1, 64, vk::VertexInputRate::INSTANCE)
                .vertex_attribute(VertexAttribute::mat4(4, 1, 0)),
        )
        .unwrap();

    let template = h.scheduler.core().pipelines().template(handle).unwrap();
    let attributes = template.vertex_attributes();
    assert_eq!(attributes.len(), 4);
    assert_eq!(attributes.iter().map(|a| a.offset).collect::<Vec<_>>(), vec![0, 16, 32, 48]);
    assert_eq!(attributes.iter().map(|a| a.location).collect::<Vec<_>>(), vec![4, 5, 6, 7]);
    assert!(attributes.iter().all(|a| a.format == vk::Format::R32G32B32A32_SFLOAT && a.binding == 1));

    h.destroy();
}
