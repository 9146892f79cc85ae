pub mod binding;
pub mod error;
pub mod frame_counter;
pub mod graph_desc;
pub mod params;
pub mod pipeline_desc;
pub mod renderer_settings;
pub mod target_desc;
