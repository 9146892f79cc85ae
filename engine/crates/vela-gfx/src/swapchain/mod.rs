pub mod presentable_surface;
