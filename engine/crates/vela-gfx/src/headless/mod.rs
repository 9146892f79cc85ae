//! 不依赖 GPU 的后端
//!
//! 每次调用都会记录到 call log 中，提交的工作立即完成（submit 时 fence 直接 signaled）。
//! 可以通过 `script_*` 系列方法注入 out of date、pipeline 创建失败、pool 耗尽、fence 超时等情况。

mod call;
mod headless_backend;

pub use call::HeadlessCall;
pub use headless_backend::HeadlessBackend;
