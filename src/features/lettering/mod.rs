pub mod allocator;
pub mod handler;
pub mod models;
pub mod preload;
pub mod renderer;
pub mod session;
pub mod title;

// 对外导出路由构建函数，便于 main.rs 引用
pub use handler::create_lettering_router;
