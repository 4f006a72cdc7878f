/// 上传/列举图片资源
pub mod assets;
/// 背景装饰
pub mod decor;
/// 压缩包导出
pub mod export;
/// 健康检查
pub mod health;
/// 文字渲染（样式分配、预加载、会话）
pub mod lettering;
