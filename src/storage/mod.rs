//! 对象存储能力封装
//!
//! - [`UrlResolver`]：相对路径 -> 公开 URL（未配置时降级为 `None`，从不报错）
//! - [`StorageClient`]：Supabase Storage 兼容的解析/上传/列举
//! - [`ImageFetcher`]：按 URL 拉取图片字节（预加载与导出共用）
//! - [`paths`]：字母与装饰图片在 bucket 中的路径约定

mod client;
mod fetch;
pub mod paths;

pub use client::{StorageClient, StorageEntry, UploadOptions, UploadReceipt, UrlResolver};
pub use fetch::{HttpImageFetcher, ImageFetcher};
