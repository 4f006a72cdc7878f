use std::future::Future;

use axum::body::Bytes;

use crate::error::FetchError;

/// 按 URL 拉取图片字节。
///
/// 预加载队列与压缩包导出共用此抽象，测试中可替换为内存实现。
pub trait ImageFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

/// 基于 reqwest 的实现，复用全局图片 client。
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            client: crate::http::image_client()?.clone(),
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        if url.trim().is_empty() {
            return Err(FetchError::MissingUrl);
        }
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(resp.bytes().await?)
    }
}
