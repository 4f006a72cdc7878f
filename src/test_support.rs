//! 单元测试共用的内存实现

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Bytes;

use crate::error::FetchError;
use crate::storage::{ImageFetcher, UrlResolver};

/// 1x1 PNG
pub(crate) fn tiny_png() -> Bytes {
    let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([200, 30, 30, 255]));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    Bytes::from(buf.into_inner())
}

/// 固定前缀的解析器，路径原样拼接
pub(crate) struct PrefixResolver(pub &'static str);

impl UrlResolver for PrefixResolver {
    fn resolve(&self, relative_path: &str) -> Option<String> {
        (!relative_path.is_empty()).then(|| format!("{}/{}", self.0, relative_path))
    }
}

/// 永远返回 None 的解析器（存储未配置）
pub(crate) struct NullResolver;

impl UrlResolver for NullResolver {
    fn resolve(&self, _relative_path: &str) -> Option<String> {
        None
    }
}

/// 记录调用次数的拉取器；URL 包含任一 `failing` 片段时返回 404。
pub(crate) struct MockFetcher {
    png: Bytes,
    failing: Vec<String>,
    garbage: Vec<String>,
    fail_all: bool,
    delay: Option<Duration>,
    hits: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self {
            png: tiny_png(),
            failing: Vec::new(),
            garbage: Vec::new(),
            fail_all: false,
            delay: None,
            hits: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(mut self, pattern: &str) -> Self {
        self.failing.push(pattern.to_string());
        self
    }

    pub(crate) fn fail_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub(crate) fn garbage(mut self, pattern: &str) -> Self {
        self.garbage.push(pattern.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn hits(&self, url: &str) -> usize {
        self.hits.lock().expect("hits").get(url).copied().unwrap_or(0)
    }

    pub(crate) fn total_hits(&self) -> usize {
        self.hits.lock().expect("hits").values().sum()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ImageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        *self
            .hits
            .lock()
            .expect("hits")
            .entry(url.to_string())
            .or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_all || self.failing.iter().any(|p| url.contains(p.as_str())) {
            return Err(FetchError::Status(404));
        }
        if self.garbage.iter().any(|p| url.contains(p.as_str())) {
            return Ok(Bytes::from_static(b"not an image"));
        }
        Ok(self.png.clone())
    }
}
