use axum::body::Bytes;
use reqwest::{Url, header};
use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;
use crate::error::StorageError;

use super::paths::content_type_for;

/// 相对路径 -> 完整公开 URL。
///
/// 实现必须“永不失败”：存储未配置、路径为空或无法拼接时一律返回 `None`。
pub trait UrlResolver: Send + Sync {
    fn resolve(&self, relative_path: &str) -> Option<String>;
}

#[derive(Debug, Clone)]
struct Credentials {
    base_url: Url,
    access_key: String,
}

/// Supabase Storage 兼容客户端
#[derive(Debug, Clone)]
pub struct StorageClient {
    credentials: Option<Credentials>,
    bucket: String,
    http: reqwest::Client,
}

/// 上传选项
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// `cache-control: max-age=...`（秒）
    pub cache_control_secs: u32,
    /// 目标存在时是否覆盖
    pub upsert: bool,
    /// 为空时按扩展名推断
    pub content_type: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            cache_control_secs: 3600,
            upsert: true,
            content_type: None,
        }
    }
}

/// 上传成功后的回执
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UploadReceipt {
    /// bucket 内完整 key（`{bucket}/{path}`）
    #[serde(rename = "Key", alias = "key")]
    pub key: String,
}

/// 列举结果中的单个对象
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageEntry {
    /// 对象名（不含前缀）
    pub name: String,
    /// 对象 ID（目录项为 null）
    #[serde(default)]
    pub id: Option<String>,
    /// 最后更新时间
    #[serde(default, alias = "updated_at")]
    pub updated_at: Option<String>,
    /// 元数据（大小、mimetype 等）
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

const LIST_PAGE_LIMIT: u32 = 1000;
const ERROR_BODY_MAX_CHARS: usize = 256;

impl StorageClient {
    /// 按配置构建客户端。凭据缺失或 base_url 非法时仍返回客户端（处于“未配置”状态）。
    pub fn new(cfg: &StorageConfig) -> Result<Self, StorageError> {
        let http = crate::http::storage_client(cfg.timeout_duration())?.clone();
        let credentials = match cfg.credentials() {
            Some((base_url, access_key)) => match Url::parse(&base_url) {
                Ok(base_url) => Some(Credentials {
                    base_url,
                    access_key,
                }),
                Err(e) => {
                    tracing::warn!("storage.base_url 无法解析（{}），按未配置处理", e);
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            credentials,
            bucket: cfg.bucket.clone(),
            http,
        })
    }

    /// 显式给定凭据（测试与命令行工具使用）。
    pub fn with_credentials(
        base_url: &str,
        access_key: &str,
        bucket: &str,
        http: reqwest::Client,
    ) -> Result<Self, StorageError> {
        let base_url =
            Url::parse(base_url).map_err(|e| StorageError::InvalidPath(e.to_string()))?;
        Ok(Self {
            credentials: Some(Credentials {
                base_url,
                access_key: access_key.to_string(),
            }),
            bucket: bucket.to_string(),
            http,
        })
    }

    /// 未配置状态的客户端
    pub fn unconfigured(bucket: &str) -> Self {
        Self {
            credentials: None,
            bucket: bucket.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// 用于启动日志：只暴露前 10 个字符
    pub fn describe(&self) -> String {
        match &self.credentials {
            Some(c) => format!(
                "url={}... key={}... bucket={}",
                prefix_chars(c.base_url.as_str(), 10),
                prefix_chars(&c.access_key, 10),
                self.bucket
            ),
            None => format!("url=missing key=missing bucket={}", self.bucket),
        }
    }

    /// `resolvePublicURL(bucket, path)`
    pub fn public_url(&self, relative_path: &str) -> Option<Url> {
        let path = normalize_path(relative_path)?;
        let creds = self.credentials.as_ref()?;
        let url = object_url(
            &creds.base_url,
            &["storage", "v1", "object", "public", &self.bucket],
            path,
        );
        if url.is_none() {
            tracing::debug!("无法为 {:?} 拼接公开 URL", relative_path);
        }
        url
    }

    /// 上传对象（默认 `cache-control: max-age=3600`，`x-upsert: true`）
    pub async fn upload(
        &self,
        relative_path: &str,
        bytes: Bytes,
        opts: &UploadOptions,
    ) -> Result<UploadReceipt, StorageError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(StorageError::NotConfigured)?;
        let path = normalize_path(relative_path)
            .ok_or_else(|| StorageError::InvalidPath(relative_path.to_string()))?;
        let url = object_url(
            &creds.base_url,
            &["storage", "v1", "object", &self.bucket],
            path,
        )
        .ok_or_else(|| StorageError::InvalidPath(relative_path.to_string()))?;

        let content_type = opts
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for(path).to_string());

        tracing::debug!(path, size = bytes.len(), "上传对象");
        let resp = self
            .http
            .post(url)
            .header("apikey", &creds.access_key)
            .bearer_auth(&creds.access_key)
            .header(
                header::CACHE_CONTROL,
                format!("max-age={}", opts.cache_control_secs),
            )
            .header("x-upsert", if opts.upsert { "true" } else { "false" })
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// 列举前缀下的对象。前缀为空时直接返回空列表。
    pub async fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>, StorageError> {
        let Some(prefix) = normalize_path(prefix) else {
            return Ok(Vec::new());
        };
        let Some(creds) = self.credentials.as_ref() else {
            tracing::warn!(prefix = %prefix, "对象存储未配置，列举返回空列表");
            return Ok(Vec::new());
        };
        let url = object_url(
            &creds.base_url,
            &["storage", "v1", "object", "list", &self.bucket],
            "",
        )
        .ok_or_else(|| StorageError::InvalidPath(prefix.to_string()))?;

        let body = serde_json::json!({
            "prefix": prefix,
            "limit": LIST_PAGE_LIMIT,
            "offset": 0,
            "sortBy": { "column": "name", "order": "asc" },
        });
        let resp = self
            .http
            .post(url)
            .header("apikey", &creds.access_key)
            .bearer_auth(&creds.access_key)
            .json(&body)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl UrlResolver for StorageClient {
    fn resolve(&self, relative_path: &str) -> Option<String> {
        self.public_url(relative_path).map(String::from)
    }
}

fn normalize_path(raw: &str) -> Option<&str> {
    let path = raw.trim().trim_matches('/');
    (!path.is_empty()).then_some(path)
}

fn object_url(base: &Url, prefix: &[&str], path: &str) -> Option<Url> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.pop_if_empty();
        segments.extend(prefix);
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
    }
    Some(url)
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StorageError::Upstream {
        status: status.as_u16(),
        body: prefix_chars(&body, ERROR_BODY_MAX_CHARS).to_string(),
    })
}

fn prefix_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
