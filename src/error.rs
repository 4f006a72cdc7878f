use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用统一错误类型
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 请求体格式错误
    #[error("请求格式错误: {0}")]
    Json(String),

    /// 禁止访问
    #[error("禁止访问: {0}")]
    Forbidden(String),

    /// 参数校验错误
    #[error("参数校验错误: {0}")]
    Validation(String),

    /// 资源不存在（如会话过期）
    #[error("未找到: {0}")]
    NotFound(String),

    /// 资源状态冲突（如修复次数耗尽）
    #[error("状态冲突: {0}")]
    Conflict(String),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 对象存储错误
    #[error("对象存储错误: {0}")]
    Storage(#[from] StorageError),

    /// 导出错误
    #[error("导出失败: {0}")]
    Export(#[from] ExportError),
}

/// 对象存储错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq, utoipa::ToSchema)]
pub enum StorageError {
    /// 缺少存储凭据（base_url / access_key）
    #[error("存储未配置")]
    NotConfigured,

    /// 路径为空或无法拼接为合法 URL
    #[error("无效的存储路径: {0}")]
    InvalidPath(String),

    /// 网络请求错误
    #[error("网络错误: {0}")]
    Network(String),

    /// 超时
    #[error("超时")]
    Timeout,

    /// 上游返回非 2xx
    #[error("上游返回 {status}: {body}")]
    Upstream {
        /// HTTP 状态码
        status: u16,
        /// 截断后的响应体
        body: String,
    },

    /// JSON 解析错误
    #[error("JSON 解析错误: {0}")]
    Json(String),
}

/// 拉取图片字节时的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 无可用 URL（存储未配置或路径解析失败）
    #[error("缺少图片地址")]
    MissingUrl,
    /// 网络请求错误
    #[error("网络错误: {0}")]
    Network(String),
    /// 超时
    #[error("超时")]
    Timeout,
    /// 上游返回非 2xx
    #[error("上游返回 HTTP {0}")]
    Status(u16),
}

/// 图片预加载错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreloadError {
    /// 拉取失败
    #[error("拉取失败: {0}")]
    Fetch(#[from] FetchError),
    /// 字节无法解码为图片
    #[error("解码失败: {0}")]
    Decode(String),
    /// 预加载队列已关闭（会话已释放）
    #[error("预加载队列已关闭")]
    QueueClosed,
}

/// 压缩包导出错误
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum ExportError {
    /// ZIP 写入错误
    #[error("ZIP 写入错误: {0}")]
    Zip(String),
    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(String),
}

/// RFC7807 风格的错误响应（Problem Details）。
///
/// 所有 API 错误统一返回 `application/problem+json`，`code` 字段保持稳定，便于调用方程序化处理。
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// 问题类型（URI）。若无更细分的类型，可使用 about:blank。
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub type_url: String,

    /// 简短标题，用于概括错误。
    #[schema(example = "Validation Failed")]
    pub title: String,

    /// HTTP 状态码（与响应 status 一致）。
    #[schema(example = 422)]
    pub status: u16,

    /// 人类可读的详细信息（尽量稳定，不建议依赖解析）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// 稳定的错误码，用于程序化处理。
    #[schema(example = "VALIDATION_FAILED")]
    pub code: String,

    /// 请求追踪 ID（由 request-id 中间件回填）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(e) => match e {
                StorageError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
                StorageError::InvalidPath(_) => StatusCode::UNPROCESSABLE_ENTITY,
                StorageError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                StorageError::Network(_)
                | StorageError::Upstream { .. }
                | StorageError::Json(_) => StatusCode::BAD_GATEWAY,
            },
            AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn stable_code(&self) -> &'static str {
        match self {
            AppError::Json(_) => "BAD_REQUEST",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Storage(e) => match e {
                StorageError::NotConfigured => "STORAGE_NOT_CONFIGURED",
                StorageError::InvalidPath(_) => "STORAGE_INVALID_PATH",
                StorageError::Timeout => "UPSTREAM_TIMEOUT",
                StorageError::Network(_)
                | StorageError::Upstream { .. }
                | StorageError::Json(_) => "STORAGE_UPSTREAM_ERROR",
            },
            AppError::Export(_) => "EXPORT_FAILED",
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::CONFLICT => "Conflict",
            StatusCode::UNPROCESSABLE_ENTITY => "Validation Failed",
            StatusCode::BAD_GATEWAY => "Bad Gateway",
            StatusCode::SERVICE_UNAVAILABLE => "Service Unavailable",
            StatusCode::GATEWAY_TIMEOUT => "Gateway Timeout",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let problem = ProblemDetails {
            type_url: "about:blank".to_string(),
            title: self.title().to_string(),
            status: status.as_u16(),
            detail: Some(self.to_string()),
            code: self.stable_code().to_string(),
            request_id: crate::request_id::current_request_id(),
        };

        let mut res = Json(problem).into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        res
    }
}

// =============== Error conversions for common external errors ===============

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Json(rejection.body_text())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Timeout
        } else {
            StorageError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<zip::result::ZipError> for ExportError {
    fn from(err: zip::result::ZipError) -> Self {
        ExportError::Zip(err.to_string())
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err.to_string())
    }
}
