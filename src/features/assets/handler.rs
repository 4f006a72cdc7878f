use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::Json,
    routing::{get, put},
};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::{StorageEntry, UploadOptions, UploadReceipt};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
const MAX_PATH_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    prefix: Option<String>,
}

#[utoipa::path(
    get,
    path = "/assets",
    summary = "列举图片资源",
    description = "列举 bucket 中指定前缀（如 `A` 或 `_Shapes`）下的对象。前缀为空或存储未配置时返回空列表。",
    params(("prefix" = Option<String>, Query, description = "目录前缀")),
    responses(
        (status = 200, description = "对象列表", body = [StorageEntry]),
        (
            status = 502,
            description = "对象存储返回错误",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Assets"
)]
pub async fn list_assets(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<StorageEntry>>, AppError> {
    let prefix = query.prefix.unwrap_or_default();
    let entries = state.storage.list(&prefix).await?;
    tracing::debug!(prefix = %prefix, count = entries.len(), "列举资源");
    Ok(Json(entries))
}

#[utoipa::path(
    put,
    path = "/assets/{path}",
    summary = "上传图片资源（管理员）",
    description = "将请求体上传到 bucket 的指定路径（覆盖已有对象，cache-control 为 1 小时）。需要 `X-Admin-Token`。",
    params(("path" = String, Path, description = "对象路径，如 `A/A_01.png`")),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "上传成功", body = UploadReceipt),
        (
            status = 403,
            description = "管理员令牌无效",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 422,
            description = "路径或内容无效",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 503,
            description = "存储未配置",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    security(("AdminToken" = [])),
    tag = "Assets"
)]
pub async fn upload_asset(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadReceipt>), AppError> {
    let token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if !state.admin.is_authorized(token) {
        return Err(AppError::Forbidden("管理员令牌无效".into()));
    }
    if path.chars().count() > MAX_PATH_CHARS || path.split('/').any(|s| s == "..") {
        return Err(AppError::Validation("对象路径无效".into()));
    }
    if body.is_empty() {
        return Err(AppError::Validation("上传内容为空".into()));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && *v != "application/octet-stream")
        .map(str::to_string);
    let opts = UploadOptions {
        content_type,
        ..UploadOptions::default()
    };

    let size = body.len();
    let receipt = state.storage.upload(&path, body, &opts).await?;
    tracing::info!(path = %path, size, key = %receipt.key, "资源上传完成");
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub fn create_assets_router() -> Router<AppState> {
    Router::new()
        .route("/assets", get(list_assets))
        .route("/assets/*path", put(upload_asset))
}
