use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Json,
    routing::post,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::features::lettering::models::RenderDirective;
use crate::state::AppState;

/// 导出请求：给出会话 ID，或直接给出指令序列
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    /// 会话 ID（优先）
    #[schema(example = "ls_3f1c0a4e9b7d4c51a2f8e6d0b9c7a1e2")]
    pub session_id: Option<String>,
    /// 指令序列（未给出会话时必填）
    pub directives: Option<Vec<RenderDirective>>,
    /// 下载文件名前缀，默认取会话文本；为空时使用 `name`
    #[schema(example = "hello")]
    pub base_name: Option<String>,
}

#[utoipa::path(
    post,
    path = "/export",
    summary = "下载压缩包",
    description = "重新拉取每个字母图片并打包为 ZIP（`name-art/{字母}_{位置}.png`）。直接给出的指令只取字符与样式，图片地址由服务端解析。单张图片失败时跳过该条目，响应头 `X-Export-Skipped` 给出跳过数量。",
    request_body = ExportRequest,
    responses(
        (status = 200, description = "ZIP bytes（application/zip，附带 Content-Disposition）"),
        (
            status = 404,
            description = "会话不存在或已过期",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 422,
            description = "没有可导出的字母，或字母/样式无效",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 500,
            description = "打包失败",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Export"
)]
pub async fn export_archive(
    State(state): State<AppState>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap, Vec<u8>), AppError> {
    let Json(req) = payload?;
    let (text, directives) = match (req.session_id.as_deref(), req.directives) {
        (Some(id), _) => state.sessions.require(id).await?.directives(),
        (None, Some(directives)) => {
            // 图片地址一律由字符与样式重新解析，不拉取客户端给出的 URL
            let rebuilt = directives
                .iter()
                .map(|d| state.renderer.rebuild(d))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| AppError::Validation("指令中的字母或样式无效".into()))?;
            (String::new(), rebuilt)
        }
        (None, None) => {
            return Err(AppError::Validation(
                "需要提供 sessionId 或 directives".into(),
            ));
        }
    };
    if !directives.iter().any(|d| d.letter().is_some()) {
        return Err(AppError::Validation("请先输入文本并生成".into()));
    }

    let base_name = req.base_name.unwrap_or(text);
    let archive = state.exporter.export(&directives, &base_name).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    if let Ok(v) = HeaderValue::from_str(&content_disposition(&archive.file_name)) {
        headers.insert(header::CONTENT_DISPOSITION, v);
    }
    headers.insert("x-export-entries", HeaderValue::from(archive.entries.len()));
    headers.insert("x-export-skipped", HeaderValue::from(archive.skipped.len()));
    Ok((StatusCode::OK, headers, archive.bytes))
}

/// `attachment; filename="..."; filename*=UTF-8''...`，非 ASCII 字符在 filename 中替换为 `_`
fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect();
    let mut encoded = String::with_capacity(file_name.len() * 3);
    for b in file_name.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }
    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}

pub fn create_export_router() -> Router<AppState> {
    Router::new().route("/export", post(export_archive))
}
