use std::time::Duration;

use axum::{
    Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

use super::models::SessionSnapshot;
use super::session::LetteringSession;
use super::title::{TitleLettering, fixed_title, random_title};

/// 创建会话的响应
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    #[schema(example = "ls_3f1c0a4e9b7d4c51a2f8e6d0b9c7a1e2")]
    pub session_id: String,
}

/// 渲染请求
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RenderRequest {
    /// 待渲染文本（按字符计数）
    #[schema(example = "Hello 2024")]
    pub text: String,
}

/// 手动修复请求
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RepairRequest {
    /// 0 基位置
    #[schema(example = 0)]
    pub position: usize,
}

#[derive(Debug, Deserialize)]
pub struct WaitQuery {
    /// 是否等待预加载完成（支持 1/true/yes/on）
    wait: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TitleQuery {
    random: Option<String>,
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn check_length(text: &str, max_chars: usize) -> Result<(), AppError> {
    if text.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "文本过长（最大 {max_chars} 字符）"
        )));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/lettering/sessions",
    summary = "创建渲染会话",
    description = "创建一个新的渲染会话。会话持有样式分配状态与预加载队列，空闲超时后自动释放。",
    responses(
        (status = 201, description = "创建成功", body = CreateSessionResponse)
    ),
    tag = "Lettering"
)]
pub async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let session = state.sessions.create().await;
    tracing::info!(session = session.id(), "创建渲染会话");
    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id().to_string(),
        }),
    )
}

#[utoipa::path(
    post,
    path = "/lettering/sessions/{id}/render",
    summary = "实时预览渲染",
    description = "将文本渲染为字母图片指令序列。已出现过的字母沿用原样式，新字母分配尽量不重复的样式。`wait=true` 时等待预加载（含失败后的换样式）结束再返回。",
    params(
        ("id" = String, Path, description = "会话 ID"),
        ("wait" = Option<bool>, Query, description = "是否等待预加载完成（可选）")
    ),
    request_body = RenderRequest,
    responses(
        (status = 200, description = "渲染结果", body = SessionSnapshot),
        (
            status = 404,
            description = "会话不存在或已过期",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 422,
            description = "文本过长",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Lettering"
)]
pub async fn render_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let Json(req) = payload?;
    check_length(&req.text, state.lettering.max_text_chars)?;
    let session = state.sessions.require(&id).await?;
    let snapshot = session.render(&req.text);

    if query.wait.as_deref().is_some_and(parse_bool) {
        return Ok(Json(
            settled_snapshot(&session, state.lettering.preload_wait(), &id).await,
        ));
    }
    Ok(Json(snapshot))
}

#[utoipa::path(
    post,
    path = "/lettering/sessions/{id}/regenerate",
    summary = "重新生成",
    description = "为每个字母重新随机样式（允许重复），每次调用都得到全新的效果。文本不能为空。",
    params(
        ("id" = String, Path, description = "会话 ID"),
        ("wait" = Option<bool>, Query, description = "是否等待预加载完成（可选）")
    ),
    request_body = RenderRequest,
    responses(
        (status = 200, description = "渲染结果", body = SessionSnapshot),
        (
            status = 404,
            description = "会话不存在或已过期",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 422,
            description = "文本为空或过长",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Lettering"
)]
pub async fn regenerate_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let Json(req) = payload?;
    if req.text.trim().is_empty() {
        return Err(AppError::Validation("请输入文本".into()));
    }
    check_length(&req.text, state.lettering.max_text_chars)?;
    let session = state.sessions.require(&id).await?;
    let snapshot = session.regenerate(&req.text);

    if query.wait.as_deref().is_some_and(parse_bool) {
        return Ok(Json(
            settled_snapshot(&session, state.lettering.preload_wait(), &id).await,
        ));
    }
    Ok(Json(snapshot))
}

#[utoipa::path(
    get,
    path = "/lettering/sessions/{id}",
    summary = "查询会话渲染结果",
    description = "返回当前指令序列、每个字母的加载状态（pending/loaded/failed）以及是否仍在加载。",
    params(("id" = String, Path, description = "会话 ID")),
    responses(
        (status = 200, description = "当前渲染结果", body = SessionSnapshot),
        (
            status = 404,
            description = "会话不存在或已过期",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Lettering"
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.sessions.require(&id).await?;
    Ok(Json(session.snapshot()))
}

#[utoipa::path(
    post,
    path = "/lettering/sessions/{id}/repair",
    summary = "更换单个字母样式",
    description = "只替换指定位置的字母，新样式由分配器给出。与自动换样式共享次数上限，用尽后返回 409。",
    params(("id" = String, Path, description = "会话 ID")),
    request_body = RepairRequest,
    responses(
        (status = 200, description = "修复后的渲染结果", body = SessionSnapshot),
        (
            status = 404,
            description = "会话不存在或已过期",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 409,
            description = "换样式次数已用尽",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 422,
            description = "位置越界或不是字母",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Lettering"
)]
pub async fn repair_directive(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RepairRequest>, JsonRejection>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let Json(req) = payload?;
    let session = state.sessions.require(&id).await?;
    Ok(Json(session.repair(req.position)?))
}

#[utoipa::path(
    get,
    path = "/lettering/title",
    summary = "标题字母",
    description = "默认返回固定样式表的 \"RANSOME TEXT / GENERATOR\"；`random=true` 时为 \"NAME ART GENERATOR\" 的每个字母随机样式。",
    params(("random" = Option<bool>, Query, description = "是否随机样式（可选）")),
    responses((status = 200, description = "标题字母", body = TitleLettering)),
    tag = "Lettering"
)]
pub async fn get_title(
    State(state): State<AppState>,
    Query(query): Query<TitleQuery>,
) -> Json<TitleLettering> {
    if query.random.as_deref().is_some_and(parse_bool) {
        let mut rng = StdRng::from_entropy();
        Json(random_title(&state.renderer, &mut rng))
    } else {
        Json(fixed_title(&state.renderer))
    }
}

pub fn create_lettering_router() -> Router<AppState> {
    Router::new()
        .route("/lettering/sessions", post(create_session))
        .route("/lettering/sessions/:id", get(get_session))
        .route("/lettering/sessions/:id/render", post(render_text))
        .route("/lettering/sessions/:id/regenerate", post(regenerate_text))
        .route("/lettering/sessions/:id/repair", post(repair_directive))
        .route("/lettering/title", get(get_title))
}

/// 等待预加载结束（有上限）；超时只记录日志，返回当前状态
async fn settled_snapshot(session: &LetteringSession, wait: Duration, id: &str) -> SessionSnapshot {
    if !session.wait_idle(wait).await {
        tracing::debug!(session = %id, "等待预加载超时，返回当前状态");
    }
    session.snapshot()
}
