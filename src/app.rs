use axum::Router;
use tower_http::compression::CompressionLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::cors::build_cors_layer;
use crate::features::{assets, decor, export, health, lettering};
use crate::openapi::ApiDoc;
use crate::request_id::request_id_middleware;
use crate::state::AppState;

fn compression_predicate() -> impl tower_http::compression::predicate::Predicate {
    use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};

    // 字母图片与 ZIP 本身已压缩，只压缩 JSON/文本
    SizeAbove::default()
        .and(NotForContentType::GRPC)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::SSE)
        .and(NotForContentType::const_new("application/octet-stream"))
        .and(NotForContentType::const_new("application/zip"))
}

/// 组装完整路由：业务接口挂在 `api.prefix` 下，`/health` 与 `/docs` 在根路径。
pub fn build_router(state: AppState, config: &AppConfig) -> Router {
    let api = Router::<AppState>::new()
        .merge(lettering::create_lettering_router())
        .merge(export::create_export_router())
        .merge(decor::create_decor_router())
        .merge(assets::create_assets_router());

    let mut app = Router::<AppState>::new()
        .merge(health::create_health_router())
        .nest(&config.api.prefix, api)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state);

    app = app.layer(CompressionLayer::new().compress_when(compression_predicate()));
    if let Some(cors) = build_cors_layer(&config.cors) {
        app = app.layer(cors);
    }
    // 最外层：所有响应（含 CORS 预检与错误）都带 X-Request-Id
    app.layer(axum::middleware::from_fn(request_id_middleware))
}
