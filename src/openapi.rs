use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::openapi::server::{ServerBuilder, ServerVariableBuilder};
use utoipa::{Modify, OpenApi};

/// 注入 `X-Admin-Token` 安全定义（资源上传接口使用）
struct AdminTokenSecurity;

impl Modify for AdminTokenSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "AdminToken",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Admin-Token"))),
        );
    }
}

/// 业务接口挂载在 `config.api.prefix` 下，`/health` 在根路径
struct ApiServers;

impl Modify for ApiServers {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let api = ServerBuilder::new()
            .url("{api_prefix}")
            .description(Some("业务接口（默认 /api/v1）"))
            .parameter(
                "api_prefix",
                ServerVariableBuilder::new()
                    .default_value("/api/v1")
                    .description(Some("对应 config.api.prefix（可通过 APP_API__PREFIX 覆盖）")),
            )
            .build();
        let root = ServerBuilder::new()
            .url("/")
            .description(Some("根路径（/health）"))
            .build();
        openapi.servers = Some(vec![api, root]);
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::lettering::handler::create_session,
        crate::features::lettering::handler::render_text,
        crate::features::lettering::handler::regenerate_text,
        crate::features::lettering::handler::get_session,
        crate::features::lettering::handler::repair_directive,
        crate::features::lettering::handler::get_title,
        crate::features::decor::handler::get_layout,
        crate::features::export::handler::export_archive,
        crate::features::assets::handler::list_assets,
        crate::features::assets::handler::upload_asset,
    ),
    components(schemas(
        crate::error::ProblemDetails,
        crate::features::lettering::models::RenderDirective,
        crate::features::lettering::models::LoadStatus,
        crate::features::lettering::models::DirectiveView,
        crate::features::lettering::models::SessionSnapshot,
        crate::features::lettering::handler::CreateSessionResponse,
        crate::features::lettering::handler::RenderRequest,
        crate::features::lettering::handler::RepairRequest,
        crate::features::lettering::title::TitleLettering,
        crate::features::decor::overlay::DecorElement,
        crate::features::decor::overlay::DecorKind,
        crate::features::export::handler::ExportRequest,
        crate::storage::StorageEntry,
        crate::storage::UploadReceipt,
        crate::features::health::handler::HealthResponse,
    )),
    modifiers(&AdminTokenSecurity, &ApiServers),
    tags(
        (name = "Lettering", description = "文字渲染：会话、实时预览、重新生成、单字修复与标题字母。"),
        (name = "Export", description = "导出：将当前渲染结果打包为 ZIP 下载。"),
        (name = "Decor", description = "背景装饰：随机符号/形状/文字贴纸布局。"),
        (name = "Assets", description = "图片资源：列举与（管理员）上传。"),
        (name = "Health", description = "健康检查：服务探活。"),
    ),
    info(
        title = "Ransom Art API",
        version = env!("CARGO_PKG_VERSION"),
        description = "勒索信风格文字生成服务（Axum + utoipa）。除 /health 外，业务接口挂载在 `config.api.prefix`（默认 /api/v1）下，paths 不包含该前缀。"
    )
)]
pub struct ApiDoc;
