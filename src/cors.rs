use axum::http::{HeaderName, HeaderValue, Method, header};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;

/// 未配置 allowed_methods 时放行的方法（覆盖全部路由）
const DEFAULT_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];

/// 根据配置构建 CORS 中间件；未启用或 Origin 为空时返回 None
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    if !cors.enabled {
        return None;
    }

    let (any_origin, origins) = parse_list("allowed_origins", &cors.allowed_origins, |v| {
        HeaderValue::from_str(v).ok()
    });
    if !any_origin && origins.is_empty() {
        tracing::warn!("CORS 已启用但 allowed_origins 为空，已跳过启用");
        return None;
    }
    let (any_methods, methods) = parse_list("allowed_methods", &cors.allowed_methods, |v| {
        Method::from_bytes(v.to_ascii_uppercase().as_bytes()).ok()
    });
    let (any_headers, headers) = parse_list("allowed_headers", &cors.allowed_headers, header_name);
    let (any_expose, mut expose) = parse_list("expose_headers", &cors.expose_headers, header_name);

    let mut layer = if any_origin {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    layer = match (any_methods, methods.is_empty()) {
        (true, _) => layer.allow_methods(Any),
        (false, true) => layer.allow_methods(DEFAULT_METHODS.to_vec()),
        (false, false) => layer.allow_methods(methods),
    };

    layer = match (any_headers, headers.is_empty()) {
        (true, _) => layer.allow_headers(Any),
        (false, true) => layer.allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-admin-token"),
        ]),
        (false, false) => layer.allow_headers(headers),
    };

    if any_expose {
        layer = layer.expose_headers(Any);
    } else {
        let request_id = HeaderName::from_static("x-request-id");
        if !expose.contains(&request_id) {
            expose.push(request_id);
        }
        layer = layer.expose_headers(expose);
    }

    if let Some(secs) = cors.max_age_secs.filter(|s| *s > 0) {
        layer = layer.max_age(Duration::from_secs(secs));
    }

    Some(layer)
}

fn header_name(v: &str) -> Option<HeaderName> {
    HeaderName::from_bytes(v.to_ascii_lowercase().as_bytes()).ok()
}

/// 解析配置列表：`"*"` 表示任意，无效值记录警告后忽略
fn parse_list<T>(
    label: &str,
    values: &[String],
    parse: impl Fn(&str) -> Option<T>,
) -> (bool, Vec<T>) {
    let mut any = false;
    let mut parsed = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if value == "*" {
            any = true;
            continue;
        }
        match parse(value) {
            Some(v) => parsed.push(v),
            None => tracing::warn!("CORS {} 含无效值: {}", label, value),
        }
    }
    (any, parsed)
}
