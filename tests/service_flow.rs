use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    body::{Body, Bytes, to_bytes},
    extract::Path,
    http::{HeaderMap, Method, Request, StatusCode},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use ransom_art::config::AppConfig;
use ransom_art::storage::{HttpImageFetcher, StorageClient};
use ransom_art::{AppState, build_router};

const ADMIN_TOKEN: &str = "test-admin-token";

fn tiny_png() -> Bytes {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 10, 10, 255]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    Bytes::from(buf.into_inner())
}

/// 本地对象存储：`Q/` 下的图片全部 404，其余返回 PNG
async fn spawn_storage() -> String {
    let png = tiny_png();
    let app = Router::new()
        .route(
            "/storage/v1/object/public/images/*path",
            get(move |Path(path): Path<String>| {
                let png = png.clone();
                async move {
                    if path.starts_with("Q/") {
                        (StatusCode::NOT_FOUND, Bytes::new())
                    } else {
                        (StatusCode::OK, png)
                    }
                }
            }),
        )
        .route(
            "/storage/v1/object/images/*path",
            post(|Path(path): Path<String>, headers: HeaderMap| async move {
                assert!(headers.contains_key("apikey"));
                assert_eq!(
                    headers.get("x-upsert").and_then(|v| v.to_str().ok()),
                    Some("true")
                );
                Json(json!({ "Key": format!("images/{path}") }))
            }),
        )
        .route(
            "/storage/v1/object/list/images",
            post(|Json(body): Json<Value>| async move {
                let prefix = body["prefix"].as_str().unwrap_or_default().to_string();
                Json(json!([
                    { "name": format!("{prefix}_01.png"), "id": "1", "updated_at": "2024-01-01T00:00:00Z" },
                    { "name": format!("{prefix}_02.png"), "id": "2" }
                ]))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind storage");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve storage");
    });
    format!("http://{addr}")
}

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.admin.tokens = vec![ADMIN_TOKEN.to_string()];
    cfg
}

async fn configured_app() -> Router {
    let base = spawn_storage().await;
    let cfg = test_config();
    let storage = StorageClient::with_credentials(&base, "anon-key-0123456789", "images", reqwest::Client::new())
        .expect("storage client");
    let state = AppState::with_parts(&cfg, storage, HttpImageFetcher::with_client(reqwest::Client::new()));
    build_router(state, &cfg)
}

fn unconfigured_app() -> Router {
    let cfg = test_config();
    let state = AppState::with_parts(
        &cfg,
        StorageClient::unconfigured("images"),
        HttpImageFetcher::with_client(reqwest::Client::new()),
    );
    build_router(state, &cfg)
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let resp = app.clone().oneshot(req).await.expect("call app");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    (status, headers, body)
}

async fn call_json(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let (status, _, bytes) = call(app, builder.body(body).unwrap()).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

async fn new_session(app: &Router) -> String {
    let (status, body) = call_json(app, Method::POST, "/api/v1/lettering/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    body["sessionId"].as_str().expect("sessionId").to_string()
}

#[tokio::test]
async fn health_reports_storage_and_request_id() {
    let app = configured_app().await;
    let (status, headers, body) = call(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-request-id"));

    let v: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(v["status"], "healthy");
    assert_eq!(v["service"], "ransom-art");
    assert_eq!(v["storageConfigured"], true);

    let (_, v) = call_json(&unconfigured_app(), Method::GET, "/health", None).await;
    assert_eq!(v["storageConfigured"], false);
}

#[tokio::test]
async fn render_with_wait_settles_load_statuses() {
    let app = configured_app().await;
    let id = new_session(&app).await;

    let (status, snap) = call_json(
        &app,
        Method::POST,
        &format!("/api/v1/lettering/sessions/{id}/render?wait=true"),
        Some(json!({ "text": "qa !" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snap["sessionId"], id.as_str());
    assert_eq!(snap["loading"], false);

    let directives = snap["directives"].as_array().expect("directives");
    assert_eq!(directives.len(), 4);

    let q = &directives[0];
    assert_eq!(q["directive"]["type"], "letter");
    assert_eq!(q["directive"]["char"], "Q");
    assert_eq!(q["status"], "failed");

    let a = &directives[1];
    assert_eq!(a["directive"]["char"], "A");
    assert_eq!(a["status"], "loaded");
    let image = a["directive"]["image"].as_str().expect("image url");
    assert!(image.contains("/storage/v1/object/public/images/A/A_"));

    assert_eq!(directives[2]["directive"]["type"], "space");
    assert_eq!(directives[3]["directive"]["type"], "invalid");
    assert_eq!(directives[3]["directive"]["char"], "!");

    // Q 的自动换样式已经用完，手动修复也被拒绝
    let (status, problem) = call_json(
        &app,
        Method::POST,
        &format!("/api/v1/lettering/sessions/{id}/repair"),
        Some(json!({ "position": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(problem["code"], "CONFLICT");

    // 位置 1 是 A，可以手动换样式
    let (status, repaired) = call_json(
        &app,
        Method::POST,
        &format!("/api/v1/lettering/sessions/{id}/repair"),
        Some(json!({ "position": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(repaired["directives"][1]["directive"]["style"], a["directive"]["style"]);
}

#[tokio::test]
async fn live_render_keeps_styles_for_known_letters() {
    let app = configured_app().await;
    let id = new_session(&app).await;
    let uri = format!("/api/v1/lettering/sessions/{id}/render");

    let (_, first) = call_json(&app, Method::POST, &uri, Some(json!({ "text": "ab" }))).await;
    let (_, second) = call_json(&app, Method::POST, &uri, Some(json!({ "text": "abc" }))).await;

    assert_eq!(second["generation"], 2);
    for i in 0..2 {
        assert_eq!(
            first["directives"][i]["directive"]["style"],
            second["directives"][i]["directive"]["style"]
        );
    }

    let (status, current) = call_json(&app, Method::GET, &format!("/api/v1/lettering/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["text"], "abc");
}

#[tokio::test]
async fn regenerate_rejects_blank_text() {
    let app = configured_app().await;
    let id = new_session(&app).await;
    let (status, problem) = call_json(
        &app,
        Method::POST,
        &format!("/api/v1/lettering/sessions/{id}/regenerate"),
        Some(json!({ "text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(problem["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn malformed_body_is_a_problem_document() {
    let app = configured_app().await;
    let id = new_session(&app).await;
    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/lettering/sessions/{id}/render"))
        .header("content-type", "application/json")
        .body(Body::from("{\"text\": 5"))
        .unwrap();
    let (status, headers, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers["content-type"], "application/problem+json");
    let problem: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(problem["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let app = configured_app().await;
    let (status, problem) = call_json(
        &app,
        Method::POST,
        "/api/v1/lettering/sessions/ls_missing/render",
        Some(json!({ "text": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(problem["code"], "NOT_FOUND");
}

#[tokio::test]
async fn export_skips_failed_letters() {
    let app = configured_app().await;
    let id = new_session(&app).await;
    call_json(
        &app,
        Method::POST,
        &format!("/api/v1/lettering/sessions/{id}/render?wait=true"),
        Some(json!({ "text": "a q" })),
    )
    .await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/export")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "sessionId": id }).to_string()))
        .unwrap();
    let (status, headers, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/zip");
    assert_eq!(headers["x-export-entries"], "1");
    assert_eq!(headers["x-export-skipped"], "1");
    let disposition = headers["content-disposition"].to_str().expect("ascii");
    assert!(disposition.contains("a q-art.zip"), "{disposition}");

    let archive = zip::ZipArchive::new(Cursor::new(body.to_vec())).expect("zip");
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort();
    assert_eq!(names, ["name-art/", "name-art/A_1.png"]);
}

#[tokio::test]
async fn export_without_letters_is_rejected() {
    let app = configured_app().await;
    let (status, _) = call_json(
        &app,
        Method::POST,
        "/api/v1/export",
        Some(json!({ "directives": [{ "type": "space" }, { "type": "invalid", "char": "?" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = call_json(&app, Method::POST, "/api/v1/export", Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

/// 记录访问次数的外部服务，用来确认导出不会访问客户端给出的地址
async fn spawn_foreign_server() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let app = Router::new().route(
        "/secret",
        get(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { "INTERNAL-SECRET-TOKEN" }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind foreign");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve foreign");
    });
    (format!("http://{addr}/secret"), hits)
}

#[tokio::test]
async fn export_never_fetches_client_supplied_urls() {
    let app = configured_app().await;
    let (secret_url, hits) = spawn_foreign_server().await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/export")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "directives": [{ "type": "letter", "char": "A", "style": 1, "image": secret_url }],
                "baseName": "a"
            })
            .to_string(),
        ))
        .unwrap();
    let (status, headers, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-export-entries"], "1");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(!body.windows(21).any(|w| w == b"INTERNAL-SECRET-TOKEN"));

    let mut archive = zip::ZipArchive::new(Cursor::new(body.to_vec())).expect("zip");
    let mut entry = archive.by_name("name-art/A_1.png").expect("letter entry");
    let mut bytes = Vec::new();
    std::io::Read::read_to_end(&mut entry, &mut bytes).expect("read entry");
    assert!(bytes.starts_with(b"\x89PNG"));
}

#[tokio::test]
async fn export_rejects_unknown_letters_and_styles() {
    let app = configured_app().await;
    for directive in [
        json!({ "type": "letter", "char": "A", "style": 0 }),
        json!({ "type": "letter", "char": "A", "style": 200 }),
        json!({ "type": "letter", "char": "!", "style": 1 }),
    ] {
        let (status, problem) = call_json(
            &app,
            Method::POST,
            "/api/v1/export",
            Some(json!({ "directives": [directive] })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{directive}");
        assert_eq!(problem["code"], "VALIDATION_FAILED");
    }
}

#[tokio::test]
async fn title_and_decor_layout() {
    let app = configured_app().await;

    let (status, title) = call_json(&app, Method::GET, "/api/v1/lettering/title", None).await;
    assert_eq!(status, StatusCode::OK);
    let lines = title["lines"].as_array().expect("lines");
    assert_eq!(lines.len(), 2);
    let first = lines[0][0]["image"].as_str().expect("image");
    assert!(first.ends_with("/R/R_09.png"), "{first}");

    let (_, random) = call_json(&app, Method::GET, "/api/v1/lettering/title?random=true", None).await;
    assert_eq!(random["lines"][0].as_array().map(Vec::len), Some(18));

    let (status, layout) = call_json(&app, Method::GET, "/api/v1/decor/layout", None).await;
    assert_eq!(status, StatusCode::OK);
    let elements = layout.as_array().expect("elements");
    assert!(!elements.is_empty());
    for e in elements {
        assert!(e["image"].as_str().is_some());
        let top = e["topPct"].as_f64().expect("topPct");
        assert!((0.0..100.0).contains(&top));
    }
}

#[tokio::test]
async fn asset_upload_requires_admin_token() {
    let app = configured_app().await;
    let put = |token: Option<&str>| {
        let mut b = Request::builder()
            .method(Method::PUT)
            .uri("/api/v1/assets/A/A_56.png")
            .header("content-type", "image/png");
        if let Some(t) = token {
            b = b.header("x-admin-token", t);
        }
        b.body(Body::from(tiny_png())).unwrap()
    };

    let (status, _, _) = call(&app, put(None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _, _) = call(&app, put(Some("wrong"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = call(&app, put(Some(ADMIN_TOKEN))).await;
    assert_eq!(status, StatusCode::CREATED);
    let receipt: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(receipt["Key"], "images/A/A_56.png");

    let (status, entries) = call_json(&app, Method::GET, "/api/v1/assets?prefix=A", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries[0]["name"], "A_01.png");
    assert_eq!(entries[0]["updatedAt"], "2024-01-01T00:00:00Z");
}

#[tokio::test]
async fn unconfigured_storage_degrades_gracefully() {
    let app = unconfigured_app();

    let req = Request::builder()
        .method(Method::PUT)
        .uri("/api/v1/assets/A/A_01.png")
        .header("x-admin-token", ADMIN_TOKEN)
        .body(Body::from(tiny_png()))
        .unwrap();
    let (status, _, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let problem: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(problem["code"], "STORAGE_NOT_CONFIGURED");

    let (status, listed) = call_json(&app, Method::GET, "/api/v1/assets?prefix=A", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([]));

    let id = new_session(&app).await;
    let (status, snap) = call_json(
        &app,
        Method::POST,
        &format!("/api/v1/lettering/sessions/{id}/render?wait=true"),
        Some(json!({ "text": "a" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(snap["directives"][0]["directive"]["image"].is_null());
    assert_eq!(snap["directives"][0]["status"], "failed");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = unconfigured_app();
    let (status, doc) = call_json(&app, Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["info"]["title"], "Ransom Art API");
    assert!(doc["paths"]["/lettering/sessions/{id}/render"].is_object());
}
