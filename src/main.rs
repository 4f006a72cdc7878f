use ransom_art::startup::run_startup_checks;
use ransom_art::config::{AppConfig, LoggingConfig};
use ransom_art::{AppState, ShutdownManager, build_router};

#[tokio::main]
async fn main() {
    // 先加载配置，日志级别与格式来自 logging 段；加载失败时按默认值初始化日志再退出
    let loaded = AppConfig::init_global();
    let logging = match &loaded {
        Ok(()) => AppConfig::global().logging.clone(),
        Err(_) => LoggingConfig::default(),
    };
    init_tracing(&logging);

    if let Err(e) = loaded {
        tracing::error!("Config init failed: {}", e);
        std::process::exit(1);
    }
    let config = AppConfig::global();
    tracing::info!(level = %logging.level, format = %logging.format, "配置已加载");

    // 创建优雅退出管理器
    let shutdown_manager = ShutdownManager::new();

    // 启动信号处理器
    if let Err(e) = shutdown_manager.install_signal_handlers() {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    let app_state = match AppState::from_config(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("应用状态初始化失败: {}", e);
            std::process::exit(1);
        }
    };

    // Run startup checks
    if let Err(e) = run_startup_checks(config, &app_state.storage) {
        tracing::error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    let app = build_router(app_state, config);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("Lettering API: http://{}{}/lettering", addr, config.api.prefix);
    tracing::info!("Export API: http://{}{}/export", addr, config.api.prefix);

    let shutdown_config = &config.shutdown;
    let drain_manager = shutdown_manager.clone();
    let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
        let reason = shutdown_manager.wait().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);
    });
    let mut server = tokio::spawn(async move { graceful.await });

    // 退出信号之后最多等待 timeout_secs，超时且开启 force_quit 时强制退出
    let drain_deadline = async {
        drain_manager.wait().await;
        tokio::time::sleep(shutdown_config.timeout_duration()).await;
    };

    let result = tokio::select! {
        res = &mut server => res,
        _ = drain_deadline => {
            tracing::warn!("优雅退出超时（{}秒）", shutdown_config.timeout_secs);
            if shutdown_config.force_quit {
                tracing::info!("等待 {} 秒后强制退出", shutdown_config.force_delay_secs);
                tokio::time::sleep(shutdown_config.force_delay_duration()).await;
                std::process::exit(1);
            }
            server.await
        }
    };

    match result {
        Ok(Ok(())) => tracing::info!("服务器已优雅关闭"),
        Ok(Err(e)) => {
            tracing::error!("服务器运行错误: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("服务器任务异常退出: {}", e);
            std::process::exit(1);
        }
    }
}

/// RUST_LOG 优先，否则使用配置中的级别
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter_directives().into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.is_compact() {
        builder.compact().init();
    } else {
        builder.init();
    }
}
