use crate::config::AppConfig;
use crate::error::AppError;
use crate::storage::StorageClient;

/// 执行启动检查
///
/// 1. 校验配置
/// 2. 输出存储配置（密钥只保留前 10 个字符）
/// 3. 存储未配置或缺少管理员令牌时给出提示，但不阻断启动
pub fn run_startup_checks(config: &AppConfig, storage: &StorageClient) -> Result<(), AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    config
        .validate()
        .map_err(|e| AppError::Internal(format!("配置无效: {e}")))?;

    if storage.is_configured() {
        tracing::info!("✅ 对象存储: {}", storage.describe());
    } else {
        tracing::error!(
            "❌ 对象存储未配置（{}），字母图片地址将全部为空；请设置 APP_STORAGE__BASE_URL / APP_STORAGE__ACCESS_KEY 或 SUPABASE_URL / SUPABASE_ANON_KEY",
            storage.describe()
        );
    }

    if config.admin.tokens.is_empty() {
        tracing::warn!("⚠️ 未配置管理员令牌，资源上传接口将全部拒绝");
    }

    tracing::info!(
        max_styles = config.lettering.max_styles,
        batch_size = config.lettering.batch_size,
        max_repair_attempts = config.lettering.max_repair_attempts,
        "✅ 启动检查完成"
    );
    Ok(())
}
