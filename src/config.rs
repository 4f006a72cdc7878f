use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3940,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（未设置 RUST_LOG 时生效）
    pub level: String,
    /// 日志格式：full|compact
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

impl LoggingConfig {
    /// 未设置 RUST_LOG 时的过滤指令。`level` 含 `=` 时视为完整指令原样使用
    pub fn filter_directives(&self) -> String {
        let level = self.level.trim();
        if level.contains('=') {
            return level.to_string();
        }
        let level = if level.is_empty() { "info" } else { level };
        format!("ransom_art={level},tower_http={level}")
    }

    pub fn is_compact(&self) -> bool {
        self.format.trim().eq_ignore_ascii_case("compact")
    }
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API 路由前缀
    pub prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: "/api/v1".to_string(),
        }
    }
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 是否启用 CORS
    #[serde(default = "CorsConfig::default_enabled")]
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// 允许的方法列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    /// 允许的请求头列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    /// 暴露的响应头列表（下载文件名等需要暴露给浏览器）
    #[serde(default = "CorsConfig::default_expose_headers")]
    pub expose_headers: Vec<String>,
    /// 预检缓存时间（秒）
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CorsConfig {
    fn default_enabled() -> bool {
        false
    }

    fn default_expose_headers() -> Vec<String> {
        vec![
            "content-disposition".to_string(),
            "x-export-entries".to_string(),
            "x-export-skipped".to_string(),
        ]
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            allowed_origins: Vec::new(),
            allowed_methods: Vec::new(),
            allowed_headers: Vec::new(),
            expose_headers: Self::default_expose_headers(),
            max_age_secs: None,
        }
    }
}

/// 对象存储配置（Supabase Storage 兼容）
///
/// `base_url` 与 `access_key` 任一缺失时存储视为“未配置”：
/// 所有公开 URL 解析返回 `None`，上传/列举返回错误或空结果，服务不会因此崩溃。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 存储服务基地址，例如 https://xyz.supabase.co
    #[serde(default)]
    pub base_url: Option<String>,
    /// 访问密钥（anon key）
    #[serde(default)]
    pub access_key: Option<String>,
    /// 存放字母/装饰图片的 bucket
    #[serde(default = "StorageConfig::default_bucket")]
    pub bucket: String,
    /// 存储请求超时（秒）
    #[serde(default = "StorageConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl StorageConfig {
    fn default_bucket() -> String {
        "images".to_string()
    }
    fn default_timeout() -> u64 {
        30
    }

    /// 返回 (base_url, access_key)；配置文件缺省时回退到 `SUPABASE_URL` / `SUPABASE_ANON_KEY`。
    pub fn credentials(&self) -> Option<(String, String)> {
        let base_url = non_empty(self.base_url.clone())
            .or_else(|| non_empty(std::env::var("SUPABASE_URL").ok()))?;
        let access_key = non_empty(self.access_key.clone())
            .or_else(|| non_empty(std::env::var("SUPABASE_ANON_KEY").ok()))?;
        Some((base_url, access_key))
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            access_key: None,
            bucket: Self::default_bucket(),
            timeout_secs: Self::default_timeout(),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// 字母排版配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetteringConfig {
    /// 每个字符可用的样式数量（样式编号范围为 1..=max_styles）
    #[serde(default = "LetteringConfig::default_max_styles")]
    pub max_styles: u8,
    /// 预加载队列每批并发数量
    #[serde(default = "LetteringConfig::default_batch_size")]
    pub batch_size: usize,
    /// 单个字母加载失败后最多替换样式的次数
    #[serde(default = "LetteringConfig::default_max_repair_attempts")]
    pub max_repair_attempts: u32,
    /// 单次输入文本的最大字符数
    #[serde(default = "LetteringConfig::default_max_text_chars")]
    pub max_text_chars: usize,
    /// `wait=true` 时等待预加载完成的上限（毫秒）
    #[serde(default = "LetteringConfig::default_preload_wait_ms")]
    pub preload_wait_ms: u64,
}

impl LetteringConfig {
    fn default_max_styles() -> u8 {
        55
    }
    fn default_batch_size() -> usize {
        5
    }
    fn default_max_repair_attempts() -> u32 {
        3
    }
    fn default_max_text_chars() -> usize {
        64
    }
    fn default_preload_wait_ms() -> u64 {
        5000
    }

    pub fn preload_wait(&self) -> Duration {
        Duration::from_millis(self.preload_wait_ms)
    }
}

impl Default for LetteringConfig {
    fn default() -> Self {
        Self {
            max_styles: Self::default_max_styles(),
            batch_size: Self::default_batch_size(),
            max_repair_attempts: Self::default_max_repair_attempts(),
            max_text_chars: Self::default_max_text_chars(),
            preload_wait_ms: Self::default_preload_wait_ms(),
        }
    }
}

/// 排版会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 内存中最多保留的会话数量
    #[serde(default = "SessionConfig::default_max_sessions")]
    pub max_sessions: u64,
    /// 会话空闲过期时间（秒）
    #[serde(default = "SessionConfig::default_idle_secs")]
    pub idle_secs: u64,
}

impl SessionConfig {
    fn default_max_sessions() -> u64 {
        10_000
    }
    fn default_idle_secs() -> u64 {
        30 * 60
    }

    pub fn idle_duration(&self) -> Duration {
        Duration::from_secs(self.idle_secs.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: Self::default_max_sessions(),
            idle_secs: Self::default_idle_secs(),
        }
    }
}

/// 压缩包导出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// 压缩包内的目录名
    #[serde(default = "ExportConfig::default_folder")]
    pub folder: String,
    /// 导出时并发拉取图片的数量
    #[serde(default = "ExportConfig::default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

impl ExportConfig {
    fn default_folder() -> String {
        "name-art".to_string()
    }
    fn default_fetch_concurrency() -> usize {
        8
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            folder: Self::default_folder(),
            fetch_concurrency: Self::default_fetch_concurrency(),
        }
    }
}

/// 管理配置（资源上传）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// 管理员令牌列表（Header: X-Admin-Token）
    #[serde(
        default = "AdminConfig::default_tokens",
        alias = "admin-tokens",
        alias = "adminTokens"
    )]
    pub tokens: Vec<String>,
}

impl AdminConfig {
    fn default_tokens() -> Vec<String> {
        if let Ok(raw) = std::env::var("APP_ADMIN_TOKENS") {
            return raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        Vec::new()
    }

    /// 校验请求头中携带的令牌
    pub fn is_authorized(&self, token: Option<&str>) -> bool {
        let Some(token) = token.map(str::trim) else {
            return false;
        };
        !token.is_empty() && self.tokens.iter().any(|t| t == token)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            tokens: Self::default_tokens(),
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
    /// 是否启用强制退出
    #[serde(default = "ShutdownConfig::default_force")]
    pub force_quit: bool,
    /// 强制退出前的等待时间（秒）
    #[serde(default = "ShutdownConfig::default_force_delay")]
    pub force_delay_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }
    fn default_force() -> bool {
        true
    }
    fn default_force_delay() -> u64 {
        5
    }

    /// 获取优雅退出超时时间
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 获取强制退出等待时间
    pub fn force_delay_duration(&self) -> Duration {
        Duration::from_secs(self.force_delay_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
            force_quit: Self::default_force(),
            force_delay_secs: Self::default_force_delay(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// CORS 配置
    #[serde(default)]
    pub cors: CorsConfig,
    /// 对象存储配置
    #[serde(default)]
    pub storage: StorageConfig,
    /// 字母排版配置
    #[serde(default)]
    pub lettering: LetteringConfig,
    /// 会话配置
    #[serde(default)]
    pub session: SessionConfig,
    /// 导出配置
    #[serde(default)]
    pub export: ExportConfig,
    /// 管理配置
    #[serde(default)]
    pub admin: AdminConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    ///
    /// 配置文件可缺省（全部字段都有默认值）；环境变量示例：`APP_STORAGE__BASE_URL`。
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = builder.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 校验取值范围，避免运行期出现空区间或零批次
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lettering.max_styles == 0 {
            return Err(ConfigError::Message(
                "lettering.max_styles 必须大于 0".to_string(),
            ));
        }
        if self.lettering.batch_size == 0 {
            return Err(ConfigError::Message(
                "lettering.batch_size 必须大于 0".to_string(),
            ));
        }
        if !matches!(self.logging.format.trim(), "full" | "compact") {
            return Err(ConfigError::Message(format!(
                "logging.format 只支持 full 或 compact: {}",
                self.logging.format
            )));
        }
        if self.export.fetch_concurrency == 0 {
            return Err(ConfigError::Message(
                "export.fetch_concurrency 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取配置文件路径（可由 `APP_CONFIG` 指定）
    fn get_config_path() -> PathBuf {
        std::env::var_os("APP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::{AdminConfig, AppConfig, LoggingConfig, StorageConfig};

    #[test]
    fn defaults_match_lettering_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.lettering.max_styles, 55);
        assert_eq!(cfg.lettering.batch_size, 5);
        assert_eq!(cfg.lettering.max_repair_attempts, 3);
        assert_eq!(cfg.storage.bucket, "images");
        assert_eq!(cfg.export.folder, "name-art");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_styles_and_batches() {
        let mut cfg = AppConfig::default();
        cfg.lettering.max_styles = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.lettering.batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn logging_level_becomes_default_filter() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.filter_directives(), "ransom_art=info,tower_http=info");
        assert!(!cfg.is_compact());

        let cfg = LoggingConfig {
            level: "debug".to_string(),
            format: "Compact".to_string(),
        };
        assert_eq!(cfg.filter_directives(), "ransom_art=debug,tower_http=debug");
        assert!(cfg.is_compact());

        let cfg = LoggingConfig {
            level: "warn,ransom_art=trace".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(cfg.filter_directives(), "warn,ransom_art=trace");

        let mut app = AppConfig::default();
        app.logging.format = "json".to_string();
        assert!(app.validate().is_err());
    }

    #[test]
    fn explicit_credentials_take_precedence_and_blank_is_missing() {
        let cfg = StorageConfig {
            base_url: Some("https://demo.supabase.co".to_string()),
            access_key: Some("anon-key".to_string()),
            ..StorageConfig::default()
        };
        assert_eq!(
            cfg.credentials(),
            Some(("https://demo.supabase.co".to_string(), "anon-key".to_string()))
        );

        let blank = StorageConfig {
            base_url: Some("   ".to_string()),
            access_key: Some("anon-key".to_string()),
            ..StorageConfig::default()
        };
        if std::env::var_os("SUPABASE_URL").is_none() {
            assert_eq!(blank.credentials(), None);
        }
    }

    #[test]
    fn admin_tokens_require_exact_match() {
        let admin = AdminConfig {
            tokens: vec!["secret".to_string()],
        };
        assert!(admin.is_authorized(Some("secret")));
        assert!(admin.is_authorized(Some(" secret ")));
        assert!(!admin.is_authorized(Some("other")));
        assert!(!admin.is_authorized(Some("")));
        assert!(!admin.is_authorized(None));
    }
}
