use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::{AdminConfig, AppConfig, LetteringConfig};
use crate::error::AppError;
use crate::features::export::ArchiveExporter;
use crate::features::lettering::allocator::StyleAllocator;
use crate::features::lettering::preload::ImagePreloadQueue;
use crate::features::lettering::renderer::TextRenderer;
use crate::features::lettering::session::{LetteringSession, SessionStore};
use crate::storage::{HttpImageFetcher, StorageClient, UrlResolver};

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 对象存储（URL 解析 / 上传 / 列举）
    pub storage: Arc<StorageClient>,
    /// 标题等无会话场景使用的渲染器
    pub renderer: TextRenderer,
    /// 渲染会话（空闲过期）
    pub sessions: SessionStore,
    pub exporter: Arc<ArchiveExporter<HttpImageFetcher>>,
    pub lettering: Arc<LetteringConfig>,
    pub admin: Arc<AdminConfig>,
}

impl AppState {
    /// 按全局配置构建
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let storage = StorageClient::new(&config.storage)?;
        let fetcher = HttpImageFetcher::new()
            .map_err(|e| AppError::Internal(format!("图片 HTTP Client 初始化失败: {e}")))?;
        Ok(Self::with_parts(config, storage, fetcher))
    }

    /// 使用给定的存储客户端与拉取器构建（测试中指向本地服务）
    pub fn with_parts(config: &AppConfig, storage: StorageClient, fetcher: HttpImageFetcher) -> Self {
        let storage = Arc::new(storage);
        let fetcher = Arc::new(fetcher);
        let resolver: Arc<dyn UrlResolver> = storage.clone();
        let renderer = TextRenderer::new(
            StyleAllocator::new(config.lettering.max_styles),
            resolver,
        );

        let session_renderer = renderer.clone();
        let session_fetcher = Arc::clone(&fetcher);
        let batch_size = config.lettering.batch_size;
        let max_repair_attempts = config.lettering.max_repair_attempts;
        let sessions = SessionStore::new(&config.session, move |id| {
            LetteringSession::new(
                id,
                session_renderer.clone(),
                ImagePreloadQueue::spawn(Arc::clone(&session_fetcher), batch_size),
                max_repair_attempts,
                StdRng::from_entropy(),
            )
        });

        Self {
            exporter: Arc::new(ArchiveExporter::new(fetcher, &config.export)),
            storage,
            renderer,
            sessions,
            lettering: Arc::new(config.lettering.clone()),
            admin: Arc::new(config.admin.clone()),
        }
    }
}
