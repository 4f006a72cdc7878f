use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use moka::future::Cache;
use rand::rngs::StdRng;
use tokio::sync::watch;

use crate::config::SessionConfig;
use crate::error::{AppError, PreloadError};

use super::models::{DirectiveView, Letter, LoadStatus, RenderDirective, SessionSnapshot};
use super::preload::{ImagePreloadQueue, PreloadStatus};
use super::renderer::{LetterStyles, Rendered, TextRenderer};

struct SessionInner {
    rng: StdRng,
    styles: LetterStyles,
    generation: u64,
    text: String,
    directives: Vec<RenderDirective>,
    /// 当前代内每个字母已使用的换样式次数
    repair_attempts: HashMap<Letter, u32>,
}

/// 一个渲染会话：样式分配状态、当前指令序列和专属的预加载队列。
///
/// 预加载失败时自动为该字母换样式，次数受 `max_repair_attempts` 限制，
/// 用尽后指令保持 `failed` 状态。
pub struct LetteringSession {
    id: String,
    renderer: TextRenderer,
    queue: ImagePreloadQueue,
    max_repair_attempts: u32,
    inner: Mutex<SessionInner>,
    in_flight: watch::Sender<usize>,
}

impl LetteringSession {
    pub fn new(
        id: String,
        renderer: TextRenderer,
        queue: ImagePreloadQueue,
        max_repair_attempts: u32,
        rng: StdRng,
    ) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            id,
            renderer,
            queue,
            max_repair_attempts,
            inner: Mutex::new(SessionInner {
                rng,
                styles: LetterStyles::default(),
                generation: 0,
                text: String::new(),
                directives: Vec::new(),
                repair_attempts: HashMap::new(),
            }),
            in_flight,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 实时预览渲染（样式稳定）
    pub fn render(self: &Arc<Self>, text: &str) -> SessionSnapshot {
        self.apply(text, |renderer, styles, rng| renderer.render(text, styles, rng))
    }

    /// “生成”按钮：全部字母重新随机
    pub fn regenerate(self: &Arc<Self>, text: &str) -> SessionSnapshot {
        self.apply(text, |renderer, styles, rng| {
            renderer.regenerate(text, styles, rng)
        })
    }

    fn apply(
        self: &Arc<Self>,
        text: &str,
        run: impl FnOnce(&TextRenderer, LetterStyles, &mut StdRng) -> Rendered,
    ) -> SessionSnapshot {
        let (generation, tracked) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let rendered = run(&self.renderer, std::mem::take(&mut inner.styles), &mut inner.rng);

            inner.generation += 1;
            inner.text = text.to_string();
            inner.styles = rendered.styles;
            inner.directives = rendered.directives;
            inner.repair_attempts.clear();

            let tracked: BTreeSet<(Letter, String)> = inner
                .directives
                .iter()
                .filter_map(|d| Some((d.letter()?, d.image()?.to_string())))
                .collect();
            (inner.generation, tracked)
        };

        tracing::debug!(
            session = %self.id,
            generation,
            images = tracked.len(),
            "渲染完成，提交预加载"
        );
        for (letter, url) in tracked {
            self.track(generation, letter, url);
        }
        self.snapshot()
    }

    /// 手动修复单个位置：只替换该位置的指令，与自动修复共享次数上限。
    pub fn repair(self: &Arc<Self>, position: usize) -> Result<SessionSnapshot, AppError> {
        let (generation, letter, url) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let len = inner.directives.len();
            let directive = inner.directives.get(position).ok_or_else(|| {
                AppError::Validation(format!("position 超出范围（共 {len} 个字符）"))
            })?;
            let letter = directive
                .letter()
                .ok_or_else(|| AppError::Validation(format!("位置 {position} 不是字母")))?;

            let attempts = inner.repair_attempts.entry(letter).or_insert(0);
            if *attempts >= self.max_repair_attempts {
                return Err(AppError::Conflict(format!(
                    "字母 {letter} 的换样式次数已用尽（{} 次）",
                    self.max_repair_attempts
                )));
            }
            *attempts += 1;

            let replacement = self
                .renderer
                .replacement(letter, &mut inner.styles, &mut inner.rng);
            let url = replacement.image().map(str::to_string);
            inner.directives[position] = replacement;
            (inner.generation, letter, url)
        };

        tracing::info!(session = %self.id, position, %letter, "手动更换字母样式");
        if let Some(url) = url {
            self.track(generation, letter, url);
        }
        Ok(self.snapshot())
    }

    /// 当前渲染结果（带加载状态）
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        let directives = inner
            .directives
            .iter()
            .enumerate()
            .map(|(position, directive)| DirectiveView {
                position,
                status: self.load_status(directive),
                directive: directive.clone(),
            })
            .collect();
        SessionSnapshot {
            session_id: self.id.clone(),
            text: inner.text.clone(),
            generation: inner.generation,
            loading: self.is_loading(),
            directives,
        }
    }

    /// 导出用：当前文本与指令
    pub fn directives(&self) -> (String, Vec<RenderDirective>) {
        let inner = self.lock();
        (inner.text.clone(), inner.directives.clone())
    }

    pub fn is_loading(&self) -> bool {
        *self.in_flight.borrow() > 0
    }

    /// 等待所有预加载（含自动修复）结束；超时返回 false。
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.in_flight.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await,
            Ok(Ok(_))
        )
    }

    fn load_status(&self, directive: &RenderDirective) -> Option<LoadStatus> {
        if directive.letter().is_none() {
            return None;
        }
        let status = match directive.image() {
            None => LoadStatus::Failed,
            Some(url) => match self.queue.status(url) {
                PreloadStatus::Loaded => LoadStatus::Loaded,
                PreloadStatus::Failed => LoadStatus::Failed,
                PreloadStatus::Pending | PreloadStatus::NotRequested => LoadStatus::Pending,
            },
        };
        Some(status)
    }

    fn track(self: &Arc<Self>, generation: u64, letter: Letter, url: String) {
        self.in_flight.send_modify(|n| *n += 1);
        let loaded = self.queue.enqueue(&url);
        let session: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let result = loaded.await;
            let Some(session) = session.upgrade() else {
                return;
            };
            if let Err(e) = result {
                session.on_preload_failed(generation, letter, &url, &e);
            }
            session.in_flight.send_modify(|n| *n = n.saturating_sub(1));
        });
    }

    fn on_preload_failed(self: &Arc<Self>, generation: u64, letter: Letter, url: &str, err: &PreloadError) {
        let replacement = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            // 已被新的渲染覆盖，或已被手动修复
            if inner.generation != generation
                || !inner.directives.iter().any(|d| d.image() == Some(url))
            {
                return;
            }

            let attempts = inner.repair_attempts.entry(letter).or_insert(0);
            if *attempts >= self.max_repair_attempts {
                tracing::warn!(
                    session = %self.id,
                    %letter,
                    url,
                    "换样式次数已用尽，保持失败状态"
                );
                return;
            }
            *attempts += 1;

            let replacement = self
                .renderer
                .replacement(letter, &mut inner.styles, &mut inner.rng);
            if let RenderDirective::Letter { style, .. } = &replacement {
                inner.styles.assignment.insert(letter, *style);
            }
            for d in inner.directives.iter_mut().filter(|d| d.image() == Some(url)) {
                *d = replacement.clone();
            }
            replacement.image().map(str::to_string)
        };

        tracing::warn!(
            session = %self.id,
            %letter,
            url,
            error = %err,
            "字母图片加载失败，已更换样式"
        );
        if let Some(next) = replacement {
            self.track(generation, letter, next);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

type SessionFactory = dyn Fn(String) -> LetteringSession + Send + Sync;

/// 会话存储（moka 缓存，按空闲时间过期）
#[derive(Clone)]
pub struct SessionStore {
    cache: Cache<String, Arc<LetteringSession>>,
    factory: Arc<SessionFactory>,
}

impl SessionStore {
    pub fn new(
        cfg: &SessionConfig,
        factory: impl Fn(String) -> LetteringSession + Send + Sync + 'static,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(cfg.max_sessions)
            .time_to_idle(cfg.idle_duration())
            .build();
        Self {
            cache,
            factory: Arc::new(factory),
        }
    }

    pub async fn create(&self) -> Arc<LetteringSession> {
        let id = format!("ls_{}", uuid::Uuid::new_v4().simple());
        let session = Arc::new((self.factory)(id.clone()));
        self.cache.insert(id, Arc::clone(&session)).await;
        session
    }

    pub async fn get(&self, id: &str) -> Option<Arc<LetteringSession>> {
        self.cache.get(id).await
    }

    pub async fn require(&self, id: &str) -> Result<Arc<LetteringSession>, AppError> {
        self.get(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("会话不存在或已过期: {id}")))
    }
}
