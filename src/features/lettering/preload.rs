use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::body::Bytes;
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};

use crate::error::PreloadError;
use crate::storage::ImageFetcher;

/// 单个 URL 的预加载状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadStatus {
    NotRequested,
    Pending,
    Loaded,
    Failed,
}

type Completion = oneshot::Sender<Result<(), PreloadError>>;

struct QueueEntry {
    url: String,
    done: Completion,
}

type StatusMap = Arc<Mutex<HashMap<String, PreloadStatus>>>;

/// 图片预加载队列
///
/// 单个消费者任务按 `batch_size` 分批取出请求，批内并发拉取并解码，
/// 整批完成后才处理下一批。已加载的 URL 不会再次拉取。
/// 所有句柄被释放后消费者任务自然退出。
#[derive(Clone)]
pub struct ImagePreloadQueue {
    tx: mpsc::UnboundedSender<QueueEntry>,
    statuses: StatusMap,
}

impl ImagePreloadQueue {
    /// 启动消费者任务（需在 tokio 运行时内调用）
    pub fn spawn<F: ImageFetcher>(fetcher: Arc<F>, batch_size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let statuses: StatusMap = Arc::default();
        tokio::spawn(run_worker(
            fetcher,
            rx,
            Arc::clone(&statuses),
            batch_size.max(1),
        ));
        Self { tx, statuses }
    }

    /// 请求预加载 `url`。
    ///
    /// 入队在调用时立即发生；返回的 future 在图片加载成功后完成，失败时返回错误。
    /// 已加载的 URL 直接返回已完成的 future。
    pub fn enqueue(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<(), PreloadError>> + Send + 'static + use<> {
        let pending = {
            let mut statuses = self.lock_statuses();
            match statuses.get(url) {
                Some(PreloadStatus::Loaded) => None,
                _ => {
                    statuses.insert(url.to_string(), PreloadStatus::Pending);
                    Some(())
                }
            }
        };

        let receiver = pending.map(|()| {
            let (done, rx) = oneshot::channel();
            let entry = QueueEntry {
                url: url.to_string(),
                done,
            };
            if self.tx.send(entry).is_err() {
                self.lock_statuses()
                    .insert(url.to_string(), PreloadStatus::Failed);
            }
            rx
        });

        async move {
            match receiver {
                None => Ok(()),
                Some(rx) => rx.await.unwrap_or(Err(PreloadError::QueueClosed)),
            }
        }
    }

    pub fn status(&self, url: &str) -> PreloadStatus {
        self.lock_statuses()
            .get(url)
            .copied()
            .unwrap_or(PreloadStatus::NotRequested)
    }

    pub fn is_loaded(&self, url: &str) -> bool {
        self.status(url) == PreloadStatus::Loaded
    }

    fn lock_statuses(&self) -> MutexGuard<'_, HashMap<String, PreloadStatus>> {
        lock(&self.statuses)
    }
}

fn lock(statuses: &Mutex<HashMap<String, PreloadStatus>>) -> MutexGuard<'_, HashMap<String, PreloadStatus>> {
    statuses.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_worker<F: ImageFetcher>(
    fetcher: Arc<F>,
    mut rx: mpsc::UnboundedReceiver<QueueEntry>,
    statuses: StatusMap,
    batch_size: usize,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(entry) => batch.push(entry),
                Err(_) => break,
            }
        }
        tracing::debug!(size = batch.len(), "处理预加载批次");
        drain_batch(fetcher.as_ref(), &statuses, batch).await;
    }
    tracing::debug!("预加载队列已关闭，消费者退出");
}

async fn drain_batch<F: ImageFetcher>(fetcher: &F, statuses: &StatusMap, batch: Vec<QueueEntry>) {
    // 同批内重复的 URL 只拉取一次
    let mut grouped: Vec<(String, Vec<Completion>)> = Vec::with_capacity(batch.len());
    for QueueEntry { url, done } in batch {
        match grouped.iter_mut().find(|(u, _)| *u == url) {
            Some((_, waiters)) => waiters.push(done),
            None => grouped.push((url, vec![done])),
        }
    }

    let results = join_all(
        grouped
            .iter()
            .map(|(url, _)| load_one(fetcher, statuses, url)),
    )
    .await;

    for ((_, waiters), result) in grouped.into_iter().zip(results) {
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

async fn load_one<F: ImageFetcher>(
    fetcher: &F,
    statuses: &Mutex<HashMap<String, PreloadStatus>>,
    url: &str,
) -> Result<(), PreloadError> {
    if lock(statuses).get(url) == Some(&PreloadStatus::Loaded) {
        return Ok(());
    }

    let result = match fetcher.fetch(url).await {
        Ok(bytes) => decode(bytes).await,
        Err(e) => Err(PreloadError::Fetch(e)),
    };

    let status = match &result {
        Ok(()) => PreloadStatus::Loaded,
        Err(e) => {
            tracing::warn!(url, error = %e, "图片预加载失败");
            PreloadStatus::Failed
        }
    };
    lock(statuses).insert(url.to_string(), status);
    result
}

async fn decode(bytes: Bytes) -> Result<(), PreloadError> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes).map(|_| ()))
        .await
        .map_err(|e| PreloadError::Decode(e.to_string()))?
        .map_err(|e| PreloadError::Decode(e.to_string()))
}
