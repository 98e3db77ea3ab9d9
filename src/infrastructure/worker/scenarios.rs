//! 端到端流水线测试：ConnectionSession → 共享队列 → Worker Pool → 结果回传

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use super::{RemovalWorkerConfig, RemovalWorkerPool, WorkerPoolHandle};
use crate::application::ports::{
    BackgroundRemoverPort, ImageStorePort, RemoverError, SessionManagerPort, TaskOutcome,
    TaskQueuePort,
};
use crate::application::streaming::{
    ConnectionSession, OutboundMessage, StreamLimits, TaskResultMessage,
};
use crate::domain::batch::BatchId;
use crate::infrastructure::adapters::{ImagePipelineConfig, RemovalImageProcessor};
use crate::infrastructure::memory::{InMemoryImageStore, InMemorySessionManager, InMemoryTaskQueue};

/// 记录并发度的 Remover 替身
struct CountingRemover {
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    delay: Duration,
    /// 设置后每次调用需要一个许可才能完成
    gate: Option<Arc<Semaphore>>,
    panic_on_width: Option<u32>,
}

impl CountingRemover {
    fn new(delay: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            delay,
            gate: None,
            panic_on_width: None,
        }
    }

    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(Duration::ZERO)
        }
    }

    fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundRemoverPort for CountingRemover {
    async fn remove(&self, image: DynamicImage) -> Result<RgbaImage, RemoverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        match &self.gate {
            Some(gate) => {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            None => tokio::time::sleep(self.delay).await,
        }

        self.current.fetch_sub(1, Ordering::SeqCst);
        if self.panic_on_width == Some(image.width()) {
            panic!("model crashed");
        }
        Ok(image.to_rgba8())
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

struct Pipeline {
    queue: Arc<InMemoryTaskQueue>,
    sessions: Arc<InMemorySessionManager>,
    store: Arc<InMemoryImageStore>,
    remover: Arc<CountingRemover>,
    pool: WorkerPoolHandle,
}

impl Pipeline {
    fn start(workers: usize, remover: CountingRemover) -> Self {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let sessions = Arc::new(InMemorySessionManager::new());
        let store = Arc::new(InMemoryImageStore::new(500));
        let remover = Arc::new(remover);
        let processor = Arc::new(RemovalImageProcessor::new(
            remover.clone(),
            ImagePipelineConfig::default(),
        ));
        let pool = RemovalWorkerPool::new(
            RemovalWorkerConfig { workers },
            queue.clone(),
            processor,
            store.clone(),
        )
        .start();

        Self {
            queue,
            sessions,
            store,
            remover,
            pool,
        }
    }

    fn connect(&self) -> (ConnectionSession, mpsc::UnboundedReceiver<TaskOutcome>) {
        let (mut session, outcomes) = ConnectionSession::open(
            self.sessions.clone(),
            self.queue.clone(),
            StreamLimits::default(),
        )
        .unwrap();
        let replies = session.handle_text(r#"{"type":"config","backgroundColor":"transparent","fileType":"PNG"}"#);
        assert!(replies.is_empty());
        (session, outcomes)
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([40, 90, 200])));
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

fn upload_batch(
    session: &mut ConnectionSession,
    batch_id: BatchId,
    first_task_id: u64,
    images: Vec<Vec<u8>>,
) -> Vec<OutboundMessage> {
    let mut messages = session.handle_text(&format!(
        r#"{{"type":"batch_start","batchId":{},"batchSize":{}}}"#,
        batch_id,
        images.len()
    ));
    for (offset, payload) in images.into_iter().enumerate() {
        let task_id = first_task_id + offset as u64;
        messages.extend(session.handle_text(&format!(
            r#"{{"type":"image_metadata","filename":"photo_{}.jpg","taskId":{}}}"#,
            task_id, task_id
        )));
        messages.extend(session.handle_binary(payload));
    }
    messages.extend(session.handle_text(&format!(
        r#"{{"type":"batch_end","batchId":{}}}"#,
        batch_id
    )));
    assert!(
        !messages.iter().any(|m| matches!(m, OutboundMessage::Error { .. })),
        "upload failed: {:?}",
        messages
    );
    messages
}

/// 把 Worker 结果交给会话，直到出现指定数量的 batch_complete
async fn drive_until_complete(
    session: &mut ConnectionSession,
    outcomes: &mut mpsc::UnboundedReceiver<TaskOutcome>,
    mut messages: Vec<OutboundMessage>,
    batches: usize,
) -> Vec<OutboundMessage> {
    while completions(&messages).len() < batches {
        let outcome = tokio::time::timeout(Duration::from_secs(10), outcomes.recv())
            .await
            .expect("timed out waiting for worker")
            .expect("outcome channel closed");
        messages.extend(session.on_outcome(outcome));
    }
    messages
}

fn results(messages: &[OutboundMessage]) -> Vec<&TaskResultMessage> {
    messages
        .iter()
        .filter_map(|m| match m {
            OutboundMessage::TaskResult(result) => Some(result),
            _ => None,
        })
        .collect()
}

fn completions(messages: &[OutboundMessage]) -> Vec<(BatchId, usize, usize, usize)> {
    messages
        .iter()
        .filter_map(|m| match m {
            OutboundMessage::BatchComplete {
                batch_id,
                total,
                successful,
                failed,
            } => Some((*batch_id, *total, *successful, *failed)),
            _ => None,
        })
        .collect()
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_single_batch_reports_every_image_then_completes() {
    let pipeline = Pipeline::start(2, CountingRemover::new(Duration::from_millis(5)));
    let (mut session, mut outcomes) = pipeline.connect();

    let uploaded = upload_batch(&mut session, 0, 1, vec![png(8, 8), png(8, 8), png(8, 8)]);
    let received = uploaded
        .iter()
        .filter(|m| matches!(m, OutboundMessage::ImageReceived { .. }))
        .count();
    assert_eq!(received, 3);

    let messages = drive_until_complete(&mut session, &mut outcomes, uploaded, 1).await;

    let results = results(&messages);
    let mut task_ids: Vec<_> = results.iter().map(|r| r.task_id).collect();
    task_ids.sort_unstable();
    assert_eq!(task_ids, vec![1, 2, 3]);
    for result in &results {
        assert!(result.success);
        assert_eq!(result.batch_id, Some(0));
        let image_id = result.image_id.as_deref().unwrap();
        assert_eq!(
            result.download_url.as_deref(),
            Some(format!("/api/download?imageId={}", image_id).as_str())
        );
        assert!(result.filename.as_deref().unwrap().ends_with("-no-bg.png"));
        assert!(pipeline.store.get(image_id).is_ok());
    }

    assert_eq!(completions(&messages), vec![(0, 3, 3, 0)]);
    assert!(matches!(messages.last(), Some(OutboundMessage::BatchComplete { .. })));
}

#[tokio::test]
async fn test_corrupt_image_fails_alone() {
    let pipeline = Pipeline::start(2, CountingRemover::new(Duration::from_millis(5)));
    let (mut session, mut outcomes) = pipeline.connect();

    let images = vec![png(8, 8), b"definitely not an image".to_vec(), png(8, 8)];
    let uploaded = upload_batch(&mut session, 0, 1, images);
    let messages = drive_until_complete(&mut session, &mut outcomes, uploaded, 1).await;

    let results = results(&messages);
    assert_eq!(results.len(), 3);
    for result in &results {
        if result.task_id == 2 {
            assert!(!result.success);
            assert!(result.error.is_some());
            assert!(result.image_id.is_none());
        } else {
            assert!(result.success);
        }
    }
    assert_eq!(completions(&messages), vec![(0, 3, 2, 1)]);
    assert_eq!(pipeline.store.len(), 2);
    assert_eq!(pipeline.remover.calls(), 2);
}

#[tokio::test]
async fn test_remover_panic_becomes_task_failure() {
    let remover = CountingRemover {
        panic_on_width: Some(3),
        ..CountingRemover::new(Duration::ZERO)
    };
    let pipeline = Pipeline::start(1, remover);
    let (mut session, mut outcomes) = pipeline.connect();

    let uploaded = upload_batch(&mut session, 0, 1, vec![png(3, 3), png(4, 4), png(4, 4)]);
    let messages = drive_until_complete(&mut session, &mut outcomes, uploaded, 1).await;

    let failed: Vec<_> = results(&messages)
        .into_iter()
        .filter(|r| !r.success)
        .map(|r| r.task_id)
        .collect();
    assert_eq!(failed, vec![1]);
    assert_eq!(completions(&messages), vec![(0, 3, 2, 1)]);
    assert_eq!(pipeline.pool.stats().failed(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_share_bounded_pool() {
    let pipeline = Arc::new(Pipeline::start(2, CountingRemover::new(Duration::from_millis(20))));

    let clients: Vec<_> = (0..2u64).map(|client| {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let (mut session, mut outcomes) = pipeline.connect();
            let images = (0..5).map(|_| png(8, 8)).collect();
            let uploaded = upload_batch(&mut session, 0, client * 100, images);
            let messages = drive_until_complete(&mut session, &mut outcomes, uploaded, 1).await;
            (session.session_id().to_string(), messages)
        })
    })
    .collect();

    let mut seen_sessions = Vec::new();
    for client in clients {
        let (session_id, messages) = client.await.unwrap();
        let results = results(&messages);
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(completions(&messages), vec![(0, 5, 5, 0)]);
        seen_sessions.push(session_id);
    }

    assert_ne!(seen_sessions[0], seen_sessions[1]);
    assert_eq!(pipeline.remover.calls(), 10);
    assert!(pipeline.remover.peak() <= 2);
    assert!(pipeline.pool.stats().peak_in_flight() <= 2);
}

#[tokio::test]
async fn test_next_batch_uploads_while_previous_processes() {
    let gate = Arc::new(Semaphore::new(0));
    let pipeline = Pipeline::start(2, CountingRemover::gated(gate.clone()));
    let (mut session, mut outcomes) = pipeline.connect();

    let mut uploaded = upload_batch(&mut session, 1, 0, (0..5).map(|_| png(8, 8)).collect());
    wait_for(|| pipeline.remover.current() == 2).await;

    // 第一批还在处理时上传第二批
    uploaded.extend(upload_batch(&mut session, 2, 5, (0..5).map(|_| png(8, 8)).collect()));
    assert_eq!(pipeline.queue.depth(), 8);
    assert!(completions(&uploaded).is_empty());

    gate.add_permits(10);
    let messages = drive_until_complete(&mut session, &mut outcomes, uploaded, 2).await;

    let mut done = completions(&messages);
    done.sort_unstable();
    assert_eq!(done, vec![(1, 5, 5, 0), (2, 5, 5, 0)]);

    for batch_id in [1, 2] {
        let complete_at = messages
            .iter()
            .position(|m| matches!(m, OutboundMessage::BatchComplete { batch_id: id, .. } if *id == batch_id))
            .unwrap();
        let last_result_at = messages
            .iter()
            .rposition(|m| matches!(m, OutboundMessage::TaskResult(r) if r.batch_id == Some(batch_id)))
            .unwrap();
        assert!(last_result_at < complete_at);
    }
}

#[tokio::test]
async fn test_close_cancels_queued_work_and_silences_results() {
    let gate = Arc::new(Semaphore::new(0));
    let pipeline = Pipeline::start(2, CountingRemover::gated(gate.clone()));
    let (mut session, mut outcomes) = pipeline.connect();

    upload_batch(&mut session, 0, 0, (0..100).map(|_| png(4, 4)).collect());
    wait_for(|| pipeline.remover.current() == 2).await;
    assert_eq!(pipeline.queue.depth(), 98);

    assert!(session.handle_text(r#"{"type":"close"}"#).is_empty());
    assert!(session.is_closed());
    assert_eq!(pipeline.queue.depth(), 0);
    assert_eq!(pipeline.sessions.count(), 0);

    gate.add_permits(100);
    let stats = pipeline.pool.stats();
    wait_for(|| stats.skipped() == 2 && stats.in_flight() == 0).await;

    assert!(outcomes.try_recv().is_err());
    assert_eq!(pipeline.remover.calls(), 2);
    assert_eq!(pipeline.store.len(), 0);
}

#[tokio::test]
async fn test_disconnect_releases_result_channel() {
    let gate = Arc::new(Semaphore::new(0));
    let pipeline = Pipeline::start(1, CountingRemover::gated(gate.clone()));
    let (mut session, mut outcomes) = pipeline.connect();

    upload_batch(&mut session, 0, 0, (0..10).map(|_| png(4, 4)).collect());
    wait_for(|| pipeline.remover.current() == 1).await;

    drop(session);
    assert_eq!(pipeline.queue.depth(), 0);
    gate.add_permits(10);

    // 所有发送端都随任务释放，通道关闭且没有任何结果
    let next = tokio::time::timeout(Duration::from_secs(10), outcomes.recv())
        .await
        .expect("channel stayed open");
    assert!(next.is_none());
}

#[tokio::test]
async fn test_shutdown_fails_new_uploads() {
    let pipeline = Pipeline::start(1, CountingRemover::new(Duration::ZERO));
    let (mut session, _outcomes) = pipeline.connect();
    let Pipeline { pool, queue, .. } = pipeline;
    pool.shutdown().await;
    assert!(queue.is_closed());

    let uploaded = upload_batch(&mut session, 0, 0, vec![png(4, 4)]);
    let results = results(&uploaded);
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert_eq!(completions(&uploaded), vec![(0, 1, 0, 1)]);
}
