use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::checkpoint::CheckpointLog;
use super::fetcher::Fetcher;
use super::tracker::ScanTracker;
use crate::capture::UnitStream;
use crate::detect::Detector;
use crate::error::{FetchError, UnitError};
use crate::models::{DetectionBatch, LiveTarget, NormalizedInput, SourceHint};

/// 工作通道与结果通道的容量
const CHANNEL_CAPACITY: usize = 1;

/// 管道中流转的单元
pub trait ScanUnit: Send + 'static {
    /// 断点记录使用的标识
    fn checkpoint_id(&self) -> &str;

    /// 解析器已判定为断点命中
    fn is_skip_marker(&self) -> bool {
        false
    }
}

impl ScanUnit for NormalizedInput {
    fn checkpoint_id(&self) -> &str {
        NormalizedInput::checkpoint_id(self)
    }

    fn is_skip_marker(&self) -> bool {
        self.skipped
    }
}

impl ScanUnit for LiveTarget {
    fn checkpoint_id(&self) -> &str {
        &self.url
    }
}

/// 单元的实际处理：抓取（在线）和检测
pub trait UnitWork<U>: Send + Sync + 'static {
    fn process(&self, unit: U) -> BoxFuture<'_, Result<DetectionBatch, UnitError>>;
}

/// 在阻塞线程池中执行检测
async fn detect_blocking(
    detector: &Arc<dyn Detector>,
    hint: SourceHint,
    domain: &str,
    url: &str,
    headers: crate::models::HeaderMap,
    body: Vec<u8>,
) -> Result<DetectionBatch, UnitError> {
    let detector = Arc::clone(detector);
    let detections = tokio::task::spawn_blocking(move || detector.detect(&headers, &body, hint)).await??;
    Ok(DetectionBatch::enrich(domain, url, detections))
}

/// 离线单元：校验后直接检测
#[derive(Clone)]
pub struct OfflineWork {
    pub detector: Arc<dyn Detector>,
    pub hint: SourceHint,
}

impl UnitWork<NormalizedInput> for OfflineWork {
    fn process(&self, unit: NormalizedInput) -> BoxFuture<'_, Result<DetectionBatch, UnitError>> {
        Box::pin(async move {
            unit.validate().map_err(UnitError::Invalid)?;
            let NormalizedInput {
                domain,
                url,
                headers,
                body,
                ..
            } = unit;
            detect_blocking(&self.detector, self.hint, &domain, &url, headers, body).await
        })
    }
}

/// 在线目标：带超时抓取后检测
#[derive(Clone)]
pub struct OnlineWork {
    pub fetcher: Arc<dyn Fetcher>,
    pub detector: Arc<dyn Detector>,
    pub hint: SourceHint,
    pub timeout: Duration,
}

impl UnitWork<LiveTarget> for OnlineWork {
    fn process(&self, target: LiveTarget) -> BoxFuture<'_, Result<DetectionBatch, UnitError>> {
        Box::pin(async move {
            let response = tokio::time::timeout(self.timeout, self.fetcher.fetch(&target, self.timeout))
                .await
                .map_err(|_| FetchError::Timeout {
                    url: target.url.clone(),
                    timeout_secs: self.timeout.as_secs(),
                })??;

            let (headers, body) = match self.hint {
                SourceHint::HeadersOnly => (response.headers, Vec::new()),
                SourceHint::BodyOnly => (Default::default(), response.body),
                SourceHint::Auto => (response.headers, response.body),
            };
            detect_blocking(&self.detector, self.hint, &target.domain, &target.url, headers, body).await
        })
    }
}

/// 有界工作池：一个生产者、W 个工作者、一个结果消费者
pub struct ScanPipeline {
    workers: usize,
    checkpoint: Arc<CheckpointLog>,
    tracker: Arc<ScanTracker>,
    cancel: CancellationToken,
}

/// 正在运行的扫描
pub struct ScanHandle {
    results: mpsc::Receiver<DetectionBatch>,
    tasks: Vec<JoinHandle<()>>,
}

impl ScanHandle {
    /// 下一个结果批次；所有工作者结束后返回 None
    pub async fn next_batch(&mut self) -> Option<DetectionBatch> {
        self.results.recv().await
    }

    /// 等待生产者和工作者全部退出
    pub async fn join(self) {
        drop(self.results);
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!("扫描任务异常退出: {}", err);
            }
        }
    }
}

impl ScanPipeline {
    pub fn new(
        workers: usize,
        checkpoint: Arc<CheckpointLog>,
        tracker: Arc<ScanTracker>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            workers: workers.max(1),
            checkpoint,
            tracker,
            cancel,
        }
    }

    /// 离线扫描：单元边解析边分发
    pub fn run_offline(&self, units: UnitStream, work: OfflineWork) -> ScanHandle {
        let (work_tx, work_rx) = mpsc::channel::<NormalizedInput>(CHANNEL_CAPACITY);

        let cancel = self.cancel.clone();
        let producer = tokio::task::spawn_blocking(move || {
            for unit in units {
                if cancel.is_cancelled() || work_tx.blocking_send(unit).is_err() {
                    break;
                }
            }
        });

        self.spawn_workers(work_rx, Arc::new(work), producer)
    }

    /// 在线扫描
    pub fn run_online(&self, targets: Vec<LiveTarget>, work: OnlineWork) -> ScanHandle {
        let (work_tx, work_rx) = mpsc::channel::<LiveTarget>(CHANNEL_CAPACITY);

        let cancel = self.cancel.clone();
        let producer = tokio::spawn(async move {
            for target in targets {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = work_tx.send(target) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        self.spawn_workers(work_rx, Arc::new(work), producer)
    }

    fn spawn_workers<U, W>(&self, work_rx: mpsc::Receiver<U>, work: Arc<W>, producer: JoinHandle<()>) -> ScanHandle
    where
        U: ScanUnit,
        W: UnitWork<U>,
    {
        let (result_tx, result_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let mut tasks = vec![producer];
        for worker_id in 0..self.workers {
            let worker = Worker {
                id: worker_id,
                work_rx: Arc::clone(&work_rx),
                result_tx: result_tx.clone(),
                work: Arc::clone(&work),
                checkpoint: Arc::clone(&self.checkpoint),
                tracker: Arc::clone(&self.tracker),
                cancel: self.cancel.clone(),
            };
            tasks.push(tokio::spawn(worker.run()));
        }

        ScanHandle {
            results: result_rx,
            tasks,
        }
    }
}

struct Worker<U, W> {
    id: usize,
    work_rx: Arc<Mutex<mpsc::Receiver<U>>>,
    result_tx: mpsc::Sender<DetectionBatch>,
    work: Arc<W>,
    checkpoint: Arc<CheckpointLog>,
    tracker: Arc<ScanTracker>,
    cancel: CancellationToken,
}

impl<U: ScanUnit, W: UnitWork<U>> Worker<U, W> {
    async fn run(self) {
        while let Some(unit) = self.next_unit().await {
            let id = unit.checkpoint_id().to_string();

            // 断点命中：不做任何 I/O，计为成功
            if unit.is_skip_marker() || self.checkpoint.is_completed(&id) {
                self.tracker.record_skip();
                continue;
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                outcome = self.work.process(unit) => outcome,
            };

            match outcome {
                Ok(batch) => {
                    let sent = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => false,
                        sent = self.result_tx.send(batch) => sent.is_ok(),
                    };
                    if !sent {
                        break;
                    }
                    self.mark_completed(id).await;
                    self.tracker.record_success();
                }
                Err(err) => {
                    tracing::warn!("处理 {} 失败: {}", id, err);
                    self.tracker.record_error();
                }
            }
        }
        tracing::debug!("工作者 {} 退出", self.id);
    }

    /// 断点追加写是同步文件 I/O，放到阻塞线程池执行
    async fn mark_completed(&self, id: String) {
        if !self.checkpoint.is_enabled() {
            return;
        }
        let checkpoint = Arc::clone(&self.checkpoint);
        if let Err(err) = tokio::task::spawn_blocking(move || checkpoint.mark_completed(&id)).await {
            tracing::error!("写入断点记录的任务异常退出: {}", err);
        }
    }

    async fn next_unit(&self) -> Option<U> {
        let mut work_rx = self.work_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            unit = work_rx.recv() => unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectError;
    use crate::models::{Detection, HeaderMap};
    use crate::scanner::fetcher::FetchedResponse;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingDetector {
        calls: AtomicUsize,
    }

    impl Detector for CountingDetector {
        fn detect(&self, _headers: &HeaderMap, body: &[u8], hint: SourceHint) -> Result<Vec<Detection>, DetectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if body == b"explode" {
                return Err(DetectError::Failed("boom".to_string()));
            }
            Ok(vec![Detection {
                domain: String::new(),
                url: String::new(),
                technology: "Test".to_string(),
                source: hint.source_tag().to_string(),
                path: "body".to_string(),
                evidence: String::from_utf8_lossy(body).to_string(),
                confidence: "high".to_string(),
                timestamp: Utc::now(),
            }])
        }
    }

    struct StaticFetcher;

    impl Fetcher for StaticFetcher {
        fn fetch<'a>(&'a self, target: &'a LiveTarget, _timeout: Duration) -> BoxFuture<'a, Result<FetchedResponse, FetchError>> {
            Box::pin(async move {
                if target.domain == "slow.test" {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok(FetchedResponse {
                    headers: HeaderMap::new(),
                    body: target.domain.clone().into_bytes(),
                })
            })
        }
    }

    fn pipeline(workers: usize, checkpoint: CheckpointLog) -> (ScanPipeline, Arc<CheckpointLog>, Arc<ScanTracker>) {
        let checkpoint = Arc::new(checkpoint);
        let tracker = Arc::new(ScanTracker::hidden());
        let pipeline = ScanPipeline::new(
            workers,
            Arc::clone(&checkpoint),
            Arc::clone(&tracker),
            CancellationToken::new(),
        );
        (pipeline, checkpoint, tracker)
    }

    async fn drain(mut handle: ScanHandle) -> Vec<DetectionBatch> {
        let mut batches = Vec::new();
        while let Some(batch) = handle.next_batch().await {
            batches.push(batch);
        }
        handle.join().await;
        batches
    }

    #[tokio::test]
    async fn test_offline_success_and_failures() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (pipeline, checkpoint, tracker) =
            pipeline(3, CheckpointLog::open(temp_dir.path().join("resume"), true).unwrap());

        let units: Vec<NormalizedInput> = vec![
            NormalizedInput::new("a.test", "https://a.test/", "/a").with_body(b"a".to_vec()),
            NormalizedInput::new("b.test", "", "/b").with_body(b"b".to_vec()),
            NormalizedInput::new("", "https://nodomain.test/", "/c"),
            NormalizedInput::new("d.test", "https://d.test/", "/d").with_body(b"explode".to_vec()),
        ];
        let detector = Arc::new(CountingDetector::default());
        let work = OfflineWork {
            detector: detector.clone(),
            hint: SourceHint::Auto,
        };

        let batches = drain(pipeline.run_offline(Box::new(units.into_iter()), work)).await;

        assert_eq!(batches.len(), 2);
        let a = batches.iter().find(|b| b.domain == "a.test").unwrap();
        assert_eq!(a.detections[0].domain, "a.test");
        assert_eq!(a.detections[0].url, "https://a.test/");

        let summary = tracker.summary();
        assert_eq!(summary.success, 2);
        assert_eq!(summary.errors, 2);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 3);

        assert!(checkpoint.is_completed("https://a.test/"));
        assert!(checkpoint.is_completed("b.test"));
        assert!(!checkpoint.is_completed("https://d.test/"));

        // 追加写在阻塞线程池完成后结果才计为成功
        let written = std::fs::read_to_string(temp_dir.path().join("resume")).unwrap();
        let mut lines: Vec<_> = written.lines().collect();
        lines.sort();
        assert_eq!(lines, vec!["b.test", "https://a.test/"]);
    }

    #[tokio::test]
    async fn test_completed_units_skip_detection() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = CheckpointLog::open(temp_dir.path().join("resume"), true).unwrap();
        log.mark_completed("https://done.test/");
        let (pipeline, _checkpoint, tracker) = pipeline(2, log);

        let units = vec![
            NormalizedInput::new("done.test", "https://done.test/", "/x"),
            NormalizedInput::new("marker.test", "", "/y").into_skip_marker(),
            NormalizedInput::new("new.test", "https://new.test/", "/z"),
        ];
        let detector = Arc::new(CountingDetector::default());
        let work = OfflineWork {
            detector: detector.clone(),
            hint: SourceHint::Auto,
        };

        let batches = drain(pipeline.run_offline(Box::new(units.into_iter()), work)).await;
        assert_eq!(batches.len(), 1);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);

        let summary = tracker.summary();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.success, 3);
    }

    #[tokio::test]
    async fn test_online_timeout_is_unit_failure() {
        let (pipeline, checkpoint, tracker) = pipeline(2, CheckpointLog::disabled());
        let targets = vec![
            LiveTarget::parse("https://fast.test").unwrap(),
            LiveTarget::parse("https://slow.test").unwrap(),
        ];
        let work = OnlineWork {
            fetcher: Arc::new(StaticFetcher),
            detector: Arc::new(CountingDetector::default()),
            hint: SourceHint::HeadersOnly,
            timeout: Duration::from_millis(50),
        };

        let batches = drain(pipeline.run_online(targets, work)).await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].url, "https://fast.test");
        assert_eq!(batches[0].detections[0].source, "fingerprint-header");
        assert_eq!(batches[0].detections[0].evidence, "");

        assert_eq!(tracker.summary().errors, 1);
        assert!(!checkpoint.is_completed("https://fast.test"));
    }

    #[tokio::test]
    async fn test_cancelled_pipeline_stops() {
        let checkpoint = Arc::new(CheckpointLog::disabled());
        let tracker = Arc::new(ScanTracker::hidden());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pipeline = ScanPipeline::new(4, checkpoint, Arc::clone(&tracker), cancel);

        let units = (0..1000).map(|i| NormalizedInput::new(format!("{i}.test"), "", format!("/{i}")));
        let work = OfflineWork {
            detector: Arc::new(CountingDetector::default()),
            hint: SourceHint::Auto,
        };

        let batches = drain(pipeline.run_offline(Box::new(units), work)).await;
        assert!(batches.is_empty());
        assert_eq!(tracker.summary().processed(), 0);
    }
}
