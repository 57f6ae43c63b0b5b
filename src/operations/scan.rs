use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::capture::{count_offline, open_offline, CaptureFormat, ParseContext};
use crate::config::Config;
use crate::detect::Detector;
use crate::output::{drain, ResultSink};
use crate::scanner::{
    resolve_targets, CheckpointLog, Fetcher, OfflineWork, OnlineWork, ScanPipeline, ScanSummary, ScanTracker,
};

/// 一次扫描运行共享的依赖
#[derive(Clone)]
pub struct ScanSession {
    pub config: Config,
    pub detector: Arc<dyn Detector>,
    pub tracker: Arc<ScanTracker>,
    pub cancel: CancellationToken,
}

/// 扫描运行结果
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub summary: ScanSummary,
    /// 离线模式下识别出的格式
    pub format: Option<CaptureFormat>,
    pub batches: u64,
    pub cancelled: bool,
    /// 断点文件是否已删除
    pub checkpoint_removed: bool,
}

impl ScanSession {
    fn open_checkpoint(&self) -> Arc<CheckpointLog> {
        let settings = &self.config.checkpoint;
        Arc::new(CheckpointLog::open_or_disabled(&settings.path, settings.resume))
    }

    fn pipeline(&self, checkpoint: &Arc<CheckpointLog>) -> ScanPipeline {
        ScanPipeline::new(
            self.config.scan.workers,
            Arc::clone(checkpoint),
            Arc::clone(&self.tracker),
            self.cancel.clone(),
        )
    }

    /// 汇总并在完全成功时删除断点文件
    fn finish(&self, checkpoint: &CheckpointLog, format: Option<CaptureFormat>, batches: u64) -> ScanOutcome {
        let summary = self.tracker.finish();
        let cancelled = self.cancel.is_cancelled();

        let checkpoint_removed = checkpoint.is_enabled() && summary.is_clean() && !cancelled;
        if checkpoint_removed {
            checkpoint.cleanup();
        } else if checkpoint.is_enabled() {
            tracing::info!(
                "保留断点文件 {}（失败 {} 个，{}），可使用 --resume 继续",
                checkpoint.path().display(),
                summary.errors,
                if cancelled { "已中断" } else { "未中断" }
            );
        }

        ScanOutcome {
            summary,
            format,
            batches,
            cancelled,
            checkpoint_removed,
        }
    }
}

/// 离线扫描：发现计数 -> 格式识别 -> 流式解析 -> 工作池检测
pub async fn run_offline_scan(
    session: &ScanSession,
    path: &Path,
    mut sinks: Vec<Box<dyn ResultSink>>,
) -> Result<ScanOutcome> {
    if !path.exists() {
        anyhow::bail!("离线输入路径不存在: {}", path.display());
    }

    let checkpoint = session.open_checkpoint();
    let parallelism = session.config.scan.parallelism;

    let total = match checkpoint.loaded_total() {
        Some(total) => {
            tracing::info!("沿用上次运行保存的总数: {}", total);
            total
        }
        None => {
            let root = path.to_path_buf();
            let total = tokio::task::spawn_blocking(move || count_offline(&root, parallelism))
                .await
                .context("发现阶段任务异常退出")??;
            checkpoint.save_total(total);
            total
        }
    };
    session.tracker.set_total(total);

    let mut ctx = ParseContext::new(parallelism);
    if checkpoint.is_enabled() {
        let completed = Arc::clone(&checkpoint);
        ctx = ctx.with_skip(Arc::new(move |id: &str| completed.is_completed(id)));
    }

    let root: PathBuf = path.to_path_buf();
    let (format, units) = tokio::task::spawn_blocking(move || open_offline(&root, &ctx))
        .await
        .context("解析任务异常退出")??;
    tracing::info!("离线格式: {}，预计 {} 个单元", format, total);

    let work = OfflineWork {
        detector: Arc::clone(&session.detector),
        hint: session.config.scan.source_hint,
    };
    let handle = session.pipeline(&checkpoint).run_offline(units, work);
    let batches = drain(handle, &mut sinks).await;

    Ok(session.finish(&checkpoint, Some(format), batches))
}

/// 在线扫描：解析目标列表后抓取并检测
pub async fn run_online_scan(
    session: &ScanSession,
    input: &str,
    fetcher: Arc<dyn Fetcher>,
    mut sinks: Vec<Box<dyn ResultSink>>,
) -> Result<ScanOutcome> {
    let input_owned = input.to_string();
    let targets = tokio::task::spawn_blocking(move || resolve_targets(&input_owned))
        .await
        .context("读取目标任务异常退出")??;
    if targets.is_empty() {
        tracing::warn!("没有可扫描的有效目标: {}", input);
    }

    let checkpoint = session.open_checkpoint();
    let total = targets.len() as u64;
    checkpoint.save_total(total);
    session.tracker.set_total(total);

    let work = OnlineWork {
        fetcher,
        detector: Arc::clone(&session.detector),
        hint: session.config.scan.source_hint,
        timeout: session.config.scan.timeout(),
    };
    let handle = session.pipeline(&checkpoint).run_online(targets, work);
    let batches = drain(handle, &mut sinks).await;

    Ok(session.finish(&checkpoint, None, batches))
}
