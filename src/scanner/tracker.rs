use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::utils::time_format::format_elapsed;

/// 扫描计数与进度条
pub struct ScanTracker {
    progress: ProgressBar,
    total: AtomicU64,
    success: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
    started: Instant,
}

/// 扫描结束后的汇总
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: u64,
    /// 包含断点跳过的单元
    pub success: u64,
    pub errors: u64,
    pub skipped: u64,
    pub elapsed: Duration,
}

impl ScanSummary {
    pub fn processed(&self) -> u64 {
        self.success + self.errors
    }

    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

impl std::fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "处理 {} 个单元（成功 {}，失败 {}，跳过 {}），耗时 {}",
            self.processed(),
            self.success,
            self.errors,
            self.skipped,
            format_elapsed(self.elapsed)
        )
    }
}

impl ScanTracker {
    pub fn new(progress: ProgressBar) -> Self {
        Self {
            progress,
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// 不显示任何进度（测试和静默模式）
    pub fn hidden() -> Self {
        Self::new(ProgressBar::hidden())
    }

    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    /// 发现阶段结束后设置总数
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.progress.set_length(total);
        self.refresh();
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.progress.inc(1);
        self.refresh();
    }

    /// 断点跳过同样计入成功
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        self.record_success();
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.progress.inc(1);
        self.refresh();
    }

    fn refresh(&self) {
        self.progress.set_message(format!(
            "成功 {} | 失败 {} | 跳过 {}",
            self.success.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed)
        ));
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }

    pub fn finish(&self) -> ScanSummary {
        let summary = self.summary();
        self.progress.finish_with_message(format!("扫描完成！{summary}"));
        summary
    }
}

/// 创建进度条：发现阶段显示计数器，设置总数后显示比例
pub fn create_progress_bar(silent: bool) -> ProgressBar {
    if silent {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
    {
        Ok(style) => pb.set_style(style.progress_chars("=> ")),
        Err(err) => tracing::debug!("进度条模板无效: {}", err),
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let tracker = ScanTracker::hidden();
        tracker.set_total(5);
        tracker.record_success();
        tracker.record_skip();
        tracker.record_error();

        let summary = tracker.finish();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.processed(), 3);
        assert!(!summary.is_clean());
    }
}
