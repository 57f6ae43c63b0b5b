//! 结果输出：JSON Lines 文件与控制台，可按域名聚合

mod aggregate;

pub use aggregate::{aggregate_by_domain, AggregatedDomain, DomainAggregateSink};

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;

use crate::models::DetectionBatch;
use crate::scanner::ScanHandle;

/// 结果批次的写出端
pub trait ResultSink: Send {
    fn write(&mut self, batch: &DetectionBatch) -> io::Result<()>;

    /// 写出按域名聚合后的结果
    fn write_aggregated(&mut self, domains: &[AggregatedDomain]) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

/// 每条检测结果一行 JSON
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// 续扫时追加写入，否则截断
    pub fn create(path: &Path, append: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonLinesSink {
    fn write(&mut self, batch: &DetectionBatch) -> io::Result<()> {
        for detection in &batch.detections {
            serde_json::to_writer(&mut self.writer, detection)?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    fn write_aggregated(&mut self, domains: &[AggregatedDomain]) -> io::Result<()> {
        for domain in domains {
            serde_json::to_writer(&mut self.writer, domain)?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// 在进度条上方打印命中的技术
pub struct ConsoleSink {
    progress: ProgressBar,
}

impl ConsoleSink {
    pub fn new(progress: ProgressBar) -> Self {
        Self { progress }
    }
}

impl ResultSink for ConsoleSink {
    fn write(&mut self, batch: &DetectionBatch) -> io::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let target = if batch.url.is_empty() { &batch.domain } else { &batch.url };
        let line = format!("[{}] {}", target, batch.technologies().join(", "));
        self.progress.suspend(|| println!("{line}"));
        Ok(())
    }

    fn write_aggregated(&mut self, domains: &[AggregatedDomain]) -> io::Result<()> {
        for domain in domains {
            let line = format!(
                "[{}] {} ({} 个 URL)",
                domain.domain,
                domain.technologies().join(", "),
                domain.urls.len()
            );
            self.progress.suspend(|| println!("{line}"));
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// 消费结果流直到所有工作者结束，返回收到的批次数
///
/// 单个写出端失败只记录警告，已写出的结果不会回滚。
pub async fn drain(mut handle: ScanHandle, sinks: &mut [Box<dyn ResultSink>]) -> u64 {
    let mut batches = 0;
    while let Some(batch) = handle.next_batch().await {
        batches += 1;
        for sink in sinks.iter_mut() {
            if let Err(err) = sink.write(&batch) {
                tracing::warn!("写出结果失败: {}", err);
            }
        }
    }
    handle.join().await;

    for sink in sinks.iter_mut() {
        if let Err(err) = sink.close() {
            tracing::warn!("关闭输出失败: {}", err);
        }
    }
    batches
}
