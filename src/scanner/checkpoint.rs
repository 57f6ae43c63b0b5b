use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use dashmap::DashSet;

use crate::error::CheckpointError;

/// 记录总数的首行前缀
const TOTAL_PREFIX: &str = "TOTAL:";

/// 断点续扫记录：已完成单元标识的追加日志
///
/// 读路径只访问并发集合；写文件由单独的互斥锁串行化。
/// 禁用状态下所有查询返回 false，所有修改都是空操作且不产生任何 I/O。
#[derive(Debug)]
pub struct CheckpointLog {
    path: PathBuf,
    enabled: bool,
    completed: DashSet<String>,
    writer: Mutex<Option<File>>,
    loaded_total: Option<u64>,
    total_saved: AtomicBool,
}

impl CheckpointLog {
    /// 加载已有记录并以追加模式打开文件
    pub fn open(path: impl Into<PathBuf>, enabled: bool) -> Result<Self, CheckpointError> {
        let path = path.into();
        if !enabled {
            return Ok(Self::disabled_at(path));
        }

        let completed = DashSet::new();
        let mut loaded_total = None;

        match File::open(&path) {
            Ok(file) => {
                for (index, line) in BufReader::new(file).lines().enumerate() {
                    let line = line.map_err(|source| CheckpointError::Load {
                        path: path.clone(),
                        source,
                    })?;
                    if index == 0 {
                        if let Some(total) = parse_total_line(&line) {
                            // TOTAL:0 视为未记录总数
                            loaded_total = (total > 0).then_some(total);
                            continue;
                        }
                    }
                    if !line.is_empty() {
                        completed.insert(line);
                    }
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CheckpointError::Load { path, source });
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| CheckpointError::Open {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            "加载断点文件 {}: {} 条已完成记录, 总数 {:?}",
            path.display(),
            completed.len(),
            loaded_total
        );

        Ok(Self {
            path,
            enabled: true,
            completed,
            writer: Mutex::new(Some(file)),
            loaded_total,
            total_saved: AtomicBool::new(false),
        })
    }

    /// 禁用续扫
    pub fn disabled() -> Self {
        Self::disabled_at(PathBuf::new())
    }

    fn disabled_at(path: PathBuf) -> Self {
        Self {
            path,
            enabled: false,
            completed: DashSet::new(),
            writer: Mutex::new(None),
            loaded_total: None,
            total_saved: AtomicBool::new(false),
        }
    }

    /// 打开失败时降级为禁用续扫并给出警告
    pub fn open_or_disabled(path: impl Into<PathBuf>, enabled: bool) -> Self {
        match Self::open(path, enabled) {
            Ok(log) => log,
            Err(err) => {
                tracing::warn!("{}，本次运行不支持断点续扫", err);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 上次运行保存的发现总数
    pub fn loaded_total(&self) -> Option<u64> {
        self.loaded_total
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.enabled && self.completed.contains(id)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// 标记完成并追加一行；同一标识只写一次
    pub fn mark_completed(&self, id: &str) {
        if !self.enabled || !self.completed.insert(id.to_string()) {
            return;
        }
        self.append_line(&format!("{id}\n"));
    }

    /// 仅在没有加载到总数时写入一次
    pub fn save_total(&self, total: u64) {
        if !self.enabled || self.loaded_total.is_some() {
            return;
        }
        if self.total_saved.swap(true, Ordering::SeqCst) {
            return;
        }
        self.append_line(&format!("{TOTAL_PREFIX}{total}\n"));
    }

    /// 删除断点文件（扫描完整结束后调用）
    pub fn cleanup(&self) {
        if !self.enabled {
            return;
        }

        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(file) = writer.take() {
            if let Err(err) = file.sync_all() {
                tracing::debug!("同步断点文件失败: {}", err);
            }
        }

        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("已删除断点文件 {}", self.path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => tracing::warn!("删除断点文件 {} 失败: {}", self.path.display(), err),
        }
    }

    fn append_line(&self, line: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(file) = writer.as_mut() {
            if let Err(err) = file.write_all(line.as_bytes()) {
                tracing::warn!("写入断点文件 {} 失败: {}", self.path.display(), err);
            }
        }
    }
}

fn parse_total_line(line: &str) -> Option<u64> {
    line.strip_prefix(TOTAL_PREFIX)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_disabled_is_inert() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("resume.log");
        let log = CheckpointLog::open(&path, false).unwrap();

        log.mark_completed("https://example.com");
        log.save_total(10);
        assert!(!log.is_completed("https://example.com"));
        assert!(!path.exists());
    }

    #[test]
    fn test_reload_with_total() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("resume.log");

        let log = CheckpointLog::open(&path, true).unwrap();
        log.save_total(3);
        log.save_total(99);
        log.mark_completed("a");
        log.mark_completed("b");
        log.mark_completed("a");
        drop(log);

        assert_eq!(fs::read_to_string(&path).unwrap(), "TOTAL:3\na\nb\n");

        let log = CheckpointLog::open(&path, true).unwrap();
        assert_eq!(log.loaded_total(), Some(3));
        assert!(log.is_completed("a"));
        assert!(log.is_completed("b"));
        assert!(!log.is_completed("c"));
        assert_eq!(log.completed_count(), 2);

        log.save_total(7);
        log.cleanup();
        assert!(!path.exists());
    }

    #[test]
    fn test_first_line_without_total_is_identifier() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("resume.log");
        fs::write(&path, "https://first.test\nTOTAL:5\n").unwrap();

        let log = CheckpointLog::open(&path, true).unwrap();
        assert_eq!(log.loaded_total(), None);
        assert!(log.is_completed("https://first.test"));
        assert!(log.is_completed("TOTAL:5"));
    }

    #[test]
    fn test_concurrent_marks_are_all_persisted() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("resume.log");
        let log = Arc::new(CheckpointLog::open(&path, true).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        log.mark_completed(&format!("unit-{t}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        drop(log);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 400);
        assert!(content.lines().all(|line| line.starts_with("unit-")));
    }

    #[test]
    fn test_open_or_disabled_degrades() {
        let temp_dir = tempdir().unwrap();
        // 目录无法以追加模式打开
        let log = CheckpointLog::open_or_disabled(temp_dir.path(), true);
        assert!(!log.is_enabled());
        assert!(!log.is_completed("x"));
    }
}
