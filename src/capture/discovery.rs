use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use walkdir::WalkDir;

use super::{detect_format, CaptureFormat};
use crate::error::CaptureError;

/// 快速统计离线单元总数（只看文件名，不解析内容）
///
/// 非目录输入和原始响应转储固定返回 1；转储文件中的多个响应不会被计入。
pub fn count_offline(path: &Path, parallelism: usize) -> Result<u64, CaptureError> {
    let metadata = fs::metadata(path).map_err(|source| CaptureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Ok(1);
    }

    // 原始响应转储只会是单个文件，已在上面按 1 计数
    let format = detect_format(path);

    let entries: Vec<_> = fs::read_dir(path)
        .map_err(|source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .collect();

    let count = AtomicU64::new(0);
    let mut subtrees = Vec::new();
    for entry in entries {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            subtrees.push(entry.path());
        } else if is_target_file(&entry.file_name().to_string_lossy(), format) {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism.max(1))
        .thread_name(|i| format!("discovery-{i}"))
        .build()?;

    pool.install(|| {
        subtrees.par_iter().for_each(|subtree| {
            let found = WalkDir::new(subtree)
                .follow_links(false)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .filter(|entry| is_target_file(&entry.file_name().to_string_lossy(), format))
                .count();
            count.fetch_add(found as u64, Ordering::Relaxed);
        });
    });

    let total = count.load(Ordering::Relaxed);
    tracing::debug!("发现阶段完成: {} 个 {} 单元", total, format);
    Ok(total)
}

/// 每种格式中代表一个单元的文件
fn is_target_file(file_name: &str, format: CaptureFormat) -> bool {
    match format {
        CaptureFormat::Fff => file_name.ends_with(".headers"),
        CaptureFormat::KatanaDirectory | CaptureFormat::KatanaFile => file_name.contains(".txt"),
        _ => true,
    }
}
