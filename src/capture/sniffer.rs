use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use walkdir::WalkDir;

use super::katana::is_katana_content;
use super::raw_http::is_raw_http_content;
use super::CaptureFormat;

/// 目录探测时进入的最大子目录深度，避免遍历巨大的目录树
const SNIFF_MAX_DIR_DEPTH: usize = 3;

/// 判断 Katana 文本文件时读取的头部字节数
const SNIFF_HEAD_BYTES: usize = 1024;

/// 识别路径对应的抓包格式（只读探测）
pub fn detect_format(path: &Path) -> CaptureFormat {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) => {
            tracing::warn!("无法读取路径信息 {}: {}", path.display(), err);
            return CaptureFormat::Unknown;
        }
    };

    if metadata.is_dir() {
        if is_fff_directory(path) {
            return CaptureFormat::Fff;
        }
        if is_katana_directory(path) {
            return CaptureFormat::KatanaDirectory;
        }
        tracing::debug!("目录 {} 不是 FFF/Katana 结构，按纯正文目录处理", path.display());
        return CaptureFormat::BodyOnly;
    }

    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!("读取文件 {} 以识别格式时失败: {}", path.display(), err);
            return CaptureFormat::Unknown;
        }
    };

    if is_katana_content(&data) {
        CaptureFormat::KatanaFile
    } else if is_raw_http_content(&data) {
        CaptureFormat::RawHttp
    } else {
        CaptureFormat::BodyOnly
    }
}

fn bounded_walk(path: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(path)
        .follow_links(false)
        .max_depth(SNIFF_MAX_DIR_DEPTH + 1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
}

/// 有限深度内同时存在 `.headers` 与 `.body` 文件
pub fn is_fff_directory(path: &Path) -> bool {
    let mut found_headers = false;
    let mut found_body = false;

    for entry in bounded_walk(path) {
        let name = entry.file_name().to_string_lossy();
        found_headers |= name.ends_with(".headers");
        found_body |= name.ends_with(".body");
        if found_headers && found_body {
            return true;
        }
    }

    false
}

/// 顶层存在 `index.txt`，或有限深度内某个 `.txt` 文件头部符合 Katana 特征
pub fn is_katana_directory(path: &Path) -> bool {
    if path.join("index.txt").is_file() {
        return true;
    }

    bounded_walk(path)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".txt"))
        .any(|entry| read_head(entry.path()).is_some_and(|head| is_katana_content(&head)))
}

fn read_head(path: &Path) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    let mut head = Vec::with_capacity(SNIFF_HEAD_BYTES);
    file.take(SNIFF_HEAD_BYTES as u64).read_to_end(&mut head).ok()?;
    Some(head)
}
