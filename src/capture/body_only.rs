use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{CaptureParser, ParseContext, UnitStream};
use crate::error::CaptureError;
use crate::models::NormalizedInput;

/// 纯正文输入：单个文件或递归目录，每个非空文件一个单元
pub struct BodyOnlyParser;

impl CaptureParser for BodyOnlyParser {
    fn parse(&self, path: &Path, ctx: &ParseContext) -> Result<UnitStream, CaptureError> {
        let metadata = fs::metadata(path).map_err(|source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let ctx = ctx.clone();
        if !metadata.is_dir() {
            return Ok(Box::new(read_body_file(path.to_path_buf(), &ctx).into_iter()));
        }

        let units = WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("遍历目录出错: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(move |entry| read_body_file(entry.into_path(), &ctx));

        Ok(Box::new(units))
    }
}

/// 文件名去掉扩展名作为域名
fn infer_domain(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn read_body_file(path: PathBuf, ctx: &ParseContext) -> Option<NormalizedInput> {
    // 空文件直接跳过，不读取内容
    match fs::metadata(&path) {
        Ok(metadata) if metadata.len() == 0 => return None,
        Ok(_) => {}
        Err(err) => {
            tracing::warn!("读取正文文件信息 {} 失败: {}", path.display(), err);
            return None;
        }
    }

    let source_path = path.to_string_lossy().to_string();
    let input = NormalizedInput::new(infer_domain(&path), "", source_path.as_str())
        .with_checkpoint_qualifier(&source_path);
    if ctx.should_skip(input.checkpoint_id()) {
        return Some(input.into_skip_marker());
    }

    match fs::read(&path) {
        Ok(body) if body.is_empty() => None,
        Ok(body) => {
            tracing::debug!("生成纯正文单元: {} (域名: {})", path.display(), input.domain);
            Some(input.with_body(body))
        }
        Err(err) => {
            tracing::warn!("读取正文文件 {} 失败: {}", path.display(), err);
            None
        }
    }
}
