//! 技术检测边界
//!
//! 扫描管道只依赖 [`Detector`] 接口；[`RuleDetector`] 是基于 TOML 正则规则的一个实现。

pub mod rules;

use crate::error::DetectError;
use crate::models::{Detection, HeaderMap, SourceHint};

pub use rules::{RuleDetector, DEFAULT_RULES};

/// 根据响应头和正文识别技术栈
///
/// 返回结果中的 `domain` / `url` 由调用方补全。
pub trait Detector: Send + Sync {
    fn detect(&self, headers: &HeaderMap, body: &[u8], hint: SourceHint) -> Result<Vec<Detection>, DetectError>;
}
