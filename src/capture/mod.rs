//! 离线抓包数据的格式识别与解析
//!
//! 每种 [`CaptureFormat`] 对应一个 [`CaptureParser`] 实现，由格式嗅探结果一次性选定，
//! 之后所有格式都以同一种惰性单元流 [`UnitStream`] 向扫描管道输出。

pub mod body_only;
pub mod discovery;
pub mod fff;
pub mod headers;
pub mod katana;
pub mod lookahead;
pub mod raw_http;
pub mod sniffer;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::CaptureError;
use crate::models::NormalizedInput;

pub use body_only::BodyOnlyParser;
pub use discovery::count_offline;
pub use fff::FffParser;
pub use katana::{KatanaDirParser, KatanaFileParser};
pub use raw_http::RawHttpParser;
pub use sniffer::detect_format;

/// 惰性、无序的标准化单元序列
pub type UnitStream = Box<dyn Iterator<Item = NormalizedInput> + Send>;

/// 断点续扫判定：传入单元标识，返回是否已完成
pub type SkipPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// 磁盘上抓包数据的格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureFormat {
    Unknown,
    Fff,
    KatanaDirectory,
    KatanaFile,
    RawHttp,
    BodyOnly,
}

impl CaptureFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureFormat::Unknown => "unknown",
            CaptureFormat::Fff => "fff",
            CaptureFormat::KatanaDirectory => "katana-dir",
            CaptureFormat::KatanaFile => "katana-file",
            CaptureFormat::RawHttp => "raw-http",
            CaptureFormat::BodyOnly => "body-only",
        }
    }

    /// 选择该格式的解析器
    pub fn parser(&self) -> Option<Box<dyn CaptureParser>> {
        match self {
            CaptureFormat::Unknown => None,
            CaptureFormat::Fff => Some(Box::new(FffParser)),
            CaptureFormat::KatanaDirectory => Some(Box::new(KatanaDirParser)),
            CaptureFormat::KatanaFile => Some(Box::new(KatanaFileParser)),
            CaptureFormat::RawHttp => Some(Box::new(RawHttpParser)),
            CaptureFormat::BodyOnly => Some(Box::new(BodyOnlyParser)),
        }
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解析时共享的上下文
#[derive(Clone)]
pub struct ParseContext {
    /// 已完成单元判定（断点续扫快速路径）
    pub skip: SkipPredicate,

    /// 并行解析的最大任务数
    pub parallelism: usize,
}

impl ParseContext {
    pub fn new(parallelism: usize) -> Self {
        Self {
            skip: Arc::new(|_: &str| false),
            parallelism: parallelism.max(1),
        }
    }

    pub fn with_skip(mut self, skip: SkipPredicate) -> Self {
        self.skip = skip;
        self
    }

    pub fn should_skip(&self, id: &str) -> bool {
        (self.skip)(id)
    }
}

/// 把一个路径解析为标准化单元流
pub trait CaptureParser: Send + Sync {
    fn parse(&self, path: &Path, ctx: &ParseContext) -> Result<UnitStream, CaptureError>;
}

/// 离线分派入口：嗅探格式并返回统一的单元流
pub fn open_offline(path: &Path, ctx: &ParseContext) -> Result<(CaptureFormat, UnitStream), CaptureError> {
    if !path.exists() {
        return Err(CaptureError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let format = detect_format(path);
    let parser = format.parser().ok_or_else(|| CaptureError::UnknownFormat {
        path: path.to_path_buf(),
    })?;

    tracing::debug!("检测到离线格式 {} : {}", format, path.display());
    let units = parser.parse(path, ctx)?;
    Ok((format, units))
}
