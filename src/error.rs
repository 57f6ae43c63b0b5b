use std::path::PathBuf;
use thiserror::Error;

/// 入口级（结构性）错误：路径不存在、无法识别的格式
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("路径不存在: {path}")]
    NotFound { path: PathBuf },

    #[error("无法识别的离线输入格式: {path}")]
    UnknownFormat { path: PathBuf },

    #[error("读取 {path} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法创建解析线程池: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// 单个文件的解析错误，只影响该文件本身
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("读取 {path} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("格式错误的 Katana 文件 {path}: {reason}")]
    MalformedKatana { path: PathBuf, reason: &'static str },
}

/// 断点续扫文件的 I/O 错误
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("无法读取断点文件 {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法打开断点文件 {path} 进行追加: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 在线目标校验错误
#[derive(Error, Debug, PartialEq)]
pub enum TargetError {
    #[error("无效的 URL '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("URL 必须是以 http:// 或 https:// 开头的绝对地址: {0}")]
    UnsupportedScheme(String),

    #[error("URL 缺少主机名: {0}")]
    MissingHost(String),
}

/// 在线抓取错误
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("抓取 {url} 失败: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("抓取 {url} 超时（{timeout_secs}s）")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("无法创建 HTTP 客户端: {0}")]
    Client(#[source] reqwest::Error),
}

/// 技术检测调用错误
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("检测规则无效: {0}")]
    InvalidRules(String),

    #[error("检测失败: {0}")]
    Failed(String),
}

/// 单个扫描单元在工作线程中的失败原因
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("输入校验失败: {0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("检测任务异常退出: {0}")]
    Join(#[from] tokio::task::JoinError),
}
