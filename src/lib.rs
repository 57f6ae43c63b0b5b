pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod models;
pub mod operations;
pub mod output;
pub mod scanner;
pub mod utils;

// 重新导出常用模块
pub use capture::{count_offline, detect_format, open_offline, CaptureFormat, CaptureParser, ParseContext, UnitStream};
pub use error::{CaptureError, CheckpointError, DetectError, FetchError, ParseError, TargetError, UnitError};
pub use models::{Detection, DetectionBatch, LiveTarget, NormalizedInput, SourceHint};
pub use scanner::{CheckpointLog, ScanPipeline, ScanTracker};
