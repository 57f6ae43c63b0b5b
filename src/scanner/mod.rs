pub mod checkpoint;
pub mod fetcher;
pub mod pipeline;
pub mod resolver;
pub mod tracker;

pub use checkpoint::CheckpointLog;
pub use fetcher::{FetchedResponse, Fetcher, HttpFetcher};
pub use pipeline::{OfflineWork, OnlineWork, ScanHandle, ScanPipeline, ScanUnit, UnitWork};
pub use resolver::resolve_targets;
pub use tracker::{create_progress_bar, ScanSummary, ScanTracker};
