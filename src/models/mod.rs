pub mod detection;
pub mod input;
pub mod target;

pub use detection::{Detection, DetectionBatch, SourceHint};
pub use input::{host_header, HeaderMap, NormalizedInput, UNDETERMINED_DOMAIN};
pub use target::LiveTarget;
