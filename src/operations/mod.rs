pub mod scan;

pub use scan::{run_offline_scan, run_online_scan, ScanOutcome, ScanSession};
