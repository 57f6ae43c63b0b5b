pub mod time_format;

pub use time_format::{format_count, format_elapsed};
