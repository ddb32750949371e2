pub mod formatting;
pub mod truncation;

pub use formatting::{format_delta, format_duration};
pub use truncation::{preview, truncate_body};
