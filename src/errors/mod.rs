pub mod types;
pub mod classification;

pub use types::PayraceError;
pub use classification::{DispatchFailure, ErrorClassification};
