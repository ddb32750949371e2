pub mod context;
pub mod engine;

pub use context::{EndpointDiagnostics, ScanContext, SeverityCounts};
pub use engine::{ScanEngine, ScanReport};
