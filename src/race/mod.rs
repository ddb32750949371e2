//! Synchronized dispatch rounds and their grading.
//!
//! A round builds every request first, holds the workers at a release gate,
//! fires them together, joins them, and hands the results to the classifier.

pub mod barrier;
pub mod classifier;
pub mod collector;
pub mod dispatch;
pub mod multi_endpoint;
pub mod tester;
pub mod warmup;

pub use barrier::{GateTicket, ReleaseGate};
pub use classifier::{analyze_round, classify_round, timing_stats, RoundAnalysis, TimingStats, MIN_ROUND_RESULTS};
pub use collector::{RoundObserver, RoundOutcome};
pub use dispatch::{dispatch_prepared, dispatch_round};
pub use multi_endpoint::{infer_confirmation_endpoints, PairJudge, ValidateConfirmRace, CONFIRMATION_PATTERNS};
pub use tester::RaceTester;
pub use warmup::warm_up;
