//! Idempotency-key probes for payment mutations.

pub mod keys;
pub mod tester;

pub use keys::{expired_key, generate_key, key_timestamp};
pub use tester::IdempotencyTester;
