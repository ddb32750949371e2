use std::sync::LazyLock;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::Rng;
use regex::Regex;

const KEY_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 16;

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^idem_(\d+)_[a-z0-9]{16}$").expect("valid idempotency key regex")
});

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| KEY_CHARSET[rng.gen_range(0..KEY_CHARSET.len())] as char)
        .collect()
}

/// Key of the form `idem_<unix seconds>_<16 chars>` stamped at `at`.
pub fn key_at(at: DateTime<Utc>) -> String {
    format!("idem_{}_{}", at.timestamp(), random_suffix())
}

pub fn generate_key() -> String {
    key_at(Utc::now())
}

/// A key whose embedded timestamp lies `age_hours` in the past.
pub fn expired_key(age_hours: i64) -> String {
    key_at(Utc::now() - Duration::hours(age_hours))
}

/// Timestamp embedded in a generated key, if it has the expected shape.
pub fn key_timestamp(key: &str) -> Option<DateTime<Utc>> {
    let caps = KEY_RE.captures(key)?;
    let secs: i64 = caps.get(1)?.as_str().parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}
