use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one fired request in a dispatch round.
///
/// `elapsed` is signed: it is derived from wall-clock timestamps, and a
/// negative value is a measurement anomaly the classifier must report rather
/// than reject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub worker_id: usize,
    pub status: u16,
    /// Response body, truncated to the configured preview size.
    pub body: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(rename = "elapsed_us", with = "signed_micros")]
    pub elapsed: Duration,
}

impl RaceResult {
    pub fn new(
        worker_id: usize,
        status: u16,
        body: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            worker_id,
            status,
            body,
            started_at,
            finished_at,
            elapsed: finished_at - started_at,
        }
    }

    /// 2xx responses are the only ones that count as a processed operation.
    pub fn is_success(&self) -> bool {
        is_success_status(self.status)
    }
}

pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

mod signed_micros {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_microseconds().unwrap_or(i64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        i64::deserialize(d).map(Duration::microseconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_derived_from_timestamps() {
        let start = Utc::now();
        let end = start + Duration::milliseconds(42);
        let r = RaceResult::new(3, 201, String::new(), start, end);
        assert_eq!(r.elapsed, Duration::milliseconds(42));
        assert!(r.is_success());
    }

    #[test]
    fn test_elapsed_can_be_negative() {
        let start = Utc::now();
        let end = start - Duration::milliseconds(5);
        let r = RaceResult::new(0, 200, String::new(), start, end);
        assert!(r.elapsed < Duration::zero());

        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["elapsed_us"], -5000);
    }

    #[test]
    fn test_success_status_bounds() {
        assert!(is_success_status(200));
        assert!(is_success_status(299));
        assert!(!is_success_status(300));
        assert!(!is_success_status(199));
        assert!(!is_success_status(409));
    }
}
