use std::time::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use crate::models::{Endpoint, Session};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PayraceConfig {
    pub target: Option<TargetConfig>,
    pub session: Option<Session>,
    pub race: Option<RaceConfig>,
    pub idempotency: Option<IdempotencyConfig>,
    pub websocket: Option<WebSocketConfig>,
    pub scan: Option<ScanConfig>,
}

impl PayraceConfig {
    pub fn race(&self) -> RaceConfig {
        self.race.clone().unwrap_or_default()
    }

    pub fn idempotency(&self) -> IdempotencyConfig {
        self.idempotency.clone().unwrap_or_default()
    }

    pub fn websocket(&self) -> WebSocketConfig {
        self.websocket.clone().unwrap_or_default()
    }

    pub fn scan(&self) -> ScanConfig {
        self.scan.clone().unwrap_or_default()
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.target.as_ref().map(|t| t.endpoints.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TargetConfig {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// Settings for the generic barrier/collector/classifier round.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RaceConfig {
    pub concurrency: usize,
    /// Throwaway GETs sent before the timed round to fill the connection pool.
    pub warmup_requests: usize,
    pub settle_ms: u64,
    pub request_timeout_secs: u64,
    /// Outer deadline for a whole round, applied by the caller.
    pub round_timeout_secs: u64,
    pub body_preview_bytes: usize,
    /// Rounds with fewer results than this are treated as under-sampled.
    pub min_results: usize,
    /// JSON body every worker sends.
    pub payload: Value,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            warmup_requests: 10,
            settle_ms: 100,
            request_timeout_secs: 30,
            round_timeout_secs: 60,
            body_preview_bytes: 4096,
            min_results: 2,
            payload: json!({
                "amount": 100,
                "currency": "USD",
                "action": "debit",
            }),
        }
    }
}

impl RaceConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub header: String,
    /// Workers sharing one key in the concurrent idempotency race.
    pub concurrency: usize,
    /// Pause between the two requests of the sequential probes.
    pub pause_ms: u64,
    /// Age encoded into the key of the expiry probe.
    pub expiry_hours: i64,
    /// Mixed-case key of the case-sensitivity probe; its lowercase form is sent second.
    pub case_probe_key: String,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            header: "Idempotency-Key".to_string(),
            concurrency: 5,
            pause_ms: 500,
            expiry_hours: 25,
            case_probe_key: "AbC123".to_string(),
        }
    }
}

impl IdempotencyConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    /// Upper bound on how long a test waits for a reply to show up.
    pub response_timeout_ms: u64,
    /// Gap between observing a message and replaying it.
    pub replay_delay_ms: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval_ms: 100,
            response_timeout_ms: 2000,
            replay_delay_ms: 2000,
        }
    }
}

impl WebSocketConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn replay_delay(&self) -> Duration {
        Duration::from_millis(self.replay_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    pub max_parallel_endpoints: usize,
    /// Build and log every request, dispatch nothing.
    pub dry_run: bool,
    /// Only test endpoints that look payment related.
    pub payment_only: bool,
    pub endpoint_timeout_secs: u64,
    pub tests: TestSelection,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_parallel_endpoints: 3,
            dry_run: false,
            payment_only: true,
            endpoint_timeout_secs: 300,
            tests: TestSelection::default(),
        }
    }
}

impl ScanConfig {
    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct TestSelection {
    pub race_condition: bool,
    pub multi_endpoint: bool,
    pub idempotency: bool,
}

impl Default for TestSelection {
    fn default() -> Self {
        Self {
            race_condition: true,
            multi_endpoint: true,
            idempotency: true,
        }
    }
}
