use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::IdempotencyConfig;
use crate::errors::DispatchFailure;
use crate::http::{HttpReply, HttpTransport, PreparedRequest};
use crate::models::{Confidence, Endpoint, FindingKind, Session, Severity, Vulnerability};
use crate::race::{analyze_round, dispatch_round, RoundObserver, MIN_ROUND_RESULTS};

use super::keys::{expired_key, generate_key};

const STRIPE_IDEMPOTENCY_DOCS: &str = "https://stripe.com/docs/api/idempotent_requests";

/// Probes how an endpoint enforces idempotency keys.
pub struct IdempotencyTester {
    transport: Arc<dyn HttpTransport>,
    config: IdempotencyConfig,
    preview_bytes: usize,
    observer: Option<Arc<dyn RoundObserver>>,
}

impl IdempotencyTester {
    pub fn new(transport: Arc<dyn HttpTransport>, config: IdempotencyConfig) -> Self {
        Self {
            transport,
            config,
            preview_bytes: 4096,
            observer: None,
        }
    }

    pub fn with_preview_bytes(mut self, preview_bytes: usize) -> Self {
        self.preview_bytes = preview_bytes;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RoundObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub async fn test_all(&self, endpoint: &Endpoint, session: &Session) -> Vec<Vulnerability> {
        info!(endpoint = %endpoint.url, "Testing idempotency handling");
        let mut findings = Vec::new();
        findings.extend(self.test_key_collision(endpoint, session).await);
        findings.extend(self.test_expired_key_reuse(endpoint, session).await);
        findings.extend(self.test_missing_key(endpoint, session).await);
        findings.extend(self.test_case_sensitivity(endpoint, session).await);
        findings.extend(self.test_concurrent_race(endpoint, session).await);
        findings
    }

    fn request(&self, endpoint: &Endpoint, session: &Session, key: Option<&str>, payload: &Value) -> PreparedRequest {
        let request = PreparedRequest::new(&endpoint.method, &endpoint.url)
            .json(payload)
            .with_session(session);
        match key {
            Some(key) => request.header(&self.config.header, key),
            None => request,
        }
    }

    /// Send one request; transport failures degrade to `None`.
    async fn send(&self, endpoint: &Endpoint, request: &PreparedRequest) -> Option<HttpReply> {
        match self.transport.send(request).await {
            Ok(reply) => {
                self.observe(endpoint, 1, &[]);
                Some(reply)
            }
            Err(e) => {
                let class = e.classify();
                debug!(
                    endpoint = %endpoint.url,
                    error_type = class.error_type,
                    error = %e,
                    "Idempotency probe request failed"
                );
                self.observe(endpoint, 0, &[class.dispatch]);
                None
            }
        }
    }

    fn observe(&self, endpoint: &Endpoint, completed: usize, failures: &[DispatchFailure]) {
        if let Some(observer) = &self.observer {
            observer.record(&endpoint.url, 1, completed, failures);
        }
    }

    async fn pause(&self) {
        let pause = self.config.pause();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    /// Same key, different payloads: the second must not be processed as new.
    pub async fn test_key_collision(&self, endpoint: &Endpoint, session: &Session) -> Vec<Vulnerability> {
        let key = generate_key();
        let first = json!({"amount": 100, "currency": "USD", "order_id": "test_collision_001"});
        let second = json!({"amount": 200, "currency": "USD", "order_id": "test_collision_002"});

        let Some(reply_a) = self.send(endpoint, &self.request(endpoint, session, Some(&key), &first)).await else {
            return Vec::new();
        };
        if !reply_a.is_success() {
            debug!(endpoint = %endpoint.url, status = reply_a.status, "First collision request rejected, skipping");
            return Vec::new();
        }

        self.pause().await;

        let Some(reply_b) = self.send(endpoint, &self.request(endpoint, session, Some(&key), &second)).await else {
            return Vec::new();
        };

        let collided = reply_b.is_success()
            && reply_b.body != reply_a.body
            && !reply_b.body.to_lowercase().contains("idempotency");
        if !collided {
            return Vec::new();
        }

        warn!(endpoint = %endpoint.url, "Idempotency key accepted for two different requests");
        vec![Vulnerability::new(
            FindingKind::IdempotencyKeyCollision,
            Severity::Critical,
            &endpoint.url,
            &endpoint.method,
        )
        .title("Idempotency Key Collision - Different Requests Accepted")
        .description(
            "Server accepted two different requests with the same idempotency key. \
             This allows attackers to bypass idempotency protection.",
        )
        .proof(format!(
            "Key: {}, Request1: amount=100 ({}), Request2: amount=200 ({}), both accepted with different responses",
            key, reply_a.status, reply_b.status
        ))
        .cwe("CWE-841")
        .cvss(9.1, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:H/A:H")
        .confidence(Confidence::High)
        .remediation(
            "Store a hash of the request body alongside each idempotency key. When a key is \
             reused, return the cached response if the hash matches and reject the request \
             (409 or 422) if it differs.",
        )
        .references(&[STRIPE_IDEMPOTENCY_DOCS, "https://cwe.mitre.org/data/definitions/841.html"])]
    }

    /// A key stamped outside the usual 24h retention window should be refused.
    pub async fn test_expired_key_reuse(&self, endpoint: &Endpoint, session: &Session) -> Vec<Vulnerability> {
        let key = expired_key(self.config.expiry_hours);
        let payload = json!({"amount": 100, "currency": "USD", "order_id": "test_expired_001"});

        let Some(reply) = self.send(endpoint, &self.request(endpoint, session, Some(&key), &payload)).await else {
            return Vec::new();
        };
        if !reply.is_success() {
            return Vec::new();
        }

        vec![Vulnerability::new(
            FindingKind::IdempotencyKeyExpiry,
            Severity::Medium,
            &endpoint.url,
            &endpoint.method,
        )
        .title("No Idempotency Key Expiry Validation")
        .description(
            "Server accepts idempotency keys older than 24 hours (standard expiry window). \
             This could allow replay attacks after key expiry.",
        )
        .proof(format!(
            "Sent key with {}-hour old timestamp: {}, received {}",
            self.config.expiry_hours, key, reply.status
        ))
        .cwe("CWE-613")
        .cvss(5.3, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:L/A:N")
        .confidence(Confidence::Medium)
        .remediation("Enforce a 24-hour expiry window for idempotency keys and reject keys older than it.")
        .references(&[STRIPE_IDEMPOTENCY_DOCS])]
    }

    /// Identical payloads without a key: both being processed means duplicates go through.
    pub async fn test_missing_key(&self, endpoint: &Endpoint, session: &Session) -> Vec<Vulnerability> {
        let payload = json!({"amount": 100, "currency": "USD", "order_id": "test_missing_001"});
        let request = self.request(endpoint, session, None, &payload);

        let Some(first) = self.send(endpoint, &request).await else {
            return Vec::new();
        };
        self.pause().await;
        let Some(second) = self.send(endpoint, &request).await else {
            return Vec::new();
        };

        if !(first.is_success() && second.is_success()) {
            return Vec::new();
        }

        vec![Vulnerability::new(
            FindingKind::IdempotencyKeyMissing,
            Severity::High,
            &endpoint.url,
            &endpoint.method,
        )
        .title("Idempotency Key Not Required")
        .description(
            "Server accepts payment requests without idempotency keys, allowing duplicate \
             charges from network retries or user errors.",
        )
        .proof(format!(
            "Sent 2 identical requests without {} header, both accepted: {}, {}",
            self.config.header, first.status, second.status
        ))
        .cwe("CWE-841")
        .cvss(7.5, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:H/A:N")
        .confidence(Confidence::High)
        .remediation(
            "Require an idempotency key header on all payment mutations (POST/PUT/PATCH) \
             and answer 400 Bad Request when it is missing.",
        )
        .references(&[STRIPE_IDEMPOTENCY_DOCS])]
    }

    /// A key and its lowercase form should be distinct keys.
    pub async fn test_case_sensitivity(&self, endpoint: &Endpoint, session: &Session) -> Vec<Vulnerability> {
        let base_key = self.config.case_probe_key.clone();
        let lower_key = base_key.to_lowercase();
        let payload = json!({"amount": 100, "currency": "USD", "order_id": "test_case_001"});

        let Some(first) = self.send(endpoint, &self.request(endpoint, session, Some(&base_key), &payload)).await else {
            return Vec::new();
        };
        if !first.is_success() {
            return Vec::new();
        }

        self.pause().await;

        let Some(second) = self.send(endpoint, &self.request(endpoint, session, Some(&lower_key), &payload)).await
        else {
            return Vec::new();
        };
        if !second.is_success() {
            return Vec::new();
        }

        vec![Vulnerability::new(
            FindingKind::IdempotencyCaseSensitivity,
            Severity::Low,
            &endpoint.url,
            &endpoint.method,
        )
        .title("Idempotency Keys Not Case-Sensitive")
        .description(
            "Server treats idempotency keys as case-insensitive, which could lead to \
             unexpected collisions.",
        )
        .proof(format!(
            "Keys '{}' and '{}' both accepted ({}, {})",
            base_key, lower_key, first.status, second.status
        ))
        .cwe("CWE-178")
        .cvss(3.7, "CVSS:3.1/AV:N/AC:H/PR:N/UI:N/S:U/C:N/I:L/A:N")
        .confidence(Confidence::Medium)
        .remediation("Compare idempotency keys byte-for-byte so that keys differing only in case stay distinct.")
        .references(&[STRIPE_IDEMPOTENCY_DOCS])]
    }

    /// Several workers share one key and fire through the release gate.
    pub async fn test_concurrent_race(&self, endpoint: &Endpoint, session: &Session) -> Vec<Vulnerability> {
        let key = generate_key();
        let payload = json!({"amount": 100, "currency": "USD", "order_id": "test_race_001"});
        let template = self.request(endpoint, session, Some(&key), &payload);

        let outcome = dispatch_round(
            self.transport.clone(),
            &template,
            self.config.concurrency,
            self.preview_bytes,
        )
        .await;
        if let Some(observer) = &self.observer {
            observer.round_finished(&endpoint.url, &outcome);
        }

        let Some(analysis) = analyze_round(&outcome.results, MIN_ROUND_RESULTS) else {
            return Vec::new();
        };
        if !analysis.is_race() {
            return Vec::new();
        }

        // Identical bodies on every success look like cached replays rather than
        // independent processing.
        let confidence = if analysis.distinct_success_bodies > 1 {
            Confidence::High
        } else {
            Confidence::Medium
        };

        vec![Vulnerability::new(
            FindingKind::IdempotencyRaceCondition,
            Severity::Critical,
            &endpoint.url,
            &endpoint.method,
        )
        .title("Race Condition in Idempotency Key Validation")
        .description(format!(
            "Server processed {} out of {} concurrent requests with the same idempotency key. \
             This indicates a race condition in the idempotency validation logic.",
            analysis.successes, outcome.requested
        ))
        .proof(format!(
            "Sent {} concurrent requests with key '{}', {} succeeded ({} distinct response bodies). {}",
            outcome.requested,
            key,
            analysis.successes,
            analysis.distinct_success_bodies,
            analysis.timing_summary()
        ))
        .cwe("CWE-362")
        .cvss(9.1, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:H/A:H")
        .confidence(confidence)
        .remediation(
            "Claim the key atomically before processing: insert it into a table with a unique \
             constraint inside the same transaction as the operation, and return the stored \
             response when the insert conflicts.",
        )
        .references(&[
            "https://cwe.mitre.org/data/definitions/362.html",
            STRIPE_IDEMPOTENCY_DOCS,
        ])]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PayraceError;
    use crate::http::testing::ScriptedTransport;

    fn config() -> IdempotencyConfig {
        IdempotencyConfig {
            pause_ms: 0,
            ..IdempotencyConfig::default()
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("https://shop.test/api/payments", "POST")
    }

    fn tester(transport: &Arc<ScriptedTransport>) -> IdempotencyTester {
        IdempotencyTester::new(transport.clone(), config())
    }

    #[tokio::test]
    async fn test_key_collision_positive() {
        let transport = Arc::new(ScriptedTransport::new(|_, i| {
            Ok(HttpReply::new(201, &format!("{{\"charge\":\"ch_{}\"}}", i)))
        }));
        let findings = tester(&transport).test_key_collision(&endpoint(), &Session::default()).await;

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].kind, FindingKind::IdempotencyKeyCollision);

        let ops = transport.operations();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].header("idempotency-key"), ops[1].header("idempotency-key"));
        assert_eq!(ops[0].json().unwrap()["amount"], 100);
        assert_eq!(ops[1].json().unwrap()["amount"], 200);
    }

    #[tokio::test]
    async fn test_key_collision_negative_cases() {
        let cases: Vec<ScriptedTransport> = vec![
            ScriptedTransport::new(|_, i| {
                if i == 0 {
                    Ok(HttpReply::new(201, "{\"charge\":\"ch_0\"}"))
                } else {
                    Ok(HttpReply::new(409, "{\"error\":\"Idempotency key reused\"}"))
                }
            }),
            ScriptedTransport::always(201, "{\"charge\":\"ch_0\"}"),
            ScriptedTransport::new(|_, i| {
                if i == 0 {
                    Ok(HttpReply::new(201, "{\"charge\":\"ch_0\"}"))
                } else {
                    Ok(HttpReply::new(200, "{\"error\":\"idempotency mismatch\"}"))
                }
            }),
            ScriptedTransport::always(400, "bad request"),
        ];
        for transport in cases {
            let transport = Arc::new(transport);
            let findings = tester(&transport).test_key_collision(&endpoint(), &Session::default()).await;
            assert!(findings.is_empty());
        }
    }

    #[tokio::test]
    async fn test_collision_skipped_when_first_rejected() {
        let transport = Arc::new(ScriptedTransport::always(401, "unauthorized"));
        let findings = tester(&transport).test_key_collision(&endpoint(), &Session::default()).await;
        assert!(findings.is_empty());
        assert_eq!(transport.operations().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_key_accepted() {
        let transport = Arc::new(ScriptedTransport::always(200, "{}"));
        let findings = tester(&transport).test_expired_key_reuse(&endpoint(), &Session::default()).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);

        let ops = transport.operations();
        let key = ops[0].header("idempotency-key").unwrap();
        let stamped = super::super::keys::key_timestamp(key).unwrap();
        assert!(chrono::Utc::now() - stamped > chrono::Duration::hours(24));
    }

    #[tokio::test]
    async fn test_expired_key_rejected() {
        let transport = Arc::new(ScriptedTransport::always(422, "{\"error\":\"key expired\"}"));
        let findings = tester(&transport).test_expired_key_reuse(&endpoint(), &Session::default()).await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_duplicates() {
        let transport = Arc::new(ScriptedTransport::always(201, "{}"));
        let findings = tester(&transport).test_missing_key(&endpoint(), &Session::default()).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert!(transport
            .operations()
            .iter()
            .all(|r| r.header("idempotency-key").is_none()));
    }

    #[tokio::test]
    async fn test_missing_key_required() {
        let transport = Arc::new(ScriptedTransport::always(400, "{\"error\":\"Idempotency-Key required\"}"));
        let findings = tester(&transport).test_missing_key(&endpoint(), &Session::default()).await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_case_sensitivity() {
        let transport = Arc::new(ScriptedTransport::always(200, "{}"));
        let findings = tester(&transport).test_case_sensitivity(&endpoint(), &Session::default()).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Low);

        let keys: Vec<String> = transport
            .operations()
            .iter()
            .filter_map(|r| r.header("idempotency-key").map(str::to_string))
            .collect();
        assert_eq!(keys, vec!["AbC123", "abc123"]);
    }

    #[tokio::test]
    async fn test_case_sensitive_server() {
        let transport = Arc::new(ScriptedTransport::new(|req, _| {
            if req.header("idempotency-key") == Some("AbC123") {
                Ok(HttpReply::new(200, "{}"))
            } else {
                Ok(HttpReply::new(409, "{}"))
            }
        }));
        let findings = tester(&transport).test_case_sensitivity(&endpoint(), &Session::default()).await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_race_single_success() {
        let transport = Arc::new(ScriptedTransport::first_n_succeed(1));
        let findings = tester(&transport).test_concurrent_race(&endpoint(), &Session::default()).await;
        assert!(findings.is_empty());
        assert_eq!(transport.operations().len(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_race_multiple_successes() {
        let transport = Arc::new(ScriptedTransport::first_n_succeed(3));
        let findings = tester(&transport).test_concurrent_race(&endpoint(), &Session::default()).await;

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].confidence, Confidence::High);
        assert!(findings[0].proof.contains("Sent 5 concurrent requests"));
        assert!(findings[0].proof.contains("3 succeeded"));

        let ops = transport.operations();
        let key = ops[0].header("idempotency-key").unwrap().to_string();
        assert!(ops.iter().all(|r| r.header("idempotency-key") == Some(key.as_str())));
    }

    #[tokio::test]
    async fn test_concurrent_race_identical_replays_lower_confidence() {
        let transport = Arc::new(ScriptedTransport::always(200, "{\"charge\":\"ch_1\"}"));
        let findings = tester(&transport).test_concurrent_race(&endpoint(), &Session::default()).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn test_network_failures_yield_nothing() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| {
            Err(PayraceError::Network("connection refused".into()))
        }));
        let findings = tester(&transport).test_all(&endpoint(), &Session::default()).await;
        assert!(findings.is_empty());
    }
}
