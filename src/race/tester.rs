use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RaceConfig;
use crate::heuristics::Classification;
use crate::http::{HttpTransport, PreparedRequest};
use crate::models::{Endpoint, Session, Vulnerability};

use super::classifier::classify_round;
use super::collector::RoundObserver;
use super::dispatch::dispatch_round;
use super::multi_endpoint::{PairJudge, ValidateConfirmRace};
use super::warmup::warm_up;

/// Runs the generic race test against single endpoints.
pub struct RaceTester {
    transport: Arc<dyn HttpTransport>,
    config: RaceConfig,
    classification: Classification,
    confirm_judge: Option<Arc<dyn PairJudge>>,
    observer: Option<Arc<dyn RoundObserver>>,
}

impl RaceTester {
    pub fn new(transport: Arc<dyn HttpTransport>, config: RaceConfig) -> Self {
        Self {
            transport,
            config,
            classification: Classification::default(),
            confirm_judge: None,
            observer: None,
        }
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    pub fn with_confirm_judge(mut self, judge: Arc<dyn PairJudge>) -> Self {
        self.confirm_judge = Some(judge);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RoundObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The request every worker of a round sends.
    pub fn prepare(&self, endpoint: &Endpoint, session: &Session) -> PreparedRequest {
        let request = PreparedRequest::new(&endpoint.method, &endpoint.url);
        let request = if matches!(endpoint.method.to_uppercase().as_str(), "GET" | "HEAD") {
            request
        } else {
            request.json(&self.config.payload)
        };
        request.with_session(session)
    }

    /// Warm up, fire one synchronized round and grade it.
    pub async fn test_race_condition(&self, endpoint: &Endpoint, session: &Session) -> Vec<Vulnerability> {
        info!(endpoint = %endpoint.url, concurrency = self.config.concurrency, "Testing race condition");
        warm_up(
            self.transport.as_ref(),
            &endpoint.url,
            session,
            self.config.warmup_requests,
            self.config.settle(),
        )
        .await;

        let template = self.prepare(endpoint, session);
        self.race_prepared(endpoint, &template).await
    }

    /// Fire one round of an already built request and grade it.
    pub async fn race_prepared(&self, endpoint: &Endpoint, template: &PreparedRequest) -> Vec<Vulnerability> {
        let round = dispatch_round(
            self.transport.clone(),
            template,
            self.config.concurrency,
            self.config.body_preview_bytes,
        );
        let outcome = match tokio::time::timeout(self.config.round_timeout(), round).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    endpoint = %endpoint.url,
                    timeout_secs = self.config.round_timeout_secs,
                    "Race round exceeded its deadline"
                );
                if let Some(observer) = &self.observer {
                    observer.round_timed_out(&endpoint.url, self.config.concurrency);
                }
                return Vec::new();
            }
        };

        if let Some(observer) = &self.observer {
            observer.round_finished(&endpoint.url, &outcome);
        }
        if outcome.results.len() < self.config.min_results {
            debug!(
                endpoint = %endpoint.url,
                results = outcome.results.len(),
                min_results = self.config.min_results,
                "Round under-sampled, no verdict"
            );
            return Vec::new();
        }

        let finding = classify_round(endpoint, &outcome.results, &self.classification);
        if let Some(f) = &finding {
            info!(endpoint = %endpoint.url, severity = %f.severity, "Race condition detected");
        }
        finding.into_iter().collect()
    }

    /// Race the endpoint against its inferred confirm step.
    pub async fn test_multi_endpoint_race(&self, endpoint: &Endpoint, session: &Session) -> Vec<Vulnerability> {
        let pairs = (self.config.concurrency / 2).max(1);
        let mut race = ValidateConfirmRace::new(self.transport.clone(), pairs, self.config.body_preview_bytes);
        if let Some(judge) = &self.confirm_judge {
            race = race.with_judge(judge.clone());
        }
        race.run(endpoint, session, &self.config.payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DispatchFailure;
    use crate::http::testing::ScriptedTransport;
    use crate::http::HttpReply;
    use crate::errors::PayraceError;
    use crate::models::{FindingKind, Severity};
    use std::sync::Mutex;

    fn config() -> RaceConfig {
        RaceConfig {
            concurrency: 10,
            warmup_requests: 3,
            settle_ms: 0,
            ..RaceConfig::default()
        }
    }

    fn session() -> Session {
        let mut s = Session::default();
        s.session_token = Some("tok".into());
        s
    }

    #[derive(Default)]
    struct Counters(Mutex<Vec<(String, usize, usize, usize)>>);

    impl RoundObserver for Counters {
        fn record(&self, endpoint: &str, sent: usize, completed: usize, failures: &[DispatchFailure]) {
            self.0
                .lock()
                .unwrap()
                .push((endpoint.to_string(), sent, completed, failures.len()));
        }
    }

    #[tokio::test]
    async fn test_race_detected_on_checkout() {
        let transport = Arc::new(ScriptedTransport::first_n_succeed(3));
        let tester = RaceTester::new(transport.clone(), config());
        let endpoint = Endpoint::new("https://shop.test/api/checkout", "POST");

        let findings = tester.test_race_condition(&endpoint, &session()).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::RaceCondition);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert!(findings[0].proof.contains("10 concurrent requests sent, 3 succeeded"));

        assert_eq!(transport.warmups(), 3);
        let ops = transport.operations();
        assert_eq!(ops.len(), 10);
        assert!(ops.iter().all(|r| r.header("authorization") == Some("Bearer tok")));
        assert_eq!(ops[0].json().unwrap()["amount"], 100);
    }

    #[tokio::test]
    async fn test_single_success_no_finding() {
        let transport = Arc::new(ScriptedTransport::first_n_succeed(1));
        let tester = RaceTester::new(transport, config());
        let endpoint = Endpoint::new("https://shop.test/api/coupon/redeem", "POST");
        assert!(tester.test_race_condition(&endpoint, &session()).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_round_reports_diagnostics() {
        let transport = Arc::new(ScriptedTransport::new(|_, i| {
            if i == 0 {
                Ok(HttpReply::new(200, "ok"))
            } else {
                Err(PayraceError::Network("connection reset".into()))
            }
        }));
        let counters = Arc::new(Counters::default());
        let tester = RaceTester::new(transport, config()).with_observer(counters.clone());
        let endpoint = Endpoint::new("https://shop.test/api/pay", "POST");

        assert!(tester.test_race_condition(&endpoint, &session()).await.is_empty());
        let recorded = counters.0.lock().unwrap().clone();
        assert_eq!(recorded, vec![("https://shop.test/api/pay".to_string(), 10, 1, 9)]);
    }

    struct StalledTransport;

    #[async_trait::async_trait]
    impl HttpTransport for StalledTransport {
        async fn execute(&self, _request: reqwest::Request) -> Result<HttpReply, PayraceError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(HttpReply::new(200, "late"))
        }
    }

    #[derive(Default)]
    struct Timeouts(Mutex<Vec<(String, usize)>>);

    impl RoundObserver for Timeouts {
        fn record(&self, _endpoint: &str, _sent: usize, _completed: usize, _failures: &[DispatchFailure]) {}

        fn round_timed_out(&self, endpoint: &str, requested: usize) {
            self.0.lock().unwrap().push((endpoint.to_string(), requested));
        }
    }

    #[tokio::test]
    async fn test_round_deadline_reported_to_observer() {
        let timeouts = Arc::new(Timeouts::default());
        let cfg = RaceConfig {
            round_timeout_secs: 1,
            ..config()
        };
        let tester = RaceTester::new(Arc::new(StalledTransport), cfg).with_observer(timeouts.clone());
        let endpoint = Endpoint::new("https://shop.test/api/pay", "POST");
        let template = tester.prepare(&endpoint, &session());

        assert!(tester.race_prepared(&endpoint, &template).await.is_empty());
        let recorded = timeouts.0.lock().unwrap().clone();
        assert_eq!(recorded, vec![("https://shop.test/api/pay".to_string(), 10)]);
    }

    #[tokio::test]
    async fn test_get_endpoint_has_no_body() {
        let tester = RaceTester::new(Arc::new(ScriptedTransport::always(200, "ok")), config());
        let request = tester.prepare(&Endpoint::new("https://shop.test/api/claim", "GET"), &session());
        assert!(request.body.is_none());
    }

    #[tokio::test]
    async fn test_multi_endpoint_skipped_without_judge() {
        let transport = Arc::new(ScriptedTransport::always(200, "ok"));
        let tester = RaceTester::new(transport.clone(), config());
        let endpoint = Endpoint::new("https://shop.test/api/order/validate", "POST");
        assert!(tester.test_multi_endpoint_race(&endpoint, &session()).await.is_empty());
        assert!(transport.operations().is_empty());
    }
}
