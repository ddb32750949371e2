use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{IdempotencyConfig, PayraceConfig, RaceConfig, ScanConfig, WebSocketConfig};
use crate::heuristics::Classification;
use crate::http::HttpTransport;
use crate::idempotency::IdempotencyTester;
use crate::models::{Endpoint, Session, Vulnerability};
use crate::race::{PairJudge, RaceTester};
use crate::utils::preview;
use crate::websocket::{self, AckCounter, MessageChannel, MessagePredicate, PaymentKeywords};

use super::context::{EndpointDiagnostics, ScanContext, SeverityCounts};

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub endpoints_tested: usize,
    pub endpoints_skipped: usize,
    pub severity_counts: SeverityCounts,
    pub findings: Vec<Vulnerability>,
    pub diagnostics: BTreeMap<String, EndpointDiagnostics>,
}

/// Runs the enabled test families over a set of endpoints.
pub struct ScanEngine {
    transport: Arc<dyn HttpTransport>,
    race: RaceConfig,
    idempotency: IdempotencyConfig,
    websocket: WebSocketConfig,
    scan: ScanConfig,
    classification: Classification,
    confirm_judge: Option<Arc<dyn PairJudge>>,
    /// Picks the captured WebSocket frames that the channel tests replay.
    payment_frames: Arc<dyn MessagePredicate>,
    context: Arc<ScanContext>,
    cancel_token: CancellationToken,
}

impl ScanEngine {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &PayraceConfig) -> Self {
        Self {
            transport,
            race: config.race(),
            idempotency: config.idempotency(),
            websocket: config.websocket(),
            scan: config.scan(),
            classification: Classification::default(),
            confirm_judge: None,
            payment_frames: Arc::new(PaymentKeywords),
            context: Arc::new(ScanContext::new()),
            cancel_token: CancellationToken::new(),
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

    pub fn with_payment_frames(mut self, predicate: Arc<dyn MessagePredicate>) -> Self {
        self.payment_frames = predicate;
        self
    }

    /// Replace the engine's cancel token with an external one (e.g. a Ctrl-C handler).
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn context(&self) -> Arc<ScanContext> {
        self.context.clone()
    }

    /// Endpoints the scan will actually exercise.
    pub fn select_targets(&self, endpoints: &[Endpoint]) -> Vec<Endpoint> {
        if !self.scan.payment_only {
            return endpoints.to_vec();
        }
        endpoints
            .iter()
            .filter(|e| self.classification.payment.matches(e))
            .cloned()
            .collect()
    }

    fn race_tester(&self) -> RaceTester {
        let mut tester = RaceTester::new(self.transport.clone(), self.race.clone())
            .with_classification(self.classification.clone())
            .with_observer(self.context.clone());
        if let Some(judge) = &self.confirm_judge {
            tester = tester.with_confirm_judge(judge.clone());
        }
        tester
    }

    fn idempotency_tester(&self) -> IdempotencyTester {
        IdempotencyTester::new(self.transport.clone(), self.idempotency.clone())
            .with_preview_bytes(self.race.body_preview_bytes)
            .with_observer(self.context.clone())
    }

    pub async fn run(&self, endpoints: &[Endpoint], session: &Session) -> ScanReport {
        let targets = self.select_targets(endpoints);
        let skipped = endpoints.len() - targets.len();
        info!(
            scan_id = %self.context.scan_id(),
            targets = targets.len(),
            skipped,
            dry_run = self.scan.dry_run,
            "Starting payment race scan"
        );

        if self.scan.dry_run {
            for endpoint in &targets {
                self.log_planned_requests(endpoint, session);
            }
        } else {
            let semaphore = Arc::new(Semaphore::new(self.scan.max_parallel_endpoints.max(1)));
            join_all(
                targets
                    .iter()
                    .map(|endpoint| self.scan_guarded(endpoint, session, semaphore.clone())),
            )
            .await;
        }

        let report = ScanReport {
            scan_id: self.context.scan_id().to_string(),
            started_at: self.context.started_at(),
            finished_at: Utc::now(),
            dry_run: self.scan.dry_run,
            cancelled: self.cancel_token.is_cancelled(),
            endpoints_tested: if self.scan.dry_run { 0 } else { targets.len() },
            endpoints_skipped: skipped,
            severity_counts: self.context.severity_counts().await,
            findings: self.context.findings().await,
            diagnostics: self.context.diagnostics(),
        };
        info!(
            scan_id = %report.scan_id,
            findings = report.findings.len(),
            critical = report.severity_counts.critical,
            high = report.severity_counts.high,
            cancelled = report.cancelled,
            "Scan complete"
        );
        report
    }

    async fn scan_guarded(&self, endpoint: &Endpoint, session: &Session, semaphore: Arc<Semaphore>) {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                self.context.mark_cancelled(&endpoint.url);
                return;
            }
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                warn!(endpoint = %endpoint.url, "Endpoint scan cancelled");
                self.context.mark_cancelled(&endpoint.url);
            }
            outcome = tokio::time::timeout(self.scan.endpoint_timeout(), self.scan_endpoint(endpoint, session)) => {
                if outcome.is_err() {
                    warn!(
                        endpoint = %endpoint.url,
                        timeout_secs = self.scan.endpoint_timeout_secs,
                        "Endpoint scan exceeded its deadline"
                    );
                    self.context.mark_timed_out(&endpoint.url);
                }
            }
        }
    }

    /// Run the enabled families on one endpoint. Findings are recorded as each
    /// family finishes so a later deadline keeps earlier results.
    async fn scan_endpoint(&self, endpoint: &Endpoint, session: &Session) {
        let tests = self.scan.tests;
        info!(endpoint = %endpoint.url, method = %endpoint.method, "Scanning endpoint");

        if tests.race_condition {
            let findings = self.race_tester().test_race_condition(endpoint, session).await;
            self.context.add_findings(findings).await;
        }
        if tests.multi_endpoint {
            let findings = self.race_tester().test_multi_endpoint_race(endpoint, session).await;
            self.context.add_findings(findings).await;
        }
        if tests.idempotency {
            if endpoint.method.eq_ignore_ascii_case("GET") {
                debug!(endpoint = %endpoint.url, "Skipping idempotency probes for GET endpoint");
            } else {
                let findings = self.idempotency_tester().test_all(endpoint, session).await;
                self.context.add_findings(findings).await;
            }
        }
    }

    fn log_planned_requests(&self, endpoint: &Endpoint, session: &Session) {
        let request = self.race_tester().prepare(endpoint, session);
        let headers: Vec<&str> = request.headers.iter().map(|(k, _)| k.as_str()).collect();
        info!(
            method = %request.method,
            url = %request.url,
            headers = ?headers,
            body = %preview(request.body.as_deref().unwrap_or(""), 200),
            concurrency = self.race.concurrency,
            "Dry run: race request prepared, not sent"
        );
    }

    /// Run the WebSocket families over an already-open channel and record the findings.
    pub async fn scan_channel(&self, channel: Arc<dyn MessageChannel>, acks: &dyn AckCounter) -> Vec<Vulnerability> {
        let summary = websocket::traffic_summary(&channel.messages());
        info!(
            url = %channel.url(),
            total = summary.total,
            sent = summary.sent,
            received = summary.received,
            payment = summary.payment,
            "Scanning WebSocket channel"
        );

        let mut findings = websocket::check_channel_security(channel.as_ref());
        if !self.scan.dry_run {
            let payment = self.payment_frames.as_ref();
            findings.extend(websocket::test_race_condition(channel.clone(), &self.websocket, payment, acks).await);
            findings.extend(websocket::test_replay(channel.as_ref(), &self.websocket, payment).await);
            findings.extend(websocket::test_amount_manipulation(channel.as_ref(), &self.websocket, payment).await);
        }
        self.context.add_findings(findings.clone()).await;
        findings
    }
}
