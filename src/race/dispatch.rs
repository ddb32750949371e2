use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::errors::PayraceError;
use crate::http::{HttpTransport, PreparedRequest};
use crate::models::RaceResult;
use crate::utils::truncate_body;

use super::barrier::{GateTicket, ReleaseGate};
use super::collector::{ResultSink, RoundCollector, RoundOutcome, WorkerReport};

/// Fire `concurrency` identical copies of `template` through one release gate.
pub async fn dispatch_round(
    transport: Arc<dyn HttpTransport>,
    template: &PreparedRequest,
    concurrency: usize,
    preview_bytes: usize,
) -> RoundOutcome {
    let requests = (0..concurrency).map(|_| Ok(template.clone())).collect();
    dispatch_prepared(transport, requests, preview_bytes).await
}

/// Fire a batch of pre-built requests through one release gate.
///
/// Worker `i` sends `requests[i]`. An `Err` entry, or a request whose wire form
/// cannot be built, withdraws its worker before the release and is counted as a
/// build failure. Transport errors drop the worker's result without retry.
pub async fn dispatch_prepared(
    transport: Arc<dyn HttpTransport>,
    requests: Vec<Result<PreparedRequest, PayraceError>>,
    preview_bytes: usize,
) -> RoundOutcome {
    let requested = requests.len();
    let gate = ReleaseGate::new();
    let (collector, sink) = RoundCollector::new(requested);

    let mut handles = Vec::with_capacity(requested);
    for (worker_id, prepared) in requests.into_iter().enumerate() {
        let ticket = gate.ticket();
        let sink = sink.clone();
        let transport = transport.clone();
        handles.push(tokio::spawn(async move {
            run_worker(worker_id, prepared, ticket, transport, sink, preview_bytes).await;
        }));
    }
    drop(sink);

    let ready = gate.release_when_ready().await;
    debug!(ready, requested, "Release gate opened");

    let outcome = collector.finish(handles).await;
    info!(
        requested,
        completed = outcome.results.len(),
        succeeded = outcome.success_count(),
        failed = outcome.failures.len(),
        "Dispatch round finished"
    );
    outcome
}

async fn run_worker(
    worker_id: usize,
    prepared: Result<PreparedRequest, PayraceError>,
    ticket: GateTicket,
    transport: Arc<dyn HttpTransport>,
    sink: ResultSink,
    preview_bytes: usize,
) {
    let wire = match prepared.and_then(|p| p.to_request()) {
        Ok(wire) => wire,
        Err(e) => {
            let class = e.classify();
            debug!(
                worker_id,
                error_type = class.error_type,
                error = %e,
                "Request construction failed, worker withdraws"
            );
            ticket.withdraw();
            sink.report(WorkerReport::Failed {
                worker_id,
                failure: class.dispatch,
            })
            .await;
            return;
        }
    };

    if !ticket.wait().await {
        return;
    }

    let started_at = Utc::now();
    let outcome = transport.execute(wire).await;
    let finished_at = Utc::now();

    let report = match outcome {
        Ok(reply) => WorkerReport::Completed(RaceResult::new(
            worker_id,
            reply.status,
            truncate_body(&reply.body, preview_bytes),
            started_at,
            finished_at,
        )),
        Err(e) => {
            let class = e.classify();
            debug!(worker_id, error_type = class.error_type, error = %e, "Dispatch failed");
            WorkerReport::Failed {
                worker_id,
                failure: class.dispatch,
            }
        }
    };
    sink.report(report).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DispatchFailure;
    use crate::http::testing::ScriptedTransport;
    use crate::http::HttpReply;

    fn template() -> PreparedRequest {
        PreparedRequest::new("POST", "https://shop.test/api/redeem")
            .json(&serde_json::json!({"code": "WELCOME10"}))
    }

    #[tokio::test]
    async fn test_round_sends_identical_copies() {
        let transport = Arc::new(ScriptedTransport::first_n_succeed(2));
        let outcome = dispatch_round(transport.clone(), &template(), 6, 4096).await;

        assert_eq!(outcome.requested, 6);
        assert_eq!(outcome.results.len(), 6);
        assert_eq!(outcome.success_count(), 2);

        let sent = transport.operations();
        assert_eq!(sent.len(), 6);
        assert!(sent.iter().all(|r| r.body == sent[0].body && r.url == sent[0].url));
    }

    #[tokio::test]
    async fn test_transport_errors_drop_results() {
        let transport = Arc::new(ScriptedTransport::new(|_, i| {
            if i % 2 == 0 {
                Err(PayraceError::Timeout("deadline".into()))
            } else {
                Ok(HttpReply::new(200, "ok"))
            }
        }));
        let outcome = dispatch_round(transport, &template(), 4, 4096).await;

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome
            .failure_kinds()
            .iter()
            .all(|f| *f == DispatchFailure::Timeout));
    }

    #[tokio::test]
    async fn test_construction_failure_does_not_block_others() {
        let transport = Arc::new(ScriptedTransport::always(200, "ok"));
        let requests = vec![
            Ok(template()),
            Err(PayraceError::RequestBuild("bad header".into())),
            Ok(PreparedRequest::new("POST", "not a url")),
            Ok(template()),
        ];
        let outcome = dispatch_prepared(transport.clone(), requests, 4096).await;

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(transport.operations().len(), 2);
    }

    #[tokio::test]
    async fn test_bodies_truncated_to_preview() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| {
            Ok(HttpReply::new(200, &"x".repeat(100)))
        }));
        let outcome = dispatch_round(transport, &template(), 2, 10).await;
        assert!(outcome.results.iter().all(|r| r.body.len() <= 10));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_empty_round() {
        let transport = Arc::new(ScriptedTransport::always(200, "ok"));
        let outcome = dispatch_round(transport, &template(), 0, 4096).await;
        assert_eq!(outcome.requested, 0);
        assert!(outcome.results.is_empty());
    }
}
