use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::errors::DispatchFailure;
use crate::models::RaceResult;

/// What a single worker hands back to the collector.
#[derive(Debug)]
pub enum WorkerReport {
    Completed(RaceResult),
    Failed { worker_id: usize, failure: DispatchFailure },
}

/// Everything a round produced, available only after every worker finished.
#[derive(Debug, Clone, Default)]
pub struct RoundOutcome {
    pub requested: usize,
    pub results: Vec<RaceResult>,
    pub failures: Vec<(usize, DispatchFailure)>,
}

impl RoundOutcome {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failure_kinds(&self) -> Vec<DispatchFailure> {
        self.failures.iter().map(|(_, f)| *f).collect()
    }

    /// Results produced by the given workers, in arrival order.
    pub fn results_for(&self, workers: impl Fn(usize) -> bool) -> Vec<RaceResult> {
        self.results
            .iter()
            .filter(|r| workers(r.worker_id))
            .cloned()
            .collect()
    }
}

/// Receives per-endpoint dispatch counters for scan diagnostics.
pub trait RoundObserver: Send + Sync {
    fn record(&self, endpoint: &str, sent: usize, completed: usize, failures: &[DispatchFailure]);

    fn round_finished(&self, endpoint: &str, outcome: &RoundOutcome) {
        self.record(
            endpoint,
            outcome.requested,
            outcome.results.len(),
            &outcome.failure_kinds(),
        );
    }

    /// The round hit its deadline before every worker reported.
    fn round_timed_out(&self, endpoint: &str, requested: usize) {
        self.record(endpoint, requested, 0, &[]);
    }
}

/// Cheap handle each worker uses to report exactly once.
#[derive(Clone)]
pub struct ResultSink {
    tx: mpsc::Sender<WorkerReport>,
}

impl ResultSink {
    pub async fn report(&self, report: WorkerReport) {
        // Capacity equals the worker count, so this never waits.
        let _ = self.tx.send(report).await;
    }
}

pub struct RoundCollector {
    requested: usize,
    rx: mpsc::Receiver<WorkerReport>,
}

impl RoundCollector {
    pub fn new(workers: usize) -> (Self, ResultSink) {
        let (tx, rx) = mpsc::channel(workers.max(1));
        (Self { requested: workers, rx }, ResultSink { tx })
    }

    /// Join every worker, then drain the channel into a [`RoundOutcome`].
    pub async fn finish(mut self, handles: Vec<JoinHandle<()>>) -> RoundOutcome {
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                warn!(error = %e, "Race worker terminated abnormally");
            }
        }
        self.rx.close();

        let mut outcome = RoundOutcome {
            requested: self.requested,
            ..Default::default()
        };
        while let Some(report) = self.rx.recv().await {
            match report {
                WorkerReport::Completed(result) => outcome.results.push(result),
                WorkerReport::Failed { worker_id, failure } => {
                    outcome.failures.push((worker_id, failure))
                }
            }
        }
        outcome
    }
}
