use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    Ready,
    Withdrawn,
}

/// One-shot release gate for a dispatch round.
///
/// Every worker holds a [`GateTicket`]. A worker finishes building its request,
/// then either waits on the ticket (reporting ready) or withdraws it. The
/// coordinator releases the gate once every ticket has been accounted for,
/// which includes tickets dropped by a worker that panicked, so a failing
/// worker can never hold back the others.
pub struct ReleaseGate {
    release_tx: watch::Sender<bool>,
    arrival_tx: mpsc::UnboundedSender<Arrival>,
    arrival_rx: mpsc::UnboundedReceiver<Arrival>,
}

pub struct GateTicket {
    arrival_tx: Option<mpsc::UnboundedSender<Arrival>>,
    release_rx: watch::Receiver<bool>,
}

impl ReleaseGate {
    pub fn new() -> Self {
        let (release_tx, _) = watch::channel(false);
        let (arrival_tx, arrival_rx) = mpsc::unbounded_channel();
        Self { release_tx, arrival_tx, arrival_rx }
    }

    pub fn ticket(&self) -> GateTicket {
        GateTicket {
            arrival_tx: Some(self.arrival_tx.clone()),
            release_rx: self.release_tx.subscribe(),
        }
    }

    /// Wait until every issued ticket has arrived, withdrawn or been dropped,
    /// then release all waiting workers at once. Returns how many were ready.
    pub async fn release_when_ready(self) -> usize {
        let ReleaseGate { release_tx, arrival_tx, mut arrival_rx } = self;
        drop(arrival_tx);

        let mut ready = 0;
        while let Some(arrival) = arrival_rx.recv().await {
            if arrival == Arrival::Ready {
                ready += 1;
            }
        }

        release_tx.send_replace(true);
        ready
    }
}

impl Default for ReleaseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl GateTicket {
    /// Report ready and block until the gate opens. Returns false when the
    /// gate was dropped without being released.
    pub async fn wait(mut self) -> bool {
        if let Some(tx) = self.arrival_tx.take() {
            let _ = tx.send(Arrival::Ready);
        }
        self.release_rx.wait_for(|released| *released).await.is_ok()
    }

    /// Leave the round without blocking the release.
    pub fn withdraw(mut self) {
        if let Some(tx) = self.arrival_tx.take() {
            let _ = tx.send(Arrival::Withdrawn);
        }
    }
}
