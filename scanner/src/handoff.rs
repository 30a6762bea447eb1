//! Bounded channel between the scan loop and the lookup/notify worker.

use std::sync::Arc;

use qr_gate_common::event::{DetectionHandler, HandoffOutcome};
use qr_gate_common::frame::DetectionEvent;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A detection event waiting for the handler, with the channel its outcome goes back on.
pub struct HandoffRequest {
    pub event: DetectionEvent,
    pub ack: oneshot::Sender<HandoffOutcome>,
}

/// Scan-loop side of the handoff channel.
#[derive(Clone)]
pub struct HandoffClient {
    tx: mpsc::Sender<HandoffRequest>,
}

impl HandoffClient {
    pub fn new(tx: mpsc::Sender<HandoffRequest>) -> Self {
        Self { tx }
    }

    /// Send `event` and wait until the handler is done with it.
    pub async fn submit(&self, event: DetectionEvent) -> HandoffOutcome {
        let (ack, done) = oneshot::channel();
        if self.tx.send(HandoffRequest { event, ack }).await.is_err() {
            warn!("handoff worker is gone, dropping detection event");
            return HandoffOutcome::Failed("handoff channel closed".into());
        }
        match done.await {
            Ok(outcome) => outcome,
            Err(_) => HandoffOutcome::Failed("handoff worker dropped the request".into()),
        }
    }
}

/// Run `handler` on a worker task fed by the returned client.
///
/// The worker exits once every client has been dropped.
pub fn spawn_handoff_worker<H: DetectionHandler>(
    handler: Arc<H>,
    capacity: usize,
) -> (HandoffClient, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<HandoffRequest>(capacity.max(1));

    let handle = tokio::spawn(async move {
        while let Some(HandoffRequest { event, ack }) = rx.recv().await {
            debug!(payload = %event.payload, seq = event.seq, "handing off detection event");
            let outcome = handler.on_detection(&event).await;
            if ack.send(outcome).is_err() {
                debug!(seq = event.seq, "scan loop stopped waiting for handoff outcome");
            }
        }
        info!("handoff worker finished");
    });

    (HandoffClient::new(tx), handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl DetectionHandler for Recorder {
        async fn on_detection(&self, event: &DetectionEvent) -> HandoffOutcome {
            self.seen.lock().unwrap().push(event.payload.clone());
            if event.payload.starts_with("unknown") {
                HandoffOutcome::Unmatched
            } else {
                HandoffOutcome::Notified
            }
        }
    }

    fn event(payload: &str, seq: u64) -> DetectionEvent {
        DetectionEvent {
            payload: payload.to_string(),
            captured_at_ms: 1_700_000_000_000,
            seq,
        }
    }

    #[tokio::test]
    async fn outcome_comes_back_to_submitter() {
        let recorder = Arc::new(Recorder::default());
        let (client, worker) = spawn_handoff_worker(Arc::clone(&recorder), 4);

        assert_eq!(client.submit(event("123 Main St", 0)).await, HandoffOutcome::Notified);
        assert_eq!(client.submit(event("unknown 9", 1)).await, HandoffOutcome::Unmatched);

        drop(client);
        worker.await.unwrap();
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["123 Main St", "unknown 9"]);
    }

    #[tokio::test]
    async fn closed_channel_is_a_failure() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let outcome = HandoffClient::new(tx).submit(event("x", 0)).await;
        assert!(matches!(outcome, HandoffOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn dropped_ack_is_a_failure() {
        let (tx, mut rx) = mpsc::channel::<HandoffRequest>(1);
        tokio::spawn(async move {
            if let Some(request) = rx.recv().await {
                drop(request.ack);
            }
        });
        let outcome = HandoffClient::new(tx).submit(event("x", 0)).await;
        assert!(matches!(outcome, HandoffOutcome::Failed(_)));
    }
}
