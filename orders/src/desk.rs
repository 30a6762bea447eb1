use std::sync::Arc;

use qr_gate_common::event::{DetectionHandler, HandoffOutcome};
use qr_gate_common::frame::DetectionEvent;
use tracing::{debug, error, info, warn};

use crate::db::{Order, OrderDb};
use crate::message::compose_message;
use crate::notify::Notifier;

/// Matches decoded addresses against the order table and notifies the owner.
pub struct OrderDesk<N> {
    db: Arc<OrderDb>,
    notifier: N,
}

impl<N: Notifier> OrderDesk<N> {
    pub fn new(db: Arc<OrderDb>, notifier: N) -> Self {
        Self { db, notifier }
    }

    async fn lookup(&self, address: &str) -> Result<Option<Order>, String> {
        let db = Arc::clone(&self.db);
        let address = address.to_string();
        tokio::task::spawn_blocking(move || db.find_by_address(&address))
            .await
            .map_err(|e| format!("lookup task failed: {e}"))?
            .map_err(|e| format!("order query failed: {e}"))
    }
}

impl<N: Notifier> DetectionHandler for OrderDesk<N> {
    async fn on_detection(&self, event: &DetectionEvent) -> HandoffOutcome {
        let order = match self.lookup(&event.payload).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!(address = event.payload, "address not found among orders, skipping");
                return HandoffOutcome::Unmatched;
            }
            Err(e) => {
                error!(error = %e, address = event.payload, "order lookup failed");
                return HandoffOutcome::Failed(e);
            }
        };
        debug!(order_id = order.id, address = event.payload, "matched order");

        let text = compose_message(&order, chrono::Utc::now());
        match self.notifier.notify(&order, &text).await {
            Ok(()) => {
                info!(
                    order_id = order.id,
                    recipient = order.telegram_id,
                    captured_at = event.captured_at(),
                    "order notification sent"
                );
                HandoffOutcome::Notified
            }
            Err(e) => {
                error!(error = %e, order_id = order.id, "order notification failed");
                HandoffOutcome::Failed(e.to_string())
            }
        }
    }
}
