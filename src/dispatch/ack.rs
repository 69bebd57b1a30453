//! Acknowledgment registry.
//!
//! A delivery is registered before it is sent, so a responder acknowledging
//! faster than the send call returns is never lost. The waiting dispatcher
//! closes the delivery atomically when its deadline fires: an acknowledgment
//! that got in first wins, anything after is reported as late.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::escalation::ActionKind;

/// Result of an acknowledgment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Acknowledged,
    /// Repeated acknowledgment of the same delivery; nothing changed.
    AlreadyAcknowledged,
    /// The deadline had already passed; the dispatcher moved on.
    Late,
    Unknown,
}

struct Delivery {
    incident_id: Uuid,
    action: ActionKind,
    sent_at: Instant,
    acked_at: Option<Instant>,
    closed: bool,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct AckState {
    deliveries: HashMap<Uuid, Delivery>,
    /// (incident, action) pairs a responder has already acknowledged.
    satisfied: HashSet<(Uuid, ActionKind)>,
}

#[derive(Default)]
pub struct AckRegistry {
    state: Mutex<AckState>,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delivery and return the handle its waiter listens on.
    pub async fn register(
        &self,
        delivery_id: Uuid,
        incident_id: Uuid,
        action: ActionKind,
    ) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        let mut state = self.state.lock().await;
        state.deliveries.insert(
            delivery_id,
            Delivery {
                incident_id,
                action,
                sent_at: Instant::now(),
                acked_at: None,
                closed: false,
                notify: notify.clone(),
            },
        );
        notify
    }

    /// Record a responder's acknowledgment. Idempotent.
    pub async fn acknowledge(&self, delivery_id: Uuid) -> AckStatus {
        let mut state = self.state.lock().await;
        let Some(delivery) = state.deliveries.get_mut(&delivery_id) else {
            return AckStatus::Unknown;
        };
        if delivery.acked_at.is_some() {
            return AckStatus::AlreadyAcknowledged;
        }
        let key = (delivery.incident_id, delivery.action);
        if delivery.closed {
            info!(%delivery_id, incident_id = %key.0, "late acknowledgment after deadline");
            // The contact did happen; later repeats of the action skip it.
            state.satisfied.insert(key);
            return AckStatus::Late;
        }
        delivery.acked_at = Some(Instant::now());
        delivery.notify.notify_one();
        state.satisfied.insert(key);
        debug!(%delivery_id, incident_id = %key.0, action = %key.1, "delivery acknowledged");
        AckStatus::Acknowledged
    }

    /// Close a delivery. Returns the response time if it was acknowledged
    /// first; otherwise later acknowledgments are reported as late.
    pub async fn close(&self, delivery_id: Uuid) -> Option<Duration> {
        let mut state = self.state.lock().await;
        let delivery = state.deliveries.get_mut(&delivery_id)?;
        delivery.closed = true;
        delivery.acked_at.map(|at| at.duration_since(delivery.sent_at))
    }

    /// Mark the delivery as actually sent; response time is measured from here.
    pub async fn mark_sent(&self, delivery_id: Uuid) {
        if let Some(delivery) = self.state.lock().await.deliveries.get_mut(&delivery_id) {
            if delivery.acked_at.is_none() {
                delivery.sent_at = Instant::now();
            }
        }
    }

    /// True once any responder acknowledged `action` for `incident_id`.
    pub async fn is_satisfied(&self, incident_id: Uuid, action: ActionKind) -> bool {
        self.state.lock().await.satisfied.contains(&(incident_id, action))
    }

    /// Drop all bookkeeping for a finished incident.
    pub async fn forget_incident(&self, incident_id: Uuid) {
        let mut state = self.state.lock().await;
        state.deliveries.retain(|_, d| d.incident_id != incident_id);
        state.satisfied.retain(|(id, _)| *id != incident_id);
    }
}
