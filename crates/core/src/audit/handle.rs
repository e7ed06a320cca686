use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::AuditEvent;

/// Envelope wrapping an audit event with metadata
#[derive(Debug, Clone)]
pub struct AuditEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
}

impl AuditEventEnvelope {
    fn now(event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Handle for emitting audit events
///
/// Cheaply cloneable. Events go through a bounded channel to the
/// `AuditWriter`; emitting never fails the caller.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditEventEnvelope>,
}

impl AuditHandle {
    pub fn new(tx: mpsc::Sender<AuditEventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an event, waiting for channel capacity.
    pub async fn emit(&self, event: AuditEvent) {
        let event_type = event.event_type();
        if self.tx.send(AuditEventEnvelope::now(event)).await.is_err() {
            tracing::error!("Failed to emit audit event {}: writer stopped", event_type);
        }
    }

    /// Emit without waiting. Returns false if the event was dropped.
    pub fn try_emit(&self, event: AuditEvent) -> bool {
        match self.tx.try_send(AuditEventEnvelope::now(event)) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to emit audit event: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paused(order_id: &str) -> AuditEvent {
        AuditEvent::TasksPaused {
            order_id: order_id.to_string(),
            count: 3,
        }
    }

    #[tokio::test]
    async fn test_emit_event() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = AuditHandle::new(tx);

        handle.emit(paused("o1")).await;

        let envelope = rx.recv().await.expect("Should receive event");
        assert_eq!(envelope.event.order_id(), Some("o1"));
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = AuditHandle::new(tx);
        let clone = handle.clone();

        handle.emit(paused("o1")).await;
        clone
            .emit(AuditEvent::ServiceStopped {
                reason: "test".to_string(),
            })
            .await;

        assert!(matches!(
            rx.recv().await.unwrap().event,
            AuditEvent::TasksPaused { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap().event,
            AuditEvent::ServiceStopped { .. }
        ));
    }

    #[test]
    fn test_try_emit_full_channel() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = AuditHandle::new(tx);

        assert!(handle.try_emit(paused("o1")));
        assert!(!handle.try_emit(paused("o2")));
    }

    #[tokio::test]
    async fn test_emit_after_writer_stopped_does_not_panic() {
        let (tx, rx) = mpsc::channel::<AuditEventEnvelope>(10);
        let handle = AuditHandle::new(tx);
        drop(rx);

        handle.emit(paused("o1")).await;
        assert!(!handle.try_emit(paused("o1")));
    }
}
