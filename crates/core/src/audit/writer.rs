use std::sync::Arc;

use tokio::sync::mpsc;

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditSink};

/// Background task that drains audit events into a sink
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    sink: Arc<dyn AuditSink>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, sink: Arc<dyn AuditSink>) -> Self {
        Self { rx, sink }
    }

    /// Run the writer, consuming events until every handle is dropped.
    ///
    /// Spawn with `tokio::spawn(writer.run())`.
    pub async fn run(mut self) {
        tracing::info!("Audit writer started");

        let mut written = 0u64;
        while let Some(envelope) = self.rx.recv().await {
            let record = AuditRecord::new(envelope.timestamp, envelope.event);
            match self.sink.write(&record) {
                Ok(()) => written += 1,
                Err(e) => tracing::error!("Failed to write audit event: {}", e),
            }
        }

        tracing::info!("Audit writer shutting down after {} events", written);
    }
}

/// Create a complete audit system
///
/// Returns the handle to clone into components and the writer to spawn.
/// `buffer_size` bounds the channel; `emit` waits when it is full.
pub fn create_audit_system(
    sink: Arc<dyn AuditSink>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditError, AuditEvent};
    use crate::testing::RecordingAuditSink;

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn write(&self, _record: &AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::Sink("unreachable collector".to_string()))
        }
    }

    #[tokio::test]
    async fn test_writer_forwards_events_until_handles_dropped() {
        let sink = Arc::new(RecordingAuditSink::new());
        let (handle, writer) = create_audit_system(sink.clone(), 10);
        let writer_task = tokio::spawn(writer.run());

        handle
            .emit(AuditEvent::ServiceStarted {
                version: "0.1.0".to_string(),
                config_hash: "abc123".to_string(),
            })
            .await;
        handle
            .emit(AuditEvent::TasksResumed {
                order_id: "o1".to_string(),
                count: 2,
            })
            .await;

        drop(handle);
        writer_task.await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, "service_started");
        assert_eq!(records[1].order_id.as_deref(), Some("o1"));
    }

    #[tokio::test]
    async fn test_writer_survives_sink_errors() {
        let (handle, writer) = create_audit_system(Arc::new(FailingSink), 10);
        let writer_task = tokio::spawn(writer.run());

        handle
            .emit(AuditEvent::ServiceStopped {
                reason: "test".to_string(),
            })
            .await;

        drop(handle);
        writer_task.await.unwrap();
    }
}
