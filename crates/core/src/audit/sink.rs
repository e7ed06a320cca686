use thiserror::Error;

use super::AuditRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Destination for audit records.
///
/// The core only emits; persisting the stream is up to the sink.
pub trait AuditSink: Send + Sync {
    fn write(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Writes each record as one structured log line on the `audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let data = serde_json::to_string(&record.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;
        tracing::info!(
            target: "audit",
            event_type = %record.event_type,
            order_id = record.order_id.as_deref().unwrap_or("-"),
            actor_id = record.actor_id.as_deref().unwrap_or("-"),
            timestamp = %record.timestamp.to_rfc3339(),
            "{}",
            data
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEvent;
    use chrono::Utc;

    #[test]
    fn test_tracing_sink_accepts_records() {
        let sink = TracingAuditSink;
        let record = AuditRecord::new(
            Utc::now(),
            AuditEvent::ServiceStopped {
                reason: "test".to_string(),
            },
        );
        sink.write(&record).unwrap();
    }
}
