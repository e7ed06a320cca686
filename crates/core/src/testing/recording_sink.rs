//! Audit sink that keeps records in memory.

use std::sync::{Arc, RwLock};

use crate::audit::{AuditError, AuditRecord, AuditSink};

#[derive(Debug, Clone, Default)]
pub struct RecordingAuditSink {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().unwrap().clone()
    }

    /// Records of one event type, in write order.
    pub fn records_of(&self, event_type: &str) -> Vec<AuditRecord> {
        self.records
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl AuditSink for RecordingAuditSink {
    fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.write().unwrap().push(record.clone());
        Ok(())
    }
}
