use std::sync::Arc;

use tokio::sync::mpsc;

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditStore};

/// Drains the audit channel into an [`AuditStore`].
///
/// History mutations only ever `try_emit`, so a slow or failing store costs
/// audit records, never ticket writes.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Persist events until every [`AuditHandle`] is dropped.
    pub async fn run(mut self) {
        tracing::info!("Audit writer started");

        while let Some(envelope) = self.rx.recv().await {
            let record = AuditRecord::from(envelope);
            let event_type = record.event_type.clone();
            let store = Arc::clone(&self.store);

            // SQLite calls block; keep them off the async workers.
            match tokio::task::spawn_blocking(move || store.insert(&record)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!("Failed to write {} audit event: {}", event_type, e),
                Err(e) => tracing::error!("Audit write task failed: {}", e),
            }
        }

        tracing::info!("Audit writer shutting down");
    }
}

/// Wire a handle to a writer over a channel of `buffer_size` events.
///
/// Spawn the writer with `tokio::spawn(writer.run())`; clone the handle
/// freely. `try_emit` drops events while the buffer is full.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}
