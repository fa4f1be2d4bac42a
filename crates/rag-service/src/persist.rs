//! Background message persistence.
//!
//! Messages are appended by a single spawned task draining an unbounded
//! channel. Writes are best-effort: a failed append is logged and counted,
//! never retried, and never reported to the request that queued it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use rag_storage::Storage;
use rag_types::StoredMessage;

enum PersistCommand {
    Append(StoredMessage),
    Flush(oneshot::Sender<()>),
}

/// Counters for persistence outcomes.
#[derive(Debug, Default)]
pub struct PersistMetrics {
    pub written: AtomicU64,
    pub failed: AtomicU64,
}

impl PersistMetrics {
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Handle to the persistence worker.
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<PersistCommand>,
    metrics: Arc<PersistMetrics>,
    worker: JoinHandle<()>,
}

impl PersistQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(storage: Arc<Storage>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistCommand>();
        let metrics = Arc::new(PersistMetrics::default());
        let worker_metrics = Arc::clone(&metrics);

        let worker = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    PersistCommand::Append(message) => {
                        let session_id = message.session_id.clone();
                        let storage = Arc::clone(&storage);
                        let result =
                            tokio::task::spawn_blocking(move || storage.append_message(message))
                                .await;
                        match result {
                            Ok(Ok(stored)) => {
                                worker_metrics.written.fetch_add(1, Ordering::Relaxed);
                                debug!(session_id = %session_id, seq = stored.seq, "Persisted message");
                            }
                            Ok(Err(e)) => {
                                worker_metrics.failed.fetch_add(1, Ordering::Relaxed);
                                warn!(session_id = %session_id, error = %e, "Failed to persist message");
                            }
                            Err(e) => {
                                worker_metrics.failed.fetch_add(1, Ordering::Relaxed);
                                warn!(session_id = %session_id, error = %e, "Persist task panicked");
                            }
                        }
                    }
                    PersistCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Persist queue closed");
        });

        Self {
            tx,
            metrics,
            worker,
        }
    }

    /// Queue a message; never blocks.
    pub fn enqueue(&self, message: StoredMessage) {
        if self.tx.send(PersistCommand::Append(message)).is_err() {
            self.metrics.failed.fetch_add(1, Ordering::Relaxed);
            warn!("Persist queue is closed, dropping message");
        }
    }

    /// Wait until every message queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(PersistCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn metrics(&self) -> Arc<PersistMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Drain outstanding writes and stop the worker.
    pub async fn shutdown(self) {
        let Self { tx, worker, .. } = self;
        drop(tx);
        if let Err(e) = worker.await {
            warn!(error = %e, "Persist worker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_types::ChatRole;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_flush_waits_for_writes() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let session = storage.create_session("s").unwrap();
        let queue = PersistQueue::spawn(Arc::clone(&storage));

        queue.enqueue(StoredMessage::new(&session.session_id, ChatRole::User, "q"));
        queue.enqueue(StoredMessage::new(&session.session_id, ChatRole::Assistant, "a"));
        queue.flush().await;

        let messages = storage.get_messages(&session.session_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "a");
        assert_eq!(queue.metrics().written(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_raised() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let queue = PersistQueue::spawn(storage);

        queue.enqueue(StoredMessage::new("no-such-session", ChatRole::User, "q"));
        queue.flush().await;

        assert_eq!(queue.metrics().failed(), 1);
        assert_eq!(queue.metrics().written(), 0);
        queue.shutdown().await;
    }
}
