//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{FusionBatch, MetadataSink};

use crate::error::{DispatcherError, Result};
use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Channel to send batches to worker
    tx: mpsc::Sender<Arc<FusionBatch>>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: MetadataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Send a batch to the sink (non-blocking)
    ///
    /// A full queue drops the batch and counts it.
    pub fn try_send(&self, batch: Arc<FusionBatch>) -> Result<()> {
        match self.tx.try_send(batch) {
            Ok(()) => {
                self.metrics
                    .set_queued(self.tx.max_capacity() - self.tx.capacity());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(b)) => {
                self.metrics.record_dropped();
                warn!(sink = %self.name, cycle = b.cycle, "Queue full, batch dropped");
                Err(DispatcherError::QueueFull {
                    sink_name: self.name.clone(),
                    cycle: b.cycle,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                Err(DispatcherError::WorkerStopped {
                    sink_name: self.name.clone(),
                })
            }
        }
    }

    /// Shutdown the sink worker gracefully
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Worker task that consumes batches and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: MetadataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<FusionBatch>>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(batch) = rx.recv().await {
        metrics.set_queued(rx.len());

        match sink.write(&batch).await {
            Ok(()) => {
                metrics.record_written(batch.cycle, batch.tracks.len());
                observability::record_sink_write(&name, true);
            }
            Err(e) => {
                metrics.record_failed();
                observability::record_sink_write(&name, false);
                error!(
                    sink = %name,
                    cycle = batch.cycle,
                    error = %e,
                    "Write failed"
                );
                // Continue processing - don't crash on single failure
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::test_support::batch;
    use contracts::ContractError;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    /// Mock sink for testing
    struct MockSink {
        name: String,
        write_count: Arc<AtomicU64>,
        should_fail: bool,
        delay_ms: u64,
    }

    impl MetadataSink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, _batch: &FusionBatch) -> std::result::Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_fail {
                return Err(ContractError::sink_write(&self.name, "mock failure"));
            }
            self.write_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> std::result::Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> std::result::Result<(), ContractError> {
            Ok(())
        }
    }

    fn mock(name: &str, should_fail: bool, delay_ms: u64) -> (MockSink, Arc<AtomicU64>) {
        let write_count = Arc::new(AtomicU64::new(0));
        let sink = MockSink {
            name: name.to_string(),
            write_count: Arc::clone(&write_count),
            should_fail,
            delay_ms,
        };
        (sink, write_count)
    }

    #[tokio::test]
    async fn test_sink_handle_basic() {
        let (sink, write_count) = mock("test", false, 0);
        let handle = SinkHandle::spawn(sink, 10);

        for i in 0..5 {
            assert!(handle.try_send(Arc::new(batch(i, 1))).is_ok());
        }

        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn test_sink_handle_queue_full() {
        let (sink, _) = mock("slow", false, 100);

        // Small queue capacity
        let handle = SinkHandle::spawn(sink, 2);

        let mut rejected = 0u64;
        for i in 0..10 {
            if let Err(DispatcherError::QueueFull { .. }) = handle.try_send(Arc::new(batch(i, 0))) {
                rejected += 1;
            }
        }

        assert!(rejected > 0);
        assert_eq!(handle.metrics().dropped(), rejected);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sink_handle_failure_isolation() {
        let (sink, _) = mock("failing", true, 0);
        let handle = SinkHandle::spawn(sink, 10);

        for i in 0..3 {
            handle.try_send(Arc::new(batch(i, 0))).unwrap();
        }

        // Give worker time to process
        sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.metrics().failed(), 3);

        handle.shutdown().await;
    }
}
