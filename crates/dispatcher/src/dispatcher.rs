//! Dispatcher - main loop for fan-out to sinks

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{FusionBatch, SinkConfig, SinkType};

use crate::error::{DispatcherError, Result};
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sink configurations
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<FusionBatch>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<FusionBatch>) -> Self {
        Self { config, input_rx }
    }

    /// Build and start the sink workers
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub fn build(self) -> Result<Dispatcher> {
        let handles = Self::initialize_handles(&self.config)?;

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }

    #[instrument(
        name = "dispatcher_initialize_handles",
        skip(config),
        fields(sink_count = config.sinks.len())
    )]
    fn initialize_handles(config: &DispatcherConfig) -> Result<Vec<SinkHandle>> {
        config.sinks.iter().map(create_sink_handle).collect()
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle> {
    match config.sink_type {
        SinkType::Log => {
            let per_track = config
                .params
                .get("per_track")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
            let sink = LogSink::new(&config.name).with_per_track(per_track);
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}

/// The main Dispatcher that fans out fusion batches to sinks
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<FusionBatch>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: mpsc::Receiver<FusionBatch>) -> Self {
        Self { handles, input_rx }
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run the dispatcher main loop
    ///
    /// Consumes batches from input and fans out to all sinks.
    /// Returns the final per-sink metrics once the input channel is closed.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> Vec<(String, MetricsSnapshot)> {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut batch_count: u64 = 0;

        while let Some(batch) = self.input_rx.recv().await {
            batch_count += 1;
            self.dispatch_batch(batch);

            if batch_count.is_multiple_of(100) {
                debug!(batches = batch_count, "Dispatcher progress");
            }
        }

        info!(
            batches = batch_count,
            "Dispatcher input closed, shutting down"
        );

        let mut metrics = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let name = handle.name().to_string();
            let snapshot_source = Arc::clone(handle.metrics());
            handle.shutdown().await;
            metrics.push((name, snapshot_source.snapshot()));
        }

        info!("Dispatcher shutdown complete");
        metrics
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<Vec<(String, MetricsSnapshot)>> {
        tokio::spawn(self.run())
    }

    fn dispatch_batch(&self, batch: FusionBatch) {
        let batch = Arc::new(batch);
        for handle in &self.handles {
            // drops are counted and logged by the handle
            let _ = handle.try_send(Arc::clone(&batch));
        }
    }
}

/// Convenience function to create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<FusionBatch>,
) -> Result<Dispatcher> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build()
}
