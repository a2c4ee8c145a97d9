//! # Dispatcher
//!
//! 融合结果分发模块。
//!
//! 负责：
//! - 消费每个融合周期的 `FusionBatch`
//! - Fan-out 到多个 metadata sinks
//! - 隔离慢 sink（有界队列，满则丢弃），不阻塞检测链路

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{FusionBatch, MetadataSink};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::{DispatcherError, Result};
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LogSink};
