//! Pipeline orchestration module.

mod orchestrator;
mod snapshot;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use snapshot::SnapshotWriter;
pub use stats::PipelineStats;
