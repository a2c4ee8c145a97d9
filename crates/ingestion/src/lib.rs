//! # Ingestion
//!
//! Camera stream sources.
//!
//! Responsibilities:
//! - `StreamSource` implementations (synthetic test pattern, scripted)
//! - Address-scheme factory turning a `StreamDescriptor` into a source
//! - Normalizing decoded frames to the canonical tile resolution
//!
//! ## Usage Example
//!
//! ```ignore
//! use contracts::{MonotonicClock, StreamDescriptor};
//! use ingestion::SourceFactory;
//!
//! let factory = SourceFactory::new(MonotonicClock::shared());
//! let source = factory.create(&StreamDescriptor::new(0, "synthetic://lobby?fps=30"))?;
//! source.open()?;
//! match source.read() { /* non-blocking */ }
//! ```

mod error;
mod factory;
mod metrics;
mod normalize;
mod scripted;
mod synthetic;

pub use error::{IngestionError, Result};
pub use factory::{SourceConstructor, SourceFactory};
pub use metrics::{SourceMetrics, SourceMetricsSnapshot};
pub use normalize::{normalize_to_tile, to_rgb_image};
pub use scripted::{ScriptedHandle, ScriptedSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};
