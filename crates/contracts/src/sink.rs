//! MetadataSink trait - Dispatcher output interface
//!
//! Receives the global-id-annotated tracks of every fusion cycle.

use crate::{ContractError, FusionBatch};

/// Metadata output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(MetadataSink: Send)]
pub trait LocalMetadataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one fusion cycle
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, batch: &FusionBatch) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
