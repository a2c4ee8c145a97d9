//! StreamSource trait - camera connection abstraction
//!
//! One implementation per transport. The engine only ever calls `read`
//! from its delivery loop and `open`/`close` from the stream's reconnect
//! task, so implementations see at most two callers at a time.

use crate::{CapturedFrame, ContractError, StreamDescriptor};

/// Result of one non-blocking read
#[derive(Debug)]
pub enum ReadOutcome {
    /// A frame newer than the previous read
    Frame(CapturedFrame),
    /// Connection healthy, nothing new decoded yet
    Pending,
    /// The read failed; the engine decides whether this is fatal
    Failed(ContractError),
}

/// Camera stream source
///
/// # Contract
///
/// - `read` must return immediately. Sources decode on their own
///   thread/task and hand over the newest frame.
/// - `open` may take a while (network handshakes); the engine calls it
///   from a blocking-friendly context, never from the delivery loop.
/// - `close` is idempotent and releases the capture handle.
pub trait StreamSource: Send + Sync {
    fn descriptor(&self) -> &StreamDescriptor;

    /// Open (or reopen) the connection
    fn open(&self) -> Result<(), ContractError>;

    /// Non-blocking read of the newest decoded frame
    fn read(&self) -> ReadOutcome;

    /// Release the connection
    fn close(&self);

    /// Health signal: connection currently open
    fn is_open(&self) -> bool;
}
