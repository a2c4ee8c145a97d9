//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Queue full - batch dropped
    #[error("queue full for sink '{sink_name}', cycle {cycle} dropped")]
    QueueFull { sink_name: String, cycle: u64 },

    /// Worker task is gone
    #[error("sink '{sink_name}' worker stopped")]
    WorkerStopped { sink_name: String },

    /// Sink write error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Dispatcher Result 类型别名
pub type Result<T> = std::result::Result<T, DispatcherError>;
