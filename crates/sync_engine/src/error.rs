//! Sync engine 错误类型
//!
//! Only operator-facing calls return these; frame production never fails.

use contracts::{ContractError, StreamId};
use thiserror::Error;

/// Sync engine 错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 未知的流 ID
    #[error("unknown stream {stream_id}")]
    UnknownStream { stream_id: StreamId },

    /// 重复的流 ID
    #[error("duplicate stream id {stream_id}")]
    DuplicateStream { stream_id: StreamId },

    /// 引擎已停止
    #[error("sync engine has been shut down")]
    ShutDown,

    /// 需要 Tokio 运行时
    #[error("sync engine requires a Tokio runtime")]
    NoRuntime,

    /// Contract error
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// Sync engine Result 类型别名
pub type Result<T> = std::result::Result<T, SyncError>;
