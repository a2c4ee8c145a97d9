//! Ingestion 错误类型

use contracts::ContractError;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 不支持的地址协议
    #[error("unsupported stream scheme '{scheme}' in '{address}'")]
    UnsupportedScheme {
        /// 协议名
        scheme: String,
        /// 完整地址
        address: String,
    },

    /// 地址参数错误
    #[error("invalid stream address '{address}': {message}")]
    InvalidAddress {
        /// 完整地址
        address: String,
        /// 错误消息
        message: String,
    },

    /// 图像归一化失败
    #[error("failed to normalize frame: {message}")]
    Normalize {
        /// 错误消息
        message: String,
    },

    /// Contract error
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
