//! Vision 错误类型

use contracts::{CameraId, ContractError};
use thiserror::Error;

/// Vision 错误
#[derive(Debug, Error)]
pub enum VisionError {
    /// 单应矩阵无效
    #[error("invalid homography for camera {camera_id}: {message}")]
    InvalidHomography { camera_id: CameraId, message: String },

    /// 不支持的 tracker 类型
    #[error("tracker '{0}' is not available")]
    UnsupportedTracker(String),

    /// 检测/跟踪失败
    #[error("tracker error: {0}")]
    Tracker(#[from] ContractError),
}

/// Vision Result 类型别名
pub type Result<T> = std::result::Result<T, VisionError>;
