//! Fusion 错误类型

use contracts::ContractError;
use thiserror::Error;

/// Fusion 错误
///
/// `FusionEngine::fuse` never returns these; they describe rejected inputs
/// in logs and diagnostics.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FusionError {
    /// 缺少相机 ID
    #[error("track '{track_id}' has no camera id")]
    MissingCamera { track_id: String },

    /// 空的本地轨迹 ID
    #[error("track from camera {camera_id} has a blank track id")]
    BlankTrackId { camera_id: u32 },

    /// 非有限坐标
    #[error("track '{track_id}' has a non-finite position ({x}, {y})")]
    NonFinitePosition { track_id: String, x: f64, y: f64 },

    /// 外观特征无效
    #[error("track '{track_id}' has an invalid appearance feature: {message}")]
    InvalidFeature { track_id: String, message: String },

    /// 同一批次重复
    #[error("track '{track_id}' from camera {camera_id} appears twice in one batch")]
    DuplicateTrack { camera_id: u32, track_id: String },
}

impl From<FusionError> for ContractError {
    fn from(err: FusionError) -> Self {
        let track_id = match &err {
            FusionError::MissingCamera { track_id }
            | FusionError::NonFinitePosition { track_id, .. }
            | FusionError::InvalidFeature { track_id, .. }
            | FusionError::DuplicateTrack { track_id, .. } => track_id.clone(),
            FusionError::BlankTrackId { .. } => String::new(),
        };
        ContractError::fusion_input(track_id, err.to_string())
    }
}

/// Fusion Result 类型别名
pub type Result<T> = std::result::Result<T, FusionError>;
