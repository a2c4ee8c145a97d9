//! # Fusion
//!
//! 跨摄像头身份融合引擎。
//!
//! 负责：
//! - 全局轨迹注册表（`GlobalId` 单调递增，永不复用）
//! - 空间距离 + 外观相似度建图，连通分量聚类
//! - 同一相机的轨迹永不合并；合并时保留最小 ID
//! - 位置 EMA 平滑与速度估计
//! - 统计信息（全局轨迹数、合并次数、映射数）
//!
//! ## 使用示例
//!
//! ```ignore
//! use contracts::{FusionConfig, GroundPlaneTrack};
//! use fusion::FusionEngine;
//!
//! let mut fusion = FusionEngine::new(FusionConfig::default());
//! let fused = fusion.fuse(
//!     &[
//!         GroundPlaneTrack::new(0, "cam0_track_1", 100.0, 100.0),
//!         GroundPlaneTrack::new(1, "cam1_track_4", 105.0, 102.0),
//!     ],
//!     now,
//! );
//! assert_eq!(fused[0].global_id, fused[1].global_id);
//! ```

mod cluster;
mod engine;
mod error;
mod global_track;
mod shared;

pub use engine::FusionEngine;
pub use error::{FusionError, Result};
pub use global_track::{GlobalTrack, PositionSample};
pub use shared::SharedFusion;

// Re-export contracts types
pub use contracts::{FusedTrack, FusionConfig, FusionStats, GlobalId, GroundPlaneTrack};
