//! # Vision
//!
//! 检测流水线：合成帧 → 各路 tile → 检测/跟踪 → 地平面投影 → 融合。
//!
//! 负责：
//! - 按 `TileInfo.rect` 从合成帧中切出每路画面（占位 tile 跳过）
//! - 调用 `Tracker`（detect → track → project），单路失败不影响其它路
//! - 单应矩阵投影（脚点 = bbox 底边中点）
//! - 将结果交给 `SharedFusion`，并把 `FusionBatch` 非阻塞地转发给 dispatcher
//!
//! ## 使用示例
//!
//! ```ignore
//! if let Some(tracker) = vision::create_tracker(&blueprint.detection)? {
//!     let fusion = SharedFusion::new(blueprint.fusion.clone());
//!     let pipeline = VisionPipeline::new(tracker, fusion, clock.clone()).with_output(batch_tx);
//!     engine = engine.with_detection(&blueprint.detection, Arc::new(pipeline));
//! }
//! ```

mod error;
mod homography;
mod pipeline;
mod trackers;

pub use error::{Result, VisionError};
pub use homography::{Homography, HomographySet};
pub use pipeline::{VisionPipeline, VisionStats};
pub use trackers::{create_tracker, DummyTracker, ScriptedObject, ScriptedTracker};
