//! # Sync Engine
//!
//! 多路摄像头流同步与合成引擎。
//!
//! 负责：
//! - 每路流一个 `DelayBuffer`（最近时间戳查找 + 保留期淘汰）
//! - 流健康状态机与后台重连
//! - `FrameCombiner` 网格布局合成
//! - 检测分发（同一时间最多一次在途）
//! - 输出 `CombinedFrame`
//!
//! ## 使用示例
//!
//! ```ignore
//! use contracts::{MonotonicClock, SyncEngineConfig};
//! use sync_engine::SyncEngine;
//!
//! let clock = MonotonicClock::shared();
//! let sources = factory.create_all(&blueprint.streams)?;
//! let mut engine = SyncEngine::new(SyncEngineConfig::default(), sources, clock)?;
//! engine.initialize()?;
//!
//! // One call per delivery tick
//! let frame = engine.produce_frame();
//! engine.set_delay(1, 2000)?;
//!
//! engine.shutdown().await;
//! ```

mod buffer;
mod channel;
mod combiner;
mod dispatch;
mod engine;
mod error;
mod health;
mod reconnect;

pub use buffer::{DelayBuffer, Tile};
pub use channel::StreamStatus;
pub use combiner::{placeholder_label, FrameCombiner, PlaceholderKind, StreamLayout};
pub use dispatch::{DetectionControl, DetectionStats, DispatchOutcome};
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use health::{HealthEvent, StreamHealth};

// Re-export contracts types
pub use contracts::{CombinedFrame, StreamHealthState, SyncEngineConfig, TileInfo, TileSource};
