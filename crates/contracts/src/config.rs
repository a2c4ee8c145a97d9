//! Engine configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::{CameraId, ContractError};

/// Upper bound for per-stream artificial delay (ms)
pub const MAX_DELAY_MS: u32 = 5000;

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SyncEngineConfig {
    /// Canonical tile width (px)
    #[validate(range(min = 16, max = 7680))]
    pub tile_width: u32,

    /// Canonical tile height (px)
    #[validate(range(min = 16, max = 4320))]
    pub tile_height: u32,

    /// Buffer retention while a delay is set (s)
    #[validate(range(min = 0.1))]
    pub retention_s: f64,

    /// Buffer retention while delay is 0 (s)
    #[validate(range(min = 0.1))]
    pub undelayed_retention_s: f64,

    /// Slack kept behind the target when a new delay purges the buffer (s)
    #[validate(range(min = 0.0))]
    pub delay_purge_margin_s: f64,

    /// Init deadline (s)
    #[validate(range(min = 0.1))]
    pub init_timeout_s: f64,

    /// Init deadline in degraded-network mode (s)
    #[validate(range(min = 0.1))]
    pub degraded_init_timeout_s: f64,

    /// Use the degraded-network deadline (cellular links, ...)
    pub degraded_network: bool,

    /// Init deadline after a successful reopen (s)
    #[validate(range(min = 0.1))]
    pub reconnect_init_timeout_s: f64,

    /// Wait before the first reopen attempt (s)
    #[validate(range(min = 0.0))]
    pub reconnect_backoff_s: f64,

    /// Wait between subsequent reopen attempts (s)
    #[validate(range(min = 0.0))]
    pub reconnect_retry_interval_s: f64,

    /// A Ready stream that delivers nothing for this long is treated as failed (s)
    #[validate(range(min = 0.1))]
    pub stall_timeout_s: f64,

    /// Log read statistics every N successful reads
    #[validate(range(min = 1))]
    pub read_stats_interval: u64,

    /// Warn when failures / attempts exceeds this ratio
    #[validate(range(min = 0.0, max = 1.0))]
    pub read_failure_warn_ratio: f64,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            tile_width: 720,
            tile_height: 480,
            retention_s: 10.0,
            undelayed_retention_s: 2.0,
            delay_purge_margin_s: 2.0,
            init_timeout_s: 30.0,
            degraded_init_timeout_s: 60.0,
            degraded_network: false,
            reconnect_init_timeout_s: 60.0,
            reconnect_backoff_s: 5.0,
            reconnect_retry_interval_s: 30.0,
            stall_timeout_s: 5.0,
            read_stats_interval: 100,
            read_failure_warn_ratio: 0.05,
        }
    }
}

impl SyncEngineConfig {
    /// Effective init deadline for freshly initialized streams
    pub fn init_timeout(&self) -> f64 {
        if self.degraded_network {
            self.degraded_init_timeout_s
        } else {
            self.init_timeout_s
        }
    }

    pub fn reconnect_backoff(&self) -> Result<Duration, ContractError> {
        seconds("engine.reconnect_backoff_s", self.reconnect_backoff_s)
    }

    pub fn reconnect_retry_interval(&self) -> Result<Duration, ContractError> {
        seconds("engine.reconnect_retry_interval_s", self.reconnect_retry_interval_s)
    }

    /// Every float field, keyed by its config path
    pub fn float_fields(&self) -> [(&'static str, f64); 10] {
        [
            ("engine.retention_s", self.retention_s),
            ("engine.undelayed_retention_s", self.undelayed_retention_s),
            ("engine.delay_purge_margin_s", self.delay_purge_margin_s),
            ("engine.init_timeout_s", self.init_timeout_s),
            ("engine.degraded_init_timeout_s", self.degraded_init_timeout_s),
            ("engine.reconnect_init_timeout_s", self.reconnect_init_timeout_s),
            ("engine.reconnect_backoff_s", self.reconnect_backoff_s),
            ("engine.reconnect_retry_interval_s", self.reconnect_retry_interval_s),
            ("engine.stall_timeout_s", self.stall_timeout_s),
            ("engine.read_failure_warn_ratio", self.read_failure_warn_ratio),
        ]
    }
}

/// Non-negative, finite seconds as a `Duration`
fn seconds(field: &str, secs: f64) -> Result<Duration, ContractError> {
    Duration::try_from_secs_f64(secs).map_err(|e| {
        ContractError::config_validation(field, format!("invalid duration {secs}: {e}"))
    })
}

/// Detection dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DetectionConfig {
    /// Dispatch frames to detection at startup
    pub enabled: bool,

    /// Target detection rate (Hz), clamped to 1..=30 at runtime
    #[validate(range(min = 1.0, max = 30.0))]
    pub fps: f64,

    /// Tracker implementation
    pub tracker: TrackerKind,

    /// Seed for the dummy tracker (deterministic demos)
    pub seed: Option<u64>,

    /// Image → ground-plane homographies per camera
    #[validate(nested)]
    pub homographies: Vec<CameraHomography>,
}

/// Row-major 3×3 image → ground-plane homography for one camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CameraHomography {
    pub camera_id: CameraId,
    pub matrix: [f64; 9],
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fps: 10.0,
            tracker: TrackerKind::default(),
            seed: None,
            homographies: Vec::new(),
        }
    }
}

impl DetectionConfig {
    pub const MIN_FPS: f64 = 1.0;
    pub const MAX_FPS: f64 = 30.0;

    /// Detection fps clamped to the supported range
    pub fn clamped_fps(&self) -> f64 {
        clamp_detection_fps(self.fps)
    }
}

/// Clamp a requested detection rate to 1..=30 Hz (NaN → 10 Hz)
pub fn clamp_detection_fps(fps: f64) -> f64 {
    if fps.is_nan() {
        return 10.0;
    }
    fps.clamp(DetectionConfig::MIN_FPS, DetectionConfig::MAX_FPS)
}

/// Tracker implementation selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    /// Pseudo-random detections, for demos and soak tests
    #[default]
    Dummy,
    /// No detector; detection dispatch is never registered
    None,
}

/// Fusion engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FusionConfig {
    /// Max ground-plane distance for two tracks to be linked
    #[validate(range(min = 0.0))]
    pub spatial_threshold: f64,

    /// Max cosine distance between appearance features
    #[validate(range(min = 0.0, max = 2.0))]
    pub appearance_threshold: f64,

    /// Global tracks unseen for longer than this are expired (s)
    #[validate(range(min = 0.0))]
    pub max_track_age_s: f64,

    /// EMA weight of the newest position sample
    #[validate(range(min = 0.0, max = 1.0))]
    pub smoothing_alpha: f64,

    /// EMA weight of the newest velocity sample
    #[validate(range(min = 0.0, max = 1.0))]
    pub velocity_alpha: f64,

    /// Position samples kept per global track
    #[validate(range(min = 1))]
    pub max_history: usize,
}

impl FusionConfig {
    /// Every float field, keyed by its config path
    pub fn float_fields(&self) -> [(&'static str, f64); 5] {
        [
            ("fusion.spatial_threshold", self.spatial_threshold),
            ("fusion.appearance_threshold", self.appearance_threshold),
            ("fusion.max_track_age_s", self.max_track_age_s),
            ("fusion.smoothing_alpha", self.smoothing_alpha),
            ("fusion.velocity_alpha", self.velocity_alpha),
        ]
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            spatial_threshold: 50.0,
            appearance_threshold: 0.4,
            max_track_age_s: 3.0,
            smoothing_alpha: 0.3,
            velocity_alpha: 0.3,
            max_history: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SyncEngineConfig::default().validate().is_ok());
        assert!(DetectionConfig::default().validate().is_ok());
        assert!(FusionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_init_timeout_degraded() {
        let mut config = SyncEngineConfig::default();
        assert_eq!(config.init_timeout(), 30.0);
        config.degraded_network = true;
        assert_eq!(config.init_timeout(), 60.0);
    }

    #[test]
    fn test_reconnect_durations_reject_nan() {
        let mut config = SyncEngineConfig::default();
        assert_eq!(config.reconnect_backoff().unwrap(), Duration::from_secs(5));

        config.reconnect_backoff_s = f64::NAN;
        config.reconnect_retry_interval_s = -1.0;
        let err = config.reconnect_backoff().unwrap_err();
        assert!(err.to_string().contains("reconnect_backoff_s"), "got: {err}");
        assert!(config.reconnect_retry_interval().is_err());
    }

    #[test]
    fn test_detection_fps_clamp() {
        assert_eq!(clamp_detection_fps(0.0), 1.0);
        assert_eq!(clamp_detection_fps(120.0), 30.0);
        assert_eq!(clamp_detection_fps(f64::NAN), 10.0);
        assert_eq!(clamp_detection_fps(12.5), 12.5);
    }

    #[test]
    fn test_partial_fusion_config() {
        let config: FusionConfig =
            serde_json::from_str(r#"{"spatial_threshold": 25.0}"#).unwrap();
        assert_eq!(config.spatial_threshold, 25.0);
        assert_eq!(config.max_track_age_s, 3.0);
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        let config = FusionConfig {
            smoothing_alpha: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
