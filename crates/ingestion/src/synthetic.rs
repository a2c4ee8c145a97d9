//! Synthetic 测试图源
//!
//! `synthetic://<name>?fps=30&width=640&height=360` 生成带移动条纹的纯色画面，
//! 用于无摄像头环境的演示和压测。可通过参数注入故障：
//! - `fail_after=N`: 第 N 帧后连接“断开”，之后 read 返回失败
//! - `open_failures=N`: 前 N 次 open 失败

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contracts::{
    CapturedFrame, ContractError, ImageData, ImageFormat, ReadOutcome, SharedClock,
    StreamDescriptor, StreamSource,
};
use tracing::{debug, trace, warn};

use crate::metrics::SourceMetrics;
use crate::{IngestionError, Result};

/// Synthetic source configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    /// Frame rate (Hz)
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Base color of the pattern
    pub color: [u8; 3],
    /// Simulate a dropped connection after this many frames
    pub fail_after: Option<u64>,
    /// Number of initial `open` calls that fail
    pub open_failures: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            width: 640,
            height: 360,
            color: [64, 96, 160],
            fail_after: None,
            open_failures: 0,
        }
    }
}

impl SyntheticConfig {
    /// Create config from params map (address query string)
    pub fn from_params(address: &str, params: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(fps) = params.get("fps") {
            config.fps = parse_param(address, "fps", fps)?;
            if !(config.fps > 0.0 && config.fps <= 240.0) {
                return Err(IngestionError::InvalidAddress {
                    address: address.to_string(),
                    message: format!("fps must be in (0, 240], got {}", config.fps),
                });
            }
        }
        if let Some(width) = params.get("width") {
            config.width = parse_param(address, "width", width)?;
        }
        if let Some(height) = params.get("height") {
            config.height = parse_param(address, "height", height)?;
        }
        if config.width == 0 || config.height == 0 {
            return Err(IngestionError::InvalidAddress {
                address: address.to_string(),
                message: "width and height must be > 0".into(),
            });
        }
        if let Some(color) = params.get("color") {
            config.color = parse_hex_color(color).ok_or_else(|| IngestionError::InvalidAddress {
                address: address.to_string(),
                message: format!("color must be rrggbb hex, got '{color}'"),
            })?;
        }
        if let Some(n) = params.get("fail_after") {
            config.fail_after = Some(parse_param(address, "fail_after", n)?);
        }
        if let Some(n) = params.get("open_failures") {
            config.open_failures = parse_param(address, "open_failures", n)?;
        }

        Ok(config)
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }
}

fn parse_param<T: std::str::FromStr>(address: &str, key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| IngestionError::InvalidAddress {
        address: address.to_string(),
        message: format!("invalid value '{value}' for '{key}'"),
    })
}

fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// State shared with the decode thread
#[derive(Default)]
struct Shared {
    running: AtomicBool,
    disconnected: AtomicBool,
    latest: Mutex<Option<CapturedFrame>>,
}

/// Synthetic test-pattern source driven by a background thread
pub struct SyntheticSource {
    descriptor: StreamDescriptor,
    config: SyntheticConfig,
    clock: SharedClock,
    shared: Arc<Shared>,
    sequence: Arc<AtomicU64>,
    worker: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<SourceMetrics>,
}

impl SyntheticSource {
    pub fn new(descriptor: StreamDescriptor, config: SyntheticConfig, clock: SharedClock) -> Self {
        Self {
            descriptor,
            config,
            clock,
            shared: Arc::new(Shared::default()),
            sequence: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
            metrics: Arc::new(SourceMetrics::new()),
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<SourceMetrics> {
        self.metrics.clone()
    }

    fn stop_worker(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = lock(&self.worker).take() {
            if handle.join().is_err() {
                warn!(stream_id = self.descriptor.id, "synthetic decode thread panicked");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Solid background with a vertical bar that moves with the sequence number
fn render_pattern(config: &SyntheticConfig, sequence: u64) -> ImageData {
    let (w, h) = (config.width as usize, config.height as usize);
    let bar_width = (w / 16).max(1);
    let bar_x = (sequence as usize * 8) % w;
    let mut data = Vec::with_capacity(w * h * 3);
    for _ in 0..h {
        for x in 0..w {
            if x >= bar_x && x < bar_x + bar_width {
                data.extend_from_slice(&[255, 255, 255]);
            } else {
                data.extend_from_slice(&config.color);
            }
        }
    }
    ImageData::new(config.width, config.height, ImageFormat::Rgb8, data)
}

impl StreamSource for SyntheticSource {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    fn open(&self) -> std::result::Result<(), ContractError> {
        let attempt = self.metrics.record_open_attempt();
        if attempt <= self.config.open_failures {
            return Err(ContractError::stream_open(
                self.descriptor.id,
                format!("simulated open failure {attempt}/{}", self.config.open_failures),
            ));
        }

        self.stop_worker();
        self.shared.disconnected.store(false, Ordering::SeqCst);
        *lock(&self.shared.latest) = None;
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let sequence = self.sequence.clone();
        let metrics = self.metrics.clone();
        let clock = self.clock.clone();
        let config = self.config.clone();
        let stream_id = self.descriptor.id;

        let handle = thread::spawn(move || {
            debug!(stream_id, fps = config.fps, "synthetic decode thread started");
            let mut produced: u64 = 0;

            while shared.running.load(Ordering::Relaxed) {
                if config.fail_after.is_some_and(|limit| produced >= limit) {
                    debug!(stream_id, produced, "synthetic stream simulating disconnect");
                    shared.disconnected.store(true, Ordering::SeqCst);
                    break;
                }

                let seq = sequence.fetch_add(1, Ordering::Relaxed) + 1;
                let frame = CapturedFrame {
                    stream_id,
                    timestamp: clock.now(),
                    sequence: seq,
                    image: render_pattern(&config, seq),
                };
                if lock(&shared.latest).replace(frame).is_some() {
                    metrics.record_overwritten();
                }
                metrics.record_decoded();
                produced += 1;
                trace!(stream_id, seq, "synthetic frame decoded");

                thread::sleep(config.frame_interval());
            }

            debug!(stream_id, "synthetic decode thread stopped");
        });

        *lock(&self.worker) = Some(handle);
        Ok(())
    }

    fn read(&self) -> ReadOutcome {
        if self.shared.disconnected.load(Ordering::SeqCst) {
            self.metrics.record_read_failure();
            return ReadOutcome::Failed(ContractError::stream_read(
                self.descriptor.id,
                "connection lost",
            ));
        }
        if !self.shared.running.load(Ordering::SeqCst) {
            self.metrics.record_read_failure();
            return ReadOutcome::Failed(ContractError::stream_read(
                self.descriptor.id,
                "stream not open",
            ));
        }

        match lock(&self.shared.latest).take() {
            Some(frame) => {
                self.metrics.record_read();
                ReadOutcome::Frame(frame)
            }
            None => ReadOutcome::Pending,
        }
    }

    fn close(&self) {
        self.stop_worker();
        *lock(&self.shared.latest) = None;
    }

    fn is_open(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst) && !self.shared.disconnected.load(Ordering::SeqCst)
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop_worker();
    }
}
