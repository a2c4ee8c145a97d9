//! 运行指标收集模块
//!
//! Prometheus recorders (via the `metrics` facade) plus an in-memory
//! aggregator used for end-of-run summaries.

use std::collections::HashMap;

use contracts::{CombinedFrame, FusionBatch, StreamHealthState, StreamId};
use metrics::{counter, gauge, histogram};

/// 记录一帧合成输出
///
/// 每个交付周期调用一次。
pub fn record_frame_produced(frame: &CombinedFrame, cycle_ms: f64) {
    counter!("trackfuse_frames_produced_total").increment(1);
    gauge!("trackfuse_last_frame_id").set(frame.frame_id as f64);
    histogram!("trackfuse_frame_cycle_ms").record(cycle_ms);

    for tile in &frame.tiles {
        counter!(
            "trackfuse_tile_source_total",
            "source" => tile.source.label()
        )
        .increment(1);
    }
}

/// 记录流健康状态 (gauge 值见 `StreamHealthState::code`)
pub fn record_stream_health(stream_id: StreamId, state: StreamHealthState) {
    gauge!(
        "trackfuse_stream_health",
        "stream_id" => stream_id.to_string()
    )
    .set(state.code());
}

/// 记录读取失败
pub fn record_stream_read_failure(stream_id: StreamId) {
    counter!(
        "trackfuse_stream_read_failures_total",
        "stream_id" => stream_id.to_string()
    )
    .increment(1);
}

/// 记录重连尝试
pub fn record_reconnect_attempt(stream_id: StreamId, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        "trackfuse_reconnect_attempts_total",
        "stream_id" => stream_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// 记录延迟缓冲区深度
pub fn record_buffer_depth(stream_id: StreamId, depth: usize) {
    gauge!(
        "trackfuse_buffer_depth",
        "stream_id" => stream_id.to_string()
    )
    .set(depth as f64);
}

/// 记录检测分发结果 (dispatched / skipped_busy / skipped_rate / disabled)
pub fn record_detection_dispatch(outcome: &'static str) {
    counter!(
        "trackfuse_detection_dispatch_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// 记录一次融合周期
pub fn record_fusion_cycle(batch: &FusionBatch, duration_ms: f64) {
    histogram!("trackfuse_fusion_cycle_ms").record(duration_ms);
    gauge!("trackfuse_global_tracks").set(batch.stats.total_global_tracks as f64);
    gauge!("trackfuse_active_mappings").set(batch.stats.active_mappings as f64);
    gauge!("trackfuse_fusion_merges").set(batch.stats.merges as f64);
    gauge!("trackfuse_fusion_dropped_inputs").set(batch.stats.dropped_inputs as f64);
    histogram!("trackfuse_fusion_input_tracks").record(batch.tracks.len() as f64);
}

/// 记录元数据分发
pub fn record_sink_write(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "trackfuse_sink_writes_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 运行指标聚合器
///
/// 在内存中聚合合成帧与融合周期，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct PipelineMetricsAggregator {
    /// 总帧数
    pub total_frames: u64,

    /// 各来源 tile 计数 (fresh/cached/delayed/placeholder)
    pub tile_sources: HashMap<&'static str, u64>,

    /// 各流占位 tile 次数
    pub placeholder_counts: HashMap<StreamId, u64>,

    /// 周期耗时统计 (ms)
    pub cycle_stats: RunningStats,

    /// 融合周期数
    pub fusion_cycles: u64,

    /// 融合耗时统计 (ms)
    pub fusion_stats: RunningStats,

    /// 每周期输入轨迹数
    pub tracks_per_cycle: RunningStats,

    /// 最近一次融合统计
    pub last_global_tracks: usize,
    pub last_merges: u64,
    pub last_tracks_created: u64,
}

impl PipelineMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新帧统计
    pub fn update_frame(&mut self, frame: &CombinedFrame, cycle_ms: f64) {
        self.total_frames += 1;
        self.cycle_stats.push(cycle_ms);
        for tile in &frame.tiles {
            *self.tile_sources.entry(tile.source.label()).or_insert(0) += 1;
            if tile.source.captured_at().is_none() {
                *self.placeholder_counts.entry(tile.stream_id).or_insert(0) += 1;
            }
        }
    }

    /// 更新融合统计
    pub fn update_fusion(&mut self, batch: &FusionBatch, duration_ms: f64) {
        self.fusion_cycles += 1;
        self.fusion_stats.push(duration_ms);
        self.tracks_per_cycle.push(batch.tracks.len() as f64);
        self.last_global_tracks = batch.stats.total_global_tracks;
        self.last_merges = batch.stats.merges;
        self.last_tracks_created = batch.stats.tracks_created;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let total_tiles: u64 = self.tile_sources.values().sum();
        let placeholders = self.tile_sources.get("placeholder").copied().unwrap_or(0);
        MetricsSummary {
            total_frames: self.total_frames,
            placeholder_rate: if total_tiles > 0 {
                placeholders as f64 / total_tiles as f64 * 100.0
            } else {
                0.0
            },
            tile_sources: self.tile_sources.clone(),
            cycle_ms: StatsSummary::from(&self.cycle_stats),
            fusion_cycles: self.fusion_cycles,
            fusion_ms: StatsSummary::from(&self.fusion_stats),
            tracks_per_cycle: StatsSummary::from(&self.tracks_per_cycle),
            global_tracks: self.last_global_tracks,
            merges: self.last_merges,
            tracks_created: self.last_tracks_created,
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub placeholder_rate: f64,
    pub tile_sources: HashMap<&'static str, u64>,
    pub cycle_ms: StatsSummary,
    pub fusion_cycles: u64,
    pub fusion_ms: StatsSummary,
    pub tracks_per_cycle: StatsSummary,
    pub global_tracks: usize,
    pub merges: u64,
    pub tracks_created: u64,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Pipeline Metrics Summary ===")?;
        writeln!(f, "Total frames: {}", self.total_frames)?;
        writeln!(f, "Placeholder tiles: {:.2}%", self.placeholder_rate)?;
        writeln!(f, "Cycle time (ms): {}", self.cycle_ms)?;

        if !self.tile_sources.is_empty() {
            let mut sources: Vec<_> = self.tile_sources.iter().collect();
            sources.sort();
            writeln!(f, "Tile sources:")?;
            for (source, count) in sources {
                writeln!(f, "  {}: {}", source, count)?;
            }
        }

        writeln!(f, "Fusion cycles: {}", self.fusion_cycles)?;
        writeln!(f, "Fusion time (ms): {}", self.fusion_ms)?;
        writeln!(f, "Tracks per cycle: {}", self.tracks_per_cycle)?;
        writeln!(
            f,
            "Global tracks: {} live, {} created, {} merged",
            self.global_tracks, self.tracks_created, self.merges
        )?;

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}
