//! SystemBlueprint - Config Loader 输出
//!
//! 描述完整的系统配置：摄像头流、合成引擎、检测、融合、输出路由。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::{DetectionConfig, FusionConfig, StreamDescriptor, SyncEngineConfig};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的系统配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SystemBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 摄像头流列表
    #[validate(nested)]
    pub streams: Vec<StreamDescriptor>,

    /// 同步合成引擎参数
    #[serde(default)]
    #[validate(nested)]
    pub engine: SyncEngineConfig,

    /// 检测分发参数
    #[serde(default)]
    #[validate(nested)]
    pub detection: DetectionConfig,

    /// 跨摄像头融合参数
    #[serde(default)]
    #[validate(nested)]
    pub fusion: FusionConfig,

    /// 元数据输出路由
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

impl SystemBlueprint {
    /// Streams that will be opened and laid out
    pub fn enabled_streams(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter().filter(|s| s.enabled)
    }
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// JSON lines 文件输出
    File,
}
