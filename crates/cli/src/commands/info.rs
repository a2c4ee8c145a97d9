//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{DetectionConfig, FusionConfig, SyncEngineConfig, SystemBlueprint};
use serde::Serialize;
use sync_engine::StreamLayout;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    version: String,
    streams: Vec<StreamInfo<'a>>,
    detection: DetectionInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine: Option<&'a SyncEngineConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fusion: Option<&'a FusionConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo<'a>>,
}

#[derive(Serialize)]
struct StreamInfo<'a> {
    id: u32,
    name: &'a str,
    address: &'a str,
    enabled: bool,
    delay_ms: u32,
    /// Tile position in the combined frame (row, column), None when disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    grid_cell: Option<(u32, u32)>,
}

#[derive(Serialize)]
struct DetectionInfo {
    enabled: bool,
    fps: f64,
    tracker: String,
    calibrated_cameras: Vec<u32>,
}

#[derive(Serialize)]
struct SinkInfo<'a> {
    name: &'a str,
    sink_type: String,
    queue_capacity: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn layout(blueprint: &SystemBlueprint) -> StreamLayout {
    StreamLayout::for_count(
        blueprint.enabled_streams().count(),
        blueprint.engine.tile_width,
        blueprint.engine.tile_height,
    )
}

fn build_config_info<'a>(blueprint: &'a SystemBlueprint, args: &InfoArgs) -> ConfigInfo<'a> {
    let cols = layout(blueprint).columns;
    let mut slot = 0u32;
    let streams = blueprint
        .streams
        .iter()
        .map(|s| {
            let grid_cell = s.enabled.then(|| {
                let cell = (slot / cols, slot % cols);
                slot += 1;
                cell
            });
            StreamInfo {
                id: s.id,
                name: &s.name,
                address: &s.address,
                enabled: s.enabled,
                delay_ms: s.delay_ms,
                grid_cell,
            }
        })
        .collect();

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: &s.name,
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        streams,
        detection: detection_info(&blueprint.detection),
        engine: args.params.then_some(&blueprint.engine),
        fusion: args.params.then_some(&blueprint.fusion),
        sinks,
    }
}

fn detection_info(detection: &DetectionConfig) -> DetectionInfo {
    DetectionInfo {
        enabled: detection.enabled,
        fps: detection.clamped_fps(),
        tracker: format!("{:?}", detection.tracker),
        calibrated_cameras: detection.homographies.iter().map(|h| h.camera_id).collect(),
    }
}

fn print_config_info(blueprint: &SystemBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 trackfuse Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let enabled = blueprint.enabled_streams().count();
    let grid = layout(blueprint);

    // Streams
    println!("📷 Streams ({}, {} enabled)", blueprint.streams.len(), enabled);
    println!(
        "   ├─ Grid: {}x{} tiles, canvas {}x{} px",
        grid.columns,
        grid.rows,
        grid.canvas_width(),
        grid.canvas_height()
    );
    for (i, stream) in blueprint.streams.iter().enumerate() {
        let prefix = if i == blueprint.streams.len() - 1 { "└─" } else { "├─" };
        println!(
            "   {} [{}] {} - {}{}{}",
            prefix,
            stream.id,
            stream.name,
            stream.address,
            if stream.delay_ms > 0 {
                format!(", delay {} ms", stream.delay_ms)
            } else {
                String::new()
            },
            if stream.enabled { "" } else { " (disabled)" }
        );
    }

    // Detection
    let detection = detection_info(&blueprint.detection);
    println!("\n🔍 Detection");
    println!("   ├─ Enabled: {}", detection.enabled);
    println!("   ├─ FPS: {}", detection.fps);
    println!("   ├─ Tracker: {}", detection.tracker);
    println!("   └─ Calibrated cameras: {:?}", detection.calibrated_cameras);

    if args.params {
        let e = &blueprint.engine;
        println!("\n⚙️  Engine");
        println!("   ├─ Retention: {}s ({}s undelayed)", e.retention_s, e.undelayed_retention_s);
        println!(
            "   ├─ Init timeout: {}s{}",
            e.init_timeout(),
            if e.degraded_network { " (degraded network)" } else { "" }
        );
        println!(
            "   ├─ Reconnect: backoff {}s, retry every {}s, init {}s",
            e.reconnect_backoff_s, e.reconnect_retry_interval_s, e.reconnect_init_timeout_s
        );
        println!("   └─ Stall timeout: {}s", e.stall_timeout_s);

        let f = &blueprint.fusion;
        println!("\n🔗 Fusion");
        println!("   ├─ Spatial threshold: {}", f.spatial_threshold);
        println!("   ├─ Appearance threshold: {}", f.appearance_threshold);
        println!("   ├─ Max track age: {}s", f.max_track_age_s);
        println!(
            "   └─ Smoothing: position {}, velocity {}, history {}",
            f.smoothing_alpha, f.velocity_alpha, f.max_history
        );
    }

    // Sinks
    if args.sinks && !blueprint.sinks.is_empty() {
        println!("\n📤 Sinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let prefix = if i == blueprint.sinks.len() - 1 { "└─" } else { "├─" };
            println!(
                "   {} {} ({:?}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::StreamDescriptor;

    #[test]
    fn test_grid_cells_skip_disabled_streams() {
        let mut disabled = StreamDescriptor::new(1, "synthetic://b");
        disabled.enabled = false;
        let blueprint = SystemBlueprint {
            streams: vec![
                StreamDescriptor::new(0, "synthetic://a"),
                disabled,
                StreamDescriptor::new(2, "synthetic://c"),
                StreamDescriptor::new(3, "synthetic://d"),
            ],
            ..Default::default()
        };
        let args = InfoArgs {
            config: "unused.toml".into(),
            json: true,
            params: true,
            sinks: false,
        };

        let info = build_config_info(&blueprint, &args);
        let cells: Vec<_> = info.streams.iter().map(|s| s.grid_cell).collect();
        assert_eq!(cells, vec![Some((0, 0)), None, Some((0, 1)), Some((1, 0))]);
        assert!(info.engine.is_some());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["detection"]["tracker"], "Dummy");
        assert!(json.get("sinks").is_none());
    }
}
