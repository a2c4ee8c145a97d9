//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{SinkConfig, SinkType, StreamDescriptor, SystemBlueprint};
use std::time::Duration;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Synthetic stream colors for the demo blueprint (rrggbb)
const DEMO_COLORS: [&str; 6] = ["c0392b", "27ae60", "2980b9", "8e44ad", "d35400", "16a085"];

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let mut blueprint = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()).into());
            }
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!(streams = args.demo_streams, "No configuration given, using synthetic demo streams");
            demo_blueprint(args.demo_streams)
        }
    };

    apply_overrides(&mut blueprint, args)?;
    config_loader::ConfigLoader::validate(&blueprint)
        .context("Configuration invalid after CLI overrides")?;

    info!(
        streams = blueprint.enabled_streams().count(),
        detection = blueprint.detection.enabled,
        tracker = ?blueprint.detection.tracker,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        output_fps: args.fps,
        delays: args.delays.clone(),
        max_frames: (args.max_frames > 0).then_some(args.max_frames),
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        buffer_size: args.buffer_size,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
        snapshots: args
            .snapshot_dir
            .clone()
            .map(|dir| (dir, args.snapshot_every)),
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        frames = stats.frames(),
        duration_secs = stats.duration.as_secs_f64(),
        fps = format!("{:.2}", stats.fps()),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("trackfuse finished");
    Ok(())
}

/// `n` synthetic streams with a log sink and the dummy tracker
pub fn demo_blueprint(n: u32) -> SystemBlueprint {
    let streams = (0..n)
        .map(|id| {
            let color = DEMO_COLORS[id as usize % DEMO_COLORS.len()];
            StreamDescriptor::new(id, format!("synthetic://demo{id}?fps=25&color={color}"))
        })
        .collect();

    let mut blueprint = SystemBlueprint {
        streams,
        sinks: vec![SinkConfig {
            name: "log".to_string(),
            sink_type: SinkType::Log,
            queue_capacity: 100,
            params: Default::default(),
        }],
        ..Default::default()
    };
    blueprint.detection.enabled = true;
    blueprint
}

/// Apply CLI overrides on top of the loaded blueprint
fn apply_overrides(blueprint: &mut SystemBlueprint, args: &RunArgs) -> Result<(), CliError> {
    if let Some(enabled) = args.detection {
        info!(enabled, "Overriding detection enable flag from CLI");
        blueprint.detection.enabled = enabled;
    }
    if let Some(fps) = args.detection_fps {
        info!(fps, "Overriding detection fps from CLI");
        blueprint.detection.fps = contracts::clamp_detection_fps(fps);
    }
    if let Some(tracker) = args.tracker {
        info!(tracker = ?tracker, "Overriding tracker from CLI");
        blueprint.detection.tracker = tracker.into();
    }
    if let Some(seed) = args.seed {
        blueprint.detection.seed = Some(seed);
    }
    if args.degraded_network {
        blueprint.engine.degraded_network = true;
    }

    if !(args.fps.is_finite() && args.fps > 0.0 && args.fps <= 120.0) {
        return Err(CliError::invalid_override(
            "--fps",
            format!("expected 0 < fps <= 120, got {}", args.fps),
        ));
    }
    for (stream_id, _) in &args.delays {
        if !blueprint.enabled_streams().any(|s| s.id == *stream_id) {
            return Err(CliError::invalid_override(
                "--delay",
                format!("no enabled stream with id {stream_id}"),
            ));
        }
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &SystemBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Streams ({}):", blueprint.streams.len());
    for stream in &blueprint.streams {
        println!(
            "  - [{}] {} {} (delay {} ms{})",
            stream.id,
            stream.name,
            stream.address,
            stream.delay_ms,
            if stream.enabled { "" } else { ", disabled" }
        );
    }

    println!("\nEngine:");
    println!(
        "  Tile: {}x{}",
        blueprint.engine.tile_width, blueprint.engine.tile_height
    );
    println!("  Init timeout: {:.0}s", blueprint.engine.init_timeout());

    println!("\nDetection:");
    println!("  Enabled: {}", blueprint.detection.enabled);
    println!("  FPS: {}", blueprint.detection.clamped_fps());
    println!("  Tracker: {:?}", blueprint.detection.tracker);

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use contracts::TrackerKind;

    fn run_args(extra: &[&str]) -> RunArgs {
        let argv = ["trackfuse", "run"].iter().chain(extra.iter()).copied();
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_demo_blueprint_is_valid() {
        let bp = demo_blueprint(5);
        assert_eq!(bp.streams.len(), 5);
        assert_eq!(bp.streams[4].name, "Camera 4");
        assert!(bp.streams[0].address.starts_with("synthetic://"));
        assert!(config_loader::ConfigLoader::validate(&bp).is_ok());
    }

    #[test]
    fn test_overrides_applied() {
        let mut bp = demo_blueprint(2);
        let args = run_args(&[
            "--detection",
            "false",
            "--detection-fps",
            "90",
            "--tracker",
            "none",
            "--seed",
            "3",
            "--degraded-network",
        ]);
        apply_overrides(&mut bp, &args).unwrap();

        assert!(!bp.detection.enabled);
        assert_eq!(bp.detection.fps, 30.0);
        assert_eq!(bp.detection.tracker, TrackerKind::None);
        assert_eq!(bp.detection.seed, Some(3));
        assert!(bp.engine.degraded_network);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let mut bp = demo_blueprint(2);
        let err = apply_overrides(&mut bp, &run_args(&["--delay", "5=100"])).unwrap_err();
        assert!(err.to_string().contains("--delay"), "got: {err}");

        let err = apply_overrides(&mut bp, &run_args(&["--fps", "0"])).unwrap_err();
        assert!(err.to_string().contains("--fps"), "got: {err}");
    }
}
