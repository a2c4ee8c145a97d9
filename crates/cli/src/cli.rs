//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// trackfuse - multi-camera stream sync and cross-camera identity fusion
#[derive(Parser, Debug)]
#[command(
    name = "trackfuse",
    author,
    version,
    about = "Multi-camera stream synchronization and identity fusion",
    long_about = "Combines N camera streams into one grid frame per tick, with per-stream \n\
                  delays, health tracking and automatic reconnection. Combined frames are \n\
                  fed to a tracker whose ground-plane tracks are fused into global ids \n\
                  and dispatched to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TRACKFUSE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TRACKFUSE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default level when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the delivery loop
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); synthetic demo streams when omitted
    #[arg(short, long, env = "TRACKFUSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of synthetic streams when running without a config file
    #[arg(long, default_value = "4", env = "TRACKFUSE_DEMO_STREAMS")]
    pub demo_streams: u32,

    /// Combined frame output rate (Hz)
    #[arg(long, default_value = "15", env = "TRACKFUSE_FPS")]
    pub fps: f64,

    /// Per-stream delay override, `STREAM_ID=MS` (repeatable)
    #[arg(long = "delay", value_name = "ID=MS", value_parser = parse_delay)]
    pub delays: Vec<(u32, i64)>,

    /// Override detection enable flag from configuration
    #[arg(long, env = "TRACKFUSE_DETECTION")]
    pub detection: Option<bool>,

    /// Override detection rate (Hz, clamped to 1..=30)
    #[arg(long, env = "TRACKFUSE_DETECTION_FPS")]
    pub detection_fps: Option<f64>,

    /// Override tracker implementation
    #[arg(long, value_enum)]
    pub tracker: Option<TrackerArg>,

    /// Seed for the dummy tracker
    #[arg(long)]
    pub seed: Option<u64>,

    /// Use the degraded-network init deadline
    #[arg(long)]
    pub degraded_network: bool,

    /// Maximum number of combined frames to produce (0 = unlimited)
    #[arg(long, default_value = "0", env = "TRACKFUSE_MAX_FRAMES")]
    pub max_frames: u64,

    /// Run duration in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "TRACKFUSE_DURATION")]
    pub duration: u64,

    /// Write a PNG of every Nth combined frame into this directory
    #[arg(long, env = "TRACKFUSE_SNAPSHOT_DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// Snapshot interval in frames
    #[arg(long, default_value = "30")]
    pub snapshot_every: u64,

    /// Fusion batch queue capacity between the tracker and the sinks
    #[arg(long, default_value = "100", env = "TRACKFUSE_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TRACKFUSE_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show engine, detection and fusion parameters
    #[arg(long)]
    pub params: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

/// Tracker selector
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerArg {
    /// Pseudo-random detections
    Dummy,
    /// No tracker, fusion disabled
    None,
}

impl From<TrackerArg> for contracts::TrackerKind {
    fn from(arg: TrackerArg) -> Self {
        match arg {
            TrackerArg::Dummy => Self::Dummy,
            TrackerArg::None => Self::None,
        }
    }
}

/// Parse `ID=MS`
fn parse_delay(raw: &str) -> Result<(u32, i64), String> {
    let (id, ms) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected STREAM_ID=MS, got '{raw}'"))?;
    let id = id
        .trim()
        .parse()
        .map_err(|_| format!("invalid stream id '{id}'"))?;
    let ms = ms
        .trim()
        .parse()
        .map_err(|_| format!("invalid delay '{ms}'"))?;
    Ok((id, ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delay() {
        assert_eq!(parse_delay("2=1500"), Ok((2, 1500)));
        assert_eq!(parse_delay(" 0 = -5 "), Ok((0, -5)));
        assert!(parse_delay("2:1500").is_err());
        assert!(parse_delay("x=10").is_err());
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from([
            "trackfuse",
            "-v",
            "run",
            "--fps",
            "10",
            "--delay",
            "1=2000",
            "--delay",
            "3=0",
            "--tracker",
            "none",
            "--max-frames",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.log_level(), "debug");
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.fps, 10.0);
        assert_eq!(args.delays, vec![(1, 2000), (3, 0)]);
        assert_eq!(args.tracker, Some(TrackerArg::None));
        assert_eq!(args.max_frames, 5);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["trackfuse", "-q", "-v", "info"]).is_err());
        let cli = Cli::try_parse_from(["trackfuse", "-q", "info"]).unwrap();
        assert_eq!(cli.log_level(), "warn");
    }
}
