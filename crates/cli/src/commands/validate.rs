//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{SinkType, SystemBlueprint, TrackerKind};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    stream_count: usize,
    enabled_streams: usize,
    detection_enabled: bool,
    tracker: String,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    stream_count: blueprint.streams.len(),
                    enabled_streams: blueprint.enabled_streams().count(),
                    detection_enabled: blueprint.detection.enabled,
                    tracker: format!("{:?}", blueprint.detection.tracker),
                    sink_count: blueprint.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &SystemBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.enabled_streams().next().is_none() {
        warnings.push("No enabled streams - every frame will be an empty canvas".to_string());
    }

    // Check for empty sinks
    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - fusion batches will be dropped".to_string());
    }

    let supported = ingestion::SourceFactory::new(contracts::MonotonicClock::shared());
    let mut unsupported = HashSet::new();
    for stream in blueprint.enabled_streams() {
        if let Some(scheme) = stream.scheme() {
            if !supported.supports(&scheme) && unsupported.insert(scheme.clone()) {
                warnings.push(format!(
                    "Scheme '{}' has no built-in source (stream {}); register one before running",
                    scheme, stream.id
                ));
            }
        }
    }

    if blueprint.detection.enabled && blueprint.detection.tracker == TrackerKind::None {
        warnings.push("detection.enabled is set but tracker is 'none' - nothing will be dispatched".to_string());
    }

    let calibrated: HashSet<_> = blueprint
        .detection
        .homographies
        .iter()
        .map(|h| h.camera_id)
        .collect();
    if blueprint.detection.tracker != TrackerKind::None && !calibrated.is_empty() {
        for stream in blueprint.enabled_streams() {
            if !calibrated.contains(&stream.id) {
                warnings.push(format!(
                    "Stream {} has no homography - image coordinates are used as-is",
                    stream.id
                ));
            }
        }
    }

    if blueprint
        .sinks
        .iter()
        .any(|s| s.sink_type == SinkType::File && !s.params.contains_key("path"))
    {
        warnings.push("File sink without 'path' - writing to ./output/fusion.jsonl".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Streams: {} ({} enabled)",
                summary.stream_count, summary.enabled_streams
            );
            println!(
                "  Detection: {} ({})",
                if summary.detection_enabled { "on" } else { "off" },
                summary.tracker
            );
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_for(content: &str, ext: &str) -> (tempfile::NamedTempFile, ValidateArgs) {
        let mut file = tempfile::Builder::new().suffix(ext).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        (file, args)
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let (_file, args) = args_for(
            r#"
            [[streams]]
            id = 0
            address = "rtsp://10.0.0.5/live"

            [[streams]]
            id = 1
            address = "synthetic://b"

            [detection]
            enabled = true
            tracker = "dummy"

            [[detection.homographies]]
            camera_id = 0
            matrix = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
            "#,
            ".toml",
        );

        let result = validate_config(&args);
        assert!(result.valid, "error: {:?}", result.error);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("No sinks")));
        assert!(warnings.iter().any(|w| w.contains("'rtsp'")));
        assert!(warnings.iter().any(|w| w.contains("Stream 1 has no homography")));
        assert_eq!(result.summary.unwrap().enabled_streams, 2);
    }

    #[test]
    fn test_invalid_config_reports_error() {
        let (_file, args) = args_for(
            r#"{"streams": [{"id": 0, "address": "synthetic://a", "delay_ms": 6000}]}"#,
            ".json",
        );
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("delay_ms"));
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: "/nonexistent/trackfuse.toml".into(),
            json: false,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(run_validate(&args).is_err());
    }
}
