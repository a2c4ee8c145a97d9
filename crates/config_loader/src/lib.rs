//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate field ranges and cross-references (stream ids, homographies, sinks)
//! - Generate `SystemBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("trackfuse.toml")).unwrap();
//! println!("streams: {}", blueprint.streams.len());
//! ```

mod parser;
mod validator;

pub use contracts::SystemBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<SystemBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SystemBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already-built blueprint (e.g. after CLI overrides)
    pub fn validate(blueprint: &SystemBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    /// Serialize SystemBlueprint to TOML string
    pub fn to_toml(blueprint: &SystemBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize SystemBlueprint to JSON string
    pub fn to_json(blueprint: &SystemBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SystemBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
[[streams]]
id = 0
name = "Lobby"
address = "synthetic://lobby?fps=30"

[[streams]]
id = 1
name = "Gate"
address = "synthetic://gate?fps=15"
delay_ms = 2000

[detection]
enabled = true
fps = 10.0
seed = 7

[[detection.homographies]]
camera_id = 1
matrix = [1.0, 0.0, 720.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]

[fusion]
spatial_threshold = 40.0

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.streams.len(), 2);
        assert_eq!(bp.detection.seed, Some(7));
        assert_eq!(bp.fusion.spatial_threshold, 40.0);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.streams, bp2.streams);
        assert_eq!(bp.detection.homographies, bp2.detection.homographies);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.streams, bp2.streams);
    }

    #[test]
    fn test_load_from_path_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trackfuse.toml");
        std::fs::write(&path, MINIMAL_TOML).unwrap();
        assert!(ConfigLoader::load_from_path(&path).is_ok());

        let yaml = dir.path().join("trackfuse.yaml");
        std::fs::write(&yaml, "streams: []").unwrap();
        let err = ConfigLoader::load_from_path(&yaml).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_nan_engine_timing_rejected() {
        let content = r#"
[[streams]]
id = 0
address = "synthetic://a"

[engine]
reconnect_backoff_s = nan
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("reconnect_backoff_s"), "got: {err}");
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[[streams]]
id = 0
address = "synthetic://a"

[[streams]]
id = 0
address = "synthetic://b"
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }
}
