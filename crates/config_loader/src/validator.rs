//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围（`validator` 派生规则，含嵌套结构）
//! - 浮点字段必须是有限值（NaN 会绕过区间比较）
//! - stream id 唯一，address 形如 `scheme://...`
//! - 单应矩阵对应的 camera 必须是已配置的流，且每个 camera 至多一个
//! - sink 名称非空且唯一，队列容量 > 0

use std::collections::HashSet;

use contracts::{ContractError, SinkType, SystemBlueprint};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 校验 SystemBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &SystemBlueprint) -> Result<(), ContractError> {
    validate_finite(blueprint)?;
    validate_fields(blueprint)?;
    validate_stream_ids(blueprint)?;
    validate_stream_addresses(blueprint)?;
    validate_homographies(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 派生规则校验
fn validate_fields(blueprint: &SystemBlueprint) -> Result<(), ContractError> {
    blueprint.validate().map_err(|errors| {
        let (field, message) = first_error("", &errors)
            .unwrap_or_else(|| ("blueprint".to_string(), errors.to_string()));
        ContractError::config_validation(field, message)
    })
}

/// 浮点字段必须有限；重连等待必须能表示为 `Duration`
fn validate_finite(blueprint: &SystemBlueprint) -> Result<(), ContractError> {
    let fields = blueprint
        .engine
        .float_fields()
        .into_iter()
        .chain(blueprint.fusion.float_fields())
        .chain([("detection.fps", blueprint.detection.fps)]);
    for (field, value) in fields {
        if !value.is_finite() {
            return Err(ContractError::config_validation(
                field,
                format!("must be a finite number, got {value}"),
            ));
        }
    }
    blueprint.engine.reconnect_backoff()?;
    blueprint.engine.reconnect_retry_interval()?;
    Ok(())
}

/// First failing field as (`streams[1].delay_ms`, message), in key order
fn first_error(prefix: &str, errors: &ValidationErrors) -> Option<(String, String)> {
    let mut entries: Vec<_> = errors.errors().iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (name, kind) in entries {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        let found = match kind {
            ValidationErrorsKind::Field(list) => list.first().map(|e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("failed '{}' check", e.code));
                (path.clone(), message)
            }),
            ValidationErrorsKind::Struct(inner) => first_error(&path, inner),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(index, inner)| first_error(&format!("{path}[{index}]"), inner)),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

/// 校验 stream id 唯一性
fn validate_stream_ids(blueprint: &SystemBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for stream in &blueprint.streams {
        if !seen.insert(stream.id) {
            return Err(ContractError::config_validation(
                format!("streams[id={}]", stream.id),
                "duplicate stream id",
            ));
        }
    }
    Ok(())
}

/// 校验 address 格式
fn validate_stream_addresses(blueprint: &SystemBlueprint) -> Result<(), ContractError> {
    for stream in &blueprint.streams {
        let scheme = stream.address.split_once("://").map(|(scheme, _)| scheme);
        let valid = scheme.is_some_and(|s| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
        });
        if !valid {
            return Err(ContractError::config_validation(
                format!("streams[id={}].address", stream.id),
                format!("expected 'scheme://...', got '{}'", stream.address),
            ));
        }
    }
    Ok(())
}

/// 校验单应矩阵的 camera 引用
fn validate_homographies(blueprint: &SystemBlueprint) -> Result<(), ContractError> {
    let stream_ids: HashSet<_> = blueprint.streams.iter().map(|s| s.id).collect();
    let mut seen = HashSet::new();

    for h in &blueprint.detection.homographies {
        if !stream_ids.contains(&h.camera_id) {
            return Err(ContractError::config_validation(
                format!("detection.homographies[camera_id={}]", h.camera_id),
                "camera_id does not match any stream",
            ));
        }
        if !seen.insert(h.camera_id) {
            return Err(ContractError::config_validation(
                format!("detection.homographies[camera_id={}]", h.camera_id),
                "duplicate homography",
            ));
        }
        if h.matrix.iter().any(|v| !v.is_finite()) {
            return Err(ContractError::config_validation(
                format!("detection.homographies[camera_id={}].matrix", h.camera_id),
                "matrix entries must be finite",
            ));
        }
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &SystemBlueprint) -> Result<(), ContractError> {
    let mut names = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !names.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                format!("duplicate sink name '{}'", sink.name),
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", idx),
                "queue_capacity must be > 0",
            ));
        }
        if sink.sink_type == SinkType::File
            && sink.params.get("path").is_some_and(|p| p.trim().is_empty())
        {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.path", idx),
                "file sink path cannot be empty",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CameraHomography, SinkConfig, StreamDescriptor};

    fn minimal_blueprint() -> SystemBlueprint {
        SystemBlueprint {
            streams: vec![
                StreamDescriptor::new(0, "synthetic://a"),
                StreamDescriptor::new(1, "rtsp://10.0.0.2/live"),
            ],
            sinks: vec![SinkConfig {
                name: "log".into(),
                sink_type: SinkType::Log,
                queue_capacity: 100,
                params: Default::default(),
            }],
            ..Default::default()
        }
    }

    fn error_of(bp: &SystemBlueprint) -> String {
        validate(bp).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_blueprint()).is_ok());
    }

    #[test]
    fn test_duplicate_stream_id() {
        let mut bp = minimal_blueprint();
        bp.streams[1].id = 0;
        let err = error_of(&bp);
        assert!(err.contains("duplicate stream id"), "got: {err}");
    }

    #[test]
    fn test_delay_out_of_range_reports_path() {
        let mut bp = minimal_blueprint();
        bp.streams[1].delay_ms = 9000;
        let err = validate(&bp).unwrap_err();
        match err {
            ContractError::ConfigValidation { field, message } => {
                assert_eq!(field, "streams[1].delay_ms");
                assert!(message.contains("0..=5000"), "got: {message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_engine_range_checked() {
        let mut bp = minimal_blueprint();
        bp.engine.tile_width = 2;
        let err = error_of(&bp);
        assert!(err.contains("engine.tile_width"), "got: {err}");
    }

    #[test]
    fn test_non_finite_floats_rejected() {
        let mut bp = minimal_blueprint();
        bp.engine.reconnect_backoff_s = f64::NAN;
        match validate(&bp).unwrap_err() {
            ContractError::ConfigValidation { field, .. } => {
                assert_eq!(field, "engine.reconnect_backoff_s")
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut bp = minimal_blueprint();
        bp.fusion.spatial_threshold = f64::INFINITY;
        assert!(error_of(&bp).contains("fusion.spatial_threshold"));

        let mut bp = minimal_blueprint();
        bp.engine.reconnect_retry_interval_s = 1e300;
        assert!(error_of(&bp).contains("reconnect_retry_interval_s"));
    }

    #[test]
    fn test_address_without_scheme() {
        let mut bp = minimal_blueprint();
        bp.streams[0].address = "camera-1".into();
        let err = error_of(&bp);
        assert!(err.contains("scheme://"), "got: {err}");
    }

    #[test]
    fn test_homography_for_unknown_camera() {
        let mut bp = minimal_blueprint();
        let identity = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        bp.detection.homographies.push(CameraHomography {
            camera_id: 7,
            matrix: identity,
        });
        let err = error_of(&bp);
        assert!(err.contains("does not match any stream"), "got: {err}");

        bp.detection.homographies = vec![
            CameraHomography {
                camera_id: 1,
                matrix: identity,
            };
            2
        ];
        let err = error_of(&bp);
        assert!(err.contains("duplicate homography"), "got: {err}");
    }

    #[test]
    fn test_sink_rules() {
        let mut bp = minimal_blueprint();
        bp.sinks[0].name = String::new();
        assert!(error_of(&bp).contains("cannot be empty"));

        let mut bp = minimal_blueprint();
        bp.sinks.push(bp.sinks[0].clone());
        assert!(error_of(&bp).contains("duplicate sink name"));

        let mut bp = minimal_blueprint();
        bp.sinks[0].queue_capacity = 0;
        assert!(error_of(&bp).contains("queue_capacity"));
    }
}
