//! Validation of the inbound scheduler payload.
//!
//! Top-level problems reject the whole request before any remote call is
//! made. Problems with a single instance entry only skip that entry.

use crate::error::{InstanceSpecError, ValidationError};
use crate::instance::MAX_NUMBER_OF_SNAPSHOTS;
use serde_json::{Map, Value};
use tracing::{error, warn};

/// The retention policy name maximum length of characters.
pub const RETENTION_NAME_LENGTH: usize = 50;
/// Maximum number of Filestore instances per request.
pub const MAX_INSTANCES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionRequest {
    pub retention_policy: String,
    /// Entries that passed per-instance validation, in request order.
    pub instances: Vec<InstanceSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    /// Resource path with leading and trailing slashes trimmed.
    pub instance_path: String,
    pub snapshots: u32,
}

/// Parses and validates a raw request body.
pub fn parse_request(body: &[u8]) -> Result<RetentionRequest, ValidationError> {
    let json: Value = serde_json::from_slice(body).map_err(|e| {
        let err = ValidationError::MalformedBody(e.to_string());
        error!("{}", err);
        err
    })?;
    validate_request(&json)
}

/// Validates an already-parsed payload.
pub fn validate_request(json: &Value) -> Result<RetentionRequest, ValidationError> {
    let result = check_request(json);
    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

fn check_request(json: &Value) -> Result<RetentionRequest, ValidationError> {
    let object = validate_schema(json)?;

    let retention_policy = object
        .get("retention_policy")
        .and_then(Value::as_str)
        .filter(|policy| !policy.is_empty())
        .ok_or(ValidationError::MissingRetentionPolicy)?;
    if retention_policy.chars().count() > RETENTION_NAME_LENGTH {
        return Err(ValidationError::RetentionPolicyTooLong(RETENTION_NAME_LENGTH));
    }

    let entries = object
        .get("instances")
        .and_then(Value::as_array)
        .filter(|instances| !instances.is_empty())
        .ok_or(ValidationError::MissingInstances)?;
    if entries.len() > MAX_INSTANCES {
        return Err(ValidationError::TooManyInstances(MAX_INSTANCES));
    }

    let instances = entries
        .iter()
        .filter_map(|entry| match validate_instance(entry) {
            Ok(spec) => Some(spec),
            Err(e @ InstanceSpecError::MissingPath(_)) => {
                warn!("{}", e);
                None
            }
            Err(e) => {
                error!("{}", e);
                None
            }
        })
        .collect();

    Ok(RetentionRequest {
        retention_policy: retention_policy.to_string(),
        instances,
    })
}

/// Shape check: an object whose `retention_policy`, when present, is a string
/// and whose `instances`, when present, is an array.
fn validate_schema(json: &Value) -> Result<&Map<String, Value>, ValidationError> {
    let object = json
        .as_object()
        .ok_or_else(|| ValidationError::Schema(format!("{} is not of type 'object'", json)))?;

    if let Some(policy) = object.get("retention_policy") {
        if !policy.is_string() {
            return Err(ValidationError::Schema(format!(
                "{} is not of type 'string'",
                policy
            )));
        }
    }
    if let Some(instances) = object.get("instances") {
        if !instances.is_array() {
            return Err(ValidationError::Schema(format!(
                "{} is not of type 'array'",
                instances
            )));
        }
    }
    Ok(object)
}

/// Validates a single `instances` entry.
pub fn validate_instance(entry: &Value) -> Result<InstanceSpec, InstanceSpecError> {
    let instance_path = entry
        .get("instance_path")
        .and_then(Value::as_str)
        .map(|path| path.trim_matches('/'))
        .filter(|path| !path.is_empty())
        .ok_or_else(|| InstanceSpecError::MissingPath(entry.to_string()))?;

    let requested = match entry.get("snapshots") {
        None | Some(Value::Null) => {
            return Err(InstanceSpecError::MissingSnapshots(instance_path.to_string()))
        }
        Some(value) => parse_snapshot_count(value).ok_or_else(|| {
            InstanceSpecError::InvalidSnapshots {
                path: instance_path.to_string(),
                value: value.to_string(),
            }
        })?,
    };

    if requested <= 0 || requested > i64::from(MAX_NUMBER_OF_SNAPSHOTS) {
        return Err(InstanceSpecError::SnapshotsOutOfRange {
            path: instance_path.to_string(),
            requested,
            max: MAX_NUMBER_OF_SNAPSHOTS,
        });
    }

    Ok(InstanceSpec {
        instance_path: instance_path.to_string(),
        snapshots: requested as u32,
    })
}

fn parse_snapshot_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
