use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Standard,
    Premium,
    BasicHdd,
    BasicSsd,
    HighScaleSsd,
    Enterprise,
    Zonal,
    Regional,
    #[serde(other)]
    TierUnspecified,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Standard => "STANDARD",
            Tier::Premium => "PREMIUM",
            Tier::BasicHdd => "BASIC_HDD",
            Tier::BasicSsd => "BASIC_SSD",
            Tier::HighScaleSsd => "HIGH_SCALE_SSD",
            Tier::Enterprise => "ENTERPRISE",
            Tier::Zonal => "ZONAL",
            Tier::Regional => "REGIONAL",
            Tier::TierUnspecified => "TIER_UNSPECIFIED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Creating,
    Ready,
    Repairing,
    Deleting,
    Error,
    Restoring,
    Suspended,
    Suspending,
    Resuming,
    Reverting,
    #[serde(other)]
    StateUnspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotState {
    Creating,
    Ready,
    Deleting,
    #[serde(other)]
    StateUnspecified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDetails {
    pub name: String,
    #[serde(default = "unspecified_tier")]
    pub tier: Tier,
    #[serde(default = "unspecified_instance_state")]
    pub state: InstanceState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDetails {
    pub name: String,
    #[serde(default = "unspecified_snapshot_state")]
    pub state: SnapshotState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

/// An asynchronous job reference returned by create and delete calls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationHandle {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

fn unspecified_tier() -> Tier {
    Tier::TierUnspecified
}

fn unspecified_instance_state() -> InstanceState {
    InstanceState::StateUnspecified
}

fn unspecified_snapshot_state() -> SnapshotState {
    SnapshotState::StateUnspecified
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instance_parses_from_api_payload() {
        let instance: InstanceDetails = serde_json::from_value(json!({
            "name": "projects/p/locations/us-central1/instances/filer",
            "tier": "ENTERPRISE",
            "state": "READY",
            "createTime": "2022-03-03T15:30:00Z",
            "fileShares": [{ "name": "share", "capacityGb": "1024" }]
        }))
        .unwrap();

        assert_eq!(instance.tier, Tier::Enterprise);
        assert_eq!(instance.state, InstanceState::Ready);
    }

    #[test]
    fn unknown_enum_values_fall_back_to_unspecified() {
        let instance: InstanceDetails = serde_json::from_value(json!({
            "name": "filer",
            "tier": "SOME_FUTURE_TIER",
        }))
        .unwrap();

        assert_eq!(instance.tier, Tier::TierUnspecified);
        assert_eq!(instance.state, InstanceState::StateUnspecified);
    }

    #[test]
    fn failed_operation_carries_error() {
        let op: OperationDetails = serde_json::from_value(json!({
            "name": "projects/p/locations/l/operations/op-1",
            "done": true,
            "error": { "code": 9, "message": "FAILED_PRECONDITION" }
        }))
        .unwrap();

        assert!(op.done);
        assert!(op.response.is_none());
        assert_eq!(op.error.unwrap().code, 9);
    }
}
