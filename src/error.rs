use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Filestore service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Configuration parsing error: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Failures talking to the remote Filestore service. Every variant is
/// considered transient by the retry policy.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Error {status}: {reason}")]
    Api { status: u16, reason: String },

    #[error("Timeout reached after {0:?}. Failed to complete operation.")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(Duration::ZERO)
        } else if err.is_decode() {
            ServiceError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ServiceError::Api {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            }
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

/// Request-level rejects: the whole batch is abandoned.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Failed to load scheduler body. Please validate the format: {0}")]
    MalformedBody(String),

    #[error("JSON schema validation error. Details: {0}")]
    Schema(String),

    #[error("JSON configuration file is missing a required key named 'retention_policy'.")]
    MissingRetentionPolicy,

    #[error("Retention policy name must be less than or equal to {0} characters long.")]
    RetentionPolicyTooLong(usize),

    #[error("JSON configuration file is missing a required key named 'instances'.")]
    MissingInstances,

    #[error("There are more than {0} Filestore instances in the JSON configuration file.")]
    TooManyInstances(usize),
}

/// Per-instance rejects: only the offending entry is skipped.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InstanceSpecError {
    #[error("Skip item {0} which is missing a required key named 'instance_path'.")]
    MissingPath(String),

    #[error("Skip {0} which is missing a required key named 'snapshots'.")]
    MissingSnapshots(String),

    #[error("Skip {path} which is requiring {value} snapshots. The number of snapshots should be an integer.")]
    InvalidSnapshots { path: String, value: String },

    #[error("Skip {path} which is requiring {requested} snapshots. The number of snapshots should be between 1 and {max}.")]
    SnapshotsOutOfRange { path: String, requested: i64, max: u32 },
}

/// Failures while loading a single instance's remote state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    #[error("Failed to retrieve Filestore instance details for {0}")]
    NotFound(String),

    #[error("Failed to list snapshots of Filestore instance {0}")]
    SnapshotsUnavailable(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("Server initialization error: {0}")]
    Init(String),
}

pub type Result<T> = std::result::Result<T, Error>;
