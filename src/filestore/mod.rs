mod models;
mod rest_client;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use models::{
    InstanceDetails, InstanceState, OperationDetails, OperationError, OperationHandle,
    SnapshotDetails, SnapshotState, Tier,
};
pub use rest_client::RestFilestoreClient;

use crate::error::ServiceError;

/// The remote Filestore API surface consumed by the scheduler.
#[async_trait::async_trait]
pub trait FilestoreService: Send + Sync {
    /// Fetches an instance; `Ok(None)` when the service knows no such instance.
    async fn get_instance(&self, name: &str) -> Result<Option<InstanceDetails>, ServiceError>;

    async fn list_snapshots(&self, parent: &str) -> Result<Vec<SnapshotDetails>, ServiceError>;

    async fn create_snapshot(
        &self,
        parent: &str,
        snapshot_id: &str,
    ) -> Result<OperationHandle, ServiceError>;

    async fn delete_snapshot(&self, name: &str) -> Result<OperationHandle, ServiceError>;

    async fn get_operation(&self, name: &str) -> Result<OperationDetails, ServiceError>;
}

/// Returns the resource name, excluding the full URI.
pub fn get_resource_name(resource_url: &str) -> &str {
    resource_url.rsplit('/').next().unwrap_or(resource_url)
}
