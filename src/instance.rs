//! Retention controller for a single Filestore instance.
//!
//! A [`FilestoreInstance`] is built from one validated request entry. It
//! reads the instance and its snapshots once, then drives a single
//! create-then-maybe-delete cycle against that snapshot view.

use crate::clock::Clock;
use crate::error::InstanceError;
use crate::filestore::{
    get_resource_name, FilestoreService, InstanceDetails, InstanceState, OperationHandle,
    SnapshotDetails, SnapshotState, Tier,
};
use crate::request::InstanceSpec;
use crate::retry::RetryPolicy;
use chrono::NaiveDateTime;
use std::time::Duration;
use tracing::{error, info, warn};

/// Time pattern embedded in snapshot names, e.g. `20220303-153000`.
pub const TIME_PATTERN: &str = "%Y%m%d-%H%M%S";
/// Filestore snapshot name prefix.
pub const SNAP_PREFIX: &str = "sched-";
/// Filestore tiers supporting the snapshots feature.
pub const SUPPORTED_TIERS: [Tier; 2] = [Tier::Enterprise, Tier::HighScaleSsd];
/// Maximum number of snapshots per Filestore instance.
pub const MAX_NUMBER_OF_SNAPSHOTS: u32 = 240;
/// Maximum number of polls while waiting for an operation to finish.
pub const MONITOR_ATTEMPTS: u32 = 8;

/// A READY snapshot created under the running retention policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    /// Full resource name.
    pub name: String,
    pub taken_at: NaiveDateTime,
}

/// How a retention cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The create call returned no operation handle.
    CreateNotAcknowledged,
    /// The creation could not be confirmed; nothing was deleted.
    CreationFailed,
    /// A snapshot was created and the retention count was not reached.
    Created,
    /// A snapshot was created and a deletion of the oldest one was requested.
    Rotated { delete_acknowledged: bool },
}

/// Builds the snapshot id for a policy at the given time.
pub fn snapshot_id(retention_policy: &str, taken_at: NaiveDateTime) -> String {
    format!(
        "{}{}-{}",
        SNAP_PREFIX,
        retention_policy,
        taken_at.format(TIME_PATTERN)
    )
}

/// Filters the snapshots belonging to `retention_policy`: READY, and named
/// `sched-<policy>-<YYYYMMDD-HHMMSS>`.
pub fn scheduler_snapshots(
    snapshots: &[SnapshotDetails],
    retention_policy: &str,
) -> Vec<SchedulerSnapshot> {
    let prefix = format!("{}{}-", SNAP_PREFIX, retention_policy);
    snapshots
        .iter()
        .filter(|snapshot| snapshot.state == SnapshotState::Ready)
        .filter_map(|snapshot| {
            let stamp = get_resource_name(&snapshot.name).strip_prefix(&prefix)?;
            let taken_at = NaiveDateTime::parse_from_str(stamp, TIME_PATTERN).ok()?;
            Some(SchedulerSnapshot {
                name: snapshot.name.clone(),
                taken_at,
            })
        })
        .collect()
}

/// Returns the scheduler snapshot with the earliest embedded timestamp.
pub fn oldest_scheduler_snapshot(snapshots: &[SchedulerSnapshot]) -> Option<&SchedulerSnapshot> {
    snapshots.iter().min_by_key(|snapshot| snapshot.taken_at)
}

pub struct FilestoreInstance<'a> {
    service: &'a dyn FilestoreService,
    clock: &'a dyn Clock,
    retry: RetryPolicy,
    retention_policy: String,
    url: String,
    name: String,
    max_snapshots: u32,
    details: InstanceDetails,
    snapshots: Vec<SnapshotDetails>,
    scheduler_snapshots: Vec<SchedulerSnapshot>,
    oldest_sched_snapshot: Option<String>,
}

impl<'a> FilestoreInstance<'a> {
    /// Fetches the instance and its snapshots.
    pub async fn load(
        service: &'a dyn FilestoreService,
        clock: &'a dyn Clock,
        spec: &InstanceSpec,
        retention_policy: &str,
    ) -> Result<FilestoreInstance<'a>, InstanceError> {
        Self::load_with_retry(service, clock, RetryPolicy::default(), spec, retention_policy).await
    }

    pub async fn load_with_retry(
        service: &'a dyn FilestoreService,
        clock: &'a dyn Clock,
        retry: RetryPolicy,
        spec: &InstanceSpec,
        retention_policy: &str,
    ) -> Result<FilestoreInstance<'a>, InstanceError> {
        let url = spec.instance_path.trim_matches('/').to_string();
        let name = get_resource_name(&url).to_string();

        let details = retry
            .run(|| service.get_instance(&url))
            .await
            .flatten()
            .ok_or_else(|| InstanceError::NotFound(url.clone()))?;
        let snapshots = retry
            .run(|| service.list_snapshots(&url))
            .await
            .ok_or_else(|| InstanceError::SnapshotsUnavailable(url.clone()))?;

        let scheduler_snapshots = scheduler_snapshots(&snapshots, retention_policy);
        let oldest_sched_snapshot =
            oldest_scheduler_snapshot(&scheduler_snapshots).map(|snapshot| snapshot.name.clone());

        Ok(Self {
            service,
            clock,
            retry,
            retention_policy: retention_policy.to_string(),
            url,
            name,
            max_snapshots: spec.snapshots,
            details,
            snapshots,
            scheduler_snapshots,
            oldest_sched_snapshot,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tier(&self) -> Tier {
        self.details.tier
    }

    pub fn state(&self) -> InstanceState {
        self.details.state
    }

    pub fn snapshots(&self) -> &[SnapshotDetails] {
        &self.snapshots
    }

    pub fn scheduler_snapshots(&self) -> &[SchedulerSnapshot] {
        &self.scheduler_snapshots
    }

    pub fn oldest_sched_snapshot(&self) -> Option<&str> {
        self.oldest_sched_snapshot.as_deref()
    }

    /// Checks the instance tier supports snapshots, the instance is below the
    /// snapshot limit, and the instance is READY.
    pub fn validate_requirements(&self) -> bool {
        if !SUPPORTED_TIERS.contains(&self.tier()) {
            let tiers: Vec<String> = SUPPORTED_TIERS.iter().map(Tier::to_string).collect();
            error!("Instance {} is not of {} tier.", self.name, tiers.join(", "));
            return false;
        }
        if self.snapshots.len() >= MAX_NUMBER_OF_SNAPSHOTS as usize {
            error!(
                "Instance {} reached maximum number of {} snapshots.",
                self.name, MAX_NUMBER_OF_SNAPSHOTS
            );
            return false;
        }
        if self.state() != InstanceState::Ready {
            error!("Instance {} is not in a READY state.", self.name);
            return false;
        }
        true
    }

    /// True once the scheduler snapshots reach the retention count. Only one
    /// snapshot is ever removed per cycle, even when the count overshoots.
    pub fn deletion_needed(&self) -> bool {
        let count = self.scheduler_snapshots.len();
        let max = self.max_snapshots as usize;
        if count == max {
            info!("A single snapshot should be deleted.");
            true
        } else if count > max {
            warn!("The retention policy doesn't match the number of snapshots.");
            info!("Still going to delete a single snapshot.");
            true
        } else {
            info!("The number of snapshots does not reach the retention policy.");
            info!("No need to delete snapshots.");
            false
        }
    }

    /// Requests a new snapshot named after the policy and the current time.
    pub async fn create_snapshot(&self) -> Option<OperationHandle> {
        let snap_name = snapshot_id(&self.retention_policy, self.clock.now().naive_utc());
        let handle = self
            .retry
            .run(|| self.service.create_snapshot(&self.url, &snap_name))
            .await?;

        if handle.name.is_empty() {
            error!("Snapshot creation of {} was not acknowledged.", snap_name);
            return None;
        }
        info!(
            "Snapshot creation of {} is running as part of {}",
            snap_name,
            get_resource_name(&handle.name)
        );
        Some(handle)
    }

    /// Polls an operation until it finishes, with `2^attempt` second waits.
    pub async fn monitor_operation(&self, operation: &OperationHandle) -> bool {
        let operation_id = get_resource_name(&operation.name);
        info!("Start monitoring operation {}.", operation_id);
        info!("This might take a few minutes...");

        for attempt in 1..=MONITOR_ATTEMPTS {
            let details = match self
                .retry
                .run(|| self.service.get_operation(&operation.name))
                .await
            {
                Some(details) => details,
                None => {
                    error!("Could not receive the operation details");
                    return false;
                }
            };

            if details.done {
                if let Some(err) = details.error {
                    error!("Error {}: {}", err.code, err.message);
                    return false;
                }
                if details.response.is_some() {
                    info!(
                        "Snapshot creation as part of {} is completed successfully.",
                        operation_id
                    );
                    return true;
                }
            }
            if attempt < MONITOR_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
        }

        error!(
            "Reached a maximum number of {} monitor retries.",
            MONITOR_ATTEMPTS
        );
        false
    }

    /// Requests deletion of the oldest scheduler snapshot. Completion is not
    /// awaited.
    pub async fn delete_snapshot(&self) -> bool {
        let Some(oldest) = self.oldest_sched_snapshot.as_deref() else {
            error!("Instance {} has no scheduler snapshot to delete.", self.name);
            return false;
        };

        match self
            .retry
            .run(|| self.service.delete_snapshot(oldest))
            .await
        {
            Some(handle) if !handle.name.is_empty() => {
                info!(
                    "Snapshot deletion of {} is running as part of {}.",
                    get_resource_name(oldest),
                    get_resource_name(&handle.name)
                );
                true
            }
            _ => {
                error!("Snapshot deletion of {} was not acknowledged.", get_resource_name(oldest));
                false
            }
        }
    }

    /// Creates a new snapshot and, once it is confirmed, deletes the oldest
    /// one if the retention count is reached.
    pub async fn increment_retention(&self) -> CycleOutcome {
        let Some(operation) = self.create_snapshot().await else {
            return CycleOutcome::CreateNotAcknowledged;
        };

        if !self.monitor_operation(&operation).await {
            error!("Snapshot creation failed. Not going to delete one either.");
            return CycleOutcome::CreationFailed;
        }

        info!(
            "{} {} scheduler snapshots are found.",
            self.scheduler_snapshots.len(),
            self.retention_policy
        );
        info!(
            "The retention policy is set to {} snapshots.",
            self.max_snapshots
        );
        if self.deletion_needed() {
            CycleOutcome::Rotated {
                delete_acknowledged: self.delete_snapshot().await,
            }
        } else {
            CycleOutcome::Created
        }
    }
}
