//! In-memory stand-ins for the Filestore API and the wall clock.

use super::{
    FilestoreService, InstanceDetails, InstanceState, OperationDetails, OperationError,
    OperationHandle, SnapshotDetails, SnapshotState, Tier,
};
use crate::clock::Clock;
use crate::error::ServiceError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// How operations report when polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationMode {
    Succeed,
    Fail { code: i32, message: String },
    NeverFinish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub method: &'static str,
    pub target: String,
}

#[derive(Debug, Clone)]
struct PendingCreate {
    parent: String,
    snapshot_id: String,
}

#[derive(Debug)]
struct FakeState {
    instances: HashMap<String, InstanceDetails>,
    snapshots: HashMap<String, Vec<SnapshotDetails>>,
    operations: HashMap<String, PendingCreate>,
    operation_mode: OperationMode,
    empty_create_handles: bool,
    empty_results: u32,
    transient_failures: HashMap<&'static str, u32>,
    next_operation: u64,
    calls: Vec<Call>,
}

/// A Filestore double that records every call and reflects committed
/// creates and deletes in later listings.
#[derive(Debug)]
pub struct FakeFilestore {
    state: Mutex<FakeState>,
}

impl Default for FakeFilestore {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFilestore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                instances: HashMap::new(),
                snapshots: HashMap::new(),
                operations: HashMap::new(),
                operation_mode: OperationMode::Succeed,
                empty_create_handles: false,
                empty_results: 0,
                transient_failures: HashMap::new(),
                next_operation: 1,
                calls: Vec::new(),
            }),
        }
    }

    pub fn add_instance(&self, path: &str, tier: Tier, state: InstanceState) {
        let mut s = self.state.lock().unwrap();
        s.instances.insert(
            path.to_string(),
            InstanceDetails {
                name: path.to_string(),
                tier,
                state,
            },
        );
        s.snapshots.entry(path.to_string()).or_default();
    }

    pub fn add_snapshot(&self, path: &str, snapshot_id: &str, state: SnapshotState) {
        let mut s = self.state.lock().unwrap();
        s.snapshots
            .entry(path.to_string())
            .or_default()
            .push(SnapshotDetails {
                name: format!("{}/snapshots/{}", path, snapshot_id),
                state,
                create_time: None,
            });
    }

    /// Adds `count` READY snapshots of `policy`, one per day from 2022-01-01.
    pub fn add_scheduler_snapshots(&self, path: &str, policy: &str, count: u32) {
        let base = NaiveDate::from_ymd_opt(2022, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        for day in 0..count {
            let taken_at = base + chrono::Duration::days(i64::from(day));
            let id = crate::instance::snapshot_id(policy, taken_at);
            self.add_snapshot(path, &id, SnapshotState::Ready);
        }
    }

    pub fn set_operation_mode(&self, mode: OperationMode) {
        self.state.lock().unwrap().operation_mode = mode;
    }

    /// Makes the next `times` polls report `done` with neither a response
    /// nor an error.
    pub fn return_empty_results(&self, times: u32) {
        self.state.lock().unwrap().empty_results = times;
    }

    pub fn fail_operations(&self, code: i32, message: &str) {
        self.set_operation_mode(OperationMode::Fail {
            code,
            message: message.to_string(),
        });
    }

    pub fn never_finish_operations(&self) {
        self.set_operation_mode(OperationMode::NeverFinish);
    }

    /// Makes create calls succeed with an empty operation name.
    pub fn return_empty_create_handles(&self) {
        self.state.lock().unwrap().empty_create_handles = true;
    }

    /// Makes the next `times` calls to `method` fail with a 503.
    pub fn fail_next(&self, method: &'static str, times: u32) {
        self.state
            .lock()
            .unwrap()
            .transient_failures
            .insert(method, times);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_order(&self) -> Vec<&'static str> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    pub fn count_calls(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }

    /// Snapshot ids currently committed on the instance.
    pub fn snapshot_ids(&self, path: &str) -> Vec<String> {
        let s = self.state.lock().unwrap();
        s.snapshots
            .get(path)
            .map(|list| {
                list.iter()
                    .map(|snap| super::get_resource_name(&snap.name).to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record(&self, method: &'static str, target: &str) -> Result<(), ServiceError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call {
            method,
            target: target.to_string(),
        });
        if let Some(remaining) = s.transient_failures.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ServiceError::Api {
                    status: 503,
                    reason: "Service Unavailable".to_string(),
                });
            }
        }
        Ok(())
    }

    fn next_operation_name(s: &mut FakeState, parent: &str) -> String {
        let id = s.next_operation;
        s.next_operation += 1;
        let location = parent.split("/instances/").next().unwrap_or(parent);
        format!("{}/operations/operation-{}", location, id)
    }
}

#[async_trait::async_trait]
impl FilestoreService for FakeFilestore {
    async fn get_instance(&self, name: &str) -> Result<Option<InstanceDetails>, ServiceError> {
        self.record("get_instance", name)?;
        Ok(self.state.lock().unwrap().instances.get(name).cloned())
    }

    async fn list_snapshots(&self, parent: &str) -> Result<Vec<SnapshotDetails>, ServiceError> {
        self.record("list_snapshots", parent)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .snapshots
            .get(parent)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_snapshot(
        &self,
        parent: &str,
        snapshot_id: &str,
    ) -> Result<OperationHandle, ServiceError> {
        self.record("create_snapshot", snapshot_id)?;
        let mut s = self.state.lock().unwrap();
        if s.empty_create_handles {
            return Ok(OperationHandle::default());
        }
        let name = Self::next_operation_name(&mut s, parent);
        s.operations.insert(
            name.clone(),
            PendingCreate {
                parent: parent.to_string(),
                snapshot_id: snapshot_id.to_string(),
            },
        );
        Ok(OperationHandle { name })
    }

    async fn delete_snapshot(&self, name: &str) -> Result<OperationHandle, ServiceError> {
        self.record("delete_snapshot", name)?;
        let mut s = self.state.lock().unwrap();
        let parent = name.split("/snapshots/").next().unwrap_or(name).to_string();
        if let Some(list) = s.snapshots.get_mut(&parent) {
            list.retain(|snap| snap.name != name);
        }
        let op = Self::next_operation_name(&mut s, &parent);
        Ok(OperationHandle { name: op })
    }

    async fn get_operation(&self, name: &str) -> Result<OperationDetails, ServiceError> {
        self.record("get_operation", name)?;
        let mut s = self.state.lock().unwrap();
        if s.empty_results > 0 {
            s.empty_results -= 1;
            return Ok(OperationDetails {
                name: name.to_string(),
                done: true,
                ..Default::default()
            });
        }
        match s.operation_mode.clone() {
            OperationMode::NeverFinish => Ok(OperationDetails {
                name: name.to_string(),
                done: false,
                ..Default::default()
            }),
            OperationMode::Fail { code, message } => Ok(OperationDetails {
                name: name.to_string(),
                done: true,
                response: None,
                error: Some(OperationError { code, message }),
            }),
            OperationMode::Succeed => {
                if let Some(pending) = s.operations.remove(name) {
                    let snapshot_name =
                        format!("{}/snapshots/{}", pending.parent, pending.snapshot_id);
                    s.snapshots
                        .entry(pending.parent)
                        .or_default()
                        .push(SnapshotDetails {
                            name: snapshot_name,
                            state: SnapshotState::Ready,
                            create_time: None,
                        });
                }
                Ok(OperationDetails {
                    name: name.to_string(),
                    done: true,
                    response: Some(serde_json::json!({})),
                    error: None,
                })
            }
        }
    }
}

/// A clock that stays put until advanced.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start.and_utc()),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
