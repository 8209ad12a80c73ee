use chrono::{NaiveDate, NaiveDateTime};
use filestore_snapshot_scheduler::filestore::test_utils::{FakeFilestore, ManualClock};
use filestore_snapshot_scheduler::filestore::{InstanceState, SnapshotState, Tier};
use filestore_snapshot_scheduler::instance::{CycleOutcome, FilestoreInstance};
use filestore_snapshot_scheduler::request::InstanceSpec;
use filestore_snapshot_scheduler::scheduler::{JobStatus, Scheduler};
use serde_json::json;

const FILER_A: &str = "projects/p/locations/us-central1/instances/filer-a";
const FILER_B: &str = "projects/p/locations/us-central1/instances/filer-b";

fn noon(month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, month, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn spec(path: &str, snapshots: u32) -> InstanceSpec {
    InstanceSpec {
        instance_path: path.to_string(),
        snapshots,
    }
}

fn scheduler_ids(fake: &FakeFilestore, path: &str, policy: &str) -> Vec<String> {
    let prefix = format!("sched-{}-", policy);
    fake.snapshot_ids(path)
        .into_iter()
        .filter(|id| id.starts_with(&prefix))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn creates_then_deletes_oldest_when_retention_reached() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.add_scheduler_snapshots(FILER_A, "daily", 3);
    let clock = ManualClock::new(noon(2, 1));

    let filer = FilestoreInstance::load(&fake, &clock, &spec(FILER_A, 3), "daily")
        .await
        .unwrap();
    let outcome = filer.increment_retention().await;

    assert_eq!(
        outcome,
        CycleOutcome::Rotated {
            delete_acknowledged: true
        }
    );
    assert_eq!(
        fake.call_order(),
        vec![
            "get_instance",
            "list_snapshots",
            "create_snapshot",
            "get_operation",
            "delete_snapshot"
        ]
    );
    assert_eq!(
        scheduler_ids(&fake, FILER_A, "daily"),
        vec![
            "sched-daily-20220102-000000",
            "sched-daily-20220103-000000",
            "sched-daily-20220201-120000",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn never_deletes_when_create_returns_no_handle() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.add_scheduler_snapshots(FILER_A, "daily", 5);
    fake.return_empty_create_handles();
    let clock = ManualClock::new(noon(2, 1));

    let filer = FilestoreInstance::load(&fake, &clock, &spec(FILER_A, 3), "daily")
        .await
        .unwrap();

    assert_eq!(
        filer.increment_retention().await,
        CycleOutcome::CreateNotAcknowledged
    );
    assert_eq!(fake.count_calls("get_operation"), 0);
    assert_eq!(fake.count_calls("delete_snapshot"), 0);
}

#[tokio::test(start_paused = true)]
async fn never_deletes_when_create_call_keeps_failing() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.add_scheduler_snapshots(FILER_A, "daily", 5);
    fake.fail_next("create_snapshot", 3);
    let clock = ManualClock::new(noon(2, 1));

    let filer = FilestoreInstance::load(&fake, &clock, &spec(FILER_A, 3), "daily")
        .await
        .unwrap();

    assert_eq!(
        filer.increment_retention().await,
        CycleOutcome::CreateNotAcknowledged
    );
    assert_eq!(fake.count_calls("create_snapshot"), 3);
    assert_eq!(fake.count_calls("delete_snapshot"), 0);
}

#[tokio::test(start_paused = true)]
async fn never_deletes_when_monitoring_fails() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.add_scheduler_snapshots(FILER_A, "daily", 5);
    fake.fail_operations(13, "internal error");
    let clock = ManualClock::new(noon(2, 1));

    let filer = FilestoreInstance::load(&fake, &clock, &spec(FILER_A, 3), "daily")
        .await
        .unwrap();

    assert_eq!(
        filer.increment_retention().await,
        CycleOutcome::CreationFailed
    );
    assert_eq!(
        fake.call_order(),
        vec![
            "get_instance",
            "list_snapshots",
            "create_snapshot",
            "get_operation"
        ]
    );
    assert_eq!(scheduler_ids(&fake, FILER_A, "daily").len(), 5);
}

#[tokio::test(start_paused = true)]
async fn never_deletes_when_operation_never_finishes() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.add_scheduler_snapshots(FILER_A, "daily", 5);
    fake.never_finish_operations();
    let clock = ManualClock::new(noon(2, 1));

    let filer = FilestoreInstance::load(&fake, &clock, &spec(FILER_A, 3), "daily")
        .await
        .unwrap();

    assert_eq!(
        filer.increment_retention().await,
        CycleOutcome::CreationFailed
    );
    assert_eq!(fake.count_calls("delete_snapshot"), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_poll_failures_are_retried() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.fail_next("get_operation", 2);
    let clock = ManualClock::new(noon(2, 1));

    let filer = FilestoreInstance::load(&fake, &clock, &spec(FILER_A, 3), "daily")
        .await
        .unwrap();

    assert_eq!(filer.increment_retention().await, CycleOutcome::Created);
    assert_eq!(fake.count_calls("get_operation"), 3);
}

#[tokio::test(start_paused = true)]
async fn overshoot_deletes_a_single_snapshot_per_cycle() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.add_scheduler_snapshots(FILER_A, "daily", 6);
    let clock = ManualClock::new(noon(2, 1));

    let filer = FilestoreInstance::load(&fake, &clock, &spec(FILER_A, 2), "daily")
        .await
        .unwrap();
    filer.increment_retention().await;

    assert_eq!(fake.count_calls("delete_snapshot"), 1);
    assert_eq!(scheduler_ids(&fake, FILER_A, "daily").len(), 6);
    assert!(!fake
        .snapshot_ids(FILER_A)
        .contains(&"sched-daily-20220101-000000".to_string()));
}

#[tokio::test(start_paused = true)]
async fn repeated_cycles_converge_without_going_below_target() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    let clock = ManualClock::new(noon(2, 1));
    let target = 3;

    for _ in 0..6 {
        let filer = FilestoreInstance::load(&fake, &clock, &spec(FILER_A, target), "daily")
            .await
            .unwrap();
        assert!(filer.validate_requirements());
        filer.increment_retention().await;

        let retained = scheduler_ids(&fake, FILER_A, "daily").len();
        assert!(retained <= target as usize);
        assert!(retained >= 1);
        clock.advance(chrono::Duration::days(1));
    }

    assert_eq!(
        scheduler_ids(&fake, FILER_A, "daily"),
        vec![
            "sched-daily-20220204-120000",
            "sched-daily-20220205-120000",
            "sched-daily-20220206-120000",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn foreign_snapshots_are_never_deleted() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.add_snapshot(FILER_A, "manual-20200101-000000", SnapshotState::Ready);
    fake.add_scheduler_snapshots(FILER_A, "weekly", 4);
    fake.add_scheduler_snapshots(FILER_A, "daily", 1);
    let clock = ManualClock::new(noon(2, 1));

    let filer = FilestoreInstance::load(&fake, &clock, &spec(FILER_A, 1), "daily")
        .await
        .unwrap();
    assert_eq!(filer.scheduler_snapshots().len(), 1);
    filer.increment_retention().await;

    assert!(fake
        .snapshot_ids(FILER_A)
        .contains(&"manual-20200101-000000".to_string()));
    assert_eq!(scheduler_ids(&fake, FILER_A, "weekly").len(), 4);
    assert_eq!(
        scheduler_ids(&fake, FILER_A, "daily"),
        vec!["sched-daily-20220201-120000"]
    );
}

#[tokio::test(start_paused = true)]
async fn unsupported_tier_never_reaches_create_or_delete() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::BasicSsd, InstanceState::Ready);
    fake.add_scheduler_snapshots(FILER_A, "daily", 10);
    let clock = ManualClock::new(noon(2, 1));
    let body = json!({
        "retention_policy": "daily",
        "instances": [{ "instance_path": FILER_A, "snapshots": 2 }]
    });

    let status = Scheduler::new(&fake, &clock)
        .run_job(body.to_string().as_bytes())
        .await;

    assert_eq!(status, JobStatus::Done);
    assert_eq!(fake.call_order(), vec!["get_instance", "list_snapshots"]);
}

#[tokio::test(start_paused = true)]
async fn too_many_instances_rejects_the_whole_batch() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    let clock = ManualClock::new(noon(2, 1));
    let instances: Vec<_> = (0..9)
        .map(|_| json!({ "instance_path": FILER_A, "snapshots": 2 }))
        .collect();
    let body = json!({ "retention_policy": "daily", "instances": instances });

    let status = Scheduler::new(&fake, &clock)
        .run_job(body.to_string().as_bytes())
        .await;

    assert_eq!(status, JobStatus::DoneWithError);
    assert!(fake.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn long_policy_name_rejects_the_whole_batch() {
    let fake = FakeFilestore::new();
    let clock = ManualClock::new(noon(2, 1));
    let body = json!({
        "retention_policy": "p".repeat(51),
        "instances": [{ "instance_path": FILER_A, "snapshots": 2 }]
    });

    let status = Scheduler::new(&fake, &clock)
        .run_job(body.to_string().as_bytes())
        .await;

    assert_eq!(status, JobStatus::DoneWithError);
    assert!(fake.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn invalid_entry_is_skipped_and_the_rest_processed() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.add_instance(FILER_B, Tier::HighScaleSsd, InstanceState::Ready);
    let clock = ManualClock::new(noon(2, 1));
    let body = json!({
        "retention_policy": "daily",
        "instances": [
            { "instance_path": FILER_A, "snapshots": 0 },
            { "instance_path": FILER_B, "snapshots": 2 }
        ]
    });

    let status = Scheduler::new(&fake, &clock)
        .run_job(body.to_string().as_bytes())
        .await;

    assert_eq!(status, JobStatus::Done);
    assert!(fake.calls().iter().all(|call| !call.target.contains("filer-a")));
    assert_eq!(
        scheduler_ids(&fake, FILER_B, "daily"),
        vec!["sched-daily-20220201-120000"]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_instance_does_not_stop_the_batch() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_B, Tier::Enterprise, InstanceState::Ready);
    let clock = ManualClock::new(noon(2, 1));
    let body = json!({
        "retention_policy": "daily",
        "instances": [
            { "instance_path": FILER_A, "snapshots": 2 },
            { "instance_path": format!("/{}/", FILER_B), "snapshots": 2 }
        ]
    });

    let status = Scheduler::new(&fake, &clock)
        .run_job(body.to_string().as_bytes())
        .await;

    assert_eq!(status, JobStatus::Done);
    assert_eq!(fake.count_calls("create_snapshot"), 1);
    assert_eq!(scheduler_ids(&fake, FILER_B, "daily").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_instance_lookup_skips_to_next_instance() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.add_instance(FILER_B, Tier::Enterprise, InstanceState::Ready);
    fake.fail_next("get_instance", 3);
    let clock = ManualClock::new(noon(2, 1));
    let body = json!({
        "retention_policy": "daily",
        "instances": [
            { "instance_path": FILER_A, "snapshots": 2 },
            { "instance_path": FILER_B, "snapshots": 2 }
        ]
    });

    let status = Scheduler::new(&fake, &clock)
        .run_job(body.to_string().as_bytes())
        .await;

    assert_eq!(status, JobStatus::Done);
    assert!(scheduler_ids(&fake, FILER_A, "daily").is_empty());
    assert_eq!(
        scheduler_ids(&fake, FILER_B, "daily"),
        vec!["sched-daily-20220201-120000"]
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_snapshot_listing_skips_instance_without_create() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.add_instance(FILER_B, Tier::Enterprise, InstanceState::Ready);
    fake.fail_next("list_snapshots", 3);
    let clock = ManualClock::new(noon(2, 1));
    let body = json!({
        "retention_policy": "daily",
        "instances": [
            { "instance_path": FILER_A, "snapshots": 2 },
            { "instance_path": FILER_B, "snapshots": 2 }
        ]
    });

    let status = Scheduler::new(&fake, &clock)
        .run_job(body.to_string().as_bytes())
        .await;

    assert_eq!(status, JobStatus::Done);
    let creates: Vec<_> = fake
        .calls()
        .into_iter()
        .filter(|call| call.method == "create_snapshot")
        .collect();
    assert_eq!(creates.len(), 1);
    assert!(scheduler_ids(&fake, FILER_A, "daily").is_empty());
    assert_eq!(scheduler_ids(&fake, FILER_B, "daily").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn never_deletes_when_operation_details_are_unavailable() {
    let fake = FakeFilestore::new();
    fake.add_instance(FILER_A, Tier::Enterprise, InstanceState::Ready);
    fake.add_scheduler_snapshots(FILER_A, "daily", 5);
    fake.fail_next("get_operation", 3);
    let clock = ManualClock::new(noon(2, 1));

    let filer = FilestoreInstance::load(&fake, &clock, &spec(FILER_A, 3), "daily")
        .await
        .unwrap();

    assert_eq!(
        filer.increment_retention().await,
        CycleOutcome::CreationFailed
    );
    assert_eq!(fake.count_calls("get_operation"), 3);
    assert_eq!(fake.count_calls("delete_snapshot"), 0);
}
