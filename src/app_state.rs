use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::filestore::{FilestoreService, RestFilestoreClient};
use crate::prelude::*;
use crate::scheduler::{JobStatus, Scheduler};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastRun {
    pub status: JobStatus,
    pub finished_at: DateTime<Utc>,
}

pub struct AppState {
    pub service: Arc<dyn FilestoreService>,
    pub clock: Arc<dyn Clock>,
    pub start_time: SystemTime,
    // Serializes overlapping triggers into one cycle at a time.
    job_lock: Mutex<()>,
    last_run: RwLock<Option<LastRun>>,
}

impl AppState {
    pub fn new(service: Arc<dyn FilestoreService>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(AppState {
            service,
            clock,
            start_time: SystemTime::now(),
            job_lock: Mutex::new(()),
            last_run: RwLock::new(None),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Arc<Self>> {
        let client = RestFilestoreClient::new(&settings.filestore)?;
        info!("Using Filestore endpoint {}", settings.filestore.endpoint);
        Ok(Self::new(Arc::new(client), Arc::new(SystemClock)))
    }

    pub async fn run_job(&self, body: &[u8]) -> JobStatus {
        let _guard = self.job_lock.lock().await;
        let status = Scheduler::new(self.service.as_ref(), self.clock.as_ref())
            .run_job(body)
            .await;
        self.record_run(status);
        status
    }

    /// Runs the cycle on its own task so it completes even if the caller
    /// goes away before it finishes.
    pub async fn spawn_job(self: Arc<Self>, body: Vec<u8>) -> JobStatus {
        let handle = tokio::spawn(async move { self.run_job(&body).await });
        match handle.await {
            Ok(status) => status,
            Err(e) => {
                error!("Job cycle task failed: {}", e);
                JobStatus::DoneWithError
            }
        }
    }

    /// Waits until no cycle is running.
    pub async fn wait_idle(&self) {
        let _guard = self.job_lock.lock().await;
    }

    pub fn last_run(&self) -> Option<LastRun> {
        match self.last_run.read() {
            Ok(last) => *last,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn record_run(&self, status: JobStatus) {
        let run = LastRun {
            status,
            finished_at: self.clock.now(),
        };
        match self.last_run.write() {
            Ok(mut last) => *last = Some(run),
            Err(poisoned) => *poisoned.into_inner() = Some(run),
        }
    }
}
