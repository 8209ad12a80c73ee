use crate::clock::Clock;
use crate::filestore::FilestoreService;
use crate::instance::FilestoreInstance;
use crate::request::{parse_request, RetentionRequest};
use crate::retry::RetryPolicy;
use std::fmt;
use tracing::{error, info, info_span, Instrument};

/// The only two answers a job cycle gives its trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Done,
    DoneWithError,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Done => "done",
            JobStatus::DoneWithError => "done with error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Scheduler<'a> {
    service: &'a dyn FilestoreService,
    clock: &'a dyn Clock,
    retry: RetryPolicy,
}

impl<'a> Scheduler<'a> {
    pub fn new(service: &'a dyn FilestoreService, clock: &'a dyn Clock) -> Self {
        Self {
            service,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs one job cycle for a raw request body. Never fails: problems are
    /// logged and folded into the returned status.
    pub async fn run_job(&self, body: &[u8]) -> JobStatus {
        let request = match parse_request(body) {
            Ok(request) => request,
            Err(_) => return JobStatus::DoneWithError,
        };

        info!("Start job cycle");
        self.run(&request).await;
        info!("Finish job cycle");
        JobStatus::Done
    }

    /// Processes each validated instance in order. A failure on one instance
    /// never stops the others.
    pub async fn run(&self, request: &RetentionRequest) {
        for spec in &request.instances {
            let span = info_span!("instance", path = %spec.instance_path);
            async {
                info!("Start executing function on instance {}.", spec.instance_path);
                let filer = match FilestoreInstance::load_with_retry(
                    self.service,
                    self.clock,
                    self.retry,
                    spec,
                    &request.retention_policy,
                )
                .await
                {
                    Ok(filer) => filer,
                    Err(e) => {
                        error!("{}", e);
                        info!(
                            "Finish executing function with error on instance {}.",
                            spec.instance_path
                        );
                        return;
                    }
                };

                if filer.validate_requirements() {
                    let outcome = filer.increment_retention().await;
                    info!(?outcome, "Retention cycle finished for {}", filer.name());
                }
                info!("Finish executing function on instance {}.", spec.instance_path);
            }
            .instrument(span)
            .await;
        }
    }
}
