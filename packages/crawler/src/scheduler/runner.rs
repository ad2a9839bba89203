//! Polling scheduler that dispatches due jobs as independent tasks.
//!
//! # Architecture
//!
//! ```text
//! Scheduler::run (1s tick)
//!     │
//!     ├─► reap finished runs
//!     ├─► tick(now): for each job whose next fire <= now
//!     │       ├─► still running? apply OverlapPolicy
//!     │       └─► spawn run (panics and errors stay inside the task)
//!     └─► shutdown: stop ticking, wait up to the grace period, abort the rest
//! ```
//!
//! A slow or hung job never delays other jobs, and at most one run per job
//! name is in flight at any time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{CrawlJob, JobDescriptor, OverlapPolicy, Trigger, TriggerError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job `{0}` is already registered")]
    DuplicateJob(String),

    #[error("job `{name}` has an invalid trigger: {source}")]
    InvalidTrigger {
        name: String,
        #[source]
        source: TriggerError,
    },
}

/// Configuration for the scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Polling quantum
    pub tick: Duration,
    /// How long running jobs may continue after shutdown is requested
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Jobs dispatched and skipped by one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: Vec<String>,
    pub skipped: Vec<String>,
}

struct ScheduledJob {
    descriptor: JobDescriptor,
    next_fire: DateTime<Utc>,
    running: Arc<AtomicBool>,
    pending: bool,
}

/// Clears the running flag even if the run is aborted.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Aborts the job task when the supervising task is aborted.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    in_flight: JoinSet<()>,
    config: SchedulerConfig,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            jobs: Vec::new(),
            in_flight: JoinSet::new(),
            config,
        }
    }

    pub fn register(&mut self, descriptor: JobDescriptor) -> Result<(), SchedulerError> {
        self.register_at(descriptor, Utc::now())
    }

    /// Register with an explicit registration instant (first fire is derived from it).
    pub fn register_at(
        &mut self,
        descriptor: JobDescriptor,
        registered_at: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        if self.jobs.iter().any(|j| j.descriptor.name == descriptor.name) {
            return Err(SchedulerError::DuplicateJob(descriptor.name));
        }
        descriptor
            .trigger
            .validate()
            .map_err(|source| SchedulerError::InvalidTrigger {
                name: descriptor.name.clone(),
                source,
            })?;

        let next_fire = descriptor.trigger.first_fire(registered_at);
        info!(
            job = %descriptor.name,
            trigger = %descriptor.trigger,
            next_fire = %next_fire,
            "job registered"
        );
        self.jobs.push(ScheduledJob {
            descriptor,
            next_fire,
            running: Arc::new(AtomicBool::new(false)),
            pending: false,
        });
        Ok(())
    }

    pub fn register_job(
        &mut self,
        trigger: Trigger,
        job: Arc<dyn CrawlJob>,
    ) -> Result<(), SchedulerError> {
        self.register(JobDescriptor::from_job(trigger, job))
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.descriptor.name.as_str()).collect()
    }

    pub fn next_fire(&self, name: &str) -> Option<DateTime<Utc>> {
        self.find(name).map(|j| j.next_fire)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.find(name)
            .is_some_and(|j| j.running.load(Ordering::SeqCst))
    }

    fn find(&self, name: &str) -> Option<&ScheduledJob> {
        self.jobs.iter().find(|j| j.descriptor.name == name)
    }

    /// Dispatch every job due at `now` and advance its trigger.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        for job in &mut self.jobs {
            let due = job.next_fire <= now;
            if !due && !job.pending {
                continue;
            }
            if due {
                job.next_fire = job.descriptor.trigger.reschedule(job.next_fire, now);
            }

            if job.running.load(Ordering::SeqCst) {
                match job.descriptor.overlap {
                    OverlapPolicy::Skip => {
                        if due {
                            warn!(
                                job = %job.descriptor.name,
                                next_fire = %job.next_fire,
                                "previous run still in progress, skipping"
                            );
                            report.skipped.push(job.descriptor.name.clone());
                        }
                    }
                    OverlapPolicy::CoalesceLatest => {
                        if due && !job.pending {
                            debug!(job = %job.descriptor.name, "previous run in progress, queued");
                        }
                        job.pending = true;
                    }
                }
                continue;
            }

            job.pending = false;
            job.running.store(true, Ordering::SeqCst);
            report.dispatched.push(job.descriptor.name.clone());
            spawn_run(
                &mut self.in_flight,
                job.descriptor.name.clone(),
                job.descriptor.action(),
                RunningGuard(job.running.clone()),
            );
        }

        report
    }

    /// Drop bookkeeping for runs that already finished.
    fn reap(&mut self) {
        while self.in_flight.try_join_next().is_some() {}
    }

    /// Wait for every dispatched run to finish.
    pub async fn wait_idle(&mut self) {
        while self.in_flight.join_next().await.is_some() {}
    }

    /// Tick until `shutdown` fires, then drain in-flight runs.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(jobs = self.jobs.len(), "scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.reap();
                    self.tick(Utc::now());
                }
            }
        }

        self.drain().await;
    }

    async fn drain(&mut self) {
        let running = self.in_flight.len();
        if running == 0 {
            info!("scheduler stopped");
            return;
        }

        info!(
            running,
            grace_secs = self.config.shutdown_grace.as_secs(),
            "scheduler stopping, waiting for running jobs"
        );
        let grace = self.config.shutdown_grace;
        if tokio::time::timeout(grace, self.wait_idle()).await.is_err() {
            warn!(
                remaining = self.in_flight.len(),
                "shutdown grace period elapsed, aborting running jobs"
            );
            self.in_flight.abort_all();
            self.wait_idle().await;
        }
        info!("scheduler stopped");
    }
}

fn spawn_run(
    in_flight: &mut JoinSet<()>,
    name: String,
    action: super::JobAction,
    guard: RunningGuard,
) {
    in_flight.spawn(async move {
        let _guard = guard;
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(job = %name, run_id = %run_id, "job started");

        let task = tokio::spawn(async move { action().await });
        let _abort = AbortOnDrop(task.abort_handle());

        match task.await {
            Ok(Ok(summary)) => info!(
                job = %name,
                run_id = %run_id,
                attempted = summary.attempted,
                delivered = summary.delivered,
                failed = summary.failed,
                skipped = summary.skipped,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job finished"
            ),
            Ok(Err(e)) => error!(
                job = %name,
                run_id = %run_id,
                error = %format!("{e:#}"),
                "job failed"
            ),
            Err(e) if e.is_panic() => error!(job = %name, run_id = %run_id, "job panicked"),
            Err(_) => warn!(job = %name, run_id = %run_id, "job cancelled"),
        }
    });
}
