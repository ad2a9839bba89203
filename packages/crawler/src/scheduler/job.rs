use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use super::Trigger;
use crate::sink::DeliveryReport;

/// What to do when a job comes due while its previous run is still going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Drop the fire; the next one is computed as usual.
    #[default]
    Skip,
    /// Remember one pending run and start it as soon as the current one ends.
    CoalesceLatest,
}

/// Counts logged at the end of every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobRunSummary {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl From<&DeliveryReport> for JobRunSummary {
    fn from(report: &DeliveryReport) -> Self {
        Self {
            attempted: report.attempted(),
            delivered: report.delivered(),
            failed: report.failed(),
            skipped: report.skipped(),
        }
    }
}

/// A named unit of scheduled work.
#[async_trait]
pub trait CrawlJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<JobRunSummary>;
}

pub type JobFuture = BoxFuture<'static, Result<JobRunSummary>>;
pub type JobAction = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Registered once at startup and never mutated afterwards.
#[derive(Clone)]
pub struct JobDescriptor {
    pub name: String,
    pub trigger: Trigger,
    pub overlap: OverlapPolicy,
    action: JobAction,
}

impl JobDescriptor {
    pub fn new<F, Fut>(name: impl Into<String>, trigger: Trigger, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobRunSummary>> + Send + 'static,
    {
        Self {
            name: name.into(),
            trigger,
            overlap: OverlapPolicy::default(),
            action: Arc::new(move || action().boxed()),
        }
    }

    pub fn from_job(trigger: Trigger, job: Arc<dyn CrawlJob>) -> Self {
        let name = job.name().to_string();
        Self::new(name, trigger, move || {
            let job = job.clone();
            async move { job.run().await }
        })
    }

    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    pub(crate) fn action(&self) -> JobAction {
        self.action.clone()
    }
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}
