//! In-process job scheduling.

pub mod job;
pub mod runner;
pub mod trigger;

pub use job::{CrawlJob, JobAction, JobDescriptor, JobFuture, JobRunSummary, OverlapPolicy};
pub use runner::{Scheduler, SchedulerConfig, SchedulerError, TickReport};
pub use trigger::{parse_time_of_day, parse_utc_offset, Trigger, TriggerError};
