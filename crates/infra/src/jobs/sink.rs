//! Failure reporting hook.

use std::sync::Arc;

use tracing::error;

use bulkq_core::{Job, JobError};
use bulkq_queue::QueueItem;

/// A failure the consumer isolated.
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    /// A single job kept failing after bisection narrowed its group down to it.
    Job {
        job: &'a Job,
        error: &'a anyhow::Error,
    },
    /// A queued item could not be decoded or resolved.
    Undecodable {
        item: &'a QueueItem,
        error: &'a JobError,
    },
}

/// Receives isolated failures (telemetry, alerting, exception capture).
///
/// Called from the consuming thread; with parallel groups enabled, from several
/// threads at once.
pub trait FailureSink: Send + Sync {
    fn report_failure(&self, failure: &Failure<'_>);
}

impl<S> FailureSink for Arc<S>
where
    S: FailureSink + ?Sized,
{
    fn report_failure(&self, failure: &Failure<'_>) {
        (**self).report_failure(failure)
    }
}

/// Discards every report. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl FailureSink for NoopSink {
    fn report_failure(&self, _failure: &Failure<'_>) {}
}

/// Logs every report at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn report_failure(&self, failure: &Failure<'_>) {
        match failure {
            Failure::Job { job, error } => error!(
                task = %job.target(),
                model = %job.args().model(),
                attempts = job.attempts(),
                error = %format_args!("{error:#}"),
                "batch job failed in isolation"
            ),
            Failure::Undecodable { item, error } => error!(
                item = %item,
                error = %error,
                "dropping undecodable queue item"
            ),
        }
    }
}
