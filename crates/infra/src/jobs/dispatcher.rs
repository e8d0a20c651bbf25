//! Batch consumer with divide-and-conquer failure isolation.
//!
//! ## Consume Flow
//!
//! ```text
//! dequeue(n)            atomic pop of up to n items
//!   ↓
//! decode + resolve      per item; failures are reported and parked, never fatal
//!   ↓
//! group by target       first-seen order, batch order inside each group
//!   ↓
//! bulk_call per group   one invocation with every materialized model
//!   ↓ (on error)
//! bisect                halve, re-invoke each half, recurse into failing halves
//!   ↓ (singleton)
//! report + requeue      or dead-letter once the attempt limit is reached
//!                       (or the queue refuses the job back)
//! ```
//!
//! A group that succeeds is never invoked again. For a group of `k` jobs with
//! one bad job, the target runs at most `2 * ceil(log2 k) + 1` times.
//!
//! ## Replay Contract
//!
//! Bisection re-invokes subsets of a group that already failed as a whole, so
//! targets must tolerate seeing the same job more than once (transactional or
//! idempotent writes).

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use bulkq_core::{Job, JobError, JobResult, ModelResult, RegisteredTarget, Registry, WireJob, group_by};
use bulkq_queue::{JobQueue, QueueError, QueueItem};

use super::dead_letter::{
    DeadLetterEntry, DeadLetterError, DeadLetterId, DeadLetterStore, InMemoryDeadLetterStore,
};
use super::sink::{Failure, FailureSink, NoopSink};
use crate::config::BulkConfig;

/// Invoke `target` once with every job's materialized arguments.
///
/// Materialization errors are indistinguishable from target errors.
pub fn bulk_call(target: &RegisteredTarget, jobs: &[Job]) -> ModelResult<()> {
    debug!(task = %target.name(), jobs = jobs.len(), "invoking batch target");
    target.invoke(jobs)
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The queue backend failed (dequeue, requeue or replay).
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// The dead-letter store failed.
    #[error(transparent)]
    DeadLetter(#[from] DeadLetterError),
    /// A job could not be encoded for requeueing.
    #[error(transparent)]
    Encode(#[from] JobError),
}

/// What one `consume` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumeReport {
    /// Items popped from the queue.
    pub dequeued: usize,
    /// Items that could not be decoded or resolved (reported and parked).
    pub undecodable: usize,
    /// Distinct targets in the batch.
    pub groups: usize,
    /// Jobs that were part of a successful invocation.
    pub succeeded: usize,
    /// Jobs isolated as failing and put back on the queue.
    pub requeued: usize,
    /// Jobs isolated as failing and parked, after exhausting their attempts or
    /// when the queue refused them back.
    pub dead_lettered: usize,
    /// Target invocations, including bisection retries.
    pub invocations: usize,
}

impl ConsumeReport {
    fn merge(&mut self, other: &ConsumeReport) {
        self.dequeued += other.dequeued;
        self.undecodable += other.undecodable;
        self.groups += other.groups;
        self.succeeded += other.succeeded;
        self.requeued += other.requeued;
        self.dead_lettered += other.dead_lettered;
        self.invocations += other.invocations;
    }
}

type TargetGroup = (Arc<RegisteredTarget>, Vec<Job>);

/// Per-group bookkeeping; the first backend error is kept, later ones only logged.
#[derive(Debug, Default)]
struct Outcome {
    report: ConsumeReport,
    error: Option<DispatchError>,
}

impl Outcome {
    fn record(&mut self, err: DispatchError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn absorb(&mut self, other: Outcome) {
        self.report.merge(&other.report);
        if let Some(err) = other.error {
            self.record(err);
        }
    }
}

/// Drains batches from a queue and runs them against registered targets.
pub struct Dispatcher<Q: JobQueue> {
    queue: Q,
    registry: Arc<Registry>,
    sink: Arc<dyn FailureSink>,
    dead_letters: Arc<dyn DeadLetterStore>,
    config: BulkConfig,
}

impl<Q: JobQueue> Dispatcher<Q> {
    /// Create a dispatcher with a no-op failure sink and an in-memory
    /// dead-letter store.
    pub fn new(queue: Q, registry: Arc<Registry>, config: BulkConfig) -> Self {
        Self {
            queue,
            registry,
            sink: Arc::new(NoopSink),
            dead_letters: InMemoryDeadLetterStore::arc(),
            config,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_dead_letters(mut self, store: Arc<dyn DeadLetterStore>) -> Self {
        self.dead_letters = store;
        self
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn dead_letters(&self) -> &Arc<dyn DeadLetterStore> {
        &self.dead_letters
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Drain one batch of the configured size.
    pub fn consume_batch(&self) -> Result<ConsumeReport, DispatchError> {
        self.consume(self.config.batch_size)
    }

    /// Drain up to `quantity` items and run them.
    ///
    /// Target failures never make this return an error: they are isolated,
    /// reported and requeued. Errors come from the queue or dead-letter
    /// backends only; when one happens while settling a failed job, the
    /// remaining groups are still attempted and the first error is returned at
    /// the end.
    #[instrument(skip(self), fields(queue_quantity = quantity))]
    pub fn consume(&self, quantity: usize) -> Result<ConsumeReport, DispatchError> {
        let items = self.queue.dequeue(quantity)?;
        if items.is_empty() {
            return Ok(ConsumeReport::default());
        }

        let mut outcome = Outcome::default();
        outcome.report.dequeued = items.len();

        let decoded = self.decode_batch(items, &mut outcome);
        let groups = group_targets(decoded);
        outcome.report.groups = groups.len();

        if self.config.parallel_groups && groups.len() > 1 {
            // At most one thread per core; groups beyond that wait for the next wave.
            let width = thread::available_parallelism().map_or(1, NonZeroUsize::get);
            for wave in groups.chunks(width) {
                for result in self.run_wave(wave) {
                    outcome.absorb(result);
                }
            }
        } else {
            for (target, jobs) in &groups {
                let result = self.run_group(target, jobs);
                outcome.absorb(result);
            }
        }

        let report = outcome.report;
        info!(
            dequeued = report.dequeued,
            groups = report.groups,
            succeeded = report.succeeded,
            requeued = report.requeued,
            dead_lettered = report.dead_lettered,
            undecodable = report.undecodable,
            invocations = report.invocations,
            "batch consumed"
        );

        match outcome.error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Put a parked item back on the queue with its attempt counter cleared.
    pub fn replay_dead_letter(&self, id: DeadLetterId) -> Result<(), DispatchError> {
        let entry = self.dead_letters.take(id)?;
        let item = reset_attempts(entry.item.clone());

        if let Err(err) = self.queue.enqueue(item) {
            // Keep the entry rather than lose it.
            self.dead_letters.park(entry)?;
            return Err(err.into());
        }

        info!(dead_letter_id = %id, "replayed dead letter");
        Ok(())
    }

    /// Drop a parked item for good.
    pub fn discard_dead_letter(&self, id: DeadLetterId) -> Result<DeadLetterEntry, DispatchError> {
        let entry = self.dead_letters.take(id)?;
        info!(dead_letter_id = %id, reason = %entry.reason, "discarded dead letter");
        Ok(entry)
    }

    /// Decode every item and resolve its target. Items that fail are reported
    /// and parked.
    fn decode_batch(&self, items: Vec<QueueItem>, outcome: &mut Outcome) -> Vec<(Arc<RegisteredTarget>, Job)> {
        let mut decoded = Vec::with_capacity(items.len());

        for item in items {
            match self.decode(item.clone()) {
                Ok(pair) => decoded.push(pair),
                Err(err) => {
                    outcome.report.undecodable += 1;
                    warn!(error = %err, "queue item cannot be decoded");
                    self.sink.report_failure(&Failure::Undecodable {
                        item: &item,
                        error: &err,
                    });
                    let attempts = attempts_of(&item);
                    self.park(item, err.to_string(), attempts, outcome);
                }
            }
        }

        decoded
    }

    fn decode(&self, item: QueueItem) -> JobResult<(Arc<RegisteredTarget>, Job)> {
        let wire = WireJob::from_value(item)?;
        let target = self.registry.target(&wire.target)?;
        let job = Job::deserialize(wire, &self.registry)?;
        Ok((target, job))
    }

    fn run_wave(&self, wave: &[TargetGroup]) -> Vec<Outcome> {
        thread::scope(|scope| {
            let handles: Vec<_> = wave
                .iter()
                .map(|(target, jobs)| scope.spawn(move || self.run_group(target, jobs)))
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    }

    fn run_group(&self, target: &RegisteredTarget, jobs: &[Job]) -> Outcome {
        let mut outcome = Outcome::default();

        outcome.report.invocations += 1;
        match bulk_call(target, jobs) {
            Ok(()) => outcome.report.succeeded += jobs.len(),
            Err(err) => {
                debug!(
                    task = %target.name(),
                    jobs = jobs.len(),
                    error = %format_args!("{err:#}"),
                    "batch invocation failed; bisecting"
                );
                self.bisect(target, jobs, err, &mut outcome);
            }
        }

        outcome
    }

    /// Narrow a failing slice down to the jobs that fail on their own.
    ///
    /// `error` is what invoking the whole slice returned.
    fn bisect(&self, target: &RegisteredTarget, jobs: &[Job], error: anyhow::Error, outcome: &mut Outcome) {
        if let [job] = jobs {
            self.settle_failure(job, &error, outcome);
            return;
        }

        let (left, right) = jobs.split_at(jobs.len() / 2);
        for part in [left, right] {
            outcome.report.invocations += 1;
            match bulk_call(target, part) {
                Ok(()) => outcome.report.succeeded += part.len(),
                Err(err) => self.bisect(target, part, err, outcome),
            }
        }
    }

    fn settle_failure(&self, job: &Job, error: &anyhow::Error, outcome: &mut Outcome) {
        self.sink.report_failure(&Failure::Job { job, error });

        let retry = match self.config.max_attempts {
            None => job.clone(),
            Some(_) => job.with_failed_attempt(),
        };
        let item = match retry.to_value() {
            Ok(item) => item,
            Err(err) => {
                error!(task = %job.target(), error = %err, "failed to encode job for requeue");
                outcome.record(err.into());
                return;
            }
        };

        if self.config.max_attempts.is_some_and(|limit| retry.attempts() >= limit) {
            warn!(
                task = %job.target(),
                attempts = retry.attempts(),
                "job exhausted its attempts; dead-lettering"
            );
            if self.park(item, format!("{error:#}"), retry.attempts(), outcome) {
                outcome.report.dead_lettered += 1;
            }
            return;
        }

        match self.queue.enqueue(item.clone()) {
            Ok(()) => outcome.report.requeued += 1,
            Err(err) => {
                error!(task = %job.target(), error = %err, "failed to requeue job; dead-lettering");
                let reason = format!("requeue failed ({err}) after: {error:#}");
                outcome.record(err.into());
                if self.park(item, reason, retry.attempts(), outcome) {
                    outcome.report.dead_lettered += 1;
                }
            }
        }
    }

    /// Park `item` in the dead-letter store. When the store refuses it the item
    /// goes back on the queue instead. Returns whether it was parked.
    fn park(&self, item: QueueItem, reason: String, attempts: u32, outcome: &mut Outcome) -> bool {
        match self.dead_letters.park(DeadLetterEntry::new(item.clone(), reason, attempts)) {
            Ok(id) => {
                debug!(dead_letter_id = %id, "parked dead letter");
                true
            }
            Err(err) => {
                error!(error = %err, "failed to park dead letter; returning it to the queue");
                outcome.record(err.into());
                if let Err(err) = self.queue.enqueue(item) {
                    error!(error = %err, "item was neither parked nor requeued");
                    outcome.record(err.into());
                }
                false
            }
        }
    }
}

/// Stable per-target grouping of decoded jobs.
fn group_targets(decoded: Vec<(Arc<RegisteredTarget>, Job)>) -> Vec<TargetGroup> {
    group_by(decoded, |(target, _)| target.name().clone())
        .into_iter()
        .filter_map(|(_, members)| {
            let target = members.first()?.0.clone();
            Some((target, members.into_iter().map(|(_, job)| job).collect()))
        })
        .collect()
}

impl<Q: JobQueue> std::fmt::Debug for Dispatcher<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn attempts_of(item: &QueueItem) -> u32 {
    item.get(2)
        .and_then(|meta| meta.get("attempts"))
        .and_then(|n| n.as_u64())
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

/// Strip the attempt counter from a queued job; other items pass through.
fn reset_attempts(item: QueueItem) -> QueueItem {
    match WireJob::from_value(item.clone()) {
        Ok(mut wire) if wire.meta.is_some() => {
            wire.meta = None;
            wire.to_value().unwrap_or(item)
        }
        _ => item,
    }
}
