//! Enqueue side of a batch task.
//!
//! In eager mode `push` skips the queue and runs the target right away with a
//! single-job batch, which keeps tests and local runs free of a consumer.

use tracing::{debug, instrument};

use bulkq_core::{BatchTask, Job, JobError, Model, Params};
use bulkq_queue::{JobQueue, QueueError};

use super::dispatcher::bulk_call;
use crate::config::BulkConfig;

#[derive(Debug, thiserror::Error)]
pub enum ProduceError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Encode(#[from] JobError),
    /// Eager invocation failed; the job was not enqueued.
    #[error("eager invocation of {target} failed: {error:#}")]
    Invocation {
        target: String,
        #[source]
        error: anyhow::Error,
    },
}

/// Pushes jobs for registered tasks onto a queue.
#[derive(Debug, Clone)]
pub struct Producer<Q: JobQueue> {
    queue: Q,
    config: BulkConfig,
}

impl<Q: JobQueue> Producer<Q> {
    pub fn new(queue: Q, config: BulkConfig) -> Self {
        Self { queue, config }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn is_eager(&self) -> bool {
        self.config.eager
    }

    /// Build a job for `task` from `params` and enqueue it (or run it, when eager).
    #[instrument(skip(self, task, params), fields(task = %task.name(), eager = self.config.eager), err)]
    pub fn push<M: Model>(&self, task: &BatchTask<M>, params: Params) -> Result<(), ProduceError> {
        let job = task.job(params);

        if self.config.eager {
            return bulk_call(task.target(), std::slice::from_ref(&job)).map_err(|error| {
                ProduceError::Invocation {
                    target: task.name().to_string(),
                    error,
                }
            });
        }

        self.enqueue(&job)
    }

    /// Enqueue an already built job, ignoring eager mode.
    pub fn enqueue(&self, job: &Job) -> Result<(), ProduceError> {
        self.queue.enqueue(job.to_value()?)?;
        debug!(task = %job.target(), "job enqueued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde::Deserialize;
    use serde_json::json;

    use bulkq_core::{Registry, json_model};
    use bulkq_queue::InMemoryJobQueue;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct DataclassModel {
        name: String,
    }

    json_model!(DataclassModel, "tests.models.DataclassModel");

    fn echo_task(seen: Arc<Mutex<Vec<String>>>) -> BatchTask<DataclassModel> {
        let mut registry = Registry::new();
        registry
            .register("tests.tasks.echo", move |items: Vec<DataclassModel>| {
                let mut seen = seen.lock().unwrap();
                for item in items {
                    anyhow::ensure!(item.name != "error", "refusing {}", item.name);
                    seen.push(item.name);
                }
                Ok(())
            })
            .unwrap()
    }

    #[test]
    fn push_enqueues_the_wire_form() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let producer = Producer::new(queue.clone(), BulkConfig::default());
        let task = echo_task(Arc::default());

        producer.push(&task, Params::new().arg("walison")).unwrap();
        producer
            .push(&task, Params::new().kwarg("name", "filipe"))
            .unwrap();

        assert_eq!(
            queue.snapshot().unwrap(),
            vec![
                json!(["tests.tasks.echo", ["tests.models.DataclassModel", {"args": ["walison"], "kwargs": {}}]]),
                json!(["tests.tasks.echo", ["tests.models.DataclassModel", {"args": [], "kwargs": {"name": "filipe"}}]]),
            ]
        );
    }

    #[test]
    fn eager_push_runs_immediately_and_leaves_queue_untouched() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let producer = Producer::new(queue.clone(), BulkConfig::default().with_eager(true));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = echo_task(seen.clone());

        assert!(producer.is_eager());
        producer.push(&task, Params::new().arg("walison")).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["walison"]);
        assert_eq!(queue.count().unwrap(), 0);
    }

    #[test]
    fn eager_failures_surface_to_the_caller() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let producer = Producer::new(queue.clone(), BulkConfig::default().with_eager(true));
        let task = echo_task(Arc::default());

        let err = producer.push(&task, Params::new().arg("error")).unwrap_err();

        assert!(matches!(&err, ProduceError::Invocation { target, .. } if target == "tests.tasks.echo"));
        assert!(err.to_string().contains("refusing error"));
        assert_eq!(queue.count().unwrap(), 0);
    }
}
