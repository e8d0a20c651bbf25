//! Integration tests for the full batching pipeline.
//!
//! Tests: Producer → JobQueue → Dispatcher → batch target
//!
//! Verifies:
//! - Jobs pushed by one registry are consumed by another built the same way
//! - A failing job is isolated and requeued while the rest of the batch lands
//! - Consumers sharing a queue never process the same job twice

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use serde::{Deserialize, Serialize};

    use bulkq_core::{BatchTask, Params, Registry, json_model};
    use bulkq_queue::{InMemoryJobQueue, JobQueue};

    use crate::config::BulkConfig;
    use crate::jobs::{Dispatcher, Producer, TracingSink};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Invoice {
        number: u32,
        customer: String,
    }

    json_model!(Invoice, "billing.models.Invoice");

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Reminder {
        #[allow(dead_code)]
        customer: String,
    }

    json_model!(Reminder, "billing.models.Reminder");

    type Ledger = Arc<Mutex<Vec<u32>>>;

    /// Build the registry every process shares. Invoice number 0 is rejected.
    fn registry(ledger: Ledger) -> (Registry, BatchTask<Invoice>, BatchTask<Reminder>) {
        let mut registry = Registry::new();
        let send = registry
            .register("billing.tasks.send_invoices", move |invoices: Vec<Invoice>| {
                anyhow::ensure!(invoices.iter().all(|i| i.number != 0), "invoice without number");
                ledger.lock().unwrap().extend(invoices.iter().map(|i| i.number));
                Ok(())
            })
            .unwrap();
        let remind = registry
            .register("billing.tasks.remind", |_: Vec<Reminder>| Ok(()))
            .unwrap();
        (registry, send, remind)
    }

    fn invoice(number: u32) -> Params {
        Params::from_kwargs(&Invoice {
            number,
            customer: format!("customer-{number}"),
        })
        .unwrap()
    }

    #[test]
    fn producer_to_dispatcher_round_trip() {
        bulkq_observability::init();
        let queue = Arc::new(InMemoryJobQueue::new());

        // Producer side.
        let (_, send, remind) = registry(Arc::default());
        let producer = Producer::new(queue.clone(), BulkConfig::default());
        for number in 1..=3 {
            producer.push(&send, invoice(number)).unwrap();
        }
        producer
            .push(&remind, Params::new().kwarg("customer", "walison"))
            .unwrap();

        // Consumer side, with its own registry instance.
        let ledger: Ledger = Arc::default();
        let (consumer_registry, _, _) = registry(ledger.clone());
        let dispatcher = Dispatcher::new(queue.clone(), Arc::new(consumer_registry), BulkConfig::default())
            .with_sink(Arc::new(TracingSink));

        let report = dispatcher.consume_batch().unwrap();

        assert_eq!(report.dequeued, 4);
        assert_eq!(report.groups, 2);
        assert_eq!(report.invocations, 2);
        assert_eq!(*ledger.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(queue.count().unwrap(), 0);
    }

    #[test]
    fn bad_job_is_requeued_and_rest_of_batch_lands() {
        let ledger: Ledger = Arc::default();
        let (registry, send, _) = registry(ledger.clone());
        let queue = Arc::new(InMemoryJobQueue::new());
        let producer = Producer::new(queue.clone(), BulkConfig::default());

        for number in [1, 2, 0, 3, 4, 5, 6, 7] {
            producer.push(&send, invoice(number)).unwrap();
        }

        let dispatcher = Dispatcher::new(queue.clone(), Arc::new(registry), BulkConfig::default());
        let report = dispatcher.consume(500).unwrap();

        assert_eq!(report.succeeded, 7);
        assert_eq!(report.requeued, 1);
        // One full call plus two per level of an 8-job bisection.
        assert!(report.invocations <= 2 * 3 + 1);
        assert_eq!(queue.count().unwrap(), 1);

        let mut landed = ledger.lock().unwrap().clone();
        landed.sort_unstable();
        assert_eq!(landed, vec![1, 2, 3, 4, 5, 6, 7]);

        // The requeued job keeps failing on its own without touching the ledger.
        let again = dispatcher.consume(500).unwrap();
        assert_eq!((again.invocations, again.requeued), (1, 1));
        assert_eq!(ledger.lock().unwrap().len(), 7);
    }

    #[test]
    fn eager_producer_never_touches_the_queue() {
        let ledger: Ledger = Arc::default();
        let (_, send, _) = registry(ledger.clone());
        let queue = Arc::new(InMemoryJobQueue::new());
        let producer = Producer::new(queue.clone(), BulkConfig::default().with_eager(true));

        producer.push(&send, invoice(9)).unwrap();
        assert!(producer.push(&send, invoice(0)).is_err());

        assert_eq!(*ledger.lock().unwrap(), vec![9]);
        assert_eq!(queue.count().unwrap(), 0);
    }

    #[test]
    fn concurrent_consumers_process_each_job_once() {
        let ledger: Ledger = Arc::default();
        let (registry, send, _) = registry(ledger.clone());
        let registry = Arc::new(registry);
        let queue = Arc::new(InMemoryJobQueue::new());
        let producer = Producer::new(queue.clone(), BulkConfig::default());

        for number in 1..=400 {
            producer.push(&send, invoice(number)).unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dispatcher = Dispatcher::new(
                    queue.clone(),
                    registry.clone(),
                    BulkConfig::default().with_batch_size(25),
                );
                thread::spawn(move || {
                    while dispatcher.consume_batch().unwrap().dequeued > 0 {}
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let landed = ledger.lock().unwrap();
        assert_eq!(landed.len(), 400);
        assert_eq!(landed.iter().collect::<HashSet<_>>().len(), 400);
        assert_eq!(queue.count().unwrap(), 0);
    }
}
