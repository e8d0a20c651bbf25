//! Batch job processing: producing, consuming and failure handling.
//!
//! ## Components
//!
//! - `Producer`: enqueues jobs for registered tasks, or runs them eagerly
//! - `Dispatcher`: drains a batch, groups it by target and isolates failing jobs
//! - `FailureSink`: hook receiving every isolated failure
//! - `DeadLetterStore`: parked items that will not succeed as they are

pub mod dead_letter;
pub mod dispatcher;
pub mod producer;
pub mod sink;

pub use dead_letter::{
    DeadLetterEntry, DeadLetterError, DeadLetterId, DeadLetterStore, InMemoryDeadLetterStore,
};
pub use dispatcher::{ConsumeReport, DispatchError, Dispatcher, bulk_call};
pub use producer::{ProduceError, Producer};
pub use sink::{Failure, FailureSink, NoopSink, TracingSink};
