//! Queue port: the FIFO contract job backends implement (mechanics only).
//!
//! Backends store opaque JSON values; the job wire format lives in
//! `bulkq-core`. Infrastructure-backed implementations (e.g. Redis) live in
//! `bulkq-infra`.

pub mod in_memory;
pub mod port;

pub use in_memory::InMemoryJobQueue;
pub use port::{JobQueue, QueueError, QueueItem};
