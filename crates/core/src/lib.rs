//! `bulkq-core`: job model for batching task queues.
//!
//! This crate contains **pure** building blocks (no queue or IO concerns):
//! identifiers, models and their call-site params, jobs with their wire
//! encoding, the target registry, and per-target grouping of a batch.

pub mod batch;
pub mod error;
pub mod identifier;
pub mod job;
pub mod model;
pub mod registry;

pub use batch::{Group, group_by, group_by_target};
pub use error::{JobError, JobResult, RegistrationError};
pub use identifier::Identifier;
pub use job::{Args, Job, JobMeta, WireArgs, WireJob};
pub use model::{Model, ModelResult, Params};
pub use registry::{BatchTask, RegisteredTarget, Registry};
