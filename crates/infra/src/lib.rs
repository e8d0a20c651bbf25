//! Infrastructure layer: configuration, queue backends, producer and consumer.

pub mod config;
pub mod jobs;
pub mod queue;

mod integration_tests;

pub use config::{BulkConfig, ConfigError};
pub use jobs::{ConsumeReport, DispatchError, Dispatcher, ProduceError, Producer};
