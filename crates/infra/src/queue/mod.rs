//! Queue backends that need infrastructure (the in-memory queue lives in
//! `bulkq-queue`).

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "redis")]
pub use self::redis::RedisJobQueue;
