//! Jobs and their wire encoding.
//!
//! A queued job is the JSON form of the tuple
//!
//! ```text
//! [target_identifier, [model_identifier, {"args": [...], "kwargs": {...}}]]
//! ```
//!
//! A job requeued under an attempt limit carries a third element,
//! `{"attempts": n}`. Decoders accept both shapes; fresh jobs always use the
//! two-element form so existing queued data stays interchangeable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JobError, JobResult};
use crate::identifier::Identifier;
use crate::model::{Model, ModelResult, Params};
use crate::registry::Registry;

/// Wire form of [`Args`]: `(model_identifier, params)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireArgs(pub String, pub Params);

/// Bookkeeping appended to requeued jobs when attempts are being counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMeta {
    pub attempts: u32,
}

/// Wire form of [`Job`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireRepr", into = "WireRepr")]
pub struct WireJob {
    pub target: String,
    pub args: WireArgs,
    pub meta: Option<JobMeta>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireRepr {
    Plain(String, WireArgs),
    Tracked(String, WireArgs, JobMeta),
}

impl From<WireRepr> for WireJob {
    fn from(value: WireRepr) -> Self {
        match value {
            WireRepr::Plain(target, args) => Self {
                target,
                args,
                meta: None,
            },
            WireRepr::Tracked(target, args, meta) => Self {
                target,
                args,
                meta: Some(meta),
            },
        }
    }
}

impl From<WireJob> for WireRepr {
    fn from(value: WireJob) -> Self {
        match value.meta {
            None => WireRepr::Plain(value.target, value.args),
            Some(meta) => WireRepr::Tracked(value.target, value.args, meta),
        }
    }
}

impl WireJob {
    /// Encode as the JSON value stored in a queue.
    pub fn to_value(&self) -> JobResult<Value> {
        serde_json::to_value(self).map_err(|e| JobError::malformed(e.to_string()))
    }

    /// Decode a queued JSON value.
    pub fn from_value(value: Value) -> JobResult<Self> {
        serde_json::from_value(value).map_err(|e| JobError::malformed(e.to_string()))
    }

    pub fn attempts(&self) -> u32 {
        self.meta.map(|m| m.attempts).unwrap_or(0)
    }
}

/// Arguments of one job: the model to build plus the call-site params.
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    model: Identifier,
    params: Params,
}

impl Args {
    /// Arguments materializing into `M`.
    pub fn new<M: Model>(params: Params) -> JobResult<Self> {
        Ok(Self {
            model: Identifier::new(M::NAME)?,
            params,
        })
    }

    pub fn with_model(model: Identifier, params: Params) -> Self {
        Self { model, params }
    }

    pub fn model(&self) -> &Identifier {
        &self.model
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn serialize(&self) -> WireArgs {
        WireArgs(self.model.to_string(), self.params.clone())
    }

    /// Rebuild from the wire, resolving the model through `registry`.
    pub fn deserialize(wire: WireArgs, registry: &Registry) -> JobResult<Self> {
        let WireArgs(model, params) = wire;
        let model = registry.resolve_model(&model)?;
        Ok(Self { model, params })
    }

    /// Construct the domain value these arguments describe.
    pub fn materialize<M: Model>(&self) -> ModelResult<M> {
        if self.model.as_str() != M::NAME {
            anyhow::bail!(
                "arguments were stored for model {}, not {}",
                self.model,
                M::NAME
            );
        }
        M::construct(&self.params)
    }
}

/// A single queued invocation: which target to call with which arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    target: Identifier,
    args: Args,
    attempts: u32,
}

impl Job {
    pub fn new(target: Identifier, args: Args) -> Self {
        Self {
            target,
            args,
            attempts: 0,
        }
    }

    pub fn target(&self) -> &Identifier {
        &self.target
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    /// Failed singleton invocations recorded so far (0 unless attempts are
    /// being counted).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Copy of this job with one more recorded failure.
    pub fn with_failed_attempt(&self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            ..self.clone()
        }
    }

    /// Copy of this job with the attempt counter cleared.
    pub fn reset_attempts(mut self) -> Self {
        self.attempts = 0;
        self
    }

    pub fn serialize(&self) -> WireJob {
        WireJob {
            target: self.target.to_string(),
            args: self.args.serialize(),
            meta: (self.attempts > 0).then_some(JobMeta {
                attempts: self.attempts,
            }),
        }
    }

    /// Rebuild from the wire, resolving target and model through `registry`.
    pub fn deserialize(wire: WireJob, registry: &Registry) -> JobResult<Self> {
        let attempts = wire.attempts();
        let target = registry.target(&wire.target)?;
        let args = Args::deserialize(wire.args, registry)?;

        if args.model() != target.model() {
            return Err(JobError::ModelMismatch {
                target: target.name().to_string(),
                expected: target.model().to_string(),
                found: args.model().to_string(),
            });
        }

        Ok(Self {
            target: target.name().clone(),
            args,
            attempts,
        })
    }

    /// Encode as the JSON value stored in a queue.
    pub fn to_value(&self) -> JobResult<Value> {
        self.serialize().to_value()
    }
}
