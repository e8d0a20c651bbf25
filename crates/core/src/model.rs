//! Models: the domain types that queued arguments materialize into.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of materializing a model or running a target.
///
/// Targets and model constructors are user code, so any error type is accepted.
pub type ModelResult<T> = anyhow::Result<T>;

/// A type jobs can be materialized into.
///
/// `NAME` is written to the wire next to the arguments and must be a stable,
/// fully-qualified identifier; the registry checks it at registration time.
/// For plain `serde` types use [`json_model!`](crate::json_model) instead of a
/// hand-written impl.
pub trait Model: Sized + Send + 'static {
    const NAME: &'static str;

    /// Build one value from stored call-site arguments.
    fn construct(params: &Params) -> ModelResult<Self>;
}

/// Implement [`Model`] for a `serde::Deserialize` type.
///
/// ```ignore
/// #[derive(serde::Deserialize)]
/// struct Invoice { id: u64, total: i64 }
///
/// bulkq_core::json_model!(Invoice, "billing.models.Invoice");
/// ```
///
/// Positional arguments fill fields in declaration order, keyword arguments fill
/// them by name. See [`Params::decode`].
#[macro_export]
macro_rules! json_model {
    ($t:ty, $name:literal) => {
        impl $crate::Model for $t {
            const NAME: &'static str = $name;

            fn construct(params: &$crate::Params) -> $crate::ModelResult<Self> {
                params
                    .decode::<Self>()
                    .map_err(::core::convert::Into::into)
            }
        }
    };
}

/// Positional and keyword arguments captured at the call site.
///
/// Wire form: `{"args": [...], "kwargs": {...}}`. Both keys are always written;
/// a missing key decodes as empty. Keyword keys are kept sorted so encoding is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument, replacing any previous value for `key`.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Capture a serializable struct as keyword arguments.
    pub fn from_kwargs<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(value)? {
            Value::Object(kwargs) => Ok(Self {
                args: Vec::new(),
                kwargs,
            }),
            other => Err(serde_json::Error::custom(format!(
                "expected a map of keyword arguments, got {other}"
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// Deserialize the arguments into `T`.
    ///
    /// - keyword arguments only (or nothing): decoded as a map
    /// - positional arguments only: decoded as a sequence, falling back to the
    ///   lone element when there is exactly one (scalars, newtypes)
    /// - both: rejected, since field order is unknown to serde; implement
    ///   [`Model::construct`] by hand for such models
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match (self.args.is_empty(), self.kwargs.is_empty()) {
            (true, _) => serde_json::from_value(Value::Object(self.kwargs.clone())),
            (false, true) => match serde_json::from_value(Value::Array(self.args.clone())) {
                Ok(value) => Ok(value),
                Err(err) if self.args.len() == 1 => {
                    serde_json::from_value(self.args[0].clone()).map_err(|_| err)
                }
                Err(err) => Err(err),
            },
            (false, false) => Err(serde_json::Error::custom(
                "cannot decode mixed positional and keyword arguments; implement Model::construct",
            )),
        }
    }
}
