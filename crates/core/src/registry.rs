//! Explicit registry of batch targets and their models.
//!
//! Jobs cross process boundaries as names, so every process that produces or
//! consumes jobs builds the same registry at startup, before the first drain.
//! Resolution is a map lookup; a miss means the code that enqueued the job is
//! not the code consuming it.
//!
//! ## Registration
//!
//! ```ignore
//! let mut registry = Registry::new();
//! let send_invoices = registry.register("billing.tasks.send_invoices", |invoices: Vec<Invoice>| {
//!     mailer.send_all(&invoices)?;
//!     Ok(())
//! })?;
//! ```
//!
//! The closure signature is the batch shape: one `Vec` of a [`Model`]. Name
//! problems are reported here, never during `consume`.

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::error::{JobError, JobResult, RegistrationError};
use crate::identifier::Identifier;
use crate::job::{Args, Job};
use crate::model::{Model, ModelResult, Params};

type ErasedTarget = dyn Fn(&[Job]) -> ModelResult<()> + Send + Sync;
type TypedTarget<M> = dyn Fn(Vec<M>) -> ModelResult<()> + Send + Sync;

/// A registered target with its model type erased.
///
/// Invoking it materializes every job's arguments and calls the target once
/// with the whole list. A materialization error is returned exactly like an
/// error from the target itself.
pub struct RegisteredTarget {
    name: Identifier,
    model: Identifier,
    call: Arc<ErasedTarget>,
}

impl RegisteredTarget {
    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn model(&self) -> &Identifier {
        &self.model
    }

    /// Run the target once over `jobs`, in order.
    pub fn invoke(&self, jobs: &[Job]) -> ModelResult<()> {
        (self.call)(jobs)
    }
}

impl core::fmt::Debug for RegisteredTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegisteredTarget")
            .field("name", &self.name)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Typed handle returned by [`Registry::register`].
///
/// Calling it runs the target directly; [`BatchTask::job`] builds a queueable
/// invocation for a producer.
pub struct BatchTask<M> {
    target: Arc<RegisteredTarget>,
    func: Arc<TypedTarget<M>>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> BatchTask<M> {
    pub fn name(&self) -> &Identifier {
        self.target.name()
    }

    /// The type-erased entry the registry resolves this task to.
    pub fn target(&self) -> &Arc<RegisteredTarget> {
        &self.target
    }

    /// Call the target directly with already materialized values.
    pub fn call(&self, items: Vec<M>) -> ModelResult<()> {
        (self.func)(items)
    }

    /// Build one job from call-site arguments.
    pub fn job(&self, params: Params) -> Job {
        Job::new(
            self.target.name().clone(),
            Args::with_model(self.target.model().clone(), params),
        )
    }
}

impl<M> Clone for BatchTask<M> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            func: self.func.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> core::fmt::Debug for BatchTask<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("BatchTask").field(&self.target.name).finish()
    }
}

/// Name → target and name → model lookup tables.
#[derive(Default)]
pub struct Registry {
    targets: HashMap<Identifier, Arc<RegisteredTarget>>,
    models: HashMap<Identifier, TypeId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `target` as a batch function over `M` under `name`.
    pub fn register<M, F>(&mut self, name: &str, target: F) -> Result<BatchTask<M>, RegistrationError>
    where
        M: Model,
        F: Fn(Vec<M>) -> ModelResult<()> + Send + Sync + 'static,
    {
        let name = Identifier::new(name)?;
        if self.targets.contains_key(&name) {
            return Err(RegistrationError::DuplicateTarget(name.to_string()));
        }
        let model = self.register_model::<M>()?;

        let func: Arc<TypedTarget<M>> = Arc::new(target);
        let erased_func = func.clone();
        let call: Arc<ErasedTarget> = Arc::new(move |jobs: &[Job]| {
            let items = jobs
                .iter()
                .map(|job| job.args().materialize::<M>())
                .collect::<ModelResult<Vec<M>>>()?;
            erased_func(items)
        });

        let registered = Arc::new(RegisteredTarget {
            name: name.clone(),
            model,
            call,
        });
        self.targets.insert(name.clone(), registered.clone());

        debug!(task = %name, model = M::NAME, "registered batch target");

        Ok(BatchTask {
            target: registered,
            func,
            _model: PhantomData,
        })
    }

    /// Make `M` resolvable by name without attaching a target to it.
    ///
    /// Idempotent for the same type; a second type claiming the same name is
    /// rejected.
    pub fn register_model<M: Model>(&mut self) -> Result<Identifier, RegistrationError> {
        let model = Identifier::new(M::NAME)?;
        let type_id = TypeId::of::<M>();

        match self.models.get(&model) {
            Some(existing) if *existing != type_id => {
                Err(RegistrationError::ModelConflict(model.to_string()))
            }
            Some(_) => Ok(model),
            None => {
                self.models.insert(model.clone(), type_id);
                Ok(model)
            }
        }
    }

    /// Resolve a target by its wire name.
    pub fn target(&self, name: &str) -> JobResult<Arc<RegisteredTarget>> {
        Identifier::new(name)
            .ok()
            .and_then(|id| self.targets.get(&id).cloned())
            .ok_or_else(|| JobError::UnresolvableTarget(name.to_string()))
    }

    /// Resolve a model by its wire name.
    pub fn resolve_model(&self, name: &str) -> JobResult<Identifier> {
        Identifier::new(name)
            .ok()
            .filter(|id| self.models.contains_key(id))
            .ok_or_else(|| JobError::UnresolvableModel(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Registered target names, sorted.
    pub fn target_names(&self) -> Vec<&Identifier> {
        let mut names: Vec<_> = self.targets.keys().collect();
        names.sort();
        names
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("targets", &self.target_names())
            .field("models", &self.models.len())
            .finish()
    }
}
