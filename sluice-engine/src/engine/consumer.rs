//! A component instance bound into a table's processing chain.

use tokio::sync::{Mutex, MutexGuard};

use crate::components::ComponentInstance;
use crate::error::{EngineError, Result};
use crate::job::ComponentJob;

/// One slot in a table's ordered chain: the frozen component job paired
/// with the live instance that executes it.
///
/// Instances that are not safe for concurrent row processing carry a lock;
/// the chain acquires it around every call into the instance, so at most
/// one row touches such an instance at a time while concurrent-safe
/// neighbours keep running in parallel.
#[derive(Debug)]
pub(crate) struct RowConsumer {
    job: ComponentJob,
    instance: ComponentInstance,
    output_slots: Vec<usize>,
    lock: Option<Mutex<()>>,
}

impl RowConsumer {
    /// Binds `instance` to `job`. `output_slots` are the row layout indices
    /// of the job's output columns, in declaration order; empty for
    /// non-transformers.
    pub(crate) fn new(
        job: ComponentJob,
        instance: ComponentInstance,
        output_slots: Vec<usize>,
    ) -> Result<Self> {
        if instance.kind() != job.component_kind() {
            return Err(EngineError::Internal(format!(
                "factory produced a {} instance for {job}",
                instance.kind()
            )));
        }
        if output_slots.len() != job.output_columns().len() {
            return Err(EngineError::Internal(format!(
                "{job} resolved {} output slots for {} output columns",
                output_slots.len(),
                job.output_columns().len()
            )));
        }
        let lock = if instance.concurrent() {
            None
        } else {
            Some(Mutex::new(()))
        };
        Ok(Self {
            job,
            instance,
            output_slots,
            lock,
        })
    }

    pub(crate) fn job(&self) -> &ComponentJob {
        &self.job
    }

    pub(crate) fn instance(&self) -> &ComponentInstance {
        &self.instance
    }

    pub(crate) fn output_slots(&self) -> &[usize] {
        &self.output_slots
    }

    /// Whether rows must take turns through this consumer.
    pub(crate) fn is_exclusive(&self) -> bool {
        self.lock.is_some()
    }

    /// Acquires the exclusivity guard, if this consumer needs one.
    pub(crate) async fn guard(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }
}
