//! Bounded task spawning and explicit fan-in.
//!
//! Two primitives carry every phase transition in the engine: a
//! [`TaskSpawner`] that admits work under a concurrency bound, and a
//! [`TaskGroup`] that counts outstanding tasks so a phase can wait for all
//! of them. Together they replace ad-hoc callback chaining with structured
//! joins; outside these and the per-consumer locks, the engine uses no
//! other coordination primitive.
//!
//! [`TaskSpawner`] is also the substitution seam for alternative
//! schedulers: an implementation backed by a remote worker fleet slots in
//! without the rest of the engine noticing.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{Notify, Semaphore};

use crate::error::{EngineError, Result};

/// Admits and runs engine tasks under a concurrency bound.
///
/// `spawn` must not return before the task has been admitted: callers rely
/// on it for backpressure, and the engine acquires admission before reading
/// the next source row, which is what bounds read-ahead.
#[async_trait]
pub trait TaskSpawner: Debug + Send + Sync {
    /// Runs `task`, waiting for capacity first. The capacity slot is held
    /// until the task finishes.
    async fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<()>;

    /// The concurrency bound.
    fn capacity(&self) -> usize;
}

/// [`TaskSpawner`] over the ambient Tokio runtime, bounded by a semaphore.
#[derive(Debug)]
pub struct TokioSpawner {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl TokioSpawner {
    /// Creates a spawner admitting at most `capacity` concurrent tasks.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Creates a spawner sized to the machine's logical CPU count.
    pub fn with_default_capacity() -> Self {
        Self::new(num_cpus::get())
    }
}

#[async_trait]
impl TaskSpawner for TokioSpawner {
    async fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<()> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Internal("task spawner is shut down".to_string()))?;
        tokio::spawn(async move {
            task.await;
            drop(permit);
        });
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Counts outstanding tasks of one phase so the phase can join on all of
/// them.
///
/// The counter is incremented before a task is admitted and decremented
/// when it finishes; [`TaskGroup::join`] resolves once it reaches zero.
/// Groups are single-use: join only after the last `spawn_on`.
#[derive(Debug, Default)]
pub struct TaskGroup {
    pending: AtomicUsize,
    spawned: AtomicUsize,
    notify: Notify,
}

impl TaskGroup {
    /// Creates an empty group.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Admits `task` through `spawner` and tracks it in this group.
    pub async fn spawn_on(
        self: &Arc<Self>,
        spawner: &dyn TaskSpawner,
        task: BoxFuture<'static, ()>,
    ) -> Result<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let group = Arc::clone(self);
        let wrapped = Box::pin(async move {
            task.await;
            group.finish_one();
        });
        if let Err(err) = spawner.spawn(wrapped).await {
            self.finish_one();
            return Err(err);
        }
        Ok(())
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Waits until every tracked task has finished.
    pub async fn join(&self) {
        loop {
            let notified = self.notify.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Waits up to `timeout` for every tracked task. Returns whether the
    /// group drained in time.
    pub async fn join_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.join()).await.is_ok()
    }

    /// Number of tasks still running or queued.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Total number of tasks ever admitted through this group.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}
