//! The caller's view of a submitted job.
//!
//! [`JobHandle`] behaves like a shareable future: poll it with
//! [`JobHandle::is_done`], await it, await it with a timeout, or cancel
//! it. Completion is signalled exactly once; every waiter observes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::components::AnalyzerResult;
use crate::error::{EngineError, ErrorReport, Result};
use crate::job::{ComponentId, ComponentJob};

use super::context::ExecutionContext;

/// Timing of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunMetadata {
    pub(crate) fn begin() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Wall-clock duration of the run, once finished.
    pub fn duration(&self) -> Option<Duration> {
        self.finished_at
            .map(|finished| (finished - self.started_at).to_std().unwrap_or_default())
    }
}

/// One analyzer's harvested result, with the component it came from.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerOutcome {
    id: ComponentId,
    component: String,
    table: String,
    result: AnalyzerResult,
}

impl AnalyzerOutcome {
    pub(crate) fn new(job: &ComponentJob, result: AnalyzerResult) -> Self {
        Self {
            id: job.id(),
            component: job.name().to_string(),
            table: job.table().to_string(),
            result,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn result(&self) -> &AnalyzerResult {
        &self.result
    }
}

/// Every analyzer result of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobResults {
    analyzers: Vec<AnalyzerOutcome>,
}

impl JobResults {
    pub(crate) fn push(&mut self, outcome: AnalyzerOutcome) {
        self.analyzers.push(outcome);
    }

    /// Restores registration order after concurrent table joins.
    pub(crate) fn sort_by_component(&mut self) {
        self.analyzers.sort_by_key(AnalyzerOutcome::id);
    }

    /// The result of the first analyzer with this component name.
    pub fn analyzer(&self, component: &str) -> Option<&AnalyzerResult> {
        self.analyzers
            .iter()
            .find(|outcome| outcome.component == component)
            .map(AnalyzerOutcome::result)
    }

    pub fn analyzer_by_id(&self, id: ComponentId) -> Option<&AnalyzerResult> {
        self.analyzers
            .iter()
            .find(|outcome| outcome.id == id)
            .map(AnalyzerOutcome::result)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnalyzerOutcome> {
        self.analyzers.iter()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

/// The complete picture of a finished run: what succeeded, what was
/// collected anyway, and every failure along the way.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    success: bool,
    results: JobResults,
    errors: Arc<Vec<ErrorReport>>,
    metadata: RunMetadata,
}

impl JobOutcome {
    /// Whether the run finished without a single recorded error.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Analyzer results, including partial ones from failed runs.
    pub fn results(&self) -> &JobResults {
        &self.results
    }

    pub fn errors(&self) -> &[ErrorReport] {
        &self.errors
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }
}

#[derive(Debug)]
struct Completed {
    results: JobResults,
    errors: Arc<Vec<ErrorReport>>,
    metadata: RunMetadata,
}

#[derive(Debug)]
pub(crate) struct HandleState {
    completed: Mutex<Option<Completed>>,
    done: watch::Sender<bool>,
    cancel_requested: AtomicBool,
}

impl HandleState {
    pub(crate) fn new() -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            completed: Mutex::new(None),
            done,
            cancel_requested: AtomicBool::new(false),
        })
    }

    /// Publishes the run's final state and wakes every waiter. Later calls
    /// are ignored.
    pub(crate) fn complete(
        &self,
        results: JobResults,
        errors: Vec<ErrorReport>,
        mut metadata: RunMetadata,
    ) {
        metadata.finish();
        if let Ok(mut slot) = self.completed.lock() {
            if slot.is_none() {
                *slot = Some(Completed {
                    results,
                    errors: Arc::new(errors),
                    metadata,
                });
            }
        }
        self.done.send_replace(true);
    }

    fn is_done(&self) -> bool {
        *self.done.borrow()
    }
}

/// A shareable, future-like handle to a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    state: Arc<HandleState>,
    ctx: ExecutionContext,
}

impl JobHandle {
    pub(crate) fn new(state: Arc<HandleState>, ctx: ExecutionContext) -> Self {
        Self { state, ctx }
    }

    /// Whether the run has finished, successfully or not.
    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// Waits until the run finishes.
    pub async fn await_done(&self) {
        let mut done = self.state.done.subscribe();
        // The sender lives in the shared state, so waiting cannot fail.
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Waits up to `timeout` for the run to finish. Returns whether it
    /// did.
    pub async fn await_done_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.await_done())
            .await
            .is_ok()
    }

    /// Requests cancellation.
    ///
    /// A synthetic cancellation error is recorded so the run can never be
    /// mistaken for a success, row submission stops, and waiters are
    /// released once in-flight rows drain. Results collected before the
    /// request stay available through [`JobHandle::outcome`].
    pub fn cancel(&self) {
        if self.is_done() || self.state.cancel_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Job cancellation requested");
        self.ctx.record_job_error(EngineError::Cancelled);
        self.ctx.cancellation().cancel();
    }

    /// Waits for completion and returns the results, or the aggregate
    /// error when anything failed.
    pub async fn results(&self) -> Result<JobResults> {
        self.await_done().await;
        let guard = self
            .state
            .completed
            .lock()
            .map_err(|_| EngineError::Internal("job handle state is poisoned".to_string()))?;
        match guard.as_ref() {
            Some(completed) if completed.errors.is_empty() => Ok(completed.results.clone()),
            Some(completed) => Err(EngineError::job_failed(&completed.errors)),
            None => Err(EngineError::Internal(
                "job signalled completion without publishing results".to_string(),
            )),
        }
    }

    /// Waits for completion and returns the full outcome, errors and
    /// partial results included.
    pub async fn outcome(&self) -> JobOutcome {
        self.await_done().await;
        let completed = self.state.completed.lock().ok().and_then(|mut guard| {
            guard.as_mut().map(|completed| JobOutcome {
                success: completed.errors.is_empty(),
                results: completed.results.clone(),
                errors: Arc::clone(&completed.errors),
                metadata: completed.metadata.clone(),
            })
        });
        completed.unwrap_or_else(|| JobOutcome {
            success: false,
            results: JobResults::default(),
            errors: Arc::new(Vec::new()),
            metadata: RunMetadata::begin(),
        })
    }
}
