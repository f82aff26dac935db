//! Per-run execution state threaded explicitly through the engine.
//!
//! Every run owns one [`ExecutionContext`]; pipelines and tasks receive
//! clones of it rather than reaching for shared globals. It bundles the
//! task spawner, the listener, the cancellation token, and the error sink
//! that the run's handle later drains.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::data::RowId;
use crate::error::{EngineError, ErrorReport};
use crate::job::ComponentJob;
use crate::listener::JobListener;

use super::scheduler::TaskSpawner;

/// Collects every error a run produces, in observation order.
///
/// Row-level and lifecycle errors do not abort the run; they land here and
/// are aggregated once the run completes.
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorSink {
    reports: Arc<Mutex<Vec<ErrorReport>>>,
}

impl ErrorSink {
    pub(crate) fn record(&self, report: ErrorReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.reports.lock().map(|r| !r.is_empty()).unwrap_or(true)
    }

    pub(crate) fn len(&self) -> usize {
        self.reports.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Takes every report recorded so far, leaving the sink empty.
    pub(crate) fn take_reports(&self) -> Vec<ErrorReport> {
        self.reports
            .lock()
            .map(|mut r| std::mem::take(&mut *r))
            .unwrap_or_default()
    }
}

/// Shared state of one engine run.
#[derive(Debug, Clone)]
pub(crate) struct ExecutionContext {
    spawner: Arc<dyn TaskSpawner>,
    listener: Arc<dyn JobListener>,
    token: CancellationToken,
    sink: ErrorSink,
}

impl ExecutionContext {
    pub(crate) fn new(spawner: Arc<dyn TaskSpawner>, listener: Arc<dyn JobListener>) -> Self {
        Self {
            spawner,
            listener,
            token: CancellationToken::new(),
            sink: ErrorSink::default(),
        }
    }

    pub(crate) fn spawner(&self) -> &dyn TaskSpawner {
        self.spawner.as_ref()
    }

    pub(crate) fn listener(&self) -> &Arc<dyn JobListener> {
        &self.listener
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn sink(&self) -> &ErrorSink {
        &self.sink
    }

    /// Records an error attributed to a component, notifying the listener
    /// before sinking the report.
    pub(crate) fn record_component_error(
        &self,
        component: &ComponentJob,
        row: Option<RowId>,
        err: EngineError,
    ) {
        error!(
            component.name = %component.name(),
            component.id = %component.id(),
            error.kind = err.kind(),
            "Component error: {err}"
        );
        self.listener.on_component_error(component, row, &err);
        self.sink
            .record(ErrorReport::component_level(component.name(), row, err));
    }

    /// Records an error not attributable to any single component.
    pub(crate) fn record_job_error(&self, err: EngineError) {
        error!(error.kind = err.kind(), "Job error: {err}");
        self.listener.on_job_error(&err);
        self.sink.record(ErrorReport::job_level(err));
    }
}
