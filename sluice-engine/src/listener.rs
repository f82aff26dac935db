//! Execution listeners.
//!
//! One listener instance accompanies one job execution and receives every
//! lifecycle event: job begin and end, per-table progress, analyzer
//! results, inter-component messages and errors. All methods default to
//! no-ops, so implementors override exactly the events they care about.
//!
//! The engine takes a single listener. Callers who want several observers
//! compose them with [`CompositeListener`] rather than the engine managing
//! a subscriber list.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::components::AnalyzerResult;
use crate::data::RowId;
use crate::error::EngineError;
use crate::job::{ComponentJob, Job};
use crate::logging::{truncate_field, LogConfig};

/// Receives lifecycle events of one job execution.
///
/// Implementations must be thread-safe: table pipelines run concurrently
/// and deliver events from their own tasks.
pub trait JobListener: Debug + Send + Sync {
    /// The job is about to start.
    fn on_job_begin(&self, job: &Job) {
        let _ = job;
    }

    /// The job finished without a single error.
    fn on_job_success(&self, job: &Job) {
        let _ = job;
    }

    /// A table pipeline is about to read its first row.
    /// `expected_rows` is the source's row count hint, when it has one.
    fn on_table_begin(&self, table: &str, expected_rows: Option<u64>) {
        let _ = (table, expected_rows);
    }

    /// Progress heartbeat while a table is being processed.
    fn on_row_progress(&self, table: &str, rows_processed: u64) {
        let _ = (table, rows_processed);
    }

    /// A table pipeline processed its last row without error.
    fn on_table_success(&self, table: &str, rows_processed: u64) {
        let _ = (table, rows_processed);
    }

    /// An analyzer is about to be initialized.
    fn on_analyzer_begin(&self, component: &ComponentJob) {
        let _ = component;
    }

    /// An analyzer produced its result.
    fn on_analyzer_success(&self, component: &ComponentJob, result: &AnalyzerResult) {
        let _ = (component, result);
    }

    /// A component published a message through its context.
    fn on_component_message(&self, component: &ComponentJob, message: &str) {
        let _ = (component, message);
    }

    /// A component failed, during row processing (`row` is `Some`) or in a
    /// lifecycle phase (`row` is `None`).
    fn on_component_error(&self, component: &ComponentJob, row: Option<RowId>, error: &EngineError) {
        let _ = (component, row, error);
    }

    /// The job failed outside any component, or was cancelled.
    fn on_job_error(&self, error: &EngineError) {
        let _ = error;
    }
}

/// A listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl JobListener for NoopListener {}

/// Fans every event out to a list of listeners, in registration order.
#[derive(Debug, Default)]
pub struct CompositeListener {
    listeners: Vec<Arc<dyn JobListener>>,
}

impl CompositeListener {
    /// Creates an empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener, builder style.
    pub fn with(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Adds a listener.
    pub fn push(&mut self, listener: Arc<dyn JobListener>) {
        self.listeners.push(listener);
    }

    /// Number of composed listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Checks if no listener is composed.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl JobListener for CompositeListener {
    fn on_job_begin(&self, job: &Job) {
        for listener in &self.listeners {
            listener.on_job_begin(job);
        }
    }

    fn on_job_success(&self, job: &Job) {
        for listener in &self.listeners {
            listener.on_job_success(job);
        }
    }

    fn on_table_begin(&self, table: &str, expected_rows: Option<u64>) {
        for listener in &self.listeners {
            listener.on_table_begin(table, expected_rows);
        }
    }

    fn on_row_progress(&self, table: &str, rows_processed: u64) {
        for listener in &self.listeners {
            listener.on_row_progress(table, rows_processed);
        }
    }

    fn on_table_success(&self, table: &str, rows_processed: u64) {
        for listener in &self.listeners {
            listener.on_table_success(table, rows_processed);
        }
    }

    fn on_analyzer_begin(&self, component: &ComponentJob) {
        for listener in &self.listeners {
            listener.on_analyzer_begin(component);
        }
    }

    fn on_analyzer_success(&self, component: &ComponentJob, result: &AnalyzerResult) {
        for listener in &self.listeners {
            listener.on_analyzer_success(component, result);
        }
    }

    fn on_component_message(&self, component: &ComponentJob, message: &str) {
        for listener in &self.listeners {
            listener.on_component_message(component, message);
        }
    }

    fn on_component_error(&self, component: &ComponentJob, row: Option<RowId>, error: &EngineError) {
        for listener in &self.listeners {
            listener.on_component_error(component, row, error);
        }
    }

    fn on_job_error(&self, error: &EngineError) {
        for listener in &self.listeners {
            listener.on_job_error(error);
        }
    }
}

/// Logs every event through `tracing`, with structured fields.
///
/// What gets logged follows the [`LogConfig`]: production configurations
/// silence per-row progress and metric payloads while keeping errors.
#[derive(Debug, Clone, Default)]
pub struct TracingListener {
    config: LogConfig,
}

impl TracingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LogConfig) -> Self {
        Self { config }
    }
}

impl JobListener for TracingListener {
    fn on_job_begin(&self, job: &Job) {
        info!(
            job.components = job.len(),
            job.tables = job.tables().len(),
            "Job started"
        );
    }

    fn on_job_success(&self, job: &Job) {
        info!(job.components = job.len(), "Job succeeded");
    }

    fn on_table_begin(&self, table: &str, expected_rows: Option<u64>) {
        info!(table = table, rows.expected = ?expected_rows, "Table processing started");
    }

    fn on_row_progress(&self, table: &str, rows_processed: u64) {
        if self.config.log_row_progress {
            debug!(table = table, rows.processed = rows_processed, "Table progress");
        }
    }

    fn on_table_success(&self, table: &str, rows_processed: u64) {
        info!(
            table = table,
            rows.processed = rows_processed,
            "Table processing completed"
        );
    }

    fn on_analyzer_begin(&self, component: &ComponentJob) {
        debug!(component.name = %component.name(), component.id = %component.id(), "Analyzer started");
    }

    fn on_analyzer_success(&self, component: &ComponentJob, result: &AnalyzerResult) {
        if self.config.log_results {
            info!(
                component.name = %component.name(),
                component.id = %component.id(),
                result = %truncate_field(&result.to_string(), self.config.max_field_length),
                "Analyzer completed"
            );
        } else {
            info!(
                component.name = %component.name(),
                component.id = %component.id(),
                "Analyzer completed"
            );
        }
    }

    fn on_component_message(&self, component: &ComponentJob, message: &str) {
        info!(
            component.name = %component.name(),
            message = %truncate_field(message, self.config.max_field_length),
            "Component message"
        );
    }

    fn on_component_error(&self, component: &ComponentJob, row: Option<RowId>, err: &EngineError) {
        error!(
            component.name = %component.name(),
            component.id = %component.id(),
            row = ?row,
            error = %err,
            "Component error"
        );
    }

    fn on_job_error(&self, err: &EngineError) {
        warn!(error = %err, "Job error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingListener {
        events: AtomicUsize,
    }

    impl JobListener for CountingListener {
        fn on_table_begin(&self, _table: &str, _expected_rows: Option<u64>) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_error(&self, _error: &EngineError) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_composite_fans_out_to_every_listener() {
        let first = Arc::new(CountingListener::default());
        let second = Arc::new(CountingListener::default());
        let composite = CompositeListener::new()
            .with(first.clone() as Arc<dyn JobListener>)
            .with(second.clone() as Arc<dyn JobListener>);

        composite.on_table_begin("people", Some(10));
        composite.on_job_error(&EngineError::Cancelled);

        assert_eq!(first.events.load(Ordering::SeqCst), 2);
        assert_eq!(second.events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_noop_listener_accepts_every_event() {
        let listener = NoopListener;
        listener.on_row_progress("people", 5);
        listener.on_job_error(&EngineError::Cancelled);
    }
}
