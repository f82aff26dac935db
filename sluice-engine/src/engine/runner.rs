//! Job submission and whole-run orchestration.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

use crate::job::ComponentFactory;
use crate::data::RowIdAllocator;
use crate::error::EngineError;
use crate::job::Job;
use crate::listener::{JobListener, NoopListener};
use crate::sources::DataSource;

use super::context::ExecutionContext;
use super::handle::{AnalyzerOutcome, HandleState, JobHandle, JobResults, RunMetadata};
use super::pipeline::TablePipeline;
use super::scheduler::{TaskSpawner, TokioSpawner};

/// Tunables of a [`JobRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    worker_capacity: Option<usize>,
    progress_interval: u64,
    pushdown: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_capacity: None,
            progress_interval: 1_000,
            pushdown: true,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps concurrent row tasks. Defaults to the logical CPU count.
    pub fn with_worker_capacity(mut self, capacity: usize) -> Self {
        self.worker_capacity = Some(capacity.max(1));
        self
    }

    /// Emits a progress event every `interval` rows per table. Zero
    /// disables progress events.
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Enables or disables lifting filters into source predicates.
    pub fn with_pushdown(mut self, enabled: bool) -> Self {
        self.pushdown = enabled;
        self
    }

    pub fn worker_capacity(&self) -> Option<usize> {
        self.worker_capacity
    }

    pub fn progress_interval(&self) -> u64 {
        self.progress_interval
    }

    pub fn pushdown_enabled(&self) -> bool {
        self.pushdown
    }
}

/// Runs frozen jobs against data sources.
///
/// The runner owns the component factory and the scheduling configuration;
/// jobs and sources are supplied per run. `run` returns immediately with a
/// [`JobHandle`], so a caller can submit a job, keep working, and decide
/// later whether to await, poll or cancel it.
#[derive(Debug)]
pub struct JobRunner {
    factory: Arc<dyn ComponentFactory>,
    config: RunnerConfig,
    spawner: Option<Arc<dyn TaskSpawner>>,
}

impl JobRunner {
    /// Creates a runner with default configuration.
    pub fn new(factory: Arc<dyn ComponentFactory>) -> Self {
        Self {
            factory,
            config: RunnerConfig::default(),
            spawner: None,
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default Tokio-backed spawner, for callers that bring
    /// their own scheduler.
    pub fn with_spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Submits `job` without an observer. Must be called within a Tokio
    /// runtime.
    pub fn run(&self, job: Job, source: Arc<dyn DataSource>) -> JobHandle {
        self.run_with_listener(job, source, Arc::new(NoopListener))
    }

    /// Submits `job`, reporting every lifecycle event to `listener`. Must
    /// be called within a Tokio runtime.
    ///
    /// Tables run concurrently; rows within a table fan out up to the
    /// worker capacity. Configuration and ordering problems surface
    /// through the returned handle before any row is read.
    #[instrument(skip(self, job, source, listener), fields(job.components = job.len()))]
    pub fn run_with_listener(
        &self,
        job: Job,
        source: Arc<dyn DataSource>,
        listener: Arc<dyn JobListener>,
    ) -> JobHandle {
        let spawner = self.spawner.clone().unwrap_or_else(|| {
            Arc::new(TokioSpawner::new(
                self.config.worker_capacity.unwrap_or_else(num_cpus::get),
            ))
        });
        let ctx = ExecutionContext::new(spawner, Arc::clone(&listener));
        let state = HandleState::new();
        let handle = JobHandle::new(Arc::clone(&state), ctx.clone());
        let metadata = RunMetadata::begin();

        listener.on_job_begin(&job);
        debug!(
            tables = job.tables().len(),
            source = %source.description(),
            "Job submitted"
        );

        let allocator = Arc::new(RowIdAllocator::new());
        let mut pipelines = Vec::new();
        for table in job.tables() {
            let built = TablePipeline::build(
                &job,
                table,
                self.factory.as_ref(),
                &self.config,
                Arc::clone(&allocator),
            );
            match built {
                Ok(pipeline) => pipelines.push(pipeline),
                Err(err) => {
                    ctx.record_job_error(err);
                    state.complete(JobResults::default(), ctx.sink().take_reports(), metadata);
                    return handle;
                }
            }
        }

        let driver_ctx = ctx;
        tokio::spawn(async move {
            let mut tables = JoinSet::new();
            for pipeline in pipelines {
                let source = Arc::clone(&source);
                let ctx = driver_ctx.clone();
                tables.spawn(async move { pipeline.run(source, ctx).await });
            }

            let mut results = JobResults::default();
            let mut total_rows: u64 = 0;
            while let Some(joined) = tables.join_next().await {
                match joined {
                    Ok(report) => {
                        total_rows += report.rows;
                        for (component, result) in report.analyzers {
                            results.push(AnalyzerOutcome::new(&component, result));
                        }
                    }
                    Err(join_err) => driver_ctx.record_job_error(EngineError::Internal(format!(
                        "table task failed to join: {join_err}"
                    ))),
                }
            }
            results.sort_by_component();

            let reports = driver_ctx.sink().take_reports();
            if reports.is_empty() {
                info!(rows = total_rows, "Job succeeded");
                driver_ctx.listener().on_job_success(&job);
            } else {
                info!(
                    rows = total_rows,
                    errors = reports.len(),
                    "Job finished with errors"
                );
            }
            state.complete(results, reports, metadata);
        });

        handle
    }
}
