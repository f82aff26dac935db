//! Per-table execution: scan, fan-out, collect, close.
//!
//! A pipeline is built once per table from the frozen job and then run
//! through four strictly ordered phases. Initialization fans out over all
//! consumers and joins; rows are read one at a time and each becomes one
//! bounded task walking the chain; analyzer collection runs after the last
//! row task; close runs for every consumer that was initialized, on both
//! clean and failed runs.
//!
//! Any recorded error stops further row submission, but tasks already in
//! flight drain normally and collection still harvests what analyzers
//! accumulated up to that point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::components::{AnalyzerResult, ComponentContext, ComponentInstance};
use crate::job::ComponentFactory;
use crate::data::{InputColumn, Row, RowIdAllocator, RowLayout, SourceColumn, Value};
use crate::error::{EngineError, Result};
use crate::job::{ComponentId, ComponentJob, Job};
use crate::sources::{DataSource, Predicate};

use super::chain::ConsumerChain;
use super::consumer::RowConsumer;
use super::context::ExecutionContext;
use super::ordering::order_consumers;
use super::pushdown::PushdownPlan;
use super::runner::RunnerConfig;
use super::scheduler::TaskGroup;

/// What one table run produced: the number of rows read and every
/// analyzer result harvested.
#[derive(Debug, Default)]
pub(crate) struct TableReport {
    pub(crate) rows: u64,
    pub(crate) analyzers: Vec<(ComponentJob, AnalyzerResult)>,
}

/// One table's consumers, wired and ready to run.
#[derive(Debug)]
pub(crate) struct TablePipeline {
    table: String,
    chain: Arc<ConsumerChain>,
    projection: Vec<Arc<SourceColumn>>,
    predicates: Vec<Predicate>,
    allocator: Arc<RowIdAllocator>,
    progress_interval: u64,
}

impl TablePipeline {
    /// Instantiates the table's components, orders them, plans push-down
    /// and resolves the row layout.
    ///
    /// The projection asks the source only for the physical columns the
    /// surviving chain reads, plus any columns declared as primary keys of
    /// the table.
    pub(crate) fn build(
        job: &Job,
        table: &str,
        factory: &dyn ComponentFactory,
        config: &RunnerConfig,
        allocator: Arc<RowIdAllocator>,
    ) -> Result<Self> {
        let components: Vec<ComponentJob> = job
            .components_for_table(table)
            .into_iter()
            .cloned()
            .collect();

        let mut instances: HashMap<ComponentId, ComponentInstance> = HashMap::new();
        for component in &components {
            let instance = factory.create(component.descriptor(), component.properties())?;
            instances.insert(component.id(), instance);
        }

        let ordered = order_consumers(&components)?;
        let plan = if config.pushdown_enabled() {
            PushdownPlan::analyze(&ordered, &instances)
        } else {
            PushdownPlan::default()
        };
        if plan.optimized_count() > 0 {
            debug!(
                table,
                optimized = plan.optimized_count(),
                "Push-down lifted filters out of the chain"
            );
        }
        let chain_jobs: Vec<ComponentJob> = ordered
            .into_iter()
            .filter(|component| !plan.is_optimized(component.id()))
            .collect();

        let mut projection: Vec<Arc<SourceColumn>> = Vec::new();
        for component in &chain_jobs {
            for column in component.input_columns() {
                if let InputColumn::Physical(physical) = column {
                    if !projection.iter().any(|existing| existing == physical) {
                        projection.push(Arc::clone(physical));
                    }
                }
            }
        }
        for declared in job.source_columns_for_table(table) {
            if declared.is_primary_key() && !projection.iter().any(|existing| existing == declared) {
                projection.push(Arc::clone(declared));
            }
        }

        let mut layout_columns: Vec<InputColumn> = projection
            .iter()
            .map(|column| InputColumn::Physical(Arc::clone(column)))
            .collect();
        for component in &chain_jobs {
            for output in component.output_columns() {
                layout_columns.push(InputColumn::Virtual(Arc::clone(output)));
            }
        }
        let layout = Arc::new(RowLayout::new(layout_columns));

        let mut consumers = Vec::with_capacity(chain_jobs.len());
        for component in chain_jobs {
            let instance = instances.remove(&component.id()).ok_or_else(|| {
                EngineError::Internal(format!("no instance created for {component}"))
            })?;
            let mut slots = Vec::with_capacity(component.output_columns().len());
            for output in component.output_columns() {
                let column = InputColumn::Virtual(Arc::clone(output));
                let slot = layout.index_of(&column).ok_or_else(|| {
                    EngineError::Internal(format!("output column {column} missing from layout"))
                })?;
                slots.push(slot);
            }
            consumers.push(Arc::new(RowConsumer::new(component, instance, slots)?));
        }

        let chain = Arc::new(ConsumerChain::new(
            consumers,
            layout,
            Arc::clone(&allocator),
            plan.satisfied().to_vec(),
        ));

        Ok(Self {
            table: table.to_string(),
            chain,
            projection,
            predicates: plan.predicates().to_vec(),
            allocator,
            progress_interval: config.progress_interval(),
        })
    }

    pub(crate) fn table(&self) -> &str {
        &self.table
    }

    /// Runs the table to completion. Failures are recorded on the
    /// execution context rather than returned; the report always reflects
    /// whatever the run managed to produce.
    pub(crate) async fn run(&self, source: Arc<dyn DataSource>, ctx: ExecutionContext) -> TableReport {
        let listener = Arc::clone(ctx.listener());
        let expected = match source.row_count(&self.table).await {
            Ok(expected) => expected,
            Err(err) => {
                warn!(table = %self.table, "Row count estimate failed: {err}");
                None
            }
        };
        listener.on_table_begin(&self.table, expected);

        let consumers = self.chain.consumers();
        let contexts: Vec<ComponentContext> = consumers
            .iter()
            .map(|consumer| ComponentContext::new(consumer.job().clone(), Arc::clone(&listener)))
            .collect();
        let initialized: Vec<Arc<AtomicBool>> = consumers
            .iter()
            .map(|_| Arc::new(AtomicBool::new(false)))
            .collect();
        let failed = Arc::new(AtomicBool::new(false));

        for consumer in consumers {
            if consumer.job().is_analyzer() {
                listener.on_analyzer_begin(consumer.job());
            }
        }

        self.initialize_consumers(&ctx, &contexts, &initialized, &failed)
            .await;
        let init_ok = !failed.load(Ordering::SeqCst);

        let mut rows = 0;
        if init_ok && !ctx.is_cancelled() {
            rows = self.pump_rows(&source, &ctx, &failed).await;
        }

        let mut analyzers = Vec::new();
        if init_ok {
            analyzers = self.collect_analyzers(&ctx, &failed).await;
        }

        self.close_consumers(&ctx, &contexts, &initialized, &failed)
            .await;

        if failed.load(Ordering::SeqCst) {
            debug!(table = %self.table, rows, "Table finished with errors");
        } else {
            listener.on_table_success(&self.table, rows);
        }
        TableReport {
            rows,
            analyzers,
        }
    }

    async fn initialize_consumers(
        &self,
        ctx: &ExecutionContext,
        contexts: &[ComponentContext],
        initialized: &[Arc<AtomicBool>],
        failed: &Arc<AtomicBool>,
    ) {
        let group = TaskGroup::new();
        for (index, consumer) in self.chain.consumers().iter().enumerate() {
            let consumer = Arc::clone(consumer);
            let component_ctx = contexts[index].clone();
            let flag = Arc::clone(&initialized[index]);
            let failed_for_task = Arc::clone(failed);
            let ctx_for_task = ctx.clone();
            let spawned = group
                .spawn_on(
                    ctx.spawner(),
                    Box::pin(async move {
                        match consumer.instance().initialize(&component_ctx) {
                            Ok(()) => flag.store(true, Ordering::SeqCst),
                            Err(err) => {
                                failed_for_task.store(true, Ordering::SeqCst);
                                ctx_for_task.record_component_error(
                                    consumer.job(),
                                    None,
                                    EngineError::component_lifecycle_with_source(
                                        consumer.job().name(),
                                        "initialize",
                                        Box::new(err),
                                    ),
                                );
                            }
                        }
                    }),
                )
                .await;
            if let Err(err) = spawned {
                failed.store(true, Ordering::SeqCst);
                ctx.record_job_error(err);
            }
        }
        group.join().await;
    }

    /// Reads the source row by row, handing each row to a bounded task.
    /// Admission is acquired before the next read, which caps read-ahead
    /// at the worker capacity.
    async fn pump_rows(
        &self,
        source: &Arc<dyn DataSource>,
        ctx: &ExecutionContext,
        failed: &Arc<AtomicBool>,
    ) -> u64 {
        let mut stream = match source
            .scan(&self.table, &self.projection, &self.predicates)
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                failed.store(true, Ordering::SeqCst);
                ctx.record_job_error(err);
                return 0;
            }
        };

        let listener = Arc::clone(ctx.listener());
        let group = TaskGroup::new();
        let width = self.chain.layout().width();
        let mut rows: u64 = 0;

        loop {
            if ctx.is_cancelled() || ctx.sink().has_errors() {
                break;
            }
            match stream.next_values().await {
                Ok(Some(values)) => {
                    if values.len() != self.projection.len() {
                        failed.store(true, Ordering::SeqCst);
                        ctx.record_job_error(EngineError::source_error(format!(
                            "table '{}' returned {} values for {} projected columns",
                            self.table,
                            values.len(),
                            self.projection.len()
                        )));
                        break;
                    }
                    let mut values = values;
                    values.resize(width, Value::Null);
                    let row = Row::new(self.allocator.next_physical(), values);
                    rows += 1;

                    let chain = Arc::clone(&self.chain);
                    let ctx_for_task = ctx.clone();
                    let failed_for_task = Arc::clone(failed);
                    let spawned = group
                        .spawn_on(
                            ctx.spawner(),
                            Box::pin(async move {
                                if let Err(chain_err) = chain.process(row).await {
                                    failed_for_task.store(true, Ordering::SeqCst);
                                    match chain.job_of(chain_err.component) {
                                        Some(job) => ctx_for_task.record_component_error(
                                            job,
                                            Some(chain_err.row),
                                            chain_err.error,
                                        ),
                                        None => ctx_for_task.record_job_error(chain_err.error),
                                    }
                                }
                            }),
                        )
                        .await;
                    if let Err(err) = spawned {
                        failed.store(true, Ordering::SeqCst);
                        ctx.record_job_error(err);
                        break;
                    }
                    if self.progress_interval > 0 && rows % self.progress_interval == 0 {
                        listener.on_row_progress(&self.table, rows);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    failed.store(true, Ordering::SeqCst);
                    ctx.record_job_error(err);
                    break;
                }
            }
        }

        group.join().await;
        if let Err(err) = stream.close().await {
            failed.store(true, Ordering::SeqCst);
            ctx.record_job_error(err);
        }
        rows
    }

    async fn collect_analyzers(
        &self,
        ctx: &ExecutionContext,
        failed: &Arc<AtomicBool>,
    ) -> Vec<(ComponentJob, AnalyzerResult)> {
        let harvested: Arc<Mutex<Vec<(ComponentJob, AnalyzerResult)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let listener = Arc::clone(ctx.listener());
        let group = TaskGroup::new();

        for consumer in self.chain.consumers() {
            let ComponentInstance::Analyzer(analyzer) = consumer.instance() else {
                continue;
            };
            let analyzer = Arc::clone(analyzer);
            let job = consumer.job().clone();
            let harvested = Arc::clone(&harvested);
            let listener = Arc::clone(&listener);
            let failed_for_task = Arc::clone(failed);
            let ctx_for_task = ctx.clone();
            let spawned = group
                .spawn_on(
                    ctx.spawner(),
                    Box::pin(async move {
                        match analyzer.collect() {
                            Ok(result) => {
                                listener.on_analyzer_success(&job, &result);
                                if let Ok(mut harvested) = harvested.lock() {
                                    harvested.push((job, result));
                                }
                            }
                            Err(err) => {
                                failed_for_task.store(true, Ordering::SeqCst);
                                ctx_for_task.record_component_error(
                                    &job,
                                    None,
                                    EngineError::component_lifecycle_with_source(
                                        job.name(),
                                        "collect",
                                        Box::new(err),
                                    ),
                                );
                            }
                        }
                    }),
                )
                .await;
            if let Err(err) = spawned {
                failed.store(true, Ordering::SeqCst);
                ctx.record_job_error(err);
            }
        }

        group.join().await;
        let mut results = harvested
            .lock()
            .map(|mut harvested| std::mem::take(&mut *harvested))
            .unwrap_or_default();
        results.sort_by_key(|(job, _)| job.id());
        results
    }

    async fn close_consumers(
        &self,
        ctx: &ExecutionContext,
        contexts: &[ComponentContext],
        initialized: &[Arc<AtomicBool>],
        failed: &Arc<AtomicBool>,
    ) {
        let group = TaskGroup::new();
        for (index, consumer) in self.chain.consumers().iter().enumerate() {
            if !initialized[index].load(Ordering::SeqCst) {
                continue;
            }
            let consumer = Arc::clone(consumer);
            let component_ctx = contexts[index].clone();
            let failed_for_task = Arc::clone(failed);
            let ctx_for_task = ctx.clone();
            let spawned = group
                .spawn_on(
                    ctx.spawner(),
                    Box::pin(async move {
                        if let Err(err) = consumer.instance().close(&component_ctx) {
                            failed_for_task.store(true, Ordering::SeqCst);
                            ctx_for_task.record_component_error(
                                consumer.job(),
                                None,
                                EngineError::component_lifecycle_with_source(
                                    consumer.job().name(),
                                    "close",
                                    Box::new(err),
                                ),
                            );
                        }
                    }),
                )
                .await;
            if let Err(err) = spawned {
                failed.store(true, Ordering::SeqCst);
                ctx.record_job_error(err);
            }
        }
        group.join().await;
    }
}
