//! End-to-end runs through the public API: frozen jobs over in-memory
//! sources, with filters gating consumers, transformers fanning rows out,
//! partial results on failure and cancellation mid-run.

use std::sync::Arc;
use std::time::Duration;

use sluice_engine::components::{Analyzer, ComponentInstance};
use sluice_engine::data::{DataType, InputColumn, RowId, SourceColumn, Value};
use sluice_engine::engine::{JobRunner, RunnerConfig};
use sluice_engine::error::EngineError;
use sluice_engine::job::{Job, JobBuilder, Requirement};
use sluice_engine::sources::MemorySource;
use sluice_engine::test_fixtures::{
    name_splitter_descriptor, pattern_filter_descriptor, people_source,
    reentrance_probe_descriptor, threshold_filter_descriptor, value_collector_descriptor,
    FixtureFactory, RecordingListener, ValueCollector,
};

fn people_columns() -> Vec<SourceColumn> {
    vec![
        SourceColumn::new("people", "name", DataType::Text),
        SourceColumn::new("people", "age", DataType::Integer),
    ]
}

/// Three adults (one with a null name), two minors.
fn mixed_people() -> Arc<MemorySource> {
    Arc::new(MemorySource::new().with_table(
        "people",
        people_columns(),
        vec![
            vec![Value::from("Ada Lovelace"), Value::from(36i64)],
            vec![Value::from("Grace Hopper"), Value::from(45i64)],
            vec![Value::from("Bo"), Value::from(12i64)],
            vec![Value::from("Cyd Charisse"), Value::from(17i64)],
            vec![Value::Null, Value::from(99i64)],
        ],
    ))
}

fn runner() -> JobRunner {
    JobRunner::new(Arc::new(FixtureFactory::new()))
}

/// Collector over `name`, gated on nothing.
fn collector_job() -> Job {
    let mut builder = JobBuilder::new();
    let name = builder.add_source_column(SourceColumn::new("people", "name", DataType::Text));
    let collector = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(collector, "columns", vec![InputColumn::from(name)])
        .unwrap();
    builder.build().unwrap()
}

#[tokio::test]
async fn test_unconditional_analyzer_sees_every_row() {
    let handle = runner().run(collector_job(), mixed_people());
    let results = handle.results().await.unwrap();

    assert_eq!(results.len(), 1);
    let result = results.analyzer("value_collector").unwrap();
    assert_eq!(result.metric("rows"), Some(&Value::Integer(5)));
    assert_eq!(result.summary(), Some("collected 5 rows"));
}

#[tokio::test]
async fn test_filter_outcomes_gate_downstream_consumers() {
    let mut builder = JobBuilder::new();
    let name = builder.add_source_column(SourceColumn::new("people", "name", DataType::Text));
    let age = builder.add_source_column(SourceColumn::new("people", "age", DataType::Integer));

    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(adult, "column", InputColumn::from(age))
        .unwrap();
    builder.set_property(adult, "threshold", 18i64).unwrap();
    let high = builder.outcome(adult, "HIGH").unwrap();
    let low = builder.outcome(adult, "LOW").unwrap();

    let adults = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(adults, "columns", vec![InputColumn::from(name.clone())])
        .unwrap();
    builder
        .set_requirement(adults, Requirement::Outcome(high))
        .unwrap();
    builder.set_name(adults, "adult_names").unwrap();

    let minors = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(minors, "columns", vec![InputColumn::from(name)])
        .unwrap();
    builder
        .set_requirement(minors, Requirement::Outcome(low))
        .unwrap();
    builder.set_name(minors, "minor_names").unwrap();

    let job = builder.build().unwrap();
    let results = runner().run(job, mixed_people()).results().await.unwrap();

    assert_eq!(
        results.analyzer("adult_names").unwrap().metric("rows"),
        Some(&Value::Integer(3))
    );
    assert_eq!(
        results.analyzer("minor_names").unwrap().metric("rows"),
        Some(&Value::Integer(2))
    );
}

#[tokio::test]
async fn test_transformer_fanout_multiplies_rows() {
    let source = Arc::new(MemorySource::new().with_table(
        "people",
        people_columns(),
        vec![
            vec![Value::from("Ada Lovelace"), Value::from(36i64)],
            vec![Value::from("Grace Brewster Murray Hopper"), Value::from(45i64)],
            vec![Value::from("Plato"), Value::from(70i64)],
            vec![Value::Null, Value::from(20i64)],
        ],
    ));

    let mut builder = JobBuilder::new();
    let name = builder.add_source_column(SourceColumn::new("people", "name", DataType::Text));

    // Registered before the splitter, so it observes original rows.
    let originals = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(originals, "columns", vec![InputColumn::from(name.clone())])
        .unwrap();
    builder.set_name(originals, "original_rows").unwrap();

    let splitter = builder.add_transformer(name_splitter_descriptor()).unwrap();
    builder
        .set_property(splitter, "column", InputColumn::from(name))
        .unwrap();
    let first = builder.output_column(splitter, "first").unwrap();
    let last = builder.output_column(splitter, "last").unwrap();

    // Consumes derived columns, so it sees one row per emitted batch.
    let split = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(split, "columns", vec![first, last])
        .unwrap();
    builder.set_name(split, "split_rows").unwrap();

    let job = builder.build().unwrap();
    let results = runner().run(job, source).results().await.unwrap();

    // Four source rows; the splitter swallows the null name and fans the
    // four-part name out into three branches.
    assert_eq!(
        results.analyzer("original_rows").unwrap().metric("rows"),
        Some(&Value::Integer(4))
    );
    assert_eq!(
        results.analyzer("split_rows").unwrap().metric("rows"),
        Some(&Value::Integer(5))
    );
}

#[tokio::test]
async fn test_derived_values_reach_analyzers() {
    let source = Arc::new(MemorySource::new().with_table(
        "people",
        people_columns(),
        vec![
            vec![Value::from("Ada Lovelace"), Value::from(36i64)],
            vec![Value::from("Plato"), Value::from(70i64)],
        ],
    ));

    let mut builder = JobBuilder::new();
    let name = builder.add_source_column(SourceColumn::new("people", "name", DataType::Text));

    let splitter = builder.add_transformer(name_splitter_descriptor()).unwrap();
    builder
        .set_property(splitter, "column", InputColumn::from(name))
        .unwrap();
    let first = builder.output_column(splitter, "first").unwrap();
    let last = builder.output_column(splitter, "last").unwrap();

    let collector = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(collector, "columns", vec![first.clone(), last.clone()])
        .unwrap();
    let job = builder.build().unwrap();

    // Inject a hand-held instance so the test can read what it saw.
    let seen = Arc::new(ValueCollector::new(vec![first, last]));
    let factory = FixtureFactory::new().with_instance(
        "value_collector",
        ComponentInstance::from(seen.clone() as Arc<dyn Analyzer>),
    );
    let runner = JobRunner::new(Arc::new(factory))
        .with_config(RunnerConfig::new().with_worker_capacity(1));

    runner.run(job, source).results().await.unwrap();

    assert_eq!(
        seen.seen(),
        vec![
            vec![Value::from("Ada"), Value::from("Lovelace")],
            vec![Value::from("Plato"), Value::from("Plato")],
        ]
    );
}

#[tokio::test]
async fn test_any_of_requirement_merges_categories() {
    let mut builder = JobBuilder::new();
    let name = builder.add_source_column(SourceColumn::new("people", "name", DataType::Text));
    let age = builder.add_source_column(SourceColumn::new("people", "age", DataType::Integer));

    let senior = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(senior, "column", InputColumn::from(age))
        .unwrap();
    builder.set_property(senior, "threshold", 40i64).unwrap();
    let high = builder.outcome(senior, "HIGH").unwrap();

    let b_name = builder.add_filter(pattern_filter_descriptor()).unwrap();
    builder
        .set_property(b_name, "column", InputColumn::from(name.clone()))
        .unwrap();
    builder.set_property(b_name, "pattern", "^B").unwrap();
    let matched = builder.outcome(b_name, "MATCH").unwrap();

    let either = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(either, "columns", vec![InputColumn::from(name)])
        .unwrap();
    builder
        .set_requirement(either, Requirement::any_of(vec![high, matched]))
        .unwrap();

    let job = builder.build().unwrap();
    let results = runner().run(job, mixed_people()).results().await.unwrap();

    // Seniors: Grace (45) and the nameless 99-year-old. B-names: Bo.
    assert_eq!(
        results.analyzer("value_collector").unwrap().metric("rows"),
        Some(&Value::Integer(3))
    );
}

/// A tripwire collector next to a healthy one: the failure is attributed,
/// the healthy analyzer still reports, and the tripwire keeps what it
/// gathered before the poison row.
#[tokio::test]
async fn test_component_failure_keeps_partial_results() {
    let source = Arc::new(MemorySource::new().with_table(
        "people",
        people_columns(),
        vec![
            vec![Value::from("Ada"), Value::from(36i64)],
            vec![Value::from("Grace"), Value::from(45i64)],
            vec![Value::from("poison"), Value::from(50i64)],
        ],
    ));

    let mut builder = JobBuilder::new();
    let name = builder.add_source_column(SourceColumn::new("people", "name", DataType::Text));

    let healthy = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(healthy, "columns", vec![InputColumn::from(name.clone())])
        .unwrap();
    builder.set_name(healthy, "healthy").unwrap();

    let tripwire = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(tripwire, "columns", vec![InputColumn::from(name)])
        .unwrap();
    builder.set_property(tripwire, "fail_when", "poison").unwrap();
    builder.set_name(tripwire, "tripwire").unwrap();

    let job = builder.build().unwrap();
    let runner = runner().with_config(RunnerConfig::new().with_worker_capacity(1));
    let handle = runner.run(job, source);

    // The aggregate accessor refuses a failed run.
    let err = handle.results().await.unwrap_err();
    assert!(matches!(err, EngineError::JobFailed { count: 1, .. }));

    // The outcome still carries everything that was salvaged.
    let outcome = handle.outcome().await;
    assert!(!outcome.is_success());
    assert_eq!(outcome.errors().len(), 1);

    let report = &outcome.errors()[0];
    assert_eq!(report.component.as_deref(), Some("tripwire"));
    assert_eq!(report.row, Some(RowId::new(3)));
    assert_eq!(report.error.kind(), "row_processing");
    assert!(report.error.to_string().contains("poison"));

    let results = outcome.results();
    assert_eq!(
        results.analyzer("healthy").unwrap().metric("rows"),
        Some(&Value::Integer(3))
    );
    assert_eq!(
        results.analyzer("tripwire").unwrap().metric("rows"),
        Some(&Value::Integer(2))
    );
    assert!(outcome.metadata().duration().is_some());
}

#[tokio::test]
async fn test_listener_observes_a_successful_run() {
    let listener = Arc::new(RecordingListener::new());
    let runner = runner().with_config(RunnerConfig::new().with_progress_interval(1));
    let handle = runner.run_with_listener(collector_job(), mixed_people(), listener.clone());
    handle.results().await.unwrap();

    assert!(listener.job_began());
    assert!(listener.job_succeeded());
    assert_eq!(listener.rows_of("people"), Some(5));
    assert_eq!(listener.progress_events(), 5);
    assert!(listener.component_errors().is_empty());
    assert!(listener.job_errors().is_empty());

    let analyzers = listener.analyzer_results();
    assert_eq!(analyzers.len(), 1);
    assert_eq!(analyzers[0].0, "value_collector");
    assert_eq!(analyzers[0].1.metric("rows"), Some(&Value::Integer(5)));
}

#[tokio::test]
async fn test_listener_observes_component_failures() {
    let source = Arc::new(MemorySource::new().with_table(
        "people",
        people_columns(),
        vec![
            vec![Value::from("Ada"), Value::from(36i64)],
            vec![Value::from("poison"), Value::from(50i64)],
        ],
    ));

    let mut builder = JobBuilder::new();
    let name = builder.add_source_column(SourceColumn::new("people", "name", DataType::Text));
    let tripwire = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(tripwire, "columns", vec![InputColumn::from(name)])
        .unwrap();
    builder.set_property(tripwire, "fail_when", "poison").unwrap();
    let job = builder.build().unwrap();

    let listener = Arc::new(RecordingListener::new());
    let runner = runner().with_config(RunnerConfig::new().with_worker_capacity(1));
    let handle = runner.run_with_listener(job, source, listener.clone());
    handle.await_done().await;

    assert!(listener.job_began());
    assert!(!listener.job_succeeded());
    // The table never completed cleanly, so no success row count exists.
    assert_eq!(listener.rows_of("people"), None);

    let errors = listener.component_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "value_collector");
    assert_eq!(errors[0].1, Some(RowId::new(2)));
    assert!(listener.job_errors().is_empty());
}

#[tokio::test]
async fn test_cancellation_releases_waiters_with_partial_outcome() {
    // Enough slow rows that the run is still going when cancel lands.
    let mut builder = JobBuilder::new();
    let score = builder.add_source_column(SourceColumn::new("people", "score", DataType::Float));
    let probe = builder.add_analyzer(reentrance_probe_descriptor()).unwrap();
    builder
        .set_property(probe, "columns", vec![InputColumn::from(score)])
        .unwrap();
    let job = builder.build().unwrap();

    let handle = runner().run(job, Arc::new(people_source(11, 4_000)));
    handle.cancel();
    handle.cancel();

    assert!(handle.await_done_timeout(Duration::from_secs(30)).await);
    assert!(handle.is_done());

    let outcome = handle.outcome().await;
    assert!(!outcome.is_success());
    assert_eq!(outcome.errors().len(), 1);
    assert_eq!(outcome.errors()[0].error.kind(), "cancelled");
    // Collection still ran, so the probe reports whatever it managed.
    assert_eq!(outcome.results().len(), 1);
}

#[tokio::test]
async fn test_tables_run_independently_in_one_job() {
    let source = Arc::new(
        MemorySource::new()
            .with_table(
                "people",
                people_columns(),
                vec![
                    vec![Value::from("Ada"), Value::from(36i64)],
                    vec![Value::from("Grace"), Value::from(45i64)],
                    vec![Value::from("Bo"), Value::from(12i64)],
                ],
            )
            .with_table(
                "orders",
                vec![SourceColumn::new("orders", "total", DataType::Float)],
                vec![
                    vec![Value::from(9.99f64)],
                    vec![Value::from(120.0f64)],
                ],
            ),
    );

    let mut builder = JobBuilder::new();
    let name = builder.add_source_column(SourceColumn::new("people", "name", DataType::Text));
    let total = builder.add_source_column(SourceColumn::new("orders", "total", DataType::Float));

    let people_rows = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(people_rows, "columns", vec![InputColumn::from(name)])
        .unwrap();
    builder.set_name(people_rows, "people_rows").unwrap();

    let order_rows = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(order_rows, "columns", vec![InputColumn::from(total)])
        .unwrap();
    builder.set_name(order_rows, "order_rows").unwrap();

    let job = builder.build().unwrap();
    assert_eq!(job.tables().len(), 2);

    let listener = Arc::new(RecordingListener::new());
    let handle = runner().run_with_listener(job, source, listener.clone());
    let results = handle.results().await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(
        results.analyzer("people_rows").unwrap().metric("rows"),
        Some(&Value::Integer(3))
    );
    assert_eq!(
        results.analyzer("order_rows").unwrap().metric("rows"),
        Some(&Value::Integer(2))
    );
    assert_eq!(listener.rows_of("people"), Some(3));
    assert_eq!(listener.rows_of("orders"), Some(2));
}

#[tokio::test]
async fn test_results_are_ordered_by_registration() {
    let mut builder = JobBuilder::new();
    let name = builder.add_source_column(SourceColumn::new("people", "name", DataType::Text));
    let age = builder.add_source_column(SourceColumn::new("people", "age", DataType::Integer));

    let second = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(second, "columns", vec![InputColumn::from(age)])
        .unwrap();
    builder.set_name(second, "ages").unwrap();

    let first = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(first, "columns", vec![InputColumn::from(name)])
        .unwrap();
    builder.set_name(first, "names").unwrap();

    let job = builder.build().unwrap();
    let handle = runner().run(job, mixed_people());
    let results = handle.results().await.unwrap();

    let order: Vec<&str> = results.iter().map(|outcome| outcome.component()).collect();
    assert_eq!(order, vec!["ages", "names"]);
    assert!(results.analyzer_by_id(second).is_some());
    assert_eq!(results.iter().count(), 2);

    let outcome = handle.outcome().await;
    assert!(outcome.is_success());
    assert!(outcome.errors().is_empty());
    assert!(outcome.metadata().finished_at().is_some());
    assert!(outcome.metadata().started_at() <= outcome.metadata().finished_at().unwrap());
}
