//! Component fixtures backing the engine's tests, demos and benches.
//!
//! Everything here is deliberately small and observable: filters and
//! transformers with obvious semantics, an analyzer that remembers exactly
//! what it saw, a listener that records every callback. [`FixtureFactory`]
//! resolves the fixture descriptors to instances the way a host
//! application's component registry would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use crate::components::{
    Analyzer, AnalyzerResult, ComponentInstance, Filter, TransformOutput, Transformer,
};
use crate::data::{DataType, InputColumn, Row, RowId, RowLayout, SourceColumn, Value};
use crate::error::{EngineError, Result};
use crate::job::{
    Category, ComponentDescriptor, ComponentFactory, ComponentJob, ComponentKind, Job,
    OutputColumnSpec, PropertyDescriptor, PropertyKind, PropertyMap,
};
use crate::listener::JobListener;
use crate::sources::{CompareOp, MemorySource, Predicate};

/// Descriptor metadata shared by every fixture component.
#[derive(Debug)]
struct FixtureDescriptor {
    name: &'static str,
    kind: ComponentKind,
    properties: Vec<PropertyDescriptor>,
    categories: Vec<Category>,
    outputs: Vec<OutputColumnSpec>,
}

impl ComponentDescriptor for FixtureDescriptor {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    fn categories(&self) -> &[Category] {
        &self.categories
    }

    fn output_columns(&self) -> &[OutputColumnSpec] {
        &self.outputs
    }
}

/// Filter sorting rows into `HIGH` or `LOW` around an integer threshold.
///
/// Requires an integer `column` and a `threshold`. The `HIGH` category is
/// query-optimizable when the column is physical; `LOW` is not, because a
/// pushed-down `<` comparison would drop null cells that the in-chain
/// evaluation sorts into `LOW`.
pub fn threshold_filter_descriptor() -> Arc<dyn ComponentDescriptor> {
    Arc::new(FixtureDescriptor {
        name: "threshold_filter",
        kind: ComponentKind::Filter,
        properties: vec![
            PropertyDescriptor::required("column", PropertyKind::Column),
            PropertyDescriptor::required("threshold", PropertyKind::Scalar(DataType::Integer)),
        ],
        categories: vec![Category::new("HIGH"), Category::new("LOW")],
        outputs: Vec::new(),
    })
}

/// Transformer splitting a text column into `first` and `last` parts.
///
/// Two whitespace-separated parts emit one continuation; three or more fan
/// out into one continuation per trailing part, each paired with the
/// leading part. A single part is emitted as both, and an empty or null
/// value swallows the row.
pub fn name_splitter_descriptor() -> Arc<dyn ComponentDescriptor> {
    Arc::new(FixtureDescriptor {
        name: "name_splitter",
        kind: ComponentKind::Transformer,
        properties: vec![PropertyDescriptor::required("column", PropertyKind::Column)],
        categories: Vec::new(),
        outputs: vec![
            OutputColumnSpec::new("first", DataType::Text),
            OutputColumnSpec::new("last", DataType::Text),
        ],
    })
}

/// Analyzer remembering the configured columns of every row it processed.
pub fn value_collector_descriptor() -> Arc<dyn ComponentDescriptor> {
    Arc::new(FixtureDescriptor {
        name: "value_collector",
        kind: ComponentKind::Analyzer,
        properties: vec![
            PropertyDescriptor::required("columns", PropertyKind::ColumnList),
            PropertyDescriptor::optional("fail_when", PropertyKind::Scalar(DataType::Text)),
        ],
        categories: Vec::new(),
        outputs: Vec::new(),
    })
}

/// Filter matching a text column against a regular expression.
///
/// Sorts rows into `MATCH` and `NO_MATCH`. Neither category offers a
/// push-down predicate, so jobs using it always evaluate row by row.
pub fn pattern_filter_descriptor() -> Arc<dyn ComponentDescriptor> {
    Arc::new(FixtureDescriptor {
        name: "pattern_filter",
        kind: ComponentKind::Filter,
        properties: vec![
            PropertyDescriptor::required("column", PropertyKind::Column),
            PropertyDescriptor::required("pattern", PropertyKind::Scalar(DataType::Text)),
        ],
        categories: vec![Category::new("MATCH"), Category::new("NO_MATCH")],
        outputs: Vec::new(),
    })
}

/// Analyzer that detects overlapping `process` calls.
pub fn reentrance_probe_descriptor() -> Arc<dyn ComponentDescriptor> {
    Arc::new(FixtureDescriptor {
        name: "reentrance_probe",
        kind: ComponentKind::Analyzer,
        properties: vec![PropertyDescriptor::required(
            "columns",
            PropertyKind::ColumnList,
        )],
        categories: Vec::new(),
        outputs: Vec::new(),
    })
}

/// Categorizes rows as `HIGH` when the configured column is at or above
/// the threshold. Everything else, null cells included, lands in `LOW`.
#[derive(Debug)]
pub struct ThresholdFilter {
    column: InputColumn,
    threshold: i64,
}

impl ThresholdFilter {
    pub fn new(column: InputColumn, threshold: i64) -> Self {
        Self { column, threshold }
    }
}

impl Filter for ThresholdFilter {
    fn evaluate(&self, row: &Row, layout: &RowLayout) -> Result<Category> {
        let at_or_above = row
            .get(layout, &self.column)
            .and_then(Value::as_i64)
            .is_some_and(|number| number >= self.threshold);
        Ok(Category::new(if at_or_above { "HIGH" } else { "LOW" }))
    }

    fn pushdown_predicate(&self, category: &Category) -> Option<Predicate> {
        if category.as_str() != "HIGH" {
            return None;
        }
        match &self.column {
            InputColumn::Physical(column) => Some(Predicate::new(
                Arc::clone(column),
                CompareOp::GtEq,
                Value::Integer(self.threshold),
            )),
            InputColumn::Virtual(_) => None,
        }
    }
}

/// Splits a text column on whitespace into `first` and `last` outputs.
#[derive(Debug)]
pub struct NameSplitter {
    column: InputColumn,
}

impl NameSplitter {
    pub fn new(column: InputColumn) -> Self {
        Self { column }
    }
}

impl Transformer for NameSplitter {
    fn transform(
        &self,
        row: &Row,
        layout: &RowLayout,
        output: &mut TransformOutput,
    ) -> Result<()> {
        let Some(text) = row.get(layout, &self.column).and_then(Value::as_str) else {
            return Ok(());
        };
        let parts: Vec<&str> = text.split_whitespace().collect();
        match parts.as_slice() {
            [] => {}
            [only] => output.push(vec![Value::from(*only), Value::from(*only)]),
            [first, rest @ ..] => {
                for last in rest {
                    output.push(vec![Value::from(*first), Value::from(*last)]);
                }
            }
        }
        Ok(())
    }
}

/// Remembers the configured columns' values of every row it processes.
///
/// The log makes it possible to assert exactly which rows reached the
/// analyzer; [`ValueCollector::with_fail_when`] turns it into a
/// controllable failure source for error-path tests.
#[derive(Debug)]
pub struct ValueCollector {
    columns: Vec<InputColumn>,
    fail_when: Option<String>,
    seen: Mutex<Vec<Vec<Value>>>,
}

impl ValueCollector {
    pub fn new(columns: Vec<InputColumn>) -> Self {
        Self {
            columns,
            fail_when: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Makes `process` fail on any row carrying this exact text value.
    pub fn with_fail_when(mut self, value: impl Into<String>) -> Self {
        self.fail_when = Some(value.into());
        self
    }

    /// The value sets processed so far, in processing order.
    pub fn seen(&self) -> Vec<Vec<Value>> {
        lock_unpoisoned(&self.seen).clone()
    }
}

impl Analyzer for ValueCollector {
    fn process(&self, row: &Row, layout: &RowLayout) -> Result<()> {
        let values: Vec<Value> = self
            .columns
            .iter()
            .map(|column| row.get(layout, column).cloned().unwrap_or(Value::Null))
            .collect();
        if let Some(trigger) = &self.fail_when {
            if values.iter().any(|value| value.as_str() == Some(trigger)) {
                return Err(EngineError::Internal(format!(
                    "collector tripped on '{trigger}'"
                )));
            }
        }
        lock_unpoisoned(&self.seen).push(values);
        Ok(())
    }

    fn collect(&self) -> Result<AnalyzerResult> {
        let rows = lock_unpoisoned(&self.seen).len();
        Ok(AnalyzerResult::new()
            .with_metric("rows", rows as i64)
            .with_summary(format!("collected {rows} rows")))
    }
}

/// Categorizes rows as `MATCH` or `NO_MATCH` against a compiled pattern.
/// Null and non-text cells fall into `NO_MATCH`.
#[derive(Debug)]
pub struct PatternFilter {
    column: InputColumn,
    pattern: Regex,
}

impl PatternFilter {
    pub fn new(column: InputColumn, pattern: Regex) -> Self {
        Self { column, pattern }
    }
}

impl Filter for PatternFilter {
    fn evaluate(&self, row: &Row, layout: &RowLayout) -> Result<Category> {
        let matched = row
            .get(layout, &self.column)
            .and_then(Value::as_str)
            .is_some_and(|text| self.pattern.is_match(text));
        Ok(Category::new(if matched { "MATCH" } else { "NO_MATCH" }))
    }
}

/// Analyzer that records overlapping `process` calls.
///
/// Non-concurrent analyzers must be serialized by the engine; a run that
/// ends with [`ReentranceProbe::overlaps`] above zero has broken that
/// guarantee. Each call holds the busy flag across a short sleep so that
/// genuinely parallel calls have a window to collide in.
#[derive(Debug, Default)]
pub struct ReentranceProbe {
    busy: AtomicBool,
    overlaps: AtomicUsize,
    rows: AtomicUsize,
}

impl ReentranceProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `process` calls that found another one in flight.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Total `process` calls observed.
    pub fn rows(&self) -> usize {
        self.rows.load(Ordering::SeqCst)
    }
}

impl Analyzer for ReentranceProbe {
    fn process(&self, _row: &Row, _layout: &RowLayout) -> Result<()> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        std::thread::sleep(std::time::Duration::from_micros(200));
        self.rows.fetch_add(1, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn collect(&self) -> Result<AnalyzerResult> {
        Ok(AnalyzerResult::new()
            .with_metric("rows", self.rows() as i64)
            .with_metric("overlaps", self.overlaps() as i64))
    }
}

/// Factory resolving the fixture descriptors by name.
///
/// [`FixtureFactory::with_instance`] pre-registers a shared instance for a
/// descriptor name, letting a test keep a handle on the exact component a
/// job runs.
#[derive(Debug, Default)]
pub struct FixtureFactory {
    overrides: HashMap<String, ComponentInstance>,
}

impl FixtureFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `instance` for every component built from the named
    /// descriptor instead of constructing a fresh one.
    pub fn with_instance(
        mut self,
        descriptor: impl Into<String>,
        instance: ComponentInstance,
    ) -> Self {
        self.overrides.insert(descriptor.into(), instance);
        self
    }
}

impl ComponentFactory for FixtureFactory {
    fn create(
        &self,
        descriptor: &Arc<dyn ComponentDescriptor>,
        properties: &PropertyMap,
    ) -> Result<ComponentInstance> {
        if let Some(instance) = self.overrides.get(descriptor.name()) {
            return Ok(instance.clone());
        }
        match descriptor.name() {
            "threshold_filter" => {
                let column = required_column(descriptor, properties, "column")?;
                let threshold = properties
                    .integer("threshold")
                    .ok_or_else(|| missing_property(descriptor, "threshold"))?;
                Ok(ComponentInstance::from(
                    Arc::new(ThresholdFilter::new(column, threshold)) as Arc<dyn Filter>,
                ))
            }
            "name_splitter" => {
                let column = required_column(descriptor, properties, "column")?;
                Ok(ComponentInstance::from(
                    Arc::new(NameSplitter::new(column)) as Arc<dyn Transformer>
                ))
            }
            "value_collector" => {
                let columns = properties
                    .columns("columns")
                    .ok_or_else(|| missing_property(descriptor, "columns"))?
                    .to_vec();
                let mut collector = ValueCollector::new(columns);
                if let Some(trigger) = properties.text("fail_when") {
                    collector = collector.with_fail_when(trigger);
                }
                Ok(ComponentInstance::from(
                    Arc::new(collector) as Arc<dyn Analyzer>
                ))
            }
            "pattern_filter" => {
                let column = required_column(descriptor, properties, "column")?;
                let pattern = properties
                    .text("pattern")
                    .ok_or_else(|| missing_property(descriptor, "pattern"))?;
                let regex = Regex::new(pattern).map_err(|err| {
                    EngineError::Configuration(format!("invalid pattern '{pattern}': {err}"))
                })?;
                Ok(ComponentInstance::from(
                    Arc::new(PatternFilter::new(column, regex)) as Arc<dyn Filter>,
                ))
            }
            "reentrance_probe" => Ok(ComponentInstance::from(
                Arc::new(ReentranceProbe::new()) as Arc<dyn Analyzer>
            )),
            other => Err(EngineError::UnknownComponent {
                component: other.to_string(),
            }),
        }
    }
}

fn required_column(
    descriptor: &Arc<dyn ComponentDescriptor>,
    properties: &PropertyMap,
    name: &str,
) -> Result<InputColumn> {
    properties
        .column(name)
        .cloned()
        .ok_or_else(|| missing_property(descriptor, name))
}

fn missing_property(descriptor: &Arc<dyn ComponentDescriptor>, name: &str) -> EngineError {
    EngineError::Configuration(format!(
        "'{}' was built without its '{}' property",
        descriptor.name(),
        name
    ))
}

/// Listener recording every callback for later assertions.
#[derive(Debug, Default)]
pub struct RecordingListener {
    job_began: AtomicBool,
    job_succeeded: AtomicBool,
    table_rows: Mutex<HashMap<String, u64>>,
    progress_events: AtomicUsize,
    analyzer_results: Mutex<Vec<(String, AnalyzerResult)>>,
    component_errors: Mutex<Vec<(String, Option<RowId>)>>,
    job_errors: Mutex<Vec<String>>,
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_began(&self) -> bool {
        self.job_began.load(Ordering::SeqCst)
    }

    pub fn job_succeeded(&self) -> bool {
        self.job_succeeded.load(Ordering::SeqCst)
    }

    /// Rows reported by `on_table_success` for `table`, if it completed.
    pub fn rows_of(&self, table: &str) -> Option<u64> {
        lock_unpoisoned(&self.table_rows).get(table).copied()
    }

    pub fn progress_events(&self) -> usize {
        self.progress_events.load(Ordering::SeqCst)
    }

    pub fn analyzer_results(&self) -> Vec<(String, AnalyzerResult)> {
        lock_unpoisoned(&self.analyzer_results).clone()
    }

    pub fn component_errors(&self) -> Vec<(String, Option<RowId>)> {
        lock_unpoisoned(&self.component_errors).clone()
    }

    pub fn job_errors(&self) -> Vec<String> {
        lock_unpoisoned(&self.job_errors).clone()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        lock_unpoisoned(&self.messages).clone()
    }
}

impl JobListener for RecordingListener {
    fn on_job_begin(&self, _job: &Job) {
        self.job_began.store(true, Ordering::SeqCst);
    }

    fn on_job_success(&self, _job: &Job) {
        self.job_succeeded.store(true, Ordering::SeqCst);
    }

    fn on_row_progress(&self, _table: &str, _rows_processed: u64) {
        self.progress_events.fetch_add(1, Ordering::SeqCst);
    }

    fn on_table_success(&self, table: &str, rows_processed: u64) {
        lock_unpoisoned(&self.table_rows).insert(table.to_string(), rows_processed);
    }

    fn on_analyzer_success(&self, component: &ComponentJob, result: &AnalyzerResult) {
        lock_unpoisoned(&self.analyzer_results).push((component.name().to_string(), result.clone()));
    }

    fn on_component_message(&self, component: &ComponentJob, message: &str) {
        lock_unpoisoned(&self.messages).push((component.name().to_string(), message.to_string()));
    }

    fn on_component_error(
        &self,
        component: &ComponentJob,
        row: Option<RowId>,
        _error: &EngineError,
    ) {
        lock_unpoisoned(&self.component_errors).push((component.name().to_string(), row));
    }

    fn on_job_error(&self, error: &EngineError) {
        lock_unpoisoned(&self.job_errors).push(error.to_string());
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Column set of the synthetic `people` table.
pub fn people_table_columns() -> Vec<SourceColumn> {
    vec![
        SourceColumn::new("people", "id", DataType::Integer).with_primary_key(),
        SourceColumn::new("people", "name", DataType::Text),
        SourceColumn::new("people", "age", DataType::Integer),
        SourceColumn::new("people", "score", DataType::Float),
    ]
}

/// Deterministic synthetic rows for the `people` table.
///
/// The same seed always yields the same rows. Roughly one row in ten has a
/// null name and one in twenty a null age, mirroring the gaps real
/// datasets carry.
pub fn synthetic_people(seed: u64, count: usize) -> Vec<Vec<Value>> {
    const FIRST: [&str; 8] = [
        "Ada", "Grace", "Alan", "Edsger", "Barbara", "Donald", "Radia", "Margaret",
    ];
    const LAST: [&str; 8] = [
        "Lovelace", "Hopper", "Turing", "Dijkstra", "Liskov", "Knuth", "Perlman", "Hamilton",
    ];

    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let name = if rng.random_range(0..10) == 0 {
                Value::Null
            } else {
                let first = FIRST[rng.random_range(0..FIRST.len())];
                let last = LAST[rng.random_range(0..LAST.len())];
                Value::Text(format!("{first} {last}"))
            };
            let age = if rng.random_range(0..20) == 0 {
                Value::Null
            } else {
                Value::Integer(rng.random_range(1..=99))
            };
            vec![
                Value::Integer(i as i64 + 1),
                name,
                age,
                Value::Float(rng.random_range(0.0..100.0)),
            ]
        })
        .collect()
}

/// A [`MemorySource`] holding one `people` table of `count` synthetic rows.
pub fn people_source(seed: u64, count: usize) -> MemorySource {
    MemorySource::new().with_table("people", people_table_columns(), synthetic_people(seed, count))
}

static PEOPLE_1K: Lazy<Vec<Vec<Value>>> = Lazy::new(|| synthetic_people(42, 1_000));

/// A shared thousand-row synthetic dataset for tests and benches that only
/// read it, sparing each of them the generation cost.
pub fn cached_people_rows() -> &'static [Vec<Value>] {
    &PEOPLE_1K
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integer_column(name: &str) -> InputColumn {
        InputColumn::Physical(Arc::new(SourceColumn::new("t", name, DataType::Integer)))
    }

    fn text_column(name: &str) -> InputColumn {
        InputColumn::Physical(Arc::new(SourceColumn::new("t", name, DataType::Text)))
    }

    #[test]
    fn test_threshold_filter_categories() {
        let column = integer_column("age");
        let layout = RowLayout::new(vec![column.clone()]);
        let filter = ThresholdFilter::new(column, 18);

        let at = filter
            .evaluate(&Row::new(RowId::new(1), vec![Value::Integer(18)]), &layout)
            .unwrap();
        assert_eq!(at.as_str(), "HIGH");
        let below = filter
            .evaluate(&Row::new(RowId::new(2), vec![Value::Integer(17)]), &layout)
            .unwrap();
        assert_eq!(below.as_str(), "LOW");
        let null = filter
            .evaluate(&Row::new(RowId::new(3), vec![Value::Null]), &layout)
            .unwrap();
        assert_eq!(null.as_str(), "LOW");
    }

    #[test]
    fn test_threshold_filter_pushes_only_high() {
        let filter = ThresholdFilter::new(integer_column("age"), 18);
        let high = filter.pushdown_predicate(&Category::new("HIGH")).unwrap();
        assert_eq!(high.op(), CompareOp::GtEq);
        assert_eq!(high.value(), &Value::Integer(18));
        assert!(filter.pushdown_predicate(&Category::new("LOW")).is_none());
    }

    #[test]
    fn test_name_splitter_fanout() {
        let column = text_column("name");
        let layout = RowLayout::new(vec![column.clone()]);
        let splitter = NameSplitter::new(column);

        let mut output = TransformOutput::new();
        splitter
            .transform(
                &Row::new(RowId::new(1), vec![Value::from("Ada King Lovelace")]),
                &layout,
                &mut output,
            )
            .unwrap();
        assert_eq!(
            output.batches(),
            &[
                vec![Value::from("Ada"), Value::from("King")],
                vec![Value::from("Ada"), Value::from("Lovelace")],
            ]
        );

        let mut single = TransformOutput::new();
        splitter
            .transform(
                &Row::new(RowId::new(2), vec![Value::from("Ada")]),
                &layout,
                &mut single,
            )
            .unwrap();
        assert_eq!(single.batches(), &[vec![Value::from("Ada"), Value::from("Ada")]]);

        let mut swallowed = TransformOutput::new();
        splitter
            .transform(
                &Row::new(RowId::new(3), vec![Value::from("  ")]),
                &layout,
                &mut swallowed,
            )
            .unwrap();
        assert!(swallowed.is_empty());
    }

    #[test]
    fn test_value_collector_fail_when() {
        let column = text_column("name");
        let layout = RowLayout::new(vec![column.clone()]);
        let collector = ValueCollector::new(vec![column]).with_fail_when("poison");

        collector
            .process(&Row::new(RowId::new(1), vec![Value::from("fine")]), &layout)
            .unwrap();
        let err = collector
            .process(
                &Row::new(RowId::new(2), vec![Value::from("poison")]),
                &layout,
            )
            .unwrap_err();
        assert!(err.to_string().contains("poison"));
        assert_eq!(collector.seen().len(), 1);

        let result = collector.collect().unwrap();
        assert_eq!(result.metric("rows"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_factory_rejects_unknown_descriptor() {
        let descriptor: Arc<dyn ComponentDescriptor> = Arc::new(FixtureDescriptor {
            name: "no_such_component",
            kind: ComponentKind::Analyzer,
            properties: Vec::new(),
            categories: Vec::new(),
            outputs: Vec::new(),
        });
        let err = FixtureFactory::new()
            .create(&descriptor, &PropertyMap::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownComponent { .. }));
    }

    #[test]
    fn test_synthetic_people_deterministic() {
        let first = synthetic_people(7, 50);
        assert_eq!(first, synthetic_people(7, 50));
        assert_eq!(first.len(), 50);
        assert_eq!(first[0][0], Value::Integer(1));
        assert_ne!(first, synthetic_people(8, 50));
    }
}
