//! # Sluice - Declarative Data-Transformation Jobs for Rust
//!
//! Sluice is a job engine for declarative, row-oriented data processing.
//! A job composes three kinds of components over tabular data: filters
//! that sort rows into named categories, transformers that derive new
//! rows with virtual columns, and analyzers that observe rows and report
//! metrics. The engine plans each table's consumer chain, lifts eligible
//! filters into source predicates, and fans rows out across bounded
//! concurrent tasks.
//!
//! ## Overview
//!
//! Jobs are described, not scripted. Components declare their inputs and
//! configuration through descriptors; a builder validates the composition
//! and freezes it into an immutable [`job::Job`]; a [`engine::JobRunner`]
//! executes the frozen job against any [`sources::DataSource`]. What a
//! component actually does stays behind the [`components::Filter`],
//! [`components::Transformer`] and [`components::Analyzer`] traits, so
//! the same job definition runs unchanged as component libraries evolve.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI64, Ordering};
//!
//! use sluice_engine::components::{Analyzer, AnalyzerResult, ComponentInstance};
//! use sluice_engine::data::{DataType, InputColumn, Row, RowLayout, SourceColumn, Value};
//! use sluice_engine::engine::JobRunner;
//! use sluice_engine::error::Result;
//! use sluice_engine::job::{
//!     ComponentDescriptor, ComponentFactory, ComponentKind, JobBuilder, PropertyDescriptor,
//!     PropertyKind, PropertyMap,
//! };
//! use sluice_engine::sources::MemorySource;
//!
//! // Analyzers observe every surviving row and report metrics at the end.
//! #[derive(Debug, Default)]
//! struct RowCount {
//!     rows: AtomicI64,
//! }
//!
//! impl Analyzer for RowCount {
//!     fn process(&self, _row: &Row, _layout: &RowLayout) -> Result<()> {
//!         self.rows.fetch_add(1, Ordering::Relaxed);
//!         Ok(())
//!     }
//!
//!     fn collect(&self) -> Result<AnalyzerResult> {
//!         Ok(AnalyzerResult::new().with_metric("rows", self.rows.load(Ordering::Relaxed)))
//!     }
//! }
//!
//! // The descriptor declares what the component needs; the factory
//! // resolves it to a runnable instance at execution time.
//! #[derive(Debug)]
//! struct RowCountDescriptor {
//!     properties: Vec<PropertyDescriptor>,
//! }
//!
//! impl ComponentDescriptor for RowCountDescriptor {
//!     fn name(&self) -> &str {
//!         "row_count"
//!     }
//!     fn kind(&self) -> ComponentKind {
//!         ComponentKind::Analyzer
//!     }
//!     fn properties(&self) -> &[PropertyDescriptor] {
//!         &self.properties
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct Registry;
//!
//! impl ComponentFactory for Registry {
//!     fn create(
//!         &self,
//!         _descriptor: &Arc<dyn ComponentDescriptor>,
//!         _properties: &PropertyMap,
//!     ) -> Result<ComponentInstance> {
//!         Ok(ComponentInstance::from(
//!             Arc::new(RowCount::default()) as Arc<dyn Analyzer>
//!         ))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! // Declare the source data and the job over it.
//! let mut builder = JobBuilder::new();
//! let id = builder.add_source_column(
//!     SourceColumn::new("users", "id", DataType::Integer).with_primary_key(),
//! );
//! let counter = builder.add_analyzer(Arc::new(RowCountDescriptor {
//!     properties: vec![PropertyDescriptor::required("columns", PropertyKind::ColumnList)],
//! }))?;
//! builder.set_property(counter, "columns", vec![InputColumn::from(id)])?;
//! let job = builder.build()?;
//!
//! let source = MemorySource::new().with_table(
//!     "users",
//!     vec![SourceColumn::new("users", "id", DataType::Integer).with_primary_key()],
//!     vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
//! );
//!
//! // Run it and read the analyzer's metrics.
//! let runner = JobRunner::new(Arc::new(Registry));
//! let handle = runner.run(job, Arc::new(source));
//! let results = handle.results().await?;
//! assert_eq!(
//!     results.analyzer("row_count").and_then(|r| r.metric("rows")),
//!     Some(&Value::Integer(2)),
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Features
//!
//! ### Filter Categories and Requirements
//!
//! Filters sort every row into exactly one of their declared categories.
//! Downstream components gate themselves on those outcomes through
//! requirements: run always, run when one specific outcome holds, or run
//! when any of several outcomes holds. The builder validates every
//! reference and the engine orders consumers so each one runs after the
//! filters it depends on.
//!
//! ### Transformer Fan-Out
//!
//! A transformer emits zero or more value sets per input row. Each set
//! becomes a derived row carrying the transformer's virtual columns;
//! derived rows walk the rest of the chain like any other row, and a row
//! that emits nothing is swallowed without error.
//!
//! ### Query Push-Down
//!
//! When every consumer of a table transitively requires one outcome of an
//! ungated filter, and the filter offers a predicate for that outcome,
//! the engine removes the filter from the chain and pushes the predicate
//! into the source scan. Cascades are planned to a fixed point, so chains
//! of agreeing filters collapse into the scan too.
//!
//! ### Bounded Concurrency
//!
//! Tables run concurrently and rows within a table fan out into tasks,
//! capped by a configurable worker capacity. Components that declare
//! themselves non-concurrent are serialized per instance; everything is
//! owned by the run, and cancelling the handle drains in-flight work
//! without leaking tasks.
//!
//! ### Partial Failure Tolerance
//!
//! A failing row stops new submissions but neither tears down in-flight
//! rows nor discards what analyzers already saw. Every error is collected
//! and the aggregate failure lists each one; partial results stay
//! available through [`engine::JobHandle::outcome`].
//!
//! ## Architecture
//!
//! - **`data`**: values, source and virtual columns, rows and row identity
//! - **`job`**: descriptors, the builder and the frozen job model
//! - **`components`**: the filter, transformer and analyzer traits
//! - **`sources`**: the data source abstraction and the in-memory source
//! - **`engine`**: ordering, push-down planning, the row chain and the runner
//! - **`listener`**: lifecycle observation for progress and errors
//! - **`formatters`**: JSON, human-readable and Markdown outcome reports
//! - **`logging`**: structured logging configuration
//!
//! ## Examples
//!
//! See the `demos` crate in this workspace for complete runnable
//! examples, including push-down planning and failure handling.

pub mod components;
pub mod data;
pub mod engine;
pub mod error;
pub mod formatters;
pub mod job;
pub mod listener;
pub mod logging;
pub mod prelude;
pub mod sources;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;
