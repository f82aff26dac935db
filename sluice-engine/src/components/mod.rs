//! Component traits: what filters, transformers and analyzers implement.
//!
//! The split mirrors the execution model: per-row work is synchronous CPU
//! work (`evaluate`, `transform`, `process`), while everything around it
//! (reading rows, scheduling, fan-in) is async orchestration owned by the
//! engine. Components take `&self` everywhere; an analyzer that accumulates
//! state does so behind its own interior mutability, and declares through
//! [`Analyzer::concurrent`] whether that state tolerates concurrent calls.
//! For components that do not, the engine serializes calls with a
//! per-component lock; it never locks globally.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::data::{Row, RowLayout, Value};
use crate::error::Result;
use crate::job::{Category, ComponentJob, ComponentKind};
use crate::listener::JobListener;
use crate::sources::Predicate;

/// Handle a component's lifecycle hooks receive.
///
/// Carries the component's own frozen job and a channel to the execution's
/// listener, so components can surface human-readable messages without
/// holding engine internals.
#[derive(Debug, Clone)]
pub struct ComponentContext {
    component: ComponentJob,
    listener: Arc<dyn JobListener>,
}

impl ComponentContext {
    /// Creates a context for one component under one execution's listener.
    pub fn new(component: ComponentJob, listener: Arc<dyn JobListener>) -> Self {
        Self {
            component,
            listener,
        }
    }

    /// The component this context belongs to.
    pub fn component(&self) -> &ComponentJob {
        &self.component
    }

    /// Publishes a message to the execution's listener, attributed to this
    /// component.
    pub fn publish_message(&self, message: impl Into<String>) {
        self.listener
            .on_component_message(&self.component, &message.into());
    }
}

/// Sorts every row into exactly one of its declared categories.
pub trait Filter: fmt::Debug + Send + Sync {
    /// Categorizes one row. The returned category must be one the
    /// component's descriptor declares.
    fn evaluate(&self, row: &Row, layout: &RowLayout) -> Result<Category>;

    /// A source-level predicate equivalent to `category`, if the filter
    /// can be evaluated by the source instead of row by row.
    ///
    /// Returning `Some` marks the filter query-optimizable for that
    /// category; the default is not optimizable.
    fn pushdown_predicate(&self, category: &Category) -> Option<Predicate> {
        let _ = category;
        None
    }

    /// Whether concurrent `evaluate` calls are safe. Filters are
    /// typically stateless, so the default is safe.
    fn concurrent(&self) -> bool {
        true
    }

    /// Called once before the first row of an execution.
    fn initialize(&self, ctx: &ComponentContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called once after the last row, also on failed executions.
    fn close(&self, ctx: &ComponentContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }
}

/// Derives new values from a row, fanning it out or swallowing it.
pub trait Transformer: fmt::Debug + Send + Sync {
    /// Transforms one row. Each [`TransformOutput::push`] emits one set of
    /// output column values, which becomes an independent downstream
    /// continuation; pushing nothing swallows the row.
    fn transform(&self, row: &Row, layout: &RowLayout, output: &mut TransformOutput)
        -> Result<()>;

    /// Whether concurrent `transform` calls are safe.
    fn concurrent(&self) -> bool {
        true
    }

    /// Called once before the first row of an execution.
    fn initialize(&self, ctx: &ComponentContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called once after the last row, also on failed executions.
    fn close(&self, ctx: &ComponentContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }
}

/// Accumulates state across rows and produces a result once the table is
/// exhausted.
pub trait Analyzer: fmt::Debug + Send + Sync {
    /// Folds one row into the analyzer's accumulated state.
    fn process(&self, row: &Row, layout: &RowLayout) -> Result<()>;

    /// Produces the result from the accumulated state. Called once, after
    /// every row task has completed.
    fn collect(&self) -> Result<AnalyzerResult>;

    /// Whether concurrent `process` calls are safe. Accumulation is
    /// stateful, so the default is unsafe and the engine serializes calls.
    fn concurrent(&self) -> bool {
        false
    }

    /// Called once before the first row of an execution.
    fn initialize(&self, ctx: &ComponentContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called once after the last row, also on failed executions.
    fn close(&self, ctx: &ComponentContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }
}

/// Collects the value sets a transformer emits for one input row.
#[derive(Debug, Default)]
pub struct TransformOutput {
    batches: Vec<Vec<Value>>,
}

impl TransformOutput {
    /// Creates an empty output collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits one set of output column values, in the transformer's
    /// declared output column order.
    pub fn push(&mut self, values: Vec<Value>) {
        self.batches.push(values);
    }

    /// The emitted value sets, in emission order.
    pub fn batches(&self) -> &[Vec<Value>] {
        &self.batches
    }

    /// Number of emitted value sets.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Checks if the row was swallowed.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub(crate) fn into_batches(self) -> Vec<Vec<Value>> {
        self.batches
    }
}

/// The result an analyzer produces: named metrics plus an optional
/// human-readable summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyzerResult {
    metrics: BTreeMap<String, Value>,
    summary: Option<String>,
}

impl AnalyzerResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a metric, builder style.
    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }

    /// Sets the human-readable summary, builder style.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Adds or replaces a metric.
    pub fn set_metric(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.metrics.insert(name.into(), value.into());
    }

    /// The value of a named metric.
    pub fn metric(&self, name: &str) -> Option<&Value> {
        self.metrics.get(name)
    }

    /// All metrics, sorted by name.
    pub fn metrics(&self) -> &BTreeMap<String, Value> {
        &self.metrics
    }

    /// The human-readable summary, if the analyzer set one.
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Checks if the result carries neither metrics nor a summary.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.summary.is_none()
    }
}

impl fmt::Display for AnalyzerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(summary) = &self.summary {
            return write!(f, "{summary}");
        }
        for (i, (name, value)) in self.metrics.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// A runnable component as handed back by a [`ComponentFactory`].
///
/// [`ComponentFactory`]: crate::job::ComponentFactory
#[derive(Debug, Clone)]
pub enum ComponentInstance {
    /// A filter instance.
    Filter(Arc<dyn Filter>),
    /// A transformer instance.
    Transformer(Arc<dyn Transformer>),
    /// An analyzer instance.
    Analyzer(Arc<dyn Analyzer>),
}

impl ComponentInstance {
    /// The kind of the wrapped instance.
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentInstance::Filter(_) => ComponentKind::Filter,
            ComponentInstance::Transformer(_) => ComponentKind::Transformer,
            ComponentInstance::Analyzer(_) => ComponentKind::Analyzer,
        }
    }

    /// Whether the instance tolerates concurrent per-row calls.
    pub fn concurrent(&self) -> bool {
        match self {
            ComponentInstance::Filter(filter) => filter.concurrent(),
            ComponentInstance::Transformer(transformer) => transformer.concurrent(),
            ComponentInstance::Analyzer(analyzer) => analyzer.concurrent(),
        }
    }

    pub(crate) fn initialize(&self, ctx: &ComponentContext) -> Result<()> {
        match self {
            ComponentInstance::Filter(filter) => filter.initialize(ctx),
            ComponentInstance::Transformer(transformer) => transformer.initialize(ctx),
            ComponentInstance::Analyzer(analyzer) => analyzer.initialize(ctx),
        }
    }

    pub(crate) fn close(&self, ctx: &ComponentContext) -> Result<()> {
        match self {
            ComponentInstance::Filter(filter) => filter.close(ctx),
            ComponentInstance::Transformer(transformer) => transformer.close(ctx),
            ComponentInstance::Analyzer(analyzer) => analyzer.close(ctx),
        }
    }
}

impl From<Arc<dyn Filter>> for ComponentInstance {
    fn from(filter: Arc<dyn Filter>) -> Self {
        ComponentInstance::Filter(filter)
    }
}

impl From<Arc<dyn Transformer>> for ComponentInstance {
    fn from(transformer: Arc<dyn Transformer>) -> Self {
        ComponentInstance::Transformer(transformer)
    }
}

impl From<Arc<dyn Analyzer>> for ComponentInstance {
    fn from(analyzer: Arc<dyn Analyzer>) -> Self {
        ComponentInstance::Analyzer(analyzer)
    }
}
