//! The per-row processing chain.
//!
//! One chain exists per table; every row task walks it from the first
//! consumer to the last. A consumer whose requirement the row's outcome
//! set does not satisfy is skipped, never failed. Filters append the
//! outcome they produce; transformers replace the current row with zero or
//! more continuations; analyzers observe and pass the row on unchanged.
//!
//! Fan-out is handled with an explicit work list instead of recursion, so
//! a transformer emitting thousands of continuations costs heap, not
//! stack. Each continuation carries its own copy of the outcome set:
//! outcomes appended on one branch are invisible to its siblings.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::components::{ComponentInstance, TransformOutput};
use crate::data::{Row, RowId, RowIdAllocator, RowLayout};
use crate::error::EngineError;
use crate::job::{ComponentId, ComponentJob, FilterOutcome, OutcomeSet};

use super::consumer::RowConsumer;

/// A row-level failure, attributed to the consumer and row that produced
/// it. The pipeline turns these into listener events and sink reports.
#[derive(Debug)]
pub(crate) struct ChainError {
    pub(crate) component: ComponentId,
    pub(crate) row: RowId,
    pub(crate) error: EngineError,
}

/// A row that reached the end of the chain, with every outcome appended
/// along its branch.
#[derive(Debug)]
pub(crate) struct ProcessedRow {
    pub(crate) row: Row,
    pub(crate) outcomes: OutcomeSet,
}

struct WorkItem {
    row: Row,
    outcomes: OutcomeSet,
    next: usize,
}

/// The ordered consumers of one table, plus everything a row task needs to
/// walk them.
#[derive(Debug)]
pub(crate) struct ConsumerChain {
    consumers: Vec<Arc<RowConsumer>>,
    layout: Arc<RowLayout>,
    allocator: Arc<RowIdAllocator>,
    seeds: Vec<FilterOutcome>,
}

impl ConsumerChain {
    /// `seeds` are outcomes already guaranteed by source-level predicate
    /// push-down; every row starts with them.
    pub(crate) fn new(
        consumers: Vec<Arc<RowConsumer>>,
        layout: Arc<RowLayout>,
        allocator: Arc<RowIdAllocator>,
        seeds: Vec<FilterOutcome>,
    ) -> Self {
        Self {
            consumers,
            layout,
            allocator,
            seeds,
        }
    }

    pub(crate) fn consumers(&self) -> &[Arc<RowConsumer>] {
        &self.consumers
    }

    pub(crate) fn layout(&self) -> &Arc<RowLayout> {
        &self.layout
    }

    pub(crate) fn job_of(&self, id: ComponentId) -> Option<&ComponentJob> {
        self.consumers
            .iter()
            .map(|consumer| consumer.job())
            .find(|job| job.id() == id)
    }

    /// Runs `row` and every continuation it fans out into through the
    /// chain. The first failure aborts the whole row, dropping any
    /// branches still queued.
    pub(crate) async fn process(&self, row: Row) -> Result<Vec<ProcessedRow>, ChainError> {
        let origin = row.id();
        let mut work = VecDeque::new();
        work.push_back(WorkItem {
            row,
            outcomes: OutcomeSet::seeded(self.seeds.iter().cloned()),
            next: 0,
        });
        let mut finished = Vec::new();

        while let Some(item) = work.pop_front() {
            let WorkItem {
                mut row,
                mut outcomes,
                next,
            } = item;
            let mut index = next;

            loop {
                let Some(consumer) = self.consumers.get(index) else {
                    finished.push(ProcessedRow { row, outcomes });
                    break;
                };
                if !consumer.job().requirement().is_satisfied(&outcomes) {
                    index += 1;
                    continue;
                }

                let _guard = consumer.guard().await;
                match consumer.instance() {
                    ComponentInstance::Filter(filter) => {
                        let category = filter
                            .evaluate(&row, &self.layout)
                            .map_err(|err| self.wrap(consumer, row.id(), err))?;
                        let outcome = consumer
                            .job()
                            .outcomes()
                            .iter()
                            .find(|candidate| candidate.category() == &category)
                            .ok_or_else(|| ChainError {
                                component: consumer.job().id(),
                                row: row.id(),
                                error: EngineError::row_processing(
                                    consumer.job().name(),
                                    row.id(),
                                    format!("produced undeclared category '{category}'"),
                                ),
                            })?;
                        outcomes.insert(outcome.clone());
                        index += 1;
                    }
                    ComponentInstance::Transformer(transformer) => {
                        let mut output = TransformOutput::new();
                        transformer
                            .transform(&row, &self.layout, &mut output)
                            .map_err(|err| self.wrap(consumer, row.id(), err))?;
                        let batches = output.into_batches();
                        if batches.is_empty() {
                            // Swallowed: this branch ends without reaching
                            // the rest of the chain.
                            trace!(row.id = %row.id(), component = %consumer.job().name(), "Row swallowed");
                            break;
                        }

                        let slots = consumer.output_slots();
                        for batch in &batches {
                            if batch.len() != slots.len() {
                                return Err(ChainError {
                                    component: consumer.job().id(),
                                    row: row.id(),
                                    error: EngineError::row_processing(
                                        consumer.job().name(),
                                        row.id(),
                                        format!(
                                            "emitted {} values for {} output columns",
                                            batch.len(),
                                            slots.len()
                                        ),
                                    ),
                                });
                            }
                        }

                        // Extra continuations branch off the pre-transform
                        // row under fresh synthetic ids; the first one
                        // continues in place under the current id.
                        let mut iter = batches.into_iter();
                        let first = match iter.next() {
                            Some(first) => first,
                            None => break,
                        };
                        for batch in iter {
                            let mut branch = row.branch(self.allocator.next_virtual());
                            for (slot, value) in slots.iter().zip(batch) {
                                branch.set_value(*slot, value);
                            }
                            work.push_back(WorkItem {
                                row: branch,
                                outcomes: outcomes.clone(),
                                next: index + 1,
                            });
                        }
                        for (slot, value) in slots.iter().zip(first) {
                            row.set_value(*slot, value);
                        }
                        index += 1;
                    }
                    ComponentInstance::Analyzer(analyzer) => {
                        analyzer
                            .process(&row, &self.layout)
                            .map_err(|err| self.wrap(consumer, row.id(), err))?;
                        index += 1;
                    }
                }
            }
        }

        trace!(row.id = %origin, branches = finished.len(), "Row completed");
        Ok(finished)
    }

    fn wrap(&self, consumer: &RowConsumer, row: RowId, err: EngineError) -> ChainError {
        ChainError {
            component: consumer.job().id(),
            row,
            error: EngineError::row_processing_with_source(
                consumer.job().name(),
                row,
                Box::new(err),
            ),
        }
    }
}
