//! Dependency ordering of a table's consumers.
//!
//! A consumer is ready once every filter outcome its requirement names is
//! producible and every virtual column it reads has its producer already
//! placed. Ready consumers are moved into the ordered chain in repeated
//! passes until the set is empty; ties within a pass keep builder
//! insertion order. A pass that places nothing means the remaining
//! consumers can never run, which is fatal for the job.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::job::{ComponentId, ComponentJob, FilterOutcome};

/// Orders `components` so that every consumer comes after the producers it
/// depends on.
pub(crate) fn order_consumers(components: &[ComponentJob]) -> Result<Vec<ComponentJob>> {
    let mut remaining: Vec<ComponentJob> = components.to_vec();
    let mut ordered: Vec<ComponentJob> = Vec::with_capacity(components.len());
    let mut placed: HashSet<ComponentId> = HashSet::new();
    let mut producible: HashSet<FilterOutcome> = HashSet::new();

    while !remaining.is_empty() {
        let before = ordered.len();
        remaining.retain(|job| {
            if is_ready(job, &placed, &producible) {
                placed.insert(job.id());
                for outcome in job.outcomes() {
                    producible.insert(outcome.clone());
                }
                ordered.push(job.clone());
                false
            } else {
                true
            }
        });

        if ordered.len() == before {
            let stuck: Vec<String> = remaining.iter().map(|job| job.name().to_string()).collect();
            return Err(EngineError::unsatisfiable_ordering(stuck));
        }
    }

    debug!(
        consumers = ordered.len(),
        "Ordered consumer chain: {}",
        ordered
            .iter()
            .map(|job| job.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    Ok(ordered)
}

fn is_ready(
    job: &ComponentJob,
    placed: &HashSet<ComponentId>,
    producible: &HashSet<FilterOutcome>,
) -> bool {
    let requirement_ready = job
        .requirement()
        .outcomes()
        .iter()
        .all(|outcome| producible.contains(outcome));
    let inputs_ready = job
        .input_columns()
        .iter()
        .filter_map(|column| column.producer())
        .all(|producer| placed.contains(&producer));
    requirement_ready && inputs_ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataType, SourceColumn};
    use crate::job::{JobBuilder, PropertyValue, Requirement};
    use crate::test_fixtures::{
        name_splitter_descriptor, threshold_filter_descriptor, value_collector_descriptor,
    };

    #[test]
    fn test_consumer_follows_its_producers() {
        let mut builder = JobBuilder::new();
        let name = builder.add_source_column(SourceColumn::new("people", "name", DataType::Text));
        let age = builder.add_source_column(SourceColumn::new("people", "age", DataType::Integer));

        // Declared in the reverse of their dependency order.
        let analyzer = builder
            .add_analyzer(value_collector_descriptor())
            .unwrap();
        let splitter = builder
            .add_transformer(name_splitter_descriptor())
            .unwrap();
        let filter = builder
            .add_filter(threshold_filter_descriptor())
            .unwrap();

        builder
            .set_property(filter, "column", PropertyValue::Column(age.into()))
            .unwrap();
        builder.set_property(filter, "threshold", 18i64).unwrap();
        builder
            .set_property(splitter, "column", PropertyValue::Column(name.into()))
            .unwrap();
        let first = builder.output_column(splitter, "first").unwrap();
        builder
            .set_property(analyzer, "columns", PropertyValue::ColumnList(vec![first]))
            .unwrap();
        let high = builder.outcome(filter, "HIGH").unwrap();
        builder
            .set_requirement(splitter, Requirement::Outcome(high))
            .unwrap();

        let job = builder.build().unwrap();
        let ordered = order_consumers(job.components()).unwrap();
        let names: Vec<&str> = ordered.iter().map(|j| j.name()).collect();
        assert_eq!(names, vec!["threshold_filter", "name_splitter", "value_collector"]);
    }

    #[test]
    fn test_insertion_order_breaks_ties() {
        let mut builder = JobBuilder::new();
        let age = builder.add_source_column(SourceColumn::new("people", "age", DataType::Integer));
        let a = builder
            .add_analyzer(value_collector_descriptor())
            .unwrap();
        let b = builder
            .add_analyzer(value_collector_descriptor())
            .unwrap();
        for id in [a, b] {
            builder
                .set_property(
                    id,
                    "columns",
                    PropertyValue::ColumnList(vec![age.clone().into()]),
                )
                .unwrap();
        }

        let job = builder.build().unwrap();
        let ordered = order_consumers(job.components()).unwrap();
        assert_eq!(ordered[0].id(), a);
        assert_eq!(ordered[1].id(), b);
    }

    #[test]
    fn test_mutual_requirements_stall_with_names() {
        let mut builder = JobBuilder::new();
        let age = builder.add_source_column(SourceColumn::new("people", "age", DataType::Integer));
        let first = builder
            .add_filter(threshold_filter_descriptor())
            .unwrap();
        let second = builder
            .add_filter(threshold_filter_descriptor())
            .unwrap();
        for id in [first, second] {
            builder
                .set_property(id, "column", PropertyValue::Column(age.clone().into()))
                .unwrap();
            builder.set_property(id, "threshold", 10i64).unwrap();
        }
        let high_of_second = builder.outcome(second, "HIGH").unwrap();
        let high_of_first = builder.outcome(first, "HIGH").unwrap();
        builder
            .set_requirement(first, Requirement::Outcome(high_of_second))
            .unwrap();
        builder
            .set_requirement(second, Requirement::Outcome(high_of_first))
            .unwrap();

        let job = builder.build().unwrap();
        let err = order_consumers(job.components()).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("threshold_filter"));
    }
}
