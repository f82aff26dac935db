//! Integration tests for the job builder: graph assembly, property and
//! requirement validation, and the freeze into an immutable job.

use std::sync::Arc;

use sluice_engine::data::{DataType, InputColumn, SourceColumn};
use sluice_engine::error::EngineError;
use sluice_engine::job::{
    Category, ComponentId, ComponentKind, FilterOutcome, JobBuilder, Requirement,
};
use sluice_engine::test_fixtures::{
    name_splitter_descriptor, pattern_filter_descriptor, threshold_filter_descriptor,
    value_collector_descriptor,
};

/// Declares the people table and returns handles to (id, name, age).
fn declare_people(
    builder: &mut JobBuilder,
) -> (Arc<SourceColumn>, Arc<SourceColumn>, Arc<SourceColumn>) {
    let id = builder.add_source_column(
        SourceColumn::new("people", "id", DataType::Integer).with_primary_key(),
    );
    let name = builder.add_source_column(SourceColumn::new("people", "name", DataType::Text));
    let age = builder.add_source_column(SourceColumn::new("people", "age", DataType::Integer));
    (id, name, age)
}

#[test]
fn test_mixed_graph_freezes_into_job() {
    let mut builder = JobBuilder::new();
    let (_, name, age) = declare_people(&mut builder);

    // An adult filter, a splitter that only sees adults, and a collector
    // reading one physical and one derived column.
    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(adult, "column", InputColumn::from(age))
        .unwrap();
    builder.set_property(adult, "threshold", 18i64).unwrap();
    let high = builder.outcome(adult, "HIGH").unwrap();

    let splitter = builder.add_transformer(name_splitter_descriptor()).unwrap();
    builder
        .set_property(splitter, "column", InputColumn::from(name.clone()))
        .unwrap();
    builder
        .set_requirement(splitter, Requirement::Outcome(high.clone()))
        .unwrap();
    let first = builder.output_column(splitter, "first").unwrap();

    let collector = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(
            collector,
            "columns",
            vec![first.clone(), InputColumn::from(name)],
        )
        .unwrap();
    builder
        .set_requirement(collector, Requirement::Outcome(high.clone()))
        .unwrap();

    assert_eq!(builder.len(), 3);
    let job = builder.build().unwrap();

    assert_eq!(job.len(), 3);
    assert_eq!(job.tables(), vec!["people"]);
    assert_eq!(job.source_columns_for_table("people").len(), 3);

    let frozen_adult = job.component(adult).unwrap();
    assert_eq!(frozen_adult.component_kind(), ComponentKind::Filter);
    assert_eq!(frozen_adult.table(), "people");
    assert_eq!(frozen_adult.outcomes().len(), 2);
    assert!(frozen_adult.requirement().is_none());

    let frozen_splitter = job.component(splitter).unwrap();
    assert!(frozen_splitter.is_transformer());
    assert_eq!(frozen_splitter.output_columns().len(), 2);
    assert_eq!(frozen_splitter.requirement(), &Requirement::Outcome(high.clone()));

    let frozen_collector = job.component(collector).unwrap();
    assert!(frozen_collector.is_analyzer());
    assert_eq!(frozen_collector.table(), "people");
    assert_eq!(frozen_collector.input_columns().len(), 2);
    assert!(frozen_collector.input_columns().contains(&first));
}

#[test]
fn test_registration_rejects_kind_mismatch() {
    let mut builder = JobBuilder::new();

    let err = builder
        .add_filter(value_collector_descriptor())
        .unwrap_err();
    assert!(err.to_string().contains("not filter"));

    let err = builder
        .add_transformer(threshold_filter_descriptor())
        .unwrap_err();
    assert!(err.to_string().contains("not transformer"));

    let err = builder
        .add_analyzer(name_splitter_descriptor())
        .unwrap_err();
    assert!(err.to_string().contains("not analyzer"));

    assert!(builder.is_empty());
}

#[test]
fn test_property_shape_and_name_are_validated() {
    let mut builder = JobBuilder::new();
    let (_, _, age) = declare_people(&mut builder);
    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();

    // Unknown name.
    let err = builder
        .set_property(adult, "no_such_property", 5i64)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnknownProperty { ref property, .. } if property == "no_such_property"
    ));

    // Scalar of the wrong type.
    let err = builder
        .set_property(adult, "threshold", "eighteen")
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::PropertyType { ref property, .. } if property == "threshold"
    ));

    // A scalar where a column is expected.
    let err = builder.set_property(adult, "column", 5i64).unwrap_err();
    assert!(matches!(err, EngineError::PropertyType { .. }));

    // The well-shaped versions go through.
    builder
        .set_property(adult, "column", InputColumn::from(age))
        .unwrap();
    builder.set_property(adult, "threshold", 18i64).unwrap();
    assert_eq!(builder.properties(adult).unwrap().integer("threshold"), Some(18));
}

#[test]
fn test_undeclared_column_is_rejected() {
    let mut builder = JobBuilder::new();
    declare_people(&mut builder);
    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();

    let stray = InputColumn::Physical(Arc::new(SourceColumn::new(
        "people",
        "height",
        DataType::Integer,
    )));
    let err = builder.set_property(adult, "column", stray).unwrap_err();
    assert!(err.to_string().contains("undeclared column"));
}

#[test]
fn test_missing_required_property_fails_the_freeze() {
    let mut builder = JobBuilder::new();
    let (_, _, age) = declare_people(&mut builder);
    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(adult, "column", InputColumn::from(age))
        .unwrap();

    let err = builder.build().unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnconfiguredProperty { ref property, .. } if property == "threshold"
    ));
}

#[test]
fn test_outcome_helper_checks_filter_and_category() {
    let mut builder = JobBuilder::new();
    let (_, _, age) = declare_people(&mut builder);
    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(adult, "column", InputColumn::from(age))
        .unwrap();
    let collector = builder.add_analyzer(value_collector_descriptor()).unwrap();

    // Undeclared category.
    let err = builder.outcome(adult, "MEDIUM").unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequirement(_)));

    // Not a filter at all.
    let err = builder.outcome(collector, "HIGH").unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequirement(_)));

    let high = builder.outcome(adult, "HIGH").unwrap();
    assert_eq!(high.filter(), adult);
    assert_eq!(high.category().as_str(), "HIGH");
}

#[test]
fn test_requirement_cannot_reference_itself_or_strangers() {
    let mut builder = JobBuilder::new();
    let (_, _, age) = declare_people(&mut builder);
    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(adult, "column", InputColumn::from(age))
        .unwrap();
    let high = builder.outcome(adult, "HIGH").unwrap();

    // A filter gated on its own outcome could never run.
    let err = builder
        .set_requirement(adult, Requirement::Outcome(high))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequirement(_)));

    // Outcomes of unregistered components are rejected outright.
    let ghost = FilterOutcome::new(ComponentId::new(9999), Category::new("HIGH"));
    let err = builder
        .set_default_requirement(Requirement::Outcome(ghost))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequirement(_)));
}

#[test]
fn test_default_requirement_spares_its_own_providers() {
    let mut builder = JobBuilder::new();
    let (_, name, age) = declare_people(&mut builder);

    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(adult, "column", InputColumn::from(age))
        .unwrap();
    builder.set_property(adult, "threshold", 18i64).unwrap();
    let high = builder.outcome(adult, "HIGH").unwrap();

    builder
        .set_default_requirement(Requirement::Outcome(high.clone()))
        .unwrap();

    // A later registration picks the default up.
    let named = builder.add_filter(pattern_filter_descriptor()).unwrap();
    builder
        .set_property(named, "column", InputColumn::from(name))
        .unwrap();
    builder.set_property(named, "pattern", "^[A-Z]").unwrap();
    assert_eq!(
        builder.effective_requirement(named).unwrap(),
        Requirement::Outcome(high.clone())
    );

    // The default's own source filter stays unconditional.
    assert_eq!(
        builder.effective_requirement(adult).unwrap(),
        Requirement::None
    );

    // An explicit `None` pins a component against the default.
    builder.set_requirement(named, Requirement::None).unwrap();
    assert_eq!(
        builder.effective_requirement(named).unwrap(),
        Requirement::None
    );

    let job = builder.build().unwrap();
    assert!(job.component(adult).unwrap().requirement().is_none());
    assert!(job.component(named).unwrap().requirement().is_none());
}

#[test]
fn test_removing_a_filter_repoints_its_dependents() {
    let mut builder = JobBuilder::new();
    let (_, name, age) = declare_people(&mut builder);

    // adult -> named -> collector, each gated on its predecessor.
    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(adult, "column", InputColumn::from(age))
        .unwrap();
    builder.set_property(adult, "threshold", 18i64).unwrap();
    let high = builder.outcome(adult, "HIGH").unwrap();

    let named = builder.add_filter(pattern_filter_descriptor()).unwrap();
    builder
        .set_property(named, "column", InputColumn::from(name.clone()))
        .unwrap();
    builder.set_property(named, "pattern", "^[A-Z]").unwrap();
    builder
        .set_requirement(named, Requirement::Outcome(high.clone()))
        .unwrap();
    let matched = builder.outcome(named, "MATCH").unwrap();

    let collector = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(collector, "columns", vec![InputColumn::from(name)])
        .unwrap();
    builder
        .set_requirement(collector, Requirement::Outcome(matched))
        .unwrap();

    // Dropping the middle filter hands its requirement to the collector.
    builder.remove_component(named).unwrap();
    assert_eq!(builder.len(), 2);
    assert_eq!(
        builder.effective_requirement(collector).unwrap(),
        Requirement::Outcome(high.clone())
    );

    let job = builder.build().unwrap();
    assert_eq!(
        job.component(collector).unwrap().requirement(),
        &Requirement::Outcome(high)
    );
}

#[test]
fn test_removing_a_transformer_strips_its_columns() {
    let mut builder = JobBuilder::new();
    let (_, name, _) = declare_people(&mut builder);

    let splitter = builder.add_transformer(name_splitter_descriptor()).unwrap();
    builder
        .set_property(splitter, "column", InputColumn::from(name))
        .unwrap();
    let first = builder.output_column(splitter, "first").unwrap();

    let collector = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(collector, "columns", vec![first])
        .unwrap();

    builder.remove_component(splitter).unwrap();

    // The collector lost its only column and can no longer freeze.
    assert!(!builder.properties(collector).unwrap().contains("columns"));
    let err = builder.build().unwrap_err();
    assert!(matches!(err, EngineError::UnconfiguredProperty { .. }));
}

#[test]
fn test_removing_a_source_column_strips_references() {
    let mut builder = JobBuilder::new();
    let (_, _, age) = declare_people(&mut builder);

    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(adult, "column", InputColumn::from(age.clone()))
        .unwrap();
    builder.set_property(adult, "threshold", 18i64).unwrap();

    assert!(builder.remove_source_column(&age));
    assert!(!builder.remove_source_column(&age));

    assert!(!builder.properties(adult).unwrap().contains("column"));
    assert!(builder.properties(adult).unwrap().contains("threshold"));
    assert_eq!(builder.source_columns().len(), 2);
}

#[test]
fn test_duplicate_source_columns_share_one_handle() {
    let mut builder = JobBuilder::new();
    let first = builder.add_source_column(SourceColumn::new("people", "age", DataType::Integer));
    let second = builder.add_source_column(SourceColumn::new("people", "age", DataType::Integer));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builder.source_columns().len(), 1);
    assert!(builder.source_column("people", "age").is_some());
    assert!(builder.source_column("people", "height").is_none());
}

#[test]
fn test_output_column_helper_checks_transformer_and_name() {
    let mut builder = JobBuilder::new();
    let (_, name, _) = declare_people(&mut builder);

    let splitter = builder.add_transformer(name_splitter_descriptor()).unwrap();
    builder
        .set_property(splitter, "column", InputColumn::from(name))
        .unwrap();
    let collector = builder.add_analyzer(value_collector_descriptor()).unwrap();

    let err = builder.output_column(splitter, "middle").unwrap_err();
    assert!(err.to_string().contains("emits no column"));

    let err = builder.output_column(collector, "first").unwrap_err();
    assert!(err.to_string().contains("not transformer"));

    let last = builder.output_column(splitter, "last").unwrap();
    assert!(last.is_virtual());
    assert_eq!(last.name(), "last");
    assert_eq!(last.data_type(), DataType::Text);
    assert_eq!(last.producer(), Some(splitter));
}

#[test]
fn test_component_reading_two_tables_fails_the_freeze() {
    let mut builder = JobBuilder::new();
    let (_, _, age) = declare_people(&mut builder);
    let total = builder.add_source_column(SourceColumn::new("orders", "total", DataType::Float));

    let collector = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(
            collector,
            "columns",
            vec![InputColumn::from(age), InputColumn::from(total)],
        )
        .unwrap();

    let err = builder.build().unwrap_err();
    assert!(matches!(err, EngineError::CrossTableInput { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_requirement_across_tables_fails_the_freeze() {
    let mut builder = JobBuilder::new();
    let (_, _, age) = declare_people(&mut builder);
    let total = builder.add_source_column(SourceColumn::new("orders", "total", DataType::Float));

    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(adult, "column", InputColumn::from(age))
        .unwrap();
    builder.set_property(adult, "threshold", 18i64).unwrap();
    let high = builder.outcome(adult, "HIGH").unwrap();

    // An orders component cannot wait on a people filter.
    let collector = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(collector, "columns", vec![InputColumn::from(total)])
        .unwrap();
    builder
        .set_requirement(collector, Requirement::Outcome(high))
        .unwrap();

    let err = builder.build().unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequirement(_)));
    assert!(err.to_string().contains("people"));
}

#[test]
fn test_component_without_columns_anchors_through_its_requirement() {
    let mut builder = JobBuilder::new();
    let (_, _, age) = declare_people(&mut builder);

    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(adult, "column", InputColumn::from(age))
        .unwrap();
    builder.set_property(adult, "threshold", 18i64).unwrap();
    let high = builder.outcome(adult, "HIGH").unwrap();

    // No columns configured, only a requirement. The empty list satisfies
    // the required property; the table comes from the gating filter.
    let counter = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(counter, "columns", Vec::<InputColumn>::new())
        .unwrap();
    builder
        .set_requirement(counter, Requirement::Outcome(high))
        .unwrap();

    let job = builder.build().unwrap();
    assert_eq!(job.component(counter).unwrap().table(), "people");
}

#[test]
fn test_component_without_columns_or_requirement_is_unplaceable() {
    let mut builder = JobBuilder::new();
    declare_people(&mut builder);

    let counter = builder.add_analyzer(value_collector_descriptor()).unwrap();
    builder
        .set_property(counter, "columns", Vec::<InputColumn>::new())
        .unwrap();

    let err = builder.build().unwrap_err();
    assert!(err.to_string().contains("consumes no source columns"));
}

#[test]
fn test_instance_names_survive_the_freeze() {
    let mut builder = JobBuilder::new();
    let (_, _, age) = declare_people(&mut builder);

    let adult = builder.add_filter(threshold_filter_descriptor()).unwrap();
    builder
        .set_property(adult, "column", InputColumn::from(age))
        .unwrap();
    builder.set_property(adult, "threshold", 18i64).unwrap();
    builder.set_name(adult, "adults_only").unwrap();

    let job = builder.build().unwrap();
    assert_eq!(job.component(adult).unwrap().name(), "adults_only");
}

#[test]
fn test_empty_builder_freezes_into_empty_job() {
    let job = JobBuilder::new().build().unwrap();
    assert!(job.is_empty());
    assert!(job.tables().is_empty());
}
