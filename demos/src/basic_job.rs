//! Basic job example demonstrating Sluice's core functionality.
//!
//! This example shows how to:
//! - Declare source columns and compose a job from a filter and analyzers
//! - Gate analyzers on filter outcomes
//! - Run the job and interpret the analyzer results
//!
//! Run with:
//! ```bash
//! cargo run --example basic_job
//! ```

use std::sync::Arc;

use sluice_engine::data::{DataType, InputColumn, SourceColumn, Value};
use sluice_engine::engine::{JobRunner, RunnerConfig};
use sluice_engine::formatters::{FormatterConfig, HumanFormatter, ResultFormatter};
use sluice_engine::job::{JobBuilder, Requirement};
use sluice_engine::sources::MemorySource;
use sluice_engine::test_fixtures::{
    threshold_filter_descriptor, value_collector_descriptor, FixtureFactory,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A small customers table held entirely in memory.
    let columns = vec![
        SourceColumn::new("customers", "id", DataType::Integer).with_primary_key(),
        SourceColumn::new("customers", "name", DataType::Text),
        SourceColumn::new("customers", "age", DataType::Integer),
    ];
    let rows = vec![
        vec![Value::Integer(1), Value::from("Alice Johnson"), Value::Integer(28)],
        vec![Value::Integer(2), Value::from("Bob Smith"), Value::Integer(35)],
        vec![Value::Integer(3), Value::from("Carol Davis"), Value::Integer(42)],
        vec![Value::Integer(4), Value::from("David Wilson"), Value::Integer(17)],
        vec![Value::Integer(5), Value::from("Eve Brown"), Value::Null],
        vec![Value::Integer(6), Value::from("Frank Miller"), Value::Integer(64)],
    ];
    let source = MemorySource::new().with_table("customers", columns.clone(), rows);

    println!("Running basic job example...\n");

    // Declare the job: one filter sorting rows around an age threshold,
    // and one collector per outcome counting what ends up on each side.
    let mut builder = JobBuilder::new();
    let name = builder.add_source_column(columns[1].clone());
    let age = builder.add_source_column(columns[2].clone());

    let threshold = builder.add_filter(threshold_filter_descriptor())?;
    builder.set_property(threshold, "column", InputColumn::from(age))?;
    builder.set_property(threshold, "threshold", 18i64)?;
    let adult = builder.outcome(threshold, "HIGH")?;
    let minor = builder.outcome(threshold, "LOW")?;

    let adults = builder.add_analyzer(value_collector_descriptor())?;
    builder.set_property(adults, "columns", vec![InputColumn::from(name.clone())])?;
    builder.set_requirement(adults, Requirement::Outcome(adult))?;
    builder.set_name(adults, "adults")?;

    let minors = builder.add_analyzer(value_collector_descriptor())?;
    builder.set_property(minors, "columns", vec![InputColumn::from(name)])?;
    builder.set_requirement(minors, Requirement::Outcome(minor))?;
    builder.set_name(minors, "minors")?;

    let job = builder.build()?;

    // Run it. The factory resolves descriptors to runnable components.
    let runner = JobRunner::new(Arc::new(FixtureFactory::new()))
        .with_config(RunnerConfig::new().with_worker_capacity(4));
    let handle = runner.run(job, Arc::new(source));
    let outcome = handle.outcome().await;

    // Display the outcome.
    let formatter = HumanFormatter::new();
    let config = FormatterConfig::default().with_colors(false);
    println!("{}", formatter.format_with_config(&outcome, &config)?);

    for analyzer in outcome.results().iter() {
        println!(
            "{} counted {} rows",
            analyzer.component(),
            analyzer
                .result()
                .metric("rows")
                .map(ToString::to_string)
                .unwrap_or_else(|| "?".to_string()),
        );
    }

    Ok(())
}
