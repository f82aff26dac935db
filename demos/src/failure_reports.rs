//! Failure handling and report formatting example.
//!
//! This example runs a job that fails on two specific rows, then shows
//! what the engine preserves: the partial analyzer results, the collected
//! error reports, and the same outcome rendered by the human, JSON and
//! Markdown formatters.
//!
//! Run with:
//! ```bash
//! cargo run --example failure_reports
//! ```

use std::sync::Arc;

use sluice_engine::data::{DataType, InputColumn, SourceColumn, Value};
use sluice_engine::engine::{JobRunner, RunnerConfig};
use sluice_engine::formatters::{
    FormatterConfig, HumanFormatter, JsonFormatter, MarkdownFormatter, ResultFormatter,
};
use sluice_engine::job::JobBuilder;
use sluice_engine::sources::MemorySource;
use sluice_engine::test_fixtures::{value_collector_descriptor, FixtureFactory};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let name_column = SourceColumn::new("orders", "customer", DataType::Text);
    let source = MemorySource::new().with_table(
        "orders",
        vec![name_column.clone()],
        vec![
            vec![Value::from("Alice")],
            vec![Value::from("poison")],
            vec![Value::from("Bob")],
            vec![Value::from("poison")],
            vec![Value::from("Carol")],
        ],
    );

    // The collector is configured to fail on any row carrying "poison".
    let mut builder = JobBuilder::new();
    let customer = builder.add_source_column(name_column);
    let collector = builder.add_analyzer(value_collector_descriptor())?;
    builder.set_property(collector, "columns", vec![InputColumn::from(customer)])?;
    builder.set_property(collector, "fail_when", "poison")?;
    let job = builder.build()?;

    println!("Running failure reporting example...\n");

    // Rows are fed one at a time so both poisoned rows are reached before
    // error handling stops new submissions.
    let runner = JobRunner::new(Arc::new(FixtureFactory::new()))
        .with_config(RunnerConfig::new().with_worker_capacity(1));
    let handle = runner.run(job, Arc::new(source));

    // results() turns any collected error into the aggregate failure...
    match handle.results().await {
        Ok(_) => println!("unexpectedly succeeded"),
        Err(error) => println!("results() returned the aggregate:\n  {error}\n"),
    }

    // ...while outcome() keeps everything: partial results and each report.
    let outcome = handle.outcome().await;
    println!("Job succeeded: {}", outcome.is_success());
    println!("Errors collected: {}", outcome.errors().len());
    if let Some(result) = outcome.results().analyzer("value_collector") {
        println!(
            "Rows collected before and around the failures: {}\n",
            result
                .metric("rows")
                .map(ToString::to_string)
                .unwrap_or_else(|| "?".to_string()),
        );
    }

    let config = FormatterConfig::default().with_colors(false);

    println!("{}", "=".repeat(60));
    println!("Human-readable report:");
    println!(
        "{}",
        HumanFormatter::new().format_with_config(&outcome, &config)?
    );

    println!("{}", "=".repeat(60));
    println!("JSON report:\n");
    println!(
        "{}\n",
        JsonFormatter::new().format_with_config(&outcome, &config)?
    );

    println!("{}", "=".repeat(60));
    println!("Markdown report:\n");
    println!(
        "{}",
        MarkdownFormatter::new().format_with_config(&outcome, &config)?
    );

    Ok(())
}
