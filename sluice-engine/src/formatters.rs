//! Result formatting and reporting for finished jobs.
//!
//! This module provides different formatters for job outcomes, allowing
//! users to output results in various formats like JSON, human-readable
//! text, or Markdown for documentation purposes.
//!
//! # Examples
//!
//! ```rust
//! use sluice_engine::formatters::{HumanFormatter, JsonFormatter, ResultFormatter};
//!
//! let formatter = HumanFormatter::new();
//! // let outcome = handle.outcome().await;
//! // let output = formatter.format(&outcome)?;
//! ```

use crate::data::Value;
use crate::engine::JobOutcome;
use crate::error::{EngineError, ErrorReport, Result};

/// Configuration options for formatting job outcomes.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Include analyzer metrics in output
    pub include_metrics: bool,
    /// Include individual error details
    pub include_errors: bool,
    /// Maximum number of errors to display (-1 for all)
    pub max_errors: i32,
    /// Whether to use colorized output (for human formatter)
    pub use_colors: bool,
    /// Whether to include timestamps in output
    pub include_timestamps: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            include_metrics: true,
            include_errors: true,
            max_errors: -1, // Show all errors by default
            use_colors: true,
            include_timestamps: true,
        }
    }
}

impl FormatterConfig {
    /// Creates a minimal configuration showing only the status and metrics.
    pub fn minimal() -> Self {
        Self {
            include_metrics: true,
            include_errors: false,
            max_errors: 0,
            use_colors: false,
            include_timestamps: false,
        }
    }

    /// Creates a detailed configuration showing everything.
    pub fn detailed() -> Self {
        Self {
            include_metrics: true,
            include_errors: true,
            max_errors: -1,
            use_colors: true,
            include_timestamps: true,
        }
    }

    /// Creates a configuration suitable for CI/CD environments.
    pub fn ci() -> Self {
        Self {
            include_metrics: true,
            include_errors: true,
            max_errors: 50, // Limit output in CI
            use_colors: false,
            include_timestamps: true,
        }
    }

    /// Sets whether to include analyzer metrics.
    pub fn with_metrics(mut self, include: bool) -> Self {
        self.include_metrics = include;
        self
    }

    /// Sets whether to include individual errors.
    pub fn with_errors(mut self, include: bool) -> Self {
        self.include_errors = include;
        self
    }

    /// Sets the maximum number of errors to display.
    pub fn with_max_errors(mut self, max: i32) -> Self {
        self.max_errors = max;
        self
    }

    /// Sets whether to use colorized output.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }
}

/// Trait for formatting job outcomes into different output formats.
///
/// # Examples
///
/// ```rust
/// use sluice_engine::engine::JobOutcome;
/// use sluice_engine::formatters::ResultFormatter;
///
/// struct MyCustomFormatter;
///
/// impl ResultFormatter for MyCustomFormatter {
///     fn format(&self, outcome: &JobOutcome) -> sluice_engine::error::Result<String> {
///         let success = outcome.is_success();
///         Ok(format!("Custom format: {success}"))
///     }
/// }
/// ```
pub trait ResultFormatter {
    /// Formats a job outcome into a string representation.
    fn format(&self, outcome: &JobOutcome) -> Result<String>;

    /// Formats a job outcome with custom configuration.
    fn format_with_config(
        &self,
        outcome: &JobOutcome,
        _config: &FormatterConfig,
    ) -> Result<String> {
        // Default implementation ignores config and uses standard format
        self.format(outcome)
    }
}

/// Formats job outcomes as structured JSON.
///
/// This formatter outputs the complete outcome as JSON, making it
/// suitable for programmatic consumption and integration with other
/// tools.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    config: FormatterConfig,
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter with default configuration.
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            pretty: true,
        }
    }

    /// Creates a new JSON formatter with the specified configuration.
    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            pretty: true,
        }
    }

    /// Sets whether to use pretty-printed JSON.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultFormatter for JsonFormatter {
    fn format(&self, outcome: &JobOutcome) -> Result<String> {
        self.format_with_config(outcome, &self.config)
    }

    fn format_with_config(
        &self,
        outcome: &JobOutcome,
        config: &FormatterConfig,
    ) -> Result<String> {
        let view = outcome_view(outcome, config);
        if self.pretty {
            serde_json::to_string_pretty(&view).map_err(|e| {
                EngineError::Serialization(format!("failed to serialize outcome to JSON: {e}"))
            })
        } else {
            serde_json::to_string(&view).map_err(|e| {
                EngineError::Serialization(format!("failed to serialize outcome to JSON: {e}"))
            })
        }
    }
}

/// Formats job outcomes in a human-readable format suitable for console
/// output.
///
/// Creates nicely formatted, optionally colorized output that is easy to
/// read in terminals and logs, with the status, analyzer metrics and
/// error details.
#[derive(Debug, Clone)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    /// Creates a new human formatter with default configuration.
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
        }
    }

    /// Creates a new human formatter with the specified configuration.
    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultFormatter for HumanFormatter {
    fn format(&self, outcome: &JobOutcome) -> Result<String> {
        self.format_with_config(outcome, &self.config)
    }

    fn format_with_config(
        &self,
        outcome: &JobOutcome,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut output = String::new();

        // Header
        output.push('\n');
        if outcome.is_success() {
            if config.use_colors {
                output.push_str("✅ \x1b[32mJob PASSED\x1b[0m\n");
            } else {
                output.push_str("✅ Job PASSED\n");
            }
        } else if config.use_colors {
            output.push_str("❌ \x1b[31mJob FAILED\x1b[0m\n");
        } else {
            output.push_str("❌ Job FAILED\n");
        }

        let metadata = outcome.metadata();
        if config.include_timestamps {
            output.push('\n');
            output.push_str(&format!("Started: {}\n", metadata.started_at()));
            if let Some(finished) = metadata.finished_at() {
                output.push_str(&format!("Finished: {finished}\n"));
            }
        }
        if let Some(duration) = metadata.duration() {
            output.push_str(&format!("Duration: {}ms\n", duration.as_millis()));
        }

        // Analyzer metrics
        if config.include_metrics && !outcome.results().is_empty() {
            output.push('\n');
            output.push_str("📊 Analyzer Results:\n");
            for analyzer in outcome.results().iter() {
                output.push_str(&format!(
                    "   {} (table '{}')\n",
                    analyzer.component(),
                    analyzer.table()
                ));
                for (name, value) in analyzer.result().metrics() {
                    output.push_str(&format!("      {name}: {value}\n"));
                }
                if let Some(summary) = analyzer.result().summary() {
                    output.push_str(&format!("      {summary}\n"));
                }
            }
        }

        // Errors
        if config.include_errors && !outcome.errors().is_empty() {
            output.push('\n');
            output.push_str("🔍 Errors:\n");

            let errors_to_show = clip_errors(outcome.errors(), config.max_errors);
            for (i, report) in errors_to_show.iter().enumerate() {
                output.push('\n');
                let symbol = if config.use_colors {
                    "\x1b[31m🚨\x1b[0m"
                } else {
                    "🚨"
                };
                output.push_str(&format!(
                    "   {symbol} Error #{} [{}]\n",
                    i + 1,
                    report.error.kind()
                ));
                if let Some(component) = &report.component {
                    output.push_str(&format!("      Component: {component}\n"));
                }
                if let Some(row) = report.row {
                    output.push_str(&format!("      Row: {row}\n"));
                }
                output.push_str(&format!("      Message: {}\n", report.error));
            }

            if outcome.errors().len() > errors_to_show.len() {
                output.push('\n');
                output.push_str(&format!(
                    "   ... and {} more errors\n",
                    outcome.errors().len() - errors_to_show.len()
                ));
            }
        }

        output.push('\n');
        Ok(output)
    }
}

/// Formats job outcomes as Markdown suitable for documentation.
///
/// Creates Markdown output that can be included in reports, documentation,
/// or README files, with a configurable base heading level.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    config: FormatterConfig,
    heading_level: u8,
}

impl MarkdownFormatter {
    /// Creates a new Markdown formatter with default configuration.
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            heading_level: 2,
        }
    }

    /// Creates a new Markdown formatter with the specified configuration.
    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            heading_level: 2,
        }
    }

    /// Sets the base heading level for the output.
    pub fn with_heading_level(mut self, level: u8) -> Self {
        self.heading_level = level.clamp(1, 6);
        self
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultFormatter for MarkdownFormatter {
    fn format(&self, outcome: &JobOutcome) -> Result<String> {
        self.format_with_config(outcome, &self.config)
    }

    fn format_with_config(
        &self,
        outcome: &JobOutcome,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut output = String::new();
        let h = "#".repeat(self.heading_level as usize);

        // Main heading
        if outcome.is_success() {
            output.push_str(&format!("{h} ✅ Job Report - PASSED\n"));
        } else {
            output.push_str(&format!("{h} ❌ Job Report - FAILED\n"));
        }

        let metadata = outcome.metadata();
        if config.include_timestamps {
            output.push('\n');
            output.push_str(&format!("**Started:** {}\n", metadata.started_at()));
            if let Some(finished) = metadata.finished_at() {
                output.push_str(&format!("**Finished:** {finished}\n"));
            }
        }

        // Summary table
        output.push('\n');
        output.push_str(&format!("{h}# Summary\n"));
        output.push('\n');
        output.push_str("| Metric | Value |\n");
        output.push_str("|--------|-------|\n");
        output.push_str(&format!("| Analyzers | {} |\n", outcome.results().len()));
        output.push_str(&format!("| Errors | {} |\n", outcome.errors().len()));
        if let Some(duration) = metadata.duration() {
            output.push_str(&format!("| Duration | {}ms |\n", duration.as_millis()));
        }

        // Analyzer metrics
        if config.include_metrics && !outcome.results().is_empty() {
            output.push('\n');
            output.push_str(&format!("{h}# Analyzer Results\n"));
            for analyzer in outcome.results().iter() {
                output.push('\n');
                output.push_str(&format!("{h}## {}\n", analyzer.component()));
                output.push('\n');
                output.push_str(&format!("**Table:** {}\n", analyzer.table()));
                if !analyzer.result().metrics().is_empty() {
                    output.push('\n');
                    output.push_str("| Metric | Value |\n");
                    output.push_str("|--------|-------|\n");
                    for (name, value) in analyzer.result().metrics() {
                        output.push_str(&format!("| {name} | {value} |\n"));
                    }
                }
                if let Some(summary) = analyzer.result().summary() {
                    output.push('\n');
                    output.push_str(&format!("> {summary}\n"));
                }
            }
        }

        // Errors
        if config.include_errors && !outcome.errors().is_empty() {
            output.push('\n');
            output.push_str(&format!("{h}# Errors\n"));

            let errors_to_show = clip_errors(outcome.errors(), config.max_errors);
            for (i, report) in errors_to_show.iter().enumerate() {
                output.push('\n');
                output.push_str(&format!(
                    "{h}## 🚨 Error #{}: {}\n",
                    i + 1,
                    report.error.kind()
                ));
                output.push('\n');
                if let Some(component) = &report.component {
                    output.push_str(&format!("- **Component:** {component}\n"));
                }
                if let Some(row) = report.row {
                    output.push_str(&format!("- **Row:** {row}\n"));
                }
                output.push_str(&format!("- **Message:** {}\n", report.error));
            }

            if outcome.errors().len() > errors_to_show.len() {
                output.push('\n');
                output.push_str(&format!(
                    "> **Note:** {} additional errors not shown in this report.\n",
                    outcome.errors().len() - errors_to_show.len()
                ));
            }
        }

        Ok(output)
    }
}

/// Builds the JSON representation of an outcome, honoring the
/// configuration.
fn outcome_view(outcome: &JobOutcome, config: &FormatterConfig) -> serde_json::Value {
    let mut root = serde_json::Map::new();
    root.insert(
        "status".to_string(),
        serde_json::json!(if outcome.is_success() {
            "success"
        } else {
            "failure"
        }),
    );

    let metadata = outcome.metadata();
    if config.include_timestamps {
        root.insert(
            "started_at".to_string(),
            serde_json::json!(metadata.started_at().to_rfc3339()),
        );
        if let Some(finished) = metadata.finished_at() {
            root.insert(
                "finished_at".to_string(),
                serde_json::json!(finished.to_rfc3339()),
            );
        }
    }
    if let Some(duration) = metadata.duration() {
        root.insert(
            "duration_ms".to_string(),
            serde_json::json!(duration.as_millis() as u64),
        );
    }

    if config.include_metrics {
        let analyzers: Vec<serde_json::Value> = outcome
            .results()
            .iter()
            .map(|analyzer| {
                let metrics: serde_json::Map<String, serde_json::Value> = analyzer
                    .result()
                    .metrics()
                    .iter()
                    .map(|(name, value)| (name.clone(), plain_json(value)))
                    .collect();
                let mut entry = serde_json::Map::new();
                entry.insert(
                    "component".to_string(),
                    serde_json::json!(analyzer.component()),
                );
                entry.insert("table".to_string(), serde_json::json!(analyzer.table()));
                entry.insert("metrics".to_string(), serde_json::Value::Object(metrics));
                if let Some(summary) = analyzer.result().summary() {
                    entry.insert("summary".to_string(), serde_json::json!(summary));
                }
                serde_json::Value::Object(entry)
            })
            .collect();
        root.insert("analyzers".to_string(), serde_json::json!(analyzers));
    }

    if config.include_errors {
        let errors_to_show = clip_errors(outcome.errors(), config.max_errors);
        let errors: Vec<serde_json::Value> = errors_to_show
            .iter()
            .map(|report| {
                let mut entry = serde_json::Map::new();
                entry.insert("kind".to_string(), serde_json::json!(report.error.kind()));
                if let Some(component) = &report.component {
                    entry.insert("component".to_string(), serde_json::json!(component));
                }
                if let Some(row) = report.row {
                    entry.insert("row".to_string(), serde_json::json!(row.value()));
                }
                entry.insert(
                    "message".to_string(),
                    serde_json::json!(report.error.to_string()),
                );
                serde_json::Value::Object(entry)
            })
            .collect();
        root.insert("errors".to_string(), serde_json::json!(errors));
        if outcome.errors().len() > errors_to_show.len() {
            root.insert(
                "errors_omitted".to_string(),
                serde_json::json!(outcome.errors().len() - errors_to_show.len()),
            );
        }
    }

    serde_json::Value::Object(root)
}

/// Maps an engine value to the plain JSON value it reads as, rather than
/// the tagged enum encoding.
fn plain_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(flag) => serde_json::json!(flag),
        Value::Integer(number) => serde_json::json!(number),
        Value::Float(number) => serde_json::json!(number),
        Value::Text(text) => serde_json::json!(text),
        Value::Timestamp(instant) => serde_json::json!(instant.to_rfc3339()),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(plain_json).collect())
        }
    }
}

fn clip_errors(errors: &[ErrorReport], max: i32) -> &[ErrorReport] {
    if max < 0 {
        errors
    } else {
        &errors[..std::cmp::min(max as usize, errors.len())]
    }
}
