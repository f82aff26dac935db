//! Error types for the sluice job engine.
//!
//! This module provides a comprehensive error handling strategy using `thiserror`
//! for automatic error trait implementations. All errors in the engine are
//! represented by the `EngineError` enum, split along the lifecycle they occur
//! in: configuration errors surface synchronously while a job is being built,
//! ordering errors abort a run before any row is read, and row-level errors are
//! collected without tearing down sibling work.

use thiserror::Error;

use crate::data::RowId;

/// The main error type for the sluice engine.
///
/// Variants carry enough identity (component name, property name, row id) for
/// a caller to act on the failure without parsing the message.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A required descriptor property was never configured on the builder.
    #[error("Required property '{property}' of component '{component}' is not configured")]
    UnconfiguredProperty {
        /// Name of the offending component
        component: String,
        /// Name of the missing property
        property: String,
    },

    /// A property name is not declared by the component's descriptor.
    #[error("Component '{component}' has no property named '{property}'")]
    UnknownProperty {
        component: String,
        property: String,
    },

    /// A configured property value does not match the declared property kind,
    /// including handing a scalar to a list property or vice versa.
    #[error("Property '{property}' of component '{component}' expects {expected}, got {actual}")]
    PropertyType {
        component: String,
        property: String,
        /// Declared shape, e.g. "a list of Integer values"
        expected: String,
        /// Shape of the rejected value
        actual: String,
    },

    /// A component's transitive physical inputs span more than one table.
    #[error("Component '{component}' consumes columns of table '{first_table}' and table '{second_table}'; a component reads from exactly one table")]
    CrossTableInput {
        component: String,
        first_table: String,
        second_table: String,
    },

    /// A builder operation referenced a component that is not in the job.
    #[error("No component '{component}' in this job")]
    UnknownComponent { component: String },

    /// A requirement references a filter or category that does not exist.
    #[error("Invalid requirement: {0}")]
    InvalidRequirement(String),

    /// Consumer ordering reached a fixed point with components left over.
    ///
    /// This is fatal and not retryable: the dependency graph itself is
    /// unsatisfiable (for example a requirement cycle).
    #[error("Unsatisfiable consumer ordering; unresolved components: {remaining}")]
    UnsatisfiableOrdering {
        /// Comma-separated names of the components that could not be placed
        remaining: String,
    },

    /// A component failed while processing a single row.
    #[error("Component '{component}' failed on row {row}: {message}")]
    RowProcessing {
        /// Name of the failing component
        component: String,
        /// Identity of the row being processed
        row: RowId,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A component failed outside row processing (initialize, collect, close).
    #[error("Component '{component}' failed during {phase}: {message}")]
    ComponentLifecycle {
        component: String,
        /// Lifecycle phase, e.g. "initialize" or "close"
        phase: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error from data source operations.
    #[error("Data source error: {message}")]
    Source {
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The job was cancelled before it finished.
    #[error("Job execution was cancelled")]
    Cancelled,

    /// Aggregate raised when results are requested from a failed job.
    ///
    /// The summary lists every collected error with its kind and message, so
    /// no failure is lost even when many rows fail.
    #[error("Job failed with {count} error(s): {summary}")]
    JobFailed {
        /// Number of collected errors
        count: usize,
        /// One "[kind] message" segment per collected error
        summary: String,
    },

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, EngineError>`.
///
/// This is the standard `Result` type used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Short stable identifier for the variant, used when errors are
    /// aggregated or serialized into reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnconfiguredProperty { .. } => "unconfigured_property",
            Self::UnknownProperty { .. } => "unknown_property",
            Self::PropertyType { .. } => "property_type",
            Self::CrossTableInput { .. } => "cross_table_input",
            Self::UnknownComponent { .. } => "unknown_component",
            Self::InvalidRequirement(_) => "invalid_requirement",
            Self::UnsatisfiableOrdering { .. } => "unsatisfiable_ordering",
            Self::RowProcessing { .. } => "row_processing",
            Self::ComponentLifecycle { .. } => "component_lifecycle",
            Self::Source { .. } => "source",
            Self::Cancelled => "cancelled",
            Self::JobFailed { .. } => "job_failed",
            Self::Configuration(_) => "configuration",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// True for errors that invalidate the job graph itself, where retrying
    /// the run cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsatisfiableOrdering { .. } | Self::CrossTableInput { .. }
        )
    }

    /// Creates a new unconfigured property error.
    pub fn unconfigured_property(
        component: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self::UnconfiguredProperty {
            component: component.into(),
            property: property.into(),
        }
    }

    /// Creates a new property type error.
    pub fn property_type(
        component: impl Into<String>,
        property: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::PropertyType {
            component: component.into(),
            property: property.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new unsatisfiable ordering error from the names of the
    /// components that could not be placed.
    pub fn unsatisfiable_ordering<I, S>(remaining: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = remaining.into_iter().map(Into::into).collect();
        Self::UnsatisfiableOrdering {
            remaining: names.join(", "),
        }
    }

    /// Creates a new row processing error without an underlying source.
    pub fn row_processing(
        component: impl Into<String>,
        row: RowId,
        message: impl Into<String>,
    ) -> Self {
        Self::RowProcessing {
            component: component.into(),
            row,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new row processing error wrapping an underlying error.
    pub fn row_processing_with_source(
        component: impl Into<String>,
        row: RowId,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::RowProcessing {
            component: component.into(),
            row,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a new component lifecycle error.
    pub fn component_lifecycle(
        component: impl Into<String>,
        phase: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ComponentLifecycle {
            component: component.into(),
            phase: phase.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new component lifecycle error wrapping an underlying
    /// error.
    pub fn component_lifecycle_with_source(
        component: impl Into<String>,
        phase: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::ComponentLifecycle {
            component: component.into(),
            phase: phase.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a new data source error.
    pub fn source_error(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new data source error with an underlying error.
    pub fn source_error_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Source {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Builds the aggregate job failure from every collected report.
    ///
    /// Each report contributes a `[kind] message` segment, preserving the
    /// type and text of the individual failures.
    pub fn job_failed(reports: &[ErrorReport]) -> Self {
        let summary = reports
            .iter()
            .map(|report| format!("[{}] {}", report.error.kind(), report.error))
            .collect::<Vec<_>>()
            .join("; ");
        Self::JobFailed {
            count: reports.len(),
            summary,
        }
    }
}

/// One collected failure, with the component and row it is attributed to
/// when those are known.
#[derive(Debug)]
pub struct ErrorReport {
    /// Component the failure is attributed to, if any
    pub component: Option<String>,
    /// Row being processed when the failure occurred, if any
    pub row: Option<RowId>,
    /// The failure itself
    pub error: EngineError,
}

impl ErrorReport {
    /// A report not attributed to any component or row.
    pub fn job_level(error: EngineError) -> Self {
        Self {
            component: None,
            row: None,
            error,
        }
    }

    /// A report attributed to a component, optionally at a specific row.
    pub fn component_level(
        component: impl Into<String>,
        row: Option<RowId>,
        error: EngineError,
    ) -> Self {
        Self {
            component: Some(component.into()),
            row,
            error,
        }
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.component, self.row) {
            (Some(component), Some(row)) => {
                write!(f, "{} (component '{}', row {})", self.error, component, row)
            }
            (Some(component), None) => write!(f, "{} (component '{}')", self.error, component),
            _ => write!(f, "{}", self.error),
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<EngineError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| {
            let base_error = e.into();
            EngineError::Internal(format!("{}: {}", msg, base_error))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            let base_error = e.into();
            EngineError::Internal(format!("{}: {}", msg, base_error))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_unconfigured_property_error() {
        let err = EngineError::unconfigured_property("Null check", "column");
        assert_eq!(
            err.to_string(),
            "Required property 'column' of component 'Null check' is not configured"
        );
        assert_eq!(err.kind(), "unconfigured_property");
    }

    #[test]
    fn test_row_processing_preserves_source() {
        let source = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad cell");
        let err = EngineError::row_processing_with_source(
            "Tokenizer",
            RowId::new(42),
            Box::new(source),
        );
        assert!(err.source().is_some());
        assert!(err.to_string().contains("row 42"));
    }

    #[test]
    fn test_unsatisfiable_ordering_lists_components() {
        let err = EngineError::unsatisfiable_ordering(["Filter A", "Analyzer B"]);
        assert_eq!(
            err.to_string(),
            "Unsatisfiable consumer ordering; unresolved components: Filter A, Analyzer B"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_job_failed_aggregates_every_report() {
        let reports = vec![
            ErrorReport::component_level(
                "Analyzer B",
                Some(RowId::new(2)),
                EngineError::row_processing("Analyzer B", RowId::new(2), "boom"),
            ),
            ErrorReport::job_level(EngineError::Cancelled),
        ];
        let err = EngineError::job_failed(&reports);
        let text = err.to_string();
        assert!(text.starts_with("Job failed with 2 error(s):"));
        assert!(text.contains("[row_processing]"));
        assert!(text.contains("[cancelled]"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_error_context() {
        fn failing_operation() -> Result<()> {
            Err(EngineError::Internal("backing store gone".to_string()))
        }

        let result = failing_operation().context("while opening table");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("while opening table"));
    }
}
