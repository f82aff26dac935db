//! Prelude for commonly used types and traits in sluice-engine.

pub use crate::components::{Analyzer, AnalyzerResult, ComponentInstance, Filter, Transformer};
pub use crate::data::{DataType, InputColumn, Row, RowLayout, SourceColumn, Value};
pub use crate::engine::{JobHandle, JobOutcome, JobResults, JobRunner, RunnerConfig};
pub use crate::error::{EngineError, ErrorContext, Result};
pub use crate::formatters::{FormatterConfig, ResultFormatter};
pub use crate::job::{Category, ComponentId, JobBuilder, Requirement};
pub use crate::listener::JobListener;
pub use crate::logging::LogConfig;
pub use crate::sources::{DataSource, MemorySource};
