//! Execution of frozen jobs.
//!
//! The engine turns a [`crate::job::Job`] and a
//! [`crate::sources::DataSource`] into analyzer results. Each table gets
//! its own pipeline: consumers are instantiated, dependency-ordered,
//! push-down is planned, and rows then fan out into bounded tasks that
//! walk the consumer chain. Tables run concurrently under one shared
//! worker capacity.
//!
//! Submission is non-blocking. [`JobRunner::run`] hands back a
//! [`JobHandle`] at once; awaiting, polling with a timeout, cancelling and
//! harvesting results all go through the handle.

mod chain;
mod consumer;
mod context;
mod handle;
mod ordering;
mod pipeline;
mod pushdown;
mod runner;
mod scheduler;

pub use handle::{AnalyzerOutcome, JobHandle, JobOutcome, JobResults, RunMetadata};
pub use runner::{JobRunner, RunnerConfig};
pub use scheduler::{TaskGroup, TaskSpawner, TokioSpawner};
