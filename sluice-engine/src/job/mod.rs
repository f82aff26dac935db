//! Job construction and the frozen job model.
//!
//! A job is built in two phases with distinct types, so the phase
//! distinction is visible in signatures: [`JobBuilder`] is the mutable
//! construction surface where every structural rule is validated, and
//! [`Job`] is the immutable result the execution plane consumes. Nothing
//! about a [`Job`] can change after [`JobBuilder::build`] returns; sharing
//! one across concurrent executions is safe by construction.
//!
//! Components enter the job by [`ComponentDescriptor`] reference and stay
//! opaque to the engine: what the engine knows about a component is its
//! kind, its declared properties, and for filters the category vocabulary.
//! The [`ComponentFactory`] turns descriptor plus configuration into a
//! runnable instance at execution time.

use std::fmt;

use serde::Serialize;

mod builder;
mod descriptor;
mod model;
mod outcome;
mod requirement;

pub use builder::JobBuilder;
pub use descriptor::{
    ComponentDescriptor, ComponentFactory, ComponentKind, OutputColumnSpec, PropertyDescriptor,
    PropertyKind, PropertyMap, PropertyValue,
};
pub use model::{ComponentConfig, ComponentJob, Job, JobKind};
pub use outcome::{Category, FilterOutcome, OutcomeSet};
pub use requirement::Requirement;

/// Identity of a component within one job.
///
/// Handed out by the builder's `add_*` methods and stable across the
/// job's lifetime; every later builder call and every runtime structure
/// refers to components through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ComponentId(usize);

impl ComponentId {
    /// Creates a component id from its numeric value.
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    /// The numeric value of the id.
    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
