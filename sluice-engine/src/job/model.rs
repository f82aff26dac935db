//! The immutable job model produced by freezing a builder.

use std::fmt;
use std::sync::Arc;

use crate::data::{InputColumn, SourceColumn, VirtualColumn};
use crate::job::{
    ComponentDescriptor, ComponentId, ComponentKind, FilterOutcome, PropertyMap, Requirement,
};

/// Configuration shared by every component kind: identity, descriptor,
/// frozen properties, effective requirement and resolved input columns.
#[derive(Debug)]
pub struct ComponentConfig {
    id: ComponentId,
    name: String,
    table: String,
    descriptor: Arc<dyn ComponentDescriptor>,
    properties: PropertyMap,
    requirement: Requirement,
    input_columns: Vec<InputColumn>,
}

impl ComponentConfig {
    pub(crate) fn new(
        id: ComponentId,
        name: String,
        table: String,
        descriptor: Arc<dyn ComponentDescriptor>,
        properties: PropertyMap,
        requirement: Requirement,
        input_columns: Vec<InputColumn>,
    ) -> Self {
        Self {
            id,
            name,
            table,
            descriptor,
            properties,
            requirement,
            input_columns,
        }
    }
}

/// Kind-specific part of a frozen component.
#[derive(Debug, Clone)]
pub enum JobKind {
    /// A filter and its full outcome vocabulary.
    Filter {
        /// One outcome per declared category, in declared order.
        outcomes: Vec<FilterOutcome>,
    },
    /// A transformer and the virtual columns it emits.
    Transformer {
        /// Emitted columns, in declared order.
        output_columns: Vec<Arc<VirtualColumn>>,
    },
    /// An analyzer; all it adds over the common config is its result.
    Analyzer,
}

/// One frozen component of a [`Job`].
///
/// Component jobs are immutable and cheap to clone; all mutation happens on
/// the builder before freezing.
#[derive(Debug, Clone)]
pub struct ComponentJob {
    config: Arc<ComponentConfig>,
    kind: JobKind,
}

impl ComponentJob {
    pub(crate) fn new(config: ComponentConfig, kind: JobKind) -> Self {
        Self {
            config: Arc::new(config),
            kind,
        }
    }

    /// The component's identity within the job.
    pub fn id(&self) -> ComponentId {
        self.config.id
    }

    /// The instance name used in errors, logs and listener events.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The source table this component reads from, directly or through
    /// upstream transformers.
    pub fn table(&self) -> &str {
        &self.config.table
    }

    /// The descriptor the component was registered from.
    pub fn descriptor(&self) -> &Arc<dyn ComponentDescriptor> {
        &self.config.descriptor
    }

    /// The frozen configuration.
    pub fn properties(&self) -> &PropertyMap {
        &self.config.properties
    }

    /// The effective requirement, explicit or inherited from the builder
    /// default.
    pub fn requirement(&self) -> &Requirement {
        &self.config.requirement
    }

    /// The input columns, in configuration order.
    pub fn input_columns(&self) -> &[InputColumn] {
        &self.config.input_columns
    }

    /// The kind-specific configuration.
    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    /// The component kind.
    pub fn component_kind(&self) -> ComponentKind {
        match self.kind {
            JobKind::Filter { .. } => ComponentKind::Filter,
            JobKind::Transformer { .. } => ComponentKind::Transformer,
            JobKind::Analyzer => ComponentKind::Analyzer,
        }
    }

    /// The outcomes a filter can produce; empty for other kinds.
    pub fn outcomes(&self) -> &[FilterOutcome] {
        match &self.kind {
            JobKind::Filter { outcomes } => outcomes,
            _ => &[],
        }
    }

    /// The virtual columns a transformer emits; empty for other kinds.
    pub fn output_columns(&self) -> &[Arc<VirtualColumn>] {
        match &self.kind {
            JobKind::Transformer { output_columns } => output_columns,
            _ => &[],
        }
    }

    /// Checks if this is a filter.
    pub fn is_filter(&self) -> bool {
        matches!(self.kind, JobKind::Filter { .. })
    }

    /// Checks if this is a transformer.
    pub fn is_transformer(&self) -> bool {
        matches!(self.kind, JobKind::Transformer { .. })
    }

    /// Checks if this is an analyzer.
    pub fn is_analyzer(&self) -> bool {
        matches!(self.kind, JobKind::Analyzer)
    }
}

impl fmt::Display for ComponentJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' ({})",
            self.component_kind(),
            self.name(),
            self.id()
        )
    }
}

/// A frozen, immutable job: declared source columns plus the component
/// graph. Produced exclusively by [`JobBuilder::build`].
///
/// [`JobBuilder::build`]: crate::job::JobBuilder::build
#[derive(Debug, Clone)]
pub struct Job {
    source_columns: Vec<Arc<SourceColumn>>,
    components: Vec<ComponentJob>,
}

impl Job {
    pub(crate) fn new(source_columns: Vec<Arc<SourceColumn>>, components: Vec<ComponentJob>) -> Self {
        Self {
            source_columns,
            components,
        }
    }

    /// The declared source columns, in declaration order.
    pub fn source_columns(&self) -> &[Arc<SourceColumn>] {
        &self.source_columns
    }

    /// The frozen components, in registration order.
    pub fn components(&self) -> &[ComponentJob] {
        &self.components
    }

    /// Looks a component up by id.
    pub fn component(&self, id: ComponentId) -> Option<&ComponentJob> {
        self.components.iter().find(|component| component.id() == id)
    }

    /// The distinct tables this job reads, in declaration order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables = Vec::new();
        for column in &self.source_columns {
            if !tables.contains(&column.table()) {
                tables.push(column.table());
            }
        }
        tables
    }

    /// The components whose resolved source table is `table`.
    pub fn components_for_table<'a>(&'a self, table: &str) -> Vec<&'a ComponentJob> {
        self.components
            .iter()
            .filter(|component| component.table() == table)
            .collect()
    }

    /// The declared columns of one table, in declaration order.
    pub fn source_columns_for_table<'a>(&'a self, table: &str) -> Vec<&'a Arc<SourceColumn>> {
        self.source_columns
            .iter()
            .filter(|column| column.table() == table)
            .collect()
    }

    /// Total number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Checks if the job has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
