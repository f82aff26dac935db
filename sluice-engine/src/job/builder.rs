//! Mutable job construction.
//!
//! A [`JobBuilder`] accumulates source columns and components, validates
//! every mutation synchronously, and freezes into an immutable [`Job`].
//! Configuration problems never survive past [`JobBuilder::build`]: whatever
//! the builder returns can be handed to the runner without further checking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::data::{InputColumn, SourceColumn, VirtualColumn};
use crate::error::{EngineError, Result};
use crate::job::{
    Category, ComponentConfig, ComponentDescriptor, ComponentId, ComponentJob, ComponentKind,
    FilterOutcome, Job, JobKind, PropertyMap, PropertyValue, Requirement,
};

#[derive(Debug)]
struct BuilderComponent {
    id: ComponentId,
    name: String,
    descriptor: Arc<dyn ComponentDescriptor>,
    properties: PropertyMap,
    /// `None` means the component follows the builder's default
    /// requirement; an explicit `Some(Requirement::None)` pins the
    /// component to unconditional execution.
    explicit_requirement: Option<Requirement>,
}

/// Builds a [`Job`] incrementally.
///
/// Components are registered by descriptor and referenced through the
/// [`ComponentId`] each `add_*` call returns. All structural rules are
/// enforced here: property shapes, requirement references, the
/// one-table-per-component rule and requirement acyclicity.
///
/// # Examples
///
/// ```rust,ignore
/// use sluice_engine::prelude::*;
///
/// let mut builder = JobBuilder::new();
/// let age = builder.add_source_column(SourceColumn::new("people", "age", DataType::Integer));
/// let filter = builder.add_filter(adult_filter_descriptor())?;
/// builder.set_property(filter, "column", InputColumn::Physical(age))?;
/// builder.set_property(filter, "threshold", 18i64)?;
/// let job = builder.build()?;
/// ```
#[derive(Debug, Default)]
pub struct JobBuilder {
    source_columns: Vec<Arc<SourceColumn>>,
    components: Vec<BuilderComponent>,
    default_requirement: Requirement,
    next_id: usize,
}

impl JobBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            source_columns: Vec::new(),
            components: Vec::new(),
            default_requirement: Requirement::None,
            next_id: 1,
        }
    }

    /// Declares a source column, returning its shared handle.
    ///
    /// Re-declaring a column with the same `(table, name)` identity returns
    /// the handle of the existing declaration.
    pub fn add_source_column(&mut self, column: SourceColumn) -> Arc<SourceColumn> {
        if let Some(existing) = self
            .source_columns
            .iter()
            .find(|existing| ***existing == column)
        {
            return Arc::clone(existing);
        }
        let column = Arc::new(column);
        self.source_columns.push(Arc::clone(&column));
        column
    }

    /// Removes a declared source column.
    ///
    /// Any configured column property referencing it is un-configured, so a
    /// later [`build`](Self::build) fails with an unconfigured property
    /// error instead of silently reading an undeclared column. Returns
    /// whether the column was declared.
    pub fn remove_source_column(&mut self, column: &SourceColumn) -> bool {
        let before = self.source_columns.len();
        self.source_columns.retain(|existing| existing.as_ref() != column);
        if self.source_columns.len() == before {
            return false;
        }
        for component in &mut self.components {
            strip_columns(&mut component.properties, |input| {
                matches!(input, InputColumn::Physical(physical) if physical.as_ref() == column)
            });
        }
        true
    }

    /// The declared source columns, in declaration order.
    pub fn source_columns(&self) -> &[Arc<SourceColumn>] {
        &self.source_columns
    }

    /// Looks up a declared source column.
    pub fn source_column(&self, table: &str, name: &str) -> Option<Arc<SourceColumn>> {
        self.source_columns
            .iter()
            .find(|column| column.table() == table && column.name() == name)
            .map(Arc::clone)
    }

    /// Registers a filter. The descriptor must declare at least one
    /// category.
    pub fn add_filter(&mut self, descriptor: Arc<dyn ComponentDescriptor>) -> Result<ComponentId> {
        self.add_component_of_kind(descriptor, ComponentKind::Filter)
    }

    /// Registers a transformer. The descriptor must declare at least one
    /// output column.
    pub fn add_transformer(
        &mut self,
        descriptor: Arc<dyn ComponentDescriptor>,
    ) -> Result<ComponentId> {
        self.add_component_of_kind(descriptor, ComponentKind::Transformer)
    }

    /// Registers an analyzer.
    pub fn add_analyzer(
        &mut self,
        descriptor: Arc<dyn ComponentDescriptor>,
    ) -> Result<ComponentId> {
        self.add_component_of_kind(descriptor, ComponentKind::Analyzer)
    }

    fn add_component_of_kind(
        &mut self,
        descriptor: Arc<dyn ComponentDescriptor>,
        expected: ComponentKind,
    ) -> Result<ComponentId> {
        if descriptor.kind() != expected {
            return Err(EngineError::Configuration(format!(
                "Descriptor '{}' is of kind {}, not {}",
                descriptor.name(),
                descriptor.kind(),
                expected
            )));
        }
        match expected {
            ComponentKind::Filter => {
                if descriptor.categories().is_empty() {
                    return Err(EngineError::Configuration(format!(
                        "Filter descriptor '{}' declares no categories",
                        descriptor.name()
                    )));
                }
                let mut seen = HashSet::new();
                for category in descriptor.categories() {
                    if !seen.insert(category.as_str()) {
                        return Err(EngineError::Configuration(format!(
                            "Filter descriptor '{}' declares category '{}' twice",
                            descriptor.name(),
                            category
                        )));
                    }
                }
            }
            ComponentKind::Transformer => {
                if descriptor.output_columns().is_empty() {
                    return Err(EngineError::Configuration(format!(
                        "Transformer descriptor '{}' declares no output columns",
                        descriptor.name()
                    )));
                }
            }
            ComponentKind::Analyzer => {}
        }

        let id = ComponentId::new(self.next_id);
        self.next_id += 1;
        debug!(component.id = %id, component.name = %descriptor.name(), component.kind = %expected, "Registered component");
        self.components.push(BuilderComponent {
            id,
            name: descriptor.name().to_string(),
            descriptor,
            properties: PropertyMap::new(),
            explicit_requirement: None,
        });
        Ok(id)
    }

    /// Removes a component.
    ///
    /// Removing a filter re-points every requirement that references one of
    /// its outcomes (including the default requirement) to the removed
    /// filter's own effective requirement, so dependents stay conditional
    /// on whatever gated the removed filter rather than silently becoming
    /// unconditional. Removing a transformer un-configures properties
    /// referencing its output columns.
    pub fn remove_component(&mut self, id: ComponentId) -> Result<()> {
        let position = self
            .components
            .iter()
            .position(|component| component.id == id)
            .ok_or_else(|| EngineError::UnknownComponent {
                component: id.to_string(),
            })?;

        let fallback = self.effective_requirement_of(&self.components[position]);
        let removed = self.components.remove(position);
        debug!(component.id = %removed.id, component.name = %removed.name, "Removed component");

        match removed.descriptor.kind() {
            ComponentKind::Filter => {
                for component in &mut self.components {
                    if let Some(requirement) = &component.explicit_requirement {
                        if requirement.references(removed.id) {
                            component.explicit_requirement = Some(fallback.clone());
                        }
                    }
                }
                if self.default_requirement.references(removed.id) {
                    self.default_requirement = fallback;
                }
            }
            ComponentKind::Transformer => {
                for component in &mut self.components {
                    strip_columns(&mut component.properties, |input| {
                        input.producer() == Some(removed.id)
                    });
                }
            }
            ComponentKind::Analyzer => {}
        }
        Ok(())
    }

    /// Overrides the instance name used in errors, logs and listener
    /// events. Defaults to the descriptor name.
    pub fn set_name(&mut self, id: ComponentId, name: impl Into<String>) -> Result<()> {
        self.component_mut(id)?.name = name.into();
        Ok(())
    }

    /// Configures a property.
    ///
    /// The value is checked against the descriptor's declaration: unknown
    /// names, wrong value types and list-versus-scalar mismatches are all
    /// rejected here, and referenced columns must be declared (physical) or
    /// emitted by a registered transformer (virtual).
    pub fn set_property(
        &mut self,
        id: ComponentId,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        let value = value.into();
        let component = self.component(id)?;
        let component_name = component.name.clone();
        let declared = component
            .descriptor
            .properties()
            .iter()
            .find(|property| property.name() == name)
            .ok_or_else(|| EngineError::UnknownProperty {
                component: component_name.clone(),
                property: name.to_string(),
            })?;
        if !declared.kind().accepts(&value) {
            return Err(EngineError::property_type(
                component_name,
                name,
                declared.kind().to_string(),
                value.describe(),
            ));
        }
        for column in value.input_columns() {
            self.validate_input_column(&component_name, column)?;
        }
        self.component_mut(id)?.properties.set(name, value);
        Ok(())
    }

    /// Un-configures a property. Returns whether it was configured.
    pub fn clear_property(&mut self, id: ComponentId, name: &str) -> Result<bool> {
        Ok(self.component_mut(id)?.properties.remove(name).is_some())
    }

    /// The configured properties of a component.
    pub fn properties(&self, id: ComponentId) -> Result<&PropertyMap> {
        Ok(&self.component(id)?.properties)
    }

    /// Sets a component's explicit requirement.
    ///
    /// Passing [`Requirement::None`] pins the component to unconditional
    /// execution even when a default requirement is in force.
    pub fn set_requirement(&mut self, id: ComponentId, requirement: Requirement) -> Result<()> {
        self.validate_requirement(&requirement, Some(id))?;
        self.component_mut(id)?.explicit_requirement = Some(requirement);
        Ok(())
    }

    /// The requirement a component would freeze with right now: its
    /// explicit requirement, or the default where that applies.
    pub fn effective_requirement(&self, id: ComponentId) -> Result<Requirement> {
        let component = self.component(id)?;
        Ok(self.effective_requirement_of(component))
    }

    /// Sets the default requirement.
    ///
    /// Applies to every component without an explicit requirement, both
    /// already-registered and future ones, except the requirement's own
    /// source filters and their transitive dependencies. The exclusion
    /// keeps a filter from requiring its own outcome and keeps upstream
    /// providers from depending on their consumers.
    pub fn set_default_requirement(&mut self, requirement: Requirement) -> Result<()> {
        self.validate_requirement(&requirement, None)?;
        self.default_requirement = requirement;
        Ok(())
    }

    /// The current default requirement.
    pub fn default_requirement(&self) -> &Requirement {
        &self.default_requirement
    }

    /// The outcome of a registered filter for one of its declared
    /// categories.
    pub fn outcome(&self, filter: ComponentId, category: &str) -> Result<FilterOutcome> {
        let component = self.component(filter)?;
        if component.descriptor.kind() != ComponentKind::Filter {
            return Err(EngineError::InvalidRequirement(format!(
                "Component '{}' is of kind {}, not filter",
                component.name,
                component.descriptor.kind()
            )));
        }
        let category = component
            .descriptor
            .categories()
            .iter()
            .find(|declared| declared.as_str() == category)
            .ok_or_else(|| {
                EngineError::InvalidRequirement(format!(
                    "Filter '{}' declares no category '{}'",
                    component.name, category
                ))
            })?;
        Ok(FilterOutcome::new(filter, category.clone()))
    }

    /// A handle to one of a registered transformer's output columns.
    pub fn output_column(&self, transformer: ComponentId, name: &str) -> Result<InputColumn> {
        let component = self.component(transformer)?;
        if component.descriptor.kind() != ComponentKind::Transformer {
            return Err(EngineError::Configuration(format!(
                "Component '{}' is of kind {}, not transformer",
                component.name,
                component.descriptor.kind()
            )));
        }
        let spec = component
            .descriptor
            .output_columns()
            .iter()
            .find(|spec| spec.name() == name)
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "Transformer '{}' emits no column '{}'",
                    component.name, name
                ))
            })?;
        Ok(InputColumn::Virtual(Arc::new(VirtualColumn::new(
            transformer,
            spec.name(),
            spec.data_type(),
        ))))
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Checks if no component is registered.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Freezes the builder into an immutable [`Job`].
    ///
    /// Validates what only the complete graph can answer: every required
    /// property is configured, every component's transitive physical
    /// inputs sit on exactly one table, and every effective requirement
    /// references registered filters without requiring a filter's own
    /// outcome.
    pub fn build(self) -> Result<Job> {
        let mut effective = Vec::with_capacity(self.components.len());
        let mut effective_by_id: HashMap<ComponentId, Requirement> = HashMap::new();
        for component in &self.components {
            let requirement = self.effective_requirement_of(component);
            effective_by_id.insert(component.id, requirement.clone());
            effective.push(requirement);
        }

        let mut memo: HashMap<ComponentId, String> = HashMap::new();
        let mut tables = Vec::with_capacity(self.components.len());
        for component in &self.components {
            let mut visiting = HashSet::new();
            tables.push(self.resolve_table(component, &effective_by_id, &mut memo, &mut visiting)?);
        }

        for ((component, requirement), table) in
            self.components.iter().zip(effective.iter()).zip(tables.iter())
        {
            for property in component.descriptor.properties() {
                if property.is_required() && !component.properties.contains(property.name()) {
                    return Err(EngineError::unconfigured_property(
                        component.name.clone(),
                        property.name(),
                    ));
                }
            }
            self.validate_requirement(requirement, Some(component.id))?;
            for outcome in requirement.outcomes() {
                if let Some(filter_table) = memo.get(&outcome.filter()) {
                    if filter_table != table {
                        return Err(EngineError::InvalidRequirement(format!(
                            "Component '{}' on table '{}' requires outcome {} of a filter on table '{}'",
                            component.name, table, outcome, filter_table
                        )));
                    }
                }
            }
        }

        let mut components = Vec::with_capacity(self.components.len());
        for ((component, requirement), table) in self
            .components
            .iter()
            .zip(effective.into_iter())
            .zip(tables.into_iter())
        {
            let kind = match component.descriptor.kind() {
                ComponentKind::Filter => JobKind::Filter {
                    outcomes: component
                        .descriptor
                        .categories()
                        .iter()
                        .map(|category| FilterOutcome::new(component.id, category.clone()))
                        .collect(),
                },
                ComponentKind::Transformer => JobKind::Transformer {
                    output_columns: component
                        .descriptor
                        .output_columns()
                        .iter()
                        .map(|spec| {
                            Arc::new(VirtualColumn::new(
                                component.id,
                                spec.name(),
                                spec.data_type(),
                            ))
                        })
                        .collect(),
                },
                ComponentKind::Analyzer => JobKind::Analyzer,
            };
            let config = ComponentConfig::new(
                component.id,
                component.name.clone(),
                table,
                Arc::clone(&component.descriptor),
                component.properties.clone(),
                requirement,
                component.properties.input_columns(),
            );
            components.push(ComponentJob::new(config, kind));
        }

        debug!(
            job.components = components.len(),
            job.source_columns = self.source_columns.len(),
            "Job frozen"
        );
        Ok(Job::new(self.source_columns, components))
    }

    fn component(&self, id: ComponentId) -> Result<&BuilderComponent> {
        self.components
            .iter()
            .find(|component| component.id == id)
            .ok_or_else(|| EngineError::UnknownComponent {
                component: id.to_string(),
            })
    }

    fn component_mut(&mut self, id: ComponentId) -> Result<&mut BuilderComponent> {
        self.components
            .iter_mut()
            .find(|component| component.id == id)
            .ok_or_else(|| EngineError::UnknownComponent {
                component: id.to_string(),
            })
    }

    fn validate_input_column(&self, component_name: &str, column: &InputColumn) -> Result<()> {
        match column {
            InputColumn::Physical(physical) => {
                if !self
                    .source_columns
                    .iter()
                    .any(|declared| declared.as_ref() == physical.as_ref())
                {
                    return Err(EngineError::Configuration(format!(
                        "Component '{}' references undeclared column '{}'",
                        component_name, physical
                    )));
                }
            }
            InputColumn::Virtual(virtual_column) => {
                let producer = self
                    .components
                    .iter()
                    .find(|component| component.id == virtual_column.producer());
                let emits = producer.is_some_and(|producer| {
                    producer
                        .descriptor
                        .output_columns()
                        .iter()
                        .any(|spec| spec.name() == virtual_column.name())
                });
                if !emits {
                    return Err(EngineError::Configuration(format!(
                        "Component '{}' references virtual column '{}' that no registered transformer emits",
                        component_name, virtual_column
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_requirement(
        &self,
        requirement: &Requirement,
        subject: Option<ComponentId>,
    ) -> Result<()> {
        for outcome in requirement.outcomes() {
            if subject == Some(outcome.filter()) {
                return Err(EngineError::InvalidRequirement(format!(
                    "Filter {} cannot require its own outcome {}",
                    outcome.filter(),
                    outcome
                )));
            }
            let filter = self.components.iter().find(|component| {
                component.id == outcome.filter()
            });
            let filter = filter.ok_or_else(|| {
                EngineError::InvalidRequirement(format!(
                    "Outcome {} references a filter that is not registered",
                    outcome
                ))
            })?;
            if filter.descriptor.kind() != ComponentKind::Filter {
                return Err(EngineError::InvalidRequirement(format!(
                    "Outcome {} references component '{}' of kind {}, not a filter",
                    outcome,
                    filter.name,
                    filter.descriptor.kind()
                )));
            }
            if !filter
                .descriptor
                .categories()
                .iter()
                .any(|category| category == outcome.category())
            {
                return Err(EngineError::InvalidRequirement(format!(
                    "Filter '{}' declares no category '{}'",
                    filter.name,
                    outcome.category()
                )));
            }
        }
        Ok(())
    }

    fn effective_requirement_of(&self, component: &BuilderComponent) -> Requirement {
        if let Some(explicit) = &component.explicit_requirement {
            return explicit.clone();
        }
        if self.default_requirement.is_none() {
            return Requirement::None;
        }
        if self.default_excludes(component.id) {
            Requirement::None
        } else {
            self.default_requirement.clone()
        }
    }

    /// Checks if the default requirement must not apply to the given
    /// component: source filters of the default, and everything those
    /// filters transitively depend on, are excluded.
    fn default_excludes(&self, id: ComponentId) -> bool {
        let mut excluded = HashSet::new();
        for outcome in self.default_requirement.outcomes() {
            if excluded.insert(outcome.filter()) {
                self.collect_dependencies(outcome.filter(), &mut excluded);
            }
        }
        excluded.contains(&id)
    }

    /// Walks input columns and explicit requirements upstream from
    /// `start`, adding every component reachable that way to `out`.
    fn collect_dependencies(&self, start: ComponentId, out: &mut HashSet<ComponentId>) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Ok(component) = self.component(id) else {
                continue;
            };
            for column in component.properties.input_columns() {
                if let Some(producer) = column.producer() {
                    if out.insert(producer) {
                        stack.push(producer);
                    }
                }
            }
            if let Some(requirement) = &component.explicit_requirement {
                for outcome in requirement.outcomes() {
                    if out.insert(outcome.filter()) {
                        stack.push(outcome.filter());
                    }
                }
            }
        }
    }

    /// Resolves the single source table a component reads from, following
    /// virtual columns to their producers. Errors when inputs span tables
    /// or no table is reachable at all.
    fn resolve_table(
        &self,
        component: &BuilderComponent,
        effective: &HashMap<ComponentId, Requirement>,
        memo: &mut HashMap<ComponentId, String>,
        visiting: &mut HashSet<ComponentId>,
    ) -> Result<String> {
        if let Some(table) = memo.get(&component.id) {
            return Ok(table.clone());
        }
        if !visiting.insert(component.id) {
            return Err(EngineError::Configuration(format!(
                "Component '{}' participates in a circular input column chain",
                component.name
            )));
        }

        let mut table: Option<String> = None;
        for column in component.properties.input_columns() {
            let candidate = match &column {
                InputColumn::Physical(physical) => physical.table().to_string(),
                InputColumn::Virtual(virtual_column) => {
                    let producer = self.component(virtual_column.producer()).map_err(|_| {
                        EngineError::Configuration(format!(
                            "Component '{}' references virtual column '{}' with no producer",
                            component.name, virtual_column
                        ))
                    })?;
                    self.resolve_table(producer, effective, memo, visiting)?
                }
            };
            match &table {
                None => table = Some(candidate),
                Some(existing) if *existing != candidate => {
                    return Err(EngineError::CrossTableInput {
                        component: component.name.clone(),
                        first_table: existing.clone(),
                        second_table: candidate,
                    });
                }
                Some(_) => {}
            }
        }

        // A component with no column inputs can still be anchored through
        // the filters its effective requirement references.
        if table.is_none() {
            if let Some(requirement) = effective.get(&component.id) {
                for outcome in requirement.outcomes() {
                    if let Ok(filter) = self.component(outcome.filter()) {
                        let candidate = self.resolve_table(filter, effective, memo, visiting)?;
                        match &table {
                            None => table = Some(candidate),
                            Some(existing) if *existing != candidate => {
                                return Err(EngineError::InvalidRequirement(format!(
                                    "Component '{}' requires outcomes of filters on tables '{}' and '{}'",
                                    component.name, existing, candidate
                                )));
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
        }

        visiting.remove(&component.id);
        let table = table.ok_or_else(|| {
            EngineError::Configuration(format!(
                "Component '{}' consumes no source columns; cannot assign it to a table",
                component.name
            ))
        })?;
        memo.insert(component.id, table.clone());
        Ok(table)
    }
}

fn strip_columns(properties: &mut PropertyMap, doomed: impl Fn(&InputColumn) -> bool) {
    let names: Vec<String> = properties.iter().map(|(name, _)| name.to_string()).collect();
    for name in names {
        let Some(value) = properties.get(&name).cloned() else {
            continue;
        };
        match value {
            PropertyValue::Column(column) if doomed(&column) => {
                properties.remove(&name);
            }
            PropertyValue::ColumnList(columns) => {
                let kept: Vec<InputColumn> =
                    columns.into_iter().filter(|column| !doomed(column)).collect();
                if kept.is_empty() {
                    properties.remove(&name);
                } else {
                    properties.set(&name, PropertyValue::ColumnList(kept));
                }
            }
            _ => {}
        }
    }
}
