//! Conditional execution requirements.

use std::fmt;

use serde::Serialize;

use crate::job::{ComponentId, FilterOutcome, OutcomeSet};

/// When a component runs, relative to upstream filter outcomes.
///
/// The default for a freshly added component is [`Requirement::None`]:
/// the component sees every row of its table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum Requirement {
    /// Unconditional; the component processes every row.
    #[default]
    None,
    /// The component processes exactly the rows carrying this outcome.
    Outcome(FilterOutcome),
    /// The component processes rows carrying at least one of these
    /// outcomes (boolean OR).
    AnyOf(Vec<FilterOutcome>),
}

impl Requirement {
    /// Builds the simplest requirement for a set of alternative outcomes:
    /// an empty set is unconditional and a single outcome collapses to
    /// [`Requirement::Outcome`].
    pub fn any_of<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = FilterOutcome>,
    {
        let mut outcomes: Vec<FilterOutcome> = outcomes.into_iter().collect();
        match outcomes.len() {
            0 => Requirement::None,
            1 => Requirement::Outcome(outcomes.remove(0)),
            _ => Requirement::AnyOf(outcomes),
        }
    }

    /// Checks if this requirement holds for a branch with the given
    /// recorded outcomes.
    pub fn is_satisfied(&self, outcomes: &OutcomeSet) -> bool {
        match self {
            Requirement::None => true,
            Requirement::Outcome(outcome) => outcomes.contains(outcome),
            Requirement::AnyOf(alternatives) => {
                alternatives.iter().any(|outcome| outcomes.contains(outcome))
            }
        }
    }

    /// The outcomes this requirement references.
    pub fn outcomes(&self) -> &[FilterOutcome] {
        match self {
            Requirement::None => &[],
            Requirement::Outcome(outcome) => std::slice::from_ref(outcome),
            Requirement::AnyOf(outcomes) => outcomes,
        }
    }

    /// Checks if this is the unconditional requirement.
    pub fn is_none(&self) -> bool {
        matches!(self, Requirement::None)
    }

    /// Checks if any referenced outcome was produced by the given filter.
    pub fn references(&self, filter: ComponentId) -> bool {
        self.outcomes()
            .iter()
            .any(|outcome| outcome.filter() == filter)
    }
}

impl From<FilterOutcome> for Requirement {
    fn from(outcome: FilterOutcome) -> Self {
        Requirement::Outcome(outcome)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::None => write!(f, "<any row>"),
            Requirement::Outcome(outcome) => write!(f, "{outcome}"),
            Requirement::AnyOf(outcomes) => {
                for (i, outcome) in outcomes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{outcome}")?;
                }
                Ok(())
            }
        }
    }
}
