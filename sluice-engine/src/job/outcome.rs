//! Filter outcomes and the per-row outcome set.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::job::ComponentId;

/// One of the category labels a filter sorts rows into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category(String);

impl Category {
    /// Creates a category from its label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The category label.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Category {
    fn from(label: &str) -> Self {
        Self(label.to_string())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The event of a specific filter having categorized a row a specific way.
///
/// Equality covers both fields: `VALID` from filter 1 and `VALID` from
/// filter 2 are unrelated outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FilterOutcome {
    filter: ComponentId,
    category: Category,
}

impl FilterOutcome {
    /// Creates the outcome of `filter` categorizing a row as `category`.
    pub fn new(filter: ComponentId, category: Category) -> Self {
        Self { filter, category }
    }

    /// The filter that produced this outcome.
    pub fn filter(&self) -> ComponentId {
        self.filter
    }

    /// The category the row was sorted into.
    pub fn category(&self) -> &Category {
        &self.category
    }
}

impl fmt::Display for FilterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.filter, self.category)
    }
}

/// The outcomes accumulated along one branch of a row's journey through
/// the consumer chain.
///
/// Append-only: evaluating further filters can only add outcomes, so a
/// satisfied requirement stays satisfied for the rest of the branch.
#[derive(Debug, Clone, Default)]
pub struct OutcomeSet {
    outcomes: Vec<FilterOutcome>,
}

impl OutcomeSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set pre-populated with outcomes, as when a push-down plan
    /// guarantees an outcome for every row the source returns.
    pub fn seeded<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = FilterOutcome>,
    {
        let mut set = Self::new();
        for outcome in outcomes {
            set.insert(outcome);
        }
        set
    }

    /// Appends an outcome. Re-inserting an outcome is a no-op.
    pub fn insert(&mut self, outcome: FilterOutcome) {
        if !self.contains(&outcome) {
            self.outcomes.push(outcome);
        }
    }

    /// Checks whether the outcome has been recorded on this branch.
    pub fn contains(&self, outcome: &FilterOutcome) -> bool {
        self.outcomes.contains(outcome)
    }

    /// The outcomes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FilterOutcome> {
        self.outcomes.iter()
    }

    /// Number of recorded outcomes.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Checks if no outcome has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

impl fmt::Display for OutcomeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, outcome) in self.outcomes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{outcome}")?;
        }
        write!(f, "}}")
    }
}
