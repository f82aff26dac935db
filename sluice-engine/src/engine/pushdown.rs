//! Source-level predicate push-down.
//!
//! A filter can be lifted out of the row chain entirely when the source
//! can enforce it instead: the filter must offer a predicate for one of
//! its categories, must itself be ungated, and every other consumer on the
//! table must transitively require that outcome. Rows the predicate would
//! reject then never leave the source, and surviving rows enter the chain
//! with the outcome pre-seeded so downstream requirements still match.
//!
//! Lifting one filter can unlock the next: a second filter gated only on
//! an already-pushed outcome becomes ungated in turn, so planning loops
//! until no further filter qualifies.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::components::ComponentInstance;
use crate::job::{ComponentId, ComponentJob, FilterOutcome};
use crate::sources::Predicate;

/// The result of push-down planning for one table.
#[derive(Debug, Default)]
pub(crate) struct PushdownPlan {
    predicates: Vec<Predicate>,
    optimized: HashSet<ComponentId>,
    satisfied: Vec<FilterOutcome>,
}

impl PushdownPlan {
    /// Plans push-down over `ordered`, the table's dependency-ordered
    /// consumers, consulting each filter instance for predicates.
    pub(crate) fn analyze(
        ordered: &[ComponentJob],
        instances: &HashMap<ComponentId, ComponentInstance>,
    ) -> Self {
        let mut plan = PushdownPlan::default();
        let mut remaining: Vec<&ComponentJob> = ordered.iter().collect();
        let mut seeded: HashSet<FilterOutcome> = HashSet::new();

        loop {
            let mut chosen: Option<(usize, FilterOutcome, Predicate)> = None;

            'candidates: for (position, job) in remaining.iter().enumerate() {
                if !job.is_filter() {
                    continue;
                }
                let Some(ComponentInstance::Filter(filter)) = instances.get(&job.id()) else {
                    continue;
                };
                let gated = job
                    .requirement()
                    .outcomes()
                    .iter()
                    .any(|outcome| !seeded.contains(outcome));
                if gated {
                    continue;
                }

                for outcome in job.outcomes() {
                    let Some(predicate) = filter.pushdown_predicate(outcome.category()) else {
                        continue;
                    };
                    let universally_required = remaining
                        .iter()
                        .enumerate()
                        .filter(|(other_position, _)| *other_position != position)
                        .all(|(_, other)| requires(other, outcome, ordered));
                    if universally_required {
                        chosen = Some((position, outcome.clone(), predicate));
                        break 'candidates;
                    }
                }
            }

            let Some((position, outcome, predicate)) = chosen else {
                break;
            };
            let job = remaining.remove(position);
            debug!(
                component = %job.name(),
                predicate = %predicate,
                outcome = %outcome,
                "Filter pushed down to the source"
            );
            plan.predicates.push(predicate);
            plan.optimized.insert(job.id());
            seeded.insert(outcome.clone());
            plan.satisfied.push(outcome);
        }

        plan
    }

    /// Predicates the source must enforce during the scan.
    pub(crate) fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Outcomes guaranteed for every scanned row.
    pub(crate) fn satisfied(&self) -> &[FilterOutcome] {
        &self.satisfied
    }

    /// Whether `id` was lifted out of the chain.
    pub(crate) fn is_optimized(&self, id: ComponentId) -> bool {
        self.optimized.contains(&id)
    }

    pub(crate) fn optimized_count(&self) -> usize {
        self.optimized.len()
    }
}

/// Whether every row `consumer` accepts is guaranteed to carry `target`.
fn requires(consumer: &ComponentJob, target: &FilterOutcome, all: &[ComponentJob]) -> bool {
    let requirement = consumer.requirement();
    if requirement.is_none() {
        return false;
    }
    requirement
        .outcomes()
        .iter()
        .all(|outcome| implies(outcome, target, all, &mut HashSet::new()))
}

fn implies(
    outcome: &FilterOutcome,
    target: &FilterOutcome,
    all: &[ComponentJob],
    seen: &mut HashSet<ComponentId>,
) -> bool {
    if outcome == target {
        return true;
    }
    if !seen.insert(outcome.filter()) {
        return false;
    }
    let Some(producer) = all.iter().find(|job| job.id() == outcome.filter()) else {
        return false;
    };
    let requirement = producer.requirement();
    if requirement.is_none() {
        return false;
    }
    requirement
        .outcomes()
        .iter()
        .all(|upstream| implies(upstream, target, all, seen))
}
