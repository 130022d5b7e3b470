use std::collections::VecDeque;

use tracing::debug;

use crate::error::Result;
use crate::query::{BudgetClock, MAX_PATH_DEPTH, TraversalBudget, validate_depth};
use crate::relation::RelationshipRow;
use crate::store::SqliteStore;

/// Enumerates every simple path from `source` to `target` of at most
/// `max_depth` hops, breadth-first. Paths never revisit an entity, except
/// that a path may close back onto `source` when `source == target`. Only
/// entities reachable from `source` are ever expanded.
///
/// `max_depth` must be in `1..=MAX_PATH_DEPTH`.
pub fn find_paths(
    store: &SqliteStore,
    source: &str,
    target: &str,
    max_depth: usize,
    budget: TraversalBudget,
) -> Result<Vec<Vec<RelationshipRow>>> {
    validate_depth("max_depth", max_depth, MAX_PATH_DEPTH)?;

    let mut clock = BudgetClock::start(budget);
    let mut queue: VecDeque<(String, Vec<RelationshipRow>)> = VecDeque::new();
    queue.push_back((source.to_string(), Vec::new()));
    let mut found = Vec::new();

    while let Some((entity, path)) = queue.pop_front() {
        let edges = store.outgoing_edges(&entity)?;
        clock.charge()?;
        for edge in edges {
            if edge.target == target {
                let mut complete = path.clone();
                complete.push(edge.clone());
                found.push(complete);
            }
            // The closing hop above is allowed even when target == source;
            // interior revisits are not, and neither endpoint may sit in a
            // path's interior.
            if path.len() + 1 < max_depth
                && edge.target != source
                && edge.target != target
                && !path.iter().any(|step| step.target == edge.target)
            {
                let mut extended = path.clone();
                let next = edge.target.clone();
                extended.push(edge);
                queue.push_back((next, extended));
            }
        }
    }

    debug!(
        source,
        target,
        max_depth,
        paths = found.len(),
        expanded = clock.expanded(),
        "path enumeration complete"
    );
    Ok(found)
}
