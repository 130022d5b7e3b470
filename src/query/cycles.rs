use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::query::{BudgetClock, CYCLE_DEPTH_LIMIT, TraversalBudget};
use crate::store::SqliteStore;

/// Reports every distinct minimal import cycle among files, each rendered as
/// the file sequence with the closing repetition of its first element
/// (`[x, y, z, x]`). A cycle is recorded only from its lexicographically
/// smallest member, which deduplicates rotations and makes discovery order
/// deterministic for a fixed graph. Cycles longer than `CYCLE_DEPTH_LIMIT`
/// files are not searched for.
pub fn find_import_cycles(
    store: &SqliteStore,
    budget: TraversalBudget,
) -> Result<Vec<Vec<String>>> {
    let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for edge in store.file_import_edges()? {
        let targets = adjacency.entry(edge.source_file).or_default();
        if !targets.contains(&edge.target_file) {
            targets.push(edge.target_file);
        }
    }

    let mut clock = BudgetClock::start(budget);
    let mut cycles = Vec::new();
    let starts = adjacency.keys().cloned().collect::<Vec<_>>();
    for start in &starts {
        let mut path = Vec::new();
        walk(&adjacency, start, start, &mut path, &mut cycles, &mut clock)?;
    }

    debug!(
        files = adjacency.len(),
        cycles = cycles.len(),
        expanded = clock.expanded(),
        "cycle detection complete"
    );
    Ok(cycles)
}

fn walk(
    adjacency: &BTreeMap<String, Vec<String>>,
    start: &str,
    current: &str,
    path: &mut Vec<String>,
    cycles: &mut Vec<Vec<String>>,
    clock: &mut BudgetClock,
) -> Result<()> {
    clock.charge()?;
    let Some(targets) = adjacency.get(current) else {
        return Ok(());
    };
    for target in targets {
        if target == start {
            let mut cycle = Vec::with_capacity(path.len() + 2);
            cycle.push(start.to_string());
            cycle.extend(path.iter().cloned());
            cycle.push(start.to_string());
            cycles.push(cycle);
            continue;
        }
        // Rooting every cycle at its smallest member: members below the
        // start belong to a walk rooted elsewhere.
        if target.as_str() < start || path.iter().any(|seen| seen == target) {
            continue;
        }
        if path.len() + 1 >= CYCLE_DEPTH_LIMIT {
            continue;
        }
        path.push(target.clone());
        walk(adjacency, start, target, path, cycles, clock)?;
        path.pop();
    }
    Ok(())
}
