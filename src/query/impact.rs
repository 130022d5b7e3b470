use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::error::Result;
use crate::query::{BudgetClock, MAX_IMPACT_DEPTH, TraversalBudget, validate_depth};
use crate::relation::{Confidence, RelationKind, RelationshipRow};
use crate::store::SqliteStore;

#[derive(Debug, Clone, PartialEq)]
pub struct ImpactNode {
    pub entity: String,
    pub name: String,
    pub file: String,
    pub depth: usize,
    pub kind: RelationKind,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImpactReport {
    pub entity: String,
    pub direct: Vec<RelationshipRow>,
    pub indirect: Vec<ImpactNode>,
    pub affected_files: BTreeSet<String>,
    pub total_impact: usize,
}

/// Computes what is affected if `entity` changes: direct dependents (depth
/// 1), indirect dependents up to `max_depth` hops tagged with the depth at
/// which they were first reached, the deduplicated set of files those
/// dependents live in, and the count of distinct impacted entities. Every
/// relationship kind counts; confidence only orders, it never filters.
///
/// `max_depth` must be in `1..=MAX_IMPACT_DEPTH`.
pub fn symbol_impact(
    store: &SqliteStore,
    entity: &str,
    max_depth: usize,
    budget: TraversalBudget,
) -> Result<ImpactReport> {
    validate_depth("max_depth", max_depth, MAX_IMPACT_DEPTH)?;

    let mut clock = BudgetClock::start(budget);
    let direct = store.incoming_edges(entity)?;
    clock.charge()?;

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(entity.to_string());
    let mut affected_files = BTreeSet::new();
    let mut frontier = Vec::new();
    for edge in &direct {
        affected_files.insert(edge.source_file.clone());
        if visited.insert(edge.source.clone()) {
            frontier.push(edge.source.clone());
        }
    }

    let mut indirect = Vec::new();
    for depth in 2..=max_depth {
        let mut next = Vec::new();
        for dependent in &frontier {
            let edges = store.incoming_edges(dependent)?;
            clock.charge()?;
            for edge in edges {
                if !visited.insert(edge.source.clone()) {
                    continue;
                }
                affected_files.insert(edge.source_file.clone());
                next.push(edge.source.clone());
                indirect.push(ImpactNode {
                    entity: edge.source,
                    name: edge.source_name,
                    file: edge.source_file,
                    depth,
                    kind: edge.kind,
                    confidence: edge.confidence,
                });
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    let total_impact = visited.len() - 1;
    debug!(
        entity,
        max_depth,
        total_impact,
        files = affected_files.len(),
        "impact analysis complete"
    );
    Ok(ImpactReport {
        entity: entity.to_string(),
        direct,
        indirect,
        affected_files,
        total_impact,
    })
}
