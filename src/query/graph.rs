use std::collections::HashSet;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::query::{
    BudgetClock, CALL_GRAPH_FANOUT, MAX_CALL_GRAPH_DEPTH, TraversalBudget, validate_depth,
};
use crate::relation::{Confidence, RelationKind};
use crate::store::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Callers,
    Callees,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Callers => "callers",
            Self::Callees => "callees",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "callers" => Ok(Self::Callers),
            "callees" => Ok(Self::Callees),
            _ => Err(EngineError::validation("direction", raw)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallGraphNode {
    pub symbol: String,
    pub file: String,
    pub line: Option<u32>,
    pub depth: usize,
    pub kind: RelationKind,
    pub confidence: Confidence,
}

/// Walks the call graph from `symbol` in one direction, depth-first, tagging
/// each discovered edge with the depth at which it was found (the starting
/// symbol's neighbors are depth 1). A symbol is expanded at most once, but the
/// same symbol can appear as a node more than once when several call sites
/// reach it; callers of `symbol` point at it, callees are pointed at by it.
/// Fanout per expanded symbol is capped at `CALL_GRAPH_FANOUT`.
///
/// `max_depth` must be in `1..=MAX_CALL_GRAPH_DEPTH`.
pub fn call_graph(
    store: &SqliteStore,
    symbol: &str,
    direction: Direction,
    max_depth: usize,
    budget: TraversalBudget,
) -> Result<Vec<CallGraphNode>> {
    validate_depth("max_depth", max_depth, MAX_CALL_GRAPH_DEPTH)?;

    let mut clock = BudgetClock::start(budget);
    let mut visited = HashSet::new();
    let mut nodes = Vec::new();
    walk(
        store, symbol, direction, 1, max_depth, &mut visited, &mut nodes, &mut clock,
    )?;

    debug!(
        symbol,
        direction = direction.as_str(),
        max_depth,
        nodes = nodes.len(),
        expanded = clock.expanded(),
        "call graph walk complete"
    );
    Ok(nodes)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    store: &SqliteStore,
    symbol: &str,
    direction: Direction,
    depth: usize,
    max_depth: usize,
    visited: &mut HashSet<String>,
    nodes: &mut Vec<CallGraphNode>,
    clock: &mut BudgetClock,
) -> Result<()> {
    if depth > max_depth || !visited.insert(symbol.to_string()) {
        return Ok(());
    }

    let edges = match direction {
        Direction::Callers => store.call_edges_to_name(symbol, Some(CALL_GRAPH_FANOUT))?,
        Direction::Callees => store.call_edges_from_name(symbol, Some(CALL_GRAPH_FANOUT))?,
    };
    clock.charge()?;

    for edge in edges {
        let next = match direction {
            Direction::Callers => edge.source_name,
            Direction::Callees => edge.target_name,
        };
        nodes.push(CallGraphNode {
            symbol: next.clone(),
            file: edge.source_file,
            line: edge.line,
            depth,
            kind: edge.kind,
            confidence: edge.confidence,
        });
        walk(
            store, &next, direction, depth + 1, max_depth, visited, nodes, clock,
        )?;
    }
    Ok(())
}
