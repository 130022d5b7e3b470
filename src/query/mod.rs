pub mod cycles;
pub mod deps;
pub mod graph;
pub mod impact;
pub mod paths;

use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};

pub const MAX_PATH_DEPTH: usize = 10;
pub const MAX_IMPACT_DEPTH: usize = 5;
pub const MAX_CALL_GRAPH_DEPTH: usize = 5;
pub const CYCLE_DEPTH_LIMIT: usize = 10;
pub const DEFAULT_CALL_LIMIT: usize = 50;
pub const CALL_GRAPH_FANOUT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraversalBudget {
    pub wall_clock: Option<Duration>,
}

impl TraversalBudget {
    pub fn unlimited() -> Self {
        Self { wall_clock: None }
    }

    pub fn wall_clock(budget: Duration) -> Self {
        Self {
            wall_clock: Some(budget),
        }
    }
}

// Charged once per expanded entity so a timeout carries partial-progress
// metadata instead of silently truncating the result.
pub(crate) struct BudgetClock {
    started: Instant,
    budget: TraversalBudget,
    expanded: usize,
}

impl BudgetClock {
    pub(crate) fn start(budget: TraversalBudget) -> Self {
        Self {
            started: Instant::now(),
            budget,
            expanded: 0,
        }
    }

    pub(crate) fn charge(&mut self) -> Result<()> {
        self.expanded += 1;
        if let Some(wall_clock) = self.budget.wall_clock
            && self.started.elapsed() > wall_clock
        {
            return Err(EngineError::Timeout {
                budget: wall_clock,
                expanded: self.expanded,
            });
        }
        Ok(())
    }

    pub(crate) fn expanded(&self) -> usize {
        self.expanded
    }
}

pub(crate) fn validate_depth(field: &'static str, requested: usize, max: usize) -> Result<()> {
    if requested == 0 || requested > max {
        return Err(EngineError::validation(field, requested.to_string()));
    }
    Ok(())
}
