use std::time::Duration;

use crate::internal::{
    config::{Config, ResourceTier},
    plan::clock::MonotonicClock,
};

/// Actions on the mobile tier must cost strictly less than this.
pub const MOBILE_COST_CEILING: f64 = 0.5;
/// Actions on the edge tier must cost strictly less than this.
pub const EDGE_COST_CEILING: f64 = 2.0;

/// Cost ceiling of a tier; `None` means no ceiling at all.
pub fn cost_ceiling(tier: ResourceTier) -> Option<f64> {
    match tier {
        ResourceTier::Mobile => Some(MOBILE_COST_CEILING),
        ResourceTier::Edge => Some(EDGE_COST_CEILING),
        ResourceTier::Server => None,
    }
}

pub struct ConstraintChecker;

impl ConstraintChecker {
    /// Whether an action with `cost_hint` may be planned on `tier`.
    ///
    /// An absent cost hint is unbounded and only fits a tier without a ceiling.
    pub fn admits(tier: ResourceTier, cost_hint: Option<f64>) -> bool {
        match (cost_ceiling(tier), cost_hint) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(ceiling), Some(cost)) => cost < ceiling,
        }
    }
}

/// Step and wall-time allowance of one planning call.
#[derive(Debug, Clone)]
pub struct Budget {
    pub max_steps: usize,
    pub max_elapsed: Duration,
    started_at: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Within,
    StepsExhausted,
    TimeExhausted,
}

impl Budget {
    pub fn start(config: &Config, clock: &dyn MonotonicClock) -> Self {
        Self {
            max_steps: config.planner_max_steps as usize,
            max_elapsed: Duration::try_from_secs_f64(config.planner_max_seconds)
                .unwrap_or(Duration::ZERO),
            started_at: clock.now(),
        }
    }

    /// Checked before emitting each step; the step bound wins over the time bound.
    pub fn check(&self, emitted: usize, clock: &dyn MonotonicClock) -> BudgetStatus {
        if emitted >= self.max_steps {
            return BudgetStatus::StepsExhausted;
        }
        if clock.now().saturating_sub(self.started_at) > self.max_elapsed {
            return BudgetStatus::TimeExhausted;
        }
        BudgetStatus::Within
    }
}
