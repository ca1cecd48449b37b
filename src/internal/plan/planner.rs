use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::internal::{
    actions::spec::ActionDescriptor,
    config::{Config, ConfigError},
    exec::constraints::{Budget, BudgetStatus, ConstraintChecker},
    plan::{
        clock::{MonotonicClock, SystemClock},
        ir::{ActionSpec, Plan, PlanMeta, PlanValidationError},
    },
    registry::ActionCatalog,
};

/// Derives the target actions for a goal. Must be pure.
///
/// `candidates` is already tier-filtered and in catalog order; the planner
/// re-imposes catalog order on whatever is returned.
pub trait SelectionStrategy: Send + Sync {
    fn select<'a>(&self, goal: &str, candidates: &[&'a ActionDescriptor]) -> Vec<&'a ActionDescriptor>;
}

/// Targets every action whose keywords intersect the goal's words.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordStrategy;

impl KeywordStrategy {
    /// Lowercased alphanumeric words of `goal`.
    pub fn tokens(goal: &str) -> BTreeSet<String> {
        goal.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl SelectionStrategy for KeywordStrategy {
    fn select<'a>(&self, goal: &str, candidates: &[&'a ActionDescriptor]) -> Vec<&'a ActionDescriptor> {
        let tokens = Self::tokens(goal);
        candidates
            .iter()
            .copied()
            .filter(|action| !action.profile().keywords.is_disjoint(&tokens))
            .collect()
    }
}

pub struct Planner {
    clock: Box<dyn MonotonicClock>,
    strategy: Box<dyn SelectionStrategy>,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    pub fn new() -> Self {
        Self {
            clock: Box::new(SystemClock::new()),
            strategy: Box::new(KeywordStrategy),
        }
    }

    pub fn with_clock(mut self, clock: impl MonotonicClock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_strategy(mut self, strategy: impl SelectionStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Produces a resource-bounded plan for `goal`. No action is invoked.
    ///
    /// Running out of steps or time is reported through `meta`, not as an error.
    pub fn plan(&self, goal: &str, config: &Config, catalog: &ActionCatalog) -> Result<Plan, PlanError> {
        config.validate()?;
        let budget = Budget::start(config, self.clock.as_ref());
        let tier = config.resource_tier;

        let mut meta = PlanMeta {
            truncated: false,
            time_capped: false,
            tier: tier.as_str().to_string(),
        };

        let normalized = goal.trim();
        if normalized.is_empty() {
            debug!("Empty goal; returning empty plan");
            return Ok(Plan {
                goal: goal.to_string(),
                steps: Vec::new(),
                meta,
            });
        }

        let candidates: Vec<&ActionDescriptor> = catalog
            .iter()
            .filter(|action| ConstraintChecker::admits(tier, action.cost_hint()))
            .collect();

        let targets = self.strategy.select(goal, &candidates);
        let selected = close_over_preconditions(&candidates, &targets)?;
        let ordered = order_by_dependencies(&candidates, selected)?;

        let mut steps = Vec::with_capacity(ordered.len());
        for action in ordered {
            match budget.check(steps.len(), self.clock.as_ref()) {
                BudgetStatus::Within => {}
                BudgetStatus::StepsExhausted => {
                    meta.truncated = true;
                    warn!(max_steps = budget.max_steps, "Plan truncated at step limit");
                    break;
                }
                BudgetStatus::TimeExhausted => {
                    meta.time_capped = true;
                    warn!(
                        max_seconds = budget.max_elapsed.as_secs_f64(),
                        emitted = steps.len(),
                        "Plan capped by time budget"
                    );
                    break;
                }
            }
            steps.push(to_step(steps.len() + 1, normalized, action));
        }

        let plan = Plan {
            goal: goal.to_string(),
            steps,
            meta,
        };
        plan.validate(budget.max_steps)?;

        info!(
            steps = plan.steps.len(),
            truncated = plan.meta.truncated,
            time_capped = plan.meta.time_capped,
            tier = %plan.meta.tier,
            "Plan generated"
        );
        Ok(plan)
    }
}

/// Plans with the real clock and keyword selection.
pub fn plan(goal: &str, config: &Config, catalog: &ActionCatalog) -> Result<Plan, PlanError> {
    Planner::new().plan(goal, config, catalog)
}

/// Adds, for every unmet precondition, the first provider in catalog order
/// until the selection is closed. Returns candidate indices.
fn close_over_preconditions(
    candidates: &[&ActionDescriptor],
    targets: &[&ActionDescriptor],
) -> Result<BTreeSet<usize>, PlanError> {
    let index_of = |name: &str| candidates.iter().position(|c| c.name() == name);
    let mut selected: BTreeSet<usize> = targets
        .iter()
        .filter_map(|target| index_of(target.name()))
        .collect();

    loop {
        let mut additions = BTreeSet::new();
        for &idx in &selected {
            let action = candidates[idx];
            for label in &action.profile().preconditions {
                let provided = selected
                    .iter()
                    .chain(additions.iter())
                    .any(|&s| candidates[s].profile().effects.contains(label));
                if provided {
                    continue;
                }
                let provider = candidates
                    .iter()
                    .position(|c| c.profile().effects.contains(label))
                    .ok_or_else(|| PlanError::UnsatisfiedPrecondition {
                        action: action.name().to_string(),
                        label: label.clone(),
                    })?;
                additions.insert(provider);
            }
        }
        if additions.is_empty() {
            return Ok(selected);
        }
        selected.extend(additions);
    }
}

/// Repeatedly emits the earliest (catalog order) action whose preconditions are
/// already satisfied.
fn order_by_dependencies<'a>(
    candidates: &[&'a ActionDescriptor],
    selected: BTreeSet<usize>,
) -> Result<Vec<&'a ActionDescriptor>, PlanError> {
    let mut remaining: Vec<usize> = selected.into_iter().collect();
    let mut satisfied: BTreeSet<String> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .position(|&idx| candidates[idx].profile().preconditions.is_subset(&satisfied));
        let Some(pos) = ready else {
            return Err(PlanError::DependencyCycle {
                actions: remaining
                    .iter()
                    .map(|&idx| candidates[idx].name().to_string())
                    .collect(),
            });
        };
        let action = candidates[remaining.remove(pos)];
        satisfied.extend(action.profile().effects.iter().cloned());
        ordered.push(action);
    }

    Ok(ordered)
}

fn to_step(position: usize, goal: &str, action: &ActionDescriptor) -> ActionSpec {
    let profile = action.profile();
    let mut params = profile.defaults.clone();
    params.insert("goal".to_string(), serde_json::Value::String(goal.to_string()));
    ActionSpec {
        id: format!("step-{position}"),
        action: action.name().to_string(),
        params,
        preconditions: profile.preconditions.clone(),
        effects: profile.effects.clone(),
        cost_hint: profile.cost_hint,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Action {action} requires '{label}' but no admissible action provides it")]
    UnsatisfiedPrecondition { action: String, label: String },
    #[error("Dependency cycle among actions: {}", actions.join(", "))]
    DependencyCycle { actions: Vec<String> },
    #[error(transparent)]
    Invalid(#[from] PlanValidationError),
}
