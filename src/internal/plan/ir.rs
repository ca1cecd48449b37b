use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::internal::actions::spec::is_valid_identifier;

/// One planned step. Never mutated after the planner emits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub id: String,
    pub action: String,
    pub params: BTreeMap<String, Value>,
    pub preconditions: BTreeSet<String>,
    pub effects: BTreeSet<String>,
    /// `None` means the action declared no bound.
    pub cost_hint: Option<f64>,
}

impl ActionSpec {
    pub fn validate(&self) -> Result<(), PlanValidationError> {
        if !is_valid_identifier(&self.id) {
            return Err(PlanValidationError::InvalidStepId(self.id.clone()));
        }
        if self.action.trim().is_empty() {
            return Err(PlanValidationError::EmptyAction(self.id.clone()));
        }
        if let Some(cost) = self.cost_hint {
            if !cost.is_finite() || cost < 0.0 {
                return Err(PlanValidationError::InvalidCost {
                    id: self.id.clone(),
                    cost,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMeta {
    pub truncated: bool,
    pub time_capped: bool,
    pub tier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<ActionSpec>,
    pub meta: PlanMeta,
}

impl Plan {
    pub fn validate(&self, max_steps: usize) -> Result<(), PlanValidationError> {
        if self.steps.len() > max_steps {
            return Err(PlanValidationError::TooManySteps {
                steps: self.steps.len(),
                max_steps,
            });
        }

        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            step.validate()?;
            if !seen_ids.insert(step.id.as_str()) {
                return Err(PlanValidationError::DuplicateStepId(step.id.clone()));
            }
        }

        Ok(())
    }

    pub fn actions(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.action.as_str()).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanValidationError {
    #[error("Invalid step id: {0}")]
    InvalidStepId(String),
    #[error("Step {0} has an empty action name")]
    EmptyAction(String),
    #[error("Step {id} has invalid cost_hint {cost}")]
    InvalidCost { id: String, cost: f64 },
    #[error("Duplicate step ID: {0}")]
    DuplicateStepId(String),
    #[error("Plan has {steps} steps, exceeding max_steps {max_steps}")]
    TooManySteps { steps: usize, max_steps: usize },
}
