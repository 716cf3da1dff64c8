use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// One planned tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// 1-based position in the plan.
    pub step_number: u32,
    /// Registry name of the tool service.
    pub mcp_name: String,
    /// Free-form action; mapped to a concrete tool at execution time.
    pub action: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl WorkflowStep {
    pub fn new(
        step_number: u32,
        mcp_name: impl Into<String>,
        action: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            step_number,
            mcp_name: mcp_name.into(),
            action: action.into(),
            input,
        }
    }
}

/// A validated, non-empty plan with contiguous step numbers from 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    steps: Vec<WorkflowStep>,
}

impl Plan {
    pub fn new(steps: Vec<WorkflowStep>) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }
        for (index, step) in steps.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.step_number != expected {
                return Err(PlanError::NonContiguous {
                    expected,
                    found: step.step_number,
                });
            }
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a constructed plan.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl TryFrom<Vec<WorkflowStep>> for Plan {
    type Error = PlanError;

    fn try_from(steps: Vec<WorkflowStep>) -> Result<Self, Self::Error> {
        Self::new(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(n: u32) -> WorkflowStep {
        WorkflowStep::new(n, "crypto", "get_price", json!({}))
    }

    #[test]
    fn test_valid_plan() {
        let plan = Plan::new(vec![step(1), step(2), step(3)]).unwrap();
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert_eq!(Plan::new(vec![]), Err(PlanError::Empty));
    }

    #[test]
    fn test_gaps_and_wrong_start_rejected() {
        assert_eq!(
            Plan::new(vec![step(1), step(3)]),
            Err(PlanError::NonContiguous {
                expected: 2,
                found: 3
            })
        );
        assert_eq!(
            Plan::new(vec![step(0)]),
            Err(PlanError::NonContiguous {
                expected: 1,
                found: 0
            })
        );
    }

    #[test]
    fn test_step_deserializes_without_input() {
        let step: WorkflowStep = serde_json::from_value(json!({
            "step_number": 1,
            "mcp_name": "crypto",
            "action": "get_price"
        }))
        .unwrap();
        assert_eq!(step.input, serde_json::Value::Null);
    }
}
