//! Conditional branching node
//!
//! Evaluates a declared condition against the run's variables or the last
//! message and returns `"true"` or `"false"` as the branch label. The
//! chosen branch is recorded in `conditional_results` under this node's
//! id, and the executor follows the outgoing edge whose condition matches.

use super::{NodeContext, NodeOutcome, WorkflowNode};
use crate::error::{Result, WorkflowError};
use crate::registry::NodeKind;
use crate::state::ExecutionState;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// Branch label for a satisfied condition
pub const BRANCH_TRUE: &str = "true";
/// Branch label for an unsatisfied condition
pub const BRANCH_FALSE: &str = "false";

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    /// Values are equal (string or structural)
    Equals,
    /// Values differ
    NotEquals,
    /// String input contains the value substring
    Contains,
    /// String input matches the value as a regular expression
    Matches,
    /// Input resolves to a non-null value
    Exists,
    /// Numeric input is greater than the value
    GreaterThan,
    /// Numeric input is less than the value
    LessThan,
}

/// Declarative condition evaluated against execution state
///
/// `input` selects the probed value: `lastMessage` reads the most recent
/// message's content, `variables.<name>` reads a run variable (either key
/// case works). Shared by the conditional and loop nodes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSpec {
    /// Probe selector
    pub input: String,
    /// Comparison to apply
    pub operator: ConditionOperator,
    /// Right-hand side; unused by `exists`
    #[serde(default)]
    pub value: Option<Value>,
}

impl ConditionSpec {
    fn resolve_input(&self, state: &ExecutionState) -> Option<Value> {
        if self.input == "lastMessage" {
            return state
                .messages
                .last()
                .map(|m| Value::String(m.content.clone()));
        }
        if let Some(name) = self.input.strip_prefix("variables.") {
            return state.variable(name).cloned();
        }
        None
    }

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn as_text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Evaluate against `state`
    pub fn evaluate(&self, state: &ExecutionState) -> Result<bool> {
        let input = self.resolve_input(state);

        if self.operator == ConditionOperator::Exists {
            return Ok(matches!(input, Some(ref v) if !v.is_null()));
        }

        let input = match input {
            Some(v) => v,
            None => return Ok(false),
        };
        let expected = self.value.clone().unwrap_or(Value::Null);

        let result = match self.operator {
            ConditionOperator::Equals => {
                input == expected || Self::as_text(&input) == Self::as_text(&expected)
            }
            ConditionOperator::NotEquals => {
                input != expected && Self::as_text(&input) != Self::as_text(&expected)
            }
            ConditionOperator::Contains => {
                Self::as_text(&input).contains(&Self::as_text(&expected))
            }
            ConditionOperator::Matches => {
                let pattern = Self::as_text(&expected);
                let re = Regex::new(&pattern).map_err(|e| {
                    WorkflowError::validation(format!("invalid condition pattern '{pattern}': {e}"))
                })?;
                re.is_match(&Self::as_text(&input))
            }
            ConditionOperator::GreaterThan => {
                match (Self::as_f64(&input), Self::as_f64(&expected)) {
                    (Some(a), Some(b)) => a > b,
                    _ => false,
                }
            }
            ConditionOperator::LessThan => {
                match (Self::as_f64(&input), Self::as_f64(&expected)) {
                    (Some(a), Some(b)) => a < b,
                    _ => false,
                }
            }
            ConditionOperator::Exists => unreachable!("handled above"),
        };
        Ok(result)
    }
}

/// Branching step
#[derive(Debug)]
pub struct ConditionalNode {
    id: String,
    condition: ConditionSpec,
}

impl ConditionalNode {
    /// Node with the blueprint node id and validated config
    pub fn from_config(id: impl Into<String>, config: &Value) -> Result<Self> {
        let condition: ConditionSpec = serde_json::from_value(config.clone())
            .map_err(|e| WorkflowError::validation(format!("conditional node config: {e}")))?;
        Ok(Self {
            id: id.into(),
            condition,
        })
    }
}

#[async_trait]
impl WorkflowNode for ConditionalNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Conditional
    }

    async fn run(&self, state: &mut ExecutionState, _ctx: &NodeContext) -> Result<NodeOutcome> {
        let branch = if self.condition.evaluate(state)? {
            BRANCH_TRUE
        } else {
            BRANCH_FALSE
        };
        state.record_branch(&self.id, branch);
        Ok(NodeOutcome::branch(branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::WorkflowConfig;
    use crate::nodes::test_support::{context, state_with_user};
    use serde_json::json;

    async fn run_condition(config: Value, state: &mut ExecutionState) -> NodeOutcome {
        ConditionalNode::from_config("cond", &config)
            .unwrap()
            .run(state, &context(WorkflowConfig::new("x", "m")))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn last_message_contains() {
        let mut state = state_with_user("please search the docs");
        let outcome = run_condition(
            json!({"input": "lastMessage", "operator": "contains", "value": "search"}),
            &mut state,
        )
        .await;

        assert_eq!(outcome, NodeOutcome::branch(BRANCH_TRUE));
        assert_eq!(
            state.conditional_results.as_ref().unwrap()["cond"],
            BRANCH_TRUE
        );
    }

    #[tokio::test]
    async fn variable_comparison_with_camel_case_name() {
        let mut state = state_with_user("hi");
        state.set_variable("retry_count", json!(3));

        let outcome = run_condition(
            json!({"input": "variables.retryCount", "operator": "greaterThan", "value": 2}),
            &mut state,
        )
        .await;
        assert_eq!(outcome, NodeOutcome::branch(BRANCH_TRUE));

        let outcome = run_condition(
            json!({"input": "variables.retryCount", "operator": "lessThan", "value": 2}),
            &mut state,
        )
        .await;
        assert_eq!(outcome, NodeOutcome::branch(BRANCH_FALSE));
    }

    #[tokio::test]
    async fn exists_checks_presence() {
        let mut state = state_with_user("hi");
        let outcome = run_condition(
            json!({"input": "variables.missing", "operator": "exists"}),
            &mut state,
        )
        .await;
        assert_eq!(outcome, NodeOutcome::branch(BRANCH_FALSE));

        state.set_variable("missing", json!("here"));
        let outcome = run_condition(
            json!({"input": "variables.missing", "operator": "exists"}),
            &mut state,
        )
        .await;
        assert_eq!(outcome, NodeOutcome::branch(BRANCH_TRUE));
    }

    #[tokio::test]
    async fn regex_match_and_invalid_pattern() {
        let mut state = state_with_user("order #4521 status");
        let outcome = run_condition(
            json!({"input": "lastMessage", "operator": "matches", "value": r"#\d+"}),
            &mut state,
        )
        .await;
        assert_eq!(outcome, NodeOutcome::branch(BRANCH_TRUE));

        let err = ConditionalNode::from_config(
            "cond",
            &json!({"input": "lastMessage", "operator": "matches", "value": "["}),
        )
        .unwrap()
        .run(&mut state, &context(WorkflowConfig::new("x", "m")))
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[tokio::test]
    async fn unknown_input_evaluates_false() {
        let mut state = state_with_user("hi");
        let outcome = run_condition(
            json!({"input": "somethingElse", "operator": "equals", "value": "hi"}),
            &mut state,
        )
        .await;
        assert_eq!(outcome, NodeOutcome::branch(BRANCH_FALSE));
    }
}
