//! Branching, loops and run termination.

use async_trait::async_trait;
use loomcore::{
    combine, require_connection, require_field_or_connection, Edge, FlowDataType, FlowError,
    FlowNode, HandleContract, HandleSpec, NodeCategory, NodeContext, NodeDefinition, NodeError,
    NodeResult, RunOutput, RunStatus, ValidationIssue, ValueMap, MAIN_HANDLE,
};
use serde_json::Value;

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Routes its main input to exactly one of two output handles based on the
/// `condition` input.
pub struct IfNode;

#[async_trait]
impl NodeDefinition for IfNode {
    fn node_type(&self) -> &str {
        "control.if"
    }

    fn label(&self) -> &str {
        "If"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Control
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Any))
            .input(HandleSpec::new("condition", FlowDataType::Boolean))
            .output(HandleSpec::new("true", FlowDataType::Any))
            .output(HandleSpec::new("false", FlowDataType::Any))
    }

    fn validate(&self, node: &FlowNode, edges: &[Edge]) -> Vec<ValidationIssue> {
        combine([require_field_or_connection(
            &node.id,
            &node.data,
            edges,
            "condition",
            "Condition",
        )
        .map(|i| ValidationIssue::warning(i.message).for_field("condition"))])
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let branch = if truthy(ctx.input("condition")) {
            "true"
        } else {
            "false"
        };
        let value = ctx.main_input().cloned().unwrap_or(Value::Null);
        Ok(NodeResult::single(branch, value))
    }

    fn edges_to_follow(&self, output: &ValueMap, outgoing: &[Edge]) -> Option<Vec<Edge>> {
        // Exactly the edges leaving the branch handle the output landed on.
        Some(
            outgoing
                .iter()
                .filter(|e| output.contains_key(e.source_key()))
                .cloned()
                .collect(),
        )
    }
}

/// Delegates each element of its `items` array to a sub-flow invocation and
/// accumulates the nested runs' last outputs.
pub struct ForEachNode;

#[async_trait]
impl NodeDefinition for ForEachNode {
    fn node_type(&self) -> &str {
        "control.for_each"
    }

    fn label(&self) -> &str {
        "For Each"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Control
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::new("items", FlowDataType::Array))
            .input(HandleSpec::new("flow", FlowDataType::FlowId))
            .output(HandleSpec::new("results", FlowDataType::Array))
    }

    fn validate(&self, node: &FlowNode, edges: &[Edge]) -> Vec<ValidationIssue> {
        combine([
            require_connection(&node.id, edges, Some("items"), "Items"),
            require_field_or_connection(&node.id, &node.data, edges, "flow", "Flow"),
        ])
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let flow_id = ctx.require_input_str("flow")?.to_string();
        let items = ctx.require_input_array("items")?.clone();

        let mut results: Vec<Value> = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            // Cancellation is checked at iteration boundaries; a running
            // iteration is never interrupted.
            if ctx.cancellation.is_cancelled() {
                return Err(NodeError::Cancelled);
            }

            let mut entry = ValueMap::new();
            entry.insert("item".to_string(), item);
            entry.insert("index".to_string(), Value::from(index));

            let report = ctx
                .run_sub_flow(&flow_id, entry)
                .await
                .map_err(|e| subflow_error(index, e))?;

            match report.status {
                RunStatus::Aborted => return Err(NodeError::Cancelled),
                RunStatus::Failed => {
                    let message = report
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "sub-flow failed".to_string());
                    return Err(NodeError::SubFlow { index, message });
                }
                RunStatus::Completed => {}
            }

            match report.last_output {
                Some(RunOutput::BreakLoop) => {
                    tracing::debug!(node_id = %node.id, index, "loop break");
                    break;
                }
                Some(RunOutput::ContinueLoop) => continue,
                Some(RunOutput::Value(v)) => results.push(v),
                None => results.push(Value::Null),
            }
        }

        Ok(NodeResult::single("results", Value::Array(results)))
    }
}

fn subflow_error(index: usize, error: FlowError) -> NodeError {
    match error {
        FlowError::Aborted => NodeError::Cancelled,
        other => NodeError::SubFlow {
            index,
            message: other.to_string(),
        },
    }
}

/// Stops the nearest enclosing loop.
pub struct BreakNode;

#[async_trait]
impl NodeDefinition for BreakNode {
    fn node_type(&self) -> &str {
        "control.break"
    }

    fn label(&self) -> &str {
        "Break Loop"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Control
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new().input(HandleSpec::main(FlowDataType::Any))
    }

    async fn execute(&self, _node: &FlowNode, _ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::BreakLoop)
    }
}

/// Skips the current loop iteration's result.
pub struct ContinueNode;

#[async_trait]
impl NodeDefinition for ContinueNode {
    fn node_type(&self) -> &str {
        "control.continue"
    }

    fn label(&self) -> &str {
        "Continue Loop"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Control
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new().input(HandleSpec::main(FlowDataType::Any))
    }

    async fn execute(&self, _node: &FlowNode, _ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::ContinueLoop)
    }
}

/// Ends the run normally.
pub struct EndFlowNode;

#[async_trait]
impl NodeDefinition for EndFlowNode {
    fn node_type(&self) -> &str {
        "control.end"
    }

    fn label(&self) -> &str {
        "End Flow"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Control
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new().input(HandleSpec::main(FlowDataType::Any))
    }

    async fn execute(&self, _node: &FlowNode, _ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::EndFlow)
    }
}

/// Invokes another flow once, forwarding this node's main input as the entry
/// payload and returning the nested run's last output.
pub struct RunFlowNode;

#[async_trait]
impl NodeDefinition for RunFlowNode {
    fn node_type(&self) -> &str {
        "control.run_flow"
    }

    fn label(&self) -> &str {
        "Run Flow"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Control
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Any))
            .input(HandleSpec::new("flow", FlowDataType::FlowId))
            .output(HandleSpec::main(FlowDataType::Any))
    }

    fn validate(&self, node: &FlowNode, edges: &[Edge]) -> Vec<ValidationIssue> {
        combine([require_field_or_connection(
            &node.id, &node.data, edges, "flow", "Flow",
        )])
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let flow_id = ctx.require_input_str("flow")?.to_string();

        let mut entry = ValueMap::new();
        if let Some(main) = ctx.main_input() {
            entry.insert(MAIN_HANDLE.to_string(), main.clone());
        }

        let report = ctx.run_sub_flow(&flow_id, entry).await.map_err(|e| match e {
            FlowError::Aborted => NodeError::Cancelled,
            other => NodeError::ExecutionFailed(other.to_string()),
        })?;

        match report.status {
            RunStatus::Aborted => return Err(NodeError::Cancelled),
            RunStatus::Failed => {
                let message = report
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "sub-flow failed".to_string());
                return Err(NodeError::ExecutionFailed(message));
            }
            RunStatus::Completed => {}
        }

        // A sentinel escaping the nested flow keeps its meaning here, so a
        // loop body factored into its own flow can still break the loop.
        Ok(match report.last_output {
            Some(RunOutput::BreakLoop) => NodeResult::BreakLoop,
            Some(RunOutput::ContinueLoop) => NodeResult::ContinueLoop,
            Some(RunOutput::Value(v)) => NodeResult::main(v),
            None => NodeResult::Data(ValueMap::new()),
        })
    }
}
