//! Variable access across the three stores: run-scoped (the engine's own
//! execution variables), chat-local and global (both persisted by the host).

use async_trait::async_trait;
use loomcore::{
    combine, require_field_or_connection, Edge, FlowDataType, FlowNode, HandleContract,
    HandleSpec, NodeCategory, NodeContext, NodeDefinition, NodeError, NodeResult, ValidationIssue,
    ValueMap,
};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VariableScope {
    Flow,
    Local,
    Global,
}

impl VariableScope {
    fn parse(raw: Option<&str>) -> Result<Self, NodeError> {
        match raw.unwrap_or("flow") {
            "flow" => Ok(VariableScope::Flow),
            "local" => Ok(VariableScope::Local),
            "global" => Ok(VariableScope::Global),
            other => Err(NodeError::Configuration(format!(
                "unknown variable scope '{other}'"
            ))),
        }
    }
}

fn validate_scope(data: &ValueMap) -> Result<(), NodeError> {
    VariableScope::parse(data.get("scope").and_then(Value::as_str)).map(|_| ())
}

/// Reads a variable from the configured scope onto its main output.
pub struct GetVariableNode;

#[async_trait]
impl NodeDefinition for GetVariableNode {
    fn node_type(&self) -> &str {
        "variables.get"
    }

    fn label(&self) -> &str {
        "Get Variable"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Variables
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::new("name", FlowDataType::String))
            .output(HandleSpec::main(FlowDataType::Any))
    }

    fn validate_data(&self, data: &ValueMap) -> Result<(), NodeError> {
        validate_scope(data)
    }

    fn validate(&self, node: &FlowNode, edges: &[Edge]) -> Vec<ValidationIssue> {
        combine([require_field_or_connection(
            &node.id, &node.data, edges, "name", "Variable name",
        )])
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let name = ctx.require_input_str("name")?;
        let scope = VariableScope::parse(node.data_str("scope"))?;
        let value = match scope {
            VariableScope::Flow => ctx.get_variable(name).await,
            VariableScope::Local => ctx.host.get_local_variable(name).await?,
            VariableScope::Global => ctx.host.get_global_variable(name).await?,
        };
        Ok(NodeResult::main(value.unwrap_or(Value::Null)))
    }
}

/// Writes its main input to a variable, then passes the value through.
pub struct SetVariableNode;

#[async_trait]
impl NodeDefinition for SetVariableNode {
    fn node_type(&self) -> &str {
        "variables.set"
    }

    fn label(&self) -> &str {
        "Set Variable"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Variables
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Any))
            .input(HandleSpec::new("name", FlowDataType::String))
            .output(HandleSpec::main(FlowDataType::Any))
    }

    fn validate_data(&self, data: &ValueMap) -> Result<(), NodeError> {
        validate_scope(data)
    }

    fn validate(&self, node: &FlowNode, edges: &[Edge]) -> Vec<ValidationIssue> {
        combine([require_field_or_connection(
            &node.id, &node.data, edges, "name", "Variable name",
        )])
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let name = ctx.require_input_str("name")?.to_string();
        let scope = VariableScope::parse(node.data_str("scope"))?;
        let value = ctx.main_input().cloned().unwrap_or(Value::Null);
        match scope {
            VariableScope::Flow => ctx.set_variable(name, value).await,
            VariableScope::Local => ctx.host.set_local_variable(&name, value).await?,
            VariableScope::Global => ctx.host.set_global_variable(&name, value).await?,
        }
        Ok(NodeResult::Passthrough)
    }
}
