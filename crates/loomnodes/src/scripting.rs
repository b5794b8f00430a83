use crate::stringify;
use async_trait::async_trait;
use loomcore::{
    combine, require_field_or_connection, Edge, FlowDataType, FlowNode, HandleContract,
    HandleSpec, NodeCategory, NodeContext, NodeDefinition, NodeError, NodeResult, ValidationIssue,
};

/// Runs a named text-substitution script over the main input.
pub struct RegexScriptNode;

#[async_trait]
impl NodeDefinition for RegexScriptNode {
    fn node_type(&self) -> &str {
        "scripting.regex"
    }

    fn label(&self) -> &str {
        "Run Regex Script"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Scripting
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::String))
            .input(HandleSpec::new("script", FlowDataType::RegexScriptId))
            .output(HandleSpec::main(FlowDataType::String))
    }

    fn validate(&self, node: &FlowNode, edges: &[Edge]) -> Vec<ValidationIssue> {
        combine([require_field_or_connection(
            &node.id, &node.data, edges, "script", "Regex script",
        )])
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let script = ctx.require_input_str("script")?.to_string();
        let text = ctx
            .main_input()
            .map(stringify)
            .ok_or_else(|| NodeError::MissingInput("main".to_string()))?;
        let replaced = ctx.host.run_regex_script(&script, &text).await?;
        Ok(NodeResult::main(replaced))
    }
}

/// Executes a slash-command pipeline; the pipe result lands on the main
/// output.
pub struct SlashCommandNode;

#[async_trait]
impl NodeDefinition for SlashCommandNode {
    fn node_type(&self) -> &str {
        "scripting.slash"
    }

    fn label(&self) -> &str {
        "Run Slash Command"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Scripting
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::new("command", FlowDataType::String))
            .output(HandleSpec::main(FlowDataType::Any))
    }

    fn validate(&self, node: &FlowNode, edges: &[Edge]) -> Vec<ValidationIssue> {
        combine([require_field_or_connection(
            &node.id, &node.data, edges, "command", "Command",
        )])
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let command = ctx.require_input_str("command")?;
        let result = ctx.host.run_slash_command(command).await?;
        Ok(NodeResult::main(result))
    }
}
