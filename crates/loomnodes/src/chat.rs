//! Chat-surface side effects. These nodes pass their main input through so
//! they can sit in the middle of a pipeline.

use crate::stringify;
use async_trait::async_trait;
use loomcore::{
    ChatRole, FlowDataType, FlowNode, HandleContract, HandleSpec, NodeCategory, NodeContext,
    NodeDefinition, NodeError, NodeResult, ValueMap,
};
use serde_json::Value;

fn parse_role(raw: Option<&str>) -> Result<ChatRole, NodeError> {
    match raw.unwrap_or("assistant") {
        "system" => Ok(ChatRole::System),
        "user" => Ok(ChatRole::User),
        "assistant" => Ok(ChatRole::Assistant),
        other => Err(NodeError::Configuration(format!(
            "unknown chat role '{other}'"
        ))),
    }
}

/// Sends the main input as a chat message with a configurable role and
/// optional display name.
pub struct SendMessageNode;

#[async_trait]
impl NodeDefinition for SendMessageNode {
    fn node_type(&self) -> &str {
        "chat.send_message"
    }

    fn label(&self) -> &str {
        "Send Message"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Chat
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::String))
            .output(HandleSpec::main(FlowDataType::String))
    }

    fn validate_data(&self, data: &ValueMap) -> Result<(), NodeError> {
        parse_role(data.get("role").and_then(Value::as_str)).map(|_| ())
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let text = ctx
            .main_input()
            .map(stringify)
            .ok_or_else(|| NodeError::MissingInput("main".to_string()))?;
        let role = parse_role(node.data_str("role"))?;
        ctx.host
            .send_chat_message(role, &text, node.data_str("name"))
            .await?;
        Ok(NodeResult::Passthrough)
    }
}

/// Replaces the pending chat-input text with the main input.
pub struct SetInputNode;

#[async_trait]
impl NodeDefinition for SetInputNode {
    fn node_type(&self) -> &str {
        "chat.set_input"
    }

    fn label(&self) -> &str {
        "Set Chat Input"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Chat
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::String))
            .output(HandleSpec::main(FlowDataType::String))
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let text = ctx
            .main_input()
            .map(stringify)
            .ok_or_else(|| NodeError::MissingInput("main".to_string()))?;
        ctx.host.set_input_text(&text).await?;
        Ok(NodeResult::Passthrough)
    }
}
