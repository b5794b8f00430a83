use crate::stringify;
use async_trait::async_trait;
use loomcore::{
    combine, require_field_or_connection, ChatMessage, Edge, FlowDataType, FlowNode,
    HandleContract, HandleSpec, NodeCategory, NodeContext, NodeDefinition, NodeError, NodeResult,
    ValidationIssue, ValueMap, MAIN_HANDLE,
};
use serde_json::Value;

/// Issues a model request through a connection profile. Takes either a raw
/// `prompt` (rendered through the host's prompt template) or pre-built
/// `messages`; with a `schema` connected the request is structured and the
/// result appears on the `structured` handle.
pub struct GenerateNode;

#[async_trait]
impl NodeDefinition for GenerateNode {
    fn node_type(&self) -> &str {
        "llm.generate"
    }

    fn label(&self) -> &str {
        "Generate"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Generation
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::String))
            .input(HandleSpec::new("profile", FlowDataType::ProfileId))
            .input(HandleSpec::new("messages", FlowDataType::Messages))
            .input(HandleSpec::new("schema", FlowDataType::Schema))
            .output(HandleSpec::main(FlowDataType::String))
            .output(HandleSpec::new("structured", FlowDataType::StructuredResult))
    }

    fn validate(&self, node: &FlowNode, edges: &[Edge]) -> Vec<ValidationIssue> {
        combine([require_field_or_connection(
            &node.id, &node.data, edges, "profile", "Connection profile",
        )])
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let profile = ctx.require_input_str("profile")?.to_string();

        let messages: Vec<ChatMessage> = match ctx.input("messages") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| NodeError::ExecutionFailed(format!("invalid messages input: {e}")))?,
            None => {
                let prompt = ctx
                    .main_input()
                    .map(stringify)
                    .ok_or_else(|| NodeError::MissingInput("main".to_string()))?;
                ctx.host.build_prompt_messages(&profile, &prompt).await?
            }
        };

        let mut output = ValueMap::new();
        match ctx.input("schema") {
            Some(schema) => {
                let result = ctx
                    .host
                    .generate_structured(&profile, &messages, schema)
                    .await?;
                output.insert(MAIN_HANDLE.to_string(), Value::String(stringify(&result)));
                output.insert("structured".to_string(), result);
            }
            None => {
                let text = ctx.host.generate(&profile, &messages).await?;
                output.insert(MAIN_HANDLE.to_string(), Value::String(text));
            }
        }
        Ok(NodeResult::Data(output))
    }
}
