use crate::stringify;
use async_trait::async_trait;
use loomcore::{
    combine, require_field_or_connection, Edge, FlowDataType, FlowNode, HandleContract,
    HandleSpec, LorebookEntry, LorebookScope, NodeCategory, NodeContext, NodeDefinition,
    NodeError, NodeResult, ValidationIssue, ValueMap,
};
use serde_json::Value;

fn parse_scope(raw: Option<&str>) -> Result<LorebookScope, NodeError> {
    match raw.unwrap_or("all") {
        "all" => Ok(LorebookScope::All),
        "global" => Ok(LorebookScope::Global),
        "character" => Ok(LorebookScope::Character),
        "chat" => Ok(LorebookScope::Chat),
        "persona" => Ok(LorebookScope::Persona),
        other => Err(NodeError::Configuration(format!(
            "unknown lorebook scope '{other}'"
        ))),
    }
}

/// Adds an entry to a lorebook; emits the uid the host assigned.
pub struct AddLorebookEntryNode;

#[async_trait]
impl NodeDefinition for AddLorebookEntryNode {
    fn node_type(&self) -> &str {
        "lorebook.add_entry"
    }

    fn label(&self) -> &str {
        "Add Lorebook Entry"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Lorebook
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::String))
            .input(HandleSpec::new("lorebook", FlowDataType::LorebookName))
            .output(HandleSpec::new("uid", FlowDataType::Number))
    }

    fn validate(&self, node: &FlowNode, edges: &[Edge]) -> Vec<ValidationIssue> {
        combine([require_field_or_connection(
            &node.id, &node.data, edges, "lorebook", "Lorebook",
        )])
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let lorebook = ctx.require_input_str("lorebook")?.to_string();
        let content = ctx
            .main_input()
            .map(stringify)
            .ok_or_else(|| NodeError::MissingInput("main".to_string()))?;
        let keys = node
            .data_str("keys")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let uid = ctx
            .host
            .add_lorebook_entry(LorebookEntry {
                lorebook,
                uid: None,
                keys,
                content,
                enabled: true,
                comment: node.data_str("comment").map(str::to_string),
            })
            .await?;
        Ok(NodeResult::single("uid", Value::from(uid)))
    }
}

/// Enumerates lorebook entries within a scope onto the `entries` handle.
pub struct ListLorebookEntriesNode;

#[async_trait]
impl NodeDefinition for ListLorebookEntriesNode {
    fn node_type(&self) -> &str {
        "lorebook.list_entries"
    }

    fn label(&self) -> &str {
        "List Lorebook Entries"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Lorebook
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Any))
            .output(HandleSpec::new("entries", FlowDataType::Array))
    }

    fn validate_data(&self, data: &ValueMap) -> Result<(), NodeError> {
        parse_scope(data.get("scope").and_then(Value::as_str)).map(|_| ())
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let scope = parse_scope(node.data_str("scope"))?;
        let entries = ctx.host.list_lorebook_entries(scope).await?;
        let entries = serde_json::to_value(entries)
            .map_err(|e| NodeError::ExecutionFailed(e.to_string()))?;
        Ok(NodeResult::single("entries", entries))
    }
}
