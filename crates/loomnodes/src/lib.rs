//! Built-in node library.
//!
//! One module per category; every node type implements
//! `loomcore::NodeDefinition` and talks to the host exclusively through
//! `HostBridge`.

mod chat;
mod control;
mod data;
mod llm;
mod lorebook;
mod scripting;
mod trigger;
mod variables;

pub use chat::{SendMessageNode, SetInputNode};
pub use control::{BreakNode, ContinueNode, EndFlowNode, ForEachNode, IfNode, RunFlowNode};
pub use data::{GetPropertyNode, MergeObjectsNode, TemplateNode};
pub use llm::GenerateNode;
pub use lorebook::{AddLorebookEntryNode, ListLorebookEntriesNode};
pub use scripting::{RegexScriptNode, SlashCommandNode};
pub use trigger::ManualTriggerNode;
pub use variables::{GetVariableNode, SetVariableNode};

use loomcore::RegistryError;
use loomruntime::NodeRegistry;
use std::sync::Arc;

/// Register every built-in node type. Fails on a duplicate type name, which
/// indicates a wiring mistake at startup.
pub fn register_all(registry: &mut NodeRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(trigger::ManualTriggerNode))?;
    registry.register(Arc::new(control::IfNode))?;
    registry.register(Arc::new(control::ForEachNode))?;
    registry.register(Arc::new(control::BreakNode))?;
    registry.register(Arc::new(control::ContinueNode))?;
    registry.register(Arc::new(control::EndFlowNode))?;
    registry.register(Arc::new(control::RunFlowNode))?;
    registry.register(Arc::new(data::GetPropertyNode))?;
    registry.register(Arc::new(data::MergeObjectsNode))?;
    registry.register(Arc::new(data::TemplateNode))?;
    registry.register(Arc::new(variables::GetVariableNode))?;
    registry.register(Arc::new(variables::SetVariableNode))?;
    registry.register(Arc::new(chat::SendMessageNode))?;
    registry.register(Arc::new(chat::SetInputNode))?;
    registry.register(Arc::new(llm::GenerateNode))?;
    registry.register(Arc::new(lorebook::AddLorebookEntryNode))?;
    registry.register(Arc::new(lorebook::ListLorebookEntriesNode))?;
    registry.register(Arc::new(scripting::RegexScriptNode))?;
    registry.register(Arc::new(scripting::SlashCommandNode))?;
    Ok(())
}

/// Render any value as text: strings verbatim, everything else as JSON.
pub(crate) fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
