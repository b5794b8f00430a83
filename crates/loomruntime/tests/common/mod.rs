//! Shared scaffolding for runtime integration tests: an inert host bridge and
//! a handful of minimal node definitions exercising each engine behavior.

use async_trait::async_trait;
use loomcore::{
    CharacterRecord, ChatMessage, ChatRole, Edge, FlowDataType, FlowNode, HandleContract,
    HandleSpec, HostBridge, HostError, LorebookEntry, LorebookScope, NodeCategory, NodeContext,
    NodeDefinition, NodeError, NodeResult, ValueMap, MAIN_HANDLE,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Host bridge that stores variables in memory and rejects everything else.
#[derive(Default)]
pub struct StubHost {
    local_vars: Mutex<HashMap<String, Value>>,
    global_vars: Mutex<HashMap<String, Value>>,
}

fn unsupported() -> HostError {
    HostError::Unsupported("stub host".to_string())
}

#[async_trait]
impl HostBridge for StubHost {
    async fn build_prompt_messages(
        &self,
        _profile_id: &str,
        prompt: &str,
    ) -> Result<Vec<ChatMessage>, HostError> {
        Ok(vec![ChatMessage::new(ChatRole::User, prompt)])
    }

    async fn generate(
        &self,
        _profile_id: &str,
        _messages: &[ChatMessage],
    ) -> Result<String, HostError> {
        Err(unsupported())
    }

    async fn generate_structured(
        &self,
        _profile_id: &str,
        _messages: &[ChatMessage],
        _schema: &Value,
    ) -> Result<Value, HostError> {
        Err(unsupported())
    }

    async fn execution_context(&self) -> Result<Value, HostError> {
        Ok(Value::Null)
    }

    async fn create_character(&self, _character: CharacterRecord) -> Result<(), HostError> {
        Err(unsupported())
    }

    async fn update_character(&self, _avatar: &str, _fields: ValueMap) -> Result<(), HostError> {
        Err(unsupported())
    }

    async fn create_lorebook(&self, _name: &str) -> Result<(), HostError> {
        Err(unsupported())
    }

    async fn add_lorebook_entry(&self, _entry: LorebookEntry) -> Result<u32, HostError> {
        Err(unsupported())
    }

    async fn update_lorebook_entry(
        &self,
        _lorebook: &str,
        _uid: u32,
        _fields: ValueMap,
    ) -> Result<(), HostError> {
        Err(unsupported())
    }

    async fn list_lorebook_entries(
        &self,
        _scope: LorebookScope,
    ) -> Result<Vec<LorebookEntry>, HostError> {
        Ok(Vec::new())
    }

    async fn send_chat_message(
        &self,
        _role: ChatRole,
        _text: &str,
        _name: Option<&str>,
    ) -> Result<(), HostError> {
        Err(unsupported())
    }

    async fn delete_chat_message(&self, _index: usize) -> Result<(), HostError> {
        Err(unsupported())
    }

    async fn update_message_block(&self, _index: usize, _text: &str) -> Result<(), HostError> {
        Err(unsupported())
    }

    async fn set_messages_visibility(
        &self,
        _start: usize,
        _end: usize,
        _hidden: bool,
    ) -> Result<(), HostError> {
        Err(unsupported())
    }

    async fn input_text(&self) -> Result<String, HostError> {
        Ok(String::new())
    }

    async fn set_input_text(&self, _text: &str) -> Result<(), HostError> {
        Err(unsupported())
    }

    async fn run_regex_script(&self, _script_id: &str, text: &str) -> Result<String, HostError> {
        Ok(text.to_string())
    }

    async fn run_slash_command(&self, _command: &str) -> Result<Value, HostError> {
        Err(unsupported())
    }

    async fn get_local_variable(&self, key: &str) -> Result<Option<Value>, HostError> {
        Ok(self.local_vars.lock().unwrap().get(key).cloned())
    }

    async fn set_local_variable(&self, key: &str, value: Value) -> Result<(), HostError> {
        self.local_vars.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_global_variable(&self, key: &str) -> Result<Option<Value>, HostError> {
        Ok(self.global_vars.lock().unwrap().get(key).cloned())
    }

    async fn set_global_variable(&self, key: &str, value: Value) -> Result<(), HostError> {
        self.global_vars.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

/// Entry point: republishes the entry payload on its outputs.
pub struct TestTrigger;

#[async_trait]
impl NodeDefinition for TestTrigger {
    fn node_type(&self) -> &str {
        "test.trigger"
    }

    fn label(&self) -> &str {
        "Test Trigger"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Trigger
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .output(HandleSpec::main(FlowDataType::Any))
            .output(HandleSpec::new("item", FlowDataType::Any))
            .output(HandleSpec::new("index", FlowDataType::Number))
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::Data(ctx.inputs.clone()))
    }
}

/// Returns no explicit output; the engine forwards its main input.
pub struct PassNode;

#[async_trait]
impl NodeDefinition for PassNode {
    fn node_type(&self) -> &str {
        "test.pass"
    }

    fn label(&self) -> &str {
        "Pass"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Any))
            .output(HandleSpec::main(FlowDataType::Any))
    }

    async fn execute(&self, _node: &FlowNode, _ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::Passthrough)
    }
}

/// Echoes its resolved `value` input, so tests can observe input resolution.
pub struct EchoNode;

#[async_trait]
impl NodeDefinition for EchoNode {
    fn node_type(&self) -> &str {
        "test.echo"
    }

    fn label(&self) -> &str {
        "Echo"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Any))
            .input(HandleSpec::new("value", FlowDataType::Any))
            .output(HandleSpec::main(FlowDataType::Any))
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::main(
            ctx.input("value").cloned().unwrap_or(Value::Null),
        ))
    }
}

/// Waits for both `a` and `b`, then emits them as a pair.
pub struct JoinNode;

#[async_trait]
impl NodeDefinition for JoinNode {
    fn node_type(&self) -> &str {
        "test.join"
    }

    fn label(&self) -> &str {
        "Join"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::new("a", FlowDataType::Any))
            .input(HandleSpec::new("b", FlowDataType::Any))
            .output(HandleSpec::main(FlowDataType::Array))
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let a = ctx.input("a").cloned().unwrap_or(Value::Null);
        let b = ctx.input("b").cloned().unwrap_or(Value::Null);
        Ok(NodeResult::main(Value::Array(vec![a, b])))
    }
}

/// Routes its main input to the handle named by the `branch` data field.
pub struct RouteNode;

#[async_trait]
impl NodeDefinition for RouteNode {
    fn node_type(&self) -> &str {
        "test.route"
    }

    fn label(&self) -> &str {
        "Route"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Control
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Any))
            .output(HandleSpec::new("left", FlowDataType::Any))
            .output(HandleSpec::new("right", FlowDataType::Any))
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let branch = node.data_str("branch").unwrap_or("left").to_string();
        let value = ctx.main_input().cloned().unwrap_or(Value::Null);
        Ok(NodeResult::single(branch, value))
    }

    fn edges_to_follow(&self, output: &ValueMap, outgoing: &[Edge]) -> Option<Vec<Edge>> {
        Some(
            outgoing
                .iter()
                .filter(|e| output.contains_key(e.source_key()))
                .cloned()
                .collect(),
        )
    }
}

/// Always fails.
pub struct FailNode;

#[async_trait]
impl NodeDefinition for FailNode {
    fn node_type(&self) -> &str {
        "test.fail"
    }

    fn label(&self) -> &str {
        "Fail"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new().input(HandleSpec::main(FlowDataType::Any))
    }

    async fn execute(&self, _node: &FlowNode, _ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        Err(NodeError::ExecutionFailed("boom".to_string()))
    }
}

/// Emits the loop sentinel named by its `sentinel` data field.
pub struct SentinelNode;

#[async_trait]
impl NodeDefinition for SentinelNode {
    fn node_type(&self) -> &str {
        "test.sentinel"
    }

    fn label(&self) -> &str {
        "Sentinel"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Control
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Any))
            .output(HandleSpec::main(FlowDataType::Any))
    }

    async fn execute(&self, node: &FlowNode, _ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        match node.data_str("sentinel") {
            Some("continue") => Ok(NodeResult::ContinueLoop),
            Some("end") => Ok(NodeResult::EndFlow),
            _ => Ok(NodeResult::BreakLoop),
        }
    }
}

/// Cancels the run's token, then passes through.
pub struct CancelNode;

#[async_trait]
impl NodeDefinition for CancelNode {
    fn node_type(&self) -> &str {
        "test.cancel"
    }

    fn label(&self) -> &str {
        "Cancel"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Control
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Any))
            .output(HandleSpec::main(FlowDataType::Any))
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        ctx.cancellation.cancel();
        Ok(NodeResult::Passthrough)
    }
}

/// Carries one handle of every interesting type, for connection checking.
pub struct TypedNode;

#[async_trait]
impl NodeDefinition for TypedNode {
    fn node_type(&self) -> &str {
        "test.typed"
    }

    fn label(&self) -> &str {
        "Typed"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::new("flag", FlowDataType::Boolean))
            .input(HandleSpec::new("text", FlowDataType::String))
            .input(HandleSpec::new("target_flow", FlowDataType::FlowId))
            .input(HandleSpec::new("anything", FlowDataType::Any))
            .output(HandleSpec::new("count", FlowDataType::Number))
            .output(HandleSpec::new("avatar", FlowDataType::CharacterAvatar))
            .output(HandleSpec::main(FlowDataType::Object))
    }

    async fn execute(&self, _node: &FlowNode, _ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::Data(ValueMap::new()))
    }
}

/// Entry payload carrying a single main value.
pub fn main_entry(value: impl Into<Value>) -> ValueMap {
    let mut entry = ValueMap::new();
    entry.insert(MAIN_HANDLE.to_string(), value.into());
    entry
}
