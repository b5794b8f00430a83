//! Shared scaffolding for node-library integration tests: a recording host
//! bridge and a few helper node definitions for loop bodies.

use async_trait::async_trait;
use loomcore::{
    CharacterRecord, ChatMessage, ChatRole, FlowDataType, FlowNode, HandleContract, HandleSpec,
    HostBridge, HostError, LorebookEntry, LorebookScope, NodeCategory, NodeContext,
    NodeDefinition, NodeError, NodeResult, ValueMap, MAIN_HANDLE,
};
use loomnodes::register_all;
use loomruntime::{FlowRuntime, NodeRegistry};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Host bridge that records side effects and answers generation requests with
/// canned text.
#[derive(Default)]
pub struct RecordingHost {
    pub chat: Mutex<Vec<(ChatRole, String, Option<String>)>>,
    pub lorebook_entries: Mutex<Vec<LorebookEntry>>,
    pub input: Mutex<String>,
    local_vars: Mutex<HashMap<String, Value>>,
    global_vars: Mutex<HashMap<String, Value>>,
}

fn unsupported() -> HostError {
    HostError::Unsupported("recording host".to_string())
}

#[async_trait]
impl HostBridge for RecordingHost {
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
        messages: &[ChatMessage],
    ) -> Result<String, HostError> {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok(format!("generated:{last}"))
    }

    async fn generate_structured(
        &self,
        _profile_id: &str,
        _messages: &[ChatMessage],
        _schema: &Value,
    ) -> Result<Value, HostError> {
        Ok(serde_json::json!({"ok": true}))
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
        Ok(())
    }

    async fn add_lorebook_entry(&self, mut entry: LorebookEntry) -> Result<u32, HostError> {
        let mut entries = self.lorebook_entries.lock().unwrap();
        let uid = entries.len() as u32 + 1;
        entry.uid = Some(uid);
        entries.push(entry);
        Ok(uid)
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
        Ok(self.lorebook_entries.lock().unwrap().clone())
    }

    async fn send_chat_message(
        &self,
        role: ChatRole,
        text: &str,
        name: Option<&str>,
    ) -> Result<(), HostError> {
        self.chat
            .lock()
            .unwrap()
            .push((role, text.to_string(), name.map(str::to_string)));
        Ok(())
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
        Ok(self.input.lock().unwrap().clone())
    }

    async fn set_input_text(&self, text: &str) -> Result<(), HostError> {
        *self.input.lock().unwrap() = text.to_string();
        Ok(())
    }

    async fn run_regex_script(&self, _script_id: &str, text: &str) -> Result<String, HostError> {
        Ok(text.to_uppercase())
    }

    async fn run_slash_command(&self, command: &str) -> Result<Value, HostError> {
        Ok(Value::String(format!("ran {command}")))
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

/// Doubles its integer main input.
pub struct DoubleNode;

#[async_trait]
impl NodeDefinition for DoubleNode {
    fn node_type(&self) -> &str {
        "test.double"
    }

    fn label(&self) -> &str {
        "Double"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Number))
            .output(HandleSpec::main(FlowDataType::Number))
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let n = ctx
            .require_input(MAIN_HANDLE)?
            .as_i64()
            .ok_or_else(|| NodeError::InvalidInputType {
                field: MAIN_HANDLE.to_string(),
                expected: "number",
                actual: "other".to_string(),
            })?;
        Ok(NodeResult::main(n * 2))
    }
}

/// Emits whether its `value` input equals the `to` data field.
pub struct EqNode;

#[async_trait]
impl NodeDefinition for EqNode {
    fn node_type(&self) -> &str {
        "test.eq"
    }

    fn label(&self) -> &str {
        "Equals"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::new("value", FlowDataType::Any))
            .output(HandleSpec::main(FlowDataType::Boolean))
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let equal = ctx.input("value") == node.data.get("to");
        Ok(NodeResult::main(equal))
    }
}

/// Always fails.
pub struct ExplodeNode;

#[async_trait]
impl NodeDefinition for ExplodeNode {
    fn node_type(&self) -> &str {
        "test.explode"
    }

    fn label(&self) -> &str {
        "Explode"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new().input(HandleSpec::main(FlowDataType::Any))
    }

    async fn execute(&self, _node: &FlowNode, _ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        Err(NodeError::ExecutionFailed("kaboom".to_string()))
    }
}

/// Cancels the run token when its main input equals the `at` data field, then
/// forwards the input either way.
pub struct CancelAtNode;

#[async_trait]
impl NodeDefinition for CancelAtNode {
    fn node_type(&self) -> &str {
        "test.cancel_at"
    }

    fn label(&self) -> &str {
        "Cancel At"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Control
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Any))
            .output(HandleSpec::main(FlowDataType::Any))
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        if ctx.main_input() == node.data.get("at") {
            ctx.cancellation.cancel();
        }
        Ok(NodeResult::Passthrough)
    }
}

/// Reads a run-scoped variable named by its `name` data field. The main input
/// only sequences it after its predecessor.
pub struct ReadVarNode;

#[async_trait]
impl NodeDefinition for ReadVarNode {
    fn node_type(&self) -> &str {
        "test.read_var"
    }

    fn label(&self) -> &str {
        "Read Variable"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Variables
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .input(HandleSpec::main(FlowDataType::Any))
            .output(HandleSpec::main(FlowDataType::Any))
    }

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        let name = node
            .data_str("name")
            .ok_or_else(|| NodeError::Configuration("name is required".to_string()))?;
        let value = ctx.get_variable(name).await.unwrap_or(Value::Null);
        Ok(NodeResult::main(value))
    }
}

/// Source whose main output carries a declared object schema, for tests of
/// schema-mirroring output types.
pub struct SchemaSourceNode;

#[async_trait]
impl NodeDefinition for SchemaSourceNode {
    fn node_type(&self) -> &str {
        "test.schema_source"
    }

    fn label(&self) -> &str {
        "Schema Source"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new().output(
            HandleSpec::main(FlowDataType::Object).with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "count": {"type": "number"}
                }
            })),
        )
    }

    async fn execute(&self, _node: &FlowNode, _ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::main(serde_json::json!({"title": "t", "count": 1})))
    }
}

/// The full built-in library plus the helper nodes above.
pub fn test_registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry).unwrap();
    registry.register(Arc::new(DoubleNode)).unwrap();
    registry.register(Arc::new(EqNode)).unwrap();
    registry.register(Arc::new(ExplodeNode)).unwrap();
    registry.register(Arc::new(CancelAtNode)).unwrap();
    registry.register(Arc::new(ReadVarNode)).unwrap();
    registry.register(Arc::new(SchemaSourceNode)).unwrap();
    Arc::new(registry)
}

pub fn runtime_with(host: Arc<RecordingHost>) -> Arc<FlowRuntime> {
    FlowRuntime::new(test_registry(), host)
}

pub fn runtime() -> Arc<FlowRuntime> {
    runtime_with(Arc::new(RecordingHost::default()))
}

/// Entry payload carrying a single main value.
pub fn main_entry(value: impl Into<Value>) -> ValueMap {
    let mut entry = ValueMap::new();
    entry.insert(MAIN_HANDLE.to_string(), value.into());
    entry
}
