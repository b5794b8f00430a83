//! The capability surface the engine consumes from its host application.
//!
//! Everything behind this trait is an external collaborator: chat log,
//! character and lorebook storage, prompt building, model requests, scripting.
//! All operations are async and fallible; node implementations call them
//! through `NodeContext::host`.

use crate::error::HostError;
use crate::types::ValueMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One prompt or chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), name: None }
    }
}

/// Which lorebooks an entry enumeration covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LorebookScope {
    All,
    Global,
    Character,
    Chat,
    Persona,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LorebookEntry {
    pub lorebook: String,
    /// Assigned by the host on insertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    pub keys: Vec<String>,
    pub content: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Remaining card fields, passed through to the host untouched.
    #[serde(default)]
    pub fields: ValueMap,
}

/// Host capability surface. One implementation per embedding; tests use
/// in-memory stubs.
#[async_trait]
pub trait HostBridge: Send + Sync {
    // --- messaging / profiles ---

    /// Render the host's prompt template for a connection profile.
    async fn build_prompt_messages(
        &self,
        profile_id: &str,
        prompt: &str,
    ) -> Result<Vec<ChatMessage>, HostError>;

    /// Plain-text model request.
    async fn generate(
        &self,
        profile_id: &str,
        messages: &[ChatMessage],
    ) -> Result<String, HostError>;

    /// Schema-constrained model request; the result conforms to `schema`.
    async fn generate_structured(
        &self,
        profile_id: &str,
        messages: &[ChatMessage],
        schema: &Value,
    ) -> Result<Value, HostError>;

    /// Snapshot of the host's execution context (chat log, characters,
    /// settings) as one JSON document.
    async fn execution_context(&self) -> Result<Value, HostError>;

    // --- characters / lorebooks ---

    async fn create_character(&self, character: CharacterRecord) -> Result<(), HostError>;

    async fn update_character(&self, avatar: &str, fields: ValueMap) -> Result<(), HostError>;

    async fn create_lorebook(&self, name: &str) -> Result<(), HostError>;

    /// Returns the uid the host assigned to the new entry.
    async fn add_lorebook_entry(&self, entry: LorebookEntry) -> Result<u32, HostError>;

    async fn update_lorebook_entry(
        &self,
        lorebook: &str,
        uid: u32,
        fields: ValueMap,
    ) -> Result<(), HostError>;

    async fn list_lorebook_entries(
        &self,
        scope: LorebookScope,
    ) -> Result<Vec<LorebookEntry>, HostError>;

    // --- chat manipulation ---

    async fn send_chat_message(
        &self,
        role: ChatRole,
        text: &str,
        name: Option<&str>,
    ) -> Result<(), HostError>;

    async fn delete_chat_message(&self, index: usize) -> Result<(), HostError>;

    /// Replace the rendered text of an existing message block.
    async fn update_message_block(&self, index: usize, text: &str) -> Result<(), HostError>;

    async fn set_messages_visibility(
        &self,
        start: usize,
        end: usize,
        hidden: bool,
    ) -> Result<(), HostError>;

    /// Pending chat-input textarea contents.
    async fn input_text(&self) -> Result<String, HostError>;

    async fn set_input_text(&self, text: &str) -> Result<(), HostError>;

    // --- scripting / automation ---

    /// Run a named text-substitution script against `text`.
    async fn run_regex_script(&self, script_id: &str, text: &str) -> Result<String, HostError>;

    /// Execute a host slash-command pipeline; yields the pipe result.
    async fn run_slash_command(&self, command: &str) -> Result<Value, HostError>;

    // --- persistent variable stores ---
    // Flow-run variables live in the engine's own context, not here.

    async fn get_local_variable(&self, key: &str) -> Result<Option<Value>, HostError>;

    async fn set_local_variable(&self, key: &str, value: Value) -> Result<(), HostError>;

    async fn get_global_variable(&self, key: &str) -> Result<Option<Value>, HostError>;

    async fn set_global_variable(&self, key: &str, value: Value) -> Result<(), HostError>;
}
