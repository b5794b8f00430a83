//! In-memory console host: chat output goes to stdout, variable and lorebook
//! stores live for the process lifetime. Model requests are unsupported
//! because the CLI has no host application to route them to.

use async_trait::async_trait;
use loomcore::{
    CharacterRecord, ChatMessage, ChatRole, HostBridge, HostError, LorebookEntry, LorebookScope,
    ValueMap,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct ConsoleHost {
    chat: Mutex<Vec<ChatMessage>>,
    input_text: Mutex<String>,
    local_vars: Mutex<HashMap<String, Value>>,
    global_vars: Mutex<HashMap<String, Value>>,
    lorebooks: Mutex<HashMap<String, Vec<LorebookEntry>>>,
    next_uid: Mutex<u32>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn unsupported(what: &str) -> HostError {
        HostError::Unsupported(format!("{what} requires a host application"))
    }
}

#[async_trait]
impl HostBridge for ConsoleHost {
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
        Err(Self::unsupported("llm generation"))
    }

    async fn generate_structured(
        &self,
        _profile_id: &str,
        _messages: &[ChatMessage],
        _schema: &Value,
    ) -> Result<Value, HostError> {
        Err(Self::unsupported("structured llm generation"))
    }

    async fn execution_context(&self) -> Result<Value, HostError> {
        let chat = self.chat.lock().unwrap();
        Ok(json!({ "chat": *chat, "characters": [] }))
    }

    async fn create_character(&self, _character: CharacterRecord) -> Result<(), HostError> {
        Err(Self::unsupported("character creation"))
    }

    async fn update_character(&self, _avatar: &str, _fields: ValueMap) -> Result<(), HostError> {
        Err(Self::unsupported("character update"))
    }

    async fn create_lorebook(&self, name: &str) -> Result<(), HostError> {
        self.lorebooks
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn add_lorebook_entry(&self, mut entry: LorebookEntry) -> Result<u32, HostError> {
        let uid = {
            let mut next = self.next_uid.lock().unwrap();
            *next += 1;
            *next
        };
        entry.uid = Some(uid);
        self.lorebooks
            .lock()
            .unwrap()
            .entry(entry.lorebook.clone())
            .or_default()
            .push(entry);
        Ok(uid)
    }

    async fn update_lorebook_entry(
        &self,
        lorebook: &str,
        uid: u32,
        fields: ValueMap,
    ) -> Result<(), HostError> {
        let mut books = self.lorebooks.lock().unwrap();
        let entries = books
            .get_mut(lorebook)
            .ok_or_else(|| HostError::NotFound(format!("lorebook '{lorebook}'")))?;
        let entry = entries
            .iter_mut()
            .find(|e| e.uid == Some(uid))
            .ok_or_else(|| HostError::NotFound(format!("entry {uid} in '{lorebook}'")))?;
        if let Some(content) = fields.get("content").and_then(Value::as_str) {
            entry.content = content.to_string();
        }
        if let Some(enabled) = fields.get("enabled").and_then(Value::as_bool) {
            entry.enabled = enabled;
        }
        Ok(())
    }

    async fn list_lorebook_entries(
        &self,
        _scope: LorebookScope,
    ) -> Result<Vec<LorebookEntry>, HostError> {
        let books = self.lorebooks.lock().unwrap();
        Ok(books.values().flatten().cloned().collect())
    }

    async fn send_chat_message(
        &self,
        role: ChatRole,
        text: &str,
        name: Option<&str>,
    ) -> Result<(), HostError> {
        println!("[{role:?}{}] {text}", name.map(|n| format!(" as {n}")).unwrap_or_default());
        self.chat.lock().unwrap().push(ChatMessage {
            role,
            content: text.to_string(),
            name: name.map(str::to_string),
        });
        Ok(())
    }

    async fn delete_chat_message(&self, index: usize) -> Result<(), HostError> {
        let mut chat = self.chat.lock().unwrap();
        if index >= chat.len() {
            return Err(HostError::NotFound(format!("message {index}")));
        }
        chat.remove(index);
        Ok(())
    }

    async fn update_message_block(&self, index: usize, text: &str) -> Result<(), HostError> {
        let mut chat = self.chat.lock().unwrap();
        let message = chat
            .get_mut(index)
            .ok_or_else(|| HostError::NotFound(format!("message {index}")))?;
        message.content = text.to_string();
        Ok(())
    }

    async fn set_messages_visibility(
        &self,
        _start: usize,
        _end: usize,
        _hidden: bool,
    ) -> Result<(), HostError> {
        // Visibility is a rendering concern; nothing to toggle on a console.
        Ok(())
    }

    async fn input_text(&self) -> Result<String, HostError> {
        Ok(self.input_text.lock().unwrap().clone())
    }

    async fn set_input_text(&self, text: &str) -> Result<(), HostError> {
        *self.input_text.lock().unwrap() = text.to_string();
        Ok(())
    }

    async fn run_regex_script(&self, script_id: &str, _text: &str) -> Result<String, HostError> {
        Err(HostError::Unsupported(format!(
            "regex script '{script_id}' requires a host application"
        )))
    }

    async fn run_slash_command(&self, command: &str) -> Result<Value, HostError> {
        Err(HostError::Unsupported(format!(
            "slash command '{command}' requires a host application"
        )))
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
