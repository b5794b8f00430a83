use loomcore::{NodeDefinition, RegistryError};
use std::collections::HashMap;
use std::sync::Arc;

/// Catalog of every node type the engine can dispatch to. Registration is
/// eager and total: every type a graph references must be registered before
/// any run starts.
pub struct NodeRegistry {
    definitions: HashMap<String, Arc<dyn NodeDefinition>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
        }
    }

    /// Register a node definition. Re-registering a type name is a startup
    /// configuration error, never a silent override.
    pub fn register(&mut self, definition: Arc<dyn NodeDefinition>) -> Result<(), RegistryError> {
        let node_type = definition.node_type().to_string();
        if self.definitions.contains_key(&node_type) {
            tracing::error!(%node_type, "duplicate node type registration");
            return Err(RegistryError::DuplicateNodeType(node_type));
        }
        tracing::debug!(%node_type, "registering node type");
        self.definitions.insert(node_type, definition);
        Ok(())
    }

    pub fn get(&self, node_type: &str) -> Option<&Arc<dyn NodeDefinition>> {
        self.definitions.get(node_type)
    }

    pub fn require(&self, node_type: &str) -> Result<&Arc<dyn NodeDefinition>, RegistryError> {
        self.get(node_type)
            .ok_or_else(|| RegistryError::UnknownNodeType(node_type.to_string()))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.definitions.contains_key(node_type)
    }

    /// Registered type names, sorted for stable listings.
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn NodeDefinition>)> {
        self.definitions.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
