use crate::types::{ValueMap, MAIN_HANDLE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete flow document as persisted by the editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<Edge>,
}

impl Flow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: FlowNode) -> &mut Self {
        self.nodes.push(node);
        self
    }

    /// Connect two handles. `None` addresses the unnamed main handle.
    pub fn connect(
        &mut self,
        source: impl Into<String>,
        source_handle: Option<&str>,
        target: impl Into<String>,
        target_handle: Option<&str>,
    ) -> &mut Self {
        self.edges.push(Edge {
            source: source.into(),
            source_handle: source_handle.map(str::to_string),
            target: target.into(),
            target_handle: target_handle.map(str::to_string),
        });
        self
    }

    pub fn find_node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Incoming edges of a node, with their index in `edges`.
    pub fn incoming_edges<'a>(
        &'a self,
        node_id: &'a str,
    ) -> impl Iterator<Item = (usize, &'a Edge)> + 'a {
        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.target == node_id)
    }

    /// Outgoing edges of a node, with their index in `edges`.
    pub fn outgoing_edges<'a>(
        &'a self,
        node_id: &'a str,
    ) -> impl Iterator<Item = (usize, &'a Edge)> + 'a {
        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.source == node_id)
    }

    /// The edge currently occupying a target handle, if any. `None` and
    /// `Some("main")` address the same slot.
    pub fn edge_into(&self, target: &str, target_handle: Option<&str>) -> Option<&Edge> {
        let key = target_handle.unwrap_or(MAIN_HANDLE);
        self.edges
            .iter()
            .find(|e| e.target == target && e.target_key() == key)
    }
}

/// One node instance inside a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    /// Node type name, resolved against the registry.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Persisted configuration, shape-checked by the node type before a run.
    #[serde(default)]
    pub data: ValueMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: ValueMap::new(),
            position: None,
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn data_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(Value::as_u64)
    }

    pub fn data_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }
}

/// A directed connection between a source output handle and a target input
/// handle. `None` handles address the unnamed main handle on either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    pub target: String,
    #[serde(default)]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Output-map key on the source side.
    pub fn source_key(&self) -> &str {
        self.source_handle.as_deref().unwrap_or(MAIN_HANDLE)
    }

    /// Input-map key on the target side.
    pub fn target_key(&self) -> &str {
        self.target_handle.as_deref().unwrap_or(MAIN_HANDLE)
    }
}

/// Editor canvas position. Carried through untouched; the engine never reads it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}
