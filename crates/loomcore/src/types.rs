use serde::{Deserialize, Serialize};

/// Key under which the unnamed default ("main") handle's value appears in
/// node input and output maps. A `HandleSpec` with `id = None` is addressed
/// by this key.
pub const MAIN_HANDLE: &str = "main";

/// Map type used for node data, resolved inputs and outputs.
pub type ValueMap = serde_json::Map<String, serde_json::Value>;

/// The closed set of types a handle can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDataType {
    Any,
    String,
    Number,
    Boolean,
    Object,
    Array,
    Schema,
    Messages,
    StructuredResult,
    // Specialized string-like subtypes. Each is a plain string at runtime;
    // the distinct tag drives editor pickers and connection checking.
    CharacterAvatar,
    LorebookName,
    FlowId,
    ProfileId,
    RegexScriptId,
}

impl FlowDataType {
    /// All variants, in declaration order. Used by exhaustive compatibility
    /// tests and by editor-facing listings.
    pub const ALL: [FlowDataType; 14] = [
        FlowDataType::Any,
        FlowDataType::String,
        FlowDataType::Number,
        FlowDataType::Boolean,
        FlowDataType::Object,
        FlowDataType::Array,
        FlowDataType::Schema,
        FlowDataType::Messages,
        FlowDataType::StructuredResult,
        FlowDataType::CharacterAvatar,
        FlowDataType::LorebookName,
        FlowDataType::FlowId,
        FlowDataType::ProfileId,
        FlowDataType::RegexScriptId,
    ];

    /// True for `String` and every specialized string subtype.
    pub fn is_string_like(self) -> bool {
        matches!(
            self,
            FlowDataType::String
                | FlowDataType::CharacterAvatar
                | FlowDataType::LorebookName
                | FlowDataType::FlowId
                | FlowDataType::ProfileId
                | FlowDataType::RegexScriptId
        )
    }
}

/// Connection compatibility between two handle types.
///
/// `Any` connects to everything, string-like types connect among themselves,
/// everything else requires an exact match. Symmetric by construction.
pub fn are_types_compatible(a: FlowDataType, b: FlowDataType) -> bool {
    if a == FlowDataType::Any || b == FlowDataType::Any {
        return true;
    }
    if a == b {
        return true;
    }
    a.is_string_like() && b.is_string_like()
}

/// Which side of a node a handle sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleDirection {
    Input,
    Output,
}

/// A typed connection point on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleSpec {
    /// `None` is the unnamed default handle (see [`MAIN_HANDLE`]).
    pub id: Option<String>,
    pub data_type: FlowDataType,
    /// Optional value-shape descriptor (JSON-schema subset) refining
    /// Object/Array payloads. Introspection only; never consulted by
    /// [`are_types_compatible`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

impl HandleSpec {
    pub fn main(data_type: FlowDataType) -> Self {
        Self { id: None, data_type, schema: None }
    }

    pub fn new(id: impl Into<String>, data_type: FlowDataType) -> Self {
        Self { id: Some(id.into()), data_type, schema: None }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// The key this handle uses in input/output maps.
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(MAIN_HANDLE)
    }

    /// Whether this spec answers to the given handle id (`None` = main).
    pub fn matches(&self, handle: Option<&str>) -> bool {
        match (self.id.as_deref(), handle) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            (None, Some(h)) => h == MAIN_HANDLE,
            (Some(a), None) => a == MAIN_HANDLE,
        }
    }
}

/// Static handle contract of a node type.
#[derive(Debug, Clone, Default)]
pub struct HandleContract {
    pub inputs: Vec<HandleSpec>,
    pub outputs: Vec<HandleSpec>,
}

impl HandleContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, spec: HandleSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn output(mut self, spec: HandleSpec) -> Self {
        self.outputs.push(spec);
        self
    }

    pub fn for_direction(&self, direction: HandleDirection) -> &[HandleSpec] {
        match direction {
            HandleDirection::Input => &self.inputs,
            HandleDirection::Output => &self.outputs,
        }
    }
}
