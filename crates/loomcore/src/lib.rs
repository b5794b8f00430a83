//! Core abstractions for the loomflow engine.
//!
//! This crate defines the flow data model, the typed-handle system, the
//! `NodeDefinition` contract every node type implements, the host capability
//! surface, and the run report/event types. It contains no engine logic; the
//! interpreter lives in `loomruntime`.

mod error;
mod events;
mod flow;
mod host;
mod node;
mod report;
mod types;
mod validation;

pub use error::{FlowError, HostError, NodeError, RegistryError, Result};
pub use events::{EventBus, FlowEvent};
pub use flow::{Edge, Flow, FlowNode, Position};
pub use host::{
    CharacterRecord, ChatMessage, ChatRole, HostBridge, LorebookEntry, LorebookScope,
};
pub use node::{
    type_name, HandleResolver, NodeCategory, NodeContext, NodeDefinition, NodeResult,
    SubFlowInvoker,
};
pub use report::{ExecutedNode, ExecutionReport, RunError, RunId, RunOutput, RunStatus};
pub use types::{
    are_types_compatible, FlowDataType, HandleContract, HandleDirection, HandleSpec, ValueMap,
    MAIN_HANDLE,
};
pub use validation::{
    combine, require_connection, require_field_or_connection, IssueSeverity, NodeIssues,
    ValidationIssue,
};
