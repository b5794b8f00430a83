use crate::error::{FlowError, NodeError};
use crate::flow::{Edge, Flow, FlowNode};
use crate::host::HostBridge;
use crate::report::{ExecutionReport, RunId};
use crate::types::{
    FlowDataType, HandleContract, HandleDirection, HandleSpec, ValueMap, MAIN_HANDLE,
};
use crate::validation::ValidationIssue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Editor-facing grouping of node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Run entry points. Sub-flow invocation starts at a flow's trigger node.
    Trigger,
    Control,
    Data,
    Variables,
    Chat,
    Generation,
    Lorebook,
    Scripting,
}

/// What a node's `execute` produced: either data on its output handles, or a
/// control instruction for the engine. A total match over this enum is the
/// engine's result-interpretation step; there are no out-of-band sentinel
/// tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult {
    /// Values keyed by output-handle key.
    Data(ValueMap),
    /// Forward the resolved main input to the main output unchanged. Also the
    /// natural result for purely side-effecting nodes.
    Passthrough,
    /// Stop the nearest enclosing loop, keeping results accumulated so far.
    BreakLoop,
    /// Skip the current loop iteration's result and move on.
    ContinueLoop,
    /// Terminate the run normally.
    EndFlow,
}

impl NodeResult {
    /// Data result with a single value on the main output handle.
    pub fn main(value: impl Into<Value>) -> Self {
        let mut map = ValueMap::new();
        map.insert(MAIN_HANDLE.to_string(), value.into());
        NodeResult::Data(map)
    }

    /// Data result with a single value on a named output handle.
    pub fn single(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = ValueMap::new();
        map.insert(key.into(), value.into());
        NodeResult::Data(map)
    }
}

/// Resolves handle specs/types across the graph. Implemented by the runtime
/// on top of its registry and handed to `NodeDefinition` hooks so a node can
/// mirror upstream types (e.g. a property-lookup node typing its output from
/// whatever feeds its `object` input).
pub trait HandleResolver: Sync {
    fn handle_spec(
        &self,
        flow: &Flow,
        node_id: &str,
        handle: Option<&str>,
        direction: HandleDirection,
    ) -> Option<HandleSpec>;

    fn handle_type(
        &self,
        flow: &Flow,
        node_id: &str,
        handle: Option<&str>,
        direction: HandleDirection,
    ) -> Option<FlowDataType>;
}

/// Recursion hook the engine installs into every `NodeContext`; loop-style
/// nodes delegate each iteration through it.
#[async_trait]
pub trait SubFlowInvoker: Send + Sync {
    /// Run `flow_id` as a nested run sharing the caller's variables, run id
    /// and cancellation, at `depth + 1`.
    async fn invoke_sub_flow(
        &self,
        flow_id: &str,
        entry: ValueMap,
        parent: &NodeContext,
    ) -> Result<ExecutionReport, FlowError>;
}

/// Behavior and contract of one node type. Registered once per type name;
/// the engine dispatches through this trait and knows nothing else about
/// concrete node types.
#[async_trait]
pub trait NodeDefinition: Send + Sync {
    /// Unique type name (e.g. "control.for_each").
    fn node_type(&self) -> &str;

    fn label(&self) -> &str;

    fn category(&self) -> NodeCategory;

    /// Static handle contract. Node types with graph-dependent handles
    /// override [`Self::dynamic_handles`] as well.
    fn handles(&self) -> HandleContract;

    async fn execute(&self, node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError>;

    /// Shape-check of the node's persisted configuration, run before the node
    /// executes.
    fn validate_data(&self, _data: &ValueMap) -> Result<(), NodeError> {
        Ok(())
    }

    /// Structural diagnostics given the node's data and the full edge list.
    fn validate(&self, _node: &FlowNode, _edges: &[Edge]) -> Vec<ValidationIssue> {
        Vec::new()
    }

    /// Handles that depend on node data or the surrounding graph. When this
    /// returns a list, it replaces the static contract for that direction.
    fn dynamic_handles(
        &self,
        _node: &FlowNode,
        _direction: HandleDirection,
        _flow: &Flow,
        _resolver: &dyn HandleResolver,
    ) -> Option<Vec<HandleSpec>> {
        None
    }

    /// Lighter-weight type-only resolution, consulted before
    /// [`Self::dynamic_handles`] is materialized.
    fn handle_type(
        &self,
        _node: &FlowNode,
        _handle: Option<&str>,
        _direction: HandleDirection,
        _flow: &Flow,
        _resolver: &dyn HandleResolver,
    ) -> Option<FlowDataType> {
        None
    }

    /// Branch selection: pick the outgoing edges to traverse for this output.
    /// `None` means default fan-out (every edge whose source-handle key is
    /// present in the output map).
    fn edges_to_follow(&self, _output: &ValueMap, _outgoing: &[Edge]) -> Option<Vec<Edge>> {
        None
    }

    /// Id scheme for variadic handle families. Must agree with
    /// [`Self::is_dynamic_handle`]: every produced id satisfies it, and no
    /// other id does.
    fn dynamic_handle_id(&self, _index: usize) -> Option<String> {
        None
    }

    fn is_dynamic_handle(&self, _handle: &str) -> bool {
        false
    }

    /// Attach external triggers when a flow is activated. Never called by the
    /// engine during a run.
    async fn register(
        &self,
        _flow_id: &str,
        _node: &FlowNode,
        _host: &dyn HostBridge,
    ) -> Result<(), NodeError> {
        Ok(())
    }

    /// Detach everything [`Self::register`] attached.
    async fn unregister_all(&self, _host: &dyn HostBridge) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Per-run, per-node-call bundle handed to `execute`.
#[derive(Clone)]
pub struct NodeContext {
    /// The flow this node belongs to.
    pub flow: Arc<Flow>,
    /// Resolved input map: connected values merged over static data fields.
    pub inputs: ValueMap,
    /// Host capability surface.
    pub host: Arc<dyn HostBridge>,
    /// Run-scoped variables, shared by every node in the run tree. Access is
    /// serialized by the single-step scheduler; the lock only satisfies the
    /// aliasing across nested contexts.
    pub variables: Arc<RwLock<ValueMap>>,
    /// Sub-flow nesting count; 0 for the top-level run.
    pub depth: usize,
    /// Flow-id ancestry, for recursion diagnostics.
    pub execution_path: Vec<String>,
    pub run_id: RunId,
    pub cancellation: CancellationToken,
    subflows: Arc<dyn SubFlowInvoker>,
}

impl NodeContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flow: Arc<Flow>,
        inputs: ValueMap,
        host: Arc<dyn HostBridge>,
        variables: Arc<RwLock<ValueMap>>,
        depth: usize,
        execution_path: Vec<String>,
        run_id: RunId,
        cancellation: CancellationToken,
        subflows: Arc<dyn SubFlowInvoker>,
    ) -> Self {
        Self {
            flow,
            inputs,
            host,
            variables,
            depth,
            execution_path,
            run_id,
            cancellation,
            subflows,
        }
    }

    /// Get a required input or fail.
    pub fn require_input(&self, key: &str) -> Result<&Value, NodeError> {
        self.inputs
            .get(key)
            .ok_or_else(|| NodeError::MissingInput(key.to_string()))
    }

    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }

    /// The resolved main-handle input, if connected or configured.
    pub fn main_input(&self) -> Option<&Value> {
        self.inputs.get(MAIN_HANDLE)
    }

    pub fn require_input_str(&self, key: &str) -> Result<&str, NodeError> {
        let value = self.require_input(key)?;
        value.as_str().ok_or_else(|| NodeError::InvalidInputType {
            field: key.to_string(),
            expected: "string",
            actual: type_name(value).to_string(),
        })
    }

    pub fn require_input_array(&self, key: &str) -> Result<&Vec<Value>, NodeError> {
        let value = self.require_input(key)?;
        value.as_array().ok_or_else(|| NodeError::InvalidInputType {
            field: key.to_string(),
            expected: "array",
            actual: type_name(value).to_string(),
        })
    }

    /// Input value with fallback to the node's static data having already
    /// been merged, or `field` missing entirely.
    pub fn input_str_or(&self, key: &str, default: &'static str) -> String {
        self.inputs
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    pub async fn get_variable(&self, key: &str) -> Option<Value> {
        self.variables.read().await.get(key).cloned()
    }

    pub async fn set_variable(&self, key: impl Into<String>, value: Value) {
        self.variables.write().await.insert(key.into(), value);
    }

    /// Run another flow as a nested run (the loop-iteration mechanism).
    pub async fn run_sub_flow(
        &self,
        flow_id: &str,
        entry: ValueMap,
    ) -> Result<ExecutionReport, FlowError> {
        self.subflows.invoke_sub_flow(flow_id, entry, self).await
    }
}

/// Short JSON type name for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
