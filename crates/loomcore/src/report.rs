use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifier shared by a run and all of its nested sub-flow runs.
pub type RunId = Uuid;

/// Terminal state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    /// Cooperatively cancelled. Never conflated with `Failed`.
    Aborted,
}

/// The last value a run produced. Loop sentinels surface here so an enclosing
/// For-Each can interpret a nested run's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RunOutput {
    Value(Value),
    BreakLoop,
    ContinueLoop,
}

/// One entry of the execution-order record. The position in
/// `ExecutionReport::executed_nodes` is the UI's step number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedNode {
    pub node_id: String,
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    /// Failing node, when the failure is attributable to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub message: String,
}

/// Result of running a flow or sub-flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: RunId,
    pub flow_id: String,
    pub status: RunStatus,
    /// Nodes in execution order, up to the point of failure or abort.
    pub executed_nodes: Vec<ExecutedNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output: Option<RunOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl ExecutionReport {
    /// The last plain value produced, if the run ended on data rather than a
    /// sentinel.
    pub fn last_value(&self) -> Option<&Value> {
        match &self.last_output {
            Some(RunOutput::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn executed_ids(&self) -> Vec<String> {
        self.executed_nodes.iter().map(|n| n.node_id.clone()).collect()
    }
}
