//! Execution observability: a broadcast bus carrying run-start, node-start,
//! node-end and run-end events. This is the engine's only side channel.

use crate::report::{RunError, RunId, RunStatus};
use crate::types::ValueMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted while a run (or nested sub-flow run) executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FlowEvent {
    RunStarted {
        run_id: RunId,
        flow_id: String,
        /// 0 for a top-level run, >0 for sub-flow runs of the same `run_id`.
        depth: usize,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        run_id: RunId,
        node_id: String,
        node_type: String,
        /// The resolved input the node is about to see.
        input: ValueMap,
        timestamp: DateTime<Utc>,
    },
    NodeFinished {
        run_id: RunId,
        node_id: String,
        node_type: String,
        /// The resolved input the node saw, mirrored from `NodeStarted` so
        /// observers need not pair the two events.
        input: ValueMap,
        /// Output map for data results; `None` for sentinel results.
        output: Option<ValueMap>,
        /// How this step ended. `Failed` carries the message in `error`.
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    RunFinished {
        run_id: RunId,
        flow_id: String,
        depth: usize,
        status: RunStatus,
        /// Node ids in execution order.
        executed_nodes: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RunError>,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`FlowEvent`]s. Lagging subscribers drop events rather
/// than back-pressuring the engine.
pub struct EventBus {
    sender: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: FlowEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
