//! The interpreter: runs one flow (or sub-flow) with an explicit ready-queue,
//! strictly one node at a time, interpreting control sentinels and selecting
//! outgoing edges after every step.

use crate::handles::RegistryResolver;
use crate::registry::NodeRegistry;
use chrono::Utc;
use loomcore::{
    EventBus, ExecutedNode, ExecutionReport, Flow, FlowError, FlowEvent, HandleDirection,
    HostBridge, NodeContext, NodeError, NodeResult, RunError, RunId, RunOutput, RunStatus,
    SubFlowInvoker, ValueMap, MAIN_HANDLE,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Everything one run needs. Sub-flow runs share `run_id`, `variables` and
/// `cancellation` with their parent by construction.
pub(crate) struct RunParams {
    pub flow: Arc<Flow>,
    pub start_node: String,
    pub entry: ValueMap,
    pub depth: usize,
    pub execution_path: Vec<String>,
    pub run_id: RunId,
    pub variables: Arc<RwLock<ValueMap>>,
    pub cancellation: CancellationToken,
}

pub(crate) struct FlowExecutor<'a> {
    registry: &'a NodeRegistry,
    events: &'a EventBus,
    host: Arc<dyn HostBridge>,
}

/// How the step loop ended.
enum StepOutcome {
    Continue,
    EndFlow,
    Sentinel(RunOutput),
    Failed(RunError),
    Aborted,
}

impl<'a> FlowExecutor<'a> {
    pub(crate) fn new(
        registry: &'a NodeRegistry,
        events: &'a EventBus,
        host: Arc<dyn HostBridge>,
    ) -> Self {
        Self {
            registry,
            events,
            host,
        }
    }

    /// Run to termination. Runtime failures are folded into the report; the
    /// caller decides whether to propagate them.
    pub(crate) async fn run(
        &self,
        params: RunParams,
        subflows: Arc<dyn SubFlowInvoker>,
    ) -> ExecutionReport {
        let RunParams {
            flow,
            start_node,
            entry,
            depth,
            execution_path,
            run_id,
            variables,
            cancellation,
        } = params;

        self.events.emit(FlowEvent::RunStarted {
            run_id,
            flow_id: flow.id.clone(),
            depth,
            timestamp: Utc::now(),
        });
        tracing::debug!(run_id = %run_id, flow_id = %flow.id, depth, "run started");

        // Edge-delivery bookkeeping: a node becomes ready once every one of
        // its incoming edges has delivered a value.
        let mut incoming_total: HashMap<&str, usize> = HashMap::new();
        for node in &flow.nodes {
            incoming_total.insert(node.id.as_str(), flow.incoming_edges(&node.id).count());
        }
        let mut delivered: HashMap<String, ValueMap> = HashMap::new();
        let mut delivered_edges: HashMap<String, HashSet<usize>> = HashMap::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut executed: Vec<ExecutedNode> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut last_output: Option<RunOutput> = None;

        delivered.insert(start_node.clone(), entry);
        queue.push_back(start_node);

        let mut status = RunStatus::Completed;
        let mut error: Option<RunError> = None;

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id.clone()) {
                continue;
            }
            if cancellation.is_cancelled() {
                status = RunStatus::Aborted;
                break;
            }

            let step = self
                .step(
                    &flow,
                    &node_id,
                    &mut delivered,
                    &mut delivered_edges,
                    &mut queue,
                    &incoming_total,
                    &visited,
                    &mut executed,
                    &mut last_output,
                    StepEnv {
                        depth,
                        execution_path: &execution_path,
                        run_id,
                        variables: &variables,
                        cancellation: &cancellation,
                        subflows: &subflows,
                    },
                )
                .await;

            match step {
                StepOutcome::Continue => {}
                StepOutcome::EndFlow => break,
                StepOutcome::Sentinel(output) => {
                    last_output = Some(output);
                    break;
                }
                StepOutcome::Failed(e) => {
                    status = RunStatus::Failed;
                    error = Some(e);
                    break;
                }
                StepOutcome::Aborted => {
                    status = RunStatus::Aborted;
                    break;
                }
            }
        }

        self.events.emit(FlowEvent::RunFinished {
            run_id,
            flow_id: flow.id.clone(),
            depth,
            status,
            executed_nodes: executed.iter().map(|n| n.node_id.clone()).collect(),
            error: error.clone(),
            timestamp: Utc::now(),
        });
        tracing::debug!(run_id = %run_id, flow_id = %flow.id, ?status, "run finished");

        ExecutionReport {
            run_id,
            flow_id: flow.id.clone(),
            status,
            executed_nodes: executed,
            last_output,
            error,
        }
    }

    /// Execute one node step: resolve input, dispatch, interpret the result,
    /// select edges and deliver values to downstream nodes.
    #[allow(clippy::too_many_arguments)]
    async fn step(
        &self,
        flow: &Arc<Flow>,
        node_id: &str,
        delivered: &mut HashMap<String, ValueMap>,
        delivered_edges: &mut HashMap<String, HashSet<usize>>,
        queue: &mut VecDeque<String>,
        incoming_total: &HashMap<&str, usize>,
        visited: &HashSet<String>,
        executed: &mut Vec<ExecutedNode>,
        last_output: &mut Option<RunOutput>,
        env: StepEnv<'_>,
    ) -> StepOutcome {
        let Some(node) = flow.find_node(node_id) else {
            return StepOutcome::Failed(RunError {
                node_id: Some(node_id.to_string()),
                message: format!("node '{node_id}' not found in flow '{}'", flow.id),
            });
        };
        let Some(definition) = self.registry.get(&node.node_type) else {
            return StepOutcome::Failed(RunError {
                node_id: Some(node_id.to_string()),
                message: format!("unknown node type '{}'", node.node_type),
            });
        };

        // Input resolution: connected values win; declared handles without a
        // connection fall back to the node's static data field of the same
        // key; neither present leaves the key absent.
        let mut input = delivered.remove(node_id).unwrap_or_default();
        let resolver = RegistryResolver::new(self.registry);
        let input_handles = definition
            .dynamic_handles(node, HandleDirection::Input, flow, &resolver)
            .unwrap_or_else(|| definition.handles().inputs);
        for spec in &input_handles {
            let key = spec.key();
            if !input.contains_key(key) {
                if let Some(value) = node.data.get(key) {
                    input.insert(key.to_string(), value.clone());
                }
            }
        }

        if let Err(e) = definition.validate_data(&node.data) {
            return StepOutcome::Failed(RunError {
                node_id: Some(node_id.to_string()),
                message: e.to_string(),
            });
        }

        self.events.emit(FlowEvent::NodeStarted {
            run_id: env.run_id,
            node_id: node_id.to_string(),
            node_type: node.node_type.clone(),
            input: input.clone(),
            timestamp: Utc::now(),
        });
        tracing::trace!(node_id, node_type = %node.node_type, "node started");

        let ctx = NodeContext::new(
            Arc::clone(flow),
            input.clone(),
            Arc::clone(&self.host),
            Arc::clone(env.variables),
            env.depth,
            env.execution_path.to_vec(),
            env.run_id,
            env.cancellation.clone(),
            Arc::clone(env.subflows),
        );

        let started = Instant::now();
        let result = definition.execute(node, &ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        executed.push(ExecutedNode {
            node_id: node_id.to_string(),
            node_type: node.node_type.clone(),
        });

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                let aborted = matches!(e, NodeError::Cancelled);
                let status = if aborted {
                    RunStatus::Aborted
                } else {
                    RunStatus::Failed
                };
                self.emit_node_finished(
                    env.run_id,
                    node,
                    &input,
                    None,
                    status,
                    Some(e.to_string()),
                    duration_ms,
                );
                if aborted {
                    return StepOutcome::Aborted;
                }
                tracing::warn!(node_id, error = %e, "node failed");
                let wrapped = FlowError::NodeFailed {
                    node_id: node_id.to_string(),
                    source: e,
                };
                return StepOutcome::Failed(RunError {
                    node_id: Some(node_id.to_string()),
                    message: wrapped.to_string(),
                });
            }
        };

        // Result interpretation: total match over the closed result set.
        let output = match result {
            NodeResult::Data(map) => map,
            NodeResult::Passthrough => {
                let mut map = ValueMap::new();
                if let Some(main) = input.get(MAIN_HANDLE) {
                    map.insert(MAIN_HANDLE.to_string(), main.clone());
                }
                map
            }
            NodeResult::EndFlow => {
                self.emit_node_finished(
                    env.run_id,
                    node,
                    &input,
                    None,
                    RunStatus::Completed,
                    None,
                    duration_ms,
                );
                return StepOutcome::EndFlow;
            }
            NodeResult::BreakLoop | NodeResult::ContinueLoop => {
                let (sentinel, run_output) = match result {
                    NodeResult::BreakLoop => ("break-loop", RunOutput::BreakLoop),
                    _ => ("continue-loop", RunOutput::ContinueLoop),
                };
                if env.depth > 0 {
                    // The enclosing loop construct interprets the sentinel
                    // from this run's last output.
                    self.emit_node_finished(
                        env.run_id,
                        node,
                        &input,
                        None,
                        RunStatus::Completed,
                        None,
                        duration_ms,
                    );
                    return StepOutcome::Sentinel(run_output);
                }
                // No enclosing loop: a flow-authoring defect, reported
                // distinctly, never silently treated as End-Flow.
                let defect = FlowError::SentinelOutsideLoop {
                    node_id: node_id.to_string(),
                    sentinel,
                };
                tracing::warn!(node_id, sentinel, "sentinel outside any loop");
                self.emit_node_finished(
                    env.run_id,
                    node,
                    &input,
                    None,
                    RunStatus::Failed,
                    Some(defect.to_string()),
                    duration_ms,
                );
                return StepOutcome::Failed(RunError {
                    node_id: Some(node_id.to_string()),
                    message: defect.to_string(),
                });
            }
        };

        if let Some(value) = output_value(&output) {
            *last_output = Some(RunOutput::Value(value));
        }
        self.emit_node_finished(
            env.run_id,
            node,
            &input,
            Some(output.clone()),
            RunStatus::Completed,
            None,
            duration_ms,
        );

        // Branch selection, then frontier advance along the chosen edges.
        let outgoing: Vec<(usize, loomcore::Edge)> = flow
            .outgoing_edges(node_id)
            .map(|(i, e)| (i, e.clone()))
            .collect();
        let outgoing_edges: Vec<loomcore::Edge> =
            outgoing.iter().map(|(_, e)| e.clone()).collect();
        let chosen = definition
            .edges_to_follow(&output, &outgoing_edges)
            .unwrap_or_else(|| {
                outgoing_edges
                    .iter()
                    .filter(|e| output.contains_key(e.source_key()))
                    .cloned()
                    .collect()
            });

        for edge in &chosen {
            let Some(value) = output.get(edge.source_key()) else {
                continue;
            };
            let Some((edge_index, _)) = outgoing.iter().find(|(_, e)| e == edge) else {
                continue;
            };
            delivered
                .entry(edge.target.clone())
                .or_default()
                .insert(edge.target_key().to_string(), value.clone());
            let seen = delivered_edges.entry(edge.target.clone()).or_default();
            seen.insert(*edge_index);

            let required = incoming_total
                .get(edge.target.as_str())
                .copied()
                .unwrap_or(0);
            if seen.len() >= required && !visited.contains(&edge.target) {
                queue.push_back(edge.target.clone());
            }
        }

        StepOutcome::Continue
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_node_finished(
        &self,
        run_id: RunId,
        node: &loomcore::FlowNode,
        input: &ValueMap,
        output: Option<ValueMap>,
        status: RunStatus,
        error: Option<String>,
        duration_ms: u64,
    ) {
        self.events.emit(FlowEvent::NodeFinished {
            run_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            input: input.clone(),
            output,
            status,
            error,
            duration_ms,
            timestamp: Utc::now(),
        });
    }
}

/// Borrowed per-step environment, to keep `step`'s signature manageable.
struct StepEnv<'a> {
    depth: usize,
    execution_path: &'a [String],
    run_id: RunId,
    variables: &'a Arc<RwLock<ValueMap>>,
    cancellation: &'a CancellationToken,
    subflows: &'a Arc<dyn SubFlowInvoker>,
}

/// The single value a node's output contributes to the run's `last_output`:
/// the main handle when present, a lone named value otherwise, the whole map
/// past that. Empty outputs contribute nothing.
fn output_value(output: &ValueMap) -> Option<Value> {
    if let Some(main) = output.get(MAIN_HANDLE) {
        return Some(main.clone());
    }
    match output.len() {
        0 => None,
        1 => output.values().next().cloned(),
        _ => Some(Value::Object(output.clone())),
    }
}
