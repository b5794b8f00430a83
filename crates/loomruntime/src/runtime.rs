use crate::executor::{FlowExecutor, RunParams};
use crate::registry::NodeRegistry;
use crate::validate::{is_runnable, validate_flow};
use async_trait::async_trait;
use loomcore::{
    EventBus, ExecutionReport, Flow, FlowError, FlowEvent, HostBridge, NodeCategory, NodeContext,
    NodeIssues, SubFlowInvoker, ValueMap,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Runtime tuning knobs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_capacity: usize,
    /// Sub-flow nesting bound; exceeding it is a fatal run error.
    pub max_subflow_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            max_subflow_depth: 8,
        }
    }
}

/// Main entry point: owns the registry, the flow library, the event bus and
/// the host bridge, and runs flows. Also the [`SubFlowInvoker`] behind loop
/// constructs.
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    host: Arc<dyn HostBridge>,
    events: EventBus,
    flows: RwLock<HashMap<String, Arc<Flow>>>,
    config: RuntimeConfig,
    self_ref: Weak<FlowRuntime>,
}

impl FlowRuntime {
    pub fn new(registry: Arc<NodeRegistry>, host: Arc<dyn HostBridge>) -> Arc<Self> {
        Self::with_config(registry, host, RuntimeConfig::default())
    }

    pub fn with_config(
        registry: Arc<NodeRegistry>,
        host: Arc<dyn HostBridge>,
        config: RuntimeConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            registry,
            host,
            events: EventBus::new(config.event_capacity),
            flows: RwLock::new(HashMap::new()),
            config,
            self_ref: weak.clone(),
        })
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.events.subscribe()
    }

    /// Add or replace a flow in the library. Sub-flow invocation resolves
    /// flow ids against this library.
    pub async fn insert_flow(&self, flow: Flow) {
        self.flows
            .write()
            .await
            .insert(flow.id.clone(), Arc::new(flow));
    }

    pub async fn remove_flow(&self, flow_id: &str) -> Option<Arc<Flow>> {
        self.flows.write().await.remove(flow_id)
    }

    pub async fn get_flow(&self, flow_id: &str) -> Option<Arc<Flow>> {
        self.flows.read().await.get(flow_id).cloned()
    }

    /// Pre-run diagnostic sweep (see `validate_flow`).
    pub fn validate(&self, flow: &Flow) -> Vec<NodeIssues> {
        validate_flow(flow, &self.registry)
    }

    /// Attach the external triggers of a flow's trigger nodes. Called on flow
    /// activation by lifecycle management, never by the engine mid-run.
    pub async fn activate_flow(&self, flow_id: &str) -> Result<(), FlowError> {
        let flow = self
            .get_flow(flow_id)
            .await
            .ok_or_else(|| FlowError::FlowNotFound(flow_id.to_string()))?;
        for node in &flow.nodes {
            let definition = self.registry.require(&node.node_type)?;
            if definition.category() == NodeCategory::Trigger {
                definition
                    .register(flow_id, node, self.host.as_ref())
                    .await
                    .map_err(|e| FlowError::NodeFailed {
                        node_id: node.id.clone(),
                        source: e,
                    })?;
            }
        }
        Ok(())
    }

    /// Detach everything trigger nodes attached during activation.
    pub async fn deactivate_flow(&self, flow_id: &str) -> Result<(), FlowError> {
        let flow = self
            .get_flow(flow_id)
            .await
            .ok_or_else(|| FlowError::FlowNotFound(flow_id.to_string()))?;
        for node in &flow.nodes {
            let definition = self.registry.require(&node.node_type)?;
            if definition.category() == NodeCategory::Trigger {
                definition
                    .unregister_all(self.host.as_ref())
                    .await
                    .map_err(|e| FlowError::NodeFailed {
                        node_id: node.id.clone(),
                        source: e,
                    })?;
            }
        }
        Ok(())
    }

    /// Run a flow from its trigger node with a fresh run id and variable map.
    pub async fn execute_flow(
        &self,
        flow_id: &str,
        entry: ValueMap,
    ) -> Result<ExecutionReport, FlowError> {
        self.execute_flow_with(flow_id, entry, CancellationToken::new())
            .await
    }

    /// As [`Self::execute_flow`], with a caller-owned cancellation token.
    /// Cancellation is cooperative: it prevents the next node step or loop
    /// iteration from starting, it never interrupts one mid-flight.
    pub async fn execute_flow_with(
        &self,
        flow_id: &str,
        entry: ValueMap,
        cancellation: CancellationToken,
    ) -> Result<ExecutionReport, FlowError> {
        let flow = self
            .get_flow(flow_id)
            .await
            .ok_or_else(|| FlowError::FlowNotFound(flow_id.to_string()))?;
        let start_node = self.prepare(&flow)?;

        let params = RunParams {
            flow,
            start_node,
            entry,
            depth: 0,
            execution_path: vec![flow_id.to_string()],
            run_id: Uuid::new_v4(),
            variables: Arc::new(RwLock::new(ValueMap::new())),
            cancellation,
        };
        let executor = FlowExecutor::new(&self.registry, &self.events, Arc::clone(&self.host));
        Ok(executor.run(params, self.invoker()).await)
    }

    /// Validate and locate the run entry point.
    fn prepare(&self, flow: &Flow) -> Result<String, FlowError> {
        let issues = validate_flow(flow, &self.registry);
        if !is_runnable(&issues) {
            return Err(FlowError::Invalid { issues });
        }
        self.find_trigger(flow)
    }

    fn find_trigger(&self, flow: &Flow) -> Result<String, FlowError> {
        let mut triggers = flow.nodes.iter().filter(|n| {
            self.registry
                .get(&n.node_type)
                .is_some_and(|d| d.category() == NodeCategory::Trigger)
        });
        match (triggers.next(), triggers.next()) {
            (Some(t), None) => Ok(t.id.clone()),
            _ => Err(FlowError::MissingTrigger(flow.id.clone())),
        }
    }

    fn invoker(&self) -> Arc<dyn SubFlowInvoker> {
        // self_ref is populated in with_config and cannot dangle while &self
        // exists.
        self.self_ref.upgrade().expect("runtime self-reference")
    }
}

#[async_trait]
impl SubFlowInvoker for FlowRuntime {
    async fn invoke_sub_flow(
        &self,
        flow_id: &str,
        entry: ValueMap,
        parent: &NodeContext,
    ) -> Result<ExecutionReport, FlowError> {
        let depth = parent.depth + 1;
        if depth > self.config.max_subflow_depth {
            let mut path = parent.execution_path.clone();
            path.push(flow_id.to_string());
            return Err(FlowError::DepthExceeded {
                depth,
                path: path.join(" -> "),
            });
        }

        let flow = self
            .get_flow(flow_id)
            .await
            .ok_or_else(|| FlowError::FlowNotFound(flow_id.to_string()))?;
        let start_node = self.prepare(&flow)?;

        let mut execution_path = parent.execution_path.clone();
        execution_path.push(flow_id.to_string());

        // The nested run shares the parent's variables, run id and
        // cancellation by construction; only depth and path differ.
        let params = RunParams {
            flow,
            start_node,
            entry,
            depth,
            execution_path,
            run_id: parent.run_id,
            variables: Arc::clone(&parent.variables),
            cancellation: parent.cancellation.clone(),
        };
        let executor = FlowExecutor::new(&self.registry, &self.events, Arc::clone(&self.host));
        Ok(executor.run(params, self.invoker()).await)
    }
}
