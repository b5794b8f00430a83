use async_trait::async_trait;
use loomcore::{
    FlowDataType, FlowNode, HandleContract, HandleSpec, HostBridge, NodeCategory, NodeContext,
    NodeDefinition, NodeError, NodeResult,
};

/// Run entry point. Exposes whatever entry payload the run was started with
/// on its output handles; a sub-flow invocation arrives as `item`/`index`.
pub struct ManualTriggerNode;

#[async_trait]
impl NodeDefinition for ManualTriggerNode {
    fn node_type(&self) -> &str {
        "trigger.manual"
    }

    fn label(&self) -> &str {
        "Manual Trigger"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Trigger
    }

    fn handles(&self) -> HandleContract {
        HandleContract::new()
            .output(HandleSpec::main(FlowDataType::Any))
            .output(HandleSpec::new("item", FlowDataType::Any))
            .output(HandleSpec::new("index", FlowDataType::Number))
    }

    async fn execute(&self, _node: &FlowNode, ctx: &NodeContext) -> Result<NodeResult, NodeError> {
        // The entry payload was delivered as this node's input; republish it
        // so downstream edges can source from it.
        Ok(NodeResult::Data(ctx.inputs.clone()))
    }

    async fn register(
        &self,
        flow_id: &str,
        node: &FlowNode,
        _host: &dyn HostBridge,
    ) -> Result<(), NodeError> {
        tracing::info!(flow_id, node_id = %node.id, "manual trigger attached");
        Ok(())
    }

    async fn unregister_all(&self, _host: &dyn HostBridge) -> Result<(), NodeError> {
        tracing::info!("manual triggers detached");
        Ok(())
    }
}
